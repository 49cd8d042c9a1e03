// used for opaque host values
use std::any::Any;
// used to keep records and maps in a stable key order
use std::collections::BTreeMap;
// used to print out readable forms of a value
use std::fmt;
use std::sync::Arc;

// used to report answers as JSON
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::arg::{Arg, ArgId};
use crate::error::Result;
use crate::thread::Thread;

/// Marker describing what kind of value an [`Arg`] is meant to hold.
///
/// Only used for interface typing; nothing is enforced at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ValueKind {
    #[default]
    Any,
    Boolean,
    Number,
    String,
    Opaque,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValueKind::Any => "any",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Opaque => "opaque",
        };
        write!(f, "{}", name)
    }
}

// ------------- Opaque -------------
/// A host value the engine carries around without looking inside.
/// Two opaque values are equal only if they are the same allocation.
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}
impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}
impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Opaque(..)")
    }
}

// ------------- Value -------------
/// A flat value stored in a field or bound to an [`Arg`].
///
/// Lists and maps exist so that templates over Args can be bound as a whole;
/// they are never unified structurally.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Arg(Arg),
    Opaque(Opaque),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Boolean,
            Value::Int(_) | Value::Float(_) => ValueKind::Number,
            Value::Str(_) => ValueKind::String,
            Value::Arg(arg) => arg.kind(),
            Value::List(_) | Value::Map(_) | Value::Opaque(_) => ValueKind::Opaque,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
    pub fn as_arg(&self) -> Option<&Arg> {
        match self {
            Value::Arg(arg) => Some(arg),
            _ => None,
        }
    }
    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Value::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }

    /// Copies a template, replacing every Arg leaf with its clone in the
    /// thread's current scope. Literal leaves are copied verbatim.
    pub fn fresh(&self, thread: &mut Thread) -> Value {
        match self {
            Value::Arg(arg) => Value::Arg(arg.clone_in(thread)),
            Value::List(items) => Value::List(items.iter().map(|item| item.fresh(thread)).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(key, item)| (key.clone(), item.fresh(thread)))
                    .collect(),
            ),
            literal => literal.clone(),
        }
    }

    /// Replaces bound Arg leaves by their values. Unbound Args stay in place,
    /// and so does an Arg met again inside its own binding.
    pub fn resolve(&self, thread: &Thread) -> Value {
        self.resolve_within(thread, &mut Vec::new())
    }

    fn resolve_within(&self, thread: &Thread, open: &mut Vec<ArgId>) -> Value {
        match self {
            Value::Arg(arg) => {
                if open.contains(&arg.id()) {
                    return self.clone();
                }
                match arg.read(thread) {
                    Some(bound) => {
                        open.push(arg.id());
                        let resolved = bound.resolve_within(thread, open);
                        open.pop();
                        resolved
                    }
                    None => self.clone(),
                }
            }
            Value::List(items) => Value::List(
                items.iter().map(|item| item.resolve_within(thread, open)).collect(),
            ),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(key, item)| (key.clone(), item.resolve_within(thread, open)))
                    .collect(),
            ),
            literal => literal.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Arg(a), Value::Arg(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(|item| item.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Map(map) => {
                let entries: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Value::Arg(arg) => write!(f, "{}", arg),
            Value::Opaque(_) => write!(f, "<opaque>"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, item) in map {
                    out.serialize_entry(key, item)?;
                }
                out.end()
            }
            Value::Arg(arg) => serializer.serialize_str(&arg.to_string()),
            Value::Opaque(_) => serializer.serialize_unit(),
        }
    }
}

// `null` is only meaningful as a whole field value: `Option<Value>` takes it
// as `None`, and a null nested in a list or map is rejected.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a boolean, number, string, list or map")
    }
    fn visit_bool<E: de::Error>(self, b: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(b))
    }
    fn visit_i64<E: de::Error>(self, i: i64) -> std::result::Result<Value, E> {
        Ok(Value::Int(i))
    }
    fn visit_u64<E: de::Error>(self, u: u64) -> std::result::Result<Value, E> {
        Ok(i64::try_from(u).map(Value::Int).unwrap_or(Value::Float(u as f64)))
    }
    fn visit_f64<E: de::Error>(self, x: f64) -> std::result::Result<Value, E> {
        Ok(Value::Float(x))
    }
    fn visit_str<E: de::Error>(self, s: &str) -> std::result::Result<Value, E> {
        Ok(Value::Str(Arc::from(s)))
    }
    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Err(E::custom("null is only allowed as a field value"))
    }
    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        self.visit_unit()
    }
    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::List(items))
    }
    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Value, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, item)) = access.next_entry::<String, Value>()? {
            map.insert(key, item);
        }
        Ok(Value::Map(map))
    }
}

// Helper conversions
impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Int(i) }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self { Value::Int(i as i64) }
}
impl From<f64> for Value {
    fn from(x: f64) -> Self { Value::Float(x) }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Str(Arc::from(s)) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::Str(Arc::from(s)) }
}
impl From<Arg> for Value {
    fn from(arg: Arg) -> Self { Value::Arg(arg) }
}
impl From<Opaque> for Value {
    fn from(opaque: Opaque) -> Self { Value::Opaque(opaque) }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self { Value::List(items.into_iter().map(Into::into).collect()) }
}

// ------------- Record -------------
/// A plain key/value scope: the initial input of a thread and the shape of
/// its answers. A key holding `None` is present but null.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Option<Value>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), Some(value.into()));
        self
    }
    pub fn with_null(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key.into(), None);
        self
    }
    pub fn insert(&mut self, key: impl Into<String>, value: Option<Value>) {
        self.fields.insert(key.into(), value);
    }
    /// The value under `key`, or `None` when the key is absent or null.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).and_then(Option::as_ref)
    }
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }
    pub fn len(&self) -> usize {
        self.fields.len()
    }
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
    /// Parses a JSON object. `null` values become null fields.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
    pub fn to_json(&self) -> serde_json::Value {
        // every key is a string and every leaf serializes infallibly
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl FromIterator<(String, Option<Value>)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Option<Value>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Option<Value>>;
    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let entries: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| match v {
                Some(v) => format!("{}: {}", k, v),
                None => format!("{}: null", k),
            })
            .collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}
