// field and overflow lookups use a fast non-cryptographic hasher
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// used to validate field names in maps given by predicate authors
use lazy_static::lazy_static;
use regex::Regex;

// our own stuff that we need
use crate::arg::ArgId;
use crate::error::{ClausalError, Result};
use crate::value::{Record, Value};

pub type FieldHasher = BuildHasherDefault<SeaHasher>;

lazy_static! {
    static ref FIELD_NAME: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

// ------------- Layout -------------
// The predeclared keys of a field set together with the keys they were
// read from in the parent. Shared by every clone of the field set.
#[derive(Debug)]
struct Layout {
    keys: Vec<Arc<str>>,
    source_keys: Vec<Arc<str>>,
    index: HashMap<Arc<str>, usize, FieldHasher>,
}

impl Layout {
    fn new(keys: Vec<Arc<str>>, source_keys: Vec<Arc<str>>) -> Self {
        let index = keys
            .iter()
            .enumerate()
            .map(|(i, key)| (Arc::clone(key), i))
            .collect();
        Self {
            keys,
            source_keys,
            index,
        }
    }
    fn len(&self) -> usize {
        self.keys.len()
    }
}

// ------------- FieldMap -------------
/// Which outer field each local name of a predicate stands for.
///
/// Several locals may alias the same outer name. Locals are unique.
#[derive(Clone, Debug)]
pub struct FieldMap {
    layout: Arc<Layout>,
}

impl FieldMap {
    /// Builds a map from `(local, outer)` pairs.
    pub fn new<I, L, O>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (L, O)>,
        L: AsRef<str>,
        O: AsRef<str>,
    {
        let mut keys: Vec<Arc<str>> = Vec::new();
        let mut source_keys: Vec<Arc<str>> = Vec::new();
        for (local, outer) in pairs {
            let (local, outer) = (local.as_ref(), outer.as_ref());
            for name in [local, outer] {
                if !FIELD_NAME.is_match(name) {
                    return Err(ClausalError::Construction(format!(
                        "'{}' is not a valid field name",
                        name
                    )));
                }
            }
            if keys.iter().any(|key| &**key == local) {
                return Err(ClausalError::Construction(format!(
                    "local field '{}' is declared twice",
                    local
                )));
            }
            keys.push(Arc::from(local));
            source_keys.push(Arc::from(outer));
        }
        Ok(Self {
            layout: Arc::new(Layout::new(keys, source_keys)),
        })
    }
    /// Builds a map in which every name stands for itself.
    pub fn identity<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        Self::new(names.iter().map(|name| (name.as_ref(), name.as_ref())))
    }
    pub fn empty() -> Self {
        Self {
            layout: Arc::new(Layout::new(Vec::new(), Vec::new())),
        }
    }
    /// The outer name a local stands for.
    pub fn outer(&self, local: &str) -> Option<&str> {
        self.layout
            .index
            .get(local)
            .map(|&i| &*self.layout.source_keys[i])
    }
    pub fn locals(&self) -> impl Iterator<Item = &str> {
        self.layout.keys.iter().map(|key| &**key)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.layout
            .keys
            .iter()
            .zip(self.layout.source_keys.iter())
            .map(|(local, outer)| (&**local, &**outer))
    }
    pub fn len(&self) -> usize {
        self.layout.len()
    }
    pub fn is_empty(&self) -> bool {
        self.layout.len() == 0
    }
}

impl Default for FieldMap {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let entries: Vec<String> = self
            .iter()
            .map(|(local, outer)| {
                if local == outer {
                    local.to_string()
                } else {
                    format!("{}={}", local, outer)
                }
            })
            .collect();
        write!(f, "{}", entries.join(", "))
    }
}

// ------------- Overflow -------------
// Keys introduced after construction: named fields nobody declared, Arg
// bindings and the links left behind by Arg::clone_in.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Slot<'a> {
    Name(&'a str),
    Arg(ArgId),
    Link(ArgId),
}

#[derive(Clone, Debug, Default)]
struct Overflow {
    names: Vec<Arc<str>>,
    name_index: HashMap<Arc<str>, usize, FieldHasher>,
    arg_index: HashMap<ArgId, usize, FieldHasher>,
    link_index: HashMap<ArgId, usize, FieldHasher>,
    len: usize,
}

impl Overflow {
    fn get(&self, slot: Slot) -> Option<usize> {
        match slot {
            Slot::Name(name) => self.name_index.get(name).copied(),
            Slot::Arg(id) => self.arg_index.get(&id).copied(),
            Slot::Link(id) => self.link_index.get(&id).copied(),
        }
    }
    fn insert(&mut self, slot: Slot) -> usize {
        let position = self.len;
        match slot {
            Slot::Name(name) => {
                let name: Arc<str> = Arc::from(name);
                self.names.push(Arc::clone(&name));
                self.name_index.insert(name, position);
            }
            Slot::Arg(id) => {
                self.arg_index.insert(id, position);
            }
            Slot::Link(id) => {
                self.link_index.insert(id, position);
            }
        }
        self.len += 1;
        position
    }
}

// ------------- FieldSet -------------
/// A versioned table of named values for one scope.
///
/// Cloning is structural and cheap: the clone shares its values with the
/// original until either of them is written, at which point the writer copies
/// them. An archived snapshot therefore never observes later writes.
#[derive(Clone, Debug)]
pub struct FieldSet {
    layout: Arc<Layout>,
    values: Arc<Vec<Option<Value>>>,
    overflow: Arc<Overflow>,
    next: Option<FieldSetId>,
}

impl FieldSet {
    /// A top-level field set holding every key of `scope`.
    pub fn from_scope(scope: &Record) -> Self {
        let keys: Vec<Arc<str>> = scope.keys().map(Arc::from).collect();
        let values = scope.iter().map(|(_, value)| value.cloned()).collect();
        Self {
            layout: Arc::new(Layout::new(keys.clone(), keys)),
            values: Arc::new(values),
            overflow: Arc::default(),
            next: None,
        }
    }

    pub fn read(&self, key: &str) -> Option<&Value> {
        self.read_slot(Slot::Name(key))
    }
    pub fn write(&mut self, key: &str, value: Option<Value>) {
        self.write_slot(Slot::Name(key), value)
    }

    pub(crate) fn read_slot(&self, slot: Slot) -> Option<&Value> {
        let position = self.position(slot)?;
        self.values.get(position).and_then(Option::as_ref)
    }
    pub(crate) fn write_slot(&mut self, slot: Slot, value: Option<Value>) {
        let position = match self.position(slot) {
            Some(position) => position,
            None => self.layout.len() + Arc::make_mut(&mut self.overflow).insert(slot),
        };
        let values = Arc::make_mut(&mut self.values);
        if position >= values.len() {
            values.resize(position + 1, None);
        }
        values[position] = value;
    }

    fn position(&self, slot: Slot) -> Option<usize> {
        if let Slot::Name(name) = slot {
            if let Some(&i) = self.layout.index.get(name) {
                return Some(i);
            }
        }
        self.overflow.get(slot).map(|i| self.layout.len() + i)
    }

    /// The predeclared keys, in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.layout.keys.iter().map(|key| &**key)
    }
    /// The enclosing scope, if any.
    pub fn next(&self) -> Option<FieldSetId> {
        self.next
    }

    /// Snapshot of the predeclared keys and of any named keys introduced
    /// since. Arg bindings are not part of the answer.
    pub fn result(&self) -> Record {
        let mut answer = Record::new();
        for key in self.layout.keys.iter().chain(self.overflow.names.iter()) {
            answer.insert(key.to_string(), self.read(key).cloned());
        }
        answer
    }
}

// ------------- FieldSets -------------
/// Handle to a field set kept by a [`FieldSets`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldSetId {
    index: usize,
    epoch: u64,
}

#[derive(Debug)]
struct Kept {
    set: FieldSet,
    epoch: u64,
}

/// The arena owning every field set of one thread.
///
/// Field sets are only ever appended. Rewinding destroys everything kept after
/// a watermark; handles to destroyed field sets carry a stale epoch and read
/// as null from then on.
#[derive(Debug, Default)]
pub struct FieldSets {
    kept: Vec<Kept>,
    epoch: u64,
}

impl FieldSets {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn keep(&mut self, set: FieldSet) -> FieldSetId {
        let id = FieldSetId {
            index: self.kept.len(),
            epoch: self.epoch,
        };
        self.kept.push(Kept {
            set,
            epoch: self.epoch,
        });
        id
    }
    /// `None` once the field set has been destroyed.
    pub fn get(&self, id: FieldSetId) -> Option<&FieldSet> {
        self.kept
            .get(id.index)
            .filter(|kept| kept.epoch == id.epoch)
            .map(|kept| &kept.set)
    }
    fn get_mut(&mut self, id: FieldSetId) -> Result<&mut FieldSet> {
        self.kept
            .get_mut(id.index)
            .filter(|kept| kept.epoch == id.epoch)
            .map(|kept| &mut kept.set)
            .ok_or_else(|| ClausalError::Invariant("write into a destroyed field set".to_string()))
    }
    fn live(&self, id: FieldSetId) -> Result<&FieldSet> {
        self.get(id)
            .ok_or_else(|| ClausalError::Invariant("use of a destroyed field set".to_string()))
    }
    pub fn is_destroyed(&self, id: FieldSetId) -> bool {
        self.get(id).is_none()
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    pub fn read(&self, id: FieldSetId, key: &str) -> Option<&Value> {
        self.get(id)?.read(key)
    }
    pub fn write(&mut self, id: FieldSetId, key: &str, value: Option<Value>) -> Result<()> {
        self.get_mut(id)?.write(key, value);
        Ok(())
    }
    pub(crate) fn read_slot(&self, id: FieldSetId, slot: Slot) -> Option<&Value> {
        self.get(id)?.read_slot(slot)
    }
    pub(crate) fn write_slot(&mut self, id: FieldSetId, slot: Slot, value: Option<Value>) -> Result<()> {
        self.get_mut(id)?.write_slot(slot, value);
        Ok(())
    }

    /// Keeps a structural clone of `id`; the original stays as it is.
    pub fn clone_set(&mut self, id: FieldSetId) -> Result<FieldSetId> {
        let clone = self.live(id)?.clone();
        Ok(self.keep(clone))
    }

    /// Enters a nested scope whose locals start out with the values `next`
    /// holds under their outer names.
    pub fn push(&mut self, map: &FieldMap, next: FieldSetId) -> Result<FieldSetId> {
        let parent = self.live(next)?;
        let values = map
            .layout
            .source_keys
            .iter()
            .map(|key| parent.read(key).cloned())
            .collect();
        let child = FieldSet {
            layout: Arc::clone(&map.layout),
            values: Arc::new(values),
            overflow: Arc::default(),
            next: Some(next),
        };
        Ok(self.keep(child))
    }

    /// Leaves a nested scope: writes its current values back into a clone of
    /// the enclosing field set under the enclosing set's own names.
    pub fn pop(&mut self, id: FieldSetId) -> Result<FieldSetId> {
        let child = self.live(id)?;
        let next = child.next.ok_or_else(|| {
            ClausalError::Invariant("pop of a top-level field set".to_string())
        })?;
        let mut restored = self.live(next)?.clone();
        for (key, source_key) in child.layout.keys.iter().zip(child.layout.source_keys.iter()) {
            let value = child.read(key).cloned();
            // a null the caller never had stays out of its scope
            if value.is_none() && restored.position(Slot::Name(source_key)).is_none() {
                continue;
            }
            restored.write(source_key, value);
        }
        Ok(self.keep(restored))
    }

    /// The answer held by `id`; empty once destroyed.
    pub fn result(&self, id: FieldSetId) -> Record {
        self.get(id).map(FieldSet::result).unwrap_or_default()
    }

    /// Destroys every field set kept at or after `watermark` and returns how
    /// many were destroyed.
    pub fn destroy_from(&mut self, watermark: usize) -> usize {
        let destroyed = self.kept.len().saturating_sub(watermark);
        if destroyed > 0 {
            self.kept.truncate(watermark);
            self.epoch += 1;
        }
        destroyed
    }
}
