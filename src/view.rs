use crate::arg::Arg;
use crate::error::{ClausalError, Result};
use crate::fieldset::FieldMap;
use crate::predicate::Predicate;
use crate::thread::Thread;
use crate::value::Value;

/// The live view a leaf body works through.
///
/// Reads and writes are forwarded to the thread's current field set under the
/// outer names the leaf's [`FieldMap`] declares, so a body only ever sees its
/// own local names. Nothing is copied: a write is visible to the next read.
pub struct View<'t> {
    thread: &'t mut Thread,
    map: &'t FieldMap,
    predicate: &'t str,
}

impl<'t> View<'t> {
    pub(crate) fn new(thread: &'t mut Thread, map: &'t FieldMap, predicate: &'t str) -> Self {
        Self {
            thread,
            map,
            predicate,
        }
    }

    /// Name of the predicate this view belongs to.
    pub fn predicate(&self) -> &str {
        self.predicate
    }
    pub fn locals(&self) -> impl Iterator<Item = &str> {
        self.map.locals()
    }

    /// The current value of a local, `None` when null or undeclared.
    pub fn get(&self, local: &str) -> Option<Value> {
        let map: &'t FieldMap = self.map;
        self.thread.read_field(map.outer(local)?)
    }
    pub fn set(&mut self, local: &str, value: impl Into<Value>) -> Result<()> {
        let outer = self.outer(local)?;
        self.thread.write_field(outer, Some(value.into()))
    }
    /// Resets a local to null.
    pub fn clear(&mut self, local: &str) -> Result<()> {
        let outer = self.outer(local)?;
        self.thread.write_field(outer, None)
    }
    /// True when the local holds a value that is not an unbound Arg.
    pub fn is_bound(&self, local: &str) -> bool {
        match self.get(local) {
            Some(Value::Arg(arg)) => !arg.is_null(&*self.thread),
            Some(_) => true,
            None => false,
        }
    }
    /// The value of a local with every bound Arg replaced by its value.
    pub fn resolve(&self, local: &str) -> Option<Value> {
        self.get(local).map(|value| value.resolve(&*self.thread))
    }
    /// The Arg held by a local, if it holds one.
    pub fn arg(&self, local: &str) -> Option<Arg> {
        match self.get(local) {
            Some(Value::Arg(arg)) => Some(arg),
            _ => None,
        }
    }

    pub fn read_arg(&self, arg: &Arg) -> Option<Value> {
        arg.read(&*self.thread)
    }
    pub fn write_arg(&mut self, arg: &Arg, value: impl Into<Value>) -> Result<()> {
        arg.write(self.thread, value)
    }
    pub fn clone_arg(&mut self, arg: &Arg) -> Arg {
        arg.clone_in(self.thread)
    }
    /// A copy of `template` whose Args are fresh for the current scope.
    pub fn fresh(&mut self, template: &Value) -> Value {
        template.fresh(self.thread)
    }

    /// Binds the local, or the unbound Arg it holds, to `value`; if it is
    /// already bound, checks that it equals `value` instead. An unbound Arg
    /// given as `value` is bound to the local's value.
    pub fn unify(&mut self, local: &str, value: impl Into<Value>) -> Result<bool> {
        let value = value.into().resolve(&*self.thread);
        let current = self.resolve(local);
        match (current, value) {
            (None, value) => {
                self.set(local, value)?;
                Ok(true)
            }
            (Some(Value::Arg(mine)), Value::Arg(theirs)) if mine == theirs => Ok(true),
            (Some(Value::Arg(mine)), value) => {
                mine.write(self.thread, value)?;
                Ok(true)
            }
            (Some(current), Value::Arg(theirs)) => {
                theirs.write(self.thread, current)?;
                Ok(true)
            }
            (Some(current), value) => Ok(current == value),
        }
    }

    /// Leaves a choice point behind: on backtracking, `alternative` runs in
    /// place of this leaf, followed by whatever was to come after it. It sees
    /// the fields as they are at this call, so writes made before it carry
    /// over and writes made after it do not.
    pub fn else_then(&mut self, alternative: &Predicate) -> Result<()> {
        self.thread.else_then(alternative)
    }
    /// Leaves a choice point that runs this leaf again on backtracking, over
    /// the fields as they are at this call.
    pub fn again(&mut self) -> Result<()> {
        self.thread.again()
    }

    /// The executing thread, for anything the view does not cover.
    pub fn thread(&mut self) -> &mut Thread {
        self.thread
    }

    fn outer(&self, local: &str) -> Result<&'t str> {
        let map: &'t FieldMap = self.map;
        map.outer(local).ok_or_else(|| ClausalError::UndeclaredField {
            predicate: self.predicate.to_string(),
            field: local.to_string(),
        })
    }
}
