use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;

use crate::error::Result;
use crate::thread::Thread;
use crate::value::{Value, ValueKind};

// ------------- ArgId -------------
/// Identity of an Arg instance. Names need not be unique, ids are.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgId(u64);

impl ArgId {
    pub const ANONYMOUS: ArgId = ArgId(0);

    fn generate() -> Self {
        Self(NEXT_ARG.fetch_add(1, Ordering::Relaxed))
    }
}

static NEXT_ARG: AtomicU64 = AtomicU64::new(1);

lazy_static! {
    static ref ANONYMOUS: Arg = Arg {
        id: ArgId::ANONYMOUS,
        name: Arc::from("_"),
        kind: ValueKind::Any,
    };
}

// ------------- Arg -------------
/// A named logical variable.
///
/// An Arg holds no state of its own. Its binding lives in the field set of the
/// thread that wrote it, so rewinding past the write makes it unbound again.
/// It is write-once: a second write without an intervening rewind is an
/// [`AlreadyBound`](crate::error::ClausalError::AlreadyBound) error.
///
/// The anonymous Arg `_` is always unbound and silently drops writes.
#[derive(Clone, Debug)]
pub struct Arg {
    id: ArgId,
    name: Arc<str>,
    kind: ValueKind,
}

impl Arg {
    /// Creates a fresh Arg. The name `_` yields the anonymous Arg.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self::typed(name, ValueKind::Any)
    }
    pub fn typed(name: impl AsRef<str>, kind: ValueKind) -> Self {
        let name = name.as_ref();
        if name == "_" {
            return Self::anonymous();
        }
        Self {
            id: ArgId::generate(),
            name: Arc::from(name),
            kind,
        }
    }
    pub fn anonymous() -> Self {
        ANONYMOUS.clone()
    }
    pub fn id(&self) -> ArgId {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> ValueKind {
        self.kind
    }
    pub fn is_anonymous(&self) -> bool {
        self.id == ArgId::ANONYMOUS
    }

    pub fn is_null(&self, thread: &Thread) -> bool {
        self.read(thread).is_none()
    }
    pub fn read(&self, thread: &Thread) -> Option<Value> {
        if self.is_anonymous() {
            return None;
        }
        thread.read_arg(self)
    }
    pub fn write(&self, thread: &mut Thread, value: impl Into<Value>) -> Result<()> {
        if self.is_anonymous() {
            return Ok(());
        }
        thread.write_arg(self, value.into())
    }

    /// The Arg standing for this one in the thread's current scope.
    ///
    /// Cloning twice in the same scope returns the same instance; the first
    /// clone is a fresh, unbound Arg under the same name.
    pub fn clone_in(&self, thread: &mut Thread) -> Arg {
        if self.is_anonymous() {
            return self.clone();
        }
        thread.clone_arg(self)
    }

    pub(crate) fn sibling(&self) -> Arg {
        Self {
            id: ArgId::generate(),
            name: Arc::clone(&self.name),
            kind: self.kind,
        }
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Arg {}
impl Hash for Arg {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_anonymous() {
            write!(f, "_")
        } else {
            write!(f, "?{}", self.name)
        }
    }
}

/// Shorthand for [`Arg::new`].
pub fn arg(name: impl AsRef<str>) -> Arg {
    Arg::new(name)
}

/// The wildcard Arg.
pub fn anonymous() -> Arg {
    Arg::anonymous()
}
