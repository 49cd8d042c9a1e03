//! Predicates and the algebra that composes them.
//!
//! A [`Predicate`] is an immutable template. Leaves carry a function together
//! with the [`FieldMap`] that decides which outer fields the function sees and
//! under which local names. Composites only schedule their children on the
//! executing [`Thread`]; they never succeed or fail by themselves.
//!
//! ```
//! use clausal::{FieldMap, Predicate, Record};
//! let sum = Predicate::leaf("sum", FieldMap::identity(["a", "b", "c"]).unwrap(), |view| {
//!     let a = view.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
//!     let b = view.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
//!     view.set("c", a + b)?;
//!     Ok(true)
//! });
//! let answer = sum.solve(&Record::new().with("a", 1).with("b", 2)).unwrap().unwrap();
//! assert_eq!(answer.get("c").and_then(|v| v.as_i64()), Some(3));
//! ```
use std::fmt;
use std::sync::{Arc, OnceLock};

use futures_util::future::{BoxFuture, FutureExt};
use lazy_static::lazy_static;

use crate::error::{ClausalError, Result};
use crate::fieldset::FieldMap;
use crate::thread::Thread;
use crate::value::Record;
use crate::view::View;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The body of a synchronous leaf: `Ok(true)` succeeds, `Ok(false)` fails.
pub type LeafFn = Arc<dyn Fn(&mut View<'_>) -> Result<bool> + Send + Sync>;

/// The body of an asynchronous leaf. It receives a snapshot of its locals and
/// answers with the locals it wants written back, or with failure.
pub type AsyncLeafFn =
    Arc<dyn Fn(Record) -> BoxFuture<'static, std::result::Result<Verdict, BoxError>> + Send + Sync>;

/// Outcome of an asynchronous leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// Succeed, writing back every local in the record that differs from the
    /// snapshot the leaf was given.
    Success(Record),
    Failure,
}

#[derive(Clone)]
pub(crate) enum PredicateKind {
    Truth(bool),
    Leaf { func: LeafFn, map: FieldMap },
    AsyncLeaf { func: AsyncLeafFn, map: FieldMap },
    And { left: Predicate, right: Predicate },
    Or { left: Predicate, right: Predicate },
    Call { body: Predicate, map: FieldMap },
    Ref { body: Arc<OnceLock<Predicate>> },
    Cut,
    PopScope,
}

struct PredicateNode {
    name: Arc<str>,
    kind: PredicateKind,
    hidden: bool,
}

lazy_static! {
    static ref TRUE: Predicate = Predicate::build("true", PredicateKind::Truth(true), false);
    static ref FALSE: Predicate = Predicate::build("false", PredicateKind::Truth(false), false);
    static ref CUT: Predicate = Predicate::build("!", PredicateKind::Cut, false);
    static ref POP_SCOPE: Predicate = Predicate::build("pop", PredicateKind::PopScope, true);
}

/// A shareable, immutable goal.
///
/// Cloning is cheap and the same predicate may be queried by any number of
/// threads at once.
#[derive(Clone)]
pub struct Predicate(Arc<PredicateNode>);

impl Predicate {
    fn build(name: &str, kind: PredicateKind, hidden: bool) -> Self {
        Self(Arc::new(PredicateNode {
            name: Arc::from(name),
            kind,
            hidden,
        }))
    }

    /// A synchronous leaf seeing the fields of `map` under their local names.
    pub fn leaf<F>(name: impl AsRef<str>, map: FieldMap, func: F) -> Self
    where
        F: Fn(&mut View<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        Self::build(
            name.as_ref(),
            PredicateKind::Leaf {
                func: Arc::new(func),
                map,
            },
            false,
        )
    }

    /// An asynchronous leaf. The thread suspends until the future resolves and
    /// nothing is mutated before that.
    pub fn leaf_async<F, Fut>(name: impl AsRef<str>, map: FieldMap, func: F) -> Self
    where
        F: Fn(Record) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<Verdict, BoxError>> + Send + 'static,
    {
        let func: AsyncLeafFn = Arc::new(move |snapshot| func(snapshot).boxed());
        Self::build(name.as_ref(), PredicateKind::AsyncLeaf { func, map }, false)
    }

    pub fn truth(value: bool) -> Self {
        if value { TRUE.clone() } else { FALSE.clone() }
    }
    pub fn succeed() -> Self {
        TRUE.clone()
    }
    pub fn fail() -> Self {
        FALSE.clone()
    }
    /// Commits to every choice made since the enclosing call was entered.
    pub fn cut() -> Self {
        CUT.clone()
    }
    pub(crate) fn pop_scope() -> Self {
        POP_SCOPE.clone()
    }

    /// A named sub-goal running `body` in a nested scope. The body sees the
    /// caller's fields through `map`, and on completion its locals are
    /// written back to the caller under their outer names.
    pub fn call(name: impl AsRef<str>, body: Predicate, map: FieldMap) -> Self {
        Self::build(name.as_ref(), PredicateKind::Call { body, map }, false)
    }

    /// A goal whose body is given later with [`Predicate::define`]. The body
    /// may contain the declared predicate itself, which is how recursive
    /// goals are written. Such a cycle keeps the predicate alive for good.
    ///
    /// ```
    /// use clausal::{FieldMap, Predicate, Record};
    /// let countdown = Predicate::declare("countdown");
    /// let done = Predicate::leaf("done", FieldMap::identity(["n"]).unwrap(), |view| {
    ///     Ok(view.get("n").and_then(|n| n.as_i64()) == Some(0))
    /// });
    /// let tick = Predicate::leaf("tick", FieldMap::identity(["n"]).unwrap(), |view| {
    ///     let n = view.get("n").and_then(|n| n.as_i64()).unwrap_or(0);
    ///     view.set("n", n - 1)?;
    ///     Ok(n > 0)
    /// });
    /// countdown.define(done.or(&tick.and(&countdown))).unwrap();
    /// let answer = countdown.solve(&Record::new().with("n", 3)).unwrap().unwrap();
    /// assert_eq!(answer.get("n").and_then(|n| n.as_i64()), Some(0));
    /// ```
    pub fn declare(name: impl AsRef<str>) -> Self {
        Self::build(
            name.as_ref(),
            PredicateKind::Ref {
                body: Arc::new(OnceLock::new()),
            },
            false,
        )
    }
    /// Gives a declared predicate its body. A declaration is defined once.
    pub fn define(&self, body: Predicate) -> Result<()> {
        let PredicateKind::Ref { body: slot } = &self.0.kind else {
            return Err(ClausalError::Construction(format!(
                "{} is not a declaration",
                self
            )));
        };
        slot.set(body).map_err(|_| {
            ClausalError::Construction(format!("{} is already defined", self))
        })
    }

    /// Runs `self`, then `other`.
    pub fn and(&self, other: &Predicate) -> Self {
        Self::build(
            "and",
            PredicateKind::And {
                left: self.clone(),
                right: other.clone(),
            },
            true,
        )
    }
    /// Runs `self`, and on failure retries from here with `other`.
    pub fn or(&self, other: &Predicate) -> Self {
        Self::build(
            "or",
            PredicateKind::Or {
                left: self.clone(),
                right: other.clone(),
            },
            true,
        )
    }

    /// Conjunction of every predicate, in order. Empty means `true`.
    pub fn all<I: IntoIterator<Item = Predicate>>(predicates: I) -> Self {
        predicates
            .into_iter()
            .reduce(|left, right| left.and(&right))
            .unwrap_or_else(Self::succeed)
    }
    /// Disjunction of every predicate, tried in order. Empty means `false`.
    pub fn any<I: IntoIterator<Item = Predicate>>(predicates: I) -> Self {
        let predicates: Vec<Predicate> = predicates.into_iter().collect();
        predicates
            .into_iter()
            .rev()
            .reduce(|right, left| left.or(&right))
            .unwrap_or_else(Self::fail)
    }

    /// The same goal under another name, shown in stack traces.
    pub fn named(&self, name: impl AsRef<str>) -> Self {
        Self::build(name.as_ref(), self.0.kind.clone(), false)
    }
    /// The same goal, left out of stack traces.
    pub fn hidden(&self) -> Self {
        Self(Arc::new(PredicateNode {
            name: Arc::clone(&self.0.name),
            kind: self.0.kind.clone(),
            hidden: true,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }
    pub fn is_hidden(&self) -> bool {
        self.0.hidden
    }
    pub(crate) fn kind(&self) -> &PredicateKind {
        &self.0.kind
    }

    /// A thread ready to enumerate the answers of this goal over `scope`.
    pub fn query(&self, scope: &Record) -> Thread {
        Thread::new(self.clone(), scope)
    }
    /// The first answer of this goal over `scope`, if any.
    pub fn solve(&self, scope: &Record) -> Result<Option<Record>> {
        self.query(scope).run()
    }
}

impl From<bool> for Predicate {
    fn from(value: bool) -> Self {
        Self::truth(value)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0.kind {
            PredicateKind::Leaf { map, .. }
            | PredicateKind::AsyncLeaf { map, .. }
            | PredicateKind::Call { map, .. } => write!(f, "[Predicate {}({})]", self.0.name, map),
            _ => write!(f, "[Predicate {}]", self.0.name),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
