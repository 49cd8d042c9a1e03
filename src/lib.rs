//! Clausal – a small backtracking resolution engine over composable predicates.
//!
//! Clausal evaluates *goals* built from leaf functions and the connectives
//! AND, OR and cut, over a scope of named fields that is transactionally
//! undone whenever a goal fails:
//! * An [`arg::Arg`] is a write-once logical variable; backtracking past its
//!   write makes it unbound again.
//! * A [`fieldset::FieldSet`] is a copy-on-write table of named values for one
//!   scope. Field sets are owned by a per-thread [`fieldset::FieldSets`] arena
//!   and addressed by generational ids, so rewinding destroys them in bulk.
//! * A [`predicate::Predicate`] is an immutable template. Leaves declare which
//!   outer fields they see under which local names; composites only schedule
//!   their children.
//! * A [`thread::Thread`] drives one query: it keeps the pending frames, the
//!   history of executed predicates and a LIFO stack of choice points.
//!
//! Failure is a return value, never an error. Errors are reserved for misuse
//! (writing a bound Arg, writing an undeclared field), for asynchronous leaves
//! whose computation broke, and for cancellation and configured limits.
//!
//! ## Modules
//! * [`value`] – Values, value kinds and plain [`value::Record`] scopes.
//! * [`arg`] – Logical variables.
//! * [`fieldset`] – Field sets, their arena and [`fieldset::FieldMap`] renames.
//! * [`predicate`] – Predicate construction and composition.
//! * [`view`] – The view a leaf body reads and writes its locals through.
//! * [`thread`] – The resolution engine.
//! * [`interface`] – Running queries on background threads or tokio tasks.
//! * [`config`] – Engine settings.
//! * [`logging`] – Installing a `tracing` subscriber.
//!
//! ## Quick Start
//! ```
//! use clausal::{FieldMap, Predicate, Record};
//! let big = Predicate::leaf("big", FieldMap::identity(["x"]).unwrap(), |view| {
//!     Ok(view.get("x").and_then(|x| x.as_i64()).is_some_and(|x| x > 10))
//! });
//! let five = Predicate::leaf("five", FieldMap::identity(["x"]).unwrap(), |view| {
//!     Ok(view.get("x").and_then(|x| x.as_i64()) == Some(5))
//! });
//! let answer = big.or(&five).solve(&Record::new().with("x", 5)).unwrap();
//! assert!(answer.is_some());
//! ```
//!
//! ## License
//! Dual licensed under Apache-2.0 and MIT.

pub mod arg;
pub mod config;
pub mod error;
pub mod fieldset;
pub mod interface;
pub mod logging;
pub mod predicate;
pub mod thread;
pub mod value;
pub mod view;

pub use crate::arg::{Arg, ArgId, anonymous, arg};
pub use crate::config::EngineConfig;
pub use crate::error::{ClausalError, Result};
pub use crate::fieldset::{FieldMap, FieldSet, FieldSetId, FieldSets};
pub use crate::interface::{CancelToken, QueryHandle, QueryId, QueryInterface, QueryOptions};
pub use crate::predicate::{BoxError, Predicate, Verdict};
pub use crate::thread::{Solutions, Thread, ThreadState};
pub use crate::value::{Opaque, Record, Value, ValueKind};
pub use crate::view::View;
