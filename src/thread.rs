//! The resolution engine.
//!
//! A [`Thread`] owns everything one query mutates: the arena of field sets,
//! the pending frames, the history of executed predicates and the stack of
//! choice points. Frames and history are persistent lists, so a choice point
//! archives them by reference and restoring one is a pointer swap.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, Stream};
use tracing::{debug, trace};

use crate::arg::{Arg, ArgId};
use crate::config::EngineConfig;
use crate::error::{ClausalError, Result};
use crate::fieldset::{FieldHasher, FieldSet, FieldSetId, FieldSets, Slot};
use crate::interface::CancelToken;
use crate::predicate::{BoxError, Predicate, PredicateKind, Verdict};
use crate::value::{Record, Value};
use crate::view::View;

/// Where a thread stands after its latest `run`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    /// Frames are pending.
    Running,
    /// An answer was produced; running again looks for the next one.
    Succeeded,
    /// Every alternative has been exhausted.
    Failed,
    /// Stopped by a cancel token or a deadline.
    Cancelled,
    /// Stopped by an error raised while resolving.
    Errored,
}

impl ThreadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ThreadState::Failed | ThreadState::Cancelled | ThreadState::Errored
        )
    }
}

// ------------- Frames -------------
// `barrier` is the depth of the choice stack when the enclosing clause was
// entered; a cut prunes back to it.
struct Frame {
    predicate: Predicate,
    barrier: usize,
    next: Option<Arc<Frame>>,
}

struct History {
    predicate: Predicate,
    next: Option<Arc<History>>,
}

// Long chains are unlinked iteratively so dropping them cannot overflow the stack.
impl Drop for Frame {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(frame) = next {
            match Arc::try_unwrap(frame) {
                Ok(mut frame) => next = frame.next.take(),
                Err(_) => break,
            }
        }
    }
}

impl Drop for History {
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(entry) = next {
            match Arc::try_unwrap(entry) {
                Ok(mut entry) => next = entry.next.take(),
                Err(_) => break,
            }
        }
    }
}

struct ChoicePoint {
    fields: FieldSetId,
    frame: Option<Arc<Frame>>,
    history: Option<Arc<History>>,
    watermark: usize,
}

enum Step {
    Continue,
    Solved,
    Exhausted,
    Pending(Predicate),
}

// ------------- Thread -------------
/// One resolution attempt of a goal over an initial scope.
pub struct Thread {
    goal: Predicate,
    config: EngineConfig,
    sets: FieldSets,
    fields: FieldSetId,
    frame: Option<Arc<Frame>>,
    history: Option<Arc<History>>,
    choices: Vec<ChoicePoint>,
    arg_homes: HashMap<ArgId, FieldSetId, FieldHasher>,
    state: ThreadState,
    steps: u64,
    cancel: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl Thread {
    pub fn new(goal: Predicate, scope: &Record) -> Self {
        Self::with_config(goal, scope, EngineConfig::default())
    }
    pub fn with_config(goal: Predicate, scope: &Record, config: EngineConfig) -> Self {
        let mut sets = FieldSets::new();
        let fields = sets.keep(FieldSet::from_scope(scope));
        let frame = Some(Arc::new(Frame {
            predicate: goal.clone(),
            barrier: 0,
            next: None,
        }));
        Self {
            goal,
            config,
            sets,
            fields,
            frame,
            history: None,
            choices: Vec::new(),
            arg_homes: HashMap::default(),
            state: ThreadState::Running,
            steps: 0,
            cancel: None,
            deadline: None,
        }
    }
    /// Stops resolution as soon as `token` is cancelled.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn goal(&self) -> &Predicate {
        &self.goal
    }
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    pub fn state(&self) -> ThreadState {
        self.state
    }
    /// Steps taken over the lifetime of the thread.
    pub fn steps(&self) -> u64 {
        self.steps
    }
    /// Number of pending choice points.
    pub fn choice_depth(&self) -> usize {
        self.choices.len()
    }
    pub fn field_sets(&self) -> &FieldSets {
        &self.sets
    }
    pub fn current_fields(&self) -> FieldSetId {
        self.fields
    }
    /// Number of Args bound on the current branch.
    pub fn bound_args(&self) -> usize {
        self.arg_homes.len()
    }
    /// The values currently held by the innermost scope.
    pub fn result(&self) -> Record {
        self.sets.result(self.fields)
    }

    /// Names of the visible predicates executed so far, most recent first.
    pub fn stack_string(&self) -> String {
        let mut names = Vec::new();
        let mut cursor = self.history.as_deref();
        while let Some(entry) = cursor {
            if names.len() >= self.config.stack_trace_depth {
                break;
            }
            if !entry.predicate.is_hidden() {
                names.push(entry.predicate.name().to_string());
            }
            cursor = entry.next.as_deref();
        }
        names.join("\n")
    }

    // ------------- Running -------------
    /// Drives the thread to its next answer.
    ///
    /// Returns `Ok(None)` once no (more) answers exist. Running a thread that
    /// has already answered resumes the search from the latest choice point.
    /// Reaching an asynchronous leaf yields [`ClausalError::Suspended`] and
    /// leaves the thread untouched for [`Thread::run_async`] to continue.
    pub fn run(&mut self) -> Result<Option<Record>> {
        if !self.resume() {
            return Ok(None);
        }
        let start = self.steps;
        loop {
            self.check_limits(start)?;
            match self.step()? {
                Step::Continue => {}
                Step::Solved => return Ok(Some(self.result())),
                Step::Exhausted => return Ok(None),
                Step::Pending(predicate) => {
                    return Err(ClausalError::Suspended {
                        predicate: predicate.name().to_string(),
                    });
                }
            }
        }
    }

    /// Like [`Thread::run`], awaiting asynchronous leaves as they come.
    pub async fn run_async(&mut self) -> Result<Option<Record>> {
        if !self.resume() {
            return Ok(None);
        }
        let start = self.steps;
        loop {
            self.check_limits(start)?;
            match self.step()? {
                Step::Continue => {}
                Step::Solved => return Ok(Some(self.result())),
                Step::Exhausted => return Ok(None),
                Step::Pending(predicate) => {
                    let PredicateKind::AsyncLeaf { func, map } = predicate.kind() else {
                        return Err(ClausalError::Invariant(format!(
                            "{} is not asynchronous",
                            predicate
                        )));
                    };
                    let snapshot: Record = map
                        .iter()
                        .map(|(local, outer)| (local.to_string(), self.read_field(outer)))
                        .collect();
                    let outcome = func(snapshot.clone()).await;
                    self.settle(&predicate, &snapshot, outcome)?;
                }
            }
        }
    }

    /// Every answer, lazily. The iterator ends after the first error.
    pub fn solutions(&mut self) -> Solutions<'_> {
        Solutions {
            thread: self,
            done: false,
        }
    }

    /// Every answer as an asynchronous stream. The stream ends after the
    /// first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Record>> + Send {
        stream::unfold(Some(self), |thread| async move {
            let mut thread = thread?;
            match thread.run_async().await {
                Ok(Some(answer)) => Some((Ok(answer), Some(thread))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    fn resume(&mut self) -> bool {
        match self.state {
            ThreadState::Running => true,
            ThreadState::Succeeded => {
                self.state = ThreadState::Running;
                self.rewind()
            }
            _ => false,
        }
    }

    fn check_limits(&mut self, start: u64) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            self.halt();
            return Err(ClausalError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.halt();
            return Err(ClausalError::TimedOut);
        }
        if let Some(limit) = self.config.max_steps {
            if self.steps - start >= limit {
                return Err(ClausalError::StepLimit { limit });
            }
        }
        Ok(())
    }

    fn halt(&mut self) {
        debug!(target: "clausal::thread", steps = self.steps, choices = self.choices.len(), "thread cancelled");
        self.choices.clear();
        self.frame = None;
        self.state = ThreadState::Cancelled;
    }

    fn errored(&mut self, e: ClausalError) -> ClausalError {
        debug!(target: "clausal::thread", steps = self.steps, error = %e, "thread errored");
        self.state = ThreadState::Errored;
        e
    }

    fn step(&mut self) -> Result<Step> {
        let Some(frame) = self.frame.clone() else {
            self.state = ThreadState::Succeeded;
            debug!(target: "clausal::thread", steps = self.steps, choices = self.choices.len(), "thread succeeded");
            return Ok(Step::Solved);
        };
        let predicate = frame.predicate.clone();
        if matches!(predicate.kind(), PredicateKind::AsyncLeaf { .. }) {
            return Ok(Step::Pending(predicate));
        }
        self.steps += 1;
        if self.config.trace_steps {
            trace!(target: "clausal::thread", step = self.steps, predicate = %predicate.name(), "step");
        }
        match predicate.kind() {
            PredicateKind::Truth(true) => self.advance(&frame),
            PredicateKind::Truth(false) => return Ok(self.fail()),
            PredicateKind::Leaf { func, map } => {
                let outcome = {
                    let mut view = View::new(self, map, predicate.name());
                    func(&mut view)
                };
                match outcome {
                    Ok(true) => self.advance(&frame),
                    Ok(false) => return Ok(self.fail()),
                    Err(e) => return Err(self.errored(e)),
                }
            }
            PredicateKind::AsyncLeaf { .. } => return Ok(Step::Pending(predicate.clone())),
            PredicateKind::And { left, right } => {
                self.record(&predicate);
                let right = Arc::new(Frame {
                    predicate: right.clone(),
                    barrier: frame.barrier,
                    next: frame.next.clone(),
                });
                self.frame = Some(Arc::new(Frame {
                    predicate: left.clone(),
                    barrier: frame.barrier,
                    next: Some(right),
                }));
            }
            PredicateKind::Or { left, right } => {
                self.record(&predicate);
                let alternative = Arc::new(Frame {
                    predicate: right.clone(),
                    barrier: frame.barrier,
                    next: frame.next.clone(),
                });
                if let Err(e) = self.push_choice(alternative) {
                    return Err(self.errored(e));
                }
                self.frame = Some(Arc::new(Frame {
                    predicate: left.clone(),
                    barrier: frame.barrier,
                    next: frame.next.clone(),
                }));
            }
            PredicateKind::Call { body, map } => {
                self.record(&predicate);
                let child = match self.sets.push(map, self.fields) {
                    Ok(child) => child,
                    Err(e) => return Err(self.errored(e)),
                };
                debug!(target: "clausal::thread", predicate = %predicate.name(), depth = self.choices.len(), "scope pushed");
                self.fields = child;
                let pop = Arc::new(Frame {
                    predicate: Predicate::pop_scope(),
                    barrier: frame.barrier,
                    next: frame.next.clone(),
                });
                self.frame = Some(Arc::new(Frame {
                    predicate: body.clone(),
                    barrier: self.choices.len(),
                    next: Some(pop),
                }));
            }
            PredicateKind::Ref { body } => {
                let Some(body) = body.get() else {
                    return Err(self.errored(ClausalError::Invariant(format!(
                        "{} was never defined",
                        predicate
                    ))));
                };
                self.record(&predicate);
                self.frame = Some(Arc::new(Frame {
                    predicate: body.clone(),
                    barrier: frame.barrier,
                    next: frame.next.clone(),
                }));
            }
            PredicateKind::Cut => {
                let pruned = self.choices.len().saturating_sub(frame.barrier);
                self.choices.truncate(frame.barrier);
                debug!(target: "clausal::thread", pruned, "cut");
                self.advance(&frame);
            }
            PredicateKind::PopScope => {
                let parent = match self.sets.pop(self.fields) {
                    Ok(parent) => parent,
                    Err(e) => return Err(self.errored(e)),
                };
                debug!(target: "clausal::thread", "scope popped");
                self.fields = parent;
                self.advance(&frame);
            }
        }
        Ok(Step::Continue)
    }

    fn settle(
        &mut self,
        predicate: &Predicate,
        snapshot: &Record,
        outcome: std::result::Result<Verdict, BoxError>,
    ) -> Result<()> {
        self.steps += 1;
        if self.config.trace_steps {
            trace!(target: "clausal::thread", step = self.steps, predicate = %predicate.name(), "settled");
        }
        let Some(frame) = self.frame.clone() else {
            return Err(self.errored(ClausalError::Invariant(
                "asynchronous leaf settled without a frame".to_string(),
            )));
        };
        let PredicateKind::AsyncLeaf { map, .. } = predicate.kind() else {
            return Err(self.errored(ClausalError::Invariant(format!(
                "{} is not asynchronous",
                predicate
            ))));
        };
        match outcome {
            Ok(Verdict::Success(answer)) => {
                for (local, value) in answer {
                    let Some(outer) = map.outer(&local) else {
                        return Err(self.errored(ClausalError::UndeclaredField {
                            predicate: predicate.name().to_string(),
                            field: local,
                        }));
                    };
                    if snapshot.get(&local) != value.as_ref() {
                        if let Err(e) = self.write_field(outer, value) {
                            return Err(self.errored(e));
                        }
                    }
                }
                self.advance(&frame);
            }
            Ok(Verdict::Failure) => {
                self.fail();
            }
            Err(e) => {
                return Err(self.errored(ClausalError::Rejected {
                    predicate: predicate.name().to_string(),
                    message: e.to_string(),
                }));
            }
        }
        Ok(())
    }

    fn record(&mut self, predicate: &Predicate) {
        self.history = Some(Arc::new(History {
            predicate: predicate.clone(),
            next: self.history.take(),
        }));
    }

    fn advance(&mut self, frame: &Frame) {
        self.record(&frame.predicate);
        self.frame = frame.next.clone();
    }

    fn fail(&mut self) -> Step {
        if self.rewind() {
            Step::Continue
        } else {
            Step::Exhausted
        }
    }

    fn push_choice(&mut self, alternative: Arc<Frame>) -> Result<()> {
        if let Some(limit) = self.config.max_choice_points {
            if self.choices.len() >= limit {
                return Err(ClausalError::Invariant(format!(
                    "more than {} pending choice points",
                    limit
                )));
            }
        }
        let watermark = self.sets.len();
        let original = self.fields;
        self.fields = self.sets.clone_set(original)?;
        self.choices.push(ChoicePoint {
            fields: original,
            frame: Some(alternative),
            history: self.history.clone(),
            watermark,
        });
        debug!(target: "clausal::thread", depth = self.choices.len(), "choice point");
        Ok(())
    }

    /// Restores the latest choice point, destroying every field set created
    /// after it. Returns false, leaving the thread failed, when none is left.
    fn rewind(&mut self) -> bool {
        let Some(choice) = self.choices.pop() else {
            self.frame = None;
            self.state = ThreadState::Failed;
            debug!(target: "clausal::thread", steps = self.steps, "thread failed");
            return false;
        };
        let destroyed = self.sets.destroy_from(choice.watermark);
        let sets = &self.sets;
        self.arg_homes.retain(|_, home| !sets.is_destroyed(*home));
        debug!(target: "clausal::thread", destroyed, depth = self.choices.len(), "rewind");
        self.fields = choice.fields;
        self.frame = choice.frame;
        self.history = choice.history;
        true
    }

    // ------------- Leaf choice points -------------
    /// Makes `alternative`, followed by whatever comes after the executing
    /// leaf, the next thing tried on backtracking. The fields it sees are the
    /// ones held right now.
    pub(crate) fn else_then(&mut self, alternative: &Predicate) -> Result<()> {
        let frame = self.executing()?;
        let alternative = Arc::new(Frame {
            predicate: alternative.clone(),
            barrier: frame.barrier,
            next: frame.next.clone(),
        });
        self.push_choice(alternative)
    }
    /// Makes the executing leaf run again on backtracking.
    pub(crate) fn again(&mut self) -> Result<()> {
        let frame = self.executing()?;
        self.push_choice(frame)
    }
    fn executing(&self) -> Result<Arc<Frame>> {
        self.frame
            .clone()
            .ok_or_else(|| ClausalError::Invariant("no predicate is executing".to_string()))
    }

    // ------------- Fields and Args -------------
    pub(crate) fn read_field(&self, key: &str) -> Option<Value> {
        self.sets.read(self.fields, key).cloned()
    }
    pub(crate) fn write_field(&mut self, key: &str, value: Option<Value>) -> Result<()> {
        self.sets.write(self.fields, key, value)
    }

    pub(crate) fn read_arg(&self, arg: &Arg) -> Option<Value> {
        let home = *self.arg_homes.get(&arg.id())?;
        self.sets.read_slot(home, Slot::Arg(arg.id())).cloned()
    }
    pub(crate) fn write_arg(&mut self, arg: &Arg, value: Value) -> Result<()> {
        if self.read_arg(arg).is_some() {
            return Err(ClausalError::AlreadyBound {
                name: arg.name().to_string(),
            });
        }
        // an Arg aliased back to itself stays unbound
        if self.dereference(value.clone()).as_arg() == Some(arg) {
            return Ok(());
        }
        self.sets.write_slot(self.fields, Slot::Arg(arg.id()), Some(value))?;
        self.arg_homes.insert(arg.id(), self.fields);
        Ok(())
    }
    // Follows a chain of bound Args to its end. Chains never loop since a
    // write closing one is dropped.
    fn dereference(&self, mut value: Value) -> Value {
        while let Value::Arg(arg) = &value {
            match self.read_arg(arg) {
                Some(bound) => value = bound,
                None => break,
            }
        }
        value
    }
    pub(crate) fn clone_arg(&mut self, arg: &Arg) -> Arg {
        if let Some(Value::Arg(existing)) = self.sets.read_slot(self.fields, Slot::Link(arg.id())) {
            return existing.clone();
        }
        let clone = arg.sibling();
        let link = Some(Value::Arg(clone.clone()));
        if let Err(e) = self.sets.write_slot(self.fields, Slot::Link(arg.id()), link) {
            debug!(target: "clausal::thread", error = %e, arg = %arg, "clone link not kept");
        }
        clone
    }
}

// ------------- Solutions -------------
/// Iterator over the answers of a thread.
pub struct Solutions<'t> {
    thread: &'t mut Thread,
    done: bool,
}

impl Iterator for Solutions<'_> {
    type Item = Result<Record>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.thread.state().is_terminal() {
            return None;
        }
        match self.thread.run() {
            Ok(Some(answer)) => Some(Ok(answer)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for Solutions<'_> {}
