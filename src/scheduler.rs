// File: src/scheduler.rs
//
// Round-robin fair runner over many execution contexts. Holds two lists,
// runnable and stopped; `execute_next` rotates the head of runnable, runs one
// slice of its work, and re-files it according to what that slice left
// behind. No priorities -- fairness comes entirely from FIFO rotation.

use crate::interpreter::ExecutionContext;

/// A scheduled context plus the name it is filed under, if any. Anonymous
/// contexts (REPL expressions, events) have no name and can coexist with a
/// named context for the same player.
pub struct Scheduled {
    pub name: Option<String>,
    pub context: ExecutionContext,
}

#[derive(Default)]
pub struct Scheduler {
    runnable: Vec<Scheduled>,
    stopped: Vec<Scheduled>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { runnable: Vec::new(), stopped: Vec::new() }
    }

    /// Appends to runnable. If this context is named, evicts any existing
    /// context under that name from either list first (spec's
    /// single-context-per-player invariant).
    pub fn add(&mut self, context: ExecutionContext) {
        let name = context.name.clone();
        if name.is_some() {
            self.remove(name.as_deref().unwrap());
        }
        self.runnable.push(Scheduled { name, context });
    }

    /// Deletes the named context from either list, wherever it currently is.
    pub fn remove(&mut self, name: &str) {
        self.runnable.retain(|s| s.name.as_deref() != Some(name));
        self.stopped.retain(|s| s.name.as_deref() != Some(name));
    }

    /// Moves a named context from runnable to stopped.
    pub fn stop(&mut self, name: &str) {
        if let Some(pos) = self.runnable.iter().position(|s| s.name.as_deref() == Some(name)) {
            let mut scheduled = self.runnable.remove(pos);
            scheduled.context.stopped = true;
            self.stopped.push(scheduled);
        }
    }

    /// Moves a named context from stopped back to runnable, clearing the flag.
    pub fn resume(&mut self, name: &str) {
        if let Some(pos) = self.stopped.iter().position(|s| s.name.as_deref() == Some(name)) {
            let mut scheduled = self.stopped.remove(pos);
            scheduled.context.resume();
            self.runnable.push(scheduled);
        }
    }

    pub fn runnable_count(&self) -> usize {
        self.runnable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runnable.is_empty()
    }

    /// True if any context, runnable or stopped, is still held. A caller
    /// driving the processor to completion should keep ticking as long as
    /// this holds -- a stopped context (e.g. parked on `wait()`) still has a
    /// transition in flight that will eventually resume it.
    pub fn has_pending(&self) -> bool {
        !self.runnable.is_empty() || !self.stopped.is_empty()
    }

    /// True if a named context is currently held, runnable or stopped.
    pub fn contains_name(&self, name: &str) -> bool {
        self.runnable.iter().any(|s| s.name.as_deref() == Some(name))
            || self.stopped.iter().any(|s| s.name.as_deref() == Some(name))
    }

    /// Runs one slice of the head-of-line context. Returns `false` if there
    /// was nothing runnable to dispatch.
    pub fn execute_next(&mut self) -> bool {
        let mut scheduled = match self.runnable_pop_front() {
            Some(s) => s,
            None => return false,
        };
        scheduled.context.execute_next();
        if scheduled.context.is_finished() {
            // dropped: the context completed, nothing further to schedule.
        } else if scheduled.context.stopped {
            self.stopped.push(scheduled);
        } else {
            self.runnable.push(scheduled);
        }
        true
    }

    fn runnable_pop_front(&mut self) -> Option<Scheduled> {
        if self.runnable.is_empty() {
            None
        } else {
            Some(self.runnable.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Instruction;
    use crate::interpreter::frame::new_scope;
    use crate::interpreter::value::Value;

    fn counting_context(name: &str) -> ExecutionContext {
        let globals = new_scope();
        globals.borrow_mut().insert("n".to_string(), Value::Int(0));
        let ops = vec![
            Instruction::PushImmediate(Value::Symbol("n".to_string())),
            Instruction::GetValue("n".to_string()),
            Instruction::PushImmediate(Value::Int(1)),
            Instruction::Addition,
            Instruction::Assignment,
        ];
        ExecutionContext::new(ops, new_scope(), globals).named(name)
    }

    #[test]
    fn fair_rotation_visits_every_context_once_per_n_dispatches() {
        let mut sched = Scheduler::new();
        sched.add(counting_context("a"));
        sched.add(counting_context("b"));
        sched.add(counting_context("c"));

        let mut seen = std::collections::HashSet::new();
        for _ in 0..3 {
            let head_name = sched.runnable.first().unwrap().name.clone();
            seen.insert(head_name);
            sched.execute_next();
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn adding_a_named_context_evicts_the_prior_one() {
        let mut sched = Scheduler::new();
        sched.add(counting_context("p1"));
        sched.add(counting_context("p1"));
        assert_eq!(sched.runnable_count(), 1);
    }

    #[test]
    fn stop_then_resume_moves_between_lists() {
        let mut sched = Scheduler::new();
        sched.add(counting_context("a"));
        sched.stop("a");
        assert_eq!(sched.runnable_count(), 0);
        sched.resume("a");
        assert_eq!(sched.runnable_count(), 1);
    }
}
