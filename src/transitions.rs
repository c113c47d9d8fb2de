// File: src/transitions.rs
//
// Multi-step interpolations that drive world-state animations and
// synchronize with interpreter suspend/resume. `add` schedules one processor
// work item that runs `on_start`, then keeps re-scheduling itself (mirroring
// the scheduler's own `InterpreterWork` self-rescheduling hook) to drive
// `on_update` once per tick until `progress` reaches `total_steps`, then
// `on_complete` and removal. All callbacks run on the simulation thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::processor::Processor;

/// Callbacks a transition invokes at each stage. `current` is mutated by
/// `on_update` in place; the engine never inspects its contents, only tracks
/// step counts.
pub struct Transition<T> {
    pub name: String,
    pub total_steps: u32,
    pub progress: u32,
    pub current: T,
    pub on_start: Box<dyn FnMut(&mut T)>,
    pub on_update: Box<dyn FnMut(&mut T, u32, u32)>,
    pub on_complete: Box<dyn FnMut(&mut T)>,
}

impl<T> Transition<T> {
    pub fn new(
        name: impl Into<String>,
        total_steps: u32,
        initial: T,
        on_start: impl FnMut(&mut T) + 'static,
        on_update: impl FnMut(&mut T, u32, u32) + 'static,
        on_complete: impl FnMut(&mut T) + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            total_steps,
            progress: 0,
            current: initial,
            on_start: Box::new(on_start),
            on_update: Box::new(on_update),
            on_complete: Box::new(on_complete),
        }
    }
}

/// Owns every in-flight transition by name. Not thread-safe by design -- the
/// simulation thread is the only caller (spec's concurrency model).
#[derive(Default)]
pub struct TransitionEngine<T> {
    active: HashMap<String, Transition<T>>,
}

impl<T> TransitionEngine<T> {
    pub fn new() -> Self {
        Self { active: HashMap::new() }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    pub fn progress_of(&self, name: &str) -> Option<u32> {
        self.active.get(name).map(|t| t.progress)
    }
}

/// Adds `transition` and schedules its full `start -> update* -> complete`
/// lifecycle on `processor` as queued work items -- `on_start` runs on the
/// processor's own schedule (one tick out), not synchronously on the
/// caller's stack, per the tick processor's "every callback runs as a work
/// item" discipline. `engine` is shared (`Rc<RefCell<..>>`) because the
/// processor work items driving this transition outlive the call to `add`
/// and must keep reaching back into the engine on every tick.
pub fn add<T: 'static>(
    engine: Rc<RefCell<TransitionEngine<T>>>,
    processor: &mut Processor,
    transition: Transition<T>,
) {
    let name = transition.name.clone();
    engine.borrow_mut().active.insert(name.clone(), transition);
    schedule_start(Rc::clone(&engine), processor, name.clone());
    schedule_drive(engine, processor, name);
}

fn schedule_start<T: 'static>(engine: Rc<RefCell<TransitionEngine<T>>>, processor: &mut Processor, name: String) {
    processor.add_work(1, 0.0, false, move || {
        let mut eng = engine.borrow_mut();
        if let Some(t) = eng.active.get_mut(&name) {
            (t.on_start)(&mut t.current);
        }
        Ok(false)
    });
}

fn schedule_drive<T: 'static>(engine: Rc<RefCell<TransitionEngine<T>>>, processor: &mut Processor, name: String) {
    processor.add_work(2, 0.0, false, move || {
        let mut eng = engine.borrow_mut();
        let still_running = match eng.active.get_mut(&name) {
            Some(t) if t.progress < t.total_steps => {
                (t.on_update)(&mut t.current, t.progress, t.total_steps);
                t.progress += 1;
                true
            }
            Some(_) => false,
            None => false,
        };
        if !still_running {
            if let Some(mut t) = eng.active.remove(&name) {
                (t.on_complete)(&mut t.current);
            }
        }
        Ok(still_running)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Processor;

    #[test]
    fn transition_runs_through_its_full_step_count_then_completes() {
        let engine = Rc::new(RefCell::new(TransitionEngine::<i32>::new()));
        let mut proc = Processor::new(10.0);

        let started = Rc::new(RefCell::new(false));
        let updates = Rc::new(RefCell::new(0));
        let completed = Rc::new(RefCell::new(false));

        let t = {
            let started = Rc::clone(&started);
            let updates = Rc::clone(&updates);
            let completed = Rc::clone(&completed);
            Transition::new(
                "move",
                3,
                0,
                move |_| *started.borrow_mut() = true,
                move |_, _, _| *updates.borrow_mut() += 1,
                move |_| *completed.borrow_mut() = true,
            )
        };

        add(Rc::clone(&engine), &mut proc, t);
        // `on_start` is a queued work item, not run inline on this stack.
        assert!(!*started.borrow());
        assert!(engine.borrow().contains("move"));

        for _ in 0..5 {
            proc.process_tick().unwrap();
        }

        assert!(*started.borrow());
        assert_eq!(*updates.borrow(), 3);
        assert!(*completed.borrow());
        assert!(!engine.borrow().contains("move"));
    }

    #[test]
    fn progress_of_reports_current_step_count() {
        let engine = Rc::new(RefCell::new(TransitionEngine::<i32>::new()));
        let mut proc = Processor::new(10.0);
        let t = Transition::new("anim", 2, 0, |_| {}, |_, _, _| {}, |_| {});
        add(Rc::clone(&engine), &mut proc, t);
        assert_eq!(engine.borrow().progress_of("anim"), Some(0));
        proc.process_tick().unwrap(); // runs on_start
        assert_eq!(engine.borrow().progress_of("anim"), Some(0));
        proc.process_tick().unwrap(); // first update
        assert_eq!(engine.borrow().progress_of("anim"), Some(1));
    }
}
