// File: src/processor.rs
//
// Tick processor: a real-time pacing loop over a priority work queue keyed on
// `(not_before_ticks, id)`. `id` is a monotonic counter so items scheduled for
// the same tick run in insertion order (spec's tick-ordering property). A
// critical item's failure stops the processor; a non-critical failure is
// logged and swallowed, mirroring `processor.py`'s `LOGGER.exception` +
// continue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::errors::ProboticsError;

/// A queued unit of work. The callback returns `Ok(true)` to reschedule
/// itself for the following tick (used by the scheduler's self-rescheduling
/// `InterpreterWork` hook so simulation work is never starved by a fixed
/// priority), `Ok(false)` when it is done, or `Err` on failure.
pub type WorkFn = Box<dyn FnMut() -> Result<bool, ProboticsError>>;

struct WorkItem {
    id: u64,
    not_before_ticks: u64,
    critical: bool,
    callback: WorkFn,
}

/// Ordering is purely on `(not_before_ticks, id)`, reversed so a std
/// `BinaryHeap` (a max-heap) pops the numerically smallest pair first.
impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.not_before_ticks == other.not_before_ticks && self.id == other.id
    }
}
impl Eq for WorkItem {}
impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for WorkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.not_before_ticks, other.id).cmp(&(self.not_before_ticks, self.id))
    }
}

pub struct Processor {
    ticks_per_sec: f64,
    ticks: u64,
    paused: bool,
    stopped: bool,
    next_id: u64,
    queue: BinaryHeap<WorkItem>,
}

impl Processor {
    pub fn new(ticks_per_sec: f64) -> Self {
        Self { ticks_per_sec, ticks: 0, paused: false, stopped: false, next_id: 0, queue: BinaryHeap::new() }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.ticks_per_sec)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        self.queue.clear();
    }

    /// `delay_seconds` is converted to ticks via the configured rate and
    /// added to `delay_ticks`.
    pub fn add_work(
        &mut self,
        delay_ticks: u64,
        delay_seconds: f64,
        critical: bool,
        callback: impl FnMut() -> Result<bool, ProboticsError> + 'static,
    ) -> u64 {
        let extra_ticks = (delay_seconds * self.ticks_per_sec).round() as u64;
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(WorkItem {
            id,
            not_before_ticks: self.ticks + delay_ticks + extra_ticks,
            critical,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes every queued item whose id satisfies `predicate`.
    pub fn cancel_where(&mut self, predicate: impl Fn(u64) -> bool) {
        self.queue.retain(|item| !predicate(item.id));
    }

    /// Pops and runs every item whose `not_before_ticks` has arrived,
    /// in `(not_before_ticks, id)` order. A critical failure stops the
    /// processor and propagates; a non-critical one is logged and the loop
    /// continues with the remaining ready items.
    pub fn process_tick(&mut self) -> Result<(), ProboticsError> {
        self.drain_ready(None)
    }

    /// Like `process_tick`, but stops draining once `deadline` passes even if
    /// ready work remains -- the remainder waits for the following tick
    /// rather than blowing through the real-time pacing budget.
    fn drain_ready(&mut self, deadline: Option<Instant>) -> Result<(), ProboticsError> {
        if self.stopped {
            return Ok(());
        }
        self.ticks += 1;
        while let Some(item) = self.queue.peek() {
            if item.not_before_ticks > self.ticks {
                break;
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    break;
                }
            }
            let mut item = self.queue.pop().expect("peeked item must be present");
            match (item.callback)() {
                Ok(true) => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.queue.push(WorkItem {
                        id,
                        not_before_ticks: self.ticks + 1,
                        critical: item.critical,
                        callback: item.callback,
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    if item.critical {
                        self.stopped = true;
                        self.queue.clear();
                        return Err(e);
                    }
                    eprintln!("probotics: non-critical work item {} failed: {e}", item.id);
                }
            }
        }
        Ok(())
    }

    /// Runs `process_tick` once per `tick_interval`, sleeping out any slack.
    /// While paused, sleeps one interval and re-checks rather than spinning.
    pub fn run_until_stopped(&mut self) -> Result<(), ProboticsError> {
        while !self.stopped {
            let deadline = Instant::now() + self.tick_interval();
            if self.paused {
                std::thread::sleep(self.tick_interval());
                continue;
            }
            self.drain_ready(Some(deadline))?;
            let now = Instant::now();
            if now < deadline {
                std::thread::sleep(deadline - now);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn same_tick_items_run_in_insertion_order() {
        let mut proc = Processor::new(10.0);
        let order = Rc::new(RefCell::new(Vec::new()));

        for n in 0..3 {
            let order = Rc::clone(&order);
            proc.add_work(0, 0.0, false, move || {
                order.borrow_mut().push(n);
                Ok(false)
            });
        }
        proc.process_tick().unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn critical_failure_stops_the_processor() {
        let mut proc = Processor::new(10.0);
        proc.add_work(0, 0.0, true, || Err(ProboticsError::native("boom")));
        let result = proc.process_tick();
        assert!(result.is_err());
        assert!(proc.is_stopped());
    }

    #[test]
    fn non_critical_failure_is_swallowed() {
        let mut proc = Processor::new(10.0);
        let ran = Rc::new(RefCell::new(false));
        proc.add_work(0, 0.0, false, || Err(ProboticsError::native("meh")));
        {
            let ran = Rc::clone(&ran);
            proc.add_work(0, 0.0, false, move || {
                *ran.borrow_mut() = true;
                Ok(false)
            });
        }
        proc.process_tick().unwrap();
        assert!(*ran.borrow());
        assert!(!proc.is_stopped());
    }

    #[test]
    fn self_rescheduling_work_runs_again_next_tick() {
        let mut proc = Processor::new(10.0);
        let calls = Rc::new(RefCell::new(0));
        {
            let calls = Rc::clone(&calls);
            proc.add_work(0, 0.0, true, move || {
                *calls.borrow_mut() += 1;
                Ok(*calls.borrow() < 2)
            });
        }
        proc.process_tick().unwrap();
        assert_eq!(*calls.borrow(), 1);
        proc.process_tick().unwrap();
        assert_eq!(*calls.borrow(), 2);
        proc.process_tick().unwrap();
        assert_eq!(*calls.borrow(), 2);
    }

    #[test]
    fn cancel_where_removes_matching_items() {
        let mut proc = Processor::new(10.0);
        let id = proc.add_work(5, 0.0, false, || Ok(false));
        proc.cancel_where(|i| i == id);
        for _ in 0..10 {
            proc.process_tick().unwrap();
        }
    }
}
