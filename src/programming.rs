// File: src/programming.rs
//
// Binds players to scheduled contexts: owns per-player globals, injects
// per-player built-ins, compiles source and synthetic event calls, and
// mediates suspend/resume between scripts and the rest of the engine.
// Grounded in the `compile`/`execute`/`emit_event`/`suspend_player`/
// `resume_player`/`has_callable` surface laid out for this component.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins::{player_builtins, WorldHandle};
use crate::bytecode::Instruction;
use crate::compiler::Compiler;
use crate::errors::ProboticsError;
use crate::interpreter::frame::{new_scope, ScopeVars};
use crate::interpreter::value::Value;
use crate::interpreter::{ExecutionContext, OnBreak, OnComplete, OnException, OnResult};
use crate::processor::Processor;
use crate::scheduler::Scheduler;
use crate::transitions::TransitionEngine;

pub(crate) fn context_name(player: &str) -> String {
    format!("player:{player}")
}

/// Optional host callbacks an `execute` caller may supply; all default to "do
/// nothing" so one-off scripted calls don't have to wire up every hook.
#[derive(Default)]
pub struct ExecuteCallbacks {
    pub on_result: Option<OnResult>,
    pub on_exception: Option<OnException>,
    pub on_break: Option<OnBreak>,
    pub on_complete: Option<OnComplete>,
}

pub struct ProgrammingService {
    world: WorldHandle,
    globals: HashMap<String, ScopeVars>,
    builtins: HashMap<String, ScopeVars>,
    transitions: Rc<RefCell<TransitionEngine<()>>>,
    /// Whether a self-rescheduling processor work item is currently draining
    /// a scheduler on our behalf -- `execute`/`emit_event` re-arm this only
    /// when it has gone quiet, so repeated calls don't pile up duplicate
    /// drivers on the processor's queue.
    driving: Rc<RefCell<bool>>,
}

impl ProgrammingService {
    pub fn new(world: WorldHandle) -> Self {
        Self {
            world,
            globals: HashMap::new(),
            builtins: HashMap::new(),
            transitions: Rc::new(RefCell::new(TransitionEngine::new())),
            driving: Rc::new(RefCell::new(false)),
        }
    }

    pub fn compile(&self, source: &str) -> Result<Vec<Instruction>, ProboticsError> {
        Compiler::compile_source(source)
    }

    fn globals_for(&mut self, player: &str, replace: bool) -> ScopeVars {
        if replace || !self.globals.contains_key(player) {
            self.globals.insert(player.to_string(), new_scope());
        }
        Rc::clone(self.globals.get(player).expect("just inserted"))
    }

    fn builtins_for(&mut self, player: &str, scheduler: &Rc<RefCell<Scheduler>>, processor: &Rc<RefCell<Processor>>) -> ScopeVars {
        if !self.builtins.contains_key(player) {
            let scope = player_builtins(
                Rc::clone(&self.world),
                player.to_string(),
                Rc::clone(processor),
                Rc::clone(&self.transitions),
                Rc::clone(scheduler),
            );
            self.builtins.insert(player.to_string(), scope);
        }
        Rc::clone(self.builtins.get(player).expect("just inserted"))
    }

    /// Constructs a context for `ops` and schedules it. `replace_program`
    /// names the context `player:<id>` (evicting the player's prior named
    /// context via the scheduler's single-context invariant); otherwise the
    /// context is anonymous and coexists with the named one (REPL-style
    /// one-off expressions). Also ensures the scheduler's own driving work
    /// item is queued on `processor` (spec §4.7), so a host that only calls
    /// `execute` and then ticks the processor sees the script actually run.
    pub fn execute(
        &mut self,
        scheduler: &Rc<RefCell<Scheduler>>,
        processor: &Rc<RefCell<Processor>>,
        ops: Vec<Instruction>,
        player: &str,
        replace_program: bool,
        replace_globals: bool,
        callbacks: ExecuteCallbacks,
    ) {
        let globals = self.globals_for(player, replace_globals);
        let builtins = self.builtins_for(player, scheduler, processor);

        let mut ctx = ExecutionContext::new(ops, builtins, globals);
        if replace_program {
            ctx = ctx.named(context_name(player));
        }
        ctx.on_result = callbacks.on_result;
        ctx.on_exception = callbacks.on_exception;
        ctx.on_break = callbacks.on_break;
        ctx.on_complete = callbacks.on_complete;

        scheduler.borrow_mut().add(ctx);
        self.ensure_driving(scheduler, processor);
    }

    /// Queues the scheduler's self-rescheduling `InterpreterWork` item
    /// (spec §4.5) unless one is already running. The item calls
    /// `scheduler.execute_next()` once per tick and keeps rescheduling
    /// itself as long as it found something to dispatch, or as long as a
    /// stopped context is still waiting on a transition to resume it.
    fn ensure_driving(&self, scheduler: &Rc<RefCell<Scheduler>>, processor: &Rc<RefCell<Processor>>) {
        if *self.driving.borrow() {
            return;
        }
        *self.driving.borrow_mut() = true;
        let scheduler = Rc::clone(scheduler);
        let driving = Rc::clone(&self.driving);
        processor.borrow_mut().add_work(1, 0.0, true, move || {
            let dispatched = scheduler.borrow_mut().execute_next();
            // Keep rescheduling while anything is merely stopped too -- a
            // context parked on `wait()` has a transition in flight that
            // will resume it, and nothing else re-arms this work item.
            let keep_driving = dispatched || scheduler.borrow().has_pending();
            if !keep_driving {
                *driving.borrow_mut() = false;
            }
            Ok(keep_driving)
        });
    }

    /// Compiles `name()`, splices in a `PushImmediate` for each value in
    /// `args` between the callee lookup and the `Call`, and fixes up the
    /// `Call`'s argument count. Silently drops the event if the player's
    /// named context is already running, so events act as an idle hook
    /// rather than a preemption.
    pub fn emit_event(
        &mut self,
        scheduler: &Rc<RefCell<Scheduler>>,
        processor: &Rc<RefCell<Processor>>,
        name: &str,
        player: &str,
        args: Vec<Value>,
    ) -> Result<(), ProboticsError> {
        if scheduler.borrow().contains_name(&context_name(player)) {
            return Ok(());
        }

        let mut ops = Compiler::compile_source(&format!("{name}()"))?;
        let call_idx = ops
            .iter()
            .position(|op| matches!(op, Instruction::Call(_, _)))
            .ok_or_else(|| ProboticsError::compile("emit_event: synthetic call missing Call instruction", crate::errors::SourceLocation::unknown()))?;

        let num_args = args.len();
        for (offset, value) in args.into_iter().enumerate() {
            ops.insert(call_idx + offset, Instruction::PushImmediate(value));
        }
        let call_idx = call_idx + num_args;
        if let Instruction::Call(_, local) = &ops[call_idx] {
            let local = *local;
            ops[call_idx] = Instruction::Call(num_args, local);
        }

        self.execute(scheduler, processor, ops, player, false, false, ExecuteCallbacks::default());
        Ok(())
    }

    pub fn suspend_player(&self, scheduler: &Rc<RefCell<Scheduler>>, player: &str) {
        scheduler.borrow_mut().stop(&context_name(player));
    }

    pub fn resume_player(&self, scheduler: &Rc<RefCell<Scheduler>>, player: &str) {
        scheduler.borrow_mut().resume(&context_name(player));
    }

    pub fn has_callable(&self, player: &str, name: &str) -> bool {
        self.globals
            .get(player)
            .map(|g| matches!(g.borrow().get(name), Some(Value::Block(_))))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Grid;

    fn service() -> ProgrammingService {
        ProgrammingService::new(Rc::new(RefCell::new(Grid::new(10, 10))))
    }

    fn rig() -> (Rc<RefCell<Scheduler>>, Rc<RefCell<Processor>>) {
        (Rc::new(RefCell::new(Scheduler::new())), Rc::new(RefCell::new(Processor::new(10.0))))
    }

    fn run_to_completion(scheduler: &Rc<RefCell<Scheduler>>, processor: &Rc<RefCell<Processor>>) {
        for _ in 0..64 {
            processor.borrow_mut().process_tick().unwrap();
            if scheduler.borrow().is_empty() {
                break;
            }
        }
    }

    #[test]
    fn execute_installs_a_named_context_per_player() {
        let mut svc = service();
        let (scheduler, processor) = rig();
        let ops = svc.compile("1 + 1").unwrap();
        svc.execute(&scheduler, &processor, ops, "alice", true, true, ExecuteCallbacks::default());
        assert!(scheduler.borrow().contains_name(&context_name("alice")));
    }

    #[test]
    fn has_callable_reflects_globals_after_a_block_assignment() {
        let mut svc = service();
        let (scheduler, processor) = rig();
        let ops = svc.compile("greet := () { 1 }").unwrap();
        let result = Rc::new(RefCell::new(None));
        let result_for_cb = Rc::clone(&result);
        let callbacks = ExecuteCallbacks {
            on_result: Some(Box::new(move |v| *result_for_cb.borrow_mut() = v)),
            ..Default::default()
        };
        svc.execute(&scheduler, &processor, ops, "bob", true, true, callbacks);
        run_to_completion(&scheduler, &processor);
        assert!(svc.has_callable("bob", "greet"));
    }

    #[test]
    fn emit_event_is_dropped_while_named_context_is_running() {
        let mut svc = service();
        let (scheduler, processor) = rig();
        // An unfinished context: a block call that never returns via normal
        // completion within one `execute_next` still counts as "running"
        // because it stays in the scheduler until finished.
        let ops = svc.compile("while true { next }").unwrap();
        svc.execute(&scheduler, &processor, ops, "carol", true, true, ExecuteCallbacks::default());
        assert!(scheduler.borrow().contains_name(&context_name("carol")));
        // Still runnable after one slice, so the event should be dropped.
        scheduler.borrow_mut().execute_next();
        let result = svc.emit_event(&scheduler, &processor, "on_tick", "carol", vec![]);
        assert!(result.is_ok());
    }

    #[test]
    fn execute_ensures_a_driving_work_item_without_external_ticking_calls() {
        let mut svc = service();
        let (scheduler, processor) = rig();
        let ops = svc.compile("1 + 1").unwrap();
        let result = Rc::new(RefCell::new(None));
        let result_for_cb = Rc::clone(&result);
        let callbacks = ExecuteCallbacks {
            on_result: Some(Box::new(move |v| *result_for_cb.borrow_mut() = v)),
            ..Default::default()
        };
        svc.execute(&scheduler, &processor, ops, "dana", true, true, callbacks);
        // Nothing drives the scheduler except ticking the processor itself.
        for _ in 0..4 {
            processor.borrow_mut().process_tick().unwrap();
        }
        assert_eq!(*result.borrow(), Some(Value::Int(2)));
    }
}
