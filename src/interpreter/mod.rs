// File: src/interpreter/mod.rs
//
// The execution context: drives one compiled program to completion via a
// frame stack, handling enter/exit-scope, breakpoints, and cooperative
// suspension. This is the inner loop described by the execution core's
// per-frame instruction semantics and driving-loop discipline.

pub mod frame;
pub mod signal;
pub mod value;

use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::{Instruction, NativeOutcome};
use crate::errors::{ErrorKind, ProboticsError};
use frame::{ScopeVars, StackFrame};
use signal::{Breakpoint, Signal};
use value::{PropertyKey, PropertyOwner, Value};

pub type OnResult = Box<dyn FnMut(Option<Value>)>;
pub type OnException = Box<dyn FnMut(&ProboticsError)>;
pub type OnBreak = Box<dyn FnMut(u64)>;
pub type OnComplete = Box<dyn FnMut()>;

/// A scheduled unit of execution wrapping one root instruction sequence and
/// its lexical globals.
pub struct ExecutionContext {
    pub name: Option<String>,
    pub operations: Rc<Vec<Instruction>>,
    pub builtins: ScopeVars,
    pub globals: ScopeVars,
    pub current_frame: Option<Box<StackFrame>>,
    pub stopped: bool,
    pub total_ops: u64,
    pub ops_since_last_yield: u64,
    pub on_result: Option<OnResult>,
    pub on_exception: Option<OnException>,
    pub on_break: Option<OnBreak>,
    pub on_complete: Option<OnComplete>,
}

impl ExecutionContext {
    pub fn new(operations: Vec<Instruction>, builtins: ScopeVars, globals: ScopeVars) -> Self {
        Self {
            name: None,
            operations: Rc::new(operations),
            builtins,
            globals,
            current_frame: None,
            stopped: false,
            total_ops: 0,
            ops_since_last_yield: 0,
            on_result: None,
            on_exception: None,
            on_break: None,
            on_complete: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_finished(&self) -> bool {
        self.stopped && self.current_frame.is_none()
    }

    /// A context that is `stopped` but still holds a frame is cooperatively
    /// parked (e.g. by a blocking native) rather than finished.
    pub fn is_suspended(&self) -> bool {
        self.stopped && self.current_frame.is_some()
    }

    pub fn resume(&mut self) {
        self.stopped = false;
    }

    /// Run one slice of work and yield control back to the scheduler.
    pub fn execute_next(&mut self) {
        if self.stopped {
            return;
        }
        if self.current_frame.is_none() {
            self.current_frame = Some(Box::new(StackFrame::outer(
                Rc::clone(&self.operations),
                Rc::clone(&self.globals),
                Rc::clone(&self.builtins),
            )));
        }
        self.ops_since_last_yield = 0;

        loop {
            let next = { self.current_frame.as_ref().unwrap().next_instruction().cloned() };

            let instr = match next {
                Some(i) => i,
                None => {
                    if self.complete_current_frame() {
                        continue;
                    } else {
                        break;
                    }
                }
            };

            self.total_ops += 1;
            self.ops_since_last_yield += 1;

            let frame = self.current_frame.as_mut().unwrap();
            match execute_instruction(frame, &instr) {
                Ok(None) => {
                    frame.ip += 1;
                }
                Ok(Some(Signal::EnterScope(new_frame))) => {
                    let parent = self.current_frame.take().unwrap();
                    let mut new_frame = new_frame;
                    new_frame.parent = Some(parent);
                    self.current_frame = Some(new_frame);
                }
                Ok(Some(Signal::ExitScope { .. })) => {
                    // Frames only exit normally via completion (handled above);
                    // an instruction never raises this directly.
                    unreachable!("ExitScope is only produced by frame completion")
                }
                Ok(Some(Signal::Breakpoint(bp))) => {
                    if bp.stop {
                        self.stopped = true;
                        break;
                    }
                    match self.unwind_to_catch(bp) {
                        Ok(true) => continue,
                        Ok(false) => {
                            let err = ProboticsError::new(
                                ErrorKind::NativeError,
                                "unhandled breakpoint".to_string(),
                                crate::errors::SourceLocation::unknown(),
                            );
                            self.terminate_with_error(&err);
                            break;
                        }
                        Err(e) => {
                            self.terminate_with_error(&e);
                            break;
                        }
                    }
                }
                Err(e) => {
                    self.terminate_with_error(&e);
                    break;
                }
            }
        }

        if let Some(cb) = self.on_break.as_mut() {
            cb(self.ops_since_last_yield);
        }
    }

    /// The current frame's operations ran out. Per stack discipline the
    /// frame's stack is empty or holds exactly one value (the implicit
    /// result). Returns `true` if a parent frame resumed (caller should keep
    /// looping), `false` if the whole context just finished.
    fn complete_current_frame(&mut self) -> bool {
        let mut frame = self.current_frame.take().unwrap();
        let return_value = if frame.value_stack.len() == 1 { frame.value_stack.pop() } else { None };
        match frame.parent.take() {
            Some(parent) => {
                let mut parent = *parent;
                if let Some(rv) = return_value {
                    parent.push(rv);
                }
                self.current_frame = Some(Box::new(parent));
                true
            }
            None => {
                self.finish(return_value);
                false
            }
        }
    }

    fn finish(&mut self, return_value: Option<Value>) {
        if let Some(cb) = self.on_result.as_mut() {
            cb(return_value);
        }
        self.stopped = true;
        self.current_frame = None;
        if let Some(cb) = self.on_complete.as_mut() {
            cb();
        }
    }

    fn terminate_with_error(&mut self, err: &ProboticsError) {
        if let Some(cb) = self.on_exception.as_mut() {
            cb(err);
        }
        self.stopped = true;
        self.current_frame = None;
    }

    /// Search the parent chain for the nearest frame whose current
    /// instruction is a `Catch` handling `bp.reason`, discarding every frame
    /// in between. Returns `Ok(true)` if handled, `Ok(false)` if no catch
    /// exists anywhere up the chain (an unhandled `break`/`next`, or a stray
    /// `return` at the outermost scope, which this crate treats as a normal
    /// completion rather than an error).
    fn unwind_to_catch(&mut self, bp: Breakpoint) -> Result<bool, ProboticsError> {
        let mut current = self.current_frame.take().unwrap();
        loop {
            match current.parent.take() {
                None => {
                    if bp.reason == "return" {
                        self.finish(bp.value);
                        return Ok(true);
                    }
                    self.current_frame = Some(current);
                    return Ok(false);
                }
                Some(parent) => {
                    let mut parent = *parent;
                    let offset = match parent.next_instruction() {
                        Some(Instruction::Catch(map)) => map.get(&bp.reason).copied(),
                        _ => None,
                    };
                    match offset {
                        Some(offset) => {
                            // Catch offsets are relative to the catch instruction's own
                            // position (unlike Jump/JumpIf, which are relative to the
                            // instruction after them) -- the canonical while-loop catch
                            // map {"break": 2, "next": 1} only resolves correctly this way.
                            let base = parent.ip as isize;
                            parent.ip = resolve_jump(base, offset, parent.operations.len())?;
                            if let Some(v) = bp.value {
                                parent.push(v);
                            }
                            self.current_frame = Some(Box::new(parent));
                            return Ok(true);
                        }
                        None => {
                            current = Box::new(parent);
                        }
                    }
                }
            }
        }
    }
}

fn resolve_jump(base: isize, offset: isize, len: usize) -> Result<usize, ProboticsError> {
    let target = base + offset;
    if target < 0 || target as usize > len {
        return Err(ProboticsError::bad_jump(offset, len));
    }
    Ok(target as usize)
}

/// Execute a single instruction against the current frame. Returns `None` to
/// advance normally, or `Some(signal)` to unwind into the driving loop.
fn execute_instruction(frame: &mut StackFrame, instr: &Instruction) -> Result<Option<Signal>, ProboticsError> {
    match instr {
        Instruction::PushImmediate(v) => {
            frame.push(v.clone());
            Ok(None)
        }
        Instruction::GetValue(name) => {
            frame.push(frame.get(name).unwrap_or(Value::Null));
            Ok(None)
        }
        Instruction::Property(name) => {
            let owner = frame.pop()?;
            let owner_ref = match owner {
                Value::Object(o) => PropertyOwner::Object(o),
                other => return Err(ProboticsError::type_error(format!("cannot access property on {}", other.type_name()))),
            };
            frame.push(Value::PropertyRef(owner_ref, PropertyKey::Name(name.clone())));
            Ok(None)
        }
        Instruction::Index => {
            let index = frame.pop()?;
            let owner = frame.pop()?;
            let value = match (owner, index) {
                (Value::Object(o), Value::Str(s)) => {
                    Value::PropertyRef(PropertyOwner::Object(o), PropertyKey::Name(s))
                }
                (Value::Object(o), Value::Int(i)) => {
                    Value::PropertyRef(PropertyOwner::Object(o), PropertyKey::Name(i.to_string()))
                }
                (Value::List(l), Value::Int(i)) if i >= 0 => {
                    Value::PropertyRef(PropertyOwner::List(l), PropertyKey::Index(i as usize))
                }
                (owner, index) => {
                    return Err(ProboticsError::type_error(format!(
                        "cannot index {} with {}",
                        owner.type_name(),
                        index.type_name()
                    )))
                }
            };
            frame.push(value);
            Ok(None)
        }
        Instruction::GetProperty | Instruction::GetIndex => {
            let reference = frame.pop()?;
            let value = match reference {
                Value::PropertyRef(owner, key) => read_property(&owner, &key),
                other => return Err(ProboticsError::type_error(format!("expected a property reference, found {}", other.type_name()))),
            };
            frame.push(value);
            Ok(None)
        }
        Instruction::Pop => {
            frame.pop()?;
            Ok(None)
        }
        Instruction::Addition => binary_numeric_or_concat(frame, |a, b| a + b, |a, b| a + b, Some(|a: &str, b: &str| format!("{a}{b}"))),
        Instruction::Subtraction => binary_numeric_or_concat(frame, |a, b| a - b, |a, b| a - b, None),
        Instruction::Multiplication => binary_numeric_or_concat(frame, |a, b| a * b, |a, b| a * b, None),
        Instruction::Division => {
            let rhs = frame.pop()?;
            let lhs = frame.pop()?;
            let (a, b) = numeric_pair(&lhs, &rhs)?;
            frame.push(Value::Float(a / b));
            Ok(None)
        }
        Instruction::CompareEq => compare(frame, |o| o == std::cmp::Ordering::Equal, true),
        Instruction::CompareNeq => compare(frame, |o| o != std::cmp::Ordering::Equal, true),
        Instruction::CompareLt => compare(frame, |o| o == std::cmp::Ordering::Less, false),
        Instruction::CompareLte => compare(frame, |o| o != std::cmp::Ordering::Greater, false),
        Instruction::CompareGt => compare(frame, |o| o == std::cmp::Ordering::Greater, false),
        Instruction::CompareGte => compare(frame, |o| o != std::cmp::Ordering::Less, false),
        Instruction::LogicalAnd => {
            let rhs = frame.pop()?;
            let lhs = frame.pop()?;
            frame.push(Value::Bool(lhs.is_truthy() && rhs.is_truthy()));
            Ok(None)
        }
        Instruction::LogicalOr => {
            let rhs = frame.pop()?;
            let lhs = frame.pop()?;
            frame.push(Value::Bool(lhs.is_truthy() || rhs.is_truthy()));
            Ok(None)
        }
        Instruction::LogicalNot => {
            let v = frame.pop()?;
            frame.push(Value::Bool(!v.is_truthy()));
            Ok(None)
        }
        Instruction::Assignment => {
            let value = frame.pop()?;
            let target = frame.pop()?;
            match target {
                Value::Symbol(name) => frame.assign(&name, value.clone())?,
                Value::PropertyRef(owner, key) => write_property(&owner, &key, value.clone())?,
                other => return Err(ProboticsError::type_error(format!("cannot assign to {}", other.type_name()))),
            }
            if !value.is_block() {
                frame.push(value);
            }
            Ok(None)
        }
        Instruction::Jump(offset) => {
            frame.ip = resolve_jump(frame.ip as isize + 1, *offset, frame.operations.len())?;
            Ok(None)
        }
        Instruction::JumpIf(offset, sense) => {
            let cond = frame.pop()?;
            let base = frame.ip as isize + 1;
            if cond.is_truthy() == *sense {
                frame.ip = resolve_jump(base, *offset, frame.operations.len())?;
            } else {
                frame.ip = base as usize;
            }
            Ok(None)
        }
        Instruction::Call(num_args, local) => {
            let mut positional = Vec::with_capacity(*num_args);
            for _ in 0..*num_args {
                positional.push(frame.pop()?);
            }
            positional.reverse();
            let callee = frame.pop()?;
            let block = match callee {
                Value::Block(b) => b,
                other => return Err(ProboticsError::type_error(format!("{} is not callable", other.type_name()))),
            };

            let mut args = HashMap::new();
            for (i, value) in positional.into_iter().enumerate() {
                let name = block
                    .arg_names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("arg{}", i + 1));
                args.insert(name, value);
            }

            let locals = if *local { Rc::clone(&frame.locals) } else { frame::new_scope() };
            let new_frame = StackFrame::child(
                block.name.clone(),
                Rc::clone(&block.operations),
                args,
                locals,
                Rc::clone(&frame.globals),
                Rc::clone(&frame.builtins),
                None,
            );
            frame.ip += 1;
            Ok(Some(Signal::EnterScope(Box::new(new_frame))))
        }
        Instruction::Catch(_) => Ok(None),
        Instruction::Break => Ok(Some(Signal::Breakpoint(Breakpoint::new("break")))),
        Instruction::Next => Ok(Some(Signal::Breakpoint(Breakpoint::new("next")))),
        Instruction::Return(with_value) => {
            let value = if *with_value { Some(frame.pop()?) } else { None };
            let mut bp = Breakpoint::new("return");
            if let Some(v) = value {
                bp = bp.with_value(v);
            }
            Ok(Some(Signal::Breakpoint(bp)))
        }
        Instruction::MaybeCall => {
            if matches!(frame.peek(), Some(Value::Block(_))) {
                execute_instruction(frame, &Instruction::Call(0, false))
            } else {
                Ok(None)
            }
        }
        Instruction::Native(callback) => match callback(frame)? {
            NativeOutcome::Value(Some(v)) => {
                frame.push(v);
                Ok(None)
            }
            NativeOutcome::Value(None) => Ok(None),
            NativeOutcome::Suspend(reason) => Ok(Some(Signal::Breakpoint(Breakpoint::new(reason).stopping()))),
        },
    }
}

fn numeric_pair(lhs: &Value, rhs: &Value) -> Result<(f64, f64), ProboticsError> {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(ProboticsError::type_error(format!(
            "unsupported operand types: {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn binary_numeric_or_concat(
    frame: &mut StackFrame,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
    concat: Option<fn(&str, &str) -> String>,
) -> Result<Option<Signal>, ProboticsError> {
    let rhs = frame.pop()?;
    let lhs = frame.pop()?;
    if let (Value::Str(a), Value::Str(b), Some(concat)) = (&lhs, &rhs, concat) {
        frame.push(Value::Str(concat(a, b)));
        return Ok(None);
    }
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => frame.push(Value::Int(int_op(*a, *b))),
        _ => {
            let (a, b) = numeric_pair(&lhs, &rhs)?;
            frame.push(Value::Float(float_op(a, b)));
        }
    }
    Ok(None)
}

fn compare(
    frame: &mut StackFrame,
    matches_ordering: fn(std::cmp::Ordering) -> bool,
    allow_non_numeric: bool,
) -> Result<Option<Signal>, ProboticsError> {
    let rhs = frame.pop()?;
    let lhs = frame.pop()?;
    let ordering = match (&lhs, &rhs) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = numeric_pair(&lhs, &rhs)?;
            a.partial_cmp(&b)
        }
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ if allow_non_numeric => {
            frame.push(Value::Bool(matches_ordering(std::cmp::Ordering::Greater) == (lhs == rhs)));
            return Ok(None);
        }
        _ => None,
    };
    match ordering {
        Some(o) => frame.push(Value::Bool(matches_ordering(o))),
        None => {
            return Err(ProboticsError::type_error(format!(
                "cannot compare {} and {}",
                lhs.type_name(),
                rhs.type_name()
            )))
        }
    }
    Ok(None)
}

fn read_property(owner: &PropertyOwner, key: &PropertyKey) -> Value {
    match (owner, key) {
        (PropertyOwner::Object(o), PropertyKey::Name(n)) => o.borrow().get(n).cloned().unwrap_or(Value::Null),
        (PropertyOwner::List(l), PropertyKey::Index(i)) => l.borrow().get(*i).cloned().unwrap_or(Value::Null),
        (PropertyOwner::Object(o), PropertyKey::Index(i)) => o.borrow().get(&i.to_string()).cloned().unwrap_or(Value::Null),
        (PropertyOwner::List(l), PropertyKey::Name(_)) => {
            let _ = l;
            Value::Null
        }
    }
}

fn write_property(owner: &PropertyOwner, key: &PropertyKey, value: Value) -> Result<(), ProboticsError> {
    match (owner, key) {
        (PropertyOwner::Object(o), PropertyKey::Name(n)) => {
            o.borrow_mut().insert(n.clone(), value);
        }
        (PropertyOwner::Object(o), PropertyKey::Index(i)) => {
            o.borrow_mut().insert(i.to_string(), value);
        }
        (PropertyOwner::List(l), PropertyKey::Index(i)) => {
            let mut list = l.borrow_mut();
            while list.len() <= *i {
                list.push(Value::Null);
            }
            list[*i] = value;
        }
        (PropertyOwner::List(_), PropertyKey::Name(n)) => {
            return Err(ProboticsError::type_error(format!("cannot assign named property '{n}' on a list")))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Block;
    use std::cell::RefCell;

    fn run(ops: Vec<Instruction>) -> Option<Value> {
        let mut ctx = ExecutionContext::new(ops, frame::new_scope(), frame::new_scope());
        let result = Rc::new(RefCell::new(None));
        let captured = Rc::clone(&result);
        ctx.on_result = Some(Box::new(move |v| *captured.borrow_mut() = v));
        while !ctx.is_finished() {
            ctx.execute_next();
        }
        result.borrow().clone()
    }

    #[test]
    fn arithmetic_with_precedence() {
        // 1 + (2 - 3) / 4 * 5  ==  1 + ((2-3)/4)*5  ==  -0.25
        let ops = vec![
            Instruction::PushImmediate(Value::Int(1)),
            Instruction::PushImmediate(Value::Int(2)),
            Instruction::PushImmediate(Value::Int(3)),
            Instruction::Subtraction,
            Instruction::PushImmediate(Value::Int(4)),
            Instruction::Division,
            Instruction::PushImmediate(Value::Int(5)),
            Instruction::Multiplication,
            Instruction::Addition,
        ];
        assert_eq!(run(ops), Some(Value::Float(-0.25)));
    }

    #[test]
    fn sequential_assignment_keeps_only_final_value() {
        // a := 1; b := a + 2; b
        let ops = vec![
            Instruction::PushImmediate(Value::Symbol("a".into())),
            Instruction::PushImmediate(Value::Int(1)),
            Instruction::Assignment,
            Instruction::Pop,
            Instruction::PushImmediate(Value::Symbol("b".into())),
            Instruction::GetValue("a".into()),
            Instruction::PushImmediate(Value::Int(2)),
            Instruction::Addition,
            Instruction::Assignment,
            Instruction::Pop,
            Instruction::GetValue("b".into()),
        ];
        assert_eq!(run(ops), Some(Value::Int(3)));
    }

    #[test]
    fn call_binds_positional_args_and_returns() {
        let block = Value::block(Block::new(
            vec!["x".into()],
            vec![Instruction::GetValue("x".into()), Instruction::PushImmediate(Value::Int(1)), Instruction::Addition],
        ));
        let ops = vec![
            Instruction::PushImmediate(block),
            Instruction::PushImmediate(Value::Int(1)),
            Instruction::Call(1, false),
            Instruction::Catch(HashMap::from([("return".to_string(), 1)])),
        ];
        assert_eq!(run(ops), Some(Value::Int(2)));
    }

    #[test]
    fn while_loop_breaks_via_catch() {
        // i := 0
        // while true { i := i + 1; if i == 5 { break } }
        // i
        let if_body = Value::block(Block::new(vec![], vec![Instruction::Break]));

        // Loop body block: i := i + 1; if i == 5 { break }
        let assign_i = vec![
            Instruction::PushImmediate(Value::Symbol("i".into())),
            Instruction::GetValue("i".into()),
            Instruction::PushImmediate(Value::Int(1)),
            Instruction::Addition,
            Instruction::Assignment,
            Instruction::Pop,
            Instruction::GetValue("i".into()),
            Instruction::PushImmediate(Value::Int(5)),
            Instruction::CompareEq,
            Instruction::JumpIf(2, false),
            Instruction::PushImmediate(if_body),
            Instruction::Call(0, true),
        ];
        let body_block = Value::block(Block::new(vec![], assign_i));

        let ops = vec![
            Instruction::PushImmediate(Value::Symbol("i".into())),
            Instruction::PushImmediate(Value::Int(0)),
            Instruction::Assignment,
            Instruction::Pop,
            // while true { body_block }
            Instruction::PushImmediate(Value::Bool(true)),
            Instruction::JumpIf(4, false),
            Instruction::PushImmediate(body_block),
            Instruction::Call(0, true),
            Instruction::Catch(HashMap::from([("break".to_string(), 2), ("next".to_string(), 1)])),
            Instruction::Jump(-6),
            Instruction::GetValue("i".into()),
        ];
        assert_eq!(run(ops), Some(Value::Int(5)));
    }
}
