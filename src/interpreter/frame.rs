// File: src/interpreter/frame.rs
//
// Per-invocation execution record: instruction pointer, value stack,
// argument bindings, local scope, and links to globals/builtins. Frames form
// a chain from child to parent; the outermost frame's `locals` is aliased to
// `globals` so top-level assignments persist across calls.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::Instruction;
use crate::errors::ProboticsError;
use crate::interpreter::value::Value;

pub type ScopeVars = Rc<RefCell<HashMap<String, Value>>>;

pub fn new_scope() -> ScopeVars {
    Rc::new(RefCell::new(HashMap::new()))
}

pub struct StackFrame {
    pub name: Option<String>,
    pub operations: Rc<Vec<Instruction>>,
    pub ip: usize,
    pub value_stack: Vec<Value>,
    pub args: HashMap<String, Value>,
    pub locals: ScopeVars,
    pub globals: ScopeVars,
    pub builtins: ScopeVars,
    pub parent: Option<Box<StackFrame>>,
}

impl StackFrame {
    /// The outermost frame for a context: locals aliased to globals, no args.
    pub fn outer(operations: Rc<Vec<Instruction>>, globals: ScopeVars, builtins: ScopeVars) -> Self {
        Self {
            name: None,
            operations,
            ip: 0,
            value_stack: Vec::new(),
            args: HashMap::new(),
            locals: Rc::clone(&globals),
            globals,
            builtins,
            parent: None,
        }
    }

    /// A child frame created by `Call`. `local=true` (inline `if`/`while`
    /// bodies) reuses the caller's locals so assignments inside the body are
    /// visible to the caller after the inline call returns.
    pub fn child(
        name: Option<String>,
        operations: Rc<Vec<Instruction>>,
        args: HashMap<String, Value>,
        locals: ScopeVars,
        globals: ScopeVars,
        builtins: ScopeVars,
        parent: Option<Box<StackFrame>>,
    ) -> Self {
        Self { name, operations, ip: 0, value_stack: Vec::new(), args, locals, globals, builtins, parent }
    }

    pub fn next_instruction(&self) -> Option<&Instruction> {
        self.operations.get(self.ip)
    }

    pub fn push(&mut self, v: Value) {
        self.value_stack.push(v);
    }

    pub fn pop(&mut self) -> Result<Value, ProboticsError> {
        self.value_stack.pop().ok_or_else(ProboticsError::stack_underflow)
    }

    pub fn peek(&self) -> Option<&Value> {
        self.value_stack.last()
    }

    /// Reads follow args -> locals -> globals -> builtins; an absent name
    /// resolves to `None` so `GetValue` can push `Null` instead of raising.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.args.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.locals.borrow().get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.globals.borrow().get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.builtins.borrow().get(name) {
            return Some(v.clone());
        }
        None
    }

    /// Assign in the innermost scope that already binds `name` (args ->
    /// locals -> globals); builtins are never a write target. If no scope
    /// binds it, create the binding in `locals`.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), ProboticsError> {
        if self.args.contains_key(name) {
            self.args.insert(name.to_string(), value);
            return Ok(());
        }
        if self.locals.borrow().contains_key(name) {
            self.locals.borrow_mut().insert(name.to_string(), value);
            return Ok(());
        }
        if self.globals.borrow().contains_key(name) {
            self.globals.borrow_mut().insert(name.to_string(), value);
            return Ok(());
        }
        if self.builtins.borrow().contains_key(name) {
            return Err(ProboticsError::type_error(format!("cannot assign to builtin '{name}'")));
        }
        self.locals.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> StackFrame {
        StackFrame::outer(Rc::new(Vec::new()), new_scope(), new_scope())
    }

    #[test]
    fn undefined_get_returns_none() {
        let f = frame();
        assert_eq!(f.get("missing"), None);
    }

    #[test]
    fn top_level_assign_persists_in_globals() {
        let mut f = frame();
        f.assign("x", Value::Int(1)).unwrap();
        assert_eq!(f.globals.borrow().get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn cannot_assign_to_builtin() {
        let mut f = frame();
        f.builtins.borrow_mut().insert("move".to_string(), Value::Bool(true));
        assert!(f.assign("move", Value::Int(1)).is_err());
    }

    #[test]
    fn pop_on_empty_stack_errors() {
        let mut f = frame();
        assert!(f.pop().is_err());
    }
}
