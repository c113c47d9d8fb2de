// File: src/compiler.rs
//
// Compiles the parse tree into a flat instruction stream. The only state
// carried across the walk is a loop-depth counter, used to reject a
// `break`/`next` that does not sit inside a `while` body.
//
// Stack discipline across a statement sequence is the one thing the grammar
// leaves implicit: most statement forms leave a value on the stack, but
// `while` bodies must never leak one across iterations (an unbounded number
// of iterations would otherwise pile up an unbounded number of values), and
// `if`/`while` used as non-tail statements must not leave one either. This is
// resolved with a single `want_value` flag threaded through compilation:
// only the last statement of a sequence that itself wants a value propagates
// one, and a `while` body is always compiled wanting none. See DESIGN.md.

use std::collections::HashMap;

use crate::ast::{BinOp, Expr, Stmt};
use crate::bytecode::{Block, Instruction};
use crate::errors::{ProboticsError, SourceLocation};
use crate::interpreter::value::Value;
use crate::lexer::tokenize;
use crate::parser::parse;

pub struct Compiler {
    loop_depth: usize,
}

impl Compiler {
    pub fn new() -> Self {
        Self { loop_depth: 0 }
    }

    /// Tokenizes, parses, and compiles source text into a flat instruction
    /// stream ready for an `ExecutionContext`.
    pub fn compile_source(source: &str) -> Result<Vec<Instruction>, ProboticsError> {
        let tokens = tokenize(source)?;
        let stmts = parse(tokens)?;
        Compiler::new().compile_program(&stmts)
    }

    pub fn compile_program(&mut self, stmts: &[Stmt]) -> Result<Vec<Instruction>, ProboticsError> {
        self.compile_seq(stmts, true)
    }

    /// Compiles a block literal's body, always keeping its tail value -- a
    /// user-defined block's last statement is its implicit return value.
    fn compile_value_body(&mut self, stmts: &[Stmt]) -> Result<Vec<Instruction>, ProboticsError> {
        self.compile_seq(stmts, true)
    }

    fn compile_seq(&mut self, stmts: &[Stmt], keep_tail: bool) -> Result<Vec<Instruction>, ProboticsError> {
        let mut out = Vec::new();
        for (i, stmt) in stmts.iter().enumerate() {
            let want_value = keep_tail && i + 1 == stmts.len();
            self.compile_stmt(stmt, want_value, &mut out)?;
        }
        Ok(out)
    }

    fn compile_stmt(&mut self, stmt: &Stmt, want_value: bool, out: &mut Vec<Instruction>) -> Result<(), ProboticsError> {
        match stmt {
            // A bare identifier statement -- `move` vs `move()` -- is the one
            // place `MaybeCall` is emitted, letting a reference to a block
            // used as a standalone command invoke it.
            Stmt::Expr(Expr::Identifier(name)) => {
                out.push(Instruction::GetValue(name.clone()));
                out.push(Instruction::MaybeCall);
                if !want_value {
                    out.push(Instruction::Pop);
                }
                Ok(())
            }
            Stmt::Expr(e) => {
                let produced = self.compile_expr(e, false, out)?;
                if produced && !want_value {
                    out.push(Instruction::Pop);
                } else if !produced && want_value {
                    out.push(Instruction::PushImmediate(Value::Null));
                }
                Ok(())
            }
            Stmt::If { condition, then_branch, else_branch } => {
                self.compile_expr(condition, false, out)?;
                let then_ops = self.compile_seq(then_branch, want_value)?;
                let else_ops = match else_branch {
                    Some(stmts) => self.compile_seq(stmts, want_value)?,
                    None if want_value => vec![Instruction::PushImmediate(Value::Null)],
                    None => Vec::new(),
                };
                self.emit_if(then_ops, else_ops, out);
                Ok(())
            }
            Stmt::While { condition, body } => {
                self.emit_while(condition, body, out)?;
                if want_value {
                    out.push(Instruction::PushImmediate(Value::Null));
                }
                Ok(())
            }
            Stmt::Break => {
                if self.loop_depth == 0 {
                    return Err(ProboticsError::compile("'break' outside of a loop", SourceLocation::unknown()));
                }
                out.push(Instruction::Break);
                Ok(())
            }
            Stmt::Next => {
                if self.loop_depth == 0 {
                    return Err(ProboticsError::compile("'next' outside of a loop", SourceLocation::unknown()));
                }
                out.push(Instruction::Next);
                Ok(())
            }
            Stmt::Return(expr) => {
                match expr {
                    Some(e) => {
                        self.compile_expr(e, false, out)?;
                        out.push(Instruction::Return(true));
                    }
                    None => out.push(Instruction::Return(false)),
                }
                Ok(())
            }
        }
    }

    /// `if E { then } else { else }`. Both branches are compiled with the
    /// same `want_value`, so whichever one runs leaves the same net effect --
    /// there is no separate stack-depth reconciliation to do here.
    fn emit_if(&mut self, then_ops: Vec<Instruction>, else_ops: Vec<Instruction>, out: &mut Vec<Instruction>) {
        let jumpif_idx = out.len();
        out.push(Instruction::JumpIf(0, false)); // placeholder, patched below
        out.push(Instruction::PushImmediate(Value::block(Block::new(Vec::new(), then_ops))));
        out.push(Instruction::Call(0, true));

        if else_ops.is_empty() {
            let after = out.len();
            out[jumpif_idx] = Instruction::JumpIf(after as isize - (jumpif_idx as isize + 1), false);
            return;
        }

        let jump_idx = out.len();
        out.push(Instruction::Jump(0)); // placeholder, patched below
        let else_start = out.len();
        out[jumpif_idx] = Instruction::JumpIf(else_start as isize - (jumpif_idx as isize + 1), false);

        out.push(Instruction::PushImmediate(Value::block(Block::new(Vec::new(), else_ops))));
        out.push(Instruction::Call(0, true));
        let after = out.len();
        out[jump_idx] = Instruction::Jump(after as isize - (jump_idx as isize + 1));
    }

    /// `while E { body }`. The body is always compiled wanting no value, and
    /// the `Catch` sits right after the inline `Call` -- its `break`/`next`
    /// offsets of 2 and 1 are fixed relative to the `Catch` itself regardless
    /// of body size: `break` lands past the trailing `Jump` (catch_idx + 2),
    /// `next` lands on the trailing `Jump` itself (catch_idx + 1), re-running
    /// the condition check.
    fn emit_while(&mut self, condition: &Expr, body: &[Stmt], out: &mut Vec<Instruction>) -> Result<(), ProboticsError> {
        let cond_start = out.len();
        self.compile_expr(condition, false, out)?;

        let jumpif_idx = out.len();
        out.push(Instruction::JumpIf(0, false)); // placeholder, patched below

        self.loop_depth += 1;
        let body_ops = self.compile_seq(body, false);
        self.loop_depth -= 1;
        let body_ops = body_ops?;

        out.push(Instruction::PushImmediate(Value::block(Block::new(Vec::new(), body_ops))));
        out.push(Instruction::Call(0, true));

        let mut catches = HashMap::new();
        catches.insert("break".to_string(), 2isize);
        catches.insert("next".to_string(), 1isize);
        out.push(Instruction::Catch(catches));

        let jump_idx = out.len();
        out.push(Instruction::Jump(0)); // placeholder, patched below
        let past_loop = out.len();

        out[jumpif_idx] = Instruction::JumpIf(past_loop as isize - (jumpif_idx as isize + 1), false);
        out[jump_idx] = Instruction::Jump(cond_start as isize - (jump_idx as isize + 1));
        Ok(())
    }

    /// Compiles an expression. `assignable` selects assignment-target mode:
    /// bare identifiers push a `Symbol` instead of resolving a value, and a
    /// trailing `GetProperty`/`GetIndex` is suppressed so the result is a
    /// writable `PropertyRef`. Returns whether a value was left on the stack
    /// (false only for an assignment whose right-hand side is a block
    /// literal, which names the block instead of pushing twice).
    fn compile_expr(&mut self, expr: &Expr, assignable: bool, out: &mut Vec<Instruction>) -> Result<bool, ProboticsError> {
        match expr {
            Expr::Int(n) => {
                out.push(Instruction::PushImmediate(Value::Int(*n)));
                Ok(true)
            }
            Expr::Float(f) => {
                out.push(Instruction::PushImmediate(Value::Float(*f)));
                Ok(true)
            }
            Expr::Str(s) => {
                out.push(Instruction::PushImmediate(Value::Str(s.clone())));
                Ok(true)
            }
            Expr::Bool(b) => {
                out.push(Instruction::PushImmediate(Value::Bool(*b)));
                Ok(true)
            }
            Expr::Null => {
                out.push(Instruction::PushImmediate(Value::Null));
                Ok(true)
            }
            Expr::Identifier(name) => {
                if assignable {
                    out.push(Instruction::PushImmediate(Value::Symbol(name.clone())));
                } else {
                    out.push(Instruction::GetValue(name.clone()));
                }
                Ok(true)
            }
            Expr::Property { target, name } => {
                self.compile_expr(target, false, out)?;
                out.push(Instruction::Property(name.clone()));
                if !assignable {
                    out.push(Instruction::GetProperty);
                }
                Ok(true)
            }
            Expr::Index { target, index } => {
                self.compile_expr(target, false, out)?;
                self.compile_expr(index, false, out)?;
                out.push(Instruction::Index);
                if !assignable {
                    out.push(Instruction::GetIndex);
                }
                Ok(true)
            }
            Expr::Binary { left, op, right } => {
                self.compile_expr(left, false, out)?;
                self.compile_expr(right, false, out)?;
                out.push(match op {
                    BinOp::Add => Instruction::Addition,
                    BinOp::Sub => Instruction::Subtraction,
                    BinOp::Mul => Instruction::Multiplication,
                    BinOp::Div => Instruction::Division,
                    BinOp::Eq => Instruction::CompareEq,
                    BinOp::Neq => Instruction::CompareNeq,
                    BinOp::Lt => Instruction::CompareLt,
                    BinOp::Lte => Instruction::CompareLte,
                    BinOp::Gt => Instruction::CompareGt,
                    BinOp::Gte => Instruction::CompareGte,
                    BinOp::And => Instruction::LogicalAnd,
                    BinOp::Or => Instruction::LogicalOr,
                });
                Ok(true)
            }
            Expr::Not(inner) => {
                self.compile_expr(inner, false, out)?;
                out.push(Instruction::LogicalNot);
                Ok(true)
            }
            Expr::Call { callee, args } => {
                self.compile_expr(callee, false, out)?;
                for arg in args {
                    self.compile_expr(arg, false, out)?;
                }
                out.push(Instruction::Call(args.len(), false));
                let mut catches = HashMap::new();
                catches.insert("return".to_string(), 1isize);
                out.push(Instruction::Catch(catches));
                Ok(true)
            }
            Expr::Assign { target, value } => {
                self.compile_expr(target, true, out)?;
                if let Expr::Block { arg_names, body } = value.as_ref() {
                    let ops = self.compile_value_body(body)?;
                    let mut block = Block::new(arg_names.clone(), ops);
                    if let Some(name) = static_assign_name(target) {
                        block = block.named(name);
                    }
                    out.push(Instruction::PushImmediate(Value::block(block)));
                    out.push(Instruction::Assignment);
                    Ok(false)
                } else {
                    self.compile_expr(value, false, out)?;
                    out.push(Instruction::Assignment);
                    Ok(true)
                }
            }
            Expr::Block { arg_names, body } => {
                let ops = self.compile_value_body(body)?;
                out.push(Instruction::PushImmediate(Value::block(Block::new(arg_names.clone(), ops))));
                Ok(true)
            }
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// The statically-known name to attach to a block literal assigned directly
/// to an identifier or property -- `None` for an index target, which has no
/// fixed name at compile time.
fn static_assign_name(target: &Expr) -> Option<String> {
    match target {
        Expr::Identifier(n) => Some(n.clone()),
        Expr::Property { name, .. } => Some(name.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::ExecutionContext;
    use crate::interpreter::frame::new_scope;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn run(source: &str) -> Option<Value> {
        let ops = Compiler::compile_source(source).expect("compiles");
        let mut ctx = ExecutionContext::new(ops, new_scope(), new_scope());
        let result = Rc::new(RefCell::new(None));
        let result_clone = Rc::clone(&result);
        ctx.on_result = Some(Box::new(move |v| *result_clone.borrow_mut() = v));
        while !ctx.is_finished() {
            ctx.execute_next();
        }
        result.borrow().clone()
    }

    #[test]
    fn arithmetic_with_precedence() {
        assert_eq!(run("1 + (2 - 3) / 4 * 5"), Some(Value::Float(-0.25)));
    }

    #[test]
    fn sequential_statements_keep_only_final_value() {
        assert_eq!(run("a := 1\nb := a + 2\nb"), Some(Value::Int(3)));
    }

    #[test]
    fn while_loop_breaks_and_leaves_no_residue() {
        let src = "i := 0\nwhile true {\n  i := i + 1\n  if i == 5 { break }\n}\ni";
        assert_eq!(run(src), Some(Value::Int(5)));
    }

    #[test]
    fn if_expression_as_tail_yields_branch_value() {
        assert_eq!(run("if 1 > 2 { 3 } else { 4 }"), Some(Value::Int(4)));
    }

    #[test]
    fn block_call_binds_args_and_returns() {
        assert_eq!(run("inc := (x) { x + 1 }\ninc(41)"), Some(Value::Int(42)));
    }

    #[test]
    fn block_literal_assignment_sets_name() {
        let ops = Compiler::compile_source("greet := () { \"hi\" }").unwrap();
        let named = ops.iter().find_map(|i| match i {
            Instruction::PushImmediate(Value::Block(b)) => b.name.clone(),
            _ => None,
        });
        assert_eq!(named.as_deref(), Some("greet"));
    }

    #[test]
    fn rejects_break_outside_loop() {
        assert!(Compiler::compile_source("break").is_err());
    }

    #[test]
    fn rejects_next_outside_loop() {
        assert!(Compiler::compile_source("next").is_err());
    }

    #[test]
    fn bare_identifier_statement_invokes_block_via_maybe_call() {
        let src = "count := 0\nbump := () { count := count + 1 }\nbump\nbump\ncount";
        assert_eq!(run(src), Some(Value::Int(2)));
    }

    #[test]
    fn while_with_non_empty_tail_does_not_leak_across_iterations() {
        // Body's tail statement is a bare expression, not just an if/break;
        // regression check that Catch's fixed {2,1} offsets still land
        // correctly and no stack growth occurs across iterations.
        let src = "i := 0\nwhile i < 3 {\n  i := i + 1\n  i * 2\n}\ni";
        assert_eq!(run(src), Some(Value::Int(3)));
    }
}
