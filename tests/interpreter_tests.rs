// Integration tests driving the compiler and execution context together:
// full scripts compiled from source text and run to completion, checking the
// final result a host would see via `on_result`.

use std::cell::RefCell;
use std::rc::Rc;

use probotics::compiler::Compiler;
use probotics::interpreter::frame::new_scope;
use probotics::interpreter::value::Value;
use probotics::interpreter::ExecutionContext;
use probotics::processor::Processor;
use probotics::programming::{ExecuteCallbacks, ProgrammingService};
use probotics::scheduler::Scheduler;
use probotics::world::Grid;

fn run(source: &str) -> Option<Value> {
    let ops = Compiler::compile_source(source).unwrap();
    let mut ctx = ExecutionContext::new(ops, new_scope(), new_scope());
    let result = Rc::new(RefCell::new(None));
    let captured = Rc::clone(&result);
    ctx.on_result = Some(Box::new(move |v| *captured.borrow_mut() = v));
    while !ctx.is_finished() {
        ctx.execute_next();
    }
    result.borrow().clone()
}

#[test]
fn variable_assignment_and_arithmetic() {
    assert_eq!(run("x := 3\ny := x * 4 + 1\ny"), Some(Value::Int(13)));
}

#[test]
fn if_expression_branches_on_condition() {
    assert_eq!(run("x := 10\nif x > 5 { \"big\" } else { \"small\" }"), Some(Value::str("big")));
}

#[test]
fn while_loop_counts_to_five() {
    assert_eq!(run("i := 0\nwhile i < 5 { i := i + 1 }\ni"), Some(Value::Int(5)));
}

#[test]
fn break_exits_the_loop_early() {
    let src = "i := 0\nwhile true { i := i + 1\n if i == 3 { break } }\ni";
    assert_eq!(run(src), Some(Value::Int(3)));
}

#[test]
fn next_skips_to_the_next_iteration() {
    let src = "i := 0\ntotal := 0\nwhile i < 5 { i := i + 1\n if i == 3 { next }\n total := total + i }\ntotal";
    // 1+2+4+5, skipping 3
    assert_eq!(run(src), Some(Value::Int(12)));
}

#[test]
fn block_call_binds_positional_args_by_name() {
    let src = "add := (a, b) { a + b }\nadd(3, 4)";
    assert_eq!(run(src), Some(Value::Int(7)));
}

#[test]
fn recursive_block_calls_itself_through_globals() {
    let src = "fact := (n) { if n <= 1 { 1 } else { n * fact(n - 1) } }\nfact(5)";
    assert_eq!(run(src), Some(Value::Int(120)));
}

#[test]
fn return_unwinds_out_of_nested_blocks() {
    let src = "find := (n) { if n > 0 { return n } \"none\" }\nfind(4)";
    assert_eq!(run(src), Some(Value::Int(4)));
}

#[test]
fn nested_block_calls_thread_state_through_locals() {
    let src = "counter := 0\nbump := () { counter := counter + 1 }\nbump()\nbump()\nbump()\ncounter";
    assert_eq!(run(src), Some(Value::Int(3)));
}

#[test]
fn division_always_promotes_to_float() {
    assert_eq!(run("10 / 4"), Some(Value::Float(2.5)));
    assert_eq!(run("10 / 5"), Some(Value::Float(2.0)));
}

#[test]
fn an_undefined_symbol_reads_as_null_not_an_error() {
    assert_eq!(run("nope"), Some(Value::Null));
}

/// Runs a script through the real, player-scoped builtins (as a host would),
/// rather than the bare-interpreter `run` helper above which never has
/// `object`/`list` registered.
#[test]
fn object_and_list_builtins_support_property_and_index_assignment() {
    let mut grid = Grid::new(5, 5);
    grid.add_player("p1", 0, 0, 100);
    let world = Rc::new(RefCell::new(grid));
    let mut service = ProgrammingService::new(world);
    let scheduler = Rc::new(RefCell::new(Scheduler::new()));
    let processor = Rc::new(RefCell::new(Processor::new(10.0)));

    let src = "x := object()\nx.y := list()\nx.y[0] := 1\nx[\"z\"] := x[\"y\"]\nx.z";
    let ops = service.compile(src).unwrap();

    let result = Rc::new(RefCell::new(None));
    let result_for_cb = Rc::clone(&result);
    let callbacks = ExecuteCallbacks {
        on_result: Some(Box::new(move |v| *result_for_cb.borrow_mut() = v)),
        ..Default::default()
    };
    service.execute(&scheduler, &processor, ops, "p1", true, true, callbacks);

    for _ in 0..64 {
        processor.borrow_mut().process_tick().unwrap();
        if scheduler.borrow().is_empty() {
            break;
        }
    }

    match result.borrow().clone() {
        Some(Value::List(l)) => assert_eq!(*l.borrow(), vec![Value::Int(1)]),
        other => panic!("expected a one-element list, got {other:?}"),
    }
}
