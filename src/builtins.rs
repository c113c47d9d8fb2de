// File: src/builtins.rs
//
// Native callables exposed to scripts: movement, perception, communication,
// and the probot economy. Each is a `Block::native` closure captured over a
// shared handle to the `Grid`, constructed once per player and installed as
// that player's `builtins` scope (spec.md §9: "globals and built-ins per
// player... constructed once per player... read-only from the script
// side"). Grounded in `services/game/builtin/{movement,say,random,inspect,
// players,give,collect,types}.py`. `move`/`turn` schedule a `Transition`
// instead of mutating the grid synchronously, the way `movement.py`'s
// `MovementService` hands its state changes to `self.engine.transitioner`.

use std::cell::RefCell;
use std::rc::Rc;

use rand::Rng;

use crate::bytecode::{Block, NativeFn, NativeOutcome};
use crate::errors::ProboticsError;
use crate::interpreter::frame::{ScopeVars, StackFrame};
use crate::interpreter::value::Value;
use crate::processor::Processor;
use crate::programming::context_name;
use crate::scheduler::Scheduler;
use crate::transitions::{self, Transition, TransitionEngine};
use crate::world::{Grid, ProbotState};

pub type WorldHandle = Rc<RefCell<Grid>>;

/// Ticks a `move`/`turn` animation takes to complete, matching the
/// illustrative step count used elsewhere for transitions in this crate.
const MOVEMENT_STEPS: u32 = 3;

fn arg_bool(frame: &StackFrame, name: &str, default: bool) -> bool {
    match frame.get(name) {
        Some(v) => v.is_truthy(),
        None => default,
    }
}

fn arg_int(frame: &StackFrame, name: &str) -> Option<i64> {
    match frame.get(name)? {
        Value::Int(n) => Some(n),
        Value::Float(f) => Some(f as i64),
        _ => None,
    }
}

fn arg_str(frame: &StackFrame, name: &str) -> Option<String> {
    match frame.get(name)? {
        Value::Str(s) => Some(s),
        _ => None,
    }
}

fn native(arg_names: &[&str], f: impl Fn(&mut StackFrame) -> Result<NativeOutcome, ProboticsError> + 'static) -> Value {
    let names = arg_names.iter().map(|s| s.to_string()).collect();
    let func: NativeFn = Rc::new(f);
    Value::block(Block::native(names, func))
}

/// Schedules the `on_complete` half of a `move`/`turn` transition: flips the
/// probot back to idle and resumes whichever context (if any) parked itself
/// on this player's `wait()`. Resuming is harmless when nothing is waiting --
/// `Scheduler::resume` on a name that isn't in `stopped` is a no-op.
fn resume_on_complete(world: WorldHandle, player_id: String, scheduler: Rc<RefCell<Scheduler>>) -> impl FnMut(&mut ()) {
    move |_| {
        if let Some(p) = world.borrow_mut().players.get_mut(&player_id) {
            p.probot.state = ProbotState::Idle;
        }
        scheduler.borrow_mut().resume(&context_name(&player_id));
    }
}

/// Builds the read-only native scope for one player. Every closure captures
/// `world` and `player_id` by clone, so the returned map can outlive the call
/// that built it for as long as the player's context is scheduled.
/// `processor`/`transitions`/`scheduler` are the same handles the host drives
/// the simulation with, so `move`/`turn` can schedule a real transition
/// instead of mutating the grid synchronously.
pub fn player_builtins(
    world: WorldHandle,
    player_id: String,
    processor: Rc<RefCell<Processor>>,
    transitions: Rc<RefCell<TransitionEngine<()>>>,
    scheduler: Rc<RefCell<Scheduler>>,
) -> ScopeVars {
    let mut map = std::collections::HashMap::new();

    map.insert("move".to_string(), {
        let world = Rc::clone(&world);
        let player_id = player_id.clone();
        let processor = Rc::clone(&processor);
        let transitions = Rc::clone(&transitions);
        let scheduler = Rc::clone(&scheduler);
        native(&[], move |_frame| {
            let (nx, ny) = {
                let grid = world.borrow();
                let player = grid
                    .players
                    .get(&player_id)
                    .ok_or_else(|| ProboticsError::native("unknown player"))?;
                let (dx, dy) = player.probot.facing.delta();
                (player.probot.x + dx, player.probot.y + dy)
            };
            let can_move = {
                let grid = world.borrow();
                grid.in_bounds(nx, ny) && grid.player_at(nx, ny).is_none()
            };
            if can_move {
                let on_start = {
                    let world = Rc::clone(&world);
                    let player_id = player_id.clone();
                    move |_: &mut ()| {
                        if let Some(p) = world.borrow_mut().players.get_mut(&player_id) {
                            p.probot.state = ProbotState::Moving;
                            p.probot.x = nx;
                            p.probot.y = ny;
                            p.probot.energy -= 1;
                        }
                    }
                };
                let transition = Transition::new(
                    format!("{player_id}:move"),
                    MOVEMENT_STEPS,
                    (),
                    on_start,
                    |_, _, _| {},
                    resume_on_complete(Rc::clone(&world), player_id.clone(), Rc::clone(&scheduler)),
                );
                transitions::add(Rc::clone(&transitions), &mut processor.borrow_mut(), transition);
            }
            Ok(NativeOutcome::Value(Some(Value::Bool(can_move))))
        })
    });

    map.insert("turn".to_string(), {
        let world = Rc::clone(&world);
        let player_id = player_id.clone();
        let processor = Rc::clone(&processor);
        let transitions = Rc::clone(&transitions);
        let scheduler = Rc::clone(&scheduler);
        native(&["clockwise"], move |frame| {
            let clockwise = arg_bool(frame, "clockwise", true);
            if !world.borrow().players.contains_key(&player_id) {
                return Err(ProboticsError::native("unknown player"));
            }
            let on_start = {
                let world = Rc::clone(&world);
                let player_id = player_id.clone();
                move |_: &mut ()| {
                    if let Some(p) = world.borrow_mut().players.get_mut(&player_id) {
                        p.probot.state = ProbotState::Turning;
                        p.probot.facing = p.probot.facing.turned(clockwise);
                    }
                }
            };
            let transition = Transition::new(
                format!("{player_id}:turn"),
                MOVEMENT_STEPS,
                (),
                on_start,
                |_, _, _| {},
                resume_on_complete(Rc::clone(&world), player_id.clone(), Rc::clone(&scheduler)),
            );
            transitions::add(Rc::clone(&transitions), &mut processor.borrow_mut(), transition);
            Ok(NativeOutcome::Value(None))
        })
    });

    map.insert("is_idle".to_string(), {
        let world = Rc::clone(&world);
        let player_id = player_id.clone();
        native(&[], move |_frame| {
            let grid = world.borrow();
            let idle = grid
                .players
                .get(&player_id)
                .map(|p| p.probot.state == ProbotState::Idle)
                .unwrap_or(true);
            Ok(NativeOutcome::Value(Some(Value::Bool(idle))))
        })
    });

    map.insert("wait".to_string(), {
        native(&[], move |_frame| Ok(NativeOutcome::Suspend("wait".to_string())))
    });

    map.insert("object".to_string(), native(&[], |_frame| Ok(NativeOutcome::Value(Some(Value::object())))));

    map.insert("list".to_string(), native(&[], |_frame| Ok(NativeOutcome::Value(Some(Value::list())))));

    map.insert("say".to_string(), {
        let world = Rc::clone(&world);
        let player_id = player_id.clone();
        native(&["message"], move |frame| {
            let message = arg_str(frame, "message").unwrap_or_default();
            let mut grid = world.borrow_mut();
            if let Some(player) = grid.players.get_mut(&player_id) {
                player.probot.last_said = Some(message);
            }
            Ok(NativeOutcome::Value(None))
        })
    });

    map.insert("random".to_string(), {
        native(&[], move |_frame| {
            let n: f64 = rand::thread_rng().gen();
            Ok(NativeOutcome::Value(Some(Value::Float(n))))
        })
    });

    map.insert("random_int".to_string(), {
        native(&["low", "high"], move |frame| {
            let low = arg_int(frame, "low").unwrap_or(0);
            let high = arg_int(frame, "high").unwrap_or(low);
            let n = if high > low { rand::thread_rng().gen_range(low..=high) } else { low };
            Ok(NativeOutcome::Value(Some(Value::Int(n))))
        })
    });

    map.insert("me".to_string(), {
        let world = Rc::clone(&world);
        let player_id = player_id.clone();
        native(&[], move |_frame| {
            let grid = world.borrow();
            let player = grid
                .players
                .get(&player_id)
                .ok_or_else(|| ProboticsError::native("unknown player"))?;
            let obj = Value::object();
            if let Value::Object(o) = &obj {
                let mut o = o.borrow_mut();
                o.insert("x".to_string(), Value::Int(player.probot.x as i64));
                o.insert("y".to_string(), Value::Int(player.probot.y as i64));
                o.insert("facing".to_string(), Value::str(player.probot.facing.as_str()));
                o.insert("energy".to_string(), Value::Int(player.probot.energy));
                o.insert("crystals".to_string(), Value::Int(player.probot.crystals));
            }
            Ok(NativeOutcome::Value(Some(obj)))
        })
    });

    map.insert("inspect".to_string(), {
        let world = Rc::clone(&world);
        let player_id = player_id.clone();
        native(&[], move |_frame| {
            let grid = world.borrow();
            let player = grid
                .players
                .get(&player_id)
                .ok_or_else(|| ProboticsError::native("unknown player"))?;
            let (dx, dy) = player.probot.facing.delta();
            let (tx, ty) = (player.probot.x + dx, player.probot.y + dy);
            let obj = Value::object();
            if let Value::Object(o) = &obj {
                let mut o = o.borrow_mut();
                o.insert("in_bounds".to_string(), Value::Bool(grid.in_bounds(tx, ty)));
                let occupant = grid.player_at(tx, ty);
                o.insert("occupied".to_string(), Value::Bool(occupant.is_some()));
                o.insert(
                    "occupant".to_string(),
                    occupant.map(|p| Value::str(p.id.clone())).unwrap_or(Value::Null),
                );
                let crystals = grid.crystals_on_ground.get(&(tx, ty)).copied().unwrap_or(0);
                o.insert("crystals".to_string(), Value::Int(crystals));
            }
            Ok(NativeOutcome::Value(Some(obj)))
        })
    });

    map.insert("players".to_string(), {
        let world = Rc::clone(&world);
        native(&[], move |_frame| {
            let grid = world.borrow();
            let list = Value::list();
            if let Value::List(l) = &list {
                let mut l = l.borrow_mut();
                for id in grid.players.keys() {
                    l.push(Value::str(id.clone()));
                }
            }
            Ok(NativeOutcome::Value(Some(list)))
        })
    });

    map.insert("give".to_string(), {
        let world = Rc::clone(&world);
        let player_id = player_id.clone();
        native(&["to", "amount"], move |frame| {
            let to = arg_str(frame, "to").ok_or_else(|| ProboticsError::native("give() requires a target player id"))?;
            let amount = arg_int(frame, "amount").unwrap_or(0);
            let mut grid = world.borrow_mut();

            let (giver_pos, giver_crystals) = {
                let giver = grid
                    .players
                    .get(&player_id)
                    .ok_or_else(|| ProboticsError::native("unknown player"))?;
                ((giver.probot.x, giver.probot.y), giver.probot.crystals)
            };
            let receiver_pos = grid
                .players
                .get(&to)
                .map(|p| (p.probot.x, p.probot.y))
                .ok_or_else(|| ProboticsError::native(format!("no such player '{to}'")))?;

            let adjacent = (giver_pos.0 - receiver_pos.0).abs() + (giver_pos.1 - receiver_pos.1).abs() == 1;
            let ok = adjacent && amount > 0 && amount <= giver_crystals;
            if ok {
                grid.players.get_mut(&player_id).unwrap().probot.crystals -= amount;
                grid.players.get_mut(&to).unwrap().probot.crystals += amount;
            }
            Ok(NativeOutcome::Value(Some(Value::Bool(ok))))
        })
    });

    map.insert("collect".to_string(), {
        let world = Rc::clone(&world);
        let player_id = player_id.clone();
        native(&[], move |_frame| {
            let mut grid = world.borrow_mut();
            let pos = {
                let player = grid
                    .players
                    .get(&player_id)
                    .ok_or_else(|| ProboticsError::native("unknown player"))?;
                (player.probot.x, player.probot.y)
            };
            let picked = grid.crystals_on_ground.remove(&pos).unwrap_or(0);
            if picked > 0 {
                grid.players.get_mut(&player_id).unwrap().probot.crystals += picked;
            }
            Ok(NativeOutcome::Value(Some(Value::Int(picked))))
        })
    });

    Rc::new(RefCell::new(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::frame::new_scope;
    use std::rc::Rc;

    fn single_player_world() -> WorldHandle {
        let mut grid = Grid::new(5, 5);
        grid.add_player("p1", 2, 2, 100);
        Rc::new(RefCell::new(grid))
    }

    fn rig() -> (Rc<RefCell<Processor>>, Rc<RefCell<TransitionEngine<()>>>, Rc<RefCell<Scheduler>>) {
        (
            Rc::new(RefCell::new(Processor::new(10.0))),
            Rc::new(RefCell::new(TransitionEngine::new())),
            Rc::new(RefCell::new(Scheduler::new())),
        )
    }

    fn call_native(value: &Value, frame: &mut StackFrame) -> Result<NativeOutcome, ProboticsError> {
        match value {
            Value::Block(b) => match b.operations.first() {
                Some(crate::bytecode::Instruction::Native(f)) => f(frame),
                _ => panic!("not a native block"),
            },
            _ => panic!("not a block"),
        }
    }

    #[test]
    fn move_steps_forward_when_unblocked() {
        let world = single_player_world();
        let (processor, transitions, scheduler) = rig();
        let builtins = player_builtins(Rc::clone(&world), "p1".to_string(), Rc::clone(&processor), transitions, scheduler);
        let mut frame = StackFrame::outer(Rc::new(Vec::new()), new_scope(), builtins.clone());
        let move_fn = builtins.borrow().get("move").unwrap().clone();
        let outcome = call_native(&move_fn, &mut frame).unwrap();
        match outcome {
            NativeOutcome::Value(Some(Value::Bool(true))) => {}
            _ => panic!("expected successful move"),
        }
        // The position change lands in `on_start`, a queued work item -- it
        // hasn't run until the processor ticks.
        {
            let grid = world.borrow();
            let p = grid.players.get("p1").unwrap();
            assert_eq!((p.probot.x, p.probot.y), (2, 2));
        }
        processor.borrow_mut().process_tick().unwrap();
        let grid = world.borrow();
        let p = grid.players.get("p1").unwrap();
        assert_eq!((p.probot.x, p.probot.y), (2, 1));
    }

    #[test]
    fn collect_picks_up_ground_crystals() {
        let world = single_player_world();
        world.borrow_mut().crystals_on_ground.insert((2, 2), 3);
        let (processor, transitions, scheduler) = rig();
        let builtins = player_builtins(Rc::clone(&world), "p1".to_string(), processor, transitions, scheduler);
        let mut frame = StackFrame::outer(Rc::new(Vec::new()), new_scope(), builtins.clone());
        let collect_fn = builtins.borrow().get("collect").unwrap().clone();
        let outcome = call_native(&collect_fn, &mut frame).unwrap();
        match outcome {
            NativeOutcome::Value(Some(Value::Int(3))) => {}
            other => panic!("expected 3 crystals collected, got {other:?}"),
        }
        let grid = world.borrow();
        assert_eq!(grid.players.get("p1").unwrap().probot.crystals, 3);
        assert!(grid.crystals_on_ground.get(&(2, 2)).is_none());
    }
}
