// File: src/repl.rs
//
// Interactive single-player sandbox over the full engine: every line is
// compiled and executed against one player's persistent globals on a
// throwaway world, driven to completion before the prompt returns. Built on
// the same `ProgrammingService` + `Scheduler` a multiplayer host would use,
// just with one player and no tick pacing.

use std::cell::RefCell;
use std::rc::Rc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::processor::Processor;
use crate::programming::{ExecuteCallbacks, ProgrammingService};
use crate::scheduler::Scheduler;
use crate::world::Grid;

const PLAYER: &str = "repl";

pub struct Repl {
    service: ProgrammingService,
    scheduler: Rc<RefCell<Scheduler>>,
    processor: Rc<RefCell<Processor>>,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        let mut grid = Grid::new(20, 20);
        grid.add_player(PLAYER, 10, 10, 100);
        let world = Rc::new(RefCell::new(grid));
        let mut service = ProgrammingService::new(world);
        let scheduler = Rc::new(RefCell::new(Scheduler::new()));
        let processor = Rc::new(RefCell::new(Processor::new(10.0)));
        service.execute(&scheduler, &processor, vec![], PLAYER, false, true, ExecuteCallbacks::default());
        Ok(Repl { service, scheduler, processor, editor })
    }

    fn show_banner(&self) {
        println!("{}", "Probotics REPL".bright_cyan().bold());
        println!("{}", "Type a script line, or :help for commands. Ctrl+D to exit.".dimmed());
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();
        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() {
                "probotics> ".bright_green().to_string()
            } else {
                "........> ".bright_blue().to_string()
            };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim().starts_with(':') {
                        if self.handle_command(line.trim()) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if is_input_complete(&buffer) {
                        self.eval_input(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (Ctrl+C to interrupt, :quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "Goodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns true to continue the REPL, false to quit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                self.show_help();
                true
            }
            ":quit" | ":q" | ":exit" => {
                println!("{}", "Goodbye!".bright_cyan());
                false
            }
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":reset" | ":r" => {
                self.scheduler = Rc::new(RefCell::new(Scheduler::new()));
                self.processor = Rc::new(RefCell::new(Processor::new(10.0)));
                self.service.execute(
                    &self.scheduler,
                    &self.processor,
                    vec![],
                    PLAYER,
                    false,
                    true,
                    ExecuteCallbacks::default(),
                );
                println!("{}", "\u{2713} Globals reset".bright_green());
                true
            }
            _ => {
                println!(
                    "{} Unknown command: {}. Type {}{}{}",
                    "Error:".bright_red(),
                    cmd.bright_yellow(),
                    ":".bright_blue(),
                    "help".bright_yellow(),
                    " for available commands.".bright_blue()
                );
                true
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("{}", "REPL Commands:".bright_cyan().bold());
        println!("  {}{}  Display this help message", ":help".bright_yellow(), " or :h     ".dimmed());
        println!("  {}{}  Exit the REPL", ":quit".bright_yellow(), " or :q     ".dimmed());
        println!("  {}{}  Clear the screen", ":clear".bright_yellow(), " or :c    ".dimmed());
        println!("  {}{}  Reset globals", ":reset".bright_yellow(), " or :r   ".dimmed());
        println!();
        println!("{}", "Multi-line Input:".bright_cyan().bold());
        println!("  Leave braces, brackets, or parentheses unclosed to continue");
        println!("  on the next line. Close them to execute the statement.");
        println!();
    }

    /// Compiles and runs one buffered statement to completion, printing its
    /// result or any raised error. Reuses the REPL's own scheduler so a block
    /// assigned on one line is callable from the next.
    fn eval_input(&mut self, source: &str) {
        if source.trim().is_empty() {
            return;
        }
        let ops = match self.service.compile(source) {
            Ok(ops) => ops,
            Err(e) => {
                print!("{e}");
                return;
            }
        };

        let error = Rc::new(RefCell::new(None));
        let error_for_cb = Rc::clone(&error);
        let result = Rc::new(RefCell::new(None));
        let result_for_cb = Rc::clone(&result);
        let callbacks = ExecuteCallbacks {
            on_result: Some(Box::new(move |v| *result_for_cb.borrow_mut() = v)),
            on_exception: Some(Box::new(move |e| *error_for_cb.borrow_mut() = Some(e.clone()))),
            ..Default::default()
        };

        self.service.execute(&self.scheduler, &self.processor, ops, PLAYER, false, false, callbacks);
        while self.scheduler.borrow().has_pending() {
            if let Err(e) = self.processor.borrow_mut().process_tick() {
                eprintln!("{e}");
                break;
            }
        }

        if let Some(e) = error.borrow().as_ref() {
            print!("{e}");
        } else if let Some(v) = result.borrow().as_ref() {
            println!("{}", format!("{v}").bright_white());
        }
    }
}

/// True if all brackets/braces/parentheses are balanced outside of strings
/// and comments, so the REPL knows to keep buffering the current statement.
fn is_input_complete(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return true;
    }

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;
    let mut in_comment = false;

    for ch in trimmed.chars() {
        if in_comment {
            if ch == '\n' {
                in_comment = false;
            }
            continue;
        }
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '#' if !in_string => in_comment = true,
            '{' | '[' | '(' if !in_string => depth += 1,
            '}' | ']' | ')' if !in_string => depth -= 1,
            _ => {}
        }
    }

    depth <= 0 && !in_string
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_braces_are_complete() {
        assert!(is_input_complete("func greet(name) { name }"));
    }

    #[test]
    fn unclosed_brace_is_incomplete() {
        assert!(!is_input_complete("greet := () {"));
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        assert!(is_input_complete("say(\"{ not a brace }\")"));
    }
}
