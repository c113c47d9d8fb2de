// File: src/main.rs
//
// Entry point for the Probotics execution core. Dispatches to `run` (compile
// and drive a script to completion against a throwaway single-player world)
// or `repl` (the interactive sandbox).

use clap::{Parser as ClapParser, Subcommand};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use probotics::config::EngineConfig;
use probotics::processor::Processor;
use probotics::programming::{ExecuteCallbacks, ProgrammingService};
use probotics::repl::Repl;
use probotics::scheduler::Scheduler;
use probotics::world::Grid;

#[derive(ClapParser)]
#[command(
    name = "probotics",
    about = "Probotics: a multiplayer programming game's execution core",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Compile and run a script file against a throwaway single-player world
    Run {
        /// Path to the script file
        file: PathBuf,

        /// Path to a TOML engine config (defaults are used if omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Launch the interactive sandbox REPL
    Repl,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { file, config } => run_file(&file, config.as_deref()),
        Commands::Repl => run_repl(),
    };

    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run_file(file: &std::path::Path, config: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = match config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let source = std::fs::read_to_string(file)?;

    let mut grid = Grid::new(cfg.map_width, cfg.map_height);
    grid.add_player("player", cfg.map_width / 2, cfg.map_height / 2, cfg.starting_energy);
    let world = Rc::new(RefCell::new(grid));
    let mut service = ProgrammingService::new(world);
    let scheduler = Rc::new(RefCell::new(Scheduler::new()));
    let processor = Rc::new(RefCell::new(Processor::new(cfg.ticks_per_sec)));

    let ops = service.compile(&source)?;

    let error = Rc::new(RefCell::new(None));
    let error_for_cb = Rc::clone(&error);
    let result = Rc::new(RefCell::new(None));
    let result_for_cb = Rc::clone(&result);
    let callbacks = ExecuteCallbacks {
        on_result: Some(Box::new(move |v| *result_for_cb.borrow_mut() = v)),
        on_exception: Some(Box::new(move |e| *error_for_cb.borrow_mut() = Some(e.clone()))),
        ..Default::default()
    };

    service.execute(&scheduler, &processor, ops, "player", true, true, callbacks);
    while scheduler.borrow().has_pending() {
        processor.borrow_mut().process_tick()?;
    }

    if let Some(e) = error.borrow().as_ref() {
        return Err(format!("{e}").into());
    }
    if let Some(v) = result.borrow().as_ref() {
        println!("{v}");
    }
    Ok(())
}

fn run_repl() -> Result<(), Box<dyn std::error::Error>> {
    let mut repl = Repl::new()?;
    repl.run()
}
