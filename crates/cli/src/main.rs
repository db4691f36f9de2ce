use std::collections::HashSet;
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{event, Level};
use tracing_subscriber::prelude::*;

use avr_core::{disasm, hex, savestate, Avr, BusCycle, CoreError, TraceBuffer};

#[derive(Parser, Debug)]
#[command(name = "avr-sim")]
#[command(version = "0.1.0")]
#[command(about = "Cycle-accurate simulator for an AVR-compatible multi-cycle core")]
struct Args {
    /// Program image: Intel HEX (.hex), anything else is raw little-endian words
    program: PathBuf,

    /// Clock cycles to run in headless mode
    #[arg(short, long, default_value = "10000")]
    cycles: u64,

    /// Cycles to hold reset before releasing it
    #[arg(long, default_value = "1")]
    reset_cycles: u64,

    /// Stop before executing the instruction at this word address (hex)
    #[arg(short = 'b', long = "break", value_parser = parse_addr)]
    breakpoints: Vec<u16>,

    /// Print every bus cycle
    #[arg(short, long)]
    trace: bool,

    /// Interactive single-step mode
    #[arg(short, long)]
    step: bool,

    /// Restore <program>.state instead of resetting
    #[arg(long)]
    load_state: bool,

    /// Write <program>.state when done
    #[arg(long)]
    save_state: bool,

    /// Bus cycles kept for post-mortem printing
    #[arg(long, default_value = "32")]
    history: usize,
}

fn parse_addr(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("bad word address {:?}: {}", s, e))
}

enum Stop {
    Budget,
    Breakpoint(u16),
    Fault(CoreError),
}

struct Session {
    avr: Avr,
    history: TraceBuffer,
    breakpoints: HashSet<u16>,
    print_trace: bool,
}

impl Session {
    fn tick(&mut self) -> Result<BusCycle, CoreError> {
        let cycle = self.avr.tick()?;
        if self.print_trace {
            println!("{}", cycle);
        }
        self.history.push(cycle);
        Ok(cycle)
    }

    /// One whole instruction.
    fn step(&mut self) -> Result<(), CoreError> {
        loop {
            let cycle = self.tick()?;
            if cycle.last || cycle.reset {
                return Ok(());
            }
        }
    }

    /// An instruction on a breakpoint is about to start its first cycle.
    fn at_breakpoint(&self) -> bool {
        self.avr.control.cycle == 1 && self.breakpoints.contains(&self.avr.control.ir_addr)
    }

    /// Run up to `budget` cycles. A breakpoint under the starting
    /// instruction is ignored so a stopped run can be resumed.
    fn run(&mut self, budget: u64) -> Stop {
        for n in 0..budget {
            if n > 0 && self.at_breakpoint() {
                return Stop::Breakpoint(self.avr.control.ir_addr);
            }
            if let Err(e) = self.tick() {
                return Stop::Fault(e);
            }
        }
        Stop::Budget
    }

    fn print_history(&self) {
        println!("Last {} bus cycles:", self.history.len());
        for cycle in self.history.iter() {
            println!("  {}", cycle);
        }
    }

    /// Up to `count` instructions starting at the one about to execute.
    fn listing(&self, count: u16) -> Vec<String> {
        // the reset bubble has no instruction address yet
        let start = match self.avr.control.ir_addr {
            0xFFFF => self.avr.pc(),
            addr => addr,
        };
        disasm::disassemble_range(self.avr.program.words(), start, start.saturating_add(count))
    }

    fn print_next(&self) {
        println!("Next: {:04X}: {}", self.avr.control.ir_addr, self.avr.disasm_current());
    }
}

fn load_program(avr: &mut Avr, path: &Path) -> Result<usize, Box<dyn Error>> {
    let is_hex = path.extension().map_or(false, |e| e.eq_ignore_ascii_case("hex"));
    if is_hex {
        let text = std::fs::read_to_string(path)?;
        Ok(avr.load_hex(&text)?)
    } else {
        let bytes = std::fs::read(path)?;
        Ok(avr.load_program(&hex::to_words(&bytes)))
    }
}

// ─── Step Mode ──────────────────────────────────────────────────────────────

/// Program words shown by the step-mode listing.
const LISTING_WORDS: u16 = 16;

fn run_step_mode(session: &mut Session, max_cycles: u64) {
    println!("Step mode: Enter=step, N<enter>=step N, r=run to break, d=dump, t=trace, l=list, q=quit");
    println!("{}", session.avr.dump_regs());
    session.print_next();

    let stdin = std::io::stdin();
    let mut steps = 0usize;
    loop {
        let mut line = String::new();
        print!("step> ");
        let _ = std::io::stdout().flush();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let cmd = line.trim();
        match cmd {
            "q" | "quit" => break,
            "d" | "dump" => {
                println!("{}", session.avr.dump_regs());
                continue;
            }
            "t" | "trace" => {
                session.print_history();
                continue;
            }
            "l" | "list" => {
                for line in session.listing(LISTING_WORDS) {
                    println!("  {}", line);
                }
                continue;
            }
            "r" | "run" => {
                match session.run(max_cycles) {
                    Stop::Budget => println!("  ... {} cycles, no breakpoint", max_cycles),
                    Stop::Breakpoint(addr) => println!("*** Breakpoint at {:04X} ***", addr),
                    Stop::Fault(e) => println!("*** {} ***", e),
                }
                println!("{}", session.avr.dump_regs());
                session.print_next();
                continue;
            }
            _ => {}
        }
        let n: usize = cmd.parse().unwrap_or(1);
        for i in 0..n {
            let asm = format!("{:04X}: {}", session.avr.control.ir_addr, session.avr.disasm_current());
            if let Err(e) = session.step() {
                println!("*** {} ***", e);
                break;
            }
            steps += 1;
            if n <= 20 {
                println!("  {}", asm);
            } else if i == n - 1 {
                println!("  ... {} steps, last: {}", n, asm);
            }
        }
        println!("{}", session.avr.dump_regs());
        session.print_next();
    }
    println!("Total: {} steps, {} cycles", steps, session.avr.tick);
}

// ─── Headless Mode ──────────────────────────────────────────────────────────

fn run_headless(session: &mut Session, cycles: u64) -> Result<(), CoreError> {
    match session.run(cycles) {
        Stop::Budget => {
            event!(Level::INFO, "ran {} cycles", cycles);
            Ok(())
        }
        Stop::Breakpoint(addr) => {
            println!("*** Breakpoint at {:04X}: {} ***", addr, session.avr.disasm_current());
            session.print_history();
            Ok(())
        }
        Stop::Fault(e) => {
            println!("*** {} ***", e);
            session.print_history();
            Err(e)
        }
    }
}

fn run_simulator() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let mut avr = Avr::new();
    let words = load_program(&mut avr, &args.program)?;
    event!(Level::INFO, "{}: {} program words", args.program.display(), words);

    let state_file = savestate::state_path(&args.program);
    let mut session = Session {
        avr,
        history: TraceBuffer::new(args.history),
        breakpoints: args.breakpoints.iter().copied().collect(),
        print_trace: args.trace,
    };

    if args.load_state {
        let state = savestate::load_from_file(&state_file)?;
        session.avr.load_state(&state);
        event!(Level::INFO, "restored {}", state_file.display());
    } else if args.reset_cycles > 0 {
        session.avr.set_reset(true);
        for _ in 0..args.reset_cycles {
            session.tick()?;
        }
        session.avr.set_reset(false);
    }

    let outcome = if args.step {
        run_step_mode(&mut session, args.cycles);
        Ok(())
    } else {
        run_headless(&mut session, args.cycles)
    };

    println!("{}", session.avr.dump_regs());

    if args.save_state {
        savestate::save_to_file(&session.avr.save_state(), &state_file)?;
        event!(Level::INFO, "saved {}", state_file.display());
    }

    outcome?;
    Ok(())
}

fn main() {
    match run_simulator() {
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
