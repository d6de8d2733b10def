use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zxdb_core::debugger::frontends::script::ScriptDebugger;
use zxdb_core::debugger::frontends::terminal::TerminalDebugger;
use zxdb_core::debugger::frontends::{Control, DebuggerFrontend};
use zxdb_core::debugger::StopReason;
use zxdb_core::{DebuggerConfig, FlatMachine, OutputBase, Session};

#[derive(Parser, Debug)]
#[command(name = "zxdb")]
#[command(about = "Z80 debugger console over a raw memory image")]
#[command(version)]
struct Args {
    /// Raw memory image to load
    image: Option<PathBuf>,

    /// Where the image is placed in memory, e.g. 0x8000
    #[arg(long, default_value = "0x8000", value_parser = parse_address)]
    load_address: u16,

    /// Base for printed values: 10 or 16
    #[arg(long, default_value_t = 16)]
    base: u32,

    /// Instructions shown by a bare `disassemble`
    #[arg(long, default_value_t = zxdb_core::config::DEFAULT_DISASSEMBLE_LINES)]
    disassemble_lines: usize,

    /// Debugger command to run at startup; may be repeated
    #[arg(short, long = "command")]
    commands: Vec<String>,

    /// Run commands from a file instead of the interactive console
    #[arg(long)]
    script: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn parse_address(text: &str) -> Result<u16, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix('$')) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|error| format!("invalid address '{}': {}", text, error))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout belongs to the console
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .init();

    let output_base = OutputBase::from_radix(args.base)?;

    let machine = match &args.image {
        Some(path) => {
            let image = std::fs::read(path)
                .with_context(|| format!("failed to read image {}", path.display()))?;
            let mut machine = FlatMachine::with_image(args.load_address, &image);
            machine.registers.pc = args.load_address;
            info!(path = %path.display(), bytes = image.len(), load_address = args.load_address, "image loaded");
            machine
        }
        None => FlatMachine::new(),
    };

    let config = DebuggerConfig {
        output_base,
        disassemble_lines: args.disassemble_lines,
        startup_commands: args.commands.clone(),
    };

    let mut session = Session::new(machine, config);
    for effect in session.run_startup_commands()? {
        println!("{}", effect);
    }

    let mut frontend = match &args.script {
        Some(path) => {
            let script = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read script {}", path.display()))?;
            DebuggerFrontend::from(ScriptDebugger::new(&script, Box::new(io::stdout())))
        }
        None => DebuggerFrontend::from(TerminalDebugger::stdio()),
    };

    session.debugger.stop(StopReason::Manual, Some(session.machine.registers.pc));

    loop {
        match session.interact(&mut frontend)? {
            Control::Quit => break,
            Control::Resume => {
                // No CPU core is attached to a bare memory image
                warn!("no CPU attached, execution cannot resume");
                let pc = session.machine.registers.pc;
                session.debugger.stop(StopReason::Manual, Some(pc));
            }
        }
    }

    Ok(())
}
