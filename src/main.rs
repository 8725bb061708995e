use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rvemu::config::{self, Config, Xlen};
use rvemu::image::{self, ElfImage};
use rvemu::{Machine, TraceWriter};
use tracing_subscriber::EnvFilter;

fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn parse_usize(s: &str) -> Result<usize, String> {
    let v = parse_u64(s)?;
    usize::try_from(v).map_err(|e| format!("invalid size '{s}': {e}"))
}

fn parse_xlen(s: &str) -> Result<Xlen, String> {
    s.parse::<u32>()
        .ok()
        .and_then(Xlen::from_bits)
        .ok_or_else(|| format!("unsupported XLEN '{s}' (expected 32 or 64)"))
}

#[derive(Parser, Debug)]
#[command(version, about = "Cycle-stepped RISC-V simulator")]
struct Args {
    /// Program image: little-endian 32-bit words loaded at address 0
    image: PathBuf,

    /// Treat the image as an ELF executable instead of a raw word dump
    #[arg(long)]
    elf: bool,

    /// Register width (32 or 64)
    #[arg(long, default_value = "32", value_parser = parse_xlen)]
    xlen: Xlen,

    /// Disable the compressed (C) extension
    #[arg(long)]
    no_compressed: bool,

    /// Halt after this many cycles
    #[arg(long, default_value_t = config::DEFAULT_TIMEOUT, value_parser = parse_u64)]
    timeout: u64,

    #[arg(long, default_value_t = config::DEFAULT_RESET_VECTOR, value_parser = parse_u64)]
    reset_vector: u64,

    #[arg(long, default_value_t = config::DEFAULT_MTIME_ADDR, value_parser = parse_u64)]
    mtime_addr: u64,

    #[arg(long, default_value_t = config::DEFAULT_TOHOST_ADDR, value_parser = parse_u64)]
    tohost_addr: u64,

    /// RAM size in bytes
    #[arg(long, default_value_t = config::DEFAULT_MEM_SIZE, value_parser = parse_usize)]
    mem_size: usize,

    /// Write a register-file trace after every instruction
    #[arg(long, num_args = 0..=1, default_missing_value = "trace_rf.txt")]
    trace: Option<PathBuf>,

    /// Annotate the trace with mnemonics
    #[arg(long)]
    debug: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = image::read_image(&args.image)?;

    let mut config = Config {
        xlen: args.xlen,
        compressed: !args.no_compressed,
        timeout: args.timeout,
        reset_vector: args.reset_vector,
        mtime_addr: args.mtime_addr,
        tohost_addr: args.tohost_addr,
        mem_size: args.mem_size,
        ..Config::default()
    };

    let elf = if args.elf {
        let elf = ElfImage::parse(&bytes, args.xlen)?;
        config.reset_vector = elf.entry;
        if let Some(tohost) = elf.tohost {
            tracing::info!(tohost = format_args!("0x{tohost:x}"), "using tohost symbol");
            config.tohost_addr = tohost;
        }
        Some(elf)
    } else {
        None
    };

    let mut machine = Machine::new(config);
    match &elf {
        Some(elf) => elf.load_into(&mut machine.bus.ram)?,
        None => {
            machine.load_image(&bytes)?;
        }
    }

    let mut trace = match &args.trace {
        Some(path) => Some(TraceWriter::new(BufWriter::new(File::create(path)?), args.debug)),
        None => None,
    };

    loop {
        let step = machine.step()?;
        if let Some(trace) = trace.as_mut() {
            trace.record(&machine.snapshot(), &step.retired)?;
        }
        if step.halt.is_some() {
            break;
        }
    }

    if let Some(mut trace) = trace {
        trace.flush()?;
    }

    println!();
    println!("cycle: {}", machine.cycle());
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
