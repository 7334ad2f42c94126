//! Front-end model CLI.
//!
//! This binary provides a single entry point for driving the fetch-stage
//! model. It performs:
//! 1. **Run:** Execute a synthetic instruction stream through the front
//!    end for a number of cycles and report statistics.
//! 2. **Configuration:** Built-in defaults or a JSON config file.

use clap::{Parser, Subcommand};
use std::{fs, process};

use fdip_core::config::Config;
use fdip_core::isa::demo::{assemble, DemoOp};
use fdip_core::FrontEnd;

#[derive(Parser, Debug)]
#[command(
    name = "fdipsim",
    author,
    version,
    about = "Decoupled front-end fetch-stage model",
    long_about = "Drive the fetch stage of an out-of-order CPU model with a synthetic \
                  instruction stream.\n\nConfiguration is JSON (see fdip_core::config::Config); \
                  the CLI uses built-in defaults when no file is given.\n\nExamples:\n  \
                  fdipsim run --cycles 200\n  fdipsim run -c config.json --stats summary,prefetch"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a synthetic stream through the front end.
    Run {
        /// JSON configuration file (defaults when omitted).
        #[arg(short, long)]
        config: Option<String>,

        /// Number of cycles to simulate.
        #[arg(long, default_value_t = 200)]
        cycles: u64,

        /// Start PC of the synthetic stream.
        #[arg(long, default_value_t = 0x1000)]
        start_pc: u64,

        /// Cache blocks of straight-line code to generate.
        #[arg(long, default_value_t = 16)]
        blocks: u64,

        /// Statistics sections to print (comma separated; empty = all).
        #[arg(long, value_delimiter = ',')]
        stats: Vec<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            cycles,
            start_pc,
            blocks,
            stats,
        } => cmd_run(config, cycles, start_pc, blocks, stats),
    }
}

/// Loads the configuration, builds the front end, and runs it.
fn cmd_run(config: Option<String>, cycles: u64, start_pc: u64, blocks: u64, stats: Vec<String>) {
    let config = match config {
        Some(path) => {
            let text = fs::read_to_string(&path).unwrap_or_else(|e| {
                eprintln!("Error reading config {}: {}", path, e);
                process::exit(1);
            });
            serde_json::from_str::<Config>(&text).unwrap_or_else(|e| {
                eprintln!("Error parsing config {}: {}", path, e);
                process::exit(1);
            })
        }
        None => Config::default(),
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        process::exit(1);
    }

    let mut front_end = FrontEnd::new(&config).unwrap_or_else(|e| {
        eprintln!("Error building front end: {}", e);
        process::exit(1);
    });

    println!(
        "Configuration: fetch_width={} decode_width={} buffer={}B decoupled={}",
        config.fetch.fetch_width,
        config.fetch.decode_width,
        config.fetch.fetch_buffer_size,
        config.fetch.decoupled_front_end
    );
    println!(
        "[*] Running {} cycles of straight-line code at {:#x} ({} blocks)",
        cycles, start_pc, blocks
    );

    let blk = config.fetch.cache_blk_size as u64;
    let insts_per_block = (blk / 4) as usize;

    // Straight-line code: every block full of ALU ops, every block a
    // fall-through fetch target.
    let image = assemble(&vec![DemoOp::Alu; insts_per_block * blocks as usize]);
    front_end.load_program(start_pc, &image);
    front_end.set_start_pc(0, start_pc);
    for b in 0..blocks {
        let start = start_pc + b * blk;
        front_end.ftq.push(0, start, start + blk, true);
    }

    let mut delivered: u64 = 0;
    for _ in 0..cycles {
        let out = front_end.tick();
        delivered += out.to_decode.len() as u64;
    }

    println!("[*] Delivered {} instructions to decode", delivered);
    front_end.fetch.stats.print_sections(&stats);
}
