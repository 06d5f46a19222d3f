use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sente_core::SyntheticPosition;
use sente_engine::{EngineConfig, Limits, ThreadPool};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Seeds of the positions searched by `bench`.
const BENCH_SEEDS: [u64; 8] = [1, 7, 42, 99, 256, 1024, 4096, 65_537];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transposition table size in MB (overrides the config file)
    #[arg(long)]
    hash: Option<usize>,

    /// Search threads (overrides the config file)
    #[arg(long)]
    threads: Option<usize>,

    /// Principal variations to report (overrides the config file)
    #[arg(long)]
    multi_pv: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search a fixed set of synthetic positions and report nodes per second
    Bench {
        #[arg(short, long, default_value_t = 10)]
        depth: i32,
    },
    /// Search one synthetic position, printing progress reports
    Think {
        /// Seed of the synthetic position
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Plies played before the position
        #[arg(long, default_value_t = 0)]
        ply: u32,
        #[arg(short, long)]
        depth: Option<i32>,
        /// Fixed thinking time in milliseconds
        #[arg(long)]
        movetime: Option<u64>,
        /// Clock time in milliseconds for each side
        #[arg(long)]
        time: Option<u64>,
        #[arg(long, default_value_t = 0)]
        byoyomi: u64,
        #[arg(long)]
        nodes: Option<u64>,
    },
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(hash) = args.hash {
        config.hash_mb = hash;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(multi_pv) = args.multi_pv {
        config.multi_pv = multi_pv;
    }
    config.validate().context("invalid engine options")?;
    Ok(config)
}

fn bench(config: EngineConfig, depth: i32) -> Result<()> {
    let mut pool = ThreadPool::new(config).context("starting the search threads")?;
    let start = Instant::now();
    let mut nodes = 0;
    for seed in BENCH_SEEDS {
        pool.new_game();
        let result = pool.search(&SyntheticPosition::new(seed), Limits::fixed_depth(depth));
        println!("seed {seed:>6}: {result} nodes {}", result.nodes);
        nodes += result.nodes;
    }
    let elapsed = start.elapsed();
    let nps = nodes * 1000 / (elapsed.as_millis() as u64).max(1);
    println!("===========================");
    println!("Total time (ms) : {}", elapsed.as_millis());
    println!("Nodes searched  : {nodes}");
    println!("Nodes/second    : {nps}");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(hash_mb = config.hash_mb, threads = config.threads, "sente starting");

    match args.command {
        Command::Bench { depth } => bench(config, depth),
        Command::Think {
            seed,
            ply,
            depth,
            movetime,
            time,
            byoyomi,
            nodes,
        } => {
            let limits = match (movetime, time) {
                (Some(ms), _) => Limits::fixed_time(Duration::from_millis(ms)),
                (None, Some(ms)) => {
                    Limits::clock(Duration::from_millis(ms), Duration::ZERO, Duration::from_millis(byoyomi))
                }
                (None, None) if depth.is_none() && nodes.is_none() => {
                    anyhow::bail!("think needs a limit: --depth, --movetime, --time or --nodes")
                }
                (None, None) => Limits::default(),
            };
            let limits = Limits { depth, nodes, ..limits };

            let mut pool = ThreadPool::new(config).context("starting the search threads")?;
            pool.set_info_callback(|info| println!("{info}"));
            let result = pool.search(&SyntheticPosition::new(seed).with_game_ply(ply), limits);
            println!("{result}");
            Ok(())
        }
    }
}
