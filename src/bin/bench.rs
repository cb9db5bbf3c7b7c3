//! Runtime benchmark: time each rank-distribution strategy over generated
//! universes and emit one JSON line per run.

use clap::Parser;
use rankdist::generate;
use rankdist::rank::{ExactTieRankDist, RankDistribution, ScoreComparisonRankDist};
use rankdist::{Config, ExecutionContext, ExpectedPrecisionCalculator, CalculateMode};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

/// Time rank-distribution strategies and expected precision.
#[derive(Parser, Debug)]
#[command(name = "bench")]
struct Args {
    /// Universe sizes to run.
    #[arg(long, value_delimiter = ',', default_value = "10,50,100")]
    sizes: Vec<usize>,

    /// Score slots per item.
    #[arg(long, default_value_t = 5)]
    scores: usize,

    /// Rank window (clamped to the universe size).
    #[arg(long, default_value_t = 10)]
    k: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Slot-index score values (heavy ties) instead of uniform values.
    #[arg(long)]
    index_values: bool,

    /// Also time expected precision for the first k items as candidates.
    #[arg(long)]
    precision: bool,

    /// Append JSON lines here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct BenchRecord {
    benchmark: String,
    items: usize,
    scores: usize,
    k: usize,
    seed: u64,
    elapsed_ms: f64,
    degenerate_events: usize,
}

fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").is_ok();
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "trace")).init();
    if !rust_log {
        log::set_max_level(log::LevelFilter::Info);
    }

    let config = Config::load()?;
    if !rust_log {
        log::set_max_level(config.log_level_filter());
    }

    let args = Args::parse();
    let ctx = ExecutionContext::new(config.device()?);

    let mut sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?,
        ),
        None => Box::new(std::io::stdout()),
    };

    let strategies: Vec<Box<dyn RankDistribution>> = vec![
        Box::new(ScoreComparisonRankDist::new()),
        Box::new(ExactTieRankDist::one_by_one()),
        Box::new(ExactTieRankDist::batched_auto()),
    ];

    for &items in &args.sizes {
        if items == 0 {
            log::warn!("Skipping empty universe size");
            continue;
        }
        let universe = if args.index_values {
            generate::index_universe(items, args.scores, args.seed)?
        } else {
            generate::uniform_universe(items, args.scores, args.seed)?
        };
        let k = args.k.clamp(1, items);

        for strategy in &strategies {
            ctx.reset_diagnostics();
            let start = Instant::now();
            strategy.rank_distribution(&universe, k, &ctx)?;
            let record = BenchRecord {
                benchmark: strategy.name().to_string(),
                items,
                scores: args.scores,
                k,
                seed: args.seed,
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                degenerate_events: ctx.degenerate_events(),
            };
            writeln!(sink, "{}", serde_json::to_string(&record)?)?;
        }

        if args.precision {
            ctx.reset_diagnostics();
            let candidates: Vec<usize> = (0..k).collect();
            let mut calculator = ExpectedPrecisionCalculator::new(universe.clone());
            let start = Instant::now();
            calculator.calculate_expected_precision(&candidates, CalculateMode::Dp, &ctx)?;
            let record = BenchRecord {
                benchmark: "expected_precision".to_string(),
                items,
                scores: args.scores,
                k,
                seed: args.seed,
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                degenerate_events: ctx.degenerate_events(),
            };
            writeln!(sink, "{}", serde_json::to_string(&record)?)?;
        }
    }

    sink.flush()?;
    Ok(())
}
