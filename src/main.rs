use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rankdist::eval::{self, DcgVersion, Scenario};
use rankdist::generate;
use rankdist::numeric::log_sum_exp;
use rankdist::precision::{MeanPrecisionReport, PrecisionReport};
use rankdist::topk::{self, TopKApproach};
use rankdist::{CalculateMode, Config, ExecutionContext, ExpectedPrecisionCalculator, TieBreaking};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Exact rank distributions and expected Precision@k under score uncertainty.
#[derive(Parser, Debug)]
#[command(name = "rankdist", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Expected precision of a candidate list.
    Precision {
        /// Scenario JSON file.
        scenario: PathBuf,
        /// Comma-separated candidate indices (overrides the scenario's list).
        #[arg(long, value_delimiter = ',')]
        candidates: Option<Vec<usize>>,
        /// "dp" or "enumeration" (default from config).
        #[arg(long)]
        mode: Option<String>,
    },
    /// Mean expected precision over every prefix of a candidate list.
    MeanPrecision {
        scenario: PathBuf,
        #[arg(long, value_delimiter = ',')]
        candidates: Option<Vec<usize>>,
    },
    /// Rank distribution of every item within the top k.
    RankDist {
        scenario: PathBuf,
        /// Rank window (default: scenario k, else the universe size).
        #[arg(long)]
        k: Option<usize>,
        /// "pairwise" or "exact" (default from config).
        #[arg(long)]
        tie_breaking: Option<String>,
        /// Exact tie-breaking batch size; 0 picks floor(sqrt(N)).
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Top-k answers by each approach, scored against the scenario's grades.
    TopK {
        scenario: PathBuf,
        #[arg(long)]
        k: Option<usize>,
        /// Approach names; all approaches when omitted.
        #[arg(long, value_delimiter = ',')]
        approach: Option<Vec<String>>,
    },
    /// Write a seeded random scenario.
    Random {
        #[arg(long, default_value_t = 10)]
        items: usize,
        #[arg(long, default_value_t = 3)]
        scores: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Use slot indices as score values.
        #[arg(long)]
        index_values: bool,
        /// Candidate list `0..c` stored in the scenario.
        #[arg(long)]
        candidates: Option<usize>,
        /// Output file (stdout when omitted).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the configured level
    let rust_log = std::env::var("RUST_LOG").is_ok();
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "trace")).init();
    if !rust_log {
        log::set_max_level(log::LevelFilter::Info);
    }

    let config = Config::load()?;
    if !rust_log {
        log::set_max_level(config.log_level_filter());
    }

    let ctx = ExecutionContext::new(config.device()?);

    match cli.command {
        Command::Precision {
            scenario,
            candidates,
            mode,
        } => run_precision(&config, &ctx, &scenario, candidates, mode.as_deref()),
        Command::MeanPrecision {
            scenario,
            candidates,
        } => run_mean_precision(&ctx, &scenario, candidates),
        Command::RankDist {
            scenario,
            k,
            tie_breaking,
            batch_size,
        } => run_rank_dist(&config, &ctx, &scenario, k, tie_breaking.as_deref(), batch_size),
        Command::TopK {
            scenario,
            k,
            approach,
        } => run_top_k(&config, &ctx, &scenario, k, approach),
        Command::Random {
            items,
            scores,
            seed,
            index_values,
            candidates,
            output,
        } => run_random(items, scores, seed, index_values, candidates, output.as_deref()),
    }
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    Scenario::load(path).with_context(|| format!("Failed to load scenario {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve_candidates(scenario: &Scenario, candidates: Option<Vec<usize>>) -> Result<Vec<usize>> {
    match candidates {
        Some(list) => Ok(list),
        None => Ok(scenario.require_candidates()?.to_vec()),
    }
}

fn run_precision(
    config: &Config,
    ctx: &ExecutionContext,
    path: &Path,
    candidates: Option<Vec<usize>>,
    mode: Option<&str>,
) -> Result<()> {
    let scenario = load_scenario(path)?;
    let candidates = resolve_candidates(&scenario, candidates)?;
    let mode: CalculateMode = match mode {
        Some(m) => m.parse()?,
        None => config.calculate_mode()?,
    };

    let mut calculator = ExpectedPrecisionCalculator::new(scenario.universe()?)
        .with_max_enumeration_realizations(config.precision.max_enumeration_realizations);
    let start = Instant::now();
    let result = calculator.calculate_expected_precision(&candidates, mode, ctx)?;
    let report = PrecisionReport::new(mode, &candidates, &result, start.elapsed().as_millis(), ctx);
    print_json(&report)
}

fn run_mean_precision(ctx: &ExecutionContext, path: &Path, candidates: Option<Vec<usize>>) -> Result<()> {
    let scenario = load_scenario(path)?;
    let candidates = resolve_candidates(&scenario, candidates)?;

    let mut calculator = ExpectedPrecisionCalculator::new(scenario.universe()?);
    let start = Instant::now();
    let result = calculator.calculate_mean_expected_precision(&candidates, CalculateMode::Dp, ctx)?;
    let report = MeanPrecisionReport::new(&candidates, &result, start.elapsed().as_millis(), ctx);
    print_json(&report)
}

#[derive(Serialize)]
struct RankDistReport {
    strategy: &'static str,
    k: usize,
    /// `P(rank = r + 1)` per item, summed over score slots.
    rank_probabilities: Vec<Vec<f64>>,
    /// `P(rank <= k)` per item.
    top_k_probabilities: Vec<f64>,
    elapsed_ms: u128,
    degenerate_events: usize,
}

fn run_rank_dist(
    config: &Config,
    ctx: &ExecutionContext,
    path: &Path,
    k: Option<usize>,
    tie_breaking: Option<&str>,
    batch_size: Option<usize>,
) -> Result<()> {
    let scenario = load_scenario(path)?;
    let universe = scenario.universe()?;
    let k = k.or(scenario.k).unwrap_or(universe.len());
    let tie_breaking: TieBreaking = match tie_breaking {
        Some(t) => t.parse()?,
        None => config.tie_breaking()?,
    };
    let strategy = tie_breaking.strategy(batch_size.unwrap_or(config.engine.batch_size));

    let start = Instant::now();
    let table = strategy.rank_distribution(&universe, k, ctx)?;
    let elapsed_ms = start.elapsed().as_millis();
    log::info!("{} rank distribution (k={}) in {} ms", strategy.name(), k, elapsed_ms);

    let [n, window, n_scores] = table.shape();
    let rank_probabilities = (0..n)
        .map(|i| {
            let plane = table.plane(i);
            (0..window)
                .map(|r| log_sum_exp(plane[r * n_scores..(r + 1) * n_scores].iter().copied()).exp())
                .collect()
        })
        .collect();
    let top_k_probabilities = topk::log_top_k_probabilities(&table, k)
        .into_iter()
        .map(f64::exp)
        .collect();

    print_json(&RankDistReport {
        strategy: strategy.name(),
        k,
        rank_probabilities,
        top_k_probabilities,
        elapsed_ms,
        degenerate_events: ctx.degenerate_events(),
    })
}

#[derive(Serialize)]
struct TopKReport {
    answer: Vec<usize>,
    expected_dcg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<BTreeMap<&'static str, f64>>,
}

fn run_top_k(
    config: &Config,
    ctx: &ExecutionContext,
    path: &Path,
    k: Option<usize>,
    approaches: Option<Vec<String>>,
) -> Result<()> {
    let scenario = load_scenario(path)?;
    let universe = scenario.universe()?;
    let k = k.or(scenario.k).unwrap_or(universe.len());
    let approaches: Vec<TopKApproach> = match approaches {
        Some(names) => names
            .iter()
            .map(|name| name.parse())
            .collect::<rankdist::Result<_>>()?,
        None => TopKApproach::ALL.to_vec(),
    };
    let strategy = config.tie_breaking()?.strategy(config.engine.batch_size);
    let threshold = config.topk.relevance_threshold;
    let relevant = scenario.relevant_items(threshold);
    let groups = scenario.graded_groups();

    let mut reports = BTreeMap::new();
    for approach in approaches {
        let answer = topk::top_k_answer(approach, &universe, k, threshold, strategy.as_ref(), ctx)?;
        let metrics = scenario.grades.as_ref().map(|grades| {
            BTreeMap::from([
                ("precision_r_all", eval::precision_at_k(&answer, &relevant)),
                ("precision_r_k_ranked", eval::precision_k_ranked(&answer, &groups)),
                ("recall", eval::recall_at_k(&answer, &relevant)),
                ("dcg_l", eval::dcg(&answer, grades, DcgVersion::Liberal)),
                ("dcg_c", eval::dcg(&answer, grades, DcgVersion::Conservative)),
                ("ideal_dcg", eval::ideal_dcg(grades, k)),
            ])
        });
        reports.insert(
            approach.to_string(),
            TopKReport {
                expected_dcg: eval::expected_dcg(&universe, &answer),
                answer,
                metrics,
            },
        );
    }
    print_json(&reports)
}

fn run_random(
    items: usize,
    scores: usize,
    seed: u64,
    index_values: bool,
    candidates: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let universe = if index_values {
        generate::index_universe(items, scores, seed)?
    } else {
        generate::uniform_universe(items, scores, seed)?
    };
    let mut scenario = Scenario::from_universe(&universe);
    if let Some(c) = candidates {
        if c == 0 || c > items {
            anyhow::bail!("--candidates must be between 1 and {}", items);
        }
        scenario.candidates = Some((0..c).collect());
    }

    let json = serde_json::to_string_pretty(&scenario)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {} items x {} scores (seed {}) to {}", items, scores, seed, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
