use anyhow::{Context, Result};
use clap::Parser;
use forward_wf::*;
use rand::Rng;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(about = "Wright-Fisher simulation with deleterious mutations")]
struct Args {
    /// JSON parameter file; flags below are ignored when given
    #[arg(long)]
    config: Option<String>,
    /// Random seed (random if omitted)
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 5000)]
    runtime: usize,
    #[arg(long, default_value_t = 1000)]
    population_size: usize,
    #[arg(long, default_value_t = 0.01)]
    neutral_mutation_rate: f64,
    #[arg(long, default_value_t = 0.005)]
    selected_mutation_rate: f64,
    /// Mean selection coefficient of new mutations (negative is deleterious)
    #[arg(long, default_value_t = -0.01, allow_hyphen_values = true)]
    mean_s: f64,
    /// Gamma shape; constant effects if omitted
    #[arg(long)]
    shape: Option<f64>,
    #[arg(long, default_value_t = 0.5)]
    dominance: f64,
    #[arg(long, default_value_t = 0.01)]
    recombination_rate: f64,
    /// Share identical haplotypes between individuals
    #[arg(long)]
    dedup: bool,
    #[arg(long)]
    no_selfing: bool,
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let params = match &args.config {
        Some(path) => Parameters::from_json_file(path)
            .with_context(|| format!("reading parameters from {path}"))?,
        None => {
            let random_seed = args
                .seed
                .unwrap_or_else(|| rand::rng().random_range(1..u64::MAX));
            let effect_dist = match args.shape {
                Some(shape) => EffectDist::Gamma {
                    mean: args.mean_s,
                    shape,
                },
                None => EffectDist::Constant { s: args.mean_s },
            };
            Parameters {
                random_seed,
                population_size: args.population_size,
                runtime: args.runtime,
                neutral_mutation_rate: args.neutral_mutation_rate,
                selected_mutation_rate: args.selected_mutation_rate,
                recombination_rate: args.recombination_rate,
                effect_dist,
                dominance: args.dominance,
                fitness: FitnessKind::Multiplicative { scaling: 2.0 },
                haplotype_policy: if args.dedup {
                    HaplotypePolicy::Deduplicate
                } else {
                    HaplotypePolicy::Distinct
                },
                allow_selfing: !args.no_selfing,
                ..Parameters::default()
            }
        }
    };
    eprintln!("{:?}", params);

    let mut sim = WrightFisher::<()>::initialize(params)?;
    let mut tracker = SimpleTracker::new();
    sim.run(&mut tracker)?;

    // ── Summary statistics ────────────────────────────────────────────────────
    let pop = &sim.population;
    let n = tracker.records.len().max(1);
    let wbar: f64 = tracker.records.iter().map(|r| r.mean_fitness).sum::<f64>() / n as f64;
    let selected_fixed = pop
        .mutations()
        .fixations()
        .iter()
        .filter(|f| !f.mutation.neutral)
        .count();
    eprintln!("mean fitness: {wbar:.4}");
    eprintln!("segregating: {}", pop.mutations().num_segregating());
    eprintln!(
        "fixations: {} ({} selected)",
        pop.mutations().fixations().len(),
        selected_fixed
    );
    eprintln!("live haplotypes: {}", pop.haplotypes().num_live());
    Ok(())
}
