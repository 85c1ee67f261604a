use anyhow::Result;
use clap::Parser;
use forward_wf::*;
use rand::Rng;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(about = "Neutral Wright-Fisher simulation, infinite sites")]
struct Args {
    /// Random seed (random if omitted)
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 10000)]
    runtime: usize,
    #[arg(long, default_value_t = 1000)]
    population_size: usize,
    /// Expected new mutations per gamete
    #[arg(long, default_value_t = 0.01)]
    mutation_rate: f64,
    /// Expected crossovers per meiosis
    #[arg(long, default_value_t = 0.01)]
    recombination_rate: f64,
    /// Number of diploids in the reported sample
    #[arg(long, default_value_t = 50)]
    sample_size: usize,
    /// Write per-generation records as JSON
    #[arg(long)]
    output: Option<String>,
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    eprintln!("=== Neutral: drift and mutation only ===");

    let random_seed = args
        .seed
        .unwrap_or_else(|| rand::rng().random_range(1..u64::MAX));

    let params = Parameters {
        random_seed,
        population_size: args.population_size,
        runtime: args.runtime,
        neutral_mutation_rate: args.mutation_rate,
        selected_mutation_rate: 0.0,
        recombination_rate: args.recombination_rate,
        fitness: FitnessKind::Neutral,
        ..Parameters::default()
    };
    eprintln!("{:?}", params);

    let mut sim = WrightFisher::<()>::initialize(params)?;
    let mut tracker = SimpleTracker::new();
    sim.run(&mut tracker)?;

    // ── Summary statistics ────────────────────────────────────────────────────
    let pop = &sim.population;
    let theta = 4.0 * args.population_size as f64 * args.mutation_rate;
    let harmonic: f64 = (1..2 * args.population_size).map(|i| 1.0 / i as f64).sum();
    eprintln!("segregating: {}", pop.mutations().num_segregating());
    eprintln!("expected segregating: {:.1}", theta * harmonic);
    eprintln!("fixations: {}", pop.mutations().fixations().len());
    eprintln!("live haplotypes: {}", pop.haplotypes().num_live());

    let individuals: Vec<usize> = (0..args.sample_size.min(pop.size())).collect();
    let sfs = sample::site_frequencies(pop, &individuals, sample::SiteKind::Neutral)?;
    eprintln!("sites in sample of {}: {}", individuals.len(), sfs.len());

    if let Some(path) = args.output {
        std::fs::write(&path, serde_json::to_string_pretty(&tracker.records)?)?;
        eprintln!("records written to {path}");
    }
    Ok(())
}
