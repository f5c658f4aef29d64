//! evotrace CLI: tracked demo runs and saved-graph inspection.
//!
//! Usage:
//!   evotrace run [--config FILE] [--backend memory|sqlite|null|stream] [...]
//!   evotrace inspect FILE

use clap::{Parser, Subcommand, ValueEnum};
use evotrace::{
    Attributes, BackendConfig, EdgeAttrs, EdgeTag, GraphFormat, LineageResult, LineageTracker,
    NodeId, PropertyGraphAdapter, PropertyType, RunConfig, Schema,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Probability that a selected pair is recombined
const CXPB: f64 = 0.5;
/// Probability that an individual is mutated
const MUTPB: f64 = 0.2;
/// Per-bit flip probability inside a mutation
const INDPB: f64 = 0.05;
const TOURNAMENT_SIZE: usize = 3;
const OPERATOR_KEY: &str = "operator";

#[derive(Parser)]
#[command(
    name = "evotrace",
    version,
    about = "Lineage tracking for evolutionary algorithms"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendKind {
    Memory,
    Sqlite,
    Null,
    Stream,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a tracked OneMax genetic algorithm and save its lineage
    Run {
        /// YAML run configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the configured backend
        #[arg(long, value_enum)]
        backend: Option<BackendKind>,
        #[arg(long, default_value_t = 20)]
        generations: u32,
        #[arg(long, default_value_t = 40)]
        population: usize,
        /// Bits per individual
        #[arg(long, default_value_t = 32)]
        length: usize,
        #[arg(long)]
        seed: Option<u64>,
        /// Run name, used as the graph file stem
        #[arg(long)]
        name: Option<String>,
        /// Directory for saved graphs
        #[arg(long)]
        out: Option<PathBuf>,
        /// Path to SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Summarize a saved GML or JSON graph
    Inspect {
        /// Graph file written by a previous run
        file: PathBuf,
    },
}

/// GA parameters for one run
struct GaParams {
    generations: u32,
    population: usize,
    length: usize,
}

/// A member of the current population
#[derive(Clone)]
struct Member {
    genes: Vec<bool>,
    id: NodeId,
    fitness: Option<f64>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn operator(name: &str) -> EdgeAttrs {
    let mut attrs = Attributes::new();
    attrs.insert(OPERATOR_KEY.into(), name.into());
    EdgeAttrs::Shared(attrs)
}

fn evaluate(tracker: &dyn LineageTracker, member: &mut Member) -> LineageResult<()> {
    if member.fitness.is_none() {
        let ones = member.genes.iter().filter(|bit| **bit).count() as f64;
        tracker.update_fitness(member.id, &[ones])?;
        tracker.update_score(member.id, ones)?;
        member.fitness = Some(ones);
    }
    Ok(())
}

fn tournament<'a>(population: &'a [Member], rng: &mut StdRng) -> &'a Member {
    (0..TOURNAMENT_SIZE)
        .map(|_| &population[rng.gen_range(0..population.len())])
        .max_by(|a, b| a.fitness.unwrap_or(0.0).total_cmp(&b.fitness.unwrap_or(0.0)))
        .unwrap_or(&population[0])
}

fn two_point_crossover(a: &[bool], b: &[bool], rng: &mut StdRng) -> (Vec<bool>, Vec<bool>) {
    let len = a.len().min(b.len());
    let mut left = a.to_vec();
    let mut right = b.to_vec();
    if len < 2 {
        return (left, right);
    }
    let mut p1 = rng.gen_range(1..len);
    let mut p2 = rng.gen_range(1..len);
    if p1 > p2 {
        std::mem::swap(&mut p1, &mut p2);
    }
    left[p1..p2].swap_with_slice(&mut right[p1..p2]);
    (left, right)
}

fn run_onemax(
    tracker: &dyn LineageTracker,
    params: &GaParams,
    rng: &mut StdRng,
) -> LineageResult<f64> {
    let mut population = Vec::with_capacity(params.population);
    for _ in 0..params.population {
        let genes: Vec<bool> = (0..params.length).map(|_| rng.gen_bool(0.5)).collect();
        let id = tracker.deploy(&genes, 0)?;
        let mut member = Member {
            genes,
            id,
            fitness: None,
        };
        evaluate(tracker, &mut member)?;
        population.push(member);
    }

    for generation in 1..=params.generations {
        let mut offspring: Vec<Member> = (0..population.len())
            .map(|_| tournament(&population, rng).clone())
            .collect();

        for pair in offspring.chunks_mut(2) {
            if let [a, b] = pair {
                if rng.gen_bool(CXPB) {
                    let (left, right) = two_point_crossover(&a.genes, &b.genes, rng);
                    let parents = [a.id, b.id];
                    for (member, genes) in [(&mut *a, left), (&mut *b, right)] {
                        let id = tracker.deploy(&genes, generation)?;
                        tracker.set_parents(id, &parents, generation, &operator("cx_two_point"))?;
                        *member = Member {
                            genes,
                            id,
                            fitness: None,
                        };
                    }
                }
            }
        }

        for member in offspring.iter_mut() {
            if rng.gen_bool(MUTPB) {
                let genes: Vec<bool> = member
                    .genes
                    .iter()
                    .map(|bit| if rng.gen_bool(INDPB) { !bit } else { *bit })
                    .collect();
                let id = tracker.deploy(&genes, generation)?;
                tracker.set_parents(id, &[member.id], generation, &operator("mut_flip_bit"))?;
                *member = Member {
                    genes,
                    id,
                    fitness: None,
                };
            }
        }

        for member in offspring.iter_mut() {
            evaluate(tracker, member)?;
        }
        population = offspring;

        let best = population
            .iter()
            .filter_map(|m| m.fitness)
            .fold(0.0, f64::max);
        tracing::info!(generation, best, "generation complete");
    }

    Ok(population
        .iter()
        .filter_map(|m| m.fitness)
        .fold(0.0, f64::max))
}

fn build_config(
    config: Option<PathBuf>,
    backend: Option<BackendKind>,
    seed: Option<u64>,
    name: Option<String>,
    out: Option<PathBuf>,
    db: Option<PathBuf>,
) -> LineageResult<RunConfig> {
    let mut run_config = match config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(name) = name {
        run_config.run.name = name;
    }
    if seed.is_some() {
        run_config.run.seed = seed;
    }
    if out.is_some() {
        run_config.output_dir = out;
    }
    match backend {
        Some(BackendKind::Memory) if run_config.backend.kind() != "memory" => {
            run_config.backend = BackendConfig::default();
        }
        Some(BackendKind::Sqlite) if run_config.backend.kind() != "sqlite" => {
            run_config.backend = BackendConfig::Sqlite { path: None };
        }
        Some(BackendKind::Null) => run_config.backend = BackendConfig::Null,
        Some(BackendKind::Stream) if run_config.backend.kind() != "stream" => {
            run_config.backend = BackendConfig::Stream {
                gephi: Default::default(),
                extent: None,
                node_size: None,
            };
        }
        _ => {}
    }
    if let (Some(db), BackendConfig::Sqlite { path }) = (db, &mut run_config.backend) {
        *path = Some(db);
    }
    // the demo labels edges with the operator that produced them
    if let BackendConfig::Memory { edge_schema, .. } = &mut run_config.backend {
        let schema = edge_schema.get_or_insert_with(Schema::default_edges);
        if !schema.contains(OPERATOR_KEY) {
            *schema = schema.clone().with(OPERATOR_KEY, PropertyType::String);
        }
    }
    run_config.validate()?;
    Ok(run_config)
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    config: Option<PathBuf>,
    backend: Option<BackendKind>,
    params: GaParams,
    seed: Option<u64>,
    name: Option<String>,
    out: Option<PathBuf>,
    db: Option<PathBuf>,
) -> i32 {
    let run_config = match build_config(config, backend, seed, name, out, db) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let seed = run_config.run.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    let result = run_config.open_tracker().and_then(|tracker| {
        let best = run_onemax(tracker.as_ref(), &params, &mut rng)?;
        let nodes = tracker.num_nodes()?;
        let location = tracker.save()?;
        Ok((best, nodes, location))
    });

    match result {
        Ok((best, nodes, location)) => {
            println!("Run '{}' (seed {})", run_config.run.name, seed);
            println!("  backend:      {}", run_config.backend.kind());
            println!("  generations:  {}", params.generations);
            println!("  individuals:  {}", nodes);
            println!("  best fitness: {} / {}", best, params.length);
            println!("  saved to:     {}", location);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_inspect(file: &Path) -> i32 {
    if GraphFormat::from_path(file).is_none() {
        eprintln!("Error: expected a .gml or .json file");
        return 1;
    }
    let graph = match PropertyGraphAdapter::load(file) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let meta = graph.metadata();
    let nodes = graph.nodes();
    let edges = graph.edges();

    let mut per_generation: BTreeMap<u32, usize> = BTreeMap::new();
    for node in &nodes {
        *per_generation.entry(node.generation).or_default() += 1;
    }
    let mut per_tag: BTreeMap<&'static str, usize> = BTreeMap::new();
    for edge in &edges {
        *per_tag.entry(edge.tag.as_str()).or_default() += 1;
    }
    let best = nodes
        .iter()
        .filter_map(|node| node.score.map(|score| (score, node)))
        .max_by(|a, b| a.0.total_cmp(&b.0));

    println!("Graph '{}'", meta.name);
    if let Some(seed) = &meta.seed {
        println!("  seed:        {}", seed);
    }
    println!("  run id:      {}", meta.run_id);
    if let Some(saved_at) = meta.saved_at {
        println!("  saved at:    {}", saved_at.to_rfc3339());
    }
    println!("  nodes:       {}", nodes.len());
    println!("  edges:       {}", edges.len());
    for (tag, count) in &per_tag {
        println!("    {:<10} {}", tag, count);
    }
    if let (Some(first), Some(last)) = (per_generation.keys().next(), per_generation.keys().last()) {
        println!("  generations: {}..={}", first, last);
    }
    if let Some((score, node)) = best {
        let parents = graph
            .incoming(node.id)
            .iter()
            .filter(|edge| edge.tag == EdgeTag::ParentOf)
            .count();
        println!(
            "  best score:  {} (node {}, generation {}, {} parents)",
            score, node.id, node.generation, parents
        );
    }
    0
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let code = match cli.command {
        Commands::Run {
            config,
            backend,
            generations,
            population,
            length,
            seed,
            name,
            out,
            db,
        } => {
            let params = GaParams {
                generations,
                population,
                length,
            };
            cmd_run(config, backend, params, seed, name, out, db)
        }
        Commands::Inspect { file } => cmd_inspect(&file),
    };
    std::process::exit(code);
}
