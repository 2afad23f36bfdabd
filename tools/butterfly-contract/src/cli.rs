//! CLI commands for butterfly-contract

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::config::ContractorConfig;
use crate::contractor::{GraphContractor, NodeLevel, INVALID_LEVEL};
use crate::graph::ContractorGraph;
use crate::graph_file::{read_json, write_json, GraphFile, HierarchyFile};
use crate::logging::init_logging;
use crate::storage::EdgeStorageKind;
use crate::synthetic::grid_graph;
use crate::validate::validate_hierarchy;

#[derive(Parser)]
#[command(name = "butterfly-contract")]
#[command(about = "Parallel contraction hierarchy preprocessing", long_about = None)]
pub struct Cli {
    /// Log level filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Worker threads (default: all cores)
    #[arg(short = 'j', long, global = true)]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Contract a JSON graph file into a hierarchy
    Contract {
        /// Input graph (JSON: n_nodes, edges, optional node_weights / node_levels)
        #[arg(short, long)]
        input: PathBuf,

        /// Output hierarchy (JSON)
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Check this many random queries against Dijkstra afterwards
        #[arg(long, default_value = "0")]
        validate: usize,
    },

    /// Contract a synthetic grid and validate the result
    Bench {
        #[arg(long, default_value = "100")]
        width: u32,

        #[arg(long, default_value = "100")]
        height: u32,

        #[arg(long, default_value = "42")]
        seed: u64,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Random queries checked against Dijkstra
        #[arg(long, default_value = "200")]
        n_tests: usize,
    },

    /// Write a synthetic grid as a JSON graph file
    Generate {
        #[arg(long, default_value = "100")]
        width: u32,

        #[arg(long, default_value = "100")]
        height: u32,

        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Contraction knobs shared by `contract` and `bench`
#[derive(Args, Debug, Clone)]
pub struct TuningArgs {
    /// Fraction of nodes to contract; the rest form the core
    #[arg(long, default_value = "1.0")]
    pub core_factor: f64,

    /// JSON file with a ContractorConfig; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub batch_fraction: Option<f64>,

    #[arg(long)]
    pub simulation_search_space: Option<usize>,

    #[arg(long)]
    pub full_search_space: Option<usize>,

    #[arg(long)]
    pub flush_fraction: Option<f64>,

    #[arg(long, value_enum)]
    pub edge_storage: Option<EdgeStorageKind>,
}

impl TuningArgs {
    pub fn resolve(&self) -> Result<ContractorConfig> {
        let mut config = match &self.config {
            Some(path) => read_json::<ContractorConfig>(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ContractorConfig::default(),
        };
        if let Some(v) = self.batch_fraction {
            config.batch_fraction = v;
        }
        if let Some(v) = self.simulation_search_space {
            config.simulation_search_space = v;
        }
        if let Some(v) = self.full_search_space {
            config.full_search_space = v;
        }
        if let Some(v) = self.flush_fraction {
            config.flush_fraction = v;
        }
        if let Some(v) = self.edge_storage {
            config.edge_storage = v;
        }
        config.validate()?;
        Ok(config)
    }
}

impl Cli {
    pub fn run(self) -> Result<()> {
        init_logging(&self.log_level, self.log_json)?;

        if let Some(threads) = self.threads {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .context("Failed to configure worker threads")?;
        }

        match self.command {
            Commands::Contract {
                input,
                output,
                tuning,
                validate,
            } => run_contract(&input, &output, &tuning, validate),
            Commands::Bench {
                width,
                height,
                seed,
                tuning,
                n_tests,
            } => run_bench(width, height, seed, &tuning, n_tests),
            Commands::Generate {
                width,
                height,
                seed,
                output,
            } => {
                let (n_nodes, edges) = grid_graph(width, height, seed);
                write_json(&output, &GraphFile::new(n_nodes, edges))
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                info!(n_nodes, path = %output.display(), "Wrote synthetic grid");
                Ok(())
            }
        }
    }
}

fn build_contractor(file: &GraphFile, config: ContractorConfig) -> Result<GraphContractor> {
    file.check()?;
    let graph = ContractorGraph::from_input_edges(file.n_nodes, &file.edges)?;
    let node_weights = file.node_weights.clone().unwrap_or_else(|| vec![0; file.n_nodes]);
    let contractor = match &file.node_levels {
        Some(levels) => GraphContractor::with_cached_order(graph, config, levels.clone(), node_weights)?,
        None => GraphContractor::with_node_weights(graph, config, node_weights)?,
    };
    Ok(contractor)
}

fn run_contract(input: &Path, output: &Path, tuning: &TuningArgs, n_tests: usize) -> Result<()> {
    let start = Instant::now();
    let config = tuning.resolve()?;

    info!(path = %input.display(), "Loading graph");
    let file: GraphFile = read_json(input).with_context(|| format!("Failed to load graph {}", input.display()))?;

    let mut contractor = build_contractor(&file, config)?;
    let summary = contractor.run(tuning.core_factor)?;
    let hierarchy = contractor.into_hierarchy()?;

    if n_tests > 0 {
        let result = validate_hierarchy(file.n_nodes, &file.edges, &hierarchy, n_tests, 0xC0FFEE);
        println!("{result}");
        if !result.is_valid() {
            bail!("hierarchy failed validation ({} of {} queries wrong)", result.incorrect, result.n_tests);
        }
    }

    let n_edges = hierarchy.edges.len();
    write_json(output, &HierarchyFile { summary, hierarchy })
        .with_context(|| format!("Failed to write hierarchy {}", output.display()))?;

    info!(
        n_edges,
        path = %output.display(),
        elapsed_s = start.elapsed().as_secs_f64(),
        "Hierarchy written"
    );
    Ok(())
}

fn run_bench(width: u32, height: u32, seed: u64, tuning: &TuningArgs, n_tests: usize) -> Result<()> {
    let config = tuning.resolve()?;
    let (n_nodes, edges) = grid_graph(width, height, seed);
    info!(width, height, n_nodes, n_edges = edges.len(), "Generated synthetic grid");

    let mut contractor = build_contractor(&GraphFile::new(n_nodes, edges.clone()), config)?;
    let summary = contractor.run(tuning.core_factor)?;
    let hierarchy = contractor.into_hierarchy()?;

    let max_level = hierarchy
        .node_levels
        .iter()
        .copied()
        .filter(|&level| level != INVALID_LEVEL)
        .max()
        .map_or(0, |level: NodeLevel| level + 1);

    println!("\n=== CONTRACTION SUMMARY ===");
    println!("  Nodes:           {}", summary.n_nodes);
    println!("  Contracted:      {}", summary.n_contracted);
    println!("  Core:            {}", summary.n_core);
    println!("  Levels used:     {}", max_level);
    println!("  Rounds:          {}", summary.n_rounds);
    println!("  Shortcuts:       {}", summary.n_shortcuts);
    println!("  Deferred:        {}", summary.n_deferred);
    println!("  Hierarchy edges: {}", hierarchy.edges.len());
    println!("  Time:            {:.2}s", summary.elapsed_ms as f64 / 1000.0);

    let result = validate_hierarchy(n_nodes, &edges, &hierarchy, n_tests, seed);
    println!("{result}");
    if !result.is_valid() {
        bail!("hierarchy failed validation");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "butterfly-contract",
            "bench",
            "--width",
            "5",
            "--batch-fraction",
            "0.5",
            "--edge-storage",
            "spill",
            "--core-factor",
            "0.8",
        ]);
        let Commands::Bench { width, tuning, .. } = cli.command else {
            panic!("expected bench");
        };
        assert_eq!(width, 5);
        assert_eq!(tuning.core_factor, 0.8);
        let config = tuning.resolve().unwrap();
        assert_eq!(config.batch_fraction, 0.5);
        assert_eq!(config.edge_storage, EdgeStorageKind::Spill);
        assert_eq!(config.full_search_space, 2000);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::parse_from(["butterfly-contract", "bench", "--flush-fraction", "0"]);
        let Commands::Bench { tuning, .. } = cli.command else {
            panic!("expected bench");
        };
        assert!(tuning.resolve().is_err());
    }

    #[test]
    fn test_contract_command_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("graph.json");
        let output = dir.path().join("hierarchy.json");
        let (n_nodes, edges) = grid_graph(6, 6, 7);
        write_json(&input, &GraphFile::new(n_nodes, edges)).unwrap();

        let tuning = TuningArgs {
            core_factor: 1.0,
            config: None,
            batch_fraction: None,
            simulation_search_space: None,
            full_search_space: None,
            flush_fraction: None,
            edge_storage: None,
        };
        run_contract(&input, &output, &tuning, 50).unwrap();

        let written: HierarchyFile = read_json(&output).unwrap();
        assert_eq!(written.summary.n_contracted, n_nodes);
        assert_eq!(written.hierarchy.node_levels.len(), n_nodes);
    }
}
