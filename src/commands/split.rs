use crate::consensus::{build_consensus, Polisher, ToolPaths};
use crate::contigs::{rebuild_backbones, BuildConfig, BuildStats};
use crate::depth::DepthPolicy;
use crate::gfa::{parse_gfa_file, write_gfa_file};
use crate::graph::Graph;
use crate::merge::merge_partitions;
use crate::partition::parse_split_file;
use crate::projection::{project_paths, write_gaf_file, ProjectionConfig};
use crate::reads::load_reads_into;
use crate::sam::parse_sam_file;
use log::{debug, info};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Configuration of a full split run
#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub assembly: String,
    pub reads: String,
    /// Expected read error rate. Only reported; polishers use their own
    /// presets.
    pub error_rate: f64,
    pub split_file: String,
    pub sam: String,
    pub scratch_dir: PathBuf,
    pub technology: String,
    pub output_gfa: String,
    pub output_gaf: String,
    pub polisher: Polisher,
    pub polish_everything: bool,
    pub tools: ToolPaths,
    pub depth_policy: DepthPolicy,
    pub projection: ProjectionConfig,
}

/// Name of the run log written to the scratch directory.
pub const RUN_LOG: &str = "output.txt";

/// Load the assembly, the reads, their alignments and the split file, split
/// the backbones and write the new graph and the read paths on it.
pub fn run_split(config: &SplitConfig) -> io::Result<BuildStats> {
    let mut graph = Graph::new();
    parse_gfa_file(&config.assembly, &mut graph)?;
    let reads = load_reads_into(&config.reads, &mut graph)?;
    parse_sam_file(&config.sam, &mut graph)?;

    let mut partitions = parse_split_file(&config.split_file, &mut graph)?;
    merge_partitions(&mut partitions);

    let original_backbones = graph.backbones.clone();
    let original_names: Vec<String> = original_backbones
        .iter()
        .map(|&id| graph.reads[id].name.clone())
        .collect();

    fs::create_dir_all(&config.scratch_dir).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!(
                "Could not create scratch directory '{}': {}",
                config.scratch_dir.display(),
                e
            ),
        )
    })?;
    debug!(
        "Polishing with {} ({} reads, error rate {})",
        config.polisher, config.technology, config.error_rate
    );
    let consensus = build_consensus(config.polisher, &config.tools, config.scratch_dir.clone());
    let build_config = BuildConfig {
        force_polish: config.polish_everything,
        technology: config.technology.clone(),
        depth_policy: config.depth_policy,
        ..BuildConfig::default()
    };
    let report = rebuild_backbones(
        &mut graph,
        &partitions,
        Some(&reads),
        consensus.as_ref(),
        &build_config,
    )?;
    fs::write(config.scratch_dir.join(RUN_LOG), &report.log)?;

    write_gfa_file(&graph, &config.output_gfa)?;
    info!("Wrote the split assembly to {}", config.output_gfa);

    let paths = project_paths(
        &graph,
        &original_backbones,
        &original_names,
        &partitions,
        &config.projection,
    );
    write_gaf_file(&graph, &paths, &config.output_gaf)?;

    Ok(report.stats)
}
