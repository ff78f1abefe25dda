use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info};
use rayon::ThreadPoolBuilder;
use splitgfa::commands::split::{run_split, SplitConfig};
use splitgfa::consensus::{Polisher, ToolPaths};
use splitgfa::depth::DepthPolicy;
use splitgfa::projection::ProjectionConfig;
use std::path::PathBuf;
use std::process;

/// Split an assembly graph along per-window strain clusters of its reads and
/// re-project the reads on the new graph.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Assembly graph (GFA)
    assembly: String,

    /// Reads (FASTA or FASTQ, optionally BGZF-compressed)
    reads: String,

    /// Expected error rate of the reads
    error_rate: f64,

    /// Per-window cluster assignments of the reads
    split_file: String,

    /// Alignments of the reads on the assembly (SAM)
    sam: String,

    /// Directory for the run log and the polishers' working files
    scratch_dir: PathBuf,

    /// Number of threads (0 for all cores)
    threads: usize,

    /// Sequencing technology (ont, pacbio, hifi)
    technology: String,

    /// Output assembly graph (GFA)
    output_gfa: String,

    /// Output read paths on the new graph (GAF)
    output_gaf: String,

    /// Polisher for the new contigs: racon, medaka or spoa
    polisher: Polisher,

    /// Polish contigs of windows with a single cluster too (0 or 1)
    #[clap(value_parser = clap::value_parser!(u8).range(0..=1))]
    polish_everything: u8,

    /// minimap2 executable
    minimap2: String,

    /// racon executable
    racon: String,

    /// medaka_consensus executable
    medaka: String,

    /// samtools executable
    samtools: String,

    /// python executable
    python: String,

    /// Debug logging (0 or 1)
    #[clap(value_parser = clap::value_parser!(u8).range(0..=1))]
    debug: u8,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                eprintln!("{}", e);
                process::exit(1);
            }
        },
    };

    env_logger::Builder::new()
        .filter_level(if args.debug == 1 {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let threads = if args.threads == 0 {
        num_cpus::get()
    } else {
        args.threads
    };
    if let Err(e) = ThreadPoolBuilder::new().num_threads(threads).build_global() {
        error!("Could not start the thread pool: {}", e);
        process::exit(1);
    }

    let config = SplitConfig {
        assembly: args.assembly,
        reads: args.reads,
        error_rate: args.error_rate,
        split_file: args.split_file,
        sam: args.sam,
        scratch_dir: args.scratch_dir,
        technology: args.technology,
        output_gfa: args.output_gfa,
        output_gaf: args.output_gaf,
        polisher: args.polisher,
        polish_everything: args.polish_everything == 1,
        tools: ToolPaths {
            minimap2: args.minimap2,
            racon: args.racon,
            medaka: args.medaka,
            samtools: args.samtools,
            python: args.python,
        },
        depth_policy: DepthPolicy::default(),
        projection: ProjectionConfig::default(),
    };

    match run_split(&config) {
        Ok(stats) => info!(
            "Done: {} contigs split into {} new contigs",
            stats.split, stats.created
        ),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
