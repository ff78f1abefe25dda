//! End-to-end runs of the split on a small assembly: three contigs
//! `ctgC → ctgA → ctgB`, four reads on `ctgA`, two strains over its first
//! 2500 bases.

use splitgfa::commands::split::{run_split, SplitConfig, RUN_LOG};
use splitgfa::consensus::{Polisher, ToolPaths};
use splitgfa::depth::DepthPolicy;
use splitgfa::gfa::parse_gfa;
use splitgfa::graph::{End, Graph};
use splitgfa::projection::ProjectionConfig;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn make_dna(len: usize, seed: u64) -> String {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            b"ACGT"[(state >> 62) as usize] as char
        })
        .collect()
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        let root = dir.path().to_path_buf();
        let ctg_a = make_dna(3000, 1);

        fs::write(
            root.join("assembly.gfa"),
            format!(
                "H\tVN:Z:1.0\nS\tctgA\t{}\tDP:f:4\nS\tctgB\t{}\nS\tctgC\t{}\nL\tctgC\t+\tctgA\t+\t0M\nL\tctgA\t+\tctgB\t+\t0M\n",
                ctg_a,
                make_dna(500, 2),
                make_dna(500, 3)
            ),
        )?;

        let mut reads = String::new();
        let mut sam = String::from("@HD\tVN:1.6\n@SQ\tSN:ctgA\tLN:3000\n");
        let mut split = String::from("CONTIG ctgA 3000 4\n");
        for i in 0..4 {
            reads.push_str(&format!(">r{} sample\n{}\n", i, ctg_a));
            sam.push_str(&format!("r{}\t0\tctgA\t1\t60\t3000M\t*\t0\t0\t{}\t*\n", i, ctg_a));
            split.push_str(&format!("READ r{} 0 3000 0 3000 +\n", i));
        }
        split.push_str("GROUP 0 1499 0,1,2,3 0,0,1,1\n");
        split.push_str("GROUP 1500 2499 0,1,2,3 1,1,0,0\n");
        fs::write(root.join("reads.fasta"), reads)?;
        fs::write(root.join("reads.sam"), sam)?;
        fs::write(root.join("reads.split"), split)?;

        Ok(Fixture { _dir: dir, root })
    }

    fn path(&self, name: &str) -> String {
        self.root.join(name).to_string_lossy().into_owned()
    }

    fn config(&self) -> SplitConfig {
        SplitConfig {
            assembly: self.path("assembly.gfa"),
            reads: self.path("reads.fasta"),
            error_rate: 0.05,
            split_file: self.path("reads.split"),
            sam: self.path("reads.sam"),
            scratch_dir: self.root.join("scratch"),
            technology: "ont".to_string(),
            output_gfa: self.path("split.gfa"),
            output_gaf: self.path("reads.gaf"),
            polisher: Polisher::Spoa,
            polish_everything: false,
            tools: ToolPaths::default(),
            depth_policy: DepthPolicy::default(),
            projection: ProjectionConfig::default(),
        }
    }
}

fn load_gfa(path: &Path) -> Graph {
    let mut graph = Graph::new();
    parse_gfa(BufReader::new(File::open(path).unwrap()), &mut graph).unwrap();
    graph
}

fn linked(graph: &Graph, a: &str, ea: End, b: &str, eb: End) -> bool {
    match (graph.read_id(a), graph.read_id(b)) {
        (Some(a), Some(b)) => graph.has_link(a, ea, b, eb),
        _ => false,
    }
}

fn check_outputs(fixture: &Fixture) {
    let graph = load_gfa(&fixture.root.join("split.gfa"));
    let mut names: Vec<&str> = graph.reads.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["ctgA_0_0", "ctgA_0_1", "ctgA_2500_0", "ctgB", "ctgC"]);

    let ctg_a = make_dna(3000, 1);
    for name in ["ctgA_0_0", "ctgA_0_1"] {
        let id = graph.read_id(name).unwrap();
        assert_eq!(graph.reads[id].sequence.get().unwrap().as_slice(), &ctg_a.as_bytes()[..2500]);
    }

    assert!(linked(&graph, "ctgC", End::Right, "ctgA_0_0", End::Left));
    assert!(linked(&graph, "ctgC", End::Right, "ctgA_0_1", End::Left));
    assert!(linked(&graph, "ctgA_0_0", End::Right, "ctgA_2500_0", End::Left));
    assert!(linked(&graph, "ctgA_0_1", End::Right, "ctgA_2500_0", End::Left));
    assert!(linked(&graph, "ctgA_2500_0", End::Right, "ctgB", End::Left));
    assert_eq!(graph.links.len(), 5);

    let gaf = fs::read_to_string(fixture.root.join("reads.gaf")).unwrap();
    let lines: Vec<&str> = gaf.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "r0\t-1\t0\t-1\t+\t>ctgA_0_0>ctgA_2500_0\t-1\t-1\t-1\t-1\t-1\t255"
    );
    assert!(lines[3].contains(">ctgA_0_1>ctgA_2500_0"));

    let log = fs::read_to_string(fixture.root.join("scratch").join(RUN_LOG)).unwrap();
    assert!(log.contains("ctgA_0_1"));
}

#[test]
fn test_split_library_run() -> std::io::Result<()> {
    let fixture = Fixture::new()?;
    let stats = run_split(&fixture.config())?;
    // the two windows merge into one: two strains and the tail
    assert_eq!(stats.split, 1);
    assert_eq!(stats.created, 3);
    assert_eq!(stats.unchanged, 2);
    assert_eq!(stats.lost, 0);
    check_outputs(&fixture);
    Ok(())
}

fn cli_args(fixture: &Fixture, split_file: &str) -> Vec<String> {
    vec![
        fixture.path("assembly.gfa"),
        fixture.path("reads.fasta"),
        "0.05".to_string(),
        split_file.to_string(),
        fixture.path("reads.sam"),
        fixture.path("scratch"),
        "2".to_string(),
        "ont".to_string(),
        fixture.path("split.gfa"),
        fixture.path("reads.gaf"),
        "spoa".to_string(),
        "0".to_string(),
        "minimap2".to_string(),
        "racon".to_string(),
        "medaka_consensus".to_string(),
        "samtools".to_string(),
        "python3".to_string(),
        "0".to_string(),
    ]
}

#[test]
fn test_cli_run() -> std::io::Result<()> {
    let fixture = Fixture::new()?;
    let output = Command::new(env!("CARGO_BIN_EXE_splitgfa"))
        .args(cli_args(&fixture, &fixture.path("reads.split")))
        .output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    check_outputs(&fixture);
    Ok(())
}

#[test]
fn test_cli_wrong_argument_count() -> std::io::Result<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_splitgfa"))
        .args(["assembly.gfa", "reads.fasta", "0.05"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
    Ok(())
}

#[test]
fn test_cli_missing_split_file() -> std::io::Result<()> {
    let fixture = Fixture::new()?;
    let output = Command::new(env!("CARGO_BIN_EXE_splitgfa"))
        .args(cli_args(&fixture, &fixture.path("missing.split")))
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(!fixture.root.join("split.gfa").exists());
    Ok(())
}
