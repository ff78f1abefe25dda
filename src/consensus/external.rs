//! Polishing through external tools, each call in its own temporary
//! directory under the scratch directory.

use super::{ClippedRead, Consensus, PolishRequest, ToolPaths};
use log::{debug, warn};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Working directory of one polishing call, removed when dropped.
fn request_dir(scratch_dir: &Path, tag: &str) -> io::Result<TempDir> {
    tempfile::Builder::new()
        .prefix(&format!("tmp_{}_", tag))
        .tempdir_in(scratch_dir)
}

/// Names of the reads in the files handed to the tools. A read can be
/// clipped into one window more than once, so the index keeps them apart.
fn read_names(reads: &[ClippedRead]) -> Vec<String> {
    reads
        .iter()
        .enumerate()
        .map(|(i, read)| format!("{}_{}", read.name, i))
        .collect()
}

fn write_fasta(path: &Path, records: &[(&str, &[u8])]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (name, sequence) in records {
        writeln!(writer, ">{}", name)?;
        writer.write_all(sequence)?;
        writeln!(writer)?;
    }
    writer.flush()
}

/// SAM of the clipped reads against the padded draft, named `draft`.
fn write_mapping(path: &Path, draft_len: usize, names: &[String], reads: &[ClippedRead]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "@HD\tVN:1.6")?;
    writeln!(writer, "@SQ\tSN:draft\tLN:{}", draft_len)?;
    for (name, read) in names.iter().zip(reads) {
        write!(writer, "{}\t0\tdraft\t{}\t60\t{}\t*\t0\t0\t", name, read.start, read.cigar)?;
        writer.write_all(&read.sequence)?;
        writeln!(writer, "\t*")?;
    }
    writer.flush()
}

/// Concatenated sequence of the first FASTA record of `text`.
fn first_fasta_sequence(text: &str) -> Vec<u8> {
    let mut sequence = Vec::new();
    let mut in_record = false;
    for line in text.lines() {
        if line.starts_with('>') {
            if in_record {
                break;
            }
            in_record = true;
            continue;
        }
        if in_record {
            sequence.extend(line.trim().bytes().map(|b| b.to_ascii_uppercase()));
        }
    }
    sequence
}

fn run(command: &mut Command, tool: &str) -> io::Result<Vec<u8>> {
    let output = command
        .output()
        .map_err(|e| io::Error::new(e.kind(), format!("Could not execute '{}': {}", tool, e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::other(format!(
            "'{}' exited with {}: {}",
            tool,
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

pub struct RaconConsensus {
    tools: ToolPaths,
    scratch_dir: PathBuf,
}

impl RaconConsensus {
    pub fn new(tools: ToolPaths, scratch_dir: PathBuf) -> Self {
        RaconConsensus { tools, scratch_dir }
    }

    fn try_polish(&self, request: &PolishRequest) -> io::Result<Vec<u8>> {
        let dir = request_dir(&self.scratch_dir, request.tag)?;
        let draft = dir.path().join("draft.fasta");
        let reads = dir.path().join("reads.fasta");
        let mapping = dir.path().join("mapping.sam");

        write_fasta(&draft, &[("draft", request.draft)])?;
        let names = read_names(request.reads);
        let records: Vec<(&str, &[u8])> = names
            .iter()
            .zip(request.reads)
            .map(|(name, read)| (name.as_str(), read.sequence.as_slice()))
            .collect();
        write_fasta(&reads, &records)?;
        write_mapping(&mapping, request.draft.len(), &names, request.reads)?;

        let mut command = Command::new(&self.tools.racon);
        command.arg("-t").arg("1");
        if request.technology.eq_ignore_ascii_case("ont") {
            command.args(["-m", "8", "-x", "-6", "-g", "-8"]);
        }
        // one window over the whole draft
        command
            .arg("-w")
            .arg(request.draft.len().to_string())
            .arg(&reads)
            .arg(&mapping)
            .arg(&draft);
        let stdout = run(&mut command, &self.tools.racon)?;
        Ok(first_fasta_sequence(&String::from_utf8_lossy(&stdout)))
    }
}

impl Consensus for RaconConsensus {
    fn polish(&self, request: &PolishRequest) -> Vec<u8> {
        if request.reads.is_empty() {
            return Vec::new();
        }
        match self.try_polish(request) {
            Ok(sequence) => sequence,
            Err(e) => {
                warn!("[{}] racon failed on window at {}: {}", request.tag, request.window_start, e);
                Vec::new()
            }
        }
    }
}

pub struct MedakaConsensus {
    tools: ToolPaths,
    scratch_dir: PathBuf,
}

impl MedakaConsensus {
    pub fn new(tools: ToolPaths, scratch_dir: PathBuf) -> Self {
        MedakaConsensus { tools, scratch_dir }
    }

    /// `PATH` with the directories of the helper tools medaka calls in front.
    fn search_path(&self) -> String {
        let mut dirs: Vec<String> = [&self.tools.minimap2, &self.tools.samtools, &self.tools.python]
            .iter()
            .filter_map(|tool| Path::new(tool.as_str()).parent())
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.to_string_lossy().into_owned())
            .collect();
        dirs.dedup();
        if let Ok(path) = std::env::var("PATH") {
            dirs.push(path);
        }
        dirs.join(":")
    }

    fn try_polish(&self, request: &PolishRequest) -> io::Result<Vec<u8>> {
        let dir = request_dir(&self.scratch_dir, request.tag)?;
        let draft = dir.path().join("draft.fasta");
        let reads = dir.path().join("reads.fasta");
        let out = dir.path().join("medaka");

        write_fasta(&draft, &[("draft", request.draft)])?;
        let names = read_names(request.reads);
        let records: Vec<(&str, &[u8])> = names
            .iter()
            .zip(request.reads)
            .map(|(name, read)| (name.as_str(), read.sequence.as_slice()))
            .collect();
        write_fasta(&reads, &records)?;

        let mut command = Command::new(&self.tools.medaka);
        command
            .env("PATH", self.search_path())
            .arg("-i")
            .arg(&reads)
            .arg("-d")
            .arg(&draft)
            .arg("-o")
            .arg(&out)
            .arg("-t")
            .arg("1");
        run(&mut command, &self.tools.medaka)?;

        let consensus = fs::read_to_string(out.join("consensus.fasta"))?;
        Ok(first_fasta_sequence(&consensus))
    }
}

impl Consensus for MedakaConsensus {
    fn polish(&self, request: &PolishRequest) -> Vec<u8> {
        if request.reads.is_empty() {
            return Vec::new();
        }
        match self.try_polish(request) {
            Ok(sequence) => {
                debug!("[{}] medaka produced {} bp", request.tag, sequence.len());
                sequence
            }
            Err(e) => {
                warn!("[{}] medaka failed on window at {}: {}", request.tag, request.window_start, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fasta_sequence() {
        let text = ">draft LN:8\nacgt\nACGT\n>other\nTTTT\n";
        assert_eq!(first_fasta_sequence(text), b"ACGTACGT".to_vec());
        assert!(first_fasta_sequence("").is_empty());
    }

    #[test]
    fn test_mapping_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.sam");
        let reads = vec![
            ClippedRead {
                name: "r".to_string(),
                sequence: b"ACGTA".to_vec(),
                cigar: "2S3M".to_string(),
                start: 4,
            },
            ClippedRead {
                name: "r".to_string(),
                sequence: b"GG".to_vec(),
                cigar: "2M".to_string(),
                start: 15,
            },
        ];
        let names = read_names(&reads);
        assert_eq!(names, vec!["r_0", "r_1"]);
        write_mapping(&path, 20, &names, &reads).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "@SQ\tSN:draft\tLN:20");
        assert_eq!(lines[2], "r_0\t0\tdraft\t4\t60\t2S3M\t*\t0\t0\tACGTA\t*");
        assert_eq!(lines[3], "r_1\t0\tdraft\t15\t60\t2M\t*\t0\t0\tGG\t*");
    }

    #[test]
    fn test_missing_racon_gives_empty_result() {
        let dir = TempDir::new().unwrap();
        let tools = ToolPaths {
            racon: dir.path().join("no-such-racon").to_string_lossy().into_owned(),
            ..ToolPaths::default()
        };
        let racon = RaconConsensus::new(tools, dir.path().to_path_buf());
        let reads = vec![ClippedRead {
            name: "r".to_string(),
            sequence: b"ACGT".to_vec(),
            cigar: "4M".to_string(),
            start: 1,
        }];
        let request = PolishRequest {
            draft: b"ACGT",
            window_start: 0,
            reads: &reads,
            technology: "ont",
            tag: "0",
        };
        assert!(racon.polish(&request).is_empty());
        // the working directory of the call is gone
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
