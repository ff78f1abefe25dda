//! Reads file access through its faidx index.
//!
//! Reads are not kept in memory: the `.fai` index (built next to the reads
//! file when missing, along with a `.gzi` for bgzipped files) gives the name
//! and length of every record, and the sequence is fetched again by name when
//! a backbone task needs it. FASTA and FASTQ are both accepted.

use crate::graph::{Graph, Read as GraphRead};
use log::{debug, info};
use rust_htslib::faidx;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fs;
use std::io;

// Simple cache for reads file handles with random eviction
struct FaidxCache {
    capacity: usize,
    readers: FxHashMap<String, faidx::Reader>,
}

impl FaidxCache {
    fn new(capacity: usize) -> Self {
        FaidxCache {
            capacity,
            readers: FxHashMap::default(),
        }
    }

    fn get_or_open(&mut self, path: &str) -> io::Result<&mut faidx::Reader> {
        if !self.readers.contains_key(path) {
            if self.readers.len() >= self.capacity {
                if let Some(key) = self.readers.keys().next().cloned() {
                    self.readers.remove(&key);
                }
            }
            let reader = faidx::Reader::from_path(path)
                .map_err(|e| io::Error::other(format!("Failed to open reads file '{path}': {e}")))?;
            self.readers.insert(path.to_string(), reader);
        }
        self.readers
            .get_mut(path)
            .ok_or_else(|| io::Error::other(format!("Reader for '{path}' missing from cache")))
    }
}

thread_local! {
    static FAIDX_CACHE: RefCell<FaidxCache> = RefCell::new(FaidxCache::new(4));
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadRecord {
    pub name: String,
    pub length: usize,
}

/// An indexed reads file.
#[derive(Debug, Clone)]
pub struct ReadsFile {
    pub path: String,
}

/// Name and length of every record listed in a `.fai` index.
fn parse_fai(content: &str, fai_path: &str) -> io::Result<Vec<ReadRecord>> {
    let mut records = Vec::new();
    for (line_number, line) in content.lines().enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 2 || fields[0].is_empty() {
            continue;
        }
        let length = fields[1].parse::<usize>().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: line {}: invalid length: {}", fai_path, line_number + 1, e),
            )
        })?;
        records.push(ReadRecord {
            name: fields[0].to_string(),
            length,
        });
    }
    Ok(records)
}

impl ReadsFile {
    /// Read the `.fai` index of `path`, creating it first if needed.
    pub fn index(path: &str) -> io::Result<(ReadsFile, Vec<ReadRecord>)> {
        let fai_path = format!("{path}.fai");
        let fai_content = match fs::read_to_string(&fai_path) {
            Ok(content) => content,
            Err(_) => {
                debug!("No index for {}, building {}", path, fai_path);
                faidx::Reader::from_path(path).map_err(|e| {
                    io::Error::other(format!("Failed to index reads file '{path}': {e}"))
                })?;
                fs::read_to_string(&fai_path)?
            }
        };
        let records = parse_fai(&fai_content, &fai_path)?;

        info!("Indexed {} reads from {}", records.len(), path);
        Ok((
            ReadsFile {
                path: path.to_string(),
            },
            records,
        ))
    }

    /// Fetch the `length` bases of read `name`, upper-cased.
    pub fn load_sequence(&self, name: &str, length: usize) -> io::Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        FAIDX_CACHE.with(|cache_cell| -> io::Result<Vec<u8>> {
            let mut cache = cache_cell.borrow_mut();
            let reader = cache.get_or_open(&self.path)?;

            // fetch_seq takes an inclusive end
            match reader.fetch_seq(name, 0, length - 1) {
                Ok(seq) => {
                    let mut sequence = seq.to_vec();
                    unsafe { libc::free(seq.as_ptr() as *mut std::ffi::c_void) }; // htslib hands over ownership of the buffer (https://github.com/rust-bio/rust-htslib/issues/401)
                    sequence.make_ascii_uppercase();
                    Ok(sequence)
                }
                Err(e) => Err(io::Error::other(format!(
                    "Failed to fetch read '{}' from '{}': {}",
                    name, self.path, e
                ))),
            }
        })
    }
}

/// Index the reads file and register every record as a lazily loaded read.
pub fn load_reads_into(path: &str, graph: &mut Graph) -> io::Result<ReadsFile> {
    let (reads_file, records) = ReadsFile::index(path)?;
    for record in records {
        graph.add_read(GraphRead::indexed(&record.name, record.length));
    }
    Ok(reads_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use noodles::bgzf;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_index_and_load_fasta() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "reads.fa",
            b">r1 some description\nACGT\nacgt\n>r2\nGGGGCC\n>r3\nT\n",
        );
        let (reads, records) = ReadsFile::index(&path).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["r1", "r2", "r3"]);
        assert_eq!(records[0].length, 8);
        assert_eq!(records[1].length, 6);
        assert!(std::path::Path::new(&format!("{path}.fai")).exists());

        assert_eq!(reads.load_sequence("r1", 8).unwrap(), b"ACGTACGT");
        assert_eq!(reads.load_sequence("r3", 1).unwrap(), b"T");
        assert_eq!(reads.load_sequence("r2", 6).unwrap(), b"GGGGCC");
        assert!(reads.load_sequence("ghost", 4).is_err());
    }

    #[test]
    fn test_index_and_load_fastq() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "reads.fq",
            b"@q1\nACGTA\n+\nIIIII\n@q2 x\nTTG\n+\nIII\n",
        );
        let (reads, records) = ReadsFile::index(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].length, 5);
        assert_eq!(records[1].name, "q2");
        assert_eq!(reads.load_sequence("q2", 3).unwrap(), b"TTG");
        assert_eq!(reads.load_sequence("q1", 5).unwrap(), b"ACGTA");
    }

    #[test]
    fn test_index_bgzf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reads.fa.gz");
        let mut writer = bgzf::io::Writer::new(File::create(&path).unwrap());
        writer.write_all(b">r1\nAACC\n>r2\nGGTT\n").unwrap();
        writer.finish().unwrap();

        let path = path.to_string_lossy().into_owned();
        let (reads, records) = ReadsFile::index(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(reads.load_sequence("r2", 4).unwrap(), b"GGTT");
    }

    #[test]
    fn test_existing_index_is_reused() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "reads.fa", b">a\nAC\n");
        write_file(&dir, "reads.fa.fai", b"a\t2\t3\t2\t3\nb\t5\t9\t5\t6\n");
        let (_, records) = ReadsFile::index(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], ReadRecord { name: "b".to_string(), length: 5 });
    }

    #[test]
    fn test_load_reads_into_graph() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "reads.fa", b">a\nAC\n>b\nGTT\n");
        let mut graph = Graph::new();
        let reads = load_reads_into(&path, &mut graph).unwrap();
        let b = graph.read_id("b").unwrap();
        assert_eq!(graph.reads[b].length, 3);
        assert!(!graph.reads[b].sequence.is_loaded());
        assert!(graph.reads[b].in_reads_file);
        assert_eq!(reads.load_sequence("b", 3).unwrap(), b"GTT");
    }
}
