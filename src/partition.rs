//! Split file parsing.
//!
//! The split file lists, per backbone contig, the windows along it and the
//! strain cluster every neighbor read was assigned to in each window:
//!
//! ```text
//! CONTIG <name> <length> <depth>
//! READ <name> <startRead> <endRead> <startContig> <endContig> <strand>
//! GROUP <start> <end> <readIdx,...> <label,...>
//! ```
//!
//! GROUP records refer to reads by their position in the READ list of the
//! current contig.

use crate::graph::{Graph, ReadId};
use crate::label::Label;
use crate::sam::ParseErr;
use log::{info, warn};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

/// One window of a backbone: an inclusive coordinate range and one label per
/// neighbor slot of the backbone.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub start: usize,
    /// Inclusive.
    pub end: usize,
    pub labels: Vec<Label>,
}

impl Window {
    pub fn new(start: usize, end: usize, labels: Vec<Label>) -> Self {
        Window { start, end, labels }
    }

    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Windows of every backbone mentioned in the split file, in coordinate order.
pub type Partitions = FxHashMap<ReadId, Vec<Window>>;

struct ContigContext {
    backbone: ReadId,
    slots: usize,
    neighbor_slots: FxHashMap<String, usize>,
    read_names: Vec<String>,
}

fn with_line(line_number: usize, e: ParseErr) -> ParseErr {
    ParseErr::InvalidFormat(format!("line {}: {}", line_number, e))
}

fn parse_csv<T: std::str::FromStr>(csv: &str, line_number: usize) -> Result<Vec<T>, ParseErr>
where
    ParseErr: From<<T as std::str::FromStr>::Err>,
{
    csv.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|e| with_line(line_number, e.into())))
        .collect()
}

fn field<'a>(fields: &[&'a str], idx: usize, line_number: usize) -> Result<&'a str, ParseErr> {
    fields
        .get(idx)
        .copied()
        .ok_or_else(|| with_line(line_number, ParseErr::NotEnoughFields))
}

/// Parse a split stream. Depths given on CONTIG records are stored on the
/// backbones of `graph`.
pub fn parse_split<R: BufRead>(reader: R, graph: &mut Graph) -> Result<Partitions, ParseErr> {
    // Windows with the line they were read from, for error reporting.
    let mut found: FxHashMap<ReadId, Vec<(usize, Window)>> = FxHashMap::default();
    let mut context: Option<ContigContext> = None;
    // Set while inside the records of a contig that is not in the graph.
    let mut skipping = false;

    for (line_number, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(ParseErr::IoError)?;
        let line_number = line_number + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&category) = fields.first() else {
            continue;
        };

        match category {
            "CONTIG" => {
                let name = field(&fields, 1, line_number)?;
                let _length: usize = field(&fields, 2, line_number)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| with_line(line_number, e.into()))?;
                let depth: f64 = field(&fields, 3, line_number)?
                    .parse()
                    .map_err(|e: std::num::ParseFloatError| with_line(line_number, e.into()))?;

                let backbone = graph.read_id(name).filter(|&id| graph.is_backbone(id));
                let Some(backbone) = backbone else {
                    warn!("Line {}: contig '{}' is not in the assembly, skipping its records", line_number, name);
                    context = None;
                    skipping = true;
                    continue;
                };
                skipping = false;

                graph.reads[backbone].depth = depth;
                found.insert(backbone, Vec::new());

                let mut neighbor_slots = FxHashMap::default();
                for (slot, &overlap) in graph.reads[backbone].neighbors.iter().enumerate() {
                    let read = graph.overlaps[overlap].sequence1;
                    neighbor_slots.insert(graph.reads[read].name.clone(), slot);
                }
                context = Some(ContigContext {
                    backbone,
                    slots: graph.reads[backbone].neighbors.len(),
                    neighbor_slots,
                    read_names: Vec::new(),
                });
            }
            "READ" => {
                if skipping {
                    continue;
                }
                let ctx = context.as_mut().ok_or_else(|| {
                    with_line(line_number, ParseErr::InvalidFormat("READ record outside of a CONTIG".to_string()))
                })?;
                ctx.read_names.push(field(&fields, 1, line_number)?.to_string());
            }
            "GROUP" => {
                if skipping {
                    continue;
                }
                let ctx = context.as_ref().ok_or_else(|| {
                    with_line(line_number, ParseErr::InvalidFormat("GROUP record outside of a CONTIG".to_string()))
                })?;
                let start: usize = field(&fields, 1, line_number)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| with_line(line_number, e.into()))?;
                let end: usize = field(&fields, 2, line_number)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| with_line(line_number, e.into()))?;
                let read_idxs: Vec<usize> = parse_csv(field(&fields, 3, line_number)?, line_number)?;
                let raw_labels: Vec<i64> = parse_csv(field(&fields, 4, line_number)?, line_number)?;

                if read_idxs.is_empty() || raw_labels.is_empty() {
                    continue;
                }
                if read_idxs.len() != raw_labels.len() {
                    return Err(with_line(
                        line_number,
                        ParseErr::InvalidFormat(format!(
                            "{} read indices but {} labels",
                            read_idxs.len(),
                            raw_labels.len()
                        )),
                    ));
                }
                if end < start {
                    return Err(with_line(
                        line_number,
                        ParseErr::InvalidFormat(format!("window end {} before start {}", end, start)),
                    ));
                }

                let mut labels = vec![Label::Absent; ctx.slots];
                for (&idx, &raw) in read_idxs.iter().zip(&raw_labels) {
                    let name = ctx.read_names.get(idx).ok_or_else(|| {
                        with_line(
                            line_number,
                            ParseErr::InvalidFormat(format!(
                                "read index {} but only {} READ records",
                                idx,
                                ctx.read_names.len()
                            )),
                        )
                    })?;
                    // Reads filtered out when the alignments were loaded.
                    if let Some(&slot) = ctx.neighbor_slots.get(name) {
                        labels[slot] = Label::from_raw(raw).map_err(|e| with_line(line_number, e.into()))?;
                    }
                }
                found
                    .entry(ctx.backbone)
                    .or_default()
                    .push((line_number, Window::new(start, end, labels)));
            }
            _ => {}
        }
    }

    let mut partitions = Partitions::default();
    for (backbone, mut windows) in found {
        windows.sort_by_key(|(_, w)| w.start);
        for pair in windows.windows(2) {
            let (_, previous) = &pair[0];
            let (line_number, window) = &pair[1];
            if window.start <= previous.end {
                return Err(with_line(
                    *line_number,
                    ParseErr::InvalidFormat(format!(
                        "window {}-{} overlaps window {}-{}",
                        window.start, window.end, previous.start, previous.end
                    )),
                ));
            }
        }
        partitions.insert(backbone, windows.into_iter().map(|(_, w)| w).collect());
    }
    Ok(partitions)
}

pub fn parse_split_file(path: &str, graph: &mut Graph) -> io::Result<Partitions> {
    let file = File::open(path)
        .map_err(|e| io::Error::new(e.kind(), format!("Could not open split file '{}': {}", path, e)))?;
    let partitions = parse_split(BufReader::new(file), graph).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse split file {}: {}", path, e),
        )
    })?;
    let windows: usize = partitions.values().map(|w| w.len()).sum();
    info!(
        "Loaded {} windows over {} contigs from {}",
        windows,
        partitions.len(),
        path
    );
    Ok(partitions)
}
