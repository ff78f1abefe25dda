//! Re-projection of read alignments onto the split graph.
//!
//! Each alignment of a read on an original backbone becomes a path through
//! the sub-contigs the read was assigned to, window after window. Paths of
//! one read on different backbones are then joined wherever the graph links
//! them, and written out as GAF records.

use crate::graph::{End, Graph, ReadId};
use crate::partition::Partitions;
use log::info;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Configuration of the projection
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// Read bases beyond an unsplit contig past which the read counts as
    /// continuing on that side.
    pub end_margin: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        ProjectionConfig { end_margin: 100 }
    }
}

/// Sides of a path, in read orientation, where the read stops inside the
/// contig instead of running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenEnds {
    None,
    /// `-`
    Left,
    /// `+`
    Right,
    /// `&`
    Both,
}

impl OpenEnds {
    fn new(left_open: bool, right_open: bool) -> Self {
        match (left_open, right_open) {
            (true, true) => OpenEnds::Both,
            (false, true) => OpenEnds::Right,
            (true, false) => OpenEnds::Left,
            (false, false) => OpenEnds::None,
        }
    }

    /// A path ending like this cannot be continued by the next one.
    fn blocks_next(self) -> bool {
        matches!(self, OpenEnds::Both | OpenEnds::Right)
    }

    /// A path ending like this cannot continue the previous one.
    fn blocks_previous(self) -> bool {
        self == OpenEnds::Left
    }
}

/// A contig traversed by a read, with `true` when read and contig run the
/// same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub contig: ReadId,
    pub forward: bool,
}

/// Part of a read's path, starting at `start` on the read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPath {
    pub start: usize,
    pub segments: Vec<Segment>,
    /// The original backbone the path comes from.
    pub backbone: ReadId,
    pub open: OpenEnds,
}

fn marker(forward: bool, first_here: bool, last_here: bool) -> OpenEnds {
    if forward {
        OpenEnds::new(!first_here, !last_here)
    } else {
        OpenEnds::new(!last_here, !first_here)
    }
}

/// Paths of every neighbor of `backbone`, which was split along `windows`.
fn split_backbone_paths(
    graph: &Graph,
    backbone: ReadId,
    partitions: &Partitions,
    backbone_name: &str,
) -> Vec<(ReadId, ReadPath)> {
    let windows = &partitions[&backbone];
    let mut paths = Vec::new();

    for (slot, &ov) in graph.reads[backbone].neighbors.iter().enumerate() {
        let overlap = &graph.overlaps[ov];
        let mut segments = Vec::new();
        let mut started = false;
        let mut stopped = false;
        let mut first_here = false;

        for (n, window) in windows.iter().enumerate() {
            let sub_contig = window
                .labels
                .get(slot)
                .and_then(|label| label.cluster())
                .and_then(|c| graph.read_id(&format!("{}_{}_{}", backbone_name, window.start, c)));
            match sub_contig {
                Some(contig) => {
                    segments.push(Segment {
                        contig,
                        forward: overlap.strand,
                    });
                    first_here |= n == 0;
                    started = true;
                }
                None if started => {
                    stopped = true;
                    break;
                }
                None => {}
            }
        }

        let last_here = !stopped;
        if last_here {
            let last_end = windows.last().map_or(0, |w| w.end);
            if let Some(contig) = graph.read_id(&format!("{}_{}_0", backbone_name, last_end + 1)) {
                segments.push(Segment {
                    contig,
                    forward: overlap.strand,
                });
            }
        }
        if segments.is_empty() {
            continue;
        }
        if !overlap.strand {
            segments.reverse();
        }

        paths.push((
            overlap.sequence1,
            ReadPath {
                start: overlap.position_1_1,
                segments,
                backbone,
                open: marker(overlap.strand, first_here, last_here),
            },
        ));
    }
    paths
}

/// Paths of the neighbors of a backbone that was not split.
fn unsplit_backbone_paths(graph: &Graph, backbone: ReadId, config: &ProjectionConfig) -> Vec<(ReadId, ReadPath)> {
    graph.reads[backbone]
        .neighbors
        .iter()
        .map(|&ov| {
            let overlap = &graph.overlaps[ov];
            let read_len = graph.reads[overlap.sequence1].length;
            let left_open = overlap.position_1_1 <= config.end_margin;
            let right_open = overlap.position_1_2 + config.end_margin >= read_len;
            (
                overlap.sequence1,
                ReadPath {
                    start: overlap.position_1_1,
                    segments: vec![Segment {
                        contig: backbone,
                        forward: overlap.strand,
                    }],
                    backbone,
                    open: OpenEnds::new(left_open, right_open),
                },
            )
        })
        .collect()
}

/// Whether `next` continues `current` through a link of the graph.
fn continues(graph: &Graph, current: &ReadPath, next: &ReadPath) -> bool {
    if current.backbone == next.backbone || current.open.blocks_next() || next.open.blocks_previous() {
        return false;
    }
    let (Some(last), Some(first)) = (current.segments.last(), next.segments.first()) else {
        return false;
    };
    let exit = if last.forward { End::Right } else { End::Left };
    let entry = if first.forward { End::Left } else { End::Right };
    graph.has_link(last.contig, exit, first.contig, entry)
}

/// Join consecutive paths of one read that the graph links.
pub fn merge_read_paths(graph: &Graph, mut paths: Vec<ReadPath>) -> Vec<ReadPath> {
    paths.sort_by_key(|p| p.start);
    let mut merged: Vec<ReadPath> = Vec::with_capacity(paths.len());
    for path in paths {
        match merged.last_mut() {
            Some(current) if continues(graph, current, &path) => {
                current.segments.extend(path.segments);
                current.backbone = path.backbone;
                current.open = path.open;
            }
            _ => merged.push(path),
        }
    }
    merged
}

/// Project every read alignment of the original backbones on the graph
/// after the split. Returns the paths of each read, merged where possible.
pub fn project_paths(
    graph: &Graph,
    original_backbones: &[ReadId],
    original_names: &[String],
    partitions: &Partitions,
    config: &ProjectionConfig,
) -> FxHashMap<ReadId, Vec<ReadPath>> {
    let mut per_read: FxHashMap<ReadId, Vec<ReadPath>> = FxHashMap::default();
    for (&backbone, name) in original_backbones.iter().zip(original_names) {
        let split = partitions.get(&backbone).is_some_and(|w| !w.is_empty());
        let paths = if split {
            split_backbone_paths(graph, backbone, partitions, name)
        } else {
            unsplit_backbone_paths(graph, backbone, config)
        };
        for (read, path) in paths {
            per_read.entry(read).or_default().push(path);
        }
    }

    per_read
        .into_iter()
        .map(|(read, paths)| (read, merge_read_paths(graph, paths)))
        .collect()
}

/// Write paths as GAF records, reads in the order of the graph.
pub fn write_gaf<W: Write>(graph: &Graph, paths: &FxHashMap<ReadId, Vec<ReadPath>>, writer: &mut W) -> io::Result<()> {
    let mut reads: Vec<&ReadId> = paths.keys().collect();
    reads.sort_unstable();
    for &read in reads {
        for path in &paths[&read] {
            let mut walk = String::new();
            for segment in &path.segments {
                walk.push(if segment.forward { '>' } else { '<' });
                walk.push_str(&graph.reads[segment.contig].name);
            }
            writeln!(
                writer,
                "{}\t-1\t{}\t-1\t+\t{}\t-1\t-1\t-1\t-1\t-1\t255",
                graph.reads[read].name, path.start, walk
            )?;
        }
    }
    Ok(())
}

pub fn write_gaf_file(graph: &Graph, paths: &FxHashMap<ReadId, Vec<ReadPath>>, path: &str) -> io::Result<()> {
    let file = File::create(path)
        .map_err(|e| io::Error::new(e.kind(), format!("Failed to create GAF file '{}': {}", path, e)))?;
    let mut writer = BufWriter::new(file);
    write_gaf(graph, paths, &mut writer)?;
    writer.flush()?;
    let records: usize = paths.values().map(|p| p.len()).sum();
    info!("Wrote {} read paths to {}", records, path);
    Ok(())
}
