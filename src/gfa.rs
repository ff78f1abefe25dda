//! GFA 1 input and output for the assembly graph.

use crate::graph::{End, Graph, Link, Read, ReadId};
use crate::sam::ParseErr;
use log::{info, warn};
use noodles::bgzf;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read as _, Seek, SeekFrom, Write};

const BGZF_HEADER_SIZE: usize = 18;

/// Check whether a file starts with a valid BGZF header.
/// Returns `Ok(false)` for regular gzip, too-small files, or plain text.
fn is_bgzf(file: &mut File) -> io::Result<bool> {
    let mut header = [0u8; BGZF_HEADER_SIZE];
    let result = match file.read_exact(&mut header) {
        Ok(()) => Ok(header[0..2] == [0x1f, 0x8b]
            && header[2] == 0x08
            && header[3] == 0x04
            && header[10..12] == [0x06, 0x00]
            && header[12..14] == [b'B', b'C']
            && header[14..16] == [0x02, 0x00]),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    };
    file.seek(SeekFrom::Start(0))?;
    result
}

/// Link orientation as written in GFA: `+` on the first segment leaves from
/// its right end, `+` on the second enters through its left end.
fn ends_from_orientation(from_orient: &str, to_orient: &str) -> Result<(End, End), ParseErr> {
    let from = match from_orient {
        "+" => End::Right,
        "-" => End::Left,
        other => return Err(ParseErr::InvalidFormat(format!("invalid orientation '{}'", other))),
    };
    let to = match to_orient {
        "+" => End::Left,
        "-" => End::Right,
        other => return Err(ParseErr::InvalidFormat(format!("invalid orientation '{}'", other))),
    };
    Ok((from, to))
}

fn orientation_from_ends(from: End, to: End) -> (char, char) {
    (
        if from == End::Right { '+' } else { '-' },
        if to == End::Left { '+' } else { '-' },
    )
}

struct PendingLink {
    line_number: usize,
    from: String,
    to: String,
    ends: (End, End),
    cigar: String,
}

/// Read segments and links into `graph`. Every segment becomes a backbone.
/// Returns the number of segments and links loaded.
pub fn parse_gfa<R: BufRead>(reader: R, graph: &mut Graph) -> Result<(usize, usize), ParseErr> {
    let depth_re = Regex::new(r"^(?:DP|dp):[fi]:([-+0-9.eE]+)$")
        .map_err(|e| ParseErr::InvalidFormat(e.to_string()))?;
    let mut segments = 0;
    let mut pending = Vec::new();

    for (line_number, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(ParseErr::IoError)?;
        let line_number = line_number + 1;
        let fields: Vec<&str> = line.split('\t').collect();
        match fields[0] {
            "S" => {
                if fields.len() < 3 {
                    return Err(ParseErr::InvalidFormat(format!(
                        "line {}: {}",
                        line_number,
                        ParseErr::NotEnoughFields
                    )));
                }
                let sequence = if fields[2] == "*" {
                    warn!("Segment '{}' has no sequence", fields[1]);
                    Vec::new()
                } else {
                    fields[2].as_bytes().to_ascii_uppercase()
                };
                let mut depth = -1.0;
                for tag in &fields[3..] {
                    if let Some(caps) = depth_re.captures(tag) {
                        depth = caps[1].parse::<f64>().map_err(|e| {
                            ParseErr::InvalidFormat(format!("line {}: {}", line_number, ParseErr::InvalidFloat(e)))
                        })?;
                    }
                }
                graph.add_backbone(Read::resident(fields[1], sequence).with_depth(depth));
                segments += 1;
            }
            "L" => {
                if fields.len() < 6 {
                    return Err(ParseErr::InvalidFormat(format!(
                        "line {}: {}",
                        line_number,
                        ParseErr::NotEnoughFields
                    )));
                }
                let ends = ends_from_orientation(fields[2], fields[4])
                    .map_err(|e| ParseErr::InvalidFormat(format!("line {}: {}", line_number, e)))?;
                pending.push(PendingLink {
                    line_number,
                    from: fields[1].to_string(),
                    to: fields[3].to_string(),
                    ends,
                    cigar: fields[5].to_string(),
                });
            }
            _ => {}
        }
    }

    // Links may precede the segments they join.
    let mut links = 0;
    for link in pending {
        let from = graph.read_id(&link.from).filter(|&id| graph.is_backbone(id));
        let to = graph.read_id(&link.to).filter(|&id| graph.is_backbone(id));
        match (from, to) {
            (Some(from), Some(to)) => {
                graph.add_link(Link::new(from, link.ends.0, to, link.ends.1, &link.cigar));
                links += 1;
            }
            _ => warn!(
                "Line {}: link between unknown segments '{}' and '{}' ignored",
                link.line_number, link.from, link.to
            ),
        }
    }

    Ok((segments, links))
}

/// Load a GFA file, plain or BGZF-compressed (`.gz`/`.bgz`).
pub fn parse_gfa_file(path: &str, graph: &mut Graph) -> io::Result<(usize, usize)> {
    let mut file = File::open(path)
        .map_err(|e| io::Error::new(e.kind(), format!("Failed to open GFA file '{}': {}", path, e)))?;
    let parsed = if [".gz", ".bgz"].iter().any(|e| path.ends_with(e)) {
        if !is_bgzf(&mut file)? {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "'{}' is regular gzip, not BGZF. Convert with: zcat '{}' | bgzip > assembly.gfa.gz",
                    path, path
                ),
            ));
        }
        parse_gfa(bgzf::io::Reader::new(file), graph)
    } else {
        parse_gfa(BufReader::new(file), graph)
    };
    let (segments, links) = parsed.map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse GFA from {}: {}", path, e),
        )
    })?;
    info!("Loaded {} contigs and {} links from {}", segments, links, path);
    Ok((segments, links))
}

/// Segments to export: live backbones in natural name order.
fn exported_segments(graph: &Graph) -> Vec<ReadId> {
    let mut ids: Vec<ReadId> = graph
        .backbones
        .iter()
        .copied()
        .filter(|&id| !graph.reads[id].is_deleted())
        .collect();
    ids.sort_by(|&a, &b| natord::compare(&graph.reads[a].name, &graph.reads[b].name));
    ids.dedup();
    ids
}

/// A link and its reversed reading describe the same edge; keep one key.
fn canonical_link(graph: &Graph, link: &Link) -> (String, char, String, char, String) {
    let (o1, o2) = orientation_from_ends(link.end1, link.end2);
    let forward = (
        graph.reads[link.neighbor1].name.clone(),
        o1,
        graph.reads[link.neighbor2].name.clone(),
        o2,
        link.cigar.clone(),
    );
    let flip = |o: char| if o == '+' { '-' } else { '+' };
    let reverse = (
        graph.reads[link.neighbor2].name.clone(),
        flip(o2),
        graph.reads[link.neighbor1].name.clone(),
        flip(o1),
        link.cigar.clone(),
    );
    if natord::compare(&reverse.0, &forward.0).is_lt() {
        reverse
    } else {
        forward
    }
}

pub fn write_gfa<W: Write>(graph: &Graph, writer: &mut W) -> io::Result<()> {
    writeln!(writer, "H\tVN:Z:1.0")?;

    let segments = exported_segments(graph);
    for &id in &segments {
        let read = &graph.reads[id];
        let sequence = read.sequence.get().unwrap_or_default();
        let sequence = if sequence.is_empty() {
            "*".to_string()
        } else {
            String::from_utf8_lossy(&sequence).into_owned()
        };
        if read.depth >= 0.0 {
            writeln!(writer, "S\t{}\t{}\tDP:f:{}", read.name, sequence, read.depth)?;
        } else {
            writeln!(writer, "S\t{}\t{}", read.name, sequence)?;
        }
    }

    let mut exported = vec![false; graph.reads.len()];
    for &id in &segments {
        exported[id] = true;
    }
    let lines: BTreeSet<_> = graph
        .links
        .iter()
        .filter(|l| !l.retired && exported[l.neighbor1] && exported[l.neighbor2])
        .map(|l| canonical_link(graph, l))
        .collect();
    let mut lines: Vec<_> = lines.into_iter().collect();
    lines.sort_by(|a, b| natord::compare(&a.0, &b.0).then_with(|| natord::compare(&a.2, &b.2)));
    for (from, o1, to, o2, cigar) in lines {
        writeln!(writer, "L\t{}\t{}\t{}\t{}\t{}", from, o1, to, o2, cigar)?;
    }
    Ok(())
}

pub fn write_gfa_file(graph: &Graph, path: &str) -> io::Result<()> {
    let file = File::create(path)
        .map_err(|e| io::Error::new(e.kind(), format!("Failed to create GFA file '{}': {}", path, e)))?;
    let mut writer = BufWriter::new(file);
    write_gfa(graph, &mut writer)?;
    writer.flush()
}
