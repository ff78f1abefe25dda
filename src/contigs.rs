//! Rebuilding of split backbones.
//!
//! Every backbone with windows is replaced by one sub-contig per window and
//! label, plus a trailing sub-contig covering the rest of the backbone after
//! the last window. Sub-contigs of consecutive windows are chained with links
//! wherever their labels stitch, and the links of the backbone are moved onto
//! the outermost sub-contigs. The backbone itself is renamed
//! [`DELETED_NAME`] and dropped from the output.
//!
//! Backbones are processed in parallel. Clipping, polishing and boundary
//! realignment run outside the graph lock; only the creation of each
//! sub-contig and its links happens inside it.

use crate::cigar::{cigar_to_string, clip_to_range, parse_cigar, CigarOp};
use crate::consensus::{ClippedRead, Consensus, PolishRequest};
use crate::depth::{recompute_depths, DepthPolicy};
use crate::graph::{reverse_complement, End, Graph, Link, LinkId, Read, ReadId, SequenceSlot, DELETED_NAME};
use crate::label::Label;
use crate::partition::{Partitions, Window};
use crate::reads::ReadsFile;
use crate::realign::project_boundaries;
use crate::stitch::{junction_stitches, Stitches};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io;
use std::ops::Range;
use std::sync::{Arc, Mutex};

/// Bases of backbone added on each side of a window before polishing.
pub const OVERHANG: usize = 150;

/// Re-estimated coverage over recorded depth above which a backbone is
/// considered consistent.
const COVERAGE_AGREEMENT: f64 = 0.7;

/// Configuration of the backbone rebuild
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub overhang: usize,
    /// Polish single-group windows too.
    pub force_polish: bool,
    /// Sequencing technology, handed to the polisher.
    pub technology: String,
    pub depth_policy: DepthPolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            overhang: OVERHANG,
            force_polish: false,
            technology: "ont".to_string(),
            depth_policy: DepthPolicy::default(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    /// Backbones replaced by sub-contigs.
    pub split: usize,
    /// Backbones left as they were.
    pub unchanged: usize,
    /// Sub-contigs created, trailing ones included.
    pub created: usize,
    /// Groups whose consensus could not be built.
    pub lost: usize,
}

impl BuildStats {
    fn add(&mut self, other: &BuildStats) {
        self.split += other.split;
        self.unchanged += other.unchanged;
        self.created += other.created;
        self.lost += other.lost;
    }
}

/// Outcome of [`rebuild_backbones`].
#[derive(Debug, Default)]
pub struct BuildReport {
    pub stats: BuildStats,
    /// Human-readable account of the sub-contigs created, per backbone.
    pub log: String,
}

/// Label of the window a hanging link comes out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOrigin(pub Label);

/// A link whose left end is known and whose right end is the next
/// sub-contig to be created.
#[derive(Debug, Clone)]
struct HangingLink {
    from: (ReadId, End),
    cigar: String,
    origin: PendingOrigin,
}

/// Alignment of one neighbor read, oriented along the backbone.
struct Neighbor {
    name: String,
    ops: Vec<CigarOp>,
    backbone_start: usize,
    sequence: Arc<Vec<u8>>,
}

/// Everything a backbone task needs from the graph, copied under the lock.
struct BackboneSnapshot {
    name: String,
    sequence: Arc<Vec<u8>>,
    depth: f64,
    /// Summed read span of the overlaps, for the coverage check.
    covered: usize,
    overlaps: Vec<NeighborOverlap>,
}

struct NeighborOverlap {
    name: String,
    slot: Arc<SequenceSlot>,
    in_reads_file: bool,
    length: usize,
    strand: bool,
    backbone_start: usize,
    cigar: String,
}

/// Payloads acquired for one backbone; released when dropped.
struct LoadedPayloads {
    slots: Vec<Arc<SequenceSlot>>,
}

impl Drop for LoadedPayloads {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.release();
        }
    }
}

fn snapshot(graph: &Graph, backbone: ReadId) -> BackboneSnapshot {
    let read = &graph.reads[backbone];
    let mut covered = 0;
    let overlaps = read
        .neighbors
        .iter()
        .map(|&ov| {
            let overlap = &graph.overlaps[ov];
            let neighbor = &graph.reads[overlap.sequence1];
            covered += overlap.position_1_2.saturating_sub(overlap.position_1_1);
            NeighborOverlap {
                name: neighbor.name.clone(),
                slot: Arc::clone(&neighbor.sequence),
                in_reads_file: neighbor.in_reads_file,
                length: neighbor.length,
                strand: overlap.strand,
                backbone_start: overlap.position_2_1,
                cigar: overlap.cigar.clone(),
            }
        })
        .collect();
    BackboneSnapshot {
        name: read.name.clone(),
        sequence: read.sequence.get().unwrap_or_default(),
        depth: read.depth,
        covered,
        overlaps,
    }
}

/// Slots labelled with a cluster in at least one window.
fn needed_slots(windows: &[Window], slots: usize) -> Vec<bool> {
    let mut needed = vec![false; slots];
    for window in windows {
        for (slot, label) in window.labels.iter().enumerate().take(slots) {
            if label.is_cluster() {
                needed[slot] = true;
            }
        }
    }
    needed
}

/// Acquire the payloads of the needed neighbors, one backbone at a time.
fn load_neighbors(
    snapshot: &BackboneSnapshot,
    needed: &[bool],
    reads: Option<&ReadsFile>,
    loader: &Mutex<()>,
) -> io::Result<(LoadedPayloads, Vec<Option<Neighbor>>)> {
    let _loading = loader.lock().unwrap();
    let mut loaded = LoadedPayloads { slots: Vec::new() };
    let mut neighbors = Vec::with_capacity(snapshot.overlaps.len());

    for (overlap, &needed) in snapshot.overlaps.iter().zip(needed) {
        if !needed {
            neighbors.push(None);
            continue;
        }
        let data = overlap.slot.acquire(|| match reads {
            Some(reads) if overlap.in_reads_file => reads.load_sequence(&overlap.name, overlap.length),
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("No sequence available for read '{}'", overlap.name),
            )),
        })?;
        loaded.slots.push(Arc::clone(&overlap.slot));

        let ops = parse_cigar(&overlap.cigar)?;
        let sequence = if overlap.strand {
            data
        } else {
            Arc::new(reverse_complement(&data))
        };
        neighbors.push(Some(Neighbor {
            name: overlap.name.clone(),
            ops,
            backbone_start: overlap.backbone_start,
            sequence,
        }));
    }
    Ok((loaded, neighbors))
}

/// Clipped reads of a window, grouped by label. Clusters whose reads all
/// dropped out keep an empty group; a window without clusters has a single
/// `Absent` group.
fn group_reads(
    window: &Window,
    neighbors: &[Option<Neighbor>],
    padded: &Range<usize>,
) -> BTreeMap<Label, Vec<ClippedRead>> {
    let mut groups: BTreeMap<Label, Vec<ClippedRead>> = BTreeMap::new();
    for (slot, label) in window.labels.iter().enumerate() {
        if !label.is_cluster() {
            continue;
        }
        let group = groups.entry(*label).or_default();
        let Some(Some(neighbor)) = neighbors.get(slot) else {
            continue;
        };
        let Some(clip) = clip_to_range(&neighbor.ops, neighbor.backbone_start, padded) else {
            continue;
        };
        let Some(sequence) = neighbor.sequence.get(clip.read_range.clone()) else {
            debug!(
                "Alignment of '{}' runs past the end of the read, dropping it from window {}",
                neighbor.name, window.start
            );
            continue;
        };
        group.push(ClippedRead {
            name: neighbor.name.clone(),
            sequence: sequence.to_vec(),
            cigar: cigar_to_string(&clip.cigar),
            start: clip.start,
        });
    }
    if groups.is_empty() {
        groups.insert(Label::Absent, Vec::new());
    }
    groups
}

/// Whether a hanging link out of `origin` may attach to a sub-contig of
/// `label` in window `n`.
fn keeps(origin: PendingOrigin, label: Label, stitches: &Stitches, keep_all: bool) -> bool {
    if keep_all {
        return true;
    }
    let Some(set) = label.cluster().and_then(|c| stitches.get(&c)) else {
        return true;
    };
    set.is_empty() || origin.0.cluster().is_some_and(|c| set.contains(&c))
}

struct BackboneTask<'a> {
    backbone: ReadId,
    windows: &'a [Window],
    graph: &'a Mutex<Graph>,
    consensus: &'a dyn Consensus,
    config: &'a BuildConfig,
    tag: String,
}

impl BackboneTask<'_> {
    fn pass_through(&self, snapshot: &BackboneSnapshot, log: &mut String) -> BuildStats {
        if snapshot.depth > 1.0 && !snapshot.sequence.is_empty() {
            let estimate = snapshot.covered as f64 / snapshot.sequence.len() as f64;
            if estimate / snapshot.depth > COVERAGE_AGREEMENT {
                debug!(
                    "{}: coverage {:.2} agrees with recorded depth {:.2}",
                    snapshot.name, estimate, snapshot.depth
                );
            } else {
                debug!(
                    "{}: inconsistent coverage, {:.2} from alignments but {:.2} recorded",
                    snapshot.name, estimate, snapshot.depth
                );
            }
        }
        log.push_str("  nothing to split\n\n");
        BuildStats {
            unchanged: 1,
            ..BuildStats::default()
        }
    }

    /// Sequence of one group: the backbone itself when there is nothing to
    /// polish, otherwise the polished padded window trimmed back to the window.
    #[allow(clippy::too_many_arguments)]
    fn group_sequence(
        &self,
        snapshot: &BackboneSnapshot,
        window: &Window,
        core: &Range<usize>,
        padded: &Range<usize>,
        label: Label,
        reads: &[ClippedRead],
        polish: bool,
    ) -> Option<Vec<u8>> {
        let backbone = snapshot.sequence.as_slice();
        if reads.is_empty() || !polish {
            return Some(backbone[core.clone()].to_vec());
        }

        let draft = &backbone[padded.clone()];
        let request = PolishRequest {
            draft,
            window_start: window.start,
            reads,
            technology: &self.config.technology,
            tag: &self.tag,
        };
        let polished = self.consensus.polish(&request);
        if polished.is_empty() {
            debug!(
                "{}: no consensus for label {} in window {}-{}, dropping it",
                snapshot.name, label, window.start, window.end
            );
            return None;
        }
        let overhang_left = core.start - padded.start;
        let overhang_right = padded.end - core.end;
        match project_boundaries(draft, &polished, overhang_left, overhang_right) {
            Some(range) => Some(polished[range].to_vec()),
            None => {
                debug!(
                    "{}: could not place the boundaries of window {}-{} in the consensus of label {}, dropping it",
                    snapshot.name, window.start, window.end, label
                );
                None
            }
        }
    }

    /// Add a sub-contig and close the hanging links that stitch to it.
    fn commit(
        &self,
        read: Read,
        carried: &[HangingLink],
        keep: impl Fn(&HangingLink) -> bool,
    ) -> ReadId {
        let mut graph = self.graph.lock().unwrap();
        let id = graph.add_backbone(read);
        for hanging in carried.iter().filter(|h| keep(h)) {
            graph.add_link(Link::new(
                hanging.from.0,
                hanging.from.1,
                id,
                End::Left,
                &hanging.cigar,
            ));
        }
        id
    }

    fn run(&self, reads: Option<&ReadsFile>, loader: &Mutex<()>) -> io::Result<(String, BuildStats)> {
        let snapshot = {
            let graph = self.graph.lock().unwrap();
            snapshot(&graph, self.backbone)
        };
        let mut log = String::new();
        log.push_str(&format!("==== {} ====\n", snapshot.name));
        if self.windows.is_empty() {
            let stats = self.pass_through(&snapshot, &mut log);
            return Ok((log, stats));
        }

        let needed = needed_slots(self.windows, snapshot.overlaps.len());
        let (_loaded, neighbors) = load_neighbors(&snapshot, &needed, reads, loader)?;

        let len = snapshot.sequence.len();
        let mut stats = BuildStats {
            split: 1,
            ..BuildStats::default()
        };
        let mut carried: Vec<HangingLink> = Vec::new();
        let mut carried_from: Option<usize> = None;
        let mut first_productive: Option<Vec<ReadId>> = None;

        for (n, window) in self.windows.iter().enumerate() {
            let core = window.start..(window.end + 1).min(len);
            if core.is_empty() {
                warn!(
                    "{}: window {}-{} lies outside the contig ({} bp), skipping it",
                    snapshot.name, window.start, window.end, len
                );
                continue;
            }
            let padded = core.start.saturating_sub(self.config.overhang)..(core.end + self.config.overhang).min(len);

            let stitches = if n > 0 {
                junction_stitches(&window.labels, &self.windows[n - 1].labels)
            } else {
                Stitches::new()
            };
            let keep_all = n == 0 || carried_from != Some(n - 1);

            let groups = group_reads(window, &neighbors, &padded);
            let polish = groups.len() > 1 || self.config.force_polish;
            let depths = recompute_depths(
                window.start,
                window.end,
                &window.labels,
                snapshot.depth,
                self.config.depth_policy,
            );

            log.push_str(&format!("  window {}-{}:\n", window.start, window.end));
            let mut hanging = Vec::new();
            let mut created = Vec::new();
            for (&label, group) in &groups {
                let Some(sequence) =
                    self.group_sequence(&snapshot, window, &core, &padded, label, group, polish)
                else {
                    stats.lost += 1;
                    continue;
                };
                let depth = if groups.len() > 1 {
                    depths.get(&label).copied().unwrap_or(0.0)
                } else {
                    snapshot.depth
                };

                let name = format!("{}_{}_{}", snapshot.name, window.start, label);
                let read = Read::resident(&name, sequence).with_depth(depth);
                let id = self.commit(read, &carried, |h| keeps(h.origin, label, &stitches, keep_all));
                log.push_str(&format!("    {}\n", name));

                hanging.push(HangingLink {
                    from: (id, End::Right),
                    cigar: "0M".to_string(),
                    origin: PendingOrigin(label),
                });
                created.push(id);
                stats.created += 1;
            }

            if !created.is_empty() {
                carried = hanging;
                carried_from = Some(n);
                first_productive.get_or_insert(created);
            }
        }

        let last_end = self.windows.last().map_or(0, |w| w.end);
        let trailing_start = (last_end + 1).min(len);
        let whole = recompute_depths(
            0,
            len.saturating_sub(1),
            &vec![Label::Cluster(0); snapshot.overlaps.len()],
            snapshot.depth,
            self.config.depth_policy,
        );
        let trailing_depth = whole.get(&Label::Cluster(0)).copied().unwrap_or(0.0);
        let trailing_name = format!("{}_{}_0", snapshot.name, last_end + 1);
        let trailing_read =
            Read::resident(&trailing_name, snapshot.sequence[trailing_start..].to_vec()).with_depth(trailing_depth);

        {
            let mut graph = self.graph.lock().unwrap();
            let trailing = graph.add_backbone(trailing_read);
            for hanging in &carried {
                graph.add_link(Link::new(
                    hanging.from.0,
                    hanging.from.1,
                    trailing,
                    End::Left,
                    &hanging.cigar,
                ));
            }
            rewire_backbone_links(&mut graph, self.backbone, trailing, first_productive.as_deref());
        }
        log.push_str(&format!("  tail {}-{}:\n    {}\n\n", last_end + 1, len, trailing_name));
        stats.created += 1;

        Ok((log, stats))
    }
}

/// Move the links of `backbone` onto its sub-contigs and delete it: right
/// links go to the trailing sub-contig, left links are copied onto each
/// sub-contig of the first productive window (or onto the trailing one).
fn rewire_backbone_links(graph: &mut Graph, backbone: ReadId, trailing: ReadId, first: Option<&[ReadId]>) {
    let right: Vec<LinkId> = graph.live_links(backbone, End::Right).collect();
    for link in right {
        graph.repoint_link(link, (backbone, End::Right), (trailing, End::Right));
    }

    let targets: Vec<ReadId> = first.map_or_else(|| vec![trailing], |ids| ids.to_vec());
    let left: Vec<LinkId> = graph.live_links(backbone, End::Left).collect();
    for link in left {
        let Some((other, other_end)) = graph.links[link].other(backbone, End::Left) else {
            continue;
        };
        let cigar = graph.links[link].cigar.clone();
        for &target in &targets {
            let other = if other == backbone { target } else { other };
            graph.add_link(Link::new(target, End::Left, other, other_end, &cigar));
        }
        graph.retire_link(link);
    }

    graph.rename(backbone, DELETED_NAME);
    let leftovers: Vec<LinkId> = graph.reads[backbone]
        .links_left
        .iter()
        .chain(&graph.reads[backbone].links_right)
        .copied()
        .filter(|&id| !graph.links[id].retired && graph.links[id].touches(backbone))
        .collect();
    for link in leftovers {
        graph.retire_link(link);
    }
}

/// Split every backbone of `graph` along its windows in `partitions`.
///
/// Payloads of reads not yet in memory are fetched from `reads`. Backbones
/// created along the way are not revisited.
pub fn rebuild_backbones(
    graph: &mut Graph,
    partitions: &Partitions,
    reads: Option<&ReadsFile>,
    consensus: &dyn Consensus,
    config: &BuildConfig,
) -> io::Result<BuildReport> {
    let backbones = graph.backbones.clone();
    let shared = Mutex::new(std::mem::take(graph));
    let loader = Mutex::new(());
    let no_windows: Vec<Window> = Vec::new();

    let results: Vec<io::Result<(String, BuildStats)>> = backbones
        .par_iter()
        .map(|&backbone| {
            let task = BackboneTask {
                backbone,
                windows: partitions.get(&backbone).map_or(no_windows.as_slice(), |w| w.as_slice()),
                graph: &shared,
                consensus,
                config,
                tag: rayon::current_thread_index().unwrap_or(0).to_string(),
            };
            task.run(reads, &loader)
        })
        .collect();

    *graph = shared.into_inner().unwrap();

    let mut report = BuildReport::default();
    for result in results {
        let (log, stats) = result?;
        report.log.push_str(&log);
        report.stats.add(&stats);
    }

    let dangling = graph.dangling_links();
    if !dangling.is_empty() {
        warn!("{} links still reference deleted contigs", dangling.len());
    }
    info!(
        "Split {} contigs into {} new contigs ({} left unchanged, {} groups without consensus)",
        report.stats.split, report.stats.created, report.stats.unchanged, report.stats.lost
    );
    Ok(report)
}
