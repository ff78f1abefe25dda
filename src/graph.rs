//! The read/overlap/link arena shared by every stage of the split.
//!
//! Reads (sequencing reads and assembly contigs alike) live in one vector and
//! are addressed by index. Overlaps tie a read to the backbone contig it maps
//! on; links join contig ends. Links are never removed, only retired, so that
//! every id stays valid while contigs are rebuilt concurrently.

use crate::seqidx::SequenceIndex;
use log::warn;
use std::io;
use std::sync::{Arc, Mutex};

pub type ReadId = usize;
pub type LinkId = usize;

/// Name given to backbones replaced by their sub-contigs.
pub const DELETED_NAME: &str = "delete_me";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum End {
    Left,
    Right,
}

#[derive(Debug, Default)]
struct SlotState {
    loads: usize,
    data: Option<Arc<Vec<u8>>>,
    resident: bool,
}

/// Sequence payload of a read, loaded on demand and dropped again once the
/// last user releases it. Resident payloads (contigs, sub-contigs) are kept.
#[derive(Debug, Default)]
pub struct SequenceSlot {
    state: Mutex<SlotState>,
}

impl SequenceSlot {
    pub fn resident(sequence: Vec<u8>) -> Self {
        SequenceSlot {
            state: Mutex::new(SlotState {
                loads: 0,
                data: Some(Arc::new(sequence)),
                resident: true,
            }),
        }
    }

    pub fn unloaded() -> Self {
        SequenceSlot::default()
    }

    /// Current payload, if any.
    pub fn get(&self) -> Option<Arc<Vec<u8>>> {
        self.state.lock().unwrap().data.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().unwrap().data.is_some()
    }

    /// Take a reference on the payload, calling `load` if it is not in memory.
    /// Each successful call must be paired with [`SequenceSlot::release`].
    pub fn acquire<F>(&self, load: F) -> io::Result<Arc<Vec<u8>>>
    where
        F: FnOnce() -> io::Result<Vec<u8>>,
    {
        let mut state = self.state.lock().unwrap();
        let data = match &state.data {
            Some(data) => Arc::clone(data),
            None => {
                let data = Arc::new(load()?);
                state.data = Some(Arc::clone(&data));
                data
            }
        };
        state.loads += 1;
        Ok(data)
    }

    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.loads = state.loads.saturating_sub(1);
        if state.loads == 0 && !state.resident {
            state.data = None;
        }
    }
}

#[derive(Debug)]
pub struct Read {
    pub name: String,
    pub sequence: Arc<SequenceSlot>,
    pub length: usize,
    /// Listed in the reads file, so the sequence can be fetched by name.
    pub in_reads_file: bool,
    /// Coverage depth; negative when unknown.
    pub depth: f64,
    pub is_backbone: bool,
    /// Overlaps this read takes part in.
    pub neighbors: Vec<usize>,
    pub links_left: Vec<LinkId>,
    pub links_right: Vec<LinkId>,
}

impl Read {
    /// A read whose sequence is held in memory for the whole run.
    pub fn resident(name: &str, sequence: Vec<u8>) -> Self {
        Read {
            name: name.to_string(),
            length: sequence.len(),
            sequence: Arc::new(SequenceSlot::resident(sequence)),
            in_reads_file: false,
            depth: -1.0,
            is_backbone: false,
            neighbors: Vec::new(),
            links_left: Vec::new(),
            links_right: Vec::new(),
        }
    }

    /// A read whose sequence stays in the reads file until needed.
    pub fn indexed(name: &str, length: usize) -> Self {
        Read {
            name: name.to_string(),
            length,
            sequence: Arc::new(SequenceSlot::unloaded()),
            in_reads_file: true,
            depth: -1.0,
            is_backbone: false,
            neighbors: Vec::new(),
            links_left: Vec::new(),
            links_right: Vec::new(),
        }
    }

    pub fn with_depth(mut self, depth: f64) -> Self {
        self.depth = depth;
        self
    }

    pub fn links(&self, end: End) -> &[LinkId] {
        match end {
            End::Left => &self.links_left,
            End::Right => &self.links_right,
        }
    }

    fn links_mut(&mut self, end: End) -> &mut Vec<LinkId> {
        match end {
            End::Left => &mut self.links_left,
            End::Right => &mut self.links_right,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.name == DELETED_NAME
    }
}

/// Alignment of a read (`sequence1`) on a backbone (`sequence2`).
///
/// Read positions are on the forward read; backbone positions are 0-based,
/// end exclusive. The CIGAR is kept as written in the SAM file.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlap {
    pub sequence1: ReadId,
    pub sequence2: ReadId,
    pub position_1_1: usize,
    pub position_1_2: usize,
    pub position_2_1: usize,
    pub position_2_2: usize,
    /// `true` when the read maps forward.
    pub strand: bool,
    pub cigar: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub neighbor1: ReadId,
    pub end1: End,
    pub neighbor2: ReadId,
    pub end2: End,
    pub cigar: String,
    pub retired: bool,
}

impl Link {
    pub fn new(neighbor1: ReadId, end1: End, neighbor2: ReadId, end2: End, cigar: &str) -> Self {
        Link {
            neighbor1,
            end1,
            neighbor2,
            end2,
            cigar: cigar.to_string(),
            retired: false,
        }
    }

    pub fn touches(&self, read: ReadId) -> bool {
        self.neighbor1 == read || self.neighbor2 == read
    }

    /// The endpoint across from `(read, end)`, if the link has that endpoint.
    pub fn other(&self, read: ReadId, end: End) -> Option<(ReadId, End)> {
        if self.neighbor1 == read && self.end1 == end {
            Some((self.neighbor2, self.end2))
        } else if self.neighbor2 == read && self.end2 == end {
            Some((self.neighbor1, self.end1))
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct Graph {
    pub reads: Vec<Read>,
    pub links: Vec<Link>,
    pub overlaps: Vec<Overlap>,
    pub backbones: Vec<ReadId>,
    index: SequenceIndex,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn add_read(&mut self, read: Read) -> ReadId {
        let id = self.reads.len();
        if let Some(previous) = self.index.insert(&read.name, id) {
            warn!(
                "Sequence name '{}' is used more than once; lookups now resolve to the latest (previous id {})",
                read.name, previous
            );
        }
        self.reads.push(read);
        id
    }

    pub fn add_backbone(&mut self, mut read: Read) -> ReadId {
        read.is_backbone = true;
        let id = self.add_read(read);
        self.backbones.push(id);
        id
    }

    pub fn read_id(&self, name: &str) -> Option<ReadId> {
        self.index
            .get_id(name)
            .filter(|&id| self.reads[id].name == name)
    }

    pub fn is_backbone(&self, id: ReadId) -> bool {
        self.reads.get(id).is_some_and(|read| read.is_backbone)
    }

    pub fn add_overlap(&mut self, overlap: Overlap) -> usize {
        let id = self.overlaps.len();
        self.reads[overlap.sequence1].neighbors.push(id);
        if overlap.sequence2 != overlap.sequence1 {
            self.reads[overlap.sequence2].neighbors.push(id);
        }
        self.overlaps.push(overlap);
        id
    }

    /// Store a link and register it on both endpoints.
    pub fn add_link(&mut self, link: Link) -> LinkId {
        let id = self.links.len();
        let (a, ea, b, eb) = (link.neighbor1, link.end1, link.neighbor2, link.end2);
        self.links.push(link);
        self.reads[a].links_mut(ea).push(id);
        if (a, ea) != (b, eb) {
            self.reads[b].links_mut(eb).push(id);
        }
        id
    }

    /// Live links attached to one end of a read.
    pub fn live_links(&self, read: ReadId, end: End) -> impl Iterator<Item = LinkId> + '_ {
        self.reads[read]
            .links(end)
            .iter()
            .copied()
            .filter(move |&id| !self.links[id].retired)
    }

    pub fn retire_link(&mut self, id: LinkId) {
        self.links[id].retired = true;
    }

    /// Move every endpoint of `link` equal to `from` onto `to`.
    pub fn repoint_link(&mut self, link: LinkId, from: (ReadId, End), to: (ReadId, End)) {
        let mut moved = false;
        let l = &mut self.links[link];
        if (l.neighbor1, l.end1) == from {
            l.neighbor1 = to.0;
            l.end1 = to.1;
            moved = true;
        }
        if (l.neighbor2, l.end2) == from {
            l.neighbor2 = to.0;
            l.end2 = to.1;
            moved = true;
        }
        if moved && !self.reads[to.0].links(to.1).contains(&link) {
            self.reads[to.0].links_mut(to.1).push(link);
        }
    }

    /// Whether a live link joins `(a, ea)` to `(b, eb)`.
    pub fn has_link(&self, a: ReadId, ea: End, b: ReadId, eb: End) -> bool {
        self.live_links(a, ea)
            .any(|id| self.links[id].other(a, ea) == Some((b, eb)))
    }

    pub fn rename(&mut self, id: ReadId, name: &str) {
        let old = std::mem::replace(&mut self.reads[id].name, name.to_string());
        if self.index.get_id(&old) == Some(id) {
            self.index.remove(&old);
        }
        if name != DELETED_NAME {
            self.index.insert(name, id);
        }
    }

    /// Live links that still reference a deleted read.
    pub fn dangling_links(&self) -> Vec<LinkId> {
        self.links
            .iter()
            .enumerate()
            .filter(|(_, l)| {
                !l.retired && (self.reads[l.neighbor1].is_deleted() || self.reads[l.neighbor2].is_deleted())
            })
            .map(|(id, _)| id)
            .collect()
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&base| match base {
            b'A' | b'a' => b'T',
            b'T' | b't' => b'A',
            b'C' | b'c' => b'G',
            b'G' | b'g' => b'C',
            b'N' | b'n' => b'N',
            _ => base,
        })
        .collect()
}
