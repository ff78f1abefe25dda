// lib.rs
pub mod cigar;
pub mod commands;
pub mod consensus;
pub mod contigs;
pub mod depth;
pub mod gfa;
pub mod graph;
pub mod label;
pub mod merge;
pub mod partition;
pub mod projection;
pub mod reads;
pub mod realign;
pub mod sam;
pub mod seqidx;
pub mod stitch;
