//! Cheap real-time stem decomposition used for stem-mode crossfades.
mod decomposer;

pub use decomposer::{SideMidAnalysis, StemDecomposer};
