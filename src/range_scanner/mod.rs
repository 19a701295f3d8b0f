//! Bounded, chunked scanning of a contract's logs over a block range.
//!
//! A scan splits `[from, to]` into windows of at most `step` blocks and queries them oldest
//! first, stopping after a fixed number of windows. The upper bound of the last window queried is
//! returned as the breakpoint, so the caller can persist how far the scan got even when the
//! windows held no events.

mod range_iterator;
mod scanner;

pub use range_iterator::ChunkWindows;
pub use scanner::{DEFAULT_MAX_CHUNKS_PER_SCAN, RangeScanner};
