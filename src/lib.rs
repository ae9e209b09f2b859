// src/lib.rs

//! Mines git history for assertion statements in C code: which ones each
//! commit added or removed, what they check, and how far apart in the commit
//! graph those changes happen.

pub mod analyzer;
pub mod assemble;
pub mod classify;
pub mod cli;
pub mod delta;
pub mod error;
pub mod extract;
pub mod keyword;
pub mod model;
pub mod report;

pub use analyzer::{mine, mine_all, scan_revision, MineConfig, Mined, Snapshot};
pub use delta::{propagate, Delta};
pub use error::{DeltaError, ExtractError, MineError};
pub use model::{Assertion, FileAssertions, History, Polarity};
