//! Track Writer & Commit Protocol
//!
//! ## Track Lifecycle
//! ```text
//!   open ──► Writing ──finalize ok──► CompletePendingCommit ──move──► CommittedDestination
//!               │                                              │
//!               └──────── finalize / close / move failed ──────┴────► CommittedFailure
//! ```
//!
//! ## Responsibilities
//! - Route essence to the track's clip writer in its fixed write mode
//! - Accumulate the CBE run or VBE entry log for the footer index
//! - Start body partitions on the configured cadence
//! - Commit each file independently, then persist package records once

mod commit;
mod session;
mod track;

pub use commit::{relocate, relocate_unique};
pub use session::{CaptureSession, CommitReport, TrackOutcome};
pub use track::{
    EssenceKind, EssenceLayout, SampleWriter, StreamingWriter, TrackConfig, TrackCore, TrackState,
    TrackWriter, WriteMode,
};
