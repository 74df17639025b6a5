//! Track Writers
//!
//! A track is opened in one of two write modes and keeps it for its lifetime:
//!
//! - [`SampleWriter`]: whole samples per call (`write_sample`)
//! - [`StreamingWriter`]: one edit unit assembled from pieces
//!   (`start_sample_data` → `write_sample_data`* → `end_sample_data`)
//!
//! Both feed the same [`TrackCore`], which owns the clip writer, the index
//! accumulator and the body partition cadence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn, Span};

use crate::clip::{ClipWriter, ELEMENT_KL_SIZE, MAX_ELEMENT_SIZE};
use crate::error::{MxfError, Result};
use crate::index::{flags, EssenceIndex};
use crate::klv::{labels, Key, Rational, Umid};

/// Essence carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EssenceKind {
    Video,
    Audio,
    Data,
}

impl EssenceKind {
    /// Generic container item type
    fn item_type(self) -> u8 {
        match self {
            EssenceKind::Video => 0x15,
            EssenceKind::Audio => 0x16,
            EssenceKind::Data => 0x17,
        }
    }

    /// Frame-wrapped essence element key for this kind
    pub fn essence_key(self, track_number: u8) -> Key {
        labels::essence_element(self.item_type(), 0x01, track_number)
    }
}

/// Size pattern of a track's edit units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EssenceLayout {
    /// Every sample has exactly `sample_size` bytes (CBE index)
    Constant { sample_size: u32 },
    /// Samples vary in size (one index entry per edit unit)
    Variable,
}

/// Which API a track accepts essence through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Sample,
    Streaming,
}

/// Commit lifecycle of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Writing,
    CompletePendingCommit,
    CommittedDestination,
    CommittedFailure,
}

impl TrackState {
    pub fn is_committed(self) -> bool {
        matches!(
            self,
            TrackState::CommittedDestination | TrackState::CommittedFailure
        )
    }
}

/// Static description of one capture track
#[derive(Debug, Clone)]
pub struct TrackConfig {
    pub track_id: u32,
    pub kind: EssenceKind,
    pub edit_rate: Rational,
    pub layout: EssenceLayout,
    pub mode: WriteMode,
    /// File name inside the commit directories
    pub filename: String,
}

impl TrackConfig {
    /// VBE track written sample by sample
    pub fn new(track_id: u32, kind: EssenceKind, edit_rate: Rational, filename: impl Into<String>) -> Self {
        Self {
            track_id,
            kind,
            edit_rate,
            layout: EssenceLayout::Variable,
            mode: WriteMode::Sample,
            filename: filename.into(),
        }
    }

    pub fn with_layout(mut self, layout: EssenceLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.filename.is_empty() || Path::new(&self.filename).file_name().is_none() {
            return Err(MxfError::Config(format!(
                "track {} has an invalid filename {:?}",
                self.track_id, self.filename
            )));
        }
        if Path::new(&self.filename).components().count() != 1 {
            return Err(MxfError::Config(format!(
                "track {} filename {:?} must not contain directories",
                self.track_id, self.filename
            )));
        }
        if self.edit_rate.numerator <= 0 || self.edit_rate.denominator <= 0 {
            return Err(MxfError::Config(format!(
                "track {} has edit rate {}",
                self.track_id, self.edit_rate
            )));
        }
        if let EssenceLayout::Constant { sample_size } = self.layout {
            if sample_size == 0 || sample_size as u64 > MAX_ELEMENT_SIZE {
                return Err(MxfError::Config(format!(
                    "track {} sample size {} outside 1..={}",
                    self.track_id, sample_size, MAX_ELEMENT_SIZE
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn initial_index(&self) -> EssenceIndex {
        match self.layout {
            EssenceLayout::Constant { sample_size } => {
                EssenceIndex::constant(ELEMENT_KL_SIZE as u32 + sample_size)
            }
            EssenceLayout::Variable => EssenceIndex::variable(),
        }
    }
}

// =============================================================================
// Shared Track State
// =============================================================================

/// State common to both write modes
pub struct TrackCore {
    config: TrackConfig,
    clip: Box<dyn ClipWriter>,
    index: EssenceIndex,
    body_partition_interval: Option<u64>,
    umid: Umid,
    state: TrackState,
    /// Location of the file; updated when it is relocated
    path: PathBuf,
    /// First write error; the track can no longer produce a valid file
    poisoned: Option<String>,
    span: Span,
}

impl TrackCore {
    pub(crate) fn new(
        config: TrackConfig,
        clip: Box<dyn ClipWriter>,
        path: PathBuf,
        body_partition_interval: Option<u64>,
        parent: &Span,
    ) -> Self {
        let span = tracing::debug_span!(parent: parent, "track", track_id = config.track_id);
        let index = config.initial_index();
        Self {
            config,
            clip,
            index,
            body_partition_interval,
            umid: Umid::generate(),
            state: TrackState::Writing,
            path,
            poisoned: None,
            span,
        }
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn track_id(&self) -> u32 {
        self.config.track_id
    }

    pub fn umid(&self) -> Umid {
        self.umid
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Edit units written so far
    pub fn duration(&self) -> i64 {
        self.index.duration()
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn set_state(&mut self, state: TrackState) {
        self.state = state;
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    fn check_writing(&self) -> Result<()> {
        if self.state != TrackState::Writing {
            return Err(MxfError::InvalidSequencing(format!(
                "track {} is {:?}",
                self.config.track_id, self.state
            )));
        }
        if let Some(reason) = &self.poisoned {
            return Err(MxfError::InvalidSequencing(format!(
                "track {} stopped after an earlier error: {}",
                self.config.track_id, reason
            )));
        }
        Ok(())
    }

    /// Run a clip operation, poisoning the track if the file may now be damaged
    fn clip_op<T>(&mut self, op: impl FnOnce(&mut dyn ClipWriter) -> Result<T>) -> Result<T> {
        let result = op(self.clip.as_mut());
        if let Err(err) = &result {
            if !matches!(err, MxfError::InvalidSequencing(_) | MxfError::InvalidSample(_)) {
                warn!(parent: &self.span, "clip write failed: {}", err);
                self.poisoned = Some(err.to_string());
            }
        }
        result
    }

    /// Open a new body partition when the configured cadence is reached
    fn before_edit_unit(&mut self) -> Result<()> {
        let written = self.index.duration() as u64;
        match self.body_partition_interval {
            Some(interval) if written > 0 && written % interval == 0 => {
                debug!(parent: &self.span, "edit unit {} starts a body partition", written);
                self.clip_op(|clip| clip.start_body_partition())
            }
            _ => Ok(()),
        }
    }

    fn write_edit_unit(&mut self, data: &[u8]) -> Result<()> {
        self.before_edit_unit()?;
        let offset = self.clip_op(|clip| clip.write_element(data))?;
        self.index.record(offset, flags::RANDOM_ACCESS);
        Ok(())
    }

    /// Finish the index and partitions, then close the clip
    ///
    /// The clip is closed even when finalizing fails.
    pub(crate) fn finalize(&mut self, pending_unit: bool) -> Result<()> {
        let _enter = self.span.enter();
        let finalized = if let Some(reason) = &self.poisoned {
            Err(MxfError::InvalidSequencing(format!(
                "track {} stopped after an earlier error: {}",
                self.config.track_id, reason
            )))
        } else if pending_unit {
            Err(MxfError::InvalidSequencing(format!(
                "track {} has an edit unit still open",
                self.config.track_id
            )))
        } else {
            self.clip.finalize(&self.index)
        };
        let closed = self.clip.close();
        finalized.and(closed)
    }
}

// =============================================================================
// Write Modes
// =============================================================================

/// Track accepting whole samples
pub struct SampleWriter {
    core: TrackCore,
}

impl SampleWriter {
    /// Write `num_samples` edit units
    ///
    /// CBE tracks take `num_samples * sample_size` bytes and write one element
    /// per sample; VBE tracks take exactly one sample per call.
    pub fn write_sample(&mut self, num_samples: u32, data: &[u8]) -> Result<()> {
        self.core.check_writing()?;
        if num_samples == 0 {
            return Err(MxfError::InvalidSample("num_samples is 0".into()));
        }

        match self.core.config.layout {
            EssenceLayout::Constant { sample_size } => {
                let expected = num_samples as u64 * sample_size as u64;
                if data.len() as u64 != expected {
                    return Err(MxfError::InvalidSample(format!(
                        "{} samples of {} bytes need {} bytes, got {}",
                        num_samples,
                        sample_size,
                        expected,
                        data.len()
                    )));
                }
                for sample in data.chunks(sample_size as usize) {
                    self.core.write_edit_unit(sample)?;
                }
                Ok(())
            }
            EssenceLayout::Variable => {
                if num_samples != 1 {
                    return Err(MxfError::InvalidSample(format!(
                        "variable-size tracks take one sample per call, got {}",
                        num_samples
                    )));
                }
                self.core.write_edit_unit(data)
            }
        }
    }
}

/// Edit unit being assembled by a streaming track
#[derive(Debug, Clone, Copy)]
struct OpenUnit {
    stream_offset: u64,
    bytes: u64,
}

/// Track accepting edit units in pieces
pub struct StreamingWriter {
    core: TrackCore,
    open: Option<OpenUnit>,
}

impl StreamingWriter {
    pub fn start_sample_data(&mut self) -> Result<()> {
        self.core.check_writing()?;
        if self.open.is_some() {
            return Err(MxfError::InvalidSequencing(format!(
                "track {}: start_sample_data while an edit unit is open",
                self.core.track_id()
            )));
        }
        self.core.before_edit_unit()?;
        let stream_offset = self.core.clip_op(|clip| clip.start_element())?;
        self.open = Some(OpenUnit {
            stream_offset,
            bytes: 0,
        });
        Ok(())
    }

    pub fn write_sample_data(&mut self, data: &[u8]) -> Result<()> {
        self.core.check_writing()?;
        let track_id = self.core.track_id();
        let unit = self.open.as_mut().ok_or_else(|| {
            MxfError::InvalidSequencing(format!(
                "track {}: write_sample_data without start_sample_data",
                track_id
            ))
        })?;
        if let EssenceLayout::Constant { sample_size } = self.core.config.layout {
            if unit.bytes + data.len() as u64 > sample_size as u64 {
                return Err(MxfError::InvalidSample(format!(
                    "edit unit would grow to {} bytes on a {}-byte track",
                    unit.bytes + data.len() as u64,
                    sample_size
                )));
            }
        }
        self.core.clip_op(|clip| clip.append_element_data(data))?;
        unit.bytes += data.len() as u64;
        Ok(())
    }

    pub fn end_sample_data(&mut self) -> Result<()> {
        self.core.check_writing()?;
        let unit = self.open.ok_or_else(|| {
            MxfError::InvalidSequencing(format!(
                "track {}: end_sample_data without start_sample_data",
                self.core.track_id()
            ))
        })?;
        if let EssenceLayout::Constant { sample_size } = self.core.config.layout {
            if unit.bytes != sample_size as u64 {
                return Err(MxfError::InvalidSample(format!(
                    "edit unit of {} bytes on a {}-byte track",
                    unit.bytes, sample_size
                )));
            }
        }
        self.core.clip_op(|clip| clip.end_element())?;
        self.open = None;
        self.core.index.record(unit.stream_offset, flags::RANDOM_ACCESS);
        Ok(())
    }
}

/// A track in the write mode chosen when the session opened
pub enum TrackWriter {
    Sample(SampleWriter),
    Streaming(StreamingWriter),
}

impl TrackWriter {
    pub(crate) fn new(core: TrackCore) -> Self {
        match core.config.mode {
            WriteMode::Sample => TrackWriter::Sample(SampleWriter { core }),
            WriteMode::Streaming => TrackWriter::Streaming(StreamingWriter { core, open: None }),
        }
    }

    pub fn core(&self) -> &TrackCore {
        match self {
            TrackWriter::Sample(w) => &w.core,
            TrackWriter::Streaming(w) => &w.core,
        }
    }

    pub(crate) fn core_mut(&mut self) -> &mut TrackCore {
        match self {
            TrackWriter::Sample(w) => &mut w.core,
            TrackWriter::Streaming(w) => &mut w.core,
        }
    }

    pub fn mode(&self) -> WriteMode {
        match self {
            TrackWriter::Sample(_) => WriteMode::Sample,
            TrackWriter::Streaming(_) => WriteMode::Streaming,
        }
    }

    pub(crate) fn finalize(&mut self) -> Result<()> {
        match self {
            TrackWriter::Sample(w) => w.core.finalize(false),
            TrackWriter::Streaming(w) => {
                let pending = w.open.is_some();
                w.core.finalize(pending)
            }
        }
    }
}
