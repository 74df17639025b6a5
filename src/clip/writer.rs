//! Clip Writer
//!
//! Writes one single-essence, frame-wrapped file: an open header partition
//! with the primer pack, body partitions of essence elements, and a footer
//! partition carrying the index followed by the RIP.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use tracing::{debug, info, Span};

use crate::config::Config;
use crate::error::{MxfError, Result};
use crate::index::{tags, EssenceIndex, IndexPlacement};
use crate::klv::{labels, Key, KlvWriter, PrimerPack, Rational, Reservation};
use crate::partition::{PartitionDirectory, PartitionPack};

use super::{ELEMENT_KL_SIZE, ELEMENT_LLEN, MAX_ELEMENT_SIZE};

/// Handle a capture track writes its essence through
pub trait ClipWriter {
    /// Write one complete essence element; returns its stream offset
    fn write_element(&mut self, data: &[u8]) -> Result<u64>;

    /// Open an element whose size is not yet known; returns its stream offset
    fn start_element(&mut self) -> Result<u64>;

    fn append_element_data(&mut self, data: &[u8]) -> Result<()>;

    /// Close the open element; returns its value length
    fn end_element(&mut self) -> Result<u64>;

    /// Start a new body partition at the current stream offset
    fn start_body_partition(&mut self) -> Result<()>;

    /// Write the footer, index and RIP, then close every partition
    fn finalize(&mut self, index: &EssenceIndex) -> Result<()>;

    /// Flush and release the file
    fn close(&mut self) -> Result<()>;
}

/// Layout parameters of one clip file
#[derive(Debug, Clone)]
pub struct ClipSettings {
    pub essence_key: Key,
    pub edit_rate: Rational,
    pub kag_size: u32,
    pub index_sid: u32,
    pub body_sid: u32,
    pub streaming_index_threshold: usize,
}

impl ClipSettings {
    pub fn new(essence_key: Key, edit_rate: Rational) -> Self {
        Self::from_config(&Config::default(), essence_key, edit_rate)
    }

    pub fn from_config(config: &Config, essence_key: Key, edit_rate: Rational) -> Self {
        Self {
            essence_key,
            edit_rate,
            kag_size: config.kag_size,
            index_sid: config.index_sid,
            body_sid: config.body_sid,
            streaming_index_threshold: config.streaming_index_threshold,
        }
    }

    fn placement(&self) -> IndexPlacement {
        IndexPlacement {
            edit_rate: self.edit_rate,
            index_sid: self.index_sid,
            body_sid: self.body_sid,
            streaming_threshold: self.streaming_index_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClipState {
    Open,
    Finalized,
    Closed,
}

/// [`ClipWriter`] producing an MXF file on any seekable sink
pub struct MxfClipWriter<W: Write + Seek> {
    writer: KlvWriter<W>,
    directory: PartitionDirectory,
    settings: ClipSettings,
    /// Essence bytes (keys and lengths included) written so far
    stream_offset: u64,
    /// Body partition accepting essence, if one has been started
    body_open: bool,
    open_element: Option<Reservation>,
    state: ClipState,
    span: Span,
}

impl MxfClipWriter<BufWriter<File>> {
    /// Create `path` and write its header partition
    pub fn create(path: &Path, settings: ClipSettings) -> Result<Self> {
        let file = File::create(path).map_err(|e| MxfError::filesystem(path, e))?;
        Self::new(BufWriter::new(file), settings)
    }
}

impl<W: Write + Seek> MxfClipWriter<W> {
    /// Wrap `inner` and write the open header partition and primer pack
    pub fn new(inner: W, settings: ClipSettings) -> Result<Self> {
        let span = tracing::debug_span!("clip", body_sid = settings.body_sid);
        let mut clip = Self {
            writer: KlvWriter::new(inner),
            directory: PartitionDirectory::new(),
            settings,
            stream_offset: 0,
            body_open: false,
            open_element: None,
            state: ClipState::Open,
            span,
        };
        clip.write_header()?;
        Ok(clip)
    }

    pub fn directory(&self) -> &PartitionDirectory {
        &self.directory
    }

    pub fn stream_offset(&self) -> u64 {
        self.stream_offset
    }

    pub fn settings(&self) -> &ClipSettings {
        &self.settings
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn new_pack(&self, mut pack: PartitionPack) -> PartitionPack {
        pack.kag_size = self.settings.kag_size;
        pack.add_essence_container(Key(labels::GC_FRAME_WRAPPED));
        pack
    }

    fn write_header(&mut self) -> Result<()> {
        let pack = self.new_pack(PartitionPack::header());
        self.directory.write_partition(&mut self.writer, pack)?;
        let metadata_start = self.writer.position()?;

        let mut primer = PrimerPack::new();
        for (tag, ul) in tags::STATIC_TAGS.iter() {
            primer.register(*tag, *ul)?;
        }
        primer.write(&mut self.writer)?;
        self.writer.align_to_kag(self.settings.kag_size)?;

        let header_byte_count = self.writer.position()? - metadata_start;
        if let Some(header) = self.directory.get_mut(0) {
            header.header_byte_count = header_byte_count;
        }
        self.directory.rewrite_partition(&mut self.writer, 0)?;
        debug!(parent: &self.span, "header metadata is {} bytes", header_byte_count);
        Ok(())
    }

    fn check_open(&self, operation: &str) -> Result<()> {
        if self.state != ClipState::Open {
            return Err(MxfError::InvalidSequencing(format!(
                "{} on a clip that is {:?}",
                operation, self.state
            )));
        }
        Ok(())
    }

    fn check_no_open_element(&self, operation: &str) -> Result<()> {
        if self.open_element.is_some() {
            return Err(MxfError::InvalidSequencing(format!(
                "{} while an essence element is open",
                operation
            )));
        }
        Ok(())
    }

    fn ensure_body_partition(&mut self) -> Result<()> {
        if !self.body_open {
            self.start_body_partition()?;
        }
        Ok(())
    }
}

impl<W: Write + Seek> ClipWriter for MxfClipWriter<W> {
    fn write_element(&mut self, data: &[u8]) -> Result<u64> {
        self.check_open("write_element")?;
        self.check_no_open_element("write_element")?;
        if data.len() as u64 > MAX_ELEMENT_SIZE {
            return Err(MxfError::InvalidSample(format!(
                "element of {} bytes exceeds {}",
                data.len(),
                MAX_ELEMENT_SIZE
            )));
        }
        self.ensure_body_partition()?;

        let offset = self.stream_offset;
        self.writer
            .write_fixed_kl(&self.settings.essence_key, data.len() as u64, ELEMENT_LLEN)?;
        self.writer.write_bytes(data)?;
        self.stream_offset += ELEMENT_KL_SIZE + data.len() as u64;
        Ok(offset)
    }

    fn start_element(&mut self) -> Result<u64> {
        self.check_open("start_element")?;
        self.check_no_open_element("start_element")?;
        self.ensure_body_partition()?;

        let reservation = self.writer.reserve_kl(&self.settings.essence_key, ELEMENT_LLEN)?;
        self.open_element = Some(reservation);
        Ok(self.stream_offset)
    }

    fn append_element_data(&mut self, data: &[u8]) -> Result<()> {
        self.check_open("append_element_data")?;
        let reservation = self.open_element.ok_or_else(|| {
            MxfError::InvalidSequencing("append_element_data without start_element".into())
        })?;
        let written = self.writer.position()? - reservation.value_offset;
        if written + data.len() as u64 > MAX_ELEMENT_SIZE {
            return Err(MxfError::InvalidSample(format!(
                "element would grow to {} bytes, limit is {}",
                written + data.len() as u64,
                MAX_ELEMENT_SIZE
            )));
        }
        self.writer.write_bytes(data)
    }

    fn end_element(&mut self) -> Result<u64> {
        self.check_open("end_element")?;
        let reservation = self.open_element.take().ok_or_else(|| {
            MxfError::InvalidSequencing("end_element without start_element".into())
        })?;
        let length = self.writer.patch_length(&reservation)?;
        self.stream_offset += ELEMENT_KL_SIZE + length;
        Ok(length)
    }

    fn start_body_partition(&mut self) -> Result<()> {
        self.check_open("start_body_partition")?;
        self.check_no_open_element("start_body_partition")?;

        let mut pack = self.new_pack(PartitionPack::body());
        pack.body_sid = self.settings.body_sid;
        pack.body_offset = self.stream_offset;
        let offset = self.directory.write_partition(&mut self.writer, pack)?;
        self.writer.align_to_kag(self.settings.kag_size)?;
        self.body_open = true;
        debug!(
            parent: &self.span,
            "body partition at {} starts at stream offset {}",
            offset, self.stream_offset
        );
        Ok(())
    }

    fn finalize(&mut self, index: &EssenceIndex) -> Result<()> {
        let _enter = self.span.enter();
        self.check_open("finalize")?;
        self.check_no_open_element("finalize")?;

        let mut footer = self.new_pack(PartitionPack::footer());
        footer.index_sid = self.settings.index_sid;
        let footer_offset = self.directory.write_partition(&mut self.writer, footer)?;

        let index_byte_count = index.write(&mut self.writer, &self.settings.placement())?;
        if let Some(footer) = self.directory.last_mut() {
            footer.index_byte_count = index_byte_count;
        }

        self.directory.write_rip(&mut self.writer)?;
        self.directory.update_partitions(&mut self.writer)?;
        self.writer.flush()?;
        self.state = ClipState::Finalized;

        info!(
            "finalized clip: {} edit units, {} essence bytes, {} partitions, footer at {}",
            index.duration(),
            self.stream_offset,
            self.directory.len(),
            footer_offset
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.state == ClipState::Closed {
            return Ok(());
        }
        if self.state == ClipState::Open {
            debug!(parent: &self.span, "closing clip that was never finalized");
        }
        self.writer.flush()?;
        self.state = ClipState::Closed;
        Ok(())
    }
}
