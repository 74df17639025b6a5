//! Package Store
//!
//! Append-only, checksummed log of committed sessions. One frame per call to
//! [`PackageStore::save_packages`].

use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{MxfError, Result};

use super::record::SessionPackages;

/// Frame header: seq (8) + crc (4) + len (4)
pub const FRAME_HEADER_SIZE: usize = 16;

/// Receives the package records of a committed session
pub trait PackageStore: Send + Sync {
    fn save_packages(&self, packages: &SessionPackages) -> Result<()>;
}

/// A session read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub seq: u64,
    pub packages: SessionPackages,
}

/// Outcome of scanning a store file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreScan {
    pub records_read: usize,
    pub last_seq: u64,
    /// Bytes up to the end of the last complete frame
    pub valid_len: u64,
    /// A partial frame was found after the last complete one
    pub was_truncated: bool,
}

struct StoreFile {
    file: File,
    next_seq: u64,
}

/// [`PackageStore`] backed by an append-only log file
pub struct LogPackageStore {
    path: PathBuf,
    sync_on_save: bool,
    inner: Mutex<StoreFile>,
}

impl LogPackageStore {
    /// Open or create the log, dropping a torn tail left by a crash
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let scan = if path.exists() {
            Self::read_all(&path)?.1
        } else {
            StoreScan::default()
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MxfError::filesystem(&path, e))?;
        if scan.was_truncated {
            warn!(
                "package store {:?} had a torn tail; truncating to {} bytes",
                path, scan.valid_len
            );
            file.set_len(scan.valid_len)
                .map_err(|e| MxfError::filesystem(&path, e))?;
        }

        info!(
            "opened package store {:?} with {} sessions",
            path, scan.records_read
        );
        Ok(Self {
            path,
            sync_on_save: true,
            inner: Mutex::new(StoreFile {
                file,
                next_seq: scan.last_seq + 1,
            }),
        })
    }

    /// Skip the fsync after each frame
    pub fn without_sync(mut self) -> Self {
        self.sync_on_save = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every complete frame
    ///
    /// A short final frame ends the scan (`was_truncated`); a checksum mismatch
    /// in a complete frame is a `Persistence` error.
    pub fn read_all(path: impl AsRef<Path>) -> Result<(Vec<StoredSession>, StoreScan)> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| MxfError::filesystem(path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| MxfError::filesystem(path, e))?
            .len();
        let mut reader = BufReader::new(file);
        let mut sessions = Vec::new();
        let mut scan = StoreScan::default();

        loop {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            match read_full(&mut reader, &mut header)? {
                0 => break,
                n if n < FRAME_HEADER_SIZE => {
                    scan.was_truncated = true;
                    break;
                }
                _ => {}
            }

            let seq = u64::from_le_bytes(slice_array(&header[0..8]));
            let crc = u32::from_le_bytes(slice_array(&header[8..12]));
            let len = u32::from_le_bytes(slice_array(&header[12..16])) as usize;

            let payload_start = scan.valid_len + FRAME_HEADER_SIZE as u64;
            if payload_start + len as u64 > file_len {
                scan.was_truncated = true;
                break;
            }
            let mut payload = vec![0u8; len];
            if read_full(&mut reader, &mut payload)? < len {
                scan.was_truncated = true;
                break;
            }
            if crc32fast::hash(&payload) != crc {
                return Err(MxfError::Persistence(format!(
                    "checksum mismatch in frame {} of {:?}",
                    seq, path
                )));
            }

            let packages: SessionPackages = bincode::deserialize(&payload)
                .map_err(|e| MxfError::Serialization(e.to_string()))?;
            sessions.push(StoredSession { seq, packages });
            scan.records_read += 1;
            scan.last_seq = seq;
            scan.valid_len += (FRAME_HEADER_SIZE + len) as u64;
        }

        Ok((sessions, scan))
    }
}

impl PackageStore for LogPackageStore {
    fn save_packages(&self, packages: &SessionPackages) -> Result<()> {
        let payload = bincode::serialize(packages)
            .map_err(|e| MxfError::Serialization(e.to_string()))?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            MxfError::Persistence(format!("session record of {} bytes", payload.len()))
        })?;

        let mut store = self.inner.lock();
        let seq = store.next_seq;
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&seq.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);

        let persist_err = |e: std::io::Error| {
            MxfError::Persistence(format!("writing {:?}: {}", self.path, e))
        };
        store.file.write_all(&frame).map_err(persist_err)?;
        if self.sync_on_save {
            store.file.sync_data().map_err(persist_err)?;
        }
        store.next_seq += 1;

        debug!(
            "saved session {:?} as frame {} ({} file packages)",
            packages.session_name,
            seq,
            packages.file_packages.len()
        );
        Ok(())
    }
}

/// Read until `buf` is full or EOF; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn slice_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
