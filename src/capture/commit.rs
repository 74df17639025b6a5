//! Three-directory commit
//!
//! ```text
//!                 finalize + close ok
//!   creating/ ───────────────────────────► destination/
//!       │
//!       │ finalize, close, sync or move failed
//!       └────────────────────────────────► failures/
//! ```
//! A file never replaces an existing one. In failures a taken name gets a
//! numeric suffix (`video.mxf.1`, `video.mxf.2`, ...). Only if the move to
//! failures itself fails does the file stay in creating.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::config::{CommitSyncStrategy, Config};
use crate::error::{MxfError, Result};

use super::track::TrackState;

/// Highest suffix tried when a name is already taken in failures
const MAX_FAILURE_SUFFIX: u32 = 9999;

/// Where a track's file ended up
#[derive(Debug)]
pub(crate) struct CommitOutcome {
    pub state: TrackState,
    pub path: PathBuf,
    pub error: Option<MxfError>,
}

fn file_name(path: &Path) -> Result<OsString> {
    path.file_name().map(|n| n.to_os_string()).ok_or_else(|| {
        MxfError::filesystem(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })
}

/// Move `path` into `dir`, keeping its file name; never replaces an existing file
pub fn relocate(path: &Path, dir: &Path) -> Result<PathBuf> {
    let target = dir.join(file_name(path)?);
    if target.exists() {
        return Err(MxfError::filesystem(
            &target,
            io::Error::new(io::ErrorKind::AlreadyExists, "commit target already exists"),
        ));
    }
    move_file(path, &target)?;
    Ok(target)
}

/// Move `path` into `dir` under its own name, or the first free `name.N`
pub fn relocate_unique(path: &Path, dir: &Path) -> Result<PathBuf> {
    let name = file_name(path)?;
    let plain = dir.join(&name);
    if !plain.exists() {
        move_file(path, &plain)?;
        return Ok(plain);
    }
    for n in 1..=MAX_FAILURE_SUFFIX {
        let mut suffixed = name.clone();
        suffixed.push(format!(".{}", n));
        let target = dir.join(suffixed);
        if !target.exists() {
            move_file(path, &target)?;
            return Ok(target);
        }
    }
    Err(MxfError::filesystem(
        &plain,
        io::Error::new(io::ErrorKind::AlreadyExists, "no free name left in directory"),
    ))
}

/// Rename, falling back to copy + fsync + remove when the directories sit on
/// different filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    let rename_err = match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    if !from.is_file() {
        return Err(MxfError::filesystem(from, rename_err));
    }
    debug!("rename of {:?} failed ({}), copying instead", from, rename_err);

    let copied = fs::copy(from, to).and_then(|_| File::open(to)?.sync_all());
    if let Err(e) = copied {
        let _ = fs::remove_file(to);
        return Err(MxfError::filesystem(to, e));
    }
    fs::remove_file(from).map_err(|e| MxfError::filesystem(from, e))
}

fn sync_file(path: &Path) -> Result<()> {
    File::open(path)
        .and_then(|f| f.sync_all())
        .map_err(|e| MxfError::filesystem(path, e))
}

/// Relocate a closed clip according to how finalizing it went
pub(crate) fn commit_file(path: &Path, finalized: Result<()>, config: &Config) -> CommitOutcome {
    let moved = finalized
        .and_then(|_| match config.sync_strategy {
            CommitSyncStrategy::EveryFile => sync_file(path),
            CommitSyncStrategy::None => Ok(()),
        })
        .and_then(|_| relocate(path, &config.destination_dir));

    let cause = match moved {
        Ok(target) => {
            info!("committed {:?}", target);
            return CommitOutcome {
                state: TrackState::CommittedDestination,
                path: target,
                error: None,
            };
        }
        Err(cause) => cause,
    };

    warn!("commit of {:?} failed: {}", path, cause);
    match relocate_unique(path, &config.failures_dir) {
        Ok(target) => CommitOutcome {
            state: TrackState::CommittedFailure,
            path: target,
            error: Some(cause),
        },
        Err(move_err) => {
            error!(
                "could not move {:?} to failures, leaving it in place: {}",
                path, move_err
            );
            CommitOutcome {
                state: TrackState::CommittedFailure,
                path: path.to_path_buf(),
                error: Some(cause),
            }
        }
    }
}
