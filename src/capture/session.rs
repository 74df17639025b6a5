//! Capture Session
//!
//! Owns the track writers of one capture. Essence is routed by track id; on
//! completion every track is finalized and committed independently, then the
//! package records are handed to the store exactly once.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, Span};

use crate::clip::{ClipSettings, ClipWriter, MxfClipWriter};
use crate::config::Config;
use crate::error::{MxfError, Result};
use crate::klv::Umid;
use crate::persistence::{FilePackageRecord, MaterialPackageRecord, PackageStore, SessionPackages};

use super::commit::commit_file;
use super::track::{StreamingWriter, TrackConfig, TrackCore, TrackState, TrackWriter, WriteMode};

/// Per-track result of [`CaptureSession::complete_and_save_to_database`]
#[derive(Debug)]
pub struct TrackOutcome {
    pub track_id: u32,
    pub state: TrackState,
    pub path: PathBuf,
    /// Why the track went to failures
    pub error: Option<MxfError>,
}

/// Result of committing a session whose package records were saved
#[derive(Debug)]
pub struct CommitReport {
    pub tracks: Vec<TrackOutcome>,
    pub packages: SessionPackages,
}

impl CommitReport {
    pub fn all_successful(&self) -> bool {
        self.tracks
            .iter()
            .all(|t| t.state == TrackState::CommittedDestination)
    }

    pub fn failed_tracks(&self) -> Vec<u32> {
        self.tracks
            .iter()
            .filter(|t| t.state != TrackState::CommittedDestination)
            .map(|t| t.track_id)
            .collect()
    }
}

/// One live capture writing a clip file per track
pub struct CaptureSession {
    name: String,
    config: Config,
    tracks: BTreeMap<u32, TrackWriter>,
    store: Arc<dyn PackageStore>,
    material_umid: Umid,
    created_at: u64,
    committed: bool,
    span: Span,
}

impl CaptureSession {
    /// Open a session writing MXF clips into the creating directory
    pub fn open(
        name: impl Into<String>,
        config: Config,
        tracks: Vec<TrackConfig>,
        store: Arc<dyn PackageStore>,
    ) -> Result<Self> {
        Self::open_with(name, config, tracks, store, |path, settings| {
            let clip = MxfClipWriter::create(path, settings)?;
            Ok(Box::new(clip) as Box<dyn ClipWriter>)
        })
    }

    /// Open a session with a custom clip writer per track
    ///
    /// `factory` receives the file's path in the creating directory.
    pub fn open_with<F>(
        name: impl Into<String>,
        config: Config,
        tracks: Vec<TrackConfig>,
        store: Arc<dyn PackageStore>,
        mut factory: F,
    ) -> Result<Self>
    where
        F: FnMut(&Path, ClipSettings) -> Result<Box<dyn ClipWriter>>,
    {
        let name = name.into();
        config.validate()?;
        check_tracks(&tracks)?;

        for dir in [&config.creating_dir, &config.destination_dir, &config.failures_dir] {
            fs::create_dir_all(dir).map_err(|e| MxfError::filesystem(dir, e))?;
        }

        let span = tracing::info_span!("capture", session = %name);
        let mut writers = BTreeMap::new();
        {
            let _enter = span.enter();
            for track in tracks {
                let path = config.creating_dir.join(&track.filename);
                // low byte of the id numbers the essence element
                let settings = ClipSettings::from_config(
                    &config,
                    track.kind.essence_key(track.track_id as u8),
                    track.edit_rate,
                );
                let clip = factory(&path, settings)?;
                debug!(
                    "opened track {} ({:?}, {:?} mode) at {:?}",
                    track.track_id, track.kind, track.mode, path
                );
                let track_id = track.track_id;
                let core = TrackCore::new(track, clip, path, config.body_partition_interval, &span);
                writers.insert(track_id, TrackWriter::new(core));
            }
            info!("session opened with {} tracks", writers.len());
        }

        Ok(Self {
            name,
            config,
            tracks: writers,
            store,
            material_umid: Umid::generate(),
            created_at: unix_millis(),
            committed: false,
            span,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn track_ids(&self) -> Vec<u32> {
        self.tracks.keys().copied().collect()
    }

    pub fn track(&self, track_id: u32) -> Result<&TrackWriter> {
        self.tracks.get(&track_id).ok_or(MxfError::UnknownTrack(track_id))
    }

    pub fn track_state(&self, track_id: u32) -> Result<TrackState> {
        Ok(self.track(track_id)?.core().state())
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Append `num_samples` edit units to a sample-mode track
    pub fn write_sample(&mut self, track_id: u32, num_samples: u32, data: &[u8]) -> Result<()> {
        match self.track_mut(track_id)? {
            TrackWriter::Sample(writer) => writer.write_sample(num_samples, data),
            TrackWriter::Streaming(_) => Err(mode_mismatch(track_id, WriteMode::Streaming)),
        }
    }

    /// Open an edit unit on a streaming-mode track
    pub fn start_sample_data(&mut self, track_id: u32) -> Result<()> {
        self.streaming(track_id)?.start_sample_data()
    }

    pub fn write_sample_data(&mut self, track_id: u32, data: &[u8]) -> Result<()> {
        self.streaming(track_id)?.write_sample_data(data)
    }

    pub fn end_sample_data(&mut self, track_id: u32) -> Result<()> {
        self.streaming(track_id)?.end_sample_data()
    }

    fn track_mut(&mut self, track_id: u32) -> Result<&mut TrackWriter> {
        if self.committed {
            return Err(MxfError::InvalidSequencing(format!(
                "session {} is already committed",
                self.name
            )));
        }
        self.tracks
            .get_mut(&track_id)
            .ok_or(MxfError::UnknownTrack(track_id))
    }

    fn streaming(&mut self, track_id: u32) -> Result<&mut StreamingWriter> {
        match self.track_mut(track_id)? {
            TrackWriter::Streaming(writer) => Ok(writer),
            TrackWriter::Sample(_) => Err(mode_mismatch(track_id, WriteMode::Sample)),
        }
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Finalize and relocate every track, then save the package records once
    ///
    /// Track failures are isolated and reported in the [`CommitReport`]. A
    /// store failure is returned as `Persistence`; file moves are not undone
    /// and per-track results stay queryable.
    pub fn complete_and_save_to_database(&mut self) -> Result<CommitReport> {
        if self.committed {
            return Err(MxfError::InvalidSequencing(format!(
                "session {} is already committed",
                self.name
            )));
        }
        self.committed = true;
        let _enter = self.span.enter();

        let mut outcomes = Vec::with_capacity(self.tracks.len());
        for (track_id, writer) in self.tracks.iter_mut() {
            let finalized = writer.finalize();
            let core = writer.core_mut();
            let track_span = core.span().clone();
            let _track = track_span.enter();

            if finalized.is_ok() {
                core.set_state(TrackState::CompletePendingCommit);
            }
            let outcome = commit_file(core.path(), finalized, &self.config);
            core.set_state(outcome.state);
            core.set_path(outcome.path.clone());
            outcomes.push(TrackOutcome {
                track_id: *track_id,
                state: outcome.state,
                path: outcome.path,
                error: outcome.error,
            });
        }

        let packages = self.packages();
        let failed = outcomes
            .iter()
            .filter(|o| o.state != TrackState::CommittedDestination)
            .count();
        info!(
            "committed {} tracks ({} failed); saving {} file packages",
            outcomes.len(),
            failed,
            packages.file_packages.len()
        );

        if let Err(err) = self.store.save_packages(&packages) {
            error!("saving packages for session {} failed: {}", self.name, err);
            return Err(match err {
                MxfError::Persistence(_) => err,
                other => MxfError::Persistence(other.to_string()),
            });
        }

        Ok(CommitReport {
            tracks: outcomes,
            packages,
        })
    }

    /// Records for every track that reached the destination directory
    fn packages(&self) -> SessionPackages {
        let file_packages = self
            .tracks
            .values()
            .map(TrackWriter::core)
            .filter(|core| core.state() == TrackState::CommittedDestination)
            .map(|core| FilePackageRecord {
                track_id: core.track_id(),
                umid: core.umid(),
                kind: core.config().kind,
                edit_rate: core.config().edit_rate,
                duration: core.duration(),
                path: core.path().to_path_buf(),
            })
            .collect();

        SessionPackages {
            session_name: self.name.clone(),
            material_package: MaterialPackageRecord {
                umid: self.material_umid,
                name: self.name.clone(),
                created_at: self.created_at,
            },
            file_packages,
        }
    }

    /// Whether the track's file reached the destination directory
    pub fn was_successful(&self, track_id: u32) -> Result<bool> {
        let state = self.committed_state(track_id)?;
        Ok(state == TrackState::CommittedDestination)
    }

    /// Where the track's file ended up
    pub fn get_filename(&self, track_id: u32) -> Result<PathBuf> {
        self.committed_state(track_id)?;
        Ok(self.track(track_id)?.core().path().to_path_buf())
    }

    fn committed_state(&self, track_id: u32) -> Result<TrackState> {
        let state = self.track_state(track_id)?;
        if !state.is_committed() {
            return Err(MxfError::InvalidSequencing(format!(
                "track {} has not been committed",
                track_id
            )));
        }
        Ok(state)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if !self.committed {
            let _enter = self.span.enter();
            info!("session dropped before commit; clips left in {:?}", self.config.creating_dir);
        }
    }
}

fn check_tracks(tracks: &[TrackConfig]) -> Result<()> {
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for track in tracks {
        track.validate()?;
        if !ids.insert(track.track_id) {
            return Err(MxfError::Config(format!("track id {} used twice", track.track_id)));
        }
        if !names.insert(track.filename.as_str()) {
            return Err(MxfError::Config(format!(
                "filename {:?} used by more than one track",
                track.filename
            )));
        }
    }
    Ok(())
}

fn mode_mismatch(track_id: u32, mode: WriteMode) -> MxfError {
    MxfError::InvalidSequencing(format!("track {} was opened in {:?} mode", track_id, mode))
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
