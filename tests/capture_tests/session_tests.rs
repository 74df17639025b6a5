//! Tests for CaptureSession
//!
//! These tests verify:
//! - Every track is finalized into the destination directory and readable
//! - A failing track lands in failures without affecting the others
//! - A taken target name never leaves a file behind in creating
//! - Package records are saved once and exclude failed tracks
//! - Sequencing and sample-size misuse is rejected with the right error

use std::path::Path;
use std::sync::Arc;

use mxfcap::capture::TrackState;
use mxfcap::clip::{ClipReader, ClipSettings, ClipWriter, MxfClipWriter};
use mxfcap::index::EssenceIndex;
use mxfcap::klv::Rational;
use mxfcap::persistence::{LogPackageStore, PackageStore, SessionPackages};
use mxfcap::{
    CaptureSession, CommitSyncStrategy, Config, EssenceKind, EssenceLayout, MxfError,
    TrackConfig, WriteMode,
};
use parking_lot::Mutex;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const AUDIO_SAMPLES_PER_FRAME: u32 = 480;

/// Store that keeps every saved session in memory
#[derive(Default)]
struct MemoryStore {
    saved: Mutex<Vec<SessionPackages>>,
}

impl PackageStore for MemoryStore {
    fn save_packages(&self, packages: &SessionPackages) -> mxfcap::Result<()> {
        self.saved.lock().push(packages.clone());
        Ok(())
    }
}

struct FailingStore;

impl PackageStore for FailingStore {
    fn save_packages(&self, _packages: &SessionPackages) -> mxfcap::Result<()> {
        Err(MxfError::Persistence("database unavailable".into()))
    }
}

/// Clip writer whose footer can never be written
struct FailOnFinalize(Box<dyn ClipWriter>);

impl ClipWriter for FailOnFinalize {
    fn write_element(&mut self, data: &[u8]) -> mxfcap::Result<u64> {
        self.0.write_element(data)
    }

    fn start_element(&mut self) -> mxfcap::Result<u64> {
        self.0.start_element()
    }

    fn append_element_data(&mut self, data: &[u8]) -> mxfcap::Result<()> {
        self.0.append_element_data(data)
    }

    fn end_element(&mut self) -> mxfcap::Result<u64> {
        self.0.end_element()
    }

    fn start_body_partition(&mut self) -> mxfcap::Result<()> {
        self.0.start_body_partition()
    }

    fn finalize(&mut self, _index: &EssenceIndex) -> mxfcap::Result<()> {
        Err(MxfError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "no space left on device",
        )))
    }

    fn close(&mut self) -> mxfcap::Result<()> {
        self.0.close()
    }
}

fn test_config(root: &Path) -> Config {
    Config::builder()
        .root_dir(root)
        .sync_strategy(CommitSyncStrategy::None)
        .build()
}

/// Video (VBE samples), audio (CBE samples), data (VBE streaming)
fn three_tracks() -> Vec<TrackConfig> {
    vec![
        TrackConfig::new(1, EssenceKind::Video, Rational::fps_25(), "video.mxf"),
        TrackConfig::new(2, EssenceKind::Audio, Rational::new(48000, 1), "audio.mxf")
            .with_layout(EssenceLayout::Constant { sample_size: 4 }),
        TrackConfig::new(3, EssenceKind::Data, Rational::fps_25(), "data.mxf")
            .with_mode(WriteMode::Streaming),
    ]
}

fn video_frame(i: usize) -> Vec<u8> {
    vec![i as u8; 500 + 11 * i]
}

fn data_unit(i: usize) -> Vec<u8> {
    let mut unit = b"cc".to_vec();
    unit.extend_from_slice(&[i as u8; 10]);
    unit
}

fn write_frames(session: &mut CaptureSession, frames: usize) {
    let audio = vec![0x11u8; AUDIO_SAMPLES_PER_FRAME as usize * 4];
    for i in 0..frames {
        session.write_sample(1, 1, &video_frame(i)).unwrap();
        session.write_sample(2, AUDIO_SAMPLES_PER_FRAME, &audio).unwrap();
        session.start_sample_data(3).unwrap();
        session.write_sample_data(3, b"cc").unwrap();
        session.write_sample_data(3, &[i as u8; 10]).unwrap();
        session.end_sample_data(3).unwrap();
    }
}

fn open_session(root: &Path, store: Arc<dyn PackageStore>) -> CaptureSession {
    CaptureSession::open("ingest-1", test_config(root), three_tracks(), store).unwrap()
}

/// Session whose audio track fails to finalize
fn open_session_failing_audio(root: &Path, store: Arc<dyn PackageStore>) -> CaptureSession {
    CaptureSession::open_with(
        "ingest-2",
        test_config(root),
        three_tracks(),
        store,
        |path: &Path, settings: ClipSettings| {
            let clip: Box<dyn ClipWriter> = Box::new(MxfClipWriter::create(path, settings)?);
            if path.ends_with("audio.mxf") {
                Ok(Box::new(FailOnFinalize(clip)) as Box<dyn ClipWriter>)
            } else {
                Ok(clip)
            }
        },
    )
    .unwrap()
}

// =============================================================================
// Commit
// =============================================================================

#[test]
fn test_all_tracks_reach_destination() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::default());
    let mut session = open_session(temp.path(), store.clone());
    write_frames(&mut session, 6);

    let report = session.complete_and_save_to_database().unwrap();
    assert!(report.all_successful());
    assert!(report.failed_tracks().is_empty());

    let destination = temp.path().join("destination");
    for (id, name) in [(1, "video.mxf"), (2, "audio.mxf"), (3, "data.mxf")] {
        assert!(session.was_successful(id).unwrap());
        assert_eq!(session.get_filename(id).unwrap(), destination.join(name));
        assert_eq!(session.track_state(id).unwrap(), TrackState::CommittedDestination);
        assert!(destination.join(name).exists());
    }
    assert_eq!(std::fs::read_dir(temp.path().join("creating")).unwrap().count(), 0);

    let saved = store.saved.lock();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0], report.packages);
    assert_eq!(saved[0].session_name, "ingest-1");
    assert_eq!(saved[0].file_packages.len(), 3);
    assert_eq!(saved[0].file_package(1).unwrap().duration, 6);
    assert_eq!(
        saved[0].file_package(2).unwrap().duration,
        6 * AUDIO_SAMPLES_PER_FRAME as i64
    );
    assert_eq!(saved[0].file_package(3).unwrap().path, destination.join("data.mxf"));
}

#[test]
fn test_committed_clips_are_readable() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(temp.path(), Arc::new(MemoryStore::default()));
    write_frames(&mut session, 4);
    session.complete_and_save_to_database().unwrap();

    let mut video = ClipReader::open_file(&session.get_filename(1).unwrap()).unwrap();
    assert_eq!(video.duration(), 4);
    assert_eq!(video.read_edit_unit(3).unwrap(), video_frame(3));

    let mut audio = ClipReader::open_file(&session.get_filename(2).unwrap()).unwrap();
    assert!(audio.index().unwrap().is_cbe());
    assert_eq!(audio.duration(), 4 * AUDIO_SAMPLES_PER_FRAME as i64);
    assert_eq!(audio.read_edit_unit(1000).unwrap(), vec![0x11u8; 4]);

    let mut data = ClipReader::open_file(&session.get_filename(3).unwrap()).unwrap();
    assert_eq!(data.read_edit_unit(2).unwrap(), data_unit(2));
}

#[test]
fn test_failed_track_is_isolated() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::default());
    let mut session = open_session_failing_audio(temp.path(), store.clone());
    write_frames(&mut session, 3);

    let report = session.complete_and_save_to_database().unwrap();
    assert!(!report.all_successful());
    assert_eq!(report.failed_tracks(), vec![2]);
    let audio = report.tracks.iter().find(|t| t.track_id == 2).unwrap();
    assert!(matches!(audio.error, Some(MxfError::Io(_))));

    assert!(!session.was_successful(2).unwrap());
    assert_eq!(session.track_state(2).unwrap(), TrackState::CommittedFailure);
    assert_eq!(
        session.get_filename(2).unwrap(),
        temp.path().join("failures").join("audio.mxf")
    );
    assert!(temp.path().join("failures").join("audio.mxf").exists());

    for id in [1, 3] {
        assert!(session.was_successful(id).unwrap());
    }
    let mut video = ClipReader::open_file(&session.get_filename(1).unwrap()).unwrap();
    assert_eq!(video.read_edit_unit(2).unwrap(), video_frame(2));

    let saved = store.saved.lock();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].file_packages.len(), 2);
    assert!(saved[0].file_package(2).is_none());
}

#[test]
fn test_failed_move_is_isolated() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::default());
    let mut session = open_session(temp.path(), store.clone());
    let taken = temp.path().join("destination").join("audio.mxf");
    std::fs::write(&taken, b"from an earlier session").unwrap();
    write_frames(&mut session, 3);

    let report = session.complete_and_save_to_database().unwrap();
    assert_eq!(report.failed_tracks(), vec![2]);
    let audio = report.tracks.iter().find(|t| t.track_id == 2).unwrap();
    assert!(matches!(audio.error, Some(MxfError::Filesystem { .. })));

    let failed = temp.path().join("failures").join("audio.mxf");
    assert_eq!(session.get_filename(2).unwrap(), failed);
    assert!(failed.exists());
    assert_eq!(std::fs::read(&taken).unwrap(), b"from an earlier session");
    assert!(!temp.path().join("creating").join("audio.mxf").exists());

    for id in [1, 3] {
        assert!(session.was_successful(id).unwrap());
    }

    let saved = store.saved.lock();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].file_packages.len(), 2);
    assert!(saved[0].file_package(2).is_none());
}

#[test]
fn test_taken_failure_name_gets_suffix() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(temp.path(), Arc::new(MemoryStore::default()));
    std::fs::write(temp.path().join("destination").join("video.mxf"), b"old").unwrap();
    std::fs::write(temp.path().join("failures").join("video.mxf"), b"older").unwrap();
    write_frames(&mut session, 2);

    let report = session.complete_and_save_to_database().unwrap();
    assert_eq!(report.failed_tracks(), vec![1]);

    let failed = temp.path().join("failures").join("video.mxf.1");
    assert_eq!(session.track_state(1).unwrap(), TrackState::CommittedFailure);
    assert_eq!(session.get_filename(1).unwrap(), failed);
    assert!(!temp.path().join("creating").join("video.mxf").exists());
    assert_eq!(std::fs::read(temp.path().join("failures").join("video.mxf")).unwrap(), b"older");

    // the clip itself is intact
    let mut video = ClipReader::open_file(&failed).unwrap();
    assert_eq!(video.read_edit_unit(1).unwrap(), video_frame(1));
}

#[test]
fn test_open_streaming_unit_fails_its_track() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(temp.path(), Arc::new(MemoryStore::default()));
    write_frames(&mut session, 2);
    session.start_sample_data(3).unwrap();
    session.write_sample_data(3, b"partial").unwrap();

    let report = session.complete_and_save_to_database().unwrap();
    assert_eq!(report.failed_tracks(), vec![3]);
    assert!(temp.path().join("failures").join("data.mxf").exists());
    assert!(session.was_successful(1).unwrap());
}

#[test]
fn test_store_failure_keeps_track_results() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(temp.path(), Arc::new(FailingStore));
    write_frames(&mut session, 2);

    let err = session.complete_and_save_to_database().unwrap_err();
    assert!(matches!(err, MxfError::Persistence(_)));

    // file moves are not undone
    assert!(session.was_successful(1).unwrap());
    assert!(temp.path().join("destination").join("video.mxf").exists());
}

#[test]
fn test_log_store_receives_session() {
    let temp = TempDir::new().unwrap();
    let store_path = temp.path().join("packages.log");
    let store = Arc::new(LogPackageStore::open(&store_path).unwrap());
    let config = Config::builder()
        .root_dir(temp.path())
        .sync_strategy(CommitSyncStrategy::EveryFile)
        .build();
    let mut session = CaptureSession::open("ingest-3", config, three_tracks(), store).unwrap();
    write_frames(&mut session, 1);
    let report = session.complete_and_save_to_database().unwrap();

    let (sessions, scan) = LogPackageStore::read_all(&store_path).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].packages, report.packages);
    assert!(!scan.was_truncated);
}

#[test]
fn test_body_partition_interval() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .root_dir(temp.path())
        .sync_strategy(CommitSyncStrategy::None)
        .body_partition_interval(2)
        .build();
    let tracks = vec![TrackConfig::new(1, EssenceKind::Video, Rational::fps_25(), "v.mxf")];
    let mut session =
        CaptureSession::open("cadence", config, tracks, Arc::new(MemoryStore::default())).unwrap();
    for i in 0..5 {
        session.write_sample(1, 1, &video_frame(i)).unwrap();
    }
    session.complete_and_save_to_database().unwrap();

    let mut reader = ClipReader::open_file(&session.get_filename(1).unwrap()).unwrap();
    assert_eq!(reader.directory().essence_partitions(2).count(), 3);
    assert_eq!(reader.read_edit_unit(4).unwrap(), video_frame(4));
}

#[test]
fn test_dropped_session_leaves_files_in_creating() {
    let temp = TempDir::new().unwrap();
    {
        let mut session = open_session(temp.path(), Arc::new(MemoryStore::default()));
        write_frames(&mut session, 1);
    }
    assert!(temp.path().join("creating").join("video.mxf").exists());
    assert!(!temp.path().join("destination").join("video.mxf").exists());
}

// =============================================================================
// Sequencing
// =============================================================================

#[test]
fn test_results_unavailable_before_commit() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path(), Arc::new(MemoryStore::default()));
    assert_eq!(session.track_state(1).unwrap(), TrackState::Writing);
    assert!(matches!(session.was_successful(1), Err(MxfError::InvalidSequencing(_))));
    assert!(matches!(session.get_filename(1), Err(MxfError::InvalidSequencing(_))));
    assert!(matches!(session.was_successful(9), Err(MxfError::UnknownTrack(9))));
}

#[test]
fn test_streaming_calls_out_of_order() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(temp.path(), Arc::new(MemoryStore::default()));

    assert!(matches!(session.end_sample_data(3), Err(MxfError::InvalidSequencing(_))));
    assert!(matches!(
        session.write_sample_data(3, b"x"),
        Err(MxfError::InvalidSequencing(_))
    ));
    session.start_sample_data(3).unwrap();
    assert!(matches!(session.start_sample_data(3), Err(MxfError::InvalidSequencing(_))));
    session.end_sample_data(3).unwrap();
}

#[test]
fn test_wrong_mode_and_unknown_track() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(temp.path(), Arc::new(MemoryStore::default()));

    assert!(matches!(
        session.write_sample(3, 1, b"x"),
        Err(MxfError::InvalidSequencing(_))
    ));
    assert!(matches!(session.start_sample_data(1), Err(MxfError::InvalidSequencing(_))));
    assert!(matches!(
        session.write_sample(42, 1, b"x"),
        Err(MxfError::UnknownTrack(42))
    ));
}

#[test]
fn test_nothing_accepted_after_commit() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(temp.path(), Arc::new(MemoryStore::default()));
    session.complete_and_save_to_database().unwrap();

    assert!(matches!(
        session.write_sample(1, 1, b"late"),
        Err(MxfError::InvalidSequencing(_))
    ));
    assert!(matches!(
        session.complete_and_save_to_database(),
        Err(MxfError::InvalidSequencing(_))
    ));
}

// =============================================================================
// Sample Validation
// =============================================================================

#[test]
fn test_sample_sizes_checked() {
    let temp = TempDir::new().unwrap();
    let mut session = open_session(temp.path(), Arc::new(MemoryStore::default()));

    // CBE audio: 4 bytes per sample
    assert!(matches!(
        session.write_sample(2, 3, &[0u8; 11]),
        Err(MxfError::InvalidSample(_))
    ));
    assert!(matches!(session.write_sample(2, 0, &[]), Err(MxfError::InvalidSample(_))));
    // VBE video: one sample per call
    assert!(matches!(
        session.write_sample(1, 2, &[0u8; 8]),
        Err(MxfError::InvalidSample(_))
    ));

    // rejected samples do not stop the track
    session.write_sample(2, 3, &[0u8; 12]).unwrap();
    session.write_sample(1, 1, &[0u8; 8]).unwrap();
    let report = session.complete_and_save_to_database().unwrap();
    assert_eq!(report.packages.file_package(2).unwrap().duration, 3);
}

#[test]
fn test_streamed_cbe_unit_must_match_sample_size() {
    let temp = TempDir::new().unwrap();
    let tracks = vec![TrackConfig::new(7, EssenceKind::Audio, Rational::new(48000, 1), "pcm.mxf")
        .with_layout(EssenceLayout::Constant { sample_size: 8 })
        .with_mode(WriteMode::Streaming)];
    let mut session = CaptureSession::open(
        "pcm",
        test_config(temp.path()),
        tracks,
        Arc::new(MemoryStore::default()),
    )
    .unwrap();

    session.start_sample_data(7).unwrap();
    assert!(matches!(
        session.write_sample_data(7, &[0u8; 9]),
        Err(MxfError::InvalidSample(_))
    ));
    session.write_sample_data(7, &[0u8; 5]).unwrap();
    assert!(matches!(session.end_sample_data(7), Err(MxfError::InvalidSample(_))));
    session.write_sample_data(7, &[0u8; 3]).unwrap();
    session.end_sample_data(7).unwrap();

    let report = session.complete_and_save_to_database().unwrap();
    assert!(report.all_successful());
    assert_eq!(report.packages.file_package(7).unwrap().duration, 1);
}

// =============================================================================
// Opening
// =============================================================================

#[test]
fn test_invalid_track_sets_rejected() {
    let temp = TempDir::new().unwrap();
    let open = |tracks: Vec<TrackConfig>| {
        CaptureSession::open(
            "bad",
            test_config(temp.path()),
            tracks,
            Arc::new(MemoryStore::default()),
        )
    };

    let duplicate_id = vec![
        TrackConfig::new(1, EssenceKind::Video, Rational::fps_25(), "a.mxf"),
        TrackConfig::new(1, EssenceKind::Audio, Rational::fps_25(), "b.mxf"),
    ];
    assert!(matches!(open(duplicate_id), Err(MxfError::Config(_))));

    let duplicate_name = vec![
        TrackConfig::new(1, EssenceKind::Video, Rational::fps_25(), "a.mxf"),
        TrackConfig::new(2, EssenceKind::Audio, Rational::fps_25(), "a.mxf"),
    ];
    assert!(matches!(open(duplicate_name), Err(MxfError::Config(_))));

    let nested = vec![TrackConfig::new(1, EssenceKind::Video, Rational::fps_25(), "sub/a.mxf")];
    assert!(matches!(open(nested), Err(MxfError::Config(_))));

    let zero_size = vec![TrackConfig::new(1, EssenceKind::Audio, Rational::fps_25(), "a.mxf")
        .with_layout(EssenceLayout::Constant { sample_size: 0 })];
    assert!(matches!(open(zero_size), Err(MxfError::Config(_))));
}

#[test]
fn test_shared_commit_directories_rejected() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .root_dir(temp.path())
        .failures_dir(temp.path().join("destination"))
        .build();
    let result = CaptureSession::open(
        "bad",
        config,
        three_tracks(),
        Arc::new(MemoryStore::default()),
    );
    assert!(matches!(result, Err(MxfError::Config(_))));
}
