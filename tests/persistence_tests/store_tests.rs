//! Tests for LogPackageStore
//!
//! These tests verify:
//! - Saved sessions read back in order with increasing sequence numbers
//! - Reopening continues the sequence
//! - A torn final frame is dropped on open, a corrupted frame is an error

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use mxfcap::klv::{Rational, Umid};
use mxfcap::persistence::{
    FilePackageRecord, LogPackageStore, MaterialPackageRecord, PackageStore, SessionPackages,
    FRAME_HEADER_SIZE,
};
use mxfcap::{EssenceKind, MxfError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn packages(name: &str, tracks: u32) -> SessionPackages {
    SessionPackages {
        session_name: name.to_string(),
        material_package: MaterialPackageRecord {
            umid: Umid::generate(),
            name: name.to_string(),
            created_at: 1_700_000_000_000,
        },
        file_packages: (1..=tracks)
            .map(|track_id| FilePackageRecord {
                track_id,
                umid: Umid::generate(),
                kind: EssenceKind::Video,
                edit_rate: Rational::fps_25(),
                duration: 250 * track_id as i64,
                path: PathBuf::from(format!("/capture/destination/{}_{}.mxf", name, track_id)),
            })
            .collect(),
    }
}

fn store_path(temp: &TempDir) -> PathBuf {
    temp.path().join("packages.log")
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

// =============================================================================
// Save and Read
// =============================================================================

#[test]
fn test_saved_sessions_read_back() {
    let temp = TempDir::new().unwrap();
    let path = store_path(&temp);
    let store = LogPackageStore::open(&path).unwrap();

    let first = packages("morning", 2);
    let second = packages("evening", 0);
    store.save_packages(&first).unwrap();
    store.save_packages(&second).unwrap();

    let (sessions, scan) = LogPackageStore::read_all(&path).unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].seq, 1);
    assert_eq!(sessions[0].packages, first);
    assert_eq!(sessions[1].seq, 2);
    assert_eq!(sessions[1].packages, second);
    assert!(sessions[1].packages.file_packages.is_empty());

    assert_eq!(scan.records_read, 2);
    assert_eq!(scan.last_seq, 2);
    assert_eq!(scan.valid_len, file_len(&path));
    assert!(!scan.was_truncated);
}

#[test]
fn test_reopen_continues_sequence() {
    let temp = TempDir::new().unwrap();
    let path = store_path(&temp);
    {
        let store = LogPackageStore::open(&path).unwrap().without_sync();
        store.save_packages(&packages("a", 1)).unwrap();
        store.save_packages(&packages("b", 1)).unwrap();
    }

    let store = LogPackageStore::open(&path).unwrap();
    assert_eq!(store.path(), path.as_path());
    store.save_packages(&packages("c", 1)).unwrap();

    let (sessions, _) = LogPackageStore::read_all(&path).unwrap();
    let seqs: Vec<u64> = sessions.iter().map(|s| s.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(sessions[2].packages.session_name, "c");
}

#[test]
fn test_store_is_shared_across_threads() {
    let temp = TempDir::new().unwrap();
    let path = store_path(&temp);
    let store = std::sync::Arc::new(LogPackageStore::open(&path).unwrap().without_sync());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..5 {
                    store.save_packages(&packages(&format!("t{}-{}", t, i), 1)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let (sessions, scan) = LogPackageStore::read_all(&path).unwrap();
    assert_eq!(sessions.len(), 20);
    let seqs: Vec<u64> = sessions.iter().map(|s| s.seq).collect();
    assert_eq!(seqs, (1..=20).collect::<Vec<u64>>());
    assert!(!scan.was_truncated);
}

// =============================================================================
// Crash Recovery
// =============================================================================

#[test]
fn test_torn_tail_is_truncated_on_open() {
    let temp = TempDir::new().unwrap();
    let path = store_path(&temp);
    let kept = packages("kept", 1);
    let first_frame_end = {
        let store = LogPackageStore::open(&path).unwrap();
        store.save_packages(&kept).unwrap();
        let end = file_len(&path);
        store.save_packages(&packages("torn", 3)).unwrap();
        end
    };

    // crash halfway through the second frame
    let f = OpenOptions::new().write(true).open(&path).unwrap();
    f.set_len(file_len(&path) - 10).unwrap();
    drop(f);

    let (sessions, scan) = LogPackageStore::read_all(&path).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].packages, kept);
    assert!(scan.was_truncated);
    assert_eq!(scan.valid_len, first_frame_end);

    let store = LogPackageStore::open(&path).unwrap();
    assert_eq!(file_len(&path), first_frame_end);
    store.save_packages(&packages("after", 1)).unwrap();

    let (sessions, scan) = LogPackageStore::read_all(&path).unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[1].seq, 2);
    assert_eq!(sessions[1].packages.session_name, "after");
    assert!(!scan.was_truncated);
}

#[test]
fn test_partial_header_is_torn_tail() {
    let temp = TempDir::new().unwrap();
    let path = store_path(&temp);
    {
        let store = LogPackageStore::open(&path).unwrap();
        store.save_packages(&packages("only", 1)).unwrap();
    }
    let valid = file_len(&path);
    let mut f = OpenOptions::new().append(true).open(&path).unwrap();
    f.write_all(&[0xEE; FRAME_HEADER_SIZE - 3]).unwrap();
    drop(f);

    let (sessions, scan) = LogPackageStore::read_all(&path).unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(scan.was_truncated);
    assert_eq!(scan.valid_len, valid);
}

#[test]
fn test_corrupted_frame_is_persistence_error() {
    let temp = TempDir::new().unwrap();
    let path = store_path(&temp);
    {
        let store = LogPackageStore::open(&path).unwrap();
        store.save_packages(&packages("victim", 2)).unwrap();
    }

    // flip one payload byte
    let mut f = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    f.seek(SeekFrom::Start(FRAME_HEADER_SIZE as u64 + 4)).unwrap();
    f.write_all(&[0xFF]).unwrap();
    drop(f);

    assert!(matches!(
        LogPackageStore::read_all(&path),
        Err(MxfError::Persistence(_))
    ));
    assert!(matches!(
        LogPackageStore::open(&path),
        Err(MxfError::Persistence(_))
    ));
}

#[test]
fn test_missing_file_is_created_empty() {
    let temp = TempDir::new().unwrap();
    let path = store_path(&temp);
    let _store = LogPackageStore::open(&path).unwrap();
    assert!(path.exists());

    let (sessions, scan) = LogPackageStore::read_all(&path).unwrap();
    assert!(sessions.is_empty());
    assert_eq!(scan.valid_len, 0);
}
