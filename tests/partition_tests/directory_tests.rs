//! Tests for the Partition Directory
//!
//! These tests verify:
//! - Writing assigns offsets and back-pointers, and the second pass closes packs
//! - RIP and backward-chain discovery agree
//! - Discovery falls back to the chain when the RIP is missing
//! - Cycles, self-loops and missing footer offsets are reported, not followed

use std::io::Cursor;

use mxfcap::klv::{labels, KlvReader, KlvWriter};
use mxfcap::partition::{
    Discovery, PartitionDirectory, PartitionKind, PartitionPack, PartitionStatus, RandomIndexPack,
};
use mxfcap::MxfError;

// =============================================================================
// Helper Functions
// =============================================================================

const ESSENCE_KEY: mxfcap::klv::Key = labels::essence_element(0x15, 0x01, 1);

struct Written {
    writer: KlvWriter<Cursor<Vec<u8>>>,
    directory: PartitionDirectory,
}

impl Written {
    fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner().into_inner()
    }
}

/// Header, two body partitions carrying essence, footer; no RIP or second pass yet
fn write_partitions() -> Written {
    let mut writer = KlvWriter::new(Cursor::new(Vec::new()));
    let mut directory = PartitionDirectory::new();

    directory.write_partition(&mut writer, PartitionPack::header()).unwrap();
    writer.write_fill(64).unwrap();

    let mut stream_offset = 0;
    for _ in 0..2 {
        let mut body = PartitionPack::body();
        body.body_sid = 1;
        body.body_offset = stream_offset;
        directory.write_partition(&mut writer, body).unwrap();
        stream_offset += writer.write_klv(&ESSENCE_KEY, &[0x55; 300]).unwrap();
    }

    let mut footer = PartitionPack::footer();
    footer.index_sid = 2;
    directory.write_partition(&mut writer, footer).unwrap();

    Written { writer, directory }
}

fn finished_file(with_rip: bool) -> (Vec<u8>, Vec<u64>) {
    let mut written = write_partitions();
    if with_rip {
        written.directory.write_rip(&mut written.writer).unwrap();
    }
    written.directory.update_partitions(&mut written.writer).unwrap();
    let offsets = written.directory.offsets();
    (written.into_bytes(), offsets)
}

fn reader(bytes: Vec<u8>) -> KlvReader<Cursor<Vec<u8>>> {
    KlvReader::new(Cursor::new(bytes))
}

// =============================================================================
// Writing
// =============================================================================

#[test]
fn test_write_links_partitions() {
    let written = write_partitions();
    let packs = written.directory.partitions();

    assert_eq!(packs.len(), 4);
    assert_eq!(packs[0].this_partition, 0);
    for pair in packs.windows(2) {
        assert!(pair[1].this_partition > pair[0].this_partition);
        assert_eq!(pair[1].previous_partition, pair[0].this_partition);
    }
    assert_eq!(packs[3].footer_partition, packs[3].this_partition);
    assert_eq!(written.directory.essence_partitions(1).count(), 2);
}

#[test]
fn test_first_partition_must_be_header() {
    let mut writer = KlvWriter::new(Cursor::new(Vec::new()));
    let mut directory = PartitionDirectory::new();
    assert!(matches!(
        directory.write_partition(&mut writer, PartitionPack::body()),
        Err(MxfError::CorruptPartitionChain(_))
    ));
}

#[test]
fn test_rip_requires_footer() {
    let mut writer = KlvWriter::new(Cursor::new(Vec::new()));
    let mut directory = PartitionDirectory::new();
    directory.write_partition(&mut writer, PartitionPack::header()).unwrap();
    assert!(directory.write_rip(&mut writer).is_err());
    assert!(directory.update_partitions(&mut writer).is_err());
}

#[test]
fn test_second_pass_closes_packs_on_disk() {
    let (bytes, offsets) = finished_file(true);
    let footer_offset = *offsets.last().unwrap();
    let mut r = reader(bytes);

    for &offset in &offsets {
        let pack = PartitionPack::read_at(&mut r, offset).unwrap();
        assert_eq!(pack.footer_partition, footer_offset);
        assert!(pack.status.is_closed());
        if pack.kind != PartitionKind::Footer {
            assert_eq!(pack.status, PartitionStatus::ClosedComplete);
        }
    }
}

#[test]
fn test_rewrite_must_keep_size() {
    let mut written = write_partitions();
    written
        .directory
        .get_mut(1)
        .unwrap()
        .add_essence_container(labels::GC_FRAME_WRAPPED.into());
    assert!(matches!(
        written.directory.rewrite_partition(&mut written.writer, 1),
        Err(MxfError::MalformedKlv(_))
    ));
}

// =============================================================================
// Discovery
// =============================================================================

#[test]
fn test_rip_and_chain_agree() {
    let (bytes, offsets) = finished_file(true);
    let mut r = reader(bytes);

    let via_rip = PartitionDirectory::read_partitions(&mut r).unwrap();
    assert_eq!(via_rip.discovery(), Discovery::RandomIndexPack);
    assert_eq!(via_rip.offsets(), offsets);

    let via_chain = PartitionDirectory::read_via_chain(&mut r).unwrap();
    assert_eq!(via_chain.discovery(), Discovery::BackwardChain);
    assert_eq!(via_chain.partitions(), via_rip.partitions());

    let verified = PartitionDirectory::verify(&mut r).unwrap();
    assert_eq!(verified.offsets(), offsets);
    assert_eq!(verified.header().unwrap().kind, PartitionKind::Header);
    assert_eq!(verified.footer().unwrap().index_sid, 2);
}

#[test]
fn test_missing_rip_falls_back_to_chain() {
    let (bytes, offsets) = finished_file(false);
    let mut r = reader(bytes);

    assert!(RandomIndexPack::locate(&mut r).unwrap().is_none());
    let directory = PartitionDirectory::read_partitions(&mut r).unwrap();
    assert_eq!(directory.discovery(), Discovery::BackwardChain);
    assert_eq!(directory.offsets(), offsets);

    // verify accepts a file without a RIP
    assert_eq!(PartitionDirectory::verify(&mut r).unwrap().len(), 4);
}

#[test]
fn test_unclosed_header_cannot_be_walked() {
    // footer written, second pass never ran: header footer_partition is 0
    let written = write_partitions();
    let mut r = reader(written.into_bytes());
    assert!(matches!(
        PartitionDirectory::read_partitions(&mut r),
        Err(MxfError::CorruptPartitionChain(_))
    ));
}

#[test]
fn test_forward_pointer_cycle_detected() {
    let mut written = write_partitions();
    written.directory.update_partitions(&mut written.writer).unwrap();

    // second body partition points forward at the footer: footer -> body -> footer
    let footer_offset = written.directory.footer().unwrap().this_partition;
    written.directory.get_mut(2).unwrap().previous_partition = footer_offset;
    written.directory.rewrite_partition(&mut written.writer, 2).unwrap();

    let mut r = reader(written.into_bytes());
    assert!(matches!(
        PartitionDirectory::read_via_chain(&mut r),
        Err(MxfError::CorruptPartitionChain(_))
    ));
}

#[test]
fn test_self_loop_detected() {
    let mut written = write_partitions();
    written.directory.update_partitions(&mut written.writer).unwrap();

    let body_offset = written.directory.partitions()[1].this_partition;
    written.directory.get_mut(1).unwrap().previous_partition = body_offset;
    written.directory.rewrite_partition(&mut written.writer, 1).unwrap();

    let mut r = reader(written.into_bytes());
    assert!(matches!(
        PartitionDirectory::read_via_chain(&mut r),
        Err(MxfError::CorruptPartitionChain(_))
    ));
}

#[test]
fn test_pointer_into_essence_rejected() {
    let mut written = write_partitions();
    written.directory.update_partitions(&mut written.writer).unwrap();

    // lands inside the header pack, not on a key
    written.directory.get_mut(1).unwrap().previous_partition = 40;
    written.directory.rewrite_partition(&mut written.writer, 1).unwrap();

    let mut r = reader(written.into_bytes());
    assert!(PartitionDirectory::read_via_chain(&mut r).is_err());
}

#[test]
fn test_oversized_pack_length_is_malformed() {
    let mut bytes = PartitionPack::header().key().as_bytes().to_vec();
    bytes.extend_from_slice(&[0x88, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    bytes.extend_from_slice(&[0u8; 200]);
    let mut r = reader(bytes);
    assert!(matches!(
        PartitionDirectory::read_partitions(&mut r),
        Err(MxfError::MalformedKlv(_))
    ));
}

#[test]
fn test_rip_disagreeing_with_chain_fails_verify() {
    let mut written = write_partitions();
    let packs = written.directory.partitions().to_vec();

    // RIP that skips the second body partition
    let mut rip = RandomIndexPack::new();
    for pack in packs.iter().filter(|p| p.this_partition != packs[2].this_partition) {
        rip.add_entry(pack.body_sid, pack.this_partition);
    }
    rip.write(&mut written.writer).unwrap();
    written.directory.update_partitions(&mut written.writer).unwrap();

    let mut r = reader(written.into_bytes());
    assert_eq!(PartitionDirectory::read_partitions(&mut r).unwrap().len(), 3);
    assert!(matches!(
        PartitionDirectory::verify(&mut r),
        Err(MxfError::CorruptPartitionChain(_))
    ));
}

#[test]
fn test_rip_body_sid_mismatch_rejected() {
    let mut written = write_partitions();
    let mut rip = RandomIndexPack::new();
    for pack in written.directory.partitions() {
        rip.add_entry(pack.body_sid + 7, pack.this_partition);
    }
    rip.write(&mut written.writer).unwrap();
    written.directory.update_partitions(&mut written.writer).unwrap();

    let mut r = reader(written.into_bytes());
    assert!(matches!(
        PartitionDirectory::read_partitions(&mut r),
        Err(MxfError::CorruptPartitionChain(_))
    ));
}
