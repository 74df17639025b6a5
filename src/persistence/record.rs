//! Package records handed to the store when a session commits

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::capture::EssenceKind;
use crate::klv::{Rational, Umid};

/// The material package tying a session's tracks together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialPackageRecord {
    pub umid: Umid,
    pub name: String,
    /// Unix millis at session open
    pub created_at: u64,
}

/// One committed clip file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePackageRecord {
    pub track_id: u32,
    pub umid: Umid,
    pub kind: EssenceKind,
    pub edit_rate: Rational,
    /// Edit units written
    pub duration: i64,
    /// Final location in the destination directory
    pub path: PathBuf,
}

/// Everything persisted for one capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPackages {
    pub session_name: String,
    pub material_package: MaterialPackageRecord,
    pub file_packages: Vec<FilePackageRecord>,
}

impl SessionPackages {
    pub fn file_package(&self, track_id: u32) -> Option<&FilePackageRecord> {
        self.file_packages.iter().find(|p| p.track_id == track_id)
    }
}
