use std::path::Path;

use sdcam_common::naming::ImageNaming;
use tracing::{debug, error, info, warn};

use crate::disk::disk_usage;

/// What a single pass over the storage root found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageReport {
    pub files: usize,
    pub directories: usize,
    pub image_files: usize,
    pub bytes_used: u64,
    pub max_index: Option<u32>,
}

impl StorageReport {
    /// First index that cannot collide with any image seen in the scan, or
    /// `None` if the highest possible index is already taken.
    pub fn next_index(&self) -> Option<u32> {
        match self.max_index {
            Some(max) => max.checked_add(1),
            None => Some(1),
        }
    }
}

/// Enumerate the direct entries of `root` (no recursion).
///
/// Names that do not follow `naming` are counted but otherwise ignored.
/// Entries that fail to stat mid-iteration are skipped.
pub async fn scan_root(root: &Path, naming: &ImageNaming) -> std::io::Result<StorageReport> {
    let root = root.to_path_buf();
    let naming = naming.clone();
    tokio::task::spawn_blocking(move || scan_root_blocking(&root, &naming))
        .await
        .map_err(std::io::Error::other)?
}

fn scan_root_blocking(root: &Path, naming: &ImageNaming) -> std::io::Result<StorageReport> {
    let mut report = StorageReport::default();
    for entry in std::fs::read_dir(root)?.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            report.directories += 1;
            continue;
        }
        report.files += 1;
        if let Ok(meta) = entry.metadata() {
            report.bytes_used += meta.len();
        }

        let name = entry.file_name();
        let Some(index) = name.to_str().and_then(|n| naming.parse(n)) else {
            continue;
        };
        report.image_files += 1;
        report.max_index = Some(report.max_index.map_or(index, |max| max.max(index)));
    }
    Ok(report)
}

/// Index for the first image captured in this boot.
///
/// A missing or unreadable root is not fatal: the counter starts at 1. If
/// the card only became readable later, new captures may overwrite images
/// that were never scanned. `None` means every index is already in use.
pub async fn next_index(root: &Path, naming: &ImageNaming) -> Option<u32> {
    match scan_root(root, naming).await {
        Ok(report) => {
            info!(
                root = root.display().to_string(),
                files = report.files,
                directories = report.directories,
                images = report.image_files,
                used_mb = format!("{:.1}", report.bytes_used as f64 / 1_048_576.0),
                max_index = report.max_index,
                next_index = report.next_index(),
                "scanned storage root"
            );
            let volume = root.to_path_buf();
            let usage = tokio::task::spawn_blocking(move || disk_usage(&volume))
                .await
                .ok()
                .flatten();
            if let Some(usage) = usage {
                info!(
                    total_mb = usage.total_bytes / 1_048_576,
                    free_mb = usage.free_bytes / 1_048_576,
                    "storage volume"
                );
            } else {
                debug!("volume capacity unavailable");
            }
            if report.next_index().is_none() {
                error!(
                    root = root.display().to_string(),
                    "image index space exhausted, nothing will be stored until images are removed"
                );
            }
            report.next_index()
        }
        Err(e) => {
            warn!(
                root = root.display().to_string(),
                error = %e,
                "failed to scan storage root, numbering restarts at 1 and may overwrite existing images"
            );
            Some(1)
        }
    }
}
