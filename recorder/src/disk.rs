use std::path::Path;

use sysinfo::Disks;

/// Capacity of the volume holding the storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    /// Bytes available to unprivileged writers.
    pub free_bytes: u64,
}

/// Usage of the mounted volume that contains `path`, if it can be found.
pub fn disk_usage(path: &Path) -> Option<DiskUsage> {
    let path = std::fs::canonicalize(path).ok()?;
    let disks = Disks::new_with_refreshed_list();
    containing_mount(
        &path,
        disks.iter().map(|d| {
            (
                d.mount_point(),
                DiskUsage {
                    total_bytes: d.total_space(),
                    free_bytes: d.available_space(),
                },
            )
        }),
    )
}

/// The deepest mount point that is a prefix of `path` wins.
fn containing_mount<'a>(
    path: &Path,
    mounts: impl IntoIterator<Item = (&'a Path, DiskUsage)>,
) -> Option<DiskUsage> {
    mounts
        .into_iter()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, usage)| usage)
}
