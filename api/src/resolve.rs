use std::path::{Path, PathBuf};

use tracing::debug;

/// What a request path refers to under the storage root.
#[derive(Debug)]
pub enum Resolved {
    Directory(Vec<ListingEntry>),
    File(tokio::fs::File),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Decoded path segments of a request path.
///
/// Empty and `.` segments are dropped. Returns `None` for anything that could
/// step outside the root: `..`, an encoded separator, a backslash or NUL, or
/// a segment that does not decode to UTF-8.
pub fn request_segments(uri_path: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    for raw in uri_path.split('/') {
        if raw.is_empty() {
            continue;
        }
        let segment = urlencoding::decode(raw).ok()?;
        if segment == "." {
            continue;
        }
        if segment == ".." || segment.contains(['/', '\\', '\0']) {
            return None;
        }
        segments.push(segment.into_owned());
    }
    Some(segments)
}

/// Map a request path onto the storage tree.
pub async fn resolve(root: &Path, uri_path: &str) -> Resolved {
    let Some(segments) = request_segments(uri_path) else {
        debug!(uri_path, "rejected request path");
        return Resolved::NotFound;
    };
    let path: PathBuf = segments.iter().fold(root.to_path_buf(), |p, s| p.join(s));

    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(e) => {
            debug!(path = path.display().to_string(), error = %e, "resource not found");
            return Resolved::NotFound;
        }
    };

    if meta.is_dir() {
        match list_directory(path.clone()).await {
            Ok(entries) => Resolved::Directory(entries),
            Err(e) => {
                debug!(path = path.display().to_string(), error = %e, "failed to list directory");
                Resolved::NotFound
            }
        }
    } else {
        match tokio::fs::File::open(&path).await {
            Ok(file) => Resolved::File(file),
            Err(e) => {
                debug!(path = path.display().to_string(), error = %e, "failed to open file");
                Resolved::NotFound
            }
        }
    }
}

/// Direct children of `dir`, sorted by name.
///
/// Names that are not UTF-8 cannot be requested back, so they are left out.
async fn list_directory(dir: PathBuf) -> std::io::Result<Vec<ListingEntry>> {
    tokio::task::spawn_blocking(move || {
        let mut entries: Vec<ListingEntry> = std::fs::read_dir(&dir)?
            .flatten()
            .filter_map(|entry| {
                let name = match entry.file_name().into_string() {
                    Ok(name) => name,
                    Err(raw) => {
                        debug!(name = ?raw, "skipping non-UTF-8 entry");
                        return None;
                    }
                };
                Some(ListingEntry {
                    name,
                    is_dir: entry.file_type().map(|t| t.is_dir()).unwrap_or(false),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    })
    .await
    .map_err(std::io::Error::other)?
}
