//! Incremental reconciliation of the type folders with the catalog.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use database::Catalog;
use model_structs::{FileAttributes, ModelRecord, ModelType, UpsertModel, display_path, model_id};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::fingerprint::{FingerprintError, identify};
use crate::sidecar::read_local_metadata;

/// What to scan.
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Root directories per type. A missing root yields no records for that type.
    pub roots: BTreeMap<ModelType, Vec<PathBuf>>,
    /// Recognized extensions per type, lowercase without dot.
    pub extensions: BTreeMap<ModelType, BTreeSet<String>>,
    /// Re-fingerprint every file even if size and mtime are unchanged.
    pub force: bool,
}

/// Counters for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Model files found on disk.
    pub files_seen: usize,
    /// Files whose identification hash was computed.
    pub hashed: usize,
    /// Files skipped because size and mtime matched the catalog.
    pub unchanged: usize,
    /// Records deleted because their file is gone.
    pub removed: u64,
    /// Files or directories skipped after an error.
    pub errors: usize,
}

/// A model file found while walking a root.
#[derive(Debug)]
struct FoundFile {
    path: PathBuf,
    relative: PathBuf,
    attributes: FileAttributes,
}

/// Result of walking every root of one type.
#[derive(Debug, Default)]
struct Walk {
    files: Vec<FoundFile>,
    /// Paths that could not be read; existing records below them are kept.
    unreadable: Vec<PathBuf>,
    /// Files skipped because an earlier root holds the same relative path.
    shadowed: Vec<PathBuf>,
}

/// Scans every configured type and reconciles the catalog.
///
/// Per-file and per-directory failures are logged and counted, never fatal.
///
/// # Errors
///
/// Returns an error only if the catalog itself fails.
pub async fn scan(catalog: &Catalog, config: &ScanConfig) -> Result<ScanStats, sqlx::Error> {
    let mut stats = ScanStats::default();

    for (&model_type, roots) in &config.roots {
        let extensions = config.extensions.get(&model_type).cloned().unwrap_or_default();
        scan_type(catalog, model_type, roots.clone(), extensions, config.force, &mut stats).await?;
    }

    info!(
        files = stats.files_seen,
        hashed = stats.hashed,
        unchanged = stats.unchanged,
        removed = stats.removed,
        errors = stats.errors,
        "Scan complete"
    );

    Ok(stats)
}

async fn scan_type(
    catalog: &Catalog,
    model_type: ModelType,
    roots: Vec<PathBuf>,
    extensions: BTreeSet<String>,
    force: bool,
    stats: &mut ScanStats,
) -> Result<(), sqlx::Error> {
    let walk = match tokio::task::spawn_blocking(move || walk_roots(&roots, &extensions)).await {
        Ok(walk) => walk,
        Err(error) => {
            warn!(%model_type, "Directory walk aborted: {error}");
            stats.errors += 1;
            return Ok(());
        }
    };
    stats.errors += walk.unreadable.len() + walk.shadowed.len();

    let prior: HashMap<String, ModelRecord> = catalog
        .list_by_type(model_type)
        .await?
        .into_iter()
        .map(|record| (record.path.clone(), record))
        .collect();

    let mut still_present: HashSet<String> = prior
        .keys()
        .filter(|path| {
            walk.unreadable
                .iter()
                .any(|unreadable| Path::new(path.as_str()).starts_with(unreadable))
        })
        .cloned()
        .collect();

    for file in walk.files {
        stats.files_seen += 1;
        let path = display_path(&file.path);
        still_present.insert(path.clone());

        let unchanged = prior
            .get(&path)
            .is_some_and(|record| record.attributes() == file.attributes);
        if unchanged && !force {
            stats.unchanged += 1;
            continue;
        }

        let disk_path = file.path.clone();
        let fingerprint = tokio::task::spawn_blocking(move || {
            identify(&disk_path).map(|hash| (hash, read_local_metadata(&disk_path)))
        })
        .await;

        let (identification_hash, local) = match fingerprint {
            Ok(Ok(fingerprint)) => fingerprint,
            Ok(Err(error)) => {
                warn!(path = %path, "Skipping unreadable model file: {error}");
                stats.errors += 1;
                continue;
            }
            Err(error) => {
                warn!(path = %path, "Fingerprint task failed: {error}");
                stats.errors += 1;
                continue;
            }
        };
        stats.hashed += 1;

        let model = UpsertModel {
            id: model_id(model_type, &file.relative),
            model_type,
            path: path.clone(),
            attributes: file.attributes,
            identification_hash,
            local,
        };

        match catalog.upsert(&model).await {
            Ok(()) => debug!(model_id = %model.id, path = %path, "Catalogued model"),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                warn!(model_id = %model.id, path = %path, "Path already catalogued under another id, skipping");
                stats.errors += 1;
            }
            Err(error) => return Err(error),
        }
    }

    stats.removed += catalog.remove_missing(model_type, &still_present).await?;
    Ok(())
}

/// Walks the roots of one type, following symlinks.
///
/// Each directory is entered at most once by resolved path, which breaks
/// symlink loops, and each file is reported at most once even when roots overlap.
///
/// The model id derives from the relative path, so a relative path already
/// claimed by an earlier root shadows the later file. Roots are taken in order.
fn walk_roots(roots: &[PathBuf], extensions: &BTreeSet<String>) -> Walk {
    let mut walk = Walk::default();
    let mut visited_dirs: HashSet<PathBuf> = HashSet::new();
    let mut seen_files: HashSet<PathBuf> = HashSet::new();
    let mut claimed: HashSet<String> = HashSet::new();

    for root in roots {
        let root = match std::path::absolute(root) {
            Ok(root) => root,
            Err(error) => {
                warn!(root = %root.display(), "Cannot resolve model folder: {error}");
                continue;
            }
        };
        if !root.is_dir() {
            debug!(root = %root.display(), "Model folder missing, nothing to scan");
            continue;
        }

        let entries = WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                if !entry.file_type().is_dir() {
                    return true;
                }
                entry
                    .path()
                    .canonicalize()
                    .map_or(true, |real| visited_dirs.insert(real))
            });

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!("Skipping unreadable entry: {error}");
                    if let Some(path) = error.path() {
                        walk.unreadable.push(path.to_path_buf());
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
                continue;
            }

            match found_file(&root, entry.path()) {
                Ok(Some((real, file))) => {
                    if !seen_files.insert(real) {
                        continue;
                    }
                    if claimed.insert(display_path(&file.relative)) {
                        walk.files.push(file);
                    } else {
                        warn!(
                            path = %file.path.display(),
                            "Relative path already catalogued from an earlier root, skipping"
                        );
                        walk.shadowed.push(file.path);
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!("Skipping model file: {error}");
                    walk.unreadable.push(entry.path().to_path_buf());
                }
            }
        }
    }

    walk
}

fn has_extension(path: &Path, extensions: &BTreeSet<String>) -> bool {
    path.extension()
        .is_some_and(|ext| extensions.contains(&ext.to_string_lossy().to_lowercase()))
}

fn found_file(
    root: &Path,
    path: &Path,
) -> Result<Option<(PathBuf, FoundFile)>, FingerprintError> {
    let io_error = |source| FingerprintError::Io {
        path: path.to_path_buf(),
        source,
    };

    let Ok(relative) = path.strip_prefix(root) else {
        return Ok(None);
    };
    let metadata = std::fs::metadata(path).map_err(io_error)?;
    let real = path.canonicalize().map_err(io_error)?;

    Ok(Some((
        real,
        FoundFile {
            path: path.to_path_buf(),
            relative: relative.to_path_buf(),
            attributes: FileAttributes::from_metadata(&metadata),
        },
    )))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn extensions() -> BTreeSet<String> {
        ["safetensors", "ckpt"].into_iter().map(str::to_owned).collect()
    }

    #[test]
    fn test_walk_filters_extensions_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.safetensors"), b"a").unwrap();
        fs::write(dir.path().join("nested/B.CKPT"), b"b").unwrap();
        fs::write(dir.path().join("notes.txt"), b"c").unwrap();

        let walk = walk_roots(&[dir.path().to_path_buf()], &extensions());
        let mut relative: Vec<String> = walk
            .files
            .iter()
            .map(|file| display_path(&file.relative))
            .collect();
        relative.sort();

        assert_eq!(relative, ["a.safetensors", "nested/B.CKPT"]);
        assert!(walk.unreadable.is_empty());
        assert!(walk.shadowed.is_empty());
    }

    #[test]
    fn test_walk_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let walk = walk_roots(&[dir.path().join("absent")], &extensions());
        assert!(walk.files.is_empty());
        assert!(walk.unreadable.is_empty());
    }

    #[test]
    fn test_overlapping_roots_report_files_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.safetensors"), b"a").unwrap();

        let walk = walk_roots(
            &[dir.path().to_path_buf(), dir.path().join("sub")],
            &extensions(),
        );
        assert_eq!(walk.files.len(), 1);
        assert!(walk.shadowed.is_empty());
    }

    #[test]
    fn test_same_relative_path_in_later_root_is_shadowed() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("x.safetensors"), b"first").unwrap();
        fs::write(second.path().join("x.safetensors"), b"second").unwrap();
        fs::write(second.path().join("y.safetensors"), b"only here").unwrap();

        let walk = walk_roots(
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            &extensions(),
        );

        let paths: Vec<&Path> = walk.files.iter().map(|file| file.path.as_path()).collect();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().any(|path| path.starts_with(first.path())));
        assert!(paths.contains(&second.path().join("y.safetensors").as_path()));
        assert_eq!(walk.shadowed, [second.path().join("x.safetensors")]);
    }
}
