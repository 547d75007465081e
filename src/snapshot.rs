// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Point-in-time snapshots of a directory tree

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, Metadata};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Result, TidyError};

/// How far below the root a snapshot looks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanDepth {
    /// Only the root's direct children
    Immediate,
    /// The whole tree
    #[default]
    Recursive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    /// Never followed; always a leaf
    Symlink,
}

/// Cheap change signal for a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// One entry captured in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Path relative to the root, `/`-separated
    pub path: String,
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
}

/// Scan settings. The same value must be used for every snapshot that
/// is later compared.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    pub depth: ScanDepth,
    pub include_hidden: bool,
    pub ignore: Vec<String>,
    pub hash_contents: bool,
}

/// Immutable record of a directory's entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    root: PathBuf,
    captured_at: DateTime<Utc>,
    depth: ScanDepth,
    entries: BTreeMap<String, DirectoryEntry>,
}

impl Snapshot {
    /// Capture a snapshot of `root`
    pub fn capture(root: &Path, options: &ScanOptions) -> Result<Self> {
        let metadata = fs::metadata(root).map_err(|e| TidyError::access(root, e))?;
        if !metadata.is_dir() {
            return Err(TidyError::NotADirectory(root.to_path_buf()));
        }

        let ignore = compile_ignores(&options.ignore)?;
        let scanner = Scanner {
            root,
            options,
            ignore,
        };

        let mut entries = BTreeMap::new();
        let children = fs::read_dir(root).map_err(|e| TidyError::access(root, e))?;
        scanner.scan_dir(children, "", &mut entries);

        debug!("Captured {} entries under {:?}", entries.len(), root);

        Ok(Self {
            root: root.to_path_buf(),
            captured_at: Utc::now(),
            depth: options.depth,
            entries,
        })
    }

    /// Build a snapshot from already known entries
    pub fn from_entries(
        root: impl Into<PathBuf>,
        depth: ScanDepth,
        entries: impl IntoIterator<Item = DirectoryEntry>,
    ) -> Self {
        Self {
            root: root.into(),
            captured_at: Utc::now(),
            depth,
            entries: entries.into_iter().map(|e| (e.path.clone(), e)).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn depth(&self) -> ScanDepth {
        self.depth
    }

    pub fn get(&self, path: &str) -> Option<&DirectoryEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Entries in path order
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Scanner<'a> {
    root: &'a Path,
    options: &'a ScanOptions,
    ignore: Vec<glob::Pattern>,
}

impl Scanner<'_> {
    fn scan_dir(
        &self,
        children: fs::ReadDir,
        prefix: &str,
        out: &mut BTreeMap<String, DirectoryEntry>,
    ) {
        for child in children {
            let child = match child {
                Ok(c) => c,
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", self.root.join(prefix), e);
                    continue;
                }
            };

            let name = child.file_name().to_string_lossy().into_owned();
            let rel = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };

            if !self.should_include(&name, &rel) {
                debug!("Skipping {}", rel);
                continue;
            }

            // symlink_metadata: links are leaves, never followed
            let metadata = match fs::symlink_metadata(child.path()) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Cannot stat {}: {}", rel, e);
                    continue;
                }
            };

            let kind = kind_of(&metadata);
            let integrity = match kind {
                EntryKind::File => Some(self.integrity(&child.path(), &metadata)),
                _ => None,
            };

            out.insert(
                rel.clone(),
                DirectoryEntry {
                    path: rel.clone(),
                    kind,
                    integrity,
                },
            );

            if kind == EntryKind::Directory && self.options.depth == ScanDepth::Recursive {
                match fs::read_dir(child.path()) {
                    Ok(grandchildren) => self.scan_dir(grandchildren, &rel, out),
                    Err(e) => warn!("Cannot read directory {}: {}", rel, e),
                }
            }
        }
    }

    fn should_include(&self, name: &str, rel: &str) -> bool {
        if !self.options.include_hidden && name.starts_with('.') {
            return false;
        }
        if is_transient(name) {
            return false;
        }
        !self.ignore.iter().any(|p| p.matches(rel) || p.matches(name))
    }

    fn integrity(&self, path: &Path, metadata: &Metadata) -> Integrity {
        let hash = if self.options.hash_contents {
            match hash_file(path) {
                Ok(h) => Some(h),
                Err(e) => {
                    warn!("Cannot hash {:?}: {}", path, e);
                    None
                }
            }
        } else {
            None
        };

        Integrity {
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            hash,
        }
    }
}

fn kind_of(metadata: &Metadata) -> EntryKind {
    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

/// Partial downloads and OS litter never take part in a plan
fn is_transient(name: &str) -> bool {
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    if temp_extensions.iter().any(|ext| name.ends_with(ext)) {
        return true;
    }

    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    skip_names.iter().any(|n| name.eq_ignore_ascii_case(n))
}

fn compile_ignores(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| TidyError::Config(format!("Invalid ignore pattern '{}': {}", p, e)))
        })
        .collect()
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
