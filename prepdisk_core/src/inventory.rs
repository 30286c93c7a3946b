/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::inventory
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Enumerate the files already present on the archive drive,
    associate them with catalog entries, and measure free and
    total space.

  Security / Safety Notes:
    Read-only directory and filesystem queries. Hidden files,
    including in-flight `.partial` transfers, are never listed.

  Dependencies:
    fs2 for portable capacity queries; version module for local
    release tokens.

  Operational Scope:
    Read fresh at the start of every audit; never cached.

  Revision History:
    2025-11-12 COD  Reworked the pacman inventory for drive scans.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic lexical ordering for ambiguous matches
    - Structured parsing with clear failure modes
============================================================*/

use std::path::{Path, PathBuf};

use crate::catalog::MatchRule;
use crate::error::{PrepError, Result};
use crate::version::VersionToken;

const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Convert a byte count to (binary) gigabytes.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}

/// A file found at the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub version: VersionToken,
}

impl LocalFile {
    pub fn new(path: PathBuf, size_bytes: u64) -> Self {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            version: VersionToken::from_filename(&filename),
            filename,
            path,
            size_bytes,
        }
    }

    pub fn size_gb(&self) -> f64 {
        bytes_to_gb(self.size_bytes)
    }
}

/// Result of associating a catalog entry with the drive contents.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMatch {
    pub file: LocalFile,
    /// Other matching filenames that lost to `file` in lexical order.
    pub shadowed: Vec<String>,
}

/// Snapshot of the destination directory, sorted by filename.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    files: Vec<LocalFile>,
}

impl Inventory {
    /// Scan the top level of `dir` for regular, non-hidden files.
    pub fn scan(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|err| {
            PrepError::Filesystem(format!("Failed to list {}: {err}", dir.display()))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                PrepError::Filesystem(format!("Failed to read entry in {}: {err}", dir.display()))
            })?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            files.push(LocalFile::new(entry.path(), metadata.len()));
        }
        Ok(Self::from_files(files))
    }

    pub fn from_files(mut files: Vec<LocalFile>) -> Self {
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Self { files }
    }

    pub fn files(&self) -> &[LocalFile] {
        &self.files
    }

    /// First package file (lexical order) whose name satisfies `rule`.
    pub fn lookup(&self, rule: &MatchRule, extension: &str) -> Option<LocalMatch> {
        let mut matching = self
            .files
            .iter()
            .filter(|file| file.filename.ends_with(extension) && rule.matches(&file.filename));
        let file = matching.next()?.clone();
        let shadowed = matching.map(|other| other.filename.clone()).collect();
        Some(LocalMatch { file, shadowed })
    }

    /// Files whose name contains `fragment`, for operator-driven deletes.
    pub fn containing(&self, fragment: &str) -> Vec<&LocalFile> {
        self.files
            .iter()
            .filter(|file| file.filename.contains(fragment))
            .collect()
    }

    /// Files with one of the given extensions, for the drive table.
    pub fn with_extensions<'a>(
        &'a self,
        extensions: &'a [&'a str],
    ) -> impl Iterator<Item = &'a LocalFile> {
        self.files.iter().filter(move |file| {
            extensions
                .iter()
                .any(|ext| file.filename.to_ascii_lowercase().ends_with(ext))
        })
    }
}

/// Capacity figures for the destination filesystem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl DiskUsage {
    pub fn total_gb(&self) -> f64 {
        bytes_to_gb(self.total_bytes)
    }

    pub fn free_gb(&self) -> f64 {
        bytes_to_gb(self.free_bytes)
    }
}

/// Total and unprivileged-available space for the filesystem holding `path`.
pub fn disk_usage(path: &Path) -> Result<DiskUsage> {
    let query_failed = |err: std::io::Error| {
        PrepError::Filesystem(format!(
            "Failed to query disk space for {}: {err}",
            path.display()
        ))
    };
    let total_bytes = fs2::total_space(path).map_err(query_failed)?;
    let free_bytes = fs2::available_space(path).map_err(query_failed)?;
    Ok(DiskUsage {
        total_bytes,
        free_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MatchMode;

    fn file(name: &str, size: u64) -> LocalFile {
        LocalFile::new(PathBuf::from("/drive").join(name), size)
    }

    fn rule(term: &str) -> MatchRule {
        MatchRule::new(vec![term.into()], MatchMode::Contains)
    }

    #[test]
    fn scan_lists_visible_regular_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wikivoyage_en_all_2024-01.zim"), b"abc").unwrap();
        std::fs::write(dir.path().join("INSTALL_Kiwix.apk"), b"apk!").unwrap();
        std::fs::write(dir.path().join(".ifixit_en_all_2024-04.zim.partial"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("Software")).unwrap();

        let inventory = Inventory::scan(dir.path()).unwrap();
        let names: Vec<&str> = inventory.files().iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["INSTALL_Kiwix.apk", "wikivoyage_en_all_2024-01.zim"]);
        assert_eq!(inventory.files()[1].size_bytes, 3);
        assert_eq!(inventory.files()[1].version.to_string(), "2024-01");
    }

    #[test]
    fn scan_of_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Inventory::scan(&dir.path().join("unplugged")).unwrap_err();
        assert!(matches!(err, PrepError::Filesystem(_)));
    }

    #[test]
    fn lookup_picks_first_lexical_match_and_reports_the_rest() {
        let inventory = Inventory::from_files(vec![
            file("wikipedia_en_all_maxi_2024-01.zim", 10),
            file("wikipedia_en_all_maxi_2023-06.zim", 20),
        ]);
        let found = inventory.lookup(&rule("wikipedia_en_all_maxi"), ".zim").unwrap();
        assert_eq!(found.file.filename, "wikipedia_en_all_maxi_2023-06.zim");
        assert_eq!(found.shadowed, vec!["wikipedia_en_all_maxi_2024-01.zim"]);
    }

    #[test]
    fn lookup_ignores_other_extensions() {
        let inventory = Inventory::from_files(vec![file("ifixit_en_all_notes.txt", 1)]);
        assert!(inventory.lookup(&rule("ifixit_en_all"), ".zim").is_none());
    }

    #[test]
    fn containing_matches_fragments_anywhere() {
        let inventory = Inventory::from_files(vec![
            file("gutenberg_en_all_2024-05.zim", 1),
            file("Kiwix_Desktop_Mac.dmg", 1),
        ]);
        let hits = inventory.containing("en_all");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "gutenberg_en_all_2024-05.zim");
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        let inventory = Inventory::from_files(vec![file("README.TXT", 1), file("notes.md", 1)]);
        let shown: Vec<_> = inventory.with_extensions(&[".txt"]).collect();
        assert_eq!(shown.len(), 1);
    }

    #[test]
    fn gigabyte_conversion_is_binary() {
        assert_eq!(bytes_to_gb(1_073_741_824), 1.0);
        assert_eq!(file("a.zim", 536_870_912).size_gb(), 0.5);
    }

    #[test]
    fn disk_usage_reports_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let usage = disk_usage(dir.path()).unwrap();
        assert!(usage.total_bytes > 0);
        assert!(usage.free_bytes <= usage.total_bytes);
        assert!(usage.free_gb() <= usage.total_gb());
    }

    #[test]
    fn disk_usage_of_unplugged_drive_is_a_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = disk_usage(&dir.path().join("unplugged")).unwrap_err();
        assert!(matches!(err, PrepError::Filesystem(_)));
    }
}
