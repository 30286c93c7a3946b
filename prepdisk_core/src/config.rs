/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load, validate and scaffold the Prep-Disk configuration:
    mirror settings, session paths, the ZIM library catalog and
    the reader installer list.

  Security / Safety Notes:
    Reads operator-owned TOML only. `init-config` refuses to
    overwrite an existing document unless forced.

  Dependencies:
    serde + toml for parsing, dirs for platform directories.

  Operational Scope:
    Loaded once at startup. A missing or malformed document is
    fatal; nothing can be reconciled without entry definitions.

  Revision History:
    2025-11-12 COD  Authored catalog-aware configuration layer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit validation with actionable messages
    - Deterministic defaults mirrored in `init-config`
============================================================*/

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogEntry, MatchMode, MatchRule, MirrorPath, SoftwareItem};
use crate::error::{PrepError, Result};

const CONFIG_DIR: &str = "prepdisk";
const CONFIG_FILE: &str = "config.toml";

/// Full Prep-Disk configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    pub mirror: MirrorConfig,
    pub paths: PathsConfig,
    pub zim_libraries: Vec<LibraryConfig>,
    pub software: Vec<SoftwareConfig>,
}

/// Mirror access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub base_url: String,
    /// Whole-request timeout for listing fetches, in seconds.
    pub timeout: u64,
    /// Connect timeout for listings and transfers, in seconds.
    pub connect_timeout: u64,
    pub user_agent: String,
    /// Package file extension recognised in listings and on the drive.
    pub extension: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ftp.fau.de/kiwix/zim/".into(),
            timeout: 10,
            connect_timeout: 5,
            user_agent: format!("Prep-Disk-Core/{} (offline-archive)", env!("CARGO_PKG_VERSION")),
            extension: ".zim".into(),
        }
    }
}

/// Session output locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,
}

/// One `[[zim_libraries]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub id: u32,
    pub name: String,
    /// Mirror subdirectory, or `MANUAL`.
    pub path: String,
    pub search_terms: Vec<String>,
    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
    #[serde(default = "default_recommended")]
    pub recommended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_url: Option<String>,
}

/// One `[[software]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareConfig {
    pub name: String,
    pub url: String,
    pub filename: String,
}

fn default_recommended() -> bool {
    true
}

impl PrepConfig {
    /// Default configuration path under the platform config directory.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
            .ok_or_else(|| PrepError::Config("Unable to determine config directory".into()))
    }

    /// Load from `path`, or from the default location when `None`.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PrepError::ConfigMissing {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|err| PrepError::ConfigMalformed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let config: PrepConfig = toml::from_str(&raw).map_err(|err| PrepError::ConfigMalformed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        config
            .validate()
            .map_err(|reason| PrepError::ConfigMalformed {
                path: path.to_path_buf(),
                reason,
            })?;
        Ok(config)
    }

    /// Built-in catalog written by `init-config`.
    pub fn builtin() -> Self {
        let library = |id: u32, name: &str, path: &str, terms: &[&str]| LibraryConfig {
            id,
            name: name.into(),
            path: path.into(),
            search_terms: terms.iter().map(|t| t.to_string()).collect(),
            match_mode: MatchMode::Contains,
            recommended: true,
            manual_url: None,
        };
        let software = |name: &str, url: &str, filename: &str| SoftwareConfig {
            name: name.into(),
            url: url.into(),
            filename: filename.into(),
        };
        Self {
            mirror: MirrorConfig::default(),
            paths: PathsConfig::default(),
            zim_libraries: vec![
                library(1, "Wikipedia (EN Maxi)", "wikipedia/", &["wikipedia_en_all_maxi"]),
                library(
                    2,
                    "WikiMed (Medical)",
                    "wikipedia/",
                    &["wikimed_en_all", "wikipedia_en_medicine"],
                ),
                library(3, "iFixit (Repair)", "ifixit/", &["ifixit_en_all"]),
                library(4, "LibreTexts (Science)", "libretexts/", &["libretexts_en_all"]),
                library(5, "Sustainability SE", "stack_exchange/", &["sustainableliving"]),
                library(6, "WikiVoyage (Travel)", "wikivoyage/", &["wikivoyage_en_all"]),
                library(7, "Project Gutenberg (Books)", "gutenberg/", &["gutenberg_en_all"]),
            ],
            software: vec![
                software(
                    "Kiwix Android (standalone)",
                    "https://download.kiwix.org/release/kiwix-android/kiwix-android-3.11.0-standalone.apk",
                    "INSTALL_Kiwix_Android_Standalone.apk",
                ),
                software(
                    "Kiwix Desktop (Windows)",
                    "https://download.kiwix.org/release/kiwix-desktop/kiwix-desktop_windows_x64.zip",
                    "Kiwix_Desktop_Windows.zip",
                ),
                software(
                    "Kiwix Desktop (macOS)",
                    "https://download.kiwix.org/release/kiwix-desktop/kiwix-desktop_macos_x64.dmg",
                    "Kiwix_Desktop_Mac.dmg",
                ),
            ],
        }
    }

    /// Write the built-in document to `path`.
    pub fn write_default(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(PrepError::Config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                PrepError::Filesystem(format!(
                    "Failed to create config directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let rendered = toml::to_string_pretty(&Self::builtin())
            .map_err(|err| PrepError::Serialization(format!("Failed to render config: {err}")))?;
        std::fs::write(path, rendered).map_err(|err| {
            PrepError::Filesystem(format!("Failed to write {}: {err}", path.display()))
        })
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !self.mirror.base_url.starts_with("http://")
            && !self.mirror.base_url.starts_with("https://")
        {
            return Err(format!(
                "mirror.base_url must be an http(s) URL, got `{}`",
                self.mirror.base_url
            ));
        }
        if self.mirror.extension.is_empty() {
            return Err("mirror.extension must not be empty".into());
        }
        if self.zim_libraries.is_empty() {
            return Err("no [[zim_libraries]] defined".into());
        }

        let mut seen = HashSet::new();
        for library in &self.zim_libraries {
            if !seen.insert(library.id) {
                return Err(format!("duplicate library id {}", library.id));
            }
            if library.path.trim().is_empty() {
                return Err(format!(
                    "library {} has an empty path (use \"MANUAL\" for manual-only)",
                    library.id
                ));
            }
            if library.search_terms.is_empty()
                || library.search_terms.iter().any(|t| t.trim().is_empty())
            {
                return Err(format!("library {} needs non-empty search_terms", library.id));
            }
        }

        for item in &self.software {
            if item.filename.trim().is_empty() || item.filename.contains(['/', '\\']) {
                return Err(format!(
                    "software `{}` needs a plain target filename",
                    item.name
                ));
            }
        }
        Ok(())
    }

    /// Immutable catalog in document order.
    pub fn catalog(&self) -> Catalog {
        let entries = self
            .zim_libraries
            .iter()
            .map(|library| CatalogEntry {
                id: library.id,
                name: library.name.clone(),
                path: MirrorPath::parse(&library.path),
                rule: MatchRule::new(library.search_terms.clone(), library.match_mode),
                recommended: library.recommended,
                manual_url: library.manual_url.clone(),
            })
            .collect();
        let software = self
            .software
            .iter()
            .map(|item| SoftwareItem {
                name: item.name.clone(),
                url: item.url.clone(),
                filename: item.filename.clone(),
            })
            .collect();
        Catalog::new(entries, software)
    }

    fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("logs"))
    }

    pub fn report_path(&self) -> PathBuf {
        self.paths
            .report
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("audit.json"))
    }
}
