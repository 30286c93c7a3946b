/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::catalog
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Shared structures describing the curated catalog of ZIM
    libraries and the fixed list of reader installers.

  Security / Safety Notes:
    Pure data containers; no I/O performed in this module.

  Dependencies:
    serde for the match-mode configuration value.

  Operational Scope:
    Built once by the config loader and shared read-only by the
    mirror, inventory, reconciliation and planning modules.

  Revision History:
    2025-11-12 COD  Introduced catalog entry contracts.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Clear data contracts between modules
    - Immutable shared state for the whole session
============================================================*/

use serde::{Deserialize, Serialize};

/// Path value marking a library that has no automated mirror.
pub const MANUAL_SENTINEL: &str = "MANUAL";

/// Where a library is published on the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorPath {
    /// Subdirectory below the mirror base URL, always ending in `/`.
    Remote(String),
    /// Manual download only; never contacts the mirror.
    Manual,
}

impl MirrorPath {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(MANUAL_SENTINEL) {
            return MirrorPath::Manual;
        }
        let mut dir = trimmed.trim_start_matches('/').to_string();
        if !dir.is_empty() && !dir.ends_with('/') {
            dir.push('/');
        }
        MirrorPath::Remote(dir)
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, MirrorPath::Manual)
    }
}

/// How search terms are applied to a filename.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Contains,
    Prefix,
}

/// Filename predicate shared by the listing parser and the inventory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    terms: Vec<String>,
    mode: MatchMode,
}

impl MatchRule {
    pub fn new(terms: Vec<String>, mode: MatchMode) -> Self {
        Self { terms, mode }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// True when any term matches `filename` under the configured mode.
    pub fn matches(&self, filename: &str) -> bool {
        self.terms.iter().any(|term| match self.mode {
            MatchMode::Contains => filename.contains(term.as_str()),
            MatchMode::Prefix => filename.starts_with(term.as_str()),
        })
    }
}

/// Static definition of one downloadable knowledge package.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: u32,
    pub name: String,
    pub path: MirrorPath,
    pub rule: MatchRule,
    pub recommended: bool,
    pub manual_url: Option<String>,
}

/// Reader installer fetched unconditionally by the app-installer policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareItem {
    pub name: String,
    pub url: String,
    pub filename: String,
}

/// Immutable catalog loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    software: Vec<SoftwareItem>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>, software: Vec<SoftwareItem>) -> Self {
        Self { entries, software }
    }

    /// Entries in catalog-defined order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn software(&self) -> &[SoftwareItem] {
        &self.software
    }

    pub fn entry(&self, id: u32) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }
}
