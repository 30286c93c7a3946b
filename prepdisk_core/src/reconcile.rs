/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::reconcile
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Join catalog definitions, mirror candidates and the drive
    inventory into one classified status per catalog entry.

  Security / Safety Notes:
    Pure read + compute; never mutates the drive or catalog.

  Dependencies:
    mirror (ListingSource), inventory, listing, serde.

  Operational Scope:
    Recomputed on every refresh request; results are never
    cached across audit cycles.

  Revision History:
    2025-11-12 COD  Reworked manifest resolution into audit.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Classification as a pure function of its inputs
    - Deterministic ordering for reproducible audits
    - Per-entry degradation instead of whole-audit failure
============================================================*/

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::catalog::{Catalog, CatalogEntry};
use crate::error::Result;
use crate::inventory::{bytes_to_gb, disk_usage, DiskUsage, Inventory, LocalFile};
use crate::listing::RemoteVersion;
use crate::logger::Logger;
use crate::mirror::ListingSource;

/// Status of one catalog entry relative to the drive and the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Classification {
    Installed,
    Outdated,
    Missing,
    TooBig,
    ManualOnly,
}

impl Classification {
    pub fn label(self) -> &'static str {
        match self {
            Classification::Installed => "INSTALLED",
            Classification::Outdated => "OUTDATED",
            Classification::Missing => "MISSING",
            Classification::TooBig => "TOO BIG",
            Classification::ManualOnly => "MANUAL",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decision table for a single entry.
///
/// Manual-only entries never carry mirror data. A present local file is
/// `Outdated` only when the mirror offers a strictly newer version token;
/// otherwise it is `Installed`. Without a local file, manual-only entries are
/// `ManualOnly`, entries that do not fit in `free_gb` are `TooBig`, and
/// everything else is `Missing`.
pub fn classify(
    manual: bool,
    local: Option<&LocalFile>,
    remote: Option<&RemoteVersion>,
    free_gb: f64,
) -> Classification {
    let remote = if manual { None } else { remote };
    match (local, remote) {
        (Some(local), Some(remote)) if remote.version > local.version => Classification::Outdated,
        (Some(_), _) => Classification::Installed,
        (None, _) if manual => Classification::ManualOnly,
        (None, Some(remote)) if remote.size_gb > free_gb => Classification::TooBig,
        (None, _) => Classification::Missing,
    }
}

/// Derived status of one catalog entry for one audit pass.
#[derive(Debug, Clone)]
pub struct ReconciledStatus {
    pub entry: CatalogEntry,
    pub local: Option<LocalFile>,
    pub remote: Option<RemoteVersion>,
    pub classification: Classification,
}

/// Result of one audit pass.
#[derive(Debug, Clone)]
pub struct Audit {
    pub statuses: Vec<ReconciledStatus>,
    /// Sum of the sizes of every matched local file.
    pub installed_bytes: u64,
    /// Capacity measured at the start of the pass.
    pub disk: DiskUsage,
}

impl Audit {
    pub fn free_gb(&self) -> f64 {
        self.disk.free_gb()
    }

    pub fn installed_gb(&self) -> f64 {
        bytes_to_gb(self.installed_bytes)
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.statuses
            .iter()
            .filter(|status| status.classification == classification)
            .count()
    }

    pub fn status(&self, id: u32) -> Option<&ReconciledStatus> {
        self.statuses.iter().find(|status| status.entry.id == id)
    }
}

/// Combine already-fetched remote candidates with the inventory.
///
/// `remotes` is positional: `remotes[i]` belongs to `catalog.entries()[i]`;
/// missing positions are treated as absent.
pub fn reconcile(
    catalog: &Catalog,
    remotes: Vec<Option<RemoteVersion>>,
    inventory: &Inventory,
    disk: DiskUsage,
    extension: &str,
    logger: &Logger,
) -> Audit {
    let free_gb = disk.free_gb();
    let mut remotes = remotes.into_iter();
    let mut installed_bytes = 0u64;
    let mut statuses = Vec::with_capacity(catalog.entries().len());

    for entry in catalog.entries() {
        let remote = remotes.next().flatten();
        let local = inventory.lookup(&entry.rule, extension).map(|found| {
            if !found.shadowed.is_empty() {
                logger.warn(
                    "AMBIGUOUS",
                    format!(
                        "{}: using {} (lexically first); also matched {}",
                        entry.name,
                        found.file.filename,
                        found.shadowed.join(", ")
                    ),
                );
            }
            found.file
        });

        if let Some(file) = &local {
            installed_bytes = installed_bytes.saturating_add(file.size_bytes);
        }

        let classification = classify(
            entry.path.is_manual(),
            local.as_ref(),
            remote.as_ref(),
            free_gb,
        );
        logger.debug(
            "AUDIT",
            format!(
                "{} [{}] local={} remote={}",
                entry.name,
                classification,
                local
                    .as_ref()
                    .map(|f| f.version.to_string())
                    .unwrap_or_else(|| "-".into()),
                remote
                    .as_ref()
                    .map(|r| r.version.to_string())
                    .unwrap_or_else(|| "-".into()),
            ),
        );

        statuses.push(ReconciledStatus {
            entry: entry.clone(),
            local,
            remote,
            classification,
        });
    }

    Audit {
        statuses,
        installed_bytes,
        disk,
    }
}

/// Full audit pass: inventory and capacity first, then one mirror lookup per
/// entry in catalog order, strictly one at a time.
pub async fn run_audit<S: ListingSource>(
    catalog: &Catalog,
    source: &S,
    destination: &Path,
    extension: &str,
    logger: &Logger,
) -> Result<Audit> {
    let inventory = Inventory::scan(destination)?;
    let disk = disk_usage(destination)?;
    logger.info(
        "AUDIT",
        format!(
            "{} files on {} ({:.1} GB free of {:.1} GB)",
            inventory.files().len(),
            destination.display(),
            disk.free_gb(),
            disk.total_gb()
        ),
    );

    let mut remotes = Vec::with_capacity(catalog.entries().len());
    for entry in catalog.entries() {
        remotes.push(source.latest(entry, logger).await);
    }

    let audit = reconcile(catalog, remotes, &inventory, disk, extension, logger);
    logger.info(
        "AUDIT",
        format!(
            "installed={} outdated={} missing={} too_big={} manual={}",
            audit.count(Classification::Installed),
            audit.count(Classification::Outdated),
            audit.count(Classification::Missing),
            audit.count(Classification::TooBig),
            audit.count(Classification::ManualOnly),
        ),
    );
    Ok(audit)
}
