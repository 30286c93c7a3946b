/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::report
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Render audits for operators: a JSON audit document for
    tooling and plain-text tables for the console.

  Security / Safety Notes:
    Report data is written to operator-controlled paths; no
    privileged operations are performed.

  Dependencies:
    serde + serde_json for serialization, chrono for stamps.

  Operational Scope:
    Written after `audit`, and printed on every menu refresh.

  Revision History:
    2025-11-12 COD  Adapted manifest writer to audit reports.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic ordering for reproducible reports
    - Rich metadata for audit and observability
============================================================*/

use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{PrepError, Result};
use crate::inventory::{DiskUsage, Inventory};
use crate::planner::SyncPlan;
use crate::reconcile::{Audit, Classification};
use crate::version::VersionToken;

/// Extensions shown in the drive table.
pub const DRIVE_TABLE_EXTENSIONS: [&str; 6] = [".zim", ".apk", ".exe", ".dmg", ".zip", ".txt"];

/// Wrapper representing the full audit document.
#[derive(Debug, Serialize)]
pub struct AuditDocument {
    pub metadata: AuditMetadata,
    pub entries: Vec<AuditRecord>,
}

/// Metadata block describing audit context.
#[derive(Debug, Serialize)]
pub struct AuditMetadata {
    pub generated_at: String,
    pub generated_by: String,
    pub destination: String,
    pub total_entries: usize,
    pub installed: usize,
    pub outdated: usize,
    pub missing: usize,
    pub too_big: usize,
    pub manual_only: usize,
    pub installed_gb: f64,
    pub free_gb: f64,
    pub total_gb: f64,
}

/// Per-entry audit record.
#[derive(Debug, Serialize)]
pub struct AuditRecord {
    pub id: u32,
    pub name: String,
    pub recommended: bool,
    pub classification: Classification,
    pub local_file: Option<String>,
    pub local_version: Option<VersionToken>,
    pub remote_url: Option<String>,
    pub remote_version: Option<VersionToken>,
    pub remote_size_gb: Option<f64>,
    pub manual_url: Option<String>,
}

/// Build the audit document for `destination`.
pub fn build_report(audit: &Audit, destination: &Path) -> AuditDocument {
    let entries = audit
        .statuses
        .iter()
        .map(|status| AuditRecord {
            id: status.entry.id,
            name: status.entry.name.clone(),
            recommended: status.entry.recommended,
            classification: status.classification,
            local_file: status.local.as_ref().map(|f| f.filename.clone()),
            local_version: status.local.as_ref().map(|f| f.version),
            remote_url: status.remote.as_ref().map(|r| r.url.clone()),
            remote_version: status.remote.as_ref().map(|r| r.version),
            remote_size_gb: status.remote.as_ref().map(|r| r.size_gb),
            manual_url: status.entry.manual_url.clone(),
        })
        .collect();

    AuditDocument {
        metadata: AuditMetadata {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            generated_by: "prepdisk_core".to_string(),
            destination: destination.display().to_string(),
            total_entries: audit.statuses.len(),
            installed: audit.count(Classification::Installed),
            outdated: audit.count(Classification::Outdated),
            missing: audit.count(Classification::Missing),
            too_big: audit.count(Classification::TooBig),
            manual_only: audit.count(Classification::ManualOnly),
            installed_gb: audit.installed_gb(),
            free_gb: audit.free_gb(),
            total_gb: audit.disk.total_gb(),
        },
        entries,
    }
}

/// Persist the audit document to the given path.
pub fn write_report(document: &AuditDocument, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            PrepError::Filesystem(format!(
                "Failed to create report directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    let file = File::create(path).map_err(|err| {
        PrepError::Filesystem(format!(
            "Failed to create report file {}: {err}",
            path.display()
        ))
    })?;
    serde_json::to_writer_pretty(file, document).map_err(|err| {
        PrepError::Serialization(format!("Failed to write report {}: {err}", path.display()))
    })
}

/// Files currently on the drive plus capacity line.
pub fn render_drive_table(inventory: &Inventory, disk: &DiskUsage) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<56} {:>10}", "File Name", "Size (GB)");
    let _ = writeln!(out, "{}", "-".repeat(67));
    for file in inventory.with_extensions(&DRIVE_TABLE_EXTENSIONS) {
        let _ = writeln!(out, "{:<56} {:>10.2}", file.filename, file.size_gb());
    }
    let _ = writeln!(
        out,
        "Total Disk: {:.1}GB | Free: {:.1}GB",
        disk.total_gb(),
        disk.free_gb()
    );
    out
}

/// Catalog status table in catalog order.
pub fn render_status_table(audit: &Audit) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>3}  {:<28} {:<10} {:<9} {:<9} {:>9}",
        "ID", "Library", "Status", "Local", "Mirror", "Size (GB)"
    );
    let _ = writeln!(out, "{}", "-".repeat(74));
    for status in &audit.statuses {
        let local = status
            .local
            .as_ref()
            .map(|f| f.version.to_string())
            .unwrap_or_else(|| "-".into());
        let (mirror, size) = match &status.remote {
            Some(remote) => (remote.version.to_string(), format!("{:.2}", remote.size_gb)),
            None => ("-".into(), "-".into()),
        };
        let marker = if status.entry.recommended { "*" } else { " " };
        let _ = writeln!(
            out,
            "{:>3}{marker} {:<28} {:<10} {:<9} {:<9} {:>9}",
            status.entry.id,
            truncate(&status.entry.name, 28),
            status.classification.label(),
            local,
            mirror,
            size
        );
    }
    let _ = writeln!(
        out,
        "Installed: {:.1}GB | Free: {:.1}GB  (* = recommended)",
        audit.installed_gb(),
        audit.free_gb()
    );
    out
}

/// One line per planned transfer plus the projected total.
pub fn render_plan(plan: &SyncPlan) -> String {
    let mut out = String::new();
    for step in plan.steps() {
        let size = step
            .expected_gb
            .map(|gb| format!("{gb:.2} GB"))
            .unwrap_or_else(|| "size unknown".into());
        let _ = write!(out, "  {} ({size}) → {}", step.label, step.destination.display());
        if let Some(old) = &step.replaces {
            let _ = write!(out, " [replaces {}]", old.display());
        }
        out.push('\n');
    }
    let _ = writeln!(
        out,
        "{} items, {:.1} GB projected",
        plan.len(),
        plan.projected_gb()
    );
    out
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}
