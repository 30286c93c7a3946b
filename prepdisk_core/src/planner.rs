/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::planner
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Turn an audit into an ordered, size-bounded download plan
    for the operator's chosen command.

  Security / Safety Notes:
    Planning is pure; it names deletions (`replaces`) but never
    performs them. The transfer executor removes a replaced file
    only after its successor is fully on disk.

  Dependencies:
    reconcile (Audit), catalog (SoftwareItem).

  Operational Scope:
    Consumed once by the transfer loop and then discarded.

  Revision History:
    2025-11-12 COD  Authored sync planner policies.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Catalog order preserved in every plan
    - Greedy admission against the space measured up front
    - Typed commands instead of free-form keystrokes
============================================================*/

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::catalog::SoftwareItem;
use crate::error::{PrepError, Result};
use crate::logger::Logger;
use crate::reconcile::{Audit, Classification};

/// Operator commands understood by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    Sync,
    UpdateOutdated,
    AppInstallers,
    ManualSelect(u32),
    Exit,
}

/// One transfer: fetch `url` into `destination`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub label: String,
    pub url: String,
    pub destination: PathBuf,
    pub expected_gb: Option<f64>,
    /// Outdated copy to remove once `destination` is complete.
    pub replaces: Option<PathBuf>,
}

/// Ordered transfer list handed to the executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    steps: Vec<PlanStep>,
}

impl SyncPlan {
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of known expected sizes.
    pub fn projected_gb(&self) -> f64 {
        self.steps.iter().filter_map(|step| step.expected_gb).sum()
    }

    fn push(&mut self, step: PlanStep) {
        self.steps.push(step);
    }
}

/// What a planning command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Transfers(SyncPlan),
    /// Manual-only entry: acquire out of band.
    ManualPointer { name: String, url: Option<String> },
}

/// Dispatch a command to its policy. `Exit` plans nothing.
pub fn plan(
    command: SyncCommand,
    audit: &Audit,
    software: &[SoftwareItem],
    destination: &Path,
    logger: &Logger,
) -> Result<Option<PlanOutcome>> {
    let outcome = match command {
        SyncCommand::Sync => PlanOutcome::Transfers(plan_recommended(audit, destination, logger)),
        SyncCommand::UpdateOutdated => {
            PlanOutcome::Transfers(plan_outdated(audit, destination, logger))
        }
        SyncCommand::AppInstallers => PlanOutcome::Transfers(plan_software(software, destination)),
        SyncCommand::ManualSelect(id) => plan_selected(audit, id, destination, logger)?,
        SyncCommand::Exit => return Ok(None),
    };
    Ok(Some(outcome))
}

/// Recommended entries classified `Missing`, admitted in catalog order while
/// the running total stays strictly below the free space of the audit.
pub fn plan_recommended(audit: &Audit, destination: &Path, logger: &Logger) -> SyncPlan {
    let budget_gb = audit.free_gb();
    let mut projected_gb = 0.0;
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut plan = SyncPlan::default();

    for status in &audit.statuses {
        if !status.entry.recommended || status.classification != Classification::Missing {
            continue;
        }
        let Some(remote) = &status.remote else {
            logger.warn(
                "PLAN",
                format!("{}: missing but no mirror data; skipped", status.entry.name),
            );
            continue;
        };
        let target = destination.join(&remote.filename);
        if seen.contains(&target) {
            continue;
        }
        if projected_gb + remote.size_gb < budget_gb {
            projected_gb += remote.size_gb;
            seen.insert(target.clone());
            plan.push(PlanStep {
                label: status.entry.name.clone(),
                url: remote.url.clone(),
                destination: target,
                expected_gb: Some(remote.size_gb),
                replaces: None,
            });
        } else {
            logger.info(
                "PLAN",
                format!(
                    "{}: {:.2} GB does not fit ({:.2} of {:.2} GB already planned)",
                    status.entry.name, remote.size_gb, projected_gb, budget_gb
                ),
            );
        }
    }

    logger.info(
        "PLAN",
        format!("sync: {} items, {:.2} GB", plan.len(), projected_gb),
    );
    plan
}

/// Every `Outdated` entry: fetch the newer release, then retire the old one.
pub fn plan_outdated(audit: &Audit, destination: &Path, logger: &Logger) -> SyncPlan {
    let mut plan = SyncPlan::default();
    for status in &audit.statuses {
        if status.classification != Classification::Outdated {
            continue;
        }
        let (Some(local), Some(remote)) = (&status.local, &status.remote) else {
            continue;
        };
        plan.push(PlanStep {
            label: status.entry.name.clone(),
            url: remote.url.clone(),
            destination: destination.join(&remote.filename),
            expected_gb: Some(remote.size_gb),
            replaces: Some(local.path.clone()),
        });
    }
    if plan.projected_gb() > audit.free_gb() {
        logger.warn(
            "PLAN",
            format!(
                "update needs {:.2} GB staged but only {:.2} GB is free",
                plan.projected_gb(),
                audit.free_gb()
            ),
        );
    }
    logger.info("PLAN", format!("update: {} items", plan.len()));
    plan
}

/// A single entry chosen by identifier.
pub fn plan_selected(
    audit: &Audit,
    id: u32,
    destination: &Path,
    logger: &Logger,
) -> Result<PlanOutcome> {
    let status = audit.status(id).ok_or(PrepError::UnknownEntry(id))?;
    if status.entry.path.is_manual() {
        return Ok(PlanOutcome::ManualPointer {
            name: status.entry.name.clone(),
            url: status.entry.manual_url.clone(),
        });
    }

    let mut plan = SyncPlan::default();
    match &status.remote {
        Some(remote) => {
            let target = destination.join(&remote.filename);
            let replaces = status
                .local
                .as_ref()
                .map(|local| local.path.clone())
                .filter(|path| *path != target);
            plan.push(PlanStep {
                label: status.entry.name.clone(),
                url: remote.url.clone(),
                destination: target,
                expected_gb: Some(remote.size_gb),
                replaces,
            });
        }
        None => logger.warn(
            "PLAN",
            format!("{}: no mirror data available", status.entry.name),
        ),
    }
    Ok(PlanOutcome::Transfers(plan))
}

/// Reader installers, fetched unconditionally.
pub fn plan_software(software: &[SoftwareItem], destination: &Path) -> SyncPlan {
    let mut plan = SyncPlan::default();
    for item in software {
        plan.push(PlanStep {
            label: item.name.clone(),
            url: item.url.clone(),
            destination: destination.join(&item.filename),
            expected_gb: None,
            replaces: None,
        });
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogEntry};
    use crate::inventory::{Inventory, LocalFile};
    use crate::listing::RemoteVersion;
    use crate::reconcile::reconcile;
    use crate::reconcile::tests::{disk, entry, local, remote, GB};

    fn audit(
        entries: Vec<CatalogEntry>,
        remotes: Vec<Option<RemoteVersion>>,
        files: Vec<LocalFile>,
        free_gb: f64,
    ) -> Audit {
        reconcile(
            &Catalog::new(entries, Vec::new()),
            remotes,
            &Inventory::from_files(files),
            disk(free_gb),
            ".zim",
            &Logger::quiet(),
        )
    }

    fn drive() -> &'static Path {
        Path::new("/drive")
    }

    #[test]
    fn missing_recommended_entry_is_planned() {
        let audit = audit(
            vec![entry(1, "wikipedia_en_all_maxi", "wikipedia/", true)],
            vec![Some(remote("wikipedia_en_all_maxi_2024-01.zim", 4.2))],
            Vec::new(),
            10.0,
        );
        let plan = plan_recommended(&audit, drive(), &Logger::quiet());
        assert_eq!(plan.len(), 1);
        let step = &plan.steps()[0];
        assert_eq!(step.expected_gb, Some(4.2));
        assert_eq!(
            step.destination,
            PathBuf::from("/drive/wikipedia_en_all_maxi_2024-01.zim")
        );
        assert!(step.replaces.is_none());
    }

    #[test]
    fn too_big_entry_is_excluded() {
        let audit = audit(
            vec![entry(1, "wikipedia_en_all_maxi", "wikipedia/", true)],
            vec![Some(remote("wikipedia_en_all_maxi_2024-01.zim", 4.2))],
            Vec::new(),
            1.0,
        );
        assert_eq!(audit.statuses[0].classification, Classification::TooBig);
        assert!(plan_recommended(&audit, drive(), &Logger::quiet()).is_empty());
    }

    #[test]
    fn admission_is_greedy_in_catalog_order() {
        let audit = audit(
            vec![
                entry(1, "big", "a/", true),
                entry(2, "medium", "a/", true),
                entry(3, "small", "a/", true),
            ],
            vec![
                Some(remote("big_2024-01.zim", 6.0)),
                Some(remote("medium_2024-01.zim", 5.0)),
                Some(remote("small_2024-01.zim", 3.0)),
            ],
            Vec::new(),
            10.0,
        );
        let plan = plan_recommended(&audit, drive(), &Logger::quiet());
        let labels: Vec<&str> = plan.steps().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["entry-1", "entry-3"]);
        assert!(plan.projected_gb() < 10.0);
    }

    #[test]
    fn admission_bound_is_strict() {
        let audit = audit(
            vec![entry(1, "first", "a/", true), entry(2, "second", "a/", true)],
            vec![
                Some(remote("first_2024-01.zim", 6.0)),
                Some(remote("second_2024-01.zim", 4.0)),
            ],
            Vec::new(),
            10.0,
        );
        let plan = plan_recommended(&audit, drive(), &Logger::quiet());
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn only_recommended_missing_entries_qualify() {
        let audit = audit(
            vec![
                entry(1, "optional", "a/", false),
                entry(2, "current", "a/", true),
                entry(3, "stale", "a/", true),
                entry(4, "unreachable", "a/", true),
            ],
            vec![
                Some(remote("optional_2024-01.zim", 1.0)),
                Some(remote("current_2024-01.zim", 1.0)),
                Some(remote("stale_2024-01.zim", 1.0)),
                None,
            ],
            vec![
                local("current_2024-01.zim", GB),
                local("stale_2023-01.zim", GB),
            ],
            50.0,
        );
        assert!(plan_recommended(&audit, drive(), &Logger::quiet()).is_empty());
    }

    #[test]
    fn duplicate_destinations_are_planned_once() {
        let audit = audit(
            vec![
                entry(1, "wikipedia_en_medicine", "wikipedia/", true),
                entry(2, "en_medicine", "wikipedia/", true),
            ],
            vec![
                Some(remote("wikipedia_en_medicine_maxi_2024-02.zim", 1.0)),
                Some(remote("wikipedia_en_medicine_maxi_2024-02.zim", 1.0)),
            ],
            Vec::new(),
            50.0,
        );
        let plan = plan_recommended(&audit, drive(), &Logger::quiet());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.projected_gb(), 1.0);
    }

    #[test]
    fn outdated_entries_replace_their_local_copy() {
        let audit = audit(
            vec![entry(1, "wikipedia_en_all_maxi", "wikipedia/", true)],
            vec![Some(remote("wikipedia_en_all_maxi_2024-01.zim", 4.2))],
            vec![local("wikipedia_en_all_maxi_2023-06.zim", 90 * GB)],
            10.0,
        );
        assert_eq!(audit.statuses[0].classification, Classification::Outdated);
        let plan = plan_outdated(&audit, drive(), &Logger::quiet());
        assert_eq!(plan.len(), 1);
        let step = &plan.steps()[0];
        assert_eq!(
            step.destination,
            PathBuf::from("/drive/wikipedia_en_all_maxi_2024-01.zim")
        );
        assert_eq!(
            step.replaces,
            Some(PathBuf::from("/drive/wikipedia_en_all_maxi_2023-06.zim"))
        );
    }

    #[test]
    fn manual_selection_points_out_of_band() {
        let mut manual = entry(9, "field_medicine", "MANUAL", false);
        manual.manual_url = Some("https://example.org/field".into());
        let audit = audit(vec![manual], vec![None], Vec::new(), 10.0);
        let outcome = plan(
            SyncCommand::ManualSelect(9),
            &audit,
            &[],
            drive(),
            &Logger::quiet(),
        )
        .unwrap();
        assert_eq!(
            outcome,
            Some(PlanOutcome::ManualPointer {
                name: "entry-9".into(),
                url: Some("https://example.org/field".into()),
            })
        );
    }

    #[test]
    fn selection_of_mirrored_entry_plans_one_fetch() {
        let audit = audit(
            vec![
                entry(1, "wikipedia_en_all_maxi", "wikipedia/", true),
                entry(7, "gutenberg_en_all", "gutenberg/", false),
            ],
            vec![
                Some(remote("wikipedia_en_all_maxi_2024-01.zim", 4.2)),
                Some(remote("gutenberg_en_all_2024-05.zim", 71.0)),
            ],
            vec![local("gutenberg_en_all_2023-08.zim", 60 * GB)],
            100.0,
        );
        let Ok(PlanOutcome::Transfers(plan)) =
            plan_selected(&audit, 7, drive(), &Logger::quiet())
        else {
            panic!("expected a transfer plan");
        };
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.steps()[0].replaces,
            Some(PathBuf::from("/drive/gutenberg_en_all_2023-08.zim"))
        );
    }

    #[test]
    fn selection_of_unknown_id_fails() {
        let audit = audit(Vec::new(), Vec::new(), Vec::new(), 10.0);
        let err = plan_selected(&audit, 42, drive(), &Logger::quiet()).unwrap_err();
        assert!(matches!(err, PrepError::UnknownEntry(42)));
    }

    #[test]
    fn installers_are_planned_unconditionally() {
        let software = vec![
            SoftwareItem {
                name: "Android".into(),
                url: "https://download.test/kiwix.apk".into(),
                filename: "INSTALL_Kiwix_Android_Standalone.apk".into(),
            },
            SoftwareItem {
                name: "Mac".into(),
                url: "https://download.test/kiwix.dmg".into(),
                filename: "Kiwix_Desktop_Mac.dmg".into(),
            },
        ];
        let audit = audit(Vec::new(), Vec::new(), Vec::new(), 0.0);
        let Some(PlanOutcome::Transfers(plan)) = plan(
            SyncCommand::AppInstallers,
            &audit,
            &software,
            drive(),
            &Logger::quiet(),
        )
        .unwrap() else {
            panic!("expected a transfer plan");
        };
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan.steps()[1].destination,
            PathBuf::from("/drive/Kiwix_Desktop_Mac.dmg")
        );
        assert!(plan.steps().iter().all(|s| s.expected_gb.is_none()));
    }

    #[test]
    fn exit_plans_nothing() {
        let audit = audit(Vec::new(), Vec::new(), Vec::new(), 0.0);
        assert!(plan(SyncCommand::Exit, &audit, &[], drive(), &Logger::quiet())
            .unwrap()
            .is_none());
    }
}
