/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::transfer
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Execute a sync plan: stream each package to a hidden staging
    file, verify it, move it into place, and only then retire
    the copy it replaces.

  Security / Safety Notes:
    Writes only inside the destination directory. An outdated
    file is never removed before its successor is complete and
    renamed; failed transfers leave the drive as it was.

  Dependencies:
    reqwest for streaming GETs, tokio::fs for async file I/O,
    indicatif for per-file terminal progress.

  Operational Scope:
    Runs strictly one transfer at a time. No overall timeout is
    enforced; only the connect phase is bounded.

  Revision History:
    2025-11-12 COD  Authored stage-then-replace executor.
  ------------------------------------------------------------
  SSE Principles Observed:
    - No destructive step before verified completion
    - Per-step failure isolation
    - Structured progress logging
============================================================*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::config::MirrorConfig;
use crate::error::{PrepError, Result};
use crate::inventory::bytes_to_gb;
use crate::logger::Logger;
use crate::planner::{PlanStep, SyncPlan};

/// Bodies smaller than this are error pages, not packages.
const MIN_PLAUSIBLE_BYTES: u64 = 1000;
const PROGRESS_INTERVAL: u64 = 256 * 1024 * 1024;
const BAR_TEMPLATE: &str =
    "{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} {bytes} ({bytes_per_sec})";

/// Executor boundary: fetch one planned step to its destination.
#[allow(async_fn_in_trait)]
pub trait Transfer {
    /// Returns the number of bytes written on success.
    async fn fetch(&self, step: &PlanStep, logger: &Logger) -> Result<u64>;
}

/// Counters for one plan execution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub completed: usize,
    pub failed: usize,
}

/// Run every step in order; a failed step is logged and skipped.
pub async fn execute_plan<T: Transfer>(
    plan: &SyncPlan,
    transfer: &T,
    logger: &Logger,
) -> ExecutionSummary {
    let mut summary = ExecutionSummary::default();
    for (index, step) in plan.steps().iter().enumerate() {
        logger.info(
            "TRANSFER",
            format!(
                "[{}/{}] {} → {}",
                index + 1,
                plan.len(),
                step.url,
                step.destination.display()
            ),
        );
        match transfer.fetch(step, logger).await {
            Ok(_) => summary.completed += 1,
            Err(err) => {
                summary.failed += 1;
                logger.error("TRANSFER", format!("{}: {err}", step.label));
            }
        }
    }
    summary
}

/// Hidden sibling used while a download is in flight.
pub fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".into());
    destination.with_file_name(format!(".{name}.partial"))
}

/// Per-file terminal progress: a bar when the length is announced, a spinner
/// otherwise. Draws nothing when stderr is not a terminal.
fn progress_bar(label: &str, total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(length) => {
            let bar = ProgressBar::new(length);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        }
    };
    bar.set_message(label.to_string());
    bar
}

/// Streaming HTTP executor.
pub struct HttpTransfer {
    client: reqwest::Client,
}

impl HttpTransfer {
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout.max(1)))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| PrepError::Network(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }

    async fn download_to(&self, step: &PlanStep, staging: &Path, logger: &Logger) -> Result<u64> {
        let failed = |reason: String| PrepError::TransferFailed {
            url: step.url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&step.url)
            .send()
            .await
            .map_err(|err| failed(err.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }
        let expected = response.content_length();
        if let Some(length) = expected {
            if length < MIN_PLAUSIBLE_BYTES {
                return Err(failed(format!("{length}-byte response is not a package")));
            }
        }

        let bar = progress_bar(&step.label, expected);
        let streamed = stream_body(response, staging, expected, &bar, logger)
            .await
            .map_err(|err| match err {
                PrepError::Network(reason) => failed(reason),
                other => other,
            });
        match &streamed {
            Ok(_) => bar.finish_and_clear(),
            Err(_) => bar.abandon(),
        }
        let written = streamed?;

        if let Some(length) = expected {
            if written != length {
                return Err(failed(format!("short body: {written} of {length} bytes")));
            }
        }
        if written < MIN_PLAUSIBLE_BYTES {
            return Err(failed(format!("{written}-byte body is not a package")));
        }
        Ok(written)
    }
}

/// Copy the response body into `staging`, advancing `bar` per chunk and
/// logging every `PROGRESS_INTERVAL` bytes. Returns the bytes written.
async fn stream_body(
    mut response: reqwest::Response,
    staging: &Path,
    expected: Option<u64>,
    bar: &ProgressBar,
    logger: &Logger,
) -> Result<u64> {
    let write_failed = |err: std::io::Error| {
        PrepError::Filesystem(format!("Failed to write {}: {err}", staging.display()))
    };
    let mut file = File::create(staging).await.map_err(|err| {
        PrepError::Filesystem(format!("Failed to create {}: {err}", staging.display()))
    })?;
    let mut written = 0u64;
    let mut next_report = PROGRESS_INTERVAL;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| PrepError::Network(err.to_string()))?
    {
        file.write_all(&chunk).await.map_err(write_failed)?;
        written += chunk.len() as u64;
        bar.inc(chunk.len() as u64);
        if written >= next_report {
            logger.debug(
                "TRANSFER",
                format!(
                    "{:.2} GB of {}",
                    bytes_to_gb(written),
                    expected
                        .map(|total| format!("{:.2} GB", bytes_to_gb(total)))
                        .unwrap_or_else(|| "unknown".into())
                ),
            );
            next_report += PROGRESS_INTERVAL;
        }
    }
    file.flush().await.map_err(write_failed)?;
    file.sync_all().await.map_err(write_failed)?;
    Ok(written)
}

impl Transfer for HttpTransfer {
    async fn fetch(&self, step: &PlanStep, logger: &Logger) -> Result<u64> {
        let staging = staging_path(&step.destination);
        let written = match self.download_to(step, &staging, logger).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&staging).await;
                return Err(err);
            }
        };

        if let Err(err) = fs::rename(&staging, &step.destination).await {
            let _ = fs::remove_file(&staging).await;
            return Err(PrepError::Filesystem(format!(
                "Failed to move {} into place: {err}",
                step.destination.display()
            )));
        }
        logger.info(
            "TRANSFER",
            format!(
                "{} complete ({:.2} GB)",
                step.destination.display(),
                bytes_to_gb(written)
            ),
        );

        if let Some(old) = step.replaces.as_ref().filter(|old| **old != step.destination) {
            match fs::remove_file(old).await {
                Ok(()) => logger.info("REPLACE", format!("removed {}", old.display())),
                Err(err) => logger.warn(
                    "REPLACE",
                    format!("new copy in place but {} remains: {err}", old.display()),
                ),
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor() -> HttpTransfer {
        HttpTransfer::new(&MirrorConfig::default()).unwrap()
    }

    fn step(
        server: &MockServer,
        route: &str,
        destination: PathBuf,
        replaces: Option<PathBuf>,
    ) -> PlanStep {
        PlanStep {
            label: "Wikipedia (EN Maxi)".into(),
            url: format!("{}{route}", server.uri()),
            destination,
            expected_gb: Some(4.2),
            replaces,
        }
    }

    async fn serve(server: &MockServer, route: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[test]
    fn progress_is_a_bar_when_length_is_known() {
        let bar = progress_bar("iFixit (Repair)", Some(4096));
        assert_eq!(bar.length(), Some(4096));
        assert_eq!(bar.message(), "iFixit (Repair)");
        bar.inc(1024);
        assert_eq!(bar.position(), 1024);
        bar.finish_and_clear();
    }

    #[test]
    fn progress_is_a_spinner_when_length_is_unknown() {
        let bar = progress_bar("Kiwix Desktop (macOS)", None);
        assert_eq!(bar.length(), None);
        bar.finish_and_clear();
    }

    #[test]
    fn staging_file_is_hidden_sibling() {
        assert_eq!(
            staging_path(Path::new("/drive/ifixit_en_all_2024-04.zim")),
            PathBuf::from("/drive/.ifixit_en_all_2024-04.zim.partial")
        );
    }

    #[tokio::test]
    async fn replacement_removes_old_copy_only_after_completion() {
        let server = MockServer::start().await;
        let body = vec![42u8; 4096];
        serve(
            &server,
            "/wikipedia/wikipedia_en_all_maxi_2024-01.zim",
            ResponseTemplate::new(200).set_body_bytes(body.clone()),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("wikipedia_en_all_maxi_2023-06.zim");
        std::fs::write(&old, b"previous release").unwrap();
        let new = dir.path().join("wikipedia_en_all_maxi_2024-01.zim");

        let written = executor()
            .fetch(
                &step(
                    &server,
                    "/wikipedia/wikipedia_en_all_maxi_2024-01.zim",
                    new.clone(),
                    Some(old.clone()),
                ),
                &Logger::quiet(),
            )
            .await
            .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&new).unwrap(), body);
        assert!(!old.exists());
        assert!(!staging_path(&new).exists());
    }

    #[tokio::test]
    async fn failed_replacement_keeps_old_copy() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/wikipedia/wikipedia_en_all_maxi_2024-01.zim",
            ResponseTemplate::new(500),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("wikipedia_en_all_maxi_2023-06.zim");
        std::fs::write(&old, b"previous release").unwrap();
        let new = dir.path().join("wikipedia_en_all_maxi_2024-01.zim");

        let err = executor()
            .fetch(
                &step(
                    &server,
                    "/wikipedia/wikipedia_en_all_maxi_2024-01.zim",
                    new.clone(),
                    Some(old.clone()),
                ),
                &Logger::quiet(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PrepError::TransferFailed { .. }));
        assert_eq!(std::fs::read(&old).unwrap(), b"previous release");
        assert!(!new.exists());
        assert!(!staging_path(&new).exists());
    }

    #[tokio::test]
    async fn tiny_bodies_are_rejected_as_error_pages() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/kiwix.apk",
            ResponseTemplate::new(200).set_body_string("<html>moved</html>"),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("INSTALL_Kiwix.apk");
        let err = executor()
            .fetch(&step(&server, "/kiwix.apk", target.clone(), None), &Logger::quiet())
            .await
            .unwrap_err();
        assert!(matches!(err, PrepError::TransferFailed { .. }));
        assert!(!target.exists());
    }

    struct ScriptedTransfer {
        fail_on: &'static str,
        seen: RefCell<Vec<String>>,
    }

    impl Transfer for ScriptedTransfer {
        async fn fetch(&self, step: &PlanStep, _logger: &Logger) -> Result<u64> {
            self.seen.borrow_mut().push(step.label.clone());
            if step.label == self.fail_on {
                return Err(PrepError::TransferFailed {
                    url: step.url.clone(),
                    reason: "connection reset".into(),
                });
            }
            Ok(1)
        }
    }

    #[tokio::test]
    async fn plan_execution_continues_past_failures() {
        let plan = crate::planner::plan_software(
            &[
                crate::catalog::SoftwareItem {
                    name: "Android".into(),
                    url: "https://download.test/a.apk".into(),
                    filename: "a.apk".into(),
                },
                crate::catalog::SoftwareItem {
                    name: "Windows".into(),
                    url: "https://download.test/w.zip".into(),
                    filename: "w.zip".into(),
                },
                crate::catalog::SoftwareItem {
                    name: "Mac".into(),
                    url: "https://download.test/m.dmg".into(),
                    filename: "m.dmg".into(),
                },
            ],
            Path::new("/drive"),
        );
        let transfer = ScriptedTransfer {
            fail_on: "Windows",
            seen: RefCell::new(Vec::new()),
        };

        let summary = execute_plan(&plan, &transfer, &Logger::quiet()).await;
        assert_eq!(
            summary,
            ExecutionSummary {
                completed: 2,
                failed: 1
            }
        );
        assert_eq!(*transfer.seen.borrow(), vec!["Android", "Windows", "Mac"]);
    }
}
