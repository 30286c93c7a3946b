/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::mirror
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Fetch Kiwix mirror directory listings and resolve the latest
    published version for each catalog entry.

  Security / Safety Notes:
    Performs read-only HTTP(S) GET requests to the configured
    public mirror. No credentials are transmitted.

  Dependencies:
    reqwest for HTTP; listing module for record parsing.

  Operational Scope:
    Supplies remote candidates to reconciliation. A failing
    directory is logged and reported as absent so the rest of
    the audit proceeds.

  Revision History:
    2025-11-12 COD  Reworked the AUR client into a mirror client.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Short, configurable listing timeouts
    - Local recovery instead of aborting the audit
    - No network access for manual-only entries
============================================================*/

use std::time::Duration;

use reqwest::StatusCode;

use crate::catalog::{CatalogEntry, MirrorPath};
use crate::config::MirrorConfig;
use crate::error::{PrepError, Result};
use crate::listing::{parse_listing, select_latest, RemoteVersion};
use crate::logger::Logger;

/// Anything able to name the latest remote version of a catalog entry.
#[allow(async_fn_in_trait)]
pub trait ListingSource {
    /// Latest candidate, or `None` when the entry is manual-only or the
    /// listing could not be obtained.
    async fn latest(&self, entry: &CatalogEntry, logger: &Logger) -> Option<RemoteVersion>;
}

/// Client for the Kiwix mirror directory tree.
#[derive(Clone)]
pub struct MirrorClient {
    client: reqwest::Client,
    base_url: String,
    extension: String,
}

impl MirrorClient {
    /// Construct a new client from configuration.
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout.max(1)))
            .connect_timeout(Duration::from_secs(config.connect_timeout.max(1)))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| PrepError::Network(format!("Failed to build HTTP client: {err}")))?;

        let mut base_url = config.base_url.trim_end_matches('/').to_string();
        base_url.push('/');
        Ok(Self {
            client,
            base_url,
            extension: config.extension.clone(),
        })
    }

    pub fn directory_url(&self, dir: &str) -> String {
        format!("{}{}", self.base_url, dir.trim_start_matches('/'))
    }

    /// Download the raw HTML listing of one mirror directory.
    pub async fn fetch_listing(&self, dir: &str) -> Result<String> {
        let url = self.directory_url(dir);
        let unavailable = |reason: String| PrepError::MirrorUnavailable {
            url: url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }
        response
            .text()
            .await
            .map_err(|err| unavailable(format!("unreadable body: {err}")))
    }
}

impl ListingSource for MirrorClient {
    async fn latest(&self, entry: &CatalogEntry, logger: &Logger) -> Option<RemoteVersion> {
        let dir = match &entry.path {
            MirrorPath::Manual => {
                logger.debug(
                    "MIRROR",
                    format!("{} is manual-only; mirror not consulted", entry.name),
                );
                return None;
            }
            MirrorPath::Remote(dir) => dir,
        };

        let html = match self.fetch_listing(dir).await {
            Ok(html) => html,
            Err(err) => {
                logger.warn("MIRROR404", format!("{}: {err}", entry.name));
                return None;
            }
        };

        let dir_url = self.directory_url(dir);
        let candidates = parse_listing(&html, &dir_url, &entry.rule, &self.extension);
        let count = candidates.len();
        let latest = select_latest(candidates);
        match &latest {
            Some(found) => logger.debug(
                "MIRROR",
                format!(
                    "{}: {} candidates, latest {} ({:.2} GB)",
                    entry.name, count, found.filename, found.size_gb
                ),
            ),
            None => logger.warn(
                "MIRROR",
                format!(
                    "{}: no files matching {:?} in {dir_url}",
                    entry.name,
                    entry.rule.terms()
                ),
            ),
        }
        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MatchMode, MatchRule};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LISTING: &str = r#"<table>
<tr><td><a href="wikipedia_en_all_maxi_2023-06.zim">wikipedia_en_all_maxi_2023-06.zim</a></td><td>2023-06-20 14:02</td><td>97G</td></tr>
<tr><td><a href="wikipedia_en_all_maxi_2024-01.zim">wikipedia_en_all_maxi_2024-01.zim</a></td><td>2024-01-16 09:41</td><td>4.2G</td></tr>
</table>"#;

    fn entry(path: &str) -> CatalogEntry {
        CatalogEntry {
            id: 1,
            name: "Wikipedia (EN Maxi)".into(),
            path: MirrorPath::parse(path),
            rule: MatchRule::new(vec!["wikipedia_en_all_maxi".into()], MatchMode::Contains),
            recommended: true,
            manual_url: None,
        }
    }

    fn client(server: &MockServer, timeout: u64) -> MirrorClient {
        MirrorClient::new(&MirrorConfig {
            base_url: format!("{}/kiwix/zim", server.uri()),
            timeout,
            ..MirrorConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn resolves_latest_version_from_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kiwix/zim/wikipedia/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;

        let latest = client(&server, 5)
            .latest(&entry("wikipedia/"), &Logger::quiet())
            .await
            .unwrap();
        assert_eq!(latest.filename, "wikipedia_en_all_maxi_2024-01.zim");
        assert_eq!(
            latest.url,
            format!("{}/kiwix/zim/wikipedia/wikipedia_en_all_maxi_2024-01.zim", server.uri())
        );
        assert!((latest.size_gb - 4.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn manual_entries_never_touch_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .expect(0)
            .mount(&server)
            .await;

        let latest = client(&server, 5)
            .latest(&entry("MANUAL"), &Logger::quiet())
            .await;
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn server_error_is_recovered_as_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kiwix/zim/wikipedia/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mirror = client(&server, 5);
        let err = mirror.fetch_listing("wikipedia/").await.unwrap_err();
        assert!(matches!(err, PrepError::MirrorUnavailable { .. }));
        assert!(mirror
            .latest(&entry("wikipedia/"), &Logger::quiet())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn slow_listing_times_out_as_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kiwix/zim/wikipedia/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(LISTING)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let latest = client(&server, 1)
            .latest(&entry("wikipedia/"), &Logger::quiet())
            .await;
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn listing_without_matches_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kiwix/zim/ifixit/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;

        let mut ifixit = entry("ifixit/");
        ifixit.rule = MatchRule::new(vec!["ifixit_en_all".into()], MatchMode::Contains);
        assert!(client(&server, 5)
            .latest(&ifixit, &Logger::quiet())
            .await
            .is_none());
    }
}
