/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::listing
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Turn a mirror directory listing (HTML autoindex page) into
    versioned package records and pick the latest candidate.

  Security / Safety Notes:
    Pure text processing over untrusted HTML; no markup is
    executed and unmatched input is ignored rather than trusted.

  Dependencies:
    regex for tag, row and size extraction; urlencoding for
    percent-decoded filenames.

  Operational Scope:
    Fed by the mirror module; independent of the network so the
    grammar can be exercised against fixture listings.

  Revision History:
    2025-11-12 COD  Authored listing record parser.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Documented extraction grammar with explicit units
    - Conservative defaults for unknown sizes
    - Deterministic latest selection
============================================================*/

//! Extraction grammar:
//!
//! * A record is a `<tr>` row when the page has table rows, otherwise a line
//!   of text (the `<pre>` layout used by nginx and lighttpd).
//! * Each `<a href=...>` in a record is a candidate when the last path segment
//!   of its target ends in the package extension and satisfies the match rule.
//! * Size: in a row, the first cell after the link's cell whose text is
//!   `NUMBER [UNIT][i][B]` with `UNIT` one of `K M G T`; in a line, the last
//!   token (or last two tokens) after the link. A bare number is bytes.
//! * Version: the first `YYYY-MM` token of the filename.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::MatchRule;
use crate::version::VersionToken;

/// Size assumed for a package whose listing row carries no readable size.
pub const UNKNOWN_SIZE_GB: f64 = 0.1;

const KIB: f64 = 1024.0;

static ROW_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr\s*>").expect("row regex is valid"));
static CELL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td\s*>").expect("cell regex is valid"));
static ANCHOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s+[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>"#)
        .expect("anchor regex is valid")
});
static ANCHOR_CLOSE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</a\s*>").expect("anchor close regex is valid"));
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid"));
static SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*([KMGT])?(?:i?B)?$").expect("size regex is valid")
});
static THOUSANDS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(?:,\d{3})+$").expect("thousands regex is valid"));

/// A parsed candidate from one mirror listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVersion {
    pub url: String,
    pub filename: String,
    pub size_gb: f64,
    pub size_known: bool,
    pub version: VersionToken,
}

/// Normalise a size cell such as `4.2G`, `830M`, `1.1 GiB` or `4509715660`
/// to gigabytes.
///
/// Commas are thousands separators only in a bare byte count grouped by
/// threes (`4,509,715,660`); a single comma elsewhere is a decimal comma
/// (`4,2G`).
pub fn parse_size_gb(text: &str) -> Option<f64> {
    let cleaned = text.replace("&nbsp;", " ");
    let trimmed = cleaned.trim();
    let normalised: Cow<'_, str> = if THOUSANDS_PATTERN.is_match(trimmed) {
        Cow::Owned(trimmed.replace(',', ""))
    } else if trimmed.matches(',').count() == 1 {
        Cow::Owned(trimmed.replacen(',', ".", 1))
    } else {
        Cow::Borrowed(trimmed)
    };
    let caps = SIZE_PATTERN.captures(&normalised)?;
    let magnitude = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_ascii_uppercase())
        .unwrap_or_default();
    let gigabytes = match unit.as_str() {
        "K" => magnitude / (KIB * KIB),
        "M" => magnitude / KIB,
        "G" => magnitude,
        "T" => magnitude * KIB,
        _ => magnitude / (KIB * KIB * KIB),
    };
    if gigabytes.is_finite() && gigabytes >= 0.0 {
        Some(gigabytes)
    } else {
        None
    }
}

/// Parse every matching package link of a listing.
///
/// `dir_url` is the absolute URL of the listed directory, ending in `/`.
pub fn parse_listing(
    html: &str,
    dir_url: &str,
    rule: &MatchRule,
    extension: &str,
) -> Vec<RemoteVersion> {
    let rows: Vec<&str> = ROW_PATTERN
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    let mut found: Vec<RemoteVersion> = Vec::new();
    let mut push = |candidate: RemoteVersion| {
        if let Some(existing) = found.iter_mut().find(|known| known.url == candidate.url) {
            if !existing.size_known && candidate.size_known {
                *existing = candidate;
            }
        } else {
            found.push(candidate);
        }
    };

    if rows.is_empty() {
        for line in html.lines() {
            for candidate in parse_record(line, dir_url, rule, extension, size_from_line) {
                push(candidate);
            }
        }
    } else {
        for row in rows {
            for candidate in parse_record(row, dir_url, rule, extension, size_from_row) {
                push(candidate);
            }
        }
    }

    found
}

/// Pick the newest candidate by version token; ties go to the greater URL.
pub fn select_latest(mut candidates: Vec<RemoteVersion>) -> Option<RemoteVersion> {
    candidates.sort_by(|a, b| {
        a.version
            .cmp(&b.version)
            .then_with(|| a.url.cmp(&b.url))
    });
    candidates.pop()
}

fn parse_record(
    record: &str,
    dir_url: &str,
    rule: &MatchRule,
    extension: &str,
    size_of: fn(&str, usize, usize) -> Option<f64>,
) -> Vec<RemoteVersion> {
    let mut out = Vec::new();
    for caps in ANCHOR_PATTERN.captures_iter(record) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(href) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let Some((url, filename)) = resolve_href(href.as_str(), dir_url) else {
            continue;
        };
        if !filename.ends_with(extension) || !rule.matches(&filename) {
            continue;
        }
        let link_end = ANCHOR_CLOSE_PATTERN
            .find_at(record, whole.end())
            .map(|m| m.end())
            .unwrap_or_else(|| whole.end());
        let size = size_of(record, whole.start(), link_end);
        out.push(RemoteVersion {
            url,
            version: VersionToken::from_filename(&filename),
            filename,
            size_gb: size.unwrap_or(UNKNOWN_SIZE_GB),
            size_known: size.is_some(),
        });
    }
    out
}

fn resolve_href(href: &str, dir_url: &str) -> Option<(String, String)> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('?') || href.starts_with('#') {
        return None;
    }
    let target = href
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let raw_segment = target.rsplit('/').next().unwrap_or_default();
    if raw_segment.is_empty() {
        return None;
    }
    let filename = urlencoding::decode(raw_segment)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw_segment.to_string());
    let url = if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("{dir_url}{raw_segment}")
    };
    Some((url, filename))
}

fn cell_text(raw: &str) -> String {
    TAG_PATTERN
        .replace_all(raw, " ")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}

fn size_from_row(row: &str, link_start: usize, link_end: usize) -> Option<f64> {
    let cells: Vec<_> = CELL_PATTERN.find_iter(row).collect();
    if cells.is_empty() {
        return size_from_line(row, link_start, link_end);
    }
    let following: Vec<_> = match cells
        .iter()
        .position(|cell| cell.start() <= link_start && link_start < cell.end())
    {
        Some(idx) => cells[idx + 1..].to_vec(),
        None => cells
            .into_iter()
            .filter(|cell| cell.start() >= link_end)
            .collect(),
    };
    following
        .iter()
        .find_map(|cell| parse_size_gb(&cell_text(cell.as_str())))
}

fn size_from_line(line: &str, _link_start: usize, link_end: usize) -> Option<f64> {
    let next_link = ANCHOR_PATTERN
        .find_at(line, link_end)
        .map(|m| m.start())
        .unwrap_or(line.len());
    let trailing = cell_text(&line[link_end..next_link]);
    let tokens: Vec<&str> = trailing.split_whitespace().collect();
    let last = tokens.last()?;
    parse_size_gb(last).or_else(|| {
        let pair = tokens.len().checked_sub(2).map(|idx| tokens[idx..].join(" "))?;
        parse_size_gb(&pair)
    })
}
