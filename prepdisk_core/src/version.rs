/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::version
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Extract and order the year-month release token embedded in
    ZIM filenames. Mirror listings and the drive inventory use
    this single routine so their versions stay comparable.

  Security / Safety Notes:
    Pure computation; no I/O performed in this module.

  Dependencies:
    regex for the `\d{4}-\d{2}` token grammar.

  Operational Scope:
    Consulted by the listing parser for latest selection and by
    reconciliation for the outdated check.

  Revision History:
    2025-11-12 COD  Replaced vercmp dependence with token order.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic ordering for reproducible audits
    - Explicit sentinel instead of silent defaults
============================================================*/

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

static YEAR_MONTH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})").expect("year-month regex is valid"));

/// Release token of a package file.
///
/// `Unknown` sorts before every real token, so a file whose name carries no
/// date is always considered the oldest candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VersionToken {
    Unknown,
    YearMonth { year: u16, month: u8 },
}

impl VersionToken {
    /// First `YYYY-MM` occurrence in `filename`, or `Unknown`.
    pub fn from_filename(filename: &str) -> Self {
        YEAR_MONTH_PATTERN
            .captures(filename)
            .and_then(|caps| {
                let year = caps.get(1)?.as_str().parse::<u16>().ok()?;
                let month = caps.get(2)?.as_str().parse::<u8>().ok()?;
                Some(VersionToken::YearMonth { year, month })
            })
            .unwrap_or(VersionToken::Unknown)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionToken::Unknown => f.write_str("unknown"),
            VersionToken::YearMonth { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

impl Serialize for VersionToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            VersionToken::Unknown => serializer.serialize_none(),
            known => serializer.collect_str(known),
        }
    }
}
