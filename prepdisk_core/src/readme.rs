/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::readme
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Leave reader instructions at the root of the archive drive
    so the content is usable without this tool.

  Security / Safety Notes:
    Writes a single fixed filename in the destination root and
    fsyncs it before the drive is ejected.

  Dependencies:
    std::fs only.

  Operational Scope:
    Written on request and on every menu exit.

  Revision History:
    2025-11-12 COD  Added emergency README writer.
============================================================*/

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PrepError, Result};

pub const README_FILENAME: &str = "!!!_README_FIRST_!!!.txt";

const README_BODY: &str = "\
# EMERGENCY INSTRUCTIONS: OFFLINE KNOWLEDGE BASE
1. ANDROID: Install the .apk file on this drive. In Kiwix settings, select this USB drive as the 'Storage Folder'.
2. iOS: Use the 'Files' app to open .zim files in the Kiwix app.
3. PC/MAC: Use Kiwix Desktop to open the .zim files directly. (Installers included on this drive)
";

/// Write and fsync the README; returns its path.
pub fn write_readme(destination: &Path) -> Result<PathBuf> {
    let path = destination.join(README_FILENAME);
    let fail = |err: std::io::Error| {
        PrepError::Filesystem(format!("Failed to write {}: {err}", path.display()))
    };
    let mut file = File::create(&path).map_err(fail)?;
    file.write_all(README_BODY.as_bytes()).map_err(fail)?;
    file.sync_all().map_err(fail)?;
    Ok(path)
}
