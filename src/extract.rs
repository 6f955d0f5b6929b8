//! External archive extraction.
//!
//! Unpacking the ITSS container is delegated to a child process: `7z` by
//! default, or whatever the `CHMWEB_EXTRACTOR` environment variable names.
//! A custom extractor is invoked as `<cmd> <archive> <dest>` and must exit
//! zero on success.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Unpack `archive` into `dest`, creating it as needed. Existing files are
/// overwritten. Non-zero extractor exit status is fatal.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;

    let status = match std::env::var("CHMWEB_EXTRACTOR") {
        Ok(custom) if !custom.is_empty() => {
            Command::new(custom).arg(archive).arg(dest).status()
        }
        _ => Command::new("7z")
            .arg("x")
            .arg("-y")
            .arg("-bso0")
            .arg("-bsp0")
            .arg(format!("-o{}", dest.display()))
            .arg(archive)
            .status(),
    };

    let status = status.map_err(|err| {
        Error::Extractor(format!(
            "cannot launch extractor for {}: {err}",
            archive.display()
        ))
    })?;
    if !status.success() {
        return Err(Error::Extractor(format!(
            "extractor exited with {status} for {}",
            archive.display()
        )));
    }
    Ok(())
}
