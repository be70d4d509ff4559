use std::fs::File;
use std::path::{Path, PathBuf};

use log::debug;
use zip::ZipArchive;

use crate::error::{Result, TestStatsError};

/// Extracts a downloaded zip archive into a sibling directory.
///
/// `/tmp/test-reports.zip` is unpacked into `/tmp/unzipped-test-reports/`,
/// so the directory name keeps the job id suffix encoded in the archive
/// name.
pub fn unzip(archive: &Path) -> Result<PathBuf> {
    let stem = archive
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            TestStatsError::Config(format!("Invalid archive name: {}", archive.display()))
        })?;
    let destination = archive.with_file_name(format!("unzipped-{stem}"));

    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    zip.extract(&destination)?;

    debug!(
        "Extracted {} into {}",
        archive.display(),
        destination.display()
    );

    Ok(destination)
}
