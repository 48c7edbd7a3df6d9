//! Unavailable-track diffing and manifest writing
//!
//! After settlement the job directory holds one file per track that actually
//! downloaded. Diffing the requested names against the produced files (after
//! filename normalization) yields the unavailable list, which is written as
//! a numbered plain-text manifest inside the job directory so it travels
//! with the archive.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::utils::sanitize_filename;

/// Name of the manifest file written into the job directory. The `000_`
/// prefix sorts it ahead of every track in the archive.
pub const MANIFEST_FILE_NAME: &str = "000_readme.txt";

/// Requested names with no corresponding produced file, in request order.
///
/// Both sides are normalized before comparison: produced file names lose
/// their extension, then both lose the reserved filename symbols (see
/// [`sanitize_filename`]), so an `.mp3` suffix or a stripped `?` never
/// produces a false "unavailable" entry. The manifest file itself is ignored
/// when it appears among `produced_files`.
pub fn diff_unavailable(requested: &[String], produced_files: &[String]) -> Vec<String> {
    let produced: HashSet<String> = produced_files
        .iter()
        .filter(|name| name.as_str() != MANIFEST_FILE_NAME)
        .map(|name| {
            let stem = Path::new(name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone());
            sanitize_filename(&stem)
        })
        .collect();

    requested
        .iter()
        .filter(|name| !produced.contains(&sanitize_filename(name)))
        .cloned()
        .collect()
}

/// Write the unavailable-track manifest into `dir`.
///
/// Numbered from 1, with a short explanatory header. No file is written when
/// `unavailable` is empty. Any I/O failure is fatal to this call.
pub fn write_unavailable_manifest(dir: &Path, unavailable: &[String]) -> Result<()> {
    if unavailable.is_empty() {
        return Ok(());
    }

    let path = dir.join(MANIFEST_FILE_NAME);
    let mut file = std::fs::File::create(&path)?;
    writeln!(
        file,
        "Here is the list of tracks that could not be downloaded.\n try downloading them individually."
    )?;
    for (i, name) in unavailable.iter().enumerate() {
        writeln!(file, "{} - {}", i + 1, name)?;
    }
    file.flush()?;

    info!(?path, count = unavailable.len(), "wrote unavailable-track manifest");
    Ok(())
}

/// List the produced file names (not paths) in a settled job directory.
///
/// Only regular files directly inside `dir` count as produced tracks;
/// the manifest, if already present from an earlier pass, is excluded so it
/// is never mistaken for a track on subsequent reads.
pub(crate) fn list_produced_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            warn!(path = ?entry.path(), "unexpected non-file entry in job directory");
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != MANIFEST_FILE_NAME {
            names.push(name);
        }
    }
    Ok(names)
}
