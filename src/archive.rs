//! Deterministic archive assembly
//!
//! Walks a settled job directory and packs every regular file into a deflate
//! zip held in memory, ready to stream to the caller. Entry names are paths
//! relative to the job directory with `/` separators, written in
//! lexicographic order, so identical directory contents always produce
//! byte-identical archives. No entry is emitted for directories themselves.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::error::Result;

/// Assemble the contents of `dir` into zip archive bytes.
///
/// Any I/O failure while reading the tree or writing the archive is fatal to
/// this call and surfaces as an error; nothing partial is returned.
pub fn assemble(dir: &Path) -> Result<Vec<u8>> {
    let mut entries = Vec::new();
    collect_files(dir, dir, &mut entries)?;
    // Directory listing order is platform-dependent; sorting the relative
    // entry names is what makes the byte layout reproducible.
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    debug!(?dir, entry_count = entries.len(), "assembling archive");

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = archive_file_options();

    for (entry_name, path) in &entries {
        writer.start_file(entry_name.clone(), options)?;
        let data = std::fs::read(path)?;
        writer.write_all(&data)?;
    }

    let cursor = writer.finish()?;
    let bytes = cursor.into_inner();

    info!(
        ?dir,
        entry_count = entries.len(),
        archive_bytes = bytes.len(),
        "archive assembled"
    );

    Ok(bytes)
}

/// Entry options shared by every archive this crate writes. The modification
/// time is pinned to the zip epoch: the default options stamp the wall clock
/// into each entry, which would make otherwise identical archives differ.
pub(crate) fn archive_file_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

/// Recursively collect `(entry_name, absolute_path)` pairs for every regular
/// file under `dir`, with entry names relative to `root` using `/` separators.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            let entry_name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((entry_name, path));
        }
        // Symlinks and other special entries are skipped
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_entry_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn entries_are_relative_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("charlie.mp3"), b"c").unwrap();
        std::fs::write(dir.path().join("alpha.mp3"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("bravo.mp3"), b"b").unwrap();

        let bytes = assemble(dir.path()).unwrap();
        let names = read_entry_names(&bytes);

        assert_eq!(names, vec!["alpha.mp3", "charlie.mp3", "sub/bravo.mp3"]);
    }

    #[test]
    fn no_entry_for_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("empty_sub")).unwrap();
        std::fs::write(dir.path().join("only.mp3"), b"x").unwrap();

        let bytes = assemble(dir.path()).unwrap();
        let names = read_entry_names(&bytes);

        assert_eq!(names, vec!["only.mp3"]);
    }

    #[test]
    fn identical_contents_give_identical_bytes() {
        // Create identical contents in different orders to prove the
        // platform listing order is irrelevant
        let first = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("b.mp3"), b"same b").unwrap();
        std::fs::write(first.path().join("a.mp3"), b"same a").unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("a.mp3"), b"same a").unwrap();
        std::fs::write(second.path().join("b.mp3"), b"same b").unwrap();

        assert_eq!(
            assemble(first.path()).unwrap(),
            assemble(second.path()).unwrap()
        );
    }

    #[test]
    fn assembly_time_does_not_leak_into_the_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("track.mp3"), b"same payload").unwrap();

        let early = assemble(dir.path()).unwrap();
        // Zip modification times have two-second resolution; cross a boundary
        // so a wall-clock stamp would show up as a byte difference
        std::thread::sleep(std::time::Duration::from_secs(3));
        let late = assemble(dir.path()).unwrap();

        assert_eq!(early, late);
    }

    #[test]
    fn entry_contents_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("track.mp3"), b"audio payload").unwrap();

        let bytes = assemble(dir.path()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name("track.mp3").unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();

        assert_eq!(data, b"audio payload");
    }

    #[test]
    fn empty_directory_yields_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = assemble(dir.path()).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("never_created");
        assert!(assemble(&gone).is_err());
    }
}
