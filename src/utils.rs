//! Utility functions for filenames, durations, and identity keys

use sha2::{Digest, Sha256};

/// Characters stripped from track names before they become filenames or are
/// compared against directory contents. Covers extension dots plus the
/// OS-reserved set.
const INVALID_FILENAME_SYMBOLS: &[char] =
    &['.', '/', '\\', '|', '*', '>', '<', '"', ':', '?'];

/// Strip invalid filename symbols from a track name.
///
/// Applied both when writing a track file and when diffing requested names
/// against produced files, so symbol differences never produce false
/// "unavailable" entries.
///
/// # Examples
///
/// ```
/// use playlist_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("AC/DC: Back In Black?"), "ACDC Back In Black");
/// assert_eq!(sanitize_filename("plain name"), "plain name");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !INVALID_FILENAME_SYMBOLS.contains(c))
        .collect()
}

/// Format a track length in seconds as `m:ss`.
///
/// ```
/// use playlist_dl::utils::format_duration;
///
/// assert_eq!(format_duration(245), "4:05");
/// assert_eq!(format_duration(60), "1:00");
/// assert_eq!(format_duration(7), "0:07");
/// ```
pub fn format_duration(total_secs: u64) -> String {
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    format!("{minutes}:{seconds:02}")
}

/// Derive a stable identity key from an ordered track list (sha256 hex).
///
/// For callers that have no external id for the source playlist or album.
/// Order-sensitive: the same names in a different order are a different job.
pub fn identity_key_for<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_bytes());
        // Separator prevents ["ab","c"] colliding with ["a","bc"]
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for b in digest {
        hex.push_str(&format!("{b:02x}"));
    }
    hex
}

/// Generate a fresh job directory name: 8 random hex chars plus a UTC
/// timestamp, e.g. `3f9a1c2e_20260830142501`.
pub(crate) fn job_dir_name() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill(&mut bytes[..]);
    let mut hex = String::with_capacity(8);
    for b in bytes {
        hex.push_str(&format!("{b:02x}"));
    }
    format!("{hex}_{}", chrono::Utc::now().format("%Y%m%d%H%M%S"))
}
