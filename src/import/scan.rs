//! File discovery and filename heuristics for import.
//!
//! Walks a completed download's output folder, skipping the junk that
//! release groups ship alongside the payload, and parses episode/track
//! numbers and quality markers out of filenames.

use crate::error::{Error, ImportError, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Directory names that never contain importable payload
const SKIP_DIRS: &[&str] = &["sample", "samples", "extras", "subs", "subtitles", "proof"];

/// Extensions deleted during source-folder cleanup
const JUNK_EXTENSIONS: &[&str] = &[
    "nfo", "sfv", "srr", "nzb", "url", "lnk", "sub", "idx", "exe", "bat", "par2",
];

static SEASON_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a literal
    Regex::new(r"[Ss](\d{1,2})[Ee](\d{1,3})").unwrap()
});

static SEASON_X_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a literal
    Regex::new(r"\b(\d{1,2})x(\d{2})\b").unwrap()
});

static TRACK_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a literal
    Regex::new(r"^(?:\d{1,2}[-.])?(\d{1,3})\s*[-. ]").unwrap()
});

/// Whether a filename marks itself as a sample
fn is_sample_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("sample") && !lower.contains("sampler")
}

/// Recursively discover candidate payload files under a root
///
/// Skips known non-payload directories and sample-named files. Returns the
/// root itself when it points at a single file rather than a folder.
pub fn discover_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }

    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            !(entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_str()))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !is_sample_name(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Parse a season/episode pair out of a filename
pub fn parse_episode(name: &str) -> Option<(i32, i32)> {
    let captures = SEASON_EPISODE
        .captures(name)
        .or_else(|| SEASON_X_EPISODE.captures(name))?;
    let season = captures.get(1)?.as_str().parse().ok()?;
    let episode = captures.get(2)?.as_str().parse().ok()?;
    Some((season, episode))
}

/// Parse a leading track number out of a filename
pub fn parse_track(name: &str) -> Option<i32> {
    let captures = TRACK_NUMBER.captures(name)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Detect a quality label from filename markers, resolution first
pub fn detect_quality(name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    for marker in ["2160p", "1080p", "720p", "480p"] {
        if lower.contains(marker) {
            return Some(marker.to_string());
        }
    }
    for (marker, label) in [
        ("bluray", "bluray"),
        ("blu-ray", "bluray"),
        ("web-dl", "web-dl"),
        ("webdl", "web-dl"),
        ("webrip", "webrip"),
        ("hdtv", "hdtv"),
        ("dvdrip", "dvd"),
        ("flac", "flac"),
        ("320", "mp3-320"),
    ] {
        if lower.contains(marker) {
            return Some(label.to_string());
        }
    }
    None
}

/// Move a file into place, falling back to copy-then-delete across devices
pub fn atomic_move(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }

    // rename fails across filesystems (EXDEV); copy and delete instead
    fs::copy(source, dest).map_err(|e| {
        Error::Import(ImportError::MoveFailed {
            from: source.to_path_buf(),
            dest: dest.to_path_buf(),
            reason: e.to_string(),
        })
    })?;
    if let Err(e) = fs::remove_file(source) {
        tracing::warn!(
            source = %source.display(),
            error = %e,
            "Imported copy succeeded but removing the source failed"
        );
    }
    Ok(())
}

/// Delete junk files and empty directories left behind after import
///
/// Only called after at least one file was imported; removes the root folder
/// itself when it ends up empty.
pub fn cleanup_source_folder(root: &Path) {
    if !root.is_dir() {
        return;
    }

    // Depth-first so emptied subdirectories can be removed on the way up
    for entry in WalkDir::new(root)
        .contents_first(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() {
            let junk = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    JUNK_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                });
            if junk && let Err(e) = fs::remove_file(path) {
                tracing::debug!(path = %path.display(), error = %e, "Junk file removal failed");
            }
        } else if entry.file_type().is_dir() {
            // remove_dir refuses non-empty directories, which is exactly the guard we want
            let _ = fs::remove_dir(path);
        }
    }
}

/// File size in bytes, zero when unreadable
pub fn file_size(path: &Path) -> i64 {
    fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn discovery_skips_sample_dirs_and_sample_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("Show.S01E02.1080p.mkv"));
        touch(&root.join("Sample/show.s01e02.sample.mkv"));
        touch(&root.join("Subs/show.srt"));
        touch(&root.join("show.s01e02-sample.mkv"));

        let files = discover_files(root);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("Show.S01E02.1080p.mkv"));
    }

    #[test]
    fn discovery_of_a_single_file_returns_it() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Movie.2024.1080p.mkv");
        touch(&file);
        assert_eq!(discover_files(&file), vec![file]);
    }

    #[test]
    fn episode_parsing_handles_both_conventions() {
        assert_eq!(parse_episode("Show.S01E02.1080p.mkv"), Some((1, 2)));
        assert_eq!(parse_episode("show.s10e123.mkv"), Some((10, 123)));
        assert_eq!(parse_episode("Show 3x07 HDTV.mkv"), Some((3, 7)));
        assert_eq!(parse_episode("Movie.2024.1080p.mkv"), None);
    }

    #[test]
    fn track_parsing_reads_leading_numbers() {
        assert_eq!(parse_track("01 - Opening.flac"), Some(1));
        assert_eq!(parse_track("12. Closing Theme.mp3"), Some(12));
        assert_eq!(parse_track("1-03 - Interlude.flac"), Some(3));
        assert_eq!(parse_track("Bonus Track.mp3"), None);
    }

    #[test]
    fn quality_detection_prefers_resolution() {
        assert_eq!(
            detect_quality("Show.S01E02.1080p.WEB-DL.mkv").as_deref(),
            Some("1080p")
        );
        assert_eq!(detect_quality("Movie.WEBRip.XviD.avi").as_deref(), Some("webrip"));
        assert_eq!(detect_quality("Album.FLAC.2020").as_deref(), Some("flac"));
        assert_eq!(detect_quality("file.mkv"), None);
    }

    #[test]
    fn atomic_move_creates_destination_parents() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mkv");
        touch(&source);
        let dest = dir.path().join("library/Show/Season 01/ep.mkv");

        atomic_move(&source, &dest).unwrap();
        assert!(dest.exists());
        assert!(!source.exists());
    }

    #[test]
    fn cleanup_removes_junk_and_empty_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("release");
        touch(&root.join("release.nfo"));
        touch(&root.join("checksums.sfv"));
        touch(&root.join("nested/repair.par2"));
        touch(&root.join("keep/data.mkv"));

        cleanup_source_folder(&root);

        assert!(!root.join("release.nfo").exists());
        assert!(!root.join("nested").exists(), "emptied dir must be removed");
        assert!(root.join("keep/data.mkv").exists(), "payload is left alone");
        assert!(root.exists(), "non-empty root stays");
    }
}
