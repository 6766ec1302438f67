// ============================================================
// Layer 4 — Corpus Scanner
// ============================================================
// Walks a directory of microscopy images and derives three
// labels per image from the (lowercased) file name:
//
//   focus — 0 if the name contains "focus", else 1
//   zoom  — the first of "4x", "10x", "20x", "40x" present in
//           the name, checked in that priority order (NOT by
//           position in the string)
//   type  — everything before the character that precedes the
//           zoom marker, split on '-', first segment
//
//   "Bone-Slide2-10x-Focus.JPG"
//     lowercase → "bone-slide2-10x-focus.jpg"
//     focus     → 0
//     zoom      → 10x at byte 12
//     prefix    → "bone-slide2"  → type "bone"
//
// Files whose name contains "calibration" are skipped.
// Names that cannot be parsed (no zoom marker, marker at the
// very start, empty type) are quarantined in the ScanReport
// with a reason instead of becoming half-filled records.
//
// Entries are sorted by path so the same directory content
// yields the same record order on every platform.
//
// Reference: Rust Book §9 (Error Handling), §8 (Strings)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::record::{
    FilenameError, Focus, ImageRecord, Magnification, RejectedFile, ScanReport,
};
use crate::domain::traits::CorpusSource;

/// Substring that marks calibration slides
const CALIBRATION_MARKER: &str = "calibration";

/// Substring that marks an in-focus capture
const FOCUS_MARKER: &str = "focus";

/// Scans one directory (non-recursively) for labelled images.
pub struct CorpusScanner {
    dir:        PathBuf,
    /// Accepted file extensions, lowercase, without the dot
    extensions: Vec<String>,
}

impl CorpusScanner {
    /// Scanner accepting `.jpg` files only
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_extensions(dir, ["jpg"])
    }

    pub fn with_extensions<S: AsRef<str>>(
        dir:        impl Into<PathBuf>,
        extensions: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            dir:        dir.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    fn has_accepted_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|ok| ok.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

impl CorpusSource for CorpusScanner {
    fn scan(&self) -> Result<ScanReport> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read image directory '{}'", self.dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && self.has_accepted_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut report = ScanReport::default();

        for path in paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!("Quarantined '{}': {}", path.display(), FilenameError::NonUtf8);
                report.rejected.push(RejectedFile { path, reason: FilenameError::NonUtf8 });
                continue;
            };
            let name = name.to_lowercase();

            if name.contains(CALIBRATION_MARKER) {
                tracing::debug!("Skipping calibration image '{}'", path.display());
                report.calibration_skipped += 1;
                continue;
            }

            match parse_file_name(&name) {
                Ok(labels) => {
                    report.records.push(ImageRecord::new(path, labels.focus, labels.zoom, labels.tissue));
                }
                Err(reason) => {
                    tracing::warn!("Quarantined '{}': {}", path.display(), reason);
                    report.rejected.push(RejectedFile { path, reason });
                }
            }
        }

        tracing::info!(
            "Found {} images in '{}' ({} rejected, {} calibration skipped)",
            report.records.len(),
            self.dir.display(),
            report.rejected.len(),
            report.calibration_skipped,
        );
        Ok(report)
    }
}

// ─── Filename Parsing ─────────────────────────────────────────────────────────
/// Labels recovered from one file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub focus:  Focus,
    pub zoom:   Magnification,
    pub tissue: String,
}

/// Parse an already-lowercased file name into its three labels.
pub fn parse_file_name(name: &str) -> Result<ParsedName, FilenameError> {
    let focus = if name.contains(FOCUS_MARKER) {
        Focus::Focused
    } else {
        Focus::Unfocused
    };

    // First marker by priority, remembering where it starts
    let (zoom, position) = Magnification::PRIORITY
        .into_iter()
        .find_map(|m| name.find(m.marker()).map(|pos| (m, pos)))
        .ok_or(FilenameError::MissingZoom)?;

    if position == 0 {
        return Err(FilenameError::ZoomAtStart(zoom));
    }

    // Drop the separator character right before the marker.
    // char_indices keeps the cut on a UTF-8 boundary.
    let before_marker = &name[..position];
    let prefix = before_marker
        .char_indices()
        .last()
        .map(|(i, _)| &before_marker[..i])
        .unwrap_or("");

    let tissue = prefix.split('-').next().unwrap_or("");
    if tissue.is_empty() {
        return Err(FilenameError::EmptyTissueType);
    }

    Ok(ParsedName { focus, zoom, tissue: tissue.to_string() })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn test_parse_typical_name() {
        let p = parse_file_name("bone-slide2-10x-focus.jpg").unwrap();
        assert_eq!(p.focus, Focus::Focused);
        assert_eq!(p.zoom, Magnification::X10);
        assert_eq!(p.tissue, "bone");
    }

    #[test]
    fn test_unfocused_when_marker_absent() {
        let p = parse_file_name("liver-40x.jpg").unwrap();
        assert_eq!(p.focus, Focus::Unfocused);
        assert_eq!(p.zoom, Magnification::X40);
        assert_eq!(p.tissue, "liver");
    }

    #[test]
    fn test_zoom_priority_beats_position() {
        // "40x" appears first in the string but "4x" wins on priority
        let p = parse_file_name("skin-40x-sample-4x.jpg").unwrap();
        assert_eq!(p.zoom, Magnification::X4);
        // type is cut before the "4x" marker
        assert_eq!(p.tissue, "skin");
    }

    #[test]
    fn test_type_without_dash_separator() {
        // the character before the marker is dropped whatever it is
        let p = parse_file_name("muscle_20x.jpg").unwrap();
        assert_eq!(p.tissue, "muscle");
    }

    #[test]
    fn test_missing_zoom_is_rejected() {
        assert_eq!(parse_file_name("bone-slide.jpg"), Err(FilenameError::MissingZoom));
    }

    #[test]
    fn test_zoom_at_start_is_rejected() {
        assert_eq!(
            parse_file_name("10x-bone.jpg"),
            Err(FilenameError::ZoomAtStart(Magnification::X10))
        );
    }

    #[test]
    fn test_empty_type_is_rejected() {
        assert_eq!(parse_file_name("-a-10x.jpg"), Err(FilenameError::EmptyTissueType));
    }

    #[test]
    fn test_scan_counts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Bone-A-10x-Focus.jpg");
        touch(dir.path(), "adipose-b-4x.jpg");
        touch(dir.path(), "Calibration-10x.jpg");
        touch(dir.path(), "blood-c-calibration-20x.jpg");
        touch(dir.path(), "nozoom-slide.jpg");
        touch(dir.path(), "notes.txt");

        let report = CorpusScanner::new(dir.path()).scan().unwrap();

        // 5 jpg files − 2 calibration = 3 = 2 records + 1 rejected
        assert_eq!(report.calibration_skipped, 2);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].reason, FilenameError::MissingZoom);

        // sorted by path: "Bone..." < "adipose..." (uppercase sorts first)
        assert_eq!(report.records[0].type_raw, "bone");
        assert_eq!(report.records[0].focus, Focus::Focused);
        assert_eq!(report.records[1].type_raw, "adipose");
        assert_eq!(report.records[1].zoom_raw, Magnification::X4);
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bone-10x.JPG");
        touch(dir.path(), "bone-20x.png");
        let report = CorpusScanner::new(dir.path()).scan().unwrap();
        assert_eq!(report.records.len(), 1);

        let report = CorpusScanner::with_extensions(dir.path(), [".jpg", "png"]).scan().unwrap();
        assert_eq!(report.records.len(), 2);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let scanner = CorpusScanner::new("/definitely/not/here");
        assert!(scanner.scan().is_err());
    }
}
