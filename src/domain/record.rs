// ============================================================
// Layer 3 — Image Record Domain Types
// ============================================================
// One scanned microscopy image and the three labels derived
// from its file name:
//
//   adipose-sample3-10x-focus.jpg
//   └──┬──┘         └┬┘ └─┬─┘
//    type          zoom  focus
//
// ImageRecord holds the raw label values (as found on disk).
// IndexedRecord holds the same labels converted to dense class
// indices once the vocabularies have been built.
//
// Reference: Rust Book §5 (Structs), §6 (Enums)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ─── Focus ────────────────────────────────────────────────────────────────────
/// Binary focus quality. The discriminant IS the class index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    Focused   = 0,
    Unfocused = 1,
}

impl Focus {
    /// Both focus classes in index order
    pub const ALL: [Focus; 2] = [Focus::Focused, Focus::Unfocused];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// The status word used in prompts and responses
    pub fn status(self) -> &'static str {
        match self {
            Focus::Focused   => "focused",
            Focus::Unfocused => "unfocused",
        }
    }
}

impl fmt::Display for Focus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status())
    }
}

// ─── Magnification ────────────────────────────────────────────────────────────
/// Objective magnification. Ordering follows the numeric value,
/// which is what the zoom vocabulary is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum Magnification {
    X4,
    X10,
    X20,
    X40,
}

impl Magnification {
    /// Detection priority used by the filename parser.
    /// The first marker present in the name wins, regardless of
    /// where in the name it appears.
    pub const PRIORITY: [Magnification; 4] = [
        Magnification::X4,
        Magnification::X10,
        Magnification::X20,
        Magnification::X40,
    ];

    pub fn value(self) -> u32 {
        match self {
            Magnification::X4  => 4,
            Magnification::X10 => 10,
            Magnification::X20 => 20,
            Magnification::X40 => 40,
        }
    }

    pub fn from_value(value: u32) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|m| m.value() == value)
    }

    /// The filename marker, e.g. "10x"
    pub fn marker(self) -> &'static str {
        match self {
            Magnification::X4  => "4x",
            Magnification::X10 => "10x",
            Magnification::X20 => "20x",
            Magnification::X40 => "40x",
        }
    }
}

impl fmt::Display for Magnification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

impl From<Magnification> for u32 {
    fn from(m: Magnification) -> u32 {
        m.value()
    }
}

impl TryFrom<u32> for Magnification {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_value(value).ok_or_else(|| format!("unsupported magnification {value}x"))
    }
}

// ─── ImageRecord ──────────────────────────────────────────────────────────────
/// One scanned file with its raw labels.
/// Calibration images never become records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path:     PathBuf,
    pub focus:    Focus,
    pub zoom_raw: Magnification,
    /// Lowercase tissue label taken from the filename prefix
    pub type_raw: String,
}

impl ImageRecord {
    pub fn new(
        path:     impl Into<PathBuf>,
        focus:    Focus,
        zoom_raw: Magnification,
        type_raw: impl Into<String>,
    ) -> Self {
        Self {
            path:     path.into(),
            focus,
            zoom_raw,
            type_raw: type_raw.into(),
        }
    }
}

// ─── IndexedRecord ────────────────────────────────────────────────────────────
/// A record whose labels have been mapped into the dense index
/// spaces of the corpus vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub image_path: PathBuf,
    pub focus_idx:  usize,
    pub zoom_idx:   usize,
    pub type_idx:   usize,
}

// ─── Scan Outcome ─────────────────────────────────────────────────────────────
/// Why a file name could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FilenameError {
    #[error("no magnification marker (4x, 10x, 20x, 40x) in file name")]
    MissingZoom,
    #[error("magnification marker '{0}' starts the file name, no tissue prefix")]
    ZoomAtStart(Magnification),
    #[error("empty tissue type before the first '-'")]
    EmptyTissueType,
    #[error("file name is not valid UTF-8")]
    NonUtf8,
}

/// A file that matched the extension filter but was quarantined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedFile {
    pub path:   PathBuf,
    pub reason: FilenameError,
}

/// Everything a corpus scan found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub records:  Vec<ImageRecord>,
    pub rejected: Vec<RejectedFile>,
    /// Files skipped because their name contains "calibration"
    pub calibration_skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnification_orders_by_value() {
        let mut zooms = vec![Magnification::X40, Magnification::X4, Magnification::X20];
        zooms.sort();
        assert_eq!(zooms, vec![Magnification::X4, Magnification::X20, Magnification::X40]);
    }

    #[test]
    fn test_magnification_serialises_as_number() {
        let json = serde_json::to_string(&Magnification::X10).unwrap();
        assert_eq!(json, "10");
        let back: Magnification = serde_json::from_str("40").unwrap();
        assert_eq!(back, Magnification::X40);
        assert!(serde_json::from_str::<Magnification>("15").is_err());
    }

    #[test]
    fn test_focus_index_round_trip() {
        for f in Focus::ALL {
            assert_eq!(Focus::from_index(f.index()), Some(f));
        }
        assert_eq!(Focus::from_index(2), None);
    }
}
