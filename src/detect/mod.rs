//! Source format detection.
//!
//! Detection is per file: the extension picks which probe to run, and the
//! probe checks the file's structure. An archive's format is whichever
//! format the most files were recognized as.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;

/// An annotation schema this tool can read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SourceFormat {
    #[serde(rename = "COCO")]
    Coco,
    #[serde(rename = "Pascal VOC")]
    PascalVoc,
    #[serde(rename = "YOLO")]
    Yolo,
}

impl SourceFormat {
    /// Tie-break order when two formats have the same number of files.
    pub const PRIORITY: [SourceFormat; 3] =
        [SourceFormat::Coco, SourceFormat::PascalVoc, SourceFormat::Yolo];

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            SourceFormat::Coco => "COCO",
            SourceFormat::PascalVoc => "Pascal VOC",
            SourceFormat::Yolo => "YOLO",
        }
    }

    /// Directory under `annotations/` where files of this format are kept.
    pub fn dir_name(&self) -> &'static str {
        match self {
            SourceFormat::Coco => "coco",
            SourceFormat::PascalVoc => "xml",
            SourceFormat::Yolo => "yolo",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identify the annotation format of a single file, if any.
pub fn probe_file(path: &Path) -> Option<SourceFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "xml" if is_pascal_voc(path) => Some(SourceFormat::PascalVoc),
        "json" if is_coco(path) => Some(SourceFormat::Coco),
        "txt" if is_yolo(path) => Some(SourceFormat::Yolo),
        _ => None,
    }
}

/// An XML document rooted at `<annotation>` with at least one `<object>`.
pub fn is_pascal_voc(path: &Path) -> bool {
    let Ok(xml) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(document) = roxmltree::Document::parse(&xml) else {
        return false;
    };
    let root = document.root_element();
    root.tag_name().name() == "annotation"
        && root
            .children()
            .any(|child| child.is_element() && child.tag_name().name() == "object")
}

/// A JSON object carrying `images`, `annotations` and `categories`.
pub fn is_coco(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(map)) => ["images", "annotations", "categories"]
            .iter()
            .all(|key| map.contains_key(*key)),
        _ => false,
    }
}

/// At least one line of exactly five unsigned decimal numbers.
pub fn is_yolo(path: &Path) -> bool {
    let Ok(content) = fs::read_to_string(path) else {
        return false;
    };
    content.lines().any(is_yolo_row)
}

fn is_yolo_row(line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().take(6).collect();
    tokens.len() == 5 && tokens.iter().all(|token| is_unsigned_decimal(token))
}

/// Digits with at most one decimal point, e.g. `3`, `0.25`, `.5`.
fn is_unsigned_decimal(token: &str) -> bool {
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in token.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

/// Per-format counts of recognized annotation files.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FormatTally {
    pub coco: usize,
    pub pascal_voc: usize,
    pub yolo: usize,
}

impl FormatTally {
    pub fn record(&mut self, format: SourceFormat) {
        *self.slot(format) += 1;
    }

    pub fn count(&self, format: SourceFormat) -> usize {
        match format {
            SourceFormat::Coco => self.coco,
            SourceFormat::PascalVoc => self.pascal_voc,
            SourceFormat::Yolo => self.yolo,
        }
    }

    pub fn total(&self) -> usize {
        self.coco + self.pascal_voc + self.yolo
    }

    /// The format with the most files; ties go to [`SourceFormat::PRIORITY`]
    /// order. `None` if nothing was recognized.
    pub fn identified(&self) -> Option<SourceFormat> {
        let mut best: Option<SourceFormat> = None;
        for format in SourceFormat::PRIORITY {
            let count = self.count(format);
            if count == 0 {
                continue;
            }
            match best {
                Some(current) if self.count(current) >= count => {}
                _ => best = Some(format),
            }
        }
        best
    }

    fn slot(&mut self, format: SourceFormat) -> &mut usize {
        match format {
            SourceFormat::Coco => &mut self.coco,
            SourceFormat::PascalVoc => &mut self.pascal_voc,
            SourceFormat::Yolo => &mut self.yolo,
        }
    }
}
