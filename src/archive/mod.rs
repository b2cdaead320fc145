//! Zip extraction and conversion workspace layout.
//!
//! A conversion run works inside `<work_dir>/converted_<archive name>/`:
//!
//! ```text
//! converted_<archive name>/
//! ├── train_images/          every image from the archive, flattened
//! ├── validation_images/
//! ├── annotations/
//! │   ├── xml/               Pascal VOC files
//! │   ├── coco/              COCO JSON files
//! │   └── yolo/              YOLO labels plus data.yaml / classes.txt
//! ├── cocos/
//! │   ├── train_coco.json    conversion output
//! │   ├── val_coco.json      empty skeleton
//! │   └── test_coco.json     empty skeleton
//! └── extracted/             raw archive contents, removed after organizing
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::bina::{write_bina_json, BinaCoco};
use crate::detect::{probe_file, FormatTally, SourceFormat};
use crate::error::BinaCocoError;
use crate::ir::io_yolo::is_class_map_file;

/// File extensions treated as images, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Skeleton files written next to the conversion output.
const SKELETON_FILES: [&str; 2] = ["val_coco.json", "test_coco.json"];

/// Name of the conversion output inside `cocos/`.
pub const TRAIN_COCO_FILE: &str = "train_coco.json";

/// One entry of a zip archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// What exploring an archive found.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExplorationSummary {
    pub dataset_name: String,
    pub annotation_format: Option<SourceFormat>,
    pub num_images: usize,
    pub num_annotation_files: usize,
    pub format_counts: FormatTally,
}

/// Directory layout of one conversion run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workspace {
    pub dataset_name: String,
    pub root: PathBuf,
    pub train_images_dir: PathBuf,
    pub validation_images_dir: PathBuf,
    pub cocos_dir: PathBuf,
    pub annotations_dir: PathBuf,
    pub extract_dir: PathBuf,
}

impl Workspace {
    /// Creates a fresh workspace for `archive_path` under `work_dir`.
    ///
    /// A workspace left over from an earlier run of the same archive is
    /// removed first so its files can't leak into this run's counts.
    pub fn create(archive_path: &Path, work_dir: &Path) -> Result<Self, BinaCocoError> {
        let dataset_name = archive_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("archive path {} has no file name", archive_path.display()),
                )
            })?;

        let root = work_dir.join(format!("converted_{dataset_name}"));
        if root.exists() {
            log::warn!("replacing existing workspace {}", root.display());
            fs::remove_dir_all(&root)?;
        }

        let workspace = Self {
            train_images_dir: root.join("train_images"),
            validation_images_dir: root.join("validation_images"),
            cocos_dir: root.join("cocos"),
            annotations_dir: root.join("annotations"),
            extract_dir: root.join("extracted"),
            dataset_name,
            root,
        };

        for dir in [
            &workspace.train_images_dir,
            &workspace.validation_images_dir,
            &workspace.cocos_dir,
            &workspace.annotations_dir,
            &workspace.extract_dir,
        ] {
            fs::create_dir_all(dir)?;
        }

        let skeleton = BinaCoco::empty();
        for name in SKELETON_FILES {
            write_bina_json(&workspace.cocos_dir.join(name), &skeleton)?;
        }

        log::info!("created workspace {}", workspace.root.display());
        Ok(workspace)
    }

    /// Directory holding annotation files of the given format.
    pub fn format_dir(&self, format: SourceFormat) -> PathBuf {
        self.annotations_dir.join(format.dir_name())
    }

    /// Default location of the conversion output.
    pub fn train_coco_path(&self) -> PathBuf {
        self.cocos_dir.join(TRAIN_COCO_FILE)
    }
}

/// Creates a workspace, extracts the archive into it and organizes the
/// extracted files. The raw extraction directory is removed afterwards.
pub fn explore(
    archive_path: &Path,
    work_dir: &Path,
) -> Result<(Workspace, ExplorationSummary), BinaCocoError> {
    let workspace = Workspace::create(archive_path, work_dir)?;
    let extracted = extract_archive(archive_path, &workspace.extract_dir)?;
    log::info!(
        "extracted {} file(s) from {}",
        extracted,
        archive_path.display()
    );

    let summary = organize(&workspace)?;
    fs::remove_dir_all(&workspace.extract_dir)?;

    Ok((workspace, summary))
}

/// Lists the entries of a zip archive in archive order.
pub fn list_entries(archive_path: &Path) -> Result<Vec<ArchiveEntry>, BinaCocoError> {
    let mut archive = open_archive(archive_path)?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let file = archive
            .by_index(index)
            .map_err(|source| zip_error(archive_path, source))?;
        entries.push(ArchiveEntry {
            name: file.name().to_string(),
            size: file.size(),
            is_dir: file.is_dir(),
        });
    }

    Ok(entries)
}

/// Extracts every file entry of the archive below `dest`.
///
/// Entries whose names would land outside `dest` (absolute paths or `..`
/// components) abort the extraction. Returns the number of files written.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize, BinaCocoError> {
    let mut archive = open_archive(archive_path)?;
    let mut written = 0;

    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|source| zip_error(archive_path, source))?;

        let rel_path = safe_entry_path(file.name()).ok_or_else(|| {
            BinaCocoError::UnsafeArchiveEntry {
                path: archive_path.to_path_buf(),
                entry: file.name().to_string(),
            }
        })?;
        let out_path = dest.join(&rel_path);

        if file.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut file, &mut out)?;
        written += 1;
    }

    Ok(written)
}

/// Sorts the extracted files into the workspace layout and detects the
/// annotation format.
pub fn organize(workspace: &Workspace) -> Result<ExplorationSummary, BinaCocoError> {
    let mut summary = ExplorationSummary {
        dataset_name: workspace.dataset_name.clone(),
        annotation_format: None,
        num_images: 0,
        num_annotation_files: 0,
        format_counts: FormatTally::default(),
    };

    let mut planned = Vec::new();
    for path in extracted_files(&workspace.extract_dir)? {
        let rel = path
            .strip_prefix(&workspace.extract_dir)
            .unwrap_or(&path)
            .to_path_buf();

        if is_archive_junk(&rel) {
            log::debug!("skipping archive metadata {}", rel.display());
            continue;
        }

        let file_name = rel
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let kind = if has_image_extension(&path) {
            FileKind::Image
        } else if is_class_map_file(&file_name) {
            FileKind::ClassMap
        } else if let Some(format) = probe_file(&path) {
            FileKind::Annotation(format)
        } else {
            log::debug!("ignoring unrecognized file {}", rel.display());
            continue;
        };
        planned.push((path, rel, kind));
    }

    let split_stems = stems_by_top_dir(
        planned
            .iter()
            .filter(|(_, _, kind)| *kind != FileKind::ClassMap)
            .map(|(_, rel, _)| rel.as_path()),
    );

    for (path, rel, kind) in planned {
        let dest_dir = match kind {
            FileKind::Image => {
                summary.num_images += 1;
                workspace.train_images_dir.clone()
            }
            FileKind::ClassMap => workspace.format_dir(SourceFormat::Yolo),
            FileKind::Annotation(format) => {
                summary.format_counts.record(format);
                summary.num_annotation_files += 1;
                workspace.format_dir(format)
            }
        };
        let flat_name = match kind {
            FileKind::ClassMap => plain_file_name(&rel),
            _ => flattened_name(&rel, &split_stems),
        };

        fs::create_dir_all(&dest_dir)?;
        let dest = unique_path(&dest_dir, &flat_name);
        fs::rename(&path, &dest)?;
    }

    summary.annotation_format = summary.format_counts.identified();
    let formats_seen = SourceFormat::PRIORITY
        .iter()
        .filter(|format| summary.format_counts.count(**format) > 0)
        .count();
    if formats_seen > 1 {
        log::warn!(
            "archive mixes annotation formats ({:?}); using {}",
            summary.format_counts,
            summary
                .annotation_format
                .map(|format| format.name())
                .unwrap_or("none")
        );
    }

    Ok(summary)
}

fn open_archive(archive_path: &Path) -> Result<zip::ZipArchive<BufReader<File>>, BinaCocoError> {
    let file = File::open(archive_path)?;
    zip::ZipArchive::new(BufReader::new(file)).map_err(|source| zip_error(archive_path, source))
}

fn zip_error(archive_path: &Path, source: zip::result::ZipError) -> BinaCocoError {
    BinaCocoError::ZipRead {
        path: archive_path.to_path_buf(),
        source,
    }
}

/// Relative path for an entry name, or `None` if it escapes the root.
fn safe_entry_path(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut path = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!path.as_os_str().is_empty()).then_some(path)
}

/// Files below `root`, siblings in name order.
fn extracted_files(root: &Path) -> Result<Vec<PathBuf>, BinaCocoError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// macOS resource forks and Finder metadata that zip tools add.
fn is_archive_junk(rel: &Path) -> bool {
    rel.components().any(|c| c.as_os_str() == "__MACOSX")
        || rel
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("._") || name == ".DS_Store")
            .unwrap_or(false)
}

/// True for files whose extension is in [`IMAGE_EXTENSIONS`].
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileKind {
    Image,
    ClassMap,
    Annotation(SourceFormat),
}

fn plain_file_name(rel: &Path) -> String {
    rel.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(rel: &Path) -> String {
    rel.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// First directory of an archive path; `None` for top-level files.
fn top_dir(rel: &Path) -> Option<String> {
    let mut components = rel.components();
    let first = components.next()?;
    components.next()?;
    Some(first.as_os_str().to_string_lossy().into_owned())
}

/// For each file stem, the set of top-level directories holding a file
/// with that stem (`""` for the archive root).
fn stems_by_top_dir<'a>(
    rels: impl Iterator<Item = &'a Path>,
) -> HashMap<String, BTreeSet<String>> {
    let mut stems: HashMap<String, BTreeSet<String>> = HashMap::new();
    for rel in rels {
        stems
            .entry(file_stem(rel))
            .or_default()
            .insert(top_dir(rel).unwrap_or_default());
    }
    stems
}

/// Name of `rel` once flattened.
///
/// A stem found under more than one top-level directory is prefixed with
/// its directory (`valid/labels/a.txt` becomes `valid_a.txt`). The rule
/// depends only on the archive listing, so an image and its label get the
/// same prefix whether or not either name actually collides.
fn flattened_name(rel: &Path, split_stems: &HashMap<String, BTreeSet<String>>) -> String {
    let file_name = plain_file_name(rel);
    let ambiguous = split_stems
        .get(&file_stem(rel))
        .is_some_and(|tops| tops.len() > 1);
    match top_dir(rel) {
        Some(top) if ambiguous => format!("{top}_{file_name}"),
        _ => file_name,
    }
}

/// `dest_dir/name`, or `dest_dir/<stem>_<n>.<ext>` if that is taken.
fn unique_path(dest_dir: &Path, name: &str) -> PathBuf {
    let plain = dest_dir.join(name);
    if !plain.exists() {
        return plain;
    }

    let path = Path::new(name);
    let stem = file_stem(path);
    let ext = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    (1u64..)
        .map(|n| dest_dir.join(format!("{stem}_{n}{ext}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(plain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).expect("create zip");
        let mut zip = zip::ZipWriter::new(file);
        for (name, contents) in entries {
            zip.start_file(*name, SimpleFileOptions::default())
                .expect("start entry");
            zip.write_all(contents).expect("write entry");
        }
        zip.finish().expect("finish zip");
    }

    #[test]
    fn safe_entry_path_rejects_escapes() {
        assert_eq!(
            safe_entry_path("train/./a.jpg"),
            Some(PathBuf::from("train/a.jpg"))
        );
        assert_eq!(safe_entry_path("..\\evil.txt"), None);
        assert_eq!(safe_entry_path("a/../../evil.txt"), None);
        assert_eq!(safe_entry_path("/etc/passwd"), None);
        assert_eq!(safe_entry_path(""), None);
    }

    #[test]
    fn list_and_extract_entries() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let archive = temp.path().join("set.zip");
        write_zip(&archive, &[("train/a.txt", b"hello"), ("b.json", b"{}")]);

        let entries = list_entries(&archive).expect("list entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "train/a.txt");
        assert_eq!(entries[0].size, 5);

        let dest = temp.path().join("out");
        let written = extract_archive(&archive, &dest).expect("extract");
        assert_eq!(written, 2);
        assert_eq!(
            fs::read_to_string(dest.join("train/a.txt")).expect("read"),
            "hello"
        );
    }

    #[test]
    fn corrupt_archive_is_reported() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let archive = temp.path().join("broken.zip");
        fs::write(&archive, b"not a zip at all").expect("write");

        let err = list_entries(&archive).unwrap_err();
        assert!(matches!(err, BinaCocoError::ZipRead { .. }), "{err}");
    }

    #[test]
    fn workspace_has_skeletons_and_replaces_stale_runs() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let archive = temp.path().join("teeth.v1.zip");

        let first = Workspace::create(&archive, temp.path()).expect("create");
        assert_eq!(first.root, temp.path().join("converted_teeth.v1.zip"));
        fs::write(first.train_images_dir.join("stale.jpg"), b"x").expect("write stale");

        let second = Workspace::create(&archive, temp.path()).expect("recreate");
        assert!(!second.train_images_dir.join("stale.jpg").exists());
        for name in SKELETON_FILES {
            let doc = crate::bina::read_bina_json(&second.cocos_dir.join(name)).expect("read");
            assert_eq!(doc, BinaCoco::empty());
        }
    }

    #[test]
    fn shared_stems_are_prefixed_with_their_split() {
        let rels = [
            Path::new("train/images/a.bmp"),
            Path::new("valid/images/a.bmp"),
            Path::new("valid/labels/a.txt"),
            Path::new("valid/labels/b.txt"),
            Path::new("c.jpg"),
        ];
        let stems = stems_by_top_dir(rels.iter().copied());

        assert_eq!(flattened_name(rels[0], &stems), "train_a.bmp");
        assert_eq!(flattened_name(rels[1], &stems), "valid_a.bmp");
        assert_eq!(flattened_name(rels[2], &stems), "valid_a.txt");
        assert_eq!(flattened_name(rels[3], &stems), "b.txt");
        assert_eq!(flattened_name(rels[4], &stems), "c.jpg");
    }

    #[test]
    fn unique_path_counts_up_on_collision() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let dest = temp.path();
        assert_eq!(unique_path(dest, "a.jpg"), dest.join("a.jpg"));

        fs::write(dest.join("a.jpg"), b"x").expect("write");
        fs::write(dest.join("a_1.jpg"), b"x").expect("write");
        assert_eq!(unique_path(dest, "a.jpg"), dest.join("a_2.jpg"));
    }

    #[test]
    fn junk_entries_are_recognized() {
        assert!(is_archive_junk(Path::new("__MACOSX/train/._a.jpg")));
        assert!(is_archive_junk(Path::new("train/._a.jpg")));
        assert!(is_archive_junk(Path::new(".DS_Store")));
        assert!(!is_archive_junk(Path::new("train/a.jpg")));
    }
}
