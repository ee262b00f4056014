//! Selection validation and multi-file bundling
//!
//! A drop carries exactly one payload. One selected file is sent as-is; two
//! or more are packed into a single deflate ZIP first. The archive is written
//! to a temporary file on disk, never to a buffer, so a 5 GiB selection does
//! not need 5 GiB of memory.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ddrop_core::config::LimitsConfig;
use ddrop_core::{DropError, DropResult, FileEntry};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Deflate level for bundles: balanced speed/ratio
pub const BUNDLE_COMPRESSION_LEVEL: i64 = 6;

/// A file picked for sending, stat'ed once up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    /// Base name used in the manifest and inside the archive
    pub name: String,
    pub size: u64,
}

impl SelectedFile {
    pub fn entry(&self) -> FileEntry {
        FileEntry {
            name: self.name.clone(),
            size: self.size,
        }
    }
}

/// Limits on what one drop may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionLimits {
    pub max_files: usize,
    pub max_file_size: u64,
    pub max_total_size: u64,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for SelectionLimits {
    fn from(cfg: &LimitsConfig) -> Self {
        Self {
            max_files: cfg.max_files,
            max_file_size: cfg.max_file_size,
            max_total_size: cfg.max_total_size,
        }
    }
}

/// Check a selection against the limits. Nothing is read or created.
///
/// Order of checks: count, then each file, then the total, so the error
/// names the first constraint a user would have to fix.
pub fn validate_selection(files: &[FileEntry], limits: &SelectionLimits) -> DropResult<()> {
    if files.is_empty() {
        return Err(DropError::NoFiles);
    }
    if files.len() > limits.max_files {
        return Err(DropError::TooManyFiles {
            count: files.len(),
            max: limits.max_files,
        });
    }

    let mut seen = HashSet::new();
    for f in files {
        if f.size > limits.max_file_size {
            return Err(DropError::FileTooLarge {
                name: f.name.clone(),
                size: f.size,
                max: limits.max_file_size,
            });
        }
        if !seen.insert(f.name.as_str()) {
            return Err(DropError::DuplicateFileName(f.name.clone()));
        }
    }

    let total: u64 = files.iter().map(|f| f.size).sum();
    if total > limits.max_total_size {
        return Err(DropError::SelectionTooLarge {
            total,
            max: limits.max_total_size,
        });
    }
    Ok(())
}

/// Stat each path and build the selection. Directories are refused.
pub fn select_files(paths: &[PathBuf]) -> DropResult<Vec<SelectedFile>> {
    paths
        .iter()
        .map(|path| {
            let meta = std::fs::metadata(path)
                .map_err(|e| DropError::io(format!("stat {}", path.display()), e))?;
            if !meta.is_file() {
                return Err(DropError::io(
                    format!("selecting {}", path.display()),
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
                ));
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    DropError::io(
                        format!("selecting {}", path.display()),
                        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
                    )
                })?;
            Ok(SelectedFile {
                path: path.clone(),
                name,
                size: meta.len(),
            })
        })
        .collect()
}

/// Progress events while bundling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleEvent {
    /// File `index` (0-based) of `total` was written into the archive
    FileAdded { index: usize, total: usize, name: String },
    /// The archive is complete
    Completed { bundle_size: u64 },
}

/// Bundling observer; borrowed for the duration of one `build_bundle` call
pub type BundleProgressFn<'a> = dyn Fn(BundleEvent) + Send + Sync + 'a;

/// The single payload of a drop
#[derive(Debug)]
pub struct Bundle {
    name: String,
    path: PathBuf,
    size: u64,
    is_zip: bool,
    original_files: Vec<FileEntry>,
    // keeps the archive alive; deleted on drop
    _archive: Option<NamedTempFile>,
}

impl Bundle {
    /// Display name (the file's own name, or the generated archive name)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_zip(&self) -> bool {
        self.is_zip
    }

    pub fn original_files(&self) -> &[FileEntry] {
        &self.original_files
    }

    /// Open the payload for one streaming pass. Each call starts at byte 0.
    pub fn open(&self) -> DropResult<BufReader<File>> {
        File::open(&self.path)
            .map(BufReader::new)
            .map_err(|e| DropError::io(format!("opening payload {}", self.path.display()), e))
    }
}

/// Generate a date-stamped, collision-free archive name.
pub fn bundle_name() -> String {
    let date = chrono::Utc::now().format("%Y-%m-%d");
    let tag = uuid::Uuid::new_v4().simple().to_string();
    format!("deaddrop_{date}_{}.zip", &tag[..8])
}

/// Validate the selection, then pass one file through or ZIP several.
pub fn build_bundle(
    files: &[SelectedFile],
    limits: &SelectionLimits,
    progress: Option<&BundleProgressFn<'_>>,
) -> DropResult<Bundle> {
    let entries: Vec<FileEntry> = files.iter().map(SelectedFile::entry).collect();
    validate_selection(&entries, limits)?;

    if let [single] = files {
        debug!(name = %single.name, size = single.size, "single file: no bundling");
        if let Some(cb) = progress {
            cb(BundleEvent::FileAdded {
                index: 0,
                total: 1,
                name: single.name.clone(),
            });
            cb(BundleEvent::Completed {
                bundle_size: single.size,
            });
        }
        return Ok(Bundle {
            name: single.name.clone(),
            path: single.path.clone(),
            size: single.size,
            is_zip: false,
            original_files: entries,
            _archive: None,
        });
    }

    let archive = NamedTempFile::new().map_err(|e| DropError::io("creating bundle temp file", e))?;
    let out = archive
        .reopen()
        .map_err(|e| DropError::io("opening bundle temp file", e))?;
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(BUNDLE_COMPRESSION_LEVEL));

    let total = files.len();
    for (index, file) in files.iter().enumerate() {
        let mut src = File::open(&file.path)
            .map_err(|e| DropError::io(format!("opening {}", file.path.display()), e))?;
        zip.start_file(file.name.as_str(), options)
            .map_err(|e| zip_error(&file.name, e))?;
        std::io::copy(&mut src, &mut zip)
            .map_err(|e| DropError::io(format!("archiving {}", file.path.display()), e))?;

        debug!(name = %file.name, index, total, "added to bundle");
        if let Some(cb) = progress {
            cb(BundleEvent::FileAdded {
                index,
                total,
                name: file.name.clone(),
            });
        }
    }
    zip.finish().map_err(|e| zip_error("central directory", e))?;

    let size = archive
        .as_file()
        .metadata()
        .map_err(|e| DropError::io("stat bundle", e))?
        .len();
    let name = bundle_name();
    let input_bytes: u64 = entries.iter().map(|e| e.size).sum();
    info!(name = %name, files = total, input_bytes, bundle_bytes = size, "bundle built");

    if let Some(cb) = progress {
        cb(BundleEvent::Completed { bundle_size: size });
    }

    Ok(Bundle {
        name,
        path: archive.path().to_path_buf(),
        size,
        is_zip: true,
        original_files: entries,
        _archive: Some(archive),
    })
}

/// Unpack a received bundle into `dest`. Entries that would escape `dest`
/// are refused.
pub fn extract_bundle(archive_path: &Path, dest: &Path) -> DropResult<Vec<FileEntry>> {
    let file = File::open(archive_path)
        .map_err(|e| DropError::io(format!("opening {}", archive_path.display()), e))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| zip_error("archive", e))?;
    std::fs::create_dir_all(dest)
        .map_err(|e| DropError::io(format!("creating {}", dest.display()), e))?;

    let mut extracted = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| zip_error("entry", e))?;
        let rel = entry.enclosed_name().ok_or_else(|| {
            DropError::integrity(
                ddrop_core::ObjectRef::Payload,
                format!("archive entry {:?} escapes the destination", entry.name()),
            )
        })?;
        if entry.is_dir() {
            continue;
        }
        let out_path = dest.join(&rel);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DropError::io(format!("creating {}", parent.display()), e))?;
        }
        let mut out = File::create(&out_path)
            .map_err(|e| DropError::io(format!("creating {}", out_path.display()), e))?;
        let size = std::io::copy(&mut entry, &mut out)
            .map_err(|e| DropError::io(format!("extracting {}", out_path.display()), e))?;
        extracted.push(FileEntry {
            name: rel.to_string_lossy().into_owned(),
            size,
        });
    }
    Ok(extracted)
}

fn zip_error(what: &str, e: zip::result::ZipError) -> DropError {
    DropError::io(format!("zip {what}"), std::io::Error::other(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn entry(name: &str, size: u64) -> FileEntry {
        FileEntry {
            name: name.into(),
            size,
        }
    }

    #[test]
    fn six_files_is_too_many() {
        let files: Vec<FileEntry> = (0..6).map(|i| entry(&format!("f{i}"), 10)).collect();
        assert!(matches!(
            validate_selection(&files, &SelectionLimits::default()),
            Err(DropError::TooManyFiles { count: 6, max: 5 })
        ));
    }

    #[test]
    fn three_gib_single_file_is_too_large() {
        let err = validate_selection(&[entry("movie.mkv", 3 * GIB)], &SelectionLimits::default())
            .unwrap_err();
        match err {
            DropError::FileTooLarge { name, .. } => assert_eq!(name, "movie.mkv"),
            other => panic!("expected FileTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn five_files_of_1_1_gib_exceed_total() {
        let each = GIB + GIB / 10;
        let files: Vec<FileEntry> = (0..5).map(|i| entry(&format!("part{i}"), each)).collect();
        assert!(matches!(
            validate_selection(&files, &SelectionLimits::default()),
            Err(DropError::SelectionTooLarge { .. })
        ));
    }

    #[test]
    fn empty_and_duplicate_selections() {
        let limits = SelectionLimits::default();
        assert!(matches!(validate_selection(&[], &limits), Err(DropError::NoFiles)));
        assert!(matches!(
            validate_selection(&[entry("a.txt", 1), entry("a.txt", 2)], &limits),
            Err(DropError::DuplicateFileName(_))
        ));
    }

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn single_file_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "notes.txt", b"just one file");
        let selected = select_files(&[path.clone()]).unwrap();

        let bundle = build_bundle(&selected, &SelectionLimits::default(), None).unwrap();
        assert!(!bundle.is_zip());
        assert_eq!(bundle.name(), "notes.txt");
        assert_eq!(bundle.path(), path.as_path());
        assert_eq!(bundle.size(), 13);
    }

    #[test]
    fn multiple_files_bundle_and_extract() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", b"alpha alpha alpha");
        let b = write(dir.path(), "b.bin", &vec![0xEEu8; 50_000]);
        let selected = select_files(&[a, b]).unwrap();

        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = events.clone();
        let progress: &BundleProgressFn<'_> = &move |ev: BundleEvent| sink.lock().unwrap().push(ev);

        let bundle = build_bundle(&selected, &SelectionLimits::default(), Some(progress)).unwrap();
        assert!(bundle.is_zip());
        assert!(bundle.name().starts_with("deaddrop_") && bundle.name().ends_with(".zip"));
        assert_eq!(bundle.original_files().len(), 2);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], BundleEvent::Completed { .. }));

        let out = dir.path().join("out");
        let mut extracted = extract_bundle(bundle.path(), &out).unwrap();
        extracted.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(extracted, vec![entry("a.txt", 17), entry("b.bin", 50_000)]);
        assert_eq!(std::fs::read(out.join("a.txt")).unwrap(), b"alpha alpha alpha");
    }

    #[test]
    fn bundle_temp_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a", b"1");
        let b = write(dir.path(), "b", b"2");
        let bundle =
            build_bundle(&select_files(&[a, b]).unwrap(), &SelectionLimits::default(), None)
                .unwrap();
        let path = bundle.path().to_path_buf();
        assert!(path.exists());
        drop(bundle);
        assert!(!path.exists());
    }

    #[test]
    fn bundle_names_do_not_collide() {
        assert_ne!(bundle_name(), bundle_name());
    }
}
