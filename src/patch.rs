use crate::ini::{parse_bytes, serialize, IniError};
use crate::rules::{diagnose, rewrite, Change, Rewrite, Ruleset, Warning};
use crate::version::{self, DottedVersion, PatchReason, VersionCheck};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: IniError,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} changed while it was being patched; it was left untouched (backup at {backup})")]
    SourceChanged { path: PathBuf, backup: PathBuf },
}

/// Byte storage used by the patch workflow.
pub trait Store {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the contents of `path` in one step.
    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    /// Give `to` the permissions and modification time of `from`.
    fn copy_metadata(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskStore;

impl Store for DiskStore {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        atomic_write(path, content)
    }

    fn copy_metadata(&self, from: &Path, to: &Path) -> io::Result<()> {
        let metadata = fs::metadata(from)?;
        fs::set_permissions(to, metadata.permissions())?;
        let mtime = filetime::FileTime::from_last_modification_time(&metadata);
        filetime::set_file_mtime(to, mtime)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    /// Compute the patched text but write nothing.
    pub preview: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome says whether the file was written"]
pub enum PatchOutcome {
    /// The file already targets the requested version; nothing was written.
    AlreadyPatched { found: DottedVersion },
    /// The file was rewritten and its previous contents saved to `backup`.
    Patched { reason: PatchReason, backup: PathBuf },
    /// Preview mode: the patched text was computed but not written.
    Previewed { reason: PatchReason },
}

/// Everything a caller needs to report on one file.
#[derive(Debug, Clone)]
pub struct PatchReport {
    pub path: PathBuf,
    pub outcome: PatchOutcome,
    pub changes: Vec<Change>,
    pub warnings: Vec<Warning>,
    pub original: String,
    /// Text after patching; equal to `original` when nothing was done.
    pub patched: String,
}

impl PatchReport {
    pub fn is_noop(&self) -> bool {
        matches!(self.outcome, PatchOutcome::AlreadyPatched { .. })
    }
}

/// `<path>.bak`, next to the source.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// Patch `path` on disk.
pub fn patch_file(
    path: &Path,
    rules: &Ruleset,
    options: PatchOptions,
) -> Result<PatchReport, PatchError> {
    patch_with(&DiskStore, path, rules, options)
}

/// Patch `path` through `store`.
///
/// The backup is written before the source is touched, and the source is only
/// replaced if it still holds the bytes that were patched.
pub fn patch_with<S: Store + ?Sized>(
    store: &S,
    path: &Path,
    rules: &Ruleset,
    options: PatchOptions,
) -> Result<PatchReport, PatchError> {
    tracing::debug!(path = %path.display(), "reading");
    let original_bytes = store.read(path).map_err(|source| read_error(path, source))?;
    let doc = parse_bytes(&original_bytes).map_err(|source| PatchError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let original = String::from_utf8_lossy(&original_bytes).into_owned();
    let warnings = diagnose(&doc);

    let reason = match version::check(&doc, &rules.target_version) {
        VersionCheck::AlreadyPatched { found } => {
            tracing::debug!(path = %path.display(), %found, "already patched");
            return Ok(PatchReport {
                path: path.to_path_buf(),
                outcome: PatchOutcome::AlreadyPatched { found },
                changes: Vec::new(),
                warnings,
                patched: original.clone(),
                original,
            });
        }
        VersionCheck::NeedsPatch(reason) => reason,
    };
    tracing::debug!(path = %path.display(), %reason, "needs patch");

    let Rewrite { document, changes } = rewrite(doc, rules);
    let patched = serialize(&document);

    if options.preview {
        return Ok(PatchReport {
            path: path.to_path_buf(),
            outcome: PatchOutcome::Previewed { reason },
            changes,
            warnings,
            original,
            patched,
        });
    }

    let backup = backup_path(path);
    tracing::debug!(backup = %backup.display(), "writing backup");
    store
        .write(&backup, &original_bytes)
        .map_err(|source| PatchError::Write {
            path: backup.clone(),
            source,
        })?;
    if let Err(err) = store.copy_metadata(path, &backup) {
        tracing::warn!(backup = %backup.display(), error = %err, "could not copy file metadata");
    }

    let current = store.read(path).map_err(|source| read_error(path, source))?;
    if xxh3_64(&current) != xxh3_64(&original_bytes) {
        return Err(PatchError::SourceChanged {
            path: path.to_path_buf(),
            backup,
        });
    }

    tracing::debug!(path = %path.display(), "writing patched file");
    store
        .write(path, patched.as_bytes())
        .map_err(|source| PatchError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(PatchReport {
        path: path.to_path_buf(),
        outcome: PatchOutcome::Patched { reason, backup },
        changes,
        warnings,
        original,
        patched,
    })
}

fn read_error(path: &Path, source: io::Error) -> PatchError {
    if source.kind() == io::ErrorKind::NotFound {
        PatchError::FileNotFound(path.to_path_buf())
    } else {
        PatchError::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the destination is unchanged. An existing
/// destination keeps its permissions.
fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    // Same directory, so the rename stays on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    if let Ok(existing) = fs::metadata(path) {
        fs::set_permissions(temp.path(), existing.permissions())?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Ruleset {
        Ruleset::builtin().unwrap()
    }

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(backup_path(Path::new("data/system.def")), PathBuf::from("data/system.def.bak"));
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.def");
        fs::write(&path, b"old").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn patches_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.def");
        fs::write(&path, "[Info]\nname=Pack\n").unwrap();

        let report = patch_file(&path, &rules(), PatchOptions::default()).unwrap();
        assert!(matches!(report.outcome, PatchOutcome::Patched { .. }));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[Info]\nname = Pack\nikemenversion = 1.0\n"
        );
        assert_eq!(
            fs::read_to_string(backup_path(&path)).unwrap(),
            "[Info]\nname=Pack\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn patch_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.def");
        fs::write(&path, "[Info]\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        patch_file(&path, &rules(), PatchOptions::default()).unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), 0o640);
        assert_eq!(mode(&backup_path(&path)), 0o640);
    }

    #[test]
    fn preview_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.def");
        fs::write(&path, "[Info]\n").unwrap();

        let report = patch_file(&path, &rules(), PatchOptions { preview: true }).unwrap();
        assert!(matches!(report.outcome, PatchOutcome::Previewed { .. }));
        assert_eq!(report.patched, "[Info]\nikemenversion = 1.0\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "[Info]\n");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = patch_file(&dir.path().join("nope.def"), &rules(), PatchOptions::default())
            .unwrap_err();
        assert!(matches!(err, PatchError::FileNotFound(_)));
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.def");
        fs::write(&path, b"[Info]\nname = \xff\n").unwrap();
        let err = patch_file(&path, &rules(), PatchOptions::default()).unwrap_err();
        assert!(matches!(err, PatchError::Decode { .. }));
        assert!(!backup_path(&path).exists());
    }
}
