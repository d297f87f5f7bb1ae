//! Collision-free output names

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use crate::error::{StudioError, Result};

const MAX_ATTEMPTS: usize = 10_000;

/// Hands out unique file names inside one output directory.
///
/// A name is claimed by creating the file exclusively, so concurrent workers
/// (or files left from an earlier run) never end up sharing a path.
#[derive(Debug, Clone)]
pub struct OutputNamespace {
    dir: PathBuf,
    suffix: String,
}

impl OutputNamespace {
    pub fn new<P: Into<PathBuf>>(dir: P, suffix: &str) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| StudioError::io(format!("Cannot create {}: {}", dir.display(), e)))?;
        Ok(Self { dir, suffix: suffix.to_string() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claim `{stem}{suffix}.{ext}`, or `{stem}{suffix}_{n}.{ext}` when taken.
    /// The returned path exists as an empty file owned by the caller.
    pub fn claim(&self, stem: &str, extension: &str) -> Result<PathBuf> {
        let stem = sanitize(stem);
        for n in 0..MAX_ATTEMPTS {
            let name = if n == 0 {
                format!("{}{}.{}", stem, self.suffix, extension)
            } else {
                format!("{}{}_{}.{}", stem, self.suffix, n, extension)
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StudioError::io(format!("Cannot create {}: {}", path.display(), e)));
                }
            }
        }
        Err(StudioError::io(format!("No free output name for '{}' in {}", stem, self.dir.display())))
    }
}

fn sanitize(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '\0') { '_' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "audio".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_disambiguates_collisions() {
        let dir = TempDir::new().unwrap();
        let ns = OutputNamespace::new(dir.path(), "_studio").unwrap();

        let first = ns.claim("take", "mp3").unwrap();
        let second = ns.claim("take", "mp3").unwrap();
        let third = ns.claim("take", "mp3").unwrap();

        assert_eq!(first.file_name().unwrap(), "take_studio.mp3");
        assert_eq!(second.file_name().unwrap(), "take_studio_1.mp3");
        assert_eq!(third.file_name().unwrap(), "take_studio_2.mp3");
    }

    #[test]
    fn test_existing_files_are_not_overwritten() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a_studio.wav"), b"keep").unwrap();
        let ns = OutputNamespace::new(dir.path(), "_studio").unwrap();

        let path = ns.claim("a", "wav").unwrap();
        assert_eq!(path.file_name().unwrap(), "a_studio_1.wav");
        assert_eq!(fs::read(dir.path().join("a_studio.wav")).unwrap(), b"keep");
    }

    #[test]
    fn test_concurrent_claims_are_unique() {
        let dir = TempDir::new().unwrap();
        let ns = Arc::new(OutputNamespace::new(dir.path().join("nested"), "").unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ns = Arc::clone(&ns);
                std::thread::spawn(move || ns.claim("same", "wav").unwrap())
            })
            .collect();
        let mut paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
    }

    #[test]
    fn test_stem_sanitized() {
        let dir = TempDir::new().unwrap();
        let ns = OutputNamespace::new(dir.path(), "_x").unwrap();
        let path = ns.claim("../escape", "wav").unwrap();
        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(sanitize(""), "audio");
    }
}
