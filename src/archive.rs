//! Bundling of batch outputs into one downloadable zip

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use log::info;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};
use crate::batch::{BatchResult, JobOutcome};
use crate::error::{StudioError, Result};

pub const ARCHIVE_PREFIX: &str = "enhanced_audios";
pub const MANIFEST_NAME: &str = "manifest.toml";

/// Collects `(name, path)` pairs into one archive and returns its location.
pub trait Archiver {
    fn archive(&self, items: &[(String, PathBuf)]) -> Result<PathBuf>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub created_unix: i64,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub source: PathBuf,
    pub bytes: u64,
}

/// Writes `<root>/enhanced_audios_YYYYMMDD_HHMMSS.zip` with one deflated
/// entry per file plus a `manifest.toml` entry listing them.
#[derive(Debug, Clone)]
pub struct ZipArchiver {
    root: PathBuf,
}

impl ZipArchiver {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn archive_at(&self, items: &[(String, PathBuf)], now: OffsetDateTime) -> Result<PathBuf> {
        let (path, file) = self.create_archive_file(&archive_stem(now))?;
        match write_entries(file, items, now) {
            Ok(count) => {
                info!("Archived {} file(s) into {}", count, path.display());
                Ok(path)
            }
            Err(e) => {
                let _ = fs::remove_file(&path);
                Err(e)
            }
        }
    }

    fn create_archive_file(&self, stem: &str) -> Result<(PathBuf, File)> {
        fs::create_dir_all(&self.root)?;
        let mut candidate = self.root.join(format!("{}.zip", stem));
        let mut n = 1;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    candidate = self.root.join(format!("{}_{}.zip", stem, n));
                    n += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Archiver for ZipArchiver {
    fn archive(&self, items: &[(String, PathBuf)]) -> Result<PathBuf> {
        self.archive_at(items, OffsetDateTime::now_utc())
    }
}

fn write_entries(file: File, items: &[(String, PathBuf)], now: OffsetDateTime) -> Result<usize> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let mut used = HashSet::new();
    let mut files = Vec::with_capacity(items.len());
    for (name, source) in items {
        let name = unique_name(name, &mut used);
        let mut input = File::open(source).map_err(|e| {
            StudioError::io(format!("Cannot read {} for archive: {}", source.display(), e))
        })?;
        zip.start_file(name.as_str(), options).map_err(zip_error)?;
        let bytes = io::copy(&mut input, &mut zip)?;
        files.push(ManifestEntry { name, source: source.clone(), bytes });
    }

    let count = files.len();
    let manifest = Manifest { created_unix: now.unix_timestamp(), files };
    let content = toml::to_string_pretty(&manifest)
        .map_err(|e| StudioError::io(format!("Failed to serialize manifest: {}", e)))?;
    zip.start_file(MANIFEST_NAME, options).map_err(zip_error)?;
    io::Write::write_all(&mut zip, content.as_bytes())?;

    zip.finish().map_err(zip_error)?;
    Ok(count)
}

fn zip_error(e: zip::result::ZipError) -> StudioError {
    StudioError::io(format!("Archive write failed: {}", e))
}

/// Archive entries for every written output of a batch, in submission order.
pub fn batch_items(result: &BatchResult) -> Vec<(String, PathBuf)> {
    result
        .in_submission_order()
        .into_iter()
        .filter_map(|report| match &report.outcome {
            JobOutcome::Succeeded(output) => output.output_path.as_deref(),
            JobOutcome::Failed(_) => None,
        })
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            Some((name, path.to_path_buf()))
        })
        .collect()
}

fn archive_stem(now: OffsetDateTime) -> String {
    format!(
        "{}_{:04}{:02}{:02}_{:02}{:02}{:02}",
        ARCHIVE_PREFIX,
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    let path = Path::new(name);
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "file".to_string());
    let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();

    let mut candidate = format!("{}{}", stem, ext);
    let mut n = 1;
    while !used.insert(candidate.clone()) || candidate == MANIFEST_NAME {
        candidate = format!("{}_{}{}", stem, n, ext);
        n += 1;
    }
    candidate
}
