//! Deploy packager: a site bundle in, one zip archive out.
//!
//! Output is byte-reproducible: entries are written in path order with a
//! fixed timestamp (1980-01-01) and fixed permissions, at deflate level 9.
//! Size limits are enforced here, before anything is uploaded.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Relative path to file contents, as produced by the site builder.
pub type SiteBundle = BTreeMap<String, Vec<u8>>;

/// Default single-file cap (10 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Default archive cap (50 MiB).
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 50 * 1024 * 1024;

const FILE_PERMISSIONS: u32 = 0o644;

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("Bundle contains no files")]
    EmptyBundle,

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Duplicate path '{0}'")]
    DuplicatePath(String),

    #[error("File '{path}' is {size} bytes, limit is {limit}")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("Archive is {size} bytes, limit is {limit}")]
    ArchiveTooLarge { size: u64, limit: u64 },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct PackagerConfig {
    pub max_file_bytes: u64,
    pub max_archive_bytes: u64,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
        }
    }
}

/// A packaged bundle ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub bytes: Vec<u8>,
    pub sha256: String,
    pub file_count: usize,
}

impl Archive {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Packager {
    config: PackagerConfig,
}

impl Packager {
    pub fn new(config: PackagerConfig) -> Self {
        Self { config }
    }

    /// Validate and compress `bundle`.
    ///
    /// Fails with [`PackagingError`] on an empty bundle, a bad or duplicate
    /// path (after stripping a leading `./`), a file over the single-file
    /// cap, or an archive over the archive cap.
    pub fn package(&self, bundle: &SiteBundle) -> Result<Archive, PackagingError> {
        if bundle.is_empty() {
            return Err(PackagingError::EmptyBundle);
        }

        let mut entries: BTreeMap<&str, &[u8]> = BTreeMap::new();
        for (path, contents) in bundle {
            let normalized = normalize_path(path)?;
            let size = contents.len() as u64;
            if size > self.config.max_file_bytes {
                return Err(PackagingError::FileTooLarge {
                    path: normalized.to_string(),
                    size,
                    limit: self.config.max_file_bytes,
                });
            }
            if entries.insert(normalized, contents).is_some() {
                return Err(PackagingError::DuplicatePath(normalized.to_string()));
            }
        }

        let mut bytes = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut bytes));
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(9))
                .last_modified_time(zip::DateTime::default())
                .unix_permissions(FILE_PERMISSIONS);

            for (path, contents) in &entries {
                zip.start_file(*path, options)?;
                zip.write_all(contents)?;
            }
            zip.finish()?;
        }

        let size = bytes.len() as u64;
        if size > self.config.max_archive_bytes {
            return Err(PackagingError::ArchiveTooLarge {
                size,
                limit: self.config.max_archive_bytes,
            });
        }

        Ok(Archive {
            sha256: format!("{:x}", Sha256::digest(&bytes)),
            file_count: entries.len(),
            bytes,
        })
    }
}

/// Strip a leading `./` and reject anything that is not a plain relative path.
fn normalize_path(path: &str) -> Result<&str, PackagingError> {
    let invalid = |reason| PackagingError::InvalidPath {
        path: path.to_string(),
        reason,
    };
    let trimmed = path.strip_prefix("./").unwrap_or(path);
    if trimmed.is_empty() {
        return Err(invalid("empty path"));
    }
    if trimmed.starts_with('/') {
        return Err(invalid("must be relative"));
    }
    if trimmed.contains('\\') {
        return Err(invalid("backslash separator"));
    }
    if trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("empty, '.' or '..' segment"));
    }
    Ok(trimmed)
}
