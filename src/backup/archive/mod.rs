pub mod deflate;

use crate::backup::archive::deflate::DeflateConfig;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use derive_more::From;
use function_name::named;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{is_separator, Path};
use std::result;
use validator::{Validate, ValidationErrors};
use zip::read::ZipFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Extension appended to (or substituted into) a file name to name its archive
pub static ARCHIVE_EXT: &str = ".zip";

/// Suffix of the temporary files an archive is written through
pub(crate) static TMP_SUFFIX: &str = ".tmp";

/// How the single entry of a backup archive is encoded
///
/// - Stored: entry bytes are kept as-is inside the zip container
/// - Deflated: entry bytes are deflate-compressed (default)
#[derive(Clone, From, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "method")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum ArchiveConfig {
    Stored,
    Deflated(DeflateConfig),
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig::Deflated(DeflateConfig::default())
    }
}

impl Validate for ArchiveConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            ArchiveConfig::Stored => Ok(()),
            ArchiveConfig::Deflated(inner) => inner.validate(),
        }
    }
}

/// Derives the archive name of `file_name`.
///
/// The extension of the base name is replaced by [`ARCHIVE_EXT`]. When the base
/// name has no extension (no dot, a dot that belongs to a parent directory, or
/// a leading dot as in dotfiles) the archive extension is appended instead.
///
/// Dotfiles differ from the older naming rule, which treated the leading dot as
/// the extension separator and turned `.profile` into `.zip`. Here `.profile`
/// becomes `.profile.zip`, so distinct dotfiles never share one archive name.
pub fn archive_file_name(file_name: &str) -> String {
    let base_start = file_name.rfind(is_separator).map(|p| p + 1).unwrap_or(0);
    match file_name.rfind('.') {
        Some(ext_pos) if ext_pos > base_start => {
            format!("{}{}", &file_name[..ext_pos], ARCHIVE_EXT)
        }
        _ => format!("{file_name}{ARCHIVE_EXT}"),
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

fn source_entry_name(source: &Path) -> Result<String> {
    source
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            Error::from(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{:?} has no utf-8 file name", source),
            ))
        })
}

fn restored_entry_name(entry: &ZipFile) -> Result<String> {
    if entry.is_dir() {
        return Err(Error::UnsafeEntryName(entry.name().to_owned()));
    }

    entry
        .enclosed_name()
        .filter(|p| p.components().count() == 1)
        .and_then(|p| p.to_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::UnsafeEntryName(entry.name().to_owned()))
}

impl ArchiveConfig {
    fn file_options(&self) -> FileOptions {
        match self {
            ArchiveConfig::Stored => {
                FileOptions::default().compression_method(CompressionMethod::Stored)
            }
            ArchiveConfig::Deflated(deflate) => deflate.file_options(),
        }
    }

    /// Writes `source` into a new single-entry archive at `archive`.
    ///
    /// The entry is named after the source's base file name. The archive is
    /// assembled in a temporary file next to `archive` and only persisted once
    /// complete, so a failed call leaves no archive behind. An existing file at
    /// `archive` is replaced.
    #[named]
    pub fn compress<P1: AsRef<Path>, P2: AsRef<Path>>(&self, source: P1, archive: P2) -> Result<()> {
        let source = source.as_ref();
        let archive = archive.as_ref();
        let entry_name = source_entry_name(source)?;

        let mut reader = File::open(source)
            .map(BufReader::new)
            .map_err(Error::from)
            .add_msg(format!("Open backup source {:?} failed", source))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(TMP_SUFFIX)
            .tempfile_in(parent_dir(archive))
            .map_err(Error::from)
            .add_msg(format!("Create temporary archive for {:?} failed", archive))?;

        let written = {
            let mut writer = ZipWriter::new(tmp.as_file_mut());
            writer.start_file(entry_name.as_str(), self.file_options())?;
            let written = std::io::copy(&mut reader, &mut writer)?;
            writer.finish()?;
            written
        };
        tmp.as_file().sync_all()?;

        tmp.persist(archive)
            .map_err(|e| Error::from(e.error))
            .add_fn_name(function_path!())?;

        tracing::debug!(
            "Archived {} bytes of {:?} as entry {:?} into {:?}",
            written,
            source,
            entry_name,
            archive
        );
        Ok(())
    }

    /// Extracts the first entry of `archive` into `dest_dir`.
    ///
    /// Returns the entry name, or `None` when the archive holds no entries.
    /// Further entries are ignored.
    #[named]
    pub fn decompress<P1: AsRef<Path>, P2: AsRef<Path>>(
        archive: P1,
        dest_dir: P2,
    ) -> Result<Option<String>> {
        let archive = archive.as_ref();
        let dest_dir = dest_dir.as_ref();

        let mut zip = File::open(archive)
            .map(BufReader::new)
            .map_err(Error::from)
            .and_then(|f| ZipArchive::new(f).map_err(Error::from))
            .add_msg(format!("Open archive {:?} failed", archive))?;

        match zip.len() {
            0 => {
                tracing::warn!("Archive {:?} has no entry", archive);
                return Ok(None);
            }
            1 => (),
            n => tracing::warn!(
                "Archive {:?} has {} entries, only the first one is extracted",
                archive,
                n
            ),
        }

        let mut entry = zip.by_index(0)?;
        let entry_name = restored_entry_name(&entry)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(TMP_SUFFIX)
            .tempfile_in(dest_dir)
            .map_err(Error::from)
            .add_msg(format!("Create temporary file in {:?} failed", dest_dir))?;
        let written = std::io::copy(&mut entry, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;

        let dest = dest_dir.join(&entry_name);
        tmp.persist(&dest)
            .map_err(|e| Error::from(e.error))
            .add_fn_name(function_path!())?;

        tracing::debug!("Extracted {} bytes from {:?} to {:?}", written, archive, dest);
        Ok(Some(entry_name))
    }
}
