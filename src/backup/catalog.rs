use crate::backup::archive::ARCHIVE_EXT;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use crate::backup::rotation::BAK_EXT;
use function_name::named;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Whether `file_name` follows the backup archive naming convention.
///
/// Matches, ignoring case, names ending with the archive extension and
/// names ending with the archive extension followed by `.bak` and two digits.
pub fn is_backup_file_name<S: AsRef<str>>(file_name: S) -> bool {
    let lower = file_name.as_ref().to_lowercase();
    if lower.ends_with(ARCHIVE_EXT) {
        return true;
    }

    let Some(prefix) = lower.len().checked_sub(2).and_then(|i| lower.get(..i)) else {
        return false;
    };
    let digits = &lower[prefix.len()..];
    digits.bytes().all(|b| b.is_ascii_digit())
        && prefix
            .strip_suffix(BAK_EXT)
            .and_then(|p| p.strip_suffix('.'))
            .is_some_and(|p| p.ends_with(ARCHIVE_EXT))
}

/// Lists the regular files directly inside `folder` whose name satisfies
/// `predicate`.
///
/// Returns `None` when `folder` does not exist and an error when it is not a
/// directory or cannot be read. Paths are absolute and come in directory
/// listing order.
#[named]
pub fn list_matching<P, F>(folder: P, predicate: F) -> Result<Option<Vec<PathBuf>>>
where
    P: AsRef<Path>,
    F: Fn(&str) -> bool,
{
    let folder = folder.as_ref();
    if !folder.exists() {
        tracing::debug!("Backup folder {:?} does not exist", folder);
        return Ok(None);
    }
    if !folder.is_dir() {
        return Err(Error::from(std::io::Error::other(format!(
            "{:?} is not a directory",
            folder
        ))))
        .add_fn_name(function_path!());
    }

    let folder = std::path::absolute(folder)?;
    let mut matched = Vec::new();
    for entry in WalkDir::new(&folder).min_depth(1).max_depth(1) {
        let entry = entry.map_err(Error::from).add_fn_name(function_path!())?;
        if !entry.file_type().is_file() {
            continue;
        }

        match entry.file_name().to_str() {
            Some(name) if predicate(name) => {
                tracing::trace!("Including {:?}", entry.path());
                matched.push(entry.into_path());
            }
            _ => tracing::trace!("Skipping {:?}", entry.path()),
        }
    }

    Ok(Some(matched))
}

pub fn list_backup_files<P: AsRef<Path>>(folder: P) -> Result<Option<Vec<PathBuf>>> {
    list_matching(folder, |name| is_backup_file_name(name))
}
