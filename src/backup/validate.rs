//! Validation functions for configuration values.
//!
//! Provides custom validation functions for backup file names, folders
//! and archive settings.

use crate::backup::archive::{archive_file_name, ArchiveConfig};
use sanitize_filename::{is_sanitized, sanitize};
use validator::{Validate, ValidationError};

use std::path::Path;

pub fn validate_valid_backup_file_name<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() || !is_sanitized(name) {
        return Err(ValidationError::new("InvalidBackupFileName").with_message(
            format!("Invalid file name, try sanitizing like {:?}", sanitize(name)).into(),
        ));
    }

    if archive_file_name(name) == name {
        return Err(ValidationError::new("InvalidBackupFileName").with_message(
            format!("{:?} would be overwritten by its own archive", name).into(),
        ));
    }

    Ok(())
}

pub fn validate_not_a_file<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() && !dir.is_dir() {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} is not a directory", dir).into()));
    }

    Ok(())
}

pub fn validate_archive_config(archive: &ArchiveConfig) -> Result<(), ValidationError> {
    archive.validate().map_err(|e| {
        ValidationError::new("InvalidArchiveConfig")
            .with_message(format!("Invalid archive settings: {e}").into())
    })
}
