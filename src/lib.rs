//! # roll-backup
//!
//! Rolling, numbered backups of a single data file, each stored as a
//! single-entry zip archive, with restore of the most recent one.
//!
//! ## Features
//!
//! - **Rotation**: keeps up to `retention` generations (`data.zip`,
//!   `data.zip.bak02`, ...), newest first
//! - **Compression**: zip container, stored or deflated
//! - **Restore**: extracts generation 1 and copies it over the data file
//! - **Catalog**: lists backup archives in a folder by naming convention
//!
//! ## Quick Start
//!
//! ```no_run
//! use roll_backup::backup::backup_set::BackupSet;
//!
//! let backup_set = BackupSet::builder()
//!     .data_file("/var/lib/app/data.db")
//!     .backup_dir("/var/backups/app")
//!     .backup_file_name("data.db")
//!     .retention(3)
//!     .build();
//!
//! backup_set.create_rolling_backup()?;
//! backup_set.restore_backup()?;
//! # Ok::<(), roll_backup::backup::result_error::error::Error>(())
//! ```

pub mod backup;
