use crate::backup::archive::{archive_file_name, ArchiveConfig};
use crate::backup::catalog::{is_backup_file_name, list_backup_files};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddDebugObjectAndFnName, AddFunctionName, AddMsg};
use crate::backup::rotation::{generation_number, rotate};
use crate::backup::validate::{
    validate_archive_config, validate_not_a_file, validate_valid_backup_file_name,
};
use bon::Builder;
use function_name::named;
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Generations kept when no retention is configured
pub const DEFAULT_RETENTION_COUNT: usize = 5;

fn default_retention() -> usize {
    DEFAULT_RETENTION_COUNT
}

/// One rotation chain: a data file and the folder its archived generations
/// live in.
///
/// Layout inside `backup_dir`:
/// - `<backup_file_name>`: transient uncompressed copy, removed after archiving
/// - `<name>.zip`: generation 1, the most recent backup
/// - `<name>.zip.bak02` .. `<name>.zip.bakNN`: older generations, `NN <= retention`
///
/// No state is kept between calls. Operations are not synchronized: running
/// [`BackupSet::create_rolling_backup`] concurrently on the same set (from
/// threads or processes) interleaves rotation steps and corrupts the chain, so
/// callers sharing a set must hold an external lock.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters, CopyGetters)]
#[serde(deny_unknown_fields)]
pub struct BackupSet {
    #[builder(into)]
    #[getset(get = "pub")]
    data_file: PathBuf,
    #[validate(custom(function = validate_not_a_file))]
    #[builder(into)]
    #[getset(get = "pub")]
    backup_dir: PathBuf,
    #[validate(custom(function = validate_valid_backup_file_name))]
    #[builder(into)]
    #[getset(get = "pub")]
    backup_file_name: String,
    #[validate(range(min = 2, max = 99))]
    #[serde(default = "default_retention")]
    #[builder(default = DEFAULT_RETENTION_COUNT)]
    #[getset(get_copy = "pub")]
    retention: usize,
    #[validate(custom(function = validate_archive_config))]
    #[serde(default)]
    #[builder(default)]
    #[getset(get = "pub")]
    archive: ArchiveConfig,
}

fn same_file_path(a: &Path, b: &Path) -> bool {
    if let (Ok(a), Ok(b)) = (a.canonicalize(), b.canonicalize()) {
        return a == b;
    }
    match (std::path::absolute(a), std::path::absolute(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn remove_best_effort(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!("Ignoring failure to delete {:?}: {}", path, e);
    }
}

impl BackupSet {
    /// Path of generation 1
    pub fn archive_path(&self) -> PathBuf {
        self.backup_dir.join(archive_file_name(&self.backup_file_name))
    }

    /// Path the data file is copied to before archiving, and restored to
    /// before being copied back
    pub fn staged_path(&self) -> PathBuf {
        self.backup_dir.join(&self.backup_file_name)
    }

    /// Archives the data file as a new generation 1, rotating older ones.
    ///
    /// Returns the backup file name. Steps run in order and the first failure
    /// aborts; steps already applied (such as a partial rotation) are not
    /// rolled back.
    #[named]
    pub fn create_rolling_backup(&self) -> Result<String> {
        self.validate()
            .map_err(Error::from)
            .add_fn_name(function_path!())?;

        let archive = self.archive_path();
        let existing = self.generations()?;
        tracing::info!(
            "Creating backup of {:?} as {:?}, {} generation(s) found",
            self.data_file,
            archive,
            existing.len()
        );

        rotate(&archive, self.retention)
            .add_debug_object_and_fn_name(self.clone(), function_path!())?;

        std::fs::create_dir_all(&self.backup_dir)
            .map_err(Error::from)
            .add_msg(format!("Create backup folder {:?} failed", self.backup_dir))?;

        let staged = self.staged_path();
        let copied = !same_file_path(&staged, &self.data_file);
        if copied {
            std::fs::copy(&self.data_file, &staged)
                .map_err(Error::from)
                .add_msg(format!("Copy {:?} to {:?} failed", self.data_file, staged))?;
        }

        self.archive
            .compress(&staged, &archive)
            .add_msg(format!("Archive {:?} failed", staged))?;

        if copied {
            remove_best_effort(&staged);
        }

        tracing::info!("Created backup {:?}", archive);
        Ok(self.backup_file_name.clone())
    }

    /// Restores generation 1 over the data file and returns the data file path.
    #[named]
    pub fn restore_backup(&self) -> Result<PathBuf> {
        self.validate()
            .map_err(Error::from)
            .add_fn_name(function_path!())?;

        let archive = self.archive_path();
        if !archive.is_file() {
            return Err(Error::ArchiveNotFound(archive)).add_fn_name(function_path!());
        }
        tracing::info!("Restoring {:?} from {:?}", self.data_file, archive);

        let entry = ArchiveConfig::decompress(&archive, &self.backup_dir)
            .add_msg(format!("Extract {:?} failed", archive))?
            .ok_or_else(|| Error::EmptyArchive(archive.clone()))
            .add_fn_name(function_path!())?;

        let restored = self.staged_path();
        if !restored.is_file() {
            return Err(Error::MissingRestoredFile {
                expected: restored,
                entry,
            })
            .add_fn_name(function_path!());
        }
        if entry != self.backup_file_name {
            tracing::warn!(
                "Archive entry {:?} differs from backup file name {:?}",
                entry,
                self.backup_file_name
            );
        }

        if !same_file_path(&restored, &self.data_file) {
            std::fs::copy(&restored, &self.data_file)
                .map_err(Error::from)
                .add_msg(format!("Copy {:?} to {:?} failed", restored, self.data_file))?;
            remove_best_effort(&restored);
        }

        tracing::info!("Restored {:?}", self.data_file);
        Ok(self.data_file.clone())
    }

    /// Absolute paths of every backup archive in the backup folder, empty when
    /// the folder does not exist.
    pub fn list_backup_files(&self) -> Result<Vec<PathBuf>> {
        list_backup_files(&self.backup_dir).map(Option::unwrap_or_default)
    }

    pub fn backup_file_names(&self) -> Result<Vec<String>> {
        Ok(self
            .list_backup_files()?
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect_vec())
    }

    /// Existing generations of this set, newest first.
    ///
    /// Order comes from the numeric suffixes, not from the directory listing.
    /// Archives of other sets sharing the folder are ignored.
    pub fn generations(&self) -> Result<Vec<(usize, PathBuf)>> {
        let archive_name = archive_file_name(&self.backup_file_name);
        Ok(self
            .list_backup_files()?
            .into_iter()
            .filter_map(|p| {
                let generation = generation_number(&archive_name, p.file_name()?.to_str()?)?;
                Some((generation, p))
            })
            .sorted_unstable_by_key(|(generation, _)| *generation)
            .collect_vec())
    }

    /// Opens one of the archives listed by [`BackupSet::backup_file_names`]
    /// for reading, e.g. to ship it elsewhere.
    pub fn open_backup<S: AsRef<str>>(&self, file_name: S) -> Result<BufReader<File>> {
        let file_name = file_name.as_ref();
        if !is_backup_file_name(file_name) || Path::new(file_name).components().count() != 1 {
            return Err(Error::NotABackupFile(file_name.to_owned()));
        }

        let path = self.backup_dir.join(file_name);
        File::open(&path)
            .map(BufReader::new)
            .map_err(Error::from)
            .add_msg(format!("Open backup {:?} failed", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::rotation::generation_path;
    use std::io::Read;
    use tempfile::TempDir;

    static BACKUP_FILE_NAME: &str = "data-file-backup.bin";

    fn setup(retention: usize) -> (TempDir, BackupSet) {
        let temp_dir = TempDir::new().unwrap();
        let backup_set = BackupSet::builder()
            .data_file(temp_dir.path().join("data-file.bin"))
            .backup_dir(temp_dir.path().join("backup"))
            .backup_file_name(BACKUP_FILE_NAME)
            .retention(retention)
            .build();
        (temp_dir, backup_set)
    }

    fn random_bytes(seed: u32, len: usize) -> Vec<u8> {
        let mut state = seed.wrapping_mul(2654435761).max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    fn read_generation(backup_set: &BackupSet, generation: usize) -> Vec<u8> {
        let out_dir = TempDir::new().unwrap();
        let archive = generation_path(backup_set.archive_path(), generation);
        let entry = ArchiveConfig::decompress(&archive, out_dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(entry, BACKUP_FILE_NAME);
        std::fs::read(out_dir.path().join(entry)).unwrap()
    }

    #[test]
    fn test_create_rolling_backup_creates_folder_and_archive() {
        let (_temp_dir, backup_set) = setup(2);
        let content = random_bytes(1, 2056);
        std::fs::write(backup_set.data_file(), &content).unwrap();
        assert!(!backup_set.backup_dir().exists());

        let name = backup_set.create_rolling_backup().unwrap();

        assert_eq!(name, BACKUP_FILE_NAME);
        assert_eq!(backup_set.list_backup_files().unwrap().len(), 1);
        assert!(backup_set.archive_path().is_file());
        assert!(!backup_set.staged_path().exists());
        assert_eq!(std::fs::read(backup_set.data_file()).unwrap(), content);
        assert_eq!(read_generation(&backup_set, 1), content);
    }

    #[test]
    fn test_three_backups_with_retention_two_drop_the_oldest() {
        let (_temp_dir, backup_set) = setup(2);

        for content in ["A", "B", "C"] {
            std::fs::write(backup_set.data_file(), content).unwrap();
            backup_set.create_rolling_backup().unwrap();
        }

        assert_eq!(backup_set.list_backup_files().unwrap().len(), 2);
        assert_eq!(read_generation(&backup_set, 1), b"C");
        assert_eq!(read_generation(&backup_set, 2), b"B");
        assert!(!generation_path(backup_set.archive_path(), 3).exists());
    }

    #[test]
    fn test_unmovable_generation_aborts_backup_and_keeps_latest() {
        let (_temp_dir, backup_set) = setup(2);
        std::fs::write(backup_set.data_file(), "A").unwrap();
        backup_set.create_rolling_backup().unwrap();

        let blocked = generation_path(backup_set.archive_path(), 2);
        std::fs::create_dir_all(blocked.join("keep")).unwrap();
        std::fs::write(backup_set.data_file(), "B").unwrap();

        let err = backup_set.create_rolling_backup().unwrap_err();

        assert!(matches!(err.root(), Error::LotsOfError(_)));
        assert!(blocked.join("keep").is_dir());
        assert!(!backup_set.staged_path().exists());
        assert_eq!(read_generation(&backup_set, 1), b"A");
    }

    #[test]
    fn test_retention_keeps_exactly_n_generations() {
        for retention in 2..=5 {
            let (_temp_dir, backup_set) = setup(retention);

            for i in 0..=retention {
                std::fs::write(backup_set.data_file(), format!("content {i}")).unwrap();
                backup_set.create_rolling_backup().unwrap();
            }

            let generations = backup_set.generations().unwrap();
            assert_eq!(generations.len(), retention);
            assert_eq!(
                generations.iter().map(|(g, _)| *g).collect_vec(),
                (1..=retention).collect_vec()
            );
            assert_eq!(
                read_generation(&backup_set, 1),
                format!("content {retention}").into_bytes()
            );
            assert_eq!(read_generation(&backup_set, retention), b"content 1");
        }
    }

    #[test]
    fn test_restore_round_trips_latest_backup() {
        let (_temp_dir, backup_set) = setup(3);
        let first = random_bytes(2, 2056);
        let second = random_bytes(3, 2012);

        std::fs::write(backup_set.data_file(), &first).unwrap();
        backup_set.create_rolling_backup().unwrap();
        std::fs::write(backup_set.data_file(), &second).unwrap();
        backup_set.create_rolling_backup().unwrap();
        assert_eq!(backup_set.list_backup_files().unwrap().len(), 2);

        std::fs::remove_file(backup_set.data_file()).unwrap();
        let restored = backup_set.restore_backup().unwrap();

        assert_eq!(&restored, backup_set.data_file());
        assert_eq!(std::fs::read(&restored).unwrap(), second);
        assert!(!backup_set.staged_path().exists());
        assert_eq!(backup_set.list_backup_files().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_retention_fails_before_touching_files() {
        for retention in [0, 1] {
            let (_temp_dir, backup_set) = setup(retention);
            std::fs::write(backup_set.data_file(), "data").unwrap();

            let err = backup_set.create_rolling_backup().unwrap_err();

            assert!(matches!(err.root(), Error::Configuration(_)));
            assert!(!backup_set.backup_dir().exists());
        }
    }

    #[test]
    fn test_restore_without_archive_fails() {
        let (_temp_dir, backup_set) = setup(2);

        let err = backup_set.restore_backup().unwrap_err();

        assert!(matches!(err.root(), Error::ArchiveNotFound(_)));
        assert!(!backup_set.data_file().exists());
    }

    #[test]
    fn test_restore_empty_archive_fails() {
        let (_temp_dir, backup_set) = setup(2);
        std::fs::create_dir_all(backup_set.backup_dir()).unwrap();
        zip::ZipWriter::new(File::create(backup_set.archive_path()).unwrap())
            .finish()
            .unwrap();

        let err = backup_set.restore_backup().unwrap_err();

        assert!(matches!(err.root(), Error::EmptyArchive(_)));
    }

    #[test]
    fn test_restore_with_mismatched_entry_fails() {
        let (temp_dir, backup_set) = setup(2);
        std::fs::create_dir_all(backup_set.backup_dir()).unwrap();
        let other = temp_dir.path().join("other.bin");
        std::fs::write(&other, "other").unwrap();
        ArchiveConfig::default()
            .compress(&other, backup_set.archive_path())
            .unwrap();

        let err = backup_set.restore_backup().unwrap_err();

        assert!(matches!(err.root(), Error::MissingRestoredFile { entry, .. } if entry == "other.bin"));
        assert!(!backup_set.data_file().exists());
    }

    #[test]
    fn test_data_file_inside_backup_folder_is_archived_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let backup_dir = temp_dir.path().join("backup");
        std::fs::create_dir_all(&backup_dir).unwrap();
        let backup_set = BackupSet::builder()
            .data_file(backup_dir.join(BACKUP_FILE_NAME))
            .backup_dir(&backup_dir)
            .backup_file_name(BACKUP_FILE_NAME)
            .retention(2)
            .archive(ArchiveConfig::Stored)
            .build();

        std::fs::write(backup_set.data_file(), "first").unwrap();
        backup_set.create_rolling_backup().unwrap();
        assert_eq!(std::fs::read(backup_set.data_file()).unwrap(), b"first");

        std::fs::write(backup_set.data_file(), "changed").unwrap();
        backup_set.restore_backup().unwrap();

        assert_eq!(std::fs::read(backup_set.data_file()).unwrap(), b"first");
        assert_eq!(backup_set.list_backup_files().unwrap().len(), 1);
    }

    #[test]
    fn test_generations_ignore_other_sets() {
        let (_temp_dir, backup_set) = setup(3);
        std::fs::create_dir_all(backup_set.backup_dir()).unwrap();
        for name in [
            "data-file-backup.zip.bak03",
            "data-file-backup.zip",
            "other.zip",
            "other.zip.bak02",
            "data-file-backup.zip.bak02",
        ] {
            std::fs::write(backup_set.backup_dir().join(name), "").unwrap();
        }

        let generations = backup_set.generations().unwrap();

        assert_eq!(backup_set.backup_file_names().unwrap().len(), 5);
        assert_eq!(generations.iter().map(|(g, _)| *g).collect_vec(), vec![1, 2, 3]);
        assert!(generations[2].1.ends_with("data-file-backup.zip.bak03"));
    }

    #[test]
    fn test_list_backup_files_without_folder_is_empty() {
        let (_temp_dir, backup_set) = setup(2);
        assert!(backup_set.list_backup_files().unwrap().is_empty());
        assert!(backup_set.generations().unwrap().is_empty());
    }

    #[test]
    fn test_open_backup() {
        let (_temp_dir, backup_set) = setup(2);
        std::fs::write(backup_set.data_file(), "data").unwrap();
        backup_set.create_rolling_backup().unwrap();

        let mut header = [0u8; 2];
        backup_set
            .open_backup("data-file-backup.zip")
            .unwrap()
            .read_exact(&mut header)
            .unwrap();
        assert_eq!(&header, b"PK");

        for name in ["data-file-backup.bin", "../data-file-backup.zip"] {
            let err = backup_set.open_backup(name).unwrap_err();
            assert!(matches!(err, Error::NotABackupFile(_)));
        }
    }

    #[test]
    fn test_backup_set_from_yaml_with_defaults() {
        let yaml = r#"
data_file: /var/lib/app/data.db
backup_dir: /var/backups/app
backup_file_name: data.db
"#;
        let backup_set: BackupSet = serde_yml::from_str(yaml).unwrap();

        assert_eq!(backup_set.retention(), DEFAULT_RETENTION_COUNT);
        assert_eq!(backup_set.archive(), &ArchiveConfig::default());
        assert_eq!(backup_set.archive_path(), Path::new("/var/backups/app/data.zip"));
        assert!(backup_set.validate().is_ok());
    }

    #[test]
    fn test_backup_set_from_yaml_rejects_unknown_fields() {
        let yaml = r#"
data_file: data.db
backup_dir: backups
backup_file_name: data.db
copies: 3
"#;
        assert!(serde_yml::from_str::<BackupSet>(yaml).is_err());
    }

    #[test]
    fn test_backup_set_validation() {
        let (_temp_dir, backup_set) = setup(2);
        assert!(backup_set.validate().is_ok());

        let invalid_name = BackupSet::builder()
            .data_file("data.bin")
            .backup_dir("backup")
            .backup_file_name("nested/data.bin")
            .build();
        assert!(invalid_name.validate().is_err());

        let invalid_retention = BackupSet::builder()
            .data_file("data.bin")
            .backup_dir("backup")
            .backup_file_name("data.bin")
            .retention(100)
            .build();
        assert!(invalid_retention.validate().is_err());
    }
}
