//! Local sync journal: per-path records and their encryption status

use crate::{ClientError, Result};
use dashmap::DashMap;
use e2ee_metadata::{EncryptionStatus, RootEncryptedFolderInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A file or directory known to the local journal
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalRecord {
    /// Path with decrypted names, e.g. `/Secret/photos`
    pub path: String,
    /// Name on the server when the item lives inside an encrypted folder
    pub e2e_mangled_name: String,
    pub file_id: String,
    pub is_directory: bool,
    pub encryption_status: EncryptionStatus,
}

impl JournalRecord {
    /// A directory record with no encryption
    pub fn directory(path: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            e2e_mangled_name: String::new(),
            file_id: file_id.into(),
            is_directory: true,
            encryption_status: EncryptionStatus::NotEncrypted,
        }
    }

    pub fn with_encryption_status(mut self, status: EncryptionStatus) -> Self {
        self.encryption_status = status;
        self
    }

    pub fn is_e2e_encrypted(&self) -> bool {
        self.encryption_status.is_encrypted()
    }
}

/// Parent of `path`, `None` for a top-level entry
pub fn parent_path(path: &str) -> Option<&str> {
    let (parent, _) = path.trim_end_matches('/').rsplit_once('/')?;
    (!parent.is_empty()).then_some(parent)
}

/// The local journal the jobs read folder records from and write
/// encryption status back to
pub trait SyncJournal: Send + Sync {
    fn file_record(&self, path: &str) -> Result<Option<JournalRecord>>;

    /// Insert or replace the record at `record.path`
    fn set_file_record(&self, record: JournalRecord) -> Result<()>;

    /// Every record strictly below `path`, parents before children
    fn files_below_path(&self, path: &str) -> Result<Vec<JournalRecord>>;

    /// The outermost encrypted folder containing `path` (or `path` itself),
    /// `None` when `path` is not inside an encrypted folder
    fn top_level_e2ee_folder_record(&self, path: &str) -> Result<Option<JournalRecord>> {
        let mut top = None;
        let mut current = Some(path);
        while let Some(path) = current {
            match self.file_record(path)? {
                Some(record) if record.is_e2e_encrypted() => top = Some(record),
                _ => break,
            }
            current = parent_path(path);
        }
        Ok(top)
    }

    /// Where the key material of the encrypted folder at `path` comes from
    fn root_info_for(&self, path: &str) -> Result<RootEncryptedFolderInfo> {
        Ok(match self.top_level_e2ee_folder_record(path)? {
            Some(top) => RootEncryptedFolderInfo::new(RootEncryptedFolderInfo::create_root_path(path, &top.path)),
            None => RootEncryptedFolderInfo::root(),
        })
    }

    /// Record `status` for the directory at `path`, creating the record when
    /// the journal does not know it yet
    fn set_encryption_status(&self, path: &str, file_id: &str, status: EncryptionStatus) -> Result<()> {
        let record = self
            .file_record(path)?
            .unwrap_or_else(|| JournalRecord::directory(path, file_id));
        self.set_file_record(record.with_encryption_status(status))
    }
}

/// In-memory journal
#[derive(Clone, Default)]
pub struct MemoryJournal {
    records: Arc<DashMap<String, JournalRecord>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SyncJournal for MemoryJournal {
    fn file_record(&self, path: &str) -> Result<Option<JournalRecord>> {
        Ok(self.records.get(path).map(|entry| entry.value().clone()))
    }

    fn set_file_record(&self, record: JournalRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ClientError::Journal(format!("cannot write record for {}", record.path)));
        }
        self.records.insert(record.path.clone(), record);
        Ok(())
    }

    fn files_below_path(&self, path: &str) -> Result<Vec<JournalRecord>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut below: Vec<JournalRecord> = self
            .records
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.value().clone())
            .collect();
        below.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(below)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn encrypted(path: &str) -> JournalRecord {
        JournalRecord::directory(path, path.replace('/', "-"))
            .with_encryption_status(EncryptionStatus::EncryptedMigratedV2_0)
    }

    #[rstest]
    #[case("/Secret/a/b", Some("/Secret/a"))]
    #[case("/Secret/a/", Some("/Secret"))]
    #[case("/Secret", None)]
    #[case("Secret/a", Some("Secret"))]
    #[case("Secret", None)]
    fn test_parent_path(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(parent_path(path), expected);
    }

    #[test]
    fn test_files_below_path_is_sorted_and_excludes_siblings() {
        let journal = MemoryJournal::new();
        for path in ["/Secret/b", "/Secret/a/x", "/Secret", "/Secret/a", "/Secretive"] {
            journal.set_file_record(encrypted(path)).unwrap();
        }

        let below: Vec<String> = journal
            .files_below_path("/Secret")
            .unwrap()
            .into_iter()
            .map(|record| record.path)
            .collect();
        assert_eq!(below, vec!["/Secret/a", "/Secret/a/x", "/Secret/b"]);
    }

    #[test]
    fn test_top_level_record() {
        let journal = MemoryJournal::new();
        journal.set_file_record(JournalRecord::directory("/Documents", "1")).unwrap();
        journal.set_file_record(encrypted("/Documents/Secret")).unwrap();
        journal.set_file_record(encrypted("/Documents/Secret/nested")).unwrap();

        let top = journal.top_level_e2ee_folder_record("/Documents/Secret/nested").unwrap();
        assert_eq!(top.map(|record| record.path).as_deref(), Some("/Documents/Secret"));
        assert!(journal.top_level_e2ee_folder_record("/Documents").unwrap().is_none());
        assert!(journal.top_level_e2ee_folder_record("/Unknown").unwrap().is_none());
    }

    #[test]
    fn test_root_info_for() {
        let journal = MemoryJournal::new();
        journal.set_file_record(encrypted("/Secret")).unwrap();
        journal.set_file_record(encrypted("/Secret/nested")).unwrap();

        assert!(journal.root_info_for("/Secret").unwrap().is_root());
        assert_eq!(journal.root_info_for("/Secret/nested").unwrap().path, "/Secret");
        assert!(journal.root_info_for("/Plain").unwrap().is_root());
    }

    #[test]
    fn test_set_encryption_status_creates_record() {
        let journal = MemoryJournal::new();
        journal
            .set_encryption_status("/Secret", "42", EncryptionStatus::Encrypted)
            .unwrap();

        let record = journal.file_record("/Secret").unwrap().unwrap();
        assert_eq!(record.file_id, "42");
        assert!(record.is_directory);
        assert!(record.is_e2e_encrypted());
    }

    #[test]
    fn test_failing_writes() {
        let journal = MemoryJournal::new();
        journal.fail_writes(true);
        let result = journal.set_file_record(encrypted("/Secret"));
        assert!(matches!(result, Err(ClientError::Journal(_))));
        assert!(journal.is_empty());
    }
}
