//! Entries of a folder's file list

/// Mimetype of directory entries
pub const DIRECTORY_MIMETYPE: &str = "httpd/unix-directory";

/// Mimetype some clients wrongly stored for directories
pub const INODE_DIRECTORY_MIMETYPE: &str = "inode/directory";

/// One file or directory inside an encrypted folder.
///
/// Directories only use the name mapping, their crypto fields stay empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptedFile {
    /// Per-file content key
    pub encryption_key: Vec<u8>,
    pub mimetype: String,
    pub initialization_vector: Vec<u8>,
    pub authentication_tag: Vec<u8>,
    /// Name on the server
    pub encrypted_filename: String,
    /// Name shown to the user
    pub original_filename: String,
}

impl EncryptedFile {
    /// A directory entry mapping `encrypted_filename` to `original_filename`
    pub fn directory(encrypted_filename: impl Into<String>, original_filename: impl Into<String>) -> Self {
        Self {
            mimetype: DIRECTORY_MIMETYPE.to_string(),
            encrypted_filename: encrypted_filename.into(),
            original_filename: original_filename.into(),
            ..Default::default()
        }
    }

    pub fn is_directory(&self) -> bool {
        self.mimetype.is_empty()
            || self.mimetype == DIRECTORY_MIMETYPE
            || self.mimetype == INODE_DIRECTORY_MIMETYPE
    }

    /// Recover from the wrongly stored `inode/directory` mimetype
    pub(crate) fn normalize_mimetype(&mut self) {
        if self.mimetype == INODE_DIRECTORY_MIMETYPE {
            self.mimetype = DIRECTORY_MIMETYPE.to_string();
        }
    }
}
