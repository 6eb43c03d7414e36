//! Completed transfers held by the receiving peer

use crate::{Error, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::info;

/// One fully received file; immutable once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    file_name: String,
    declared_size: u64,
    data: Bytes,
}

impl ReceivedFile {
    pub fn new(file_name: impl Into<String>, declared_size: u64, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            declared_size,
            data,
        }
    }

    /// Name as declared by the sender (untrusted)
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes received beyond the declared size (kept in the blob, not truncated)
    pub fn overshoot(&self) -> u64 {
        (self.data.len() as u64).saturating_sub(self.declared_size)
    }
}

/// Ordered, append-only collection of received files
#[derive(Debug, Clone, Default)]
pub struct ReceivedFiles {
    files: Vec<ReceivedFile>,
}

impl ReceivedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file, returning its index
    pub fn push(&mut self, file: ReceivedFile) -> usize {
        self.files.push(file);
        self.files.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&ReceivedFile> {
        self.files.get(index)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReceivedFile> {
        self.files.iter()
    }

    /// Write the selected entries into `dir`
    ///
    /// Only the final component of each sender-supplied name is used, and an
    /// existing file is never overwritten: `name (1).ext` etc. is chosen
    /// instead. Returns the paths written, in selection order.
    ///
    /// # Errors
    ///
    /// Fails on the first index that does not exist, the first name that
    /// cannot be made safe, or the first I/O error.
    pub async fn save(&self, indices: &[usize], dir: &Path) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir).await?;

        let mut written = Vec::with_capacity(indices.len());
        for &index in indices {
            let file = self.files.get(index).ok_or_else(|| {
                Error::InvalidFileName(format!("no received file at index {}", index))
            })?;

            let name = safe_file_name(file.file_name())?;
            let path = unique_path(dir, &name).await;
            tokio::fs::write(&path, file.data()).await?;

            info!(file_name = %file.file_name(), path = %path.display(), "Saved received file");
            written.push(path);
        }

        Ok(written)
    }
}

/// Reduce a sender-supplied name to a single safe path component
pub fn safe_file_name(name: &str) -> Result<String> {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(char::from(0));

    if last.is_empty() || last == "." || last == ".." {
        return Err(Error::InvalidFileName(name.to_string()));
    }

    Ok(last.to_string())
}

async fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !path_exists(&candidate).await {
        return candidate;
    }

    let (stem, ext) = match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    };

    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{} ({}){}", stem, n, ext));
        if !path_exists(&candidate).await {
            return candidate;
        }
        n += 1;
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name_strips_directories() {
        assert_eq!(safe_file_name("a.txt").unwrap(), "a.txt");
        assert_eq!(safe_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(safe_file_name("C:\\Users\\me\\doc.pdf").unwrap(), "doc.pdf");
        assert!(safe_file_name("..").is_err());
        assert!(safe_file_name("dir/").is_err());
        assert!(safe_file_name("   ").is_err());
    }

    #[test]
    fn test_overshoot() {
        let file = ReceivedFile::new("a", 5, Bytes::from_static(b"0123456789"));
        assert_eq!(file.overshoot(), 5);
        let file = ReceivedFile::new("a", 5, Bytes::from_static(b"01234"));
        assert_eq!(file.overshoot(), 0);
    }

    #[tokio::test]
    async fn test_save_selected_without_clobbering() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = ReceivedFiles::new();
        files.push(ReceivedFile::new("notes.txt", 3, Bytes::from_static(b"one")));
        files.push(ReceivedFile::new("skip.bin", 1, Bytes::from_static(b"x")));
        files.push(ReceivedFile::new("../notes.txt", 3, Bytes::from_static(b"two")));

        let written = files.save(&[0, 2], dir.path()).await.unwrap();

        assert_eq!(written[0], dir.path().join("notes.txt"));
        assert_eq!(written[1], dir.path().join("notes (1).txt"));
        assert_eq!(std::fs::read(&written[0]).unwrap(), b"one");
        assert_eq!(std::fs::read(&written[1]).unwrap(), b"two");
        assert!(!dir.path().join("skip.bin").exists());
    }

    #[tokio::test]
    async fn test_save_unknown_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let files = ReceivedFiles::new();
        assert!(files.save(&[3], dir.path()).await.is_err());
    }
}
