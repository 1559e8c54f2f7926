//! Temp file guard for received payloads.
//!
//! A [`TempScanFile`] is created by exactly one handler and removed when
//! the guard drops, on every exit path. Removal failures are logged.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tracing::{debug, warn};

use crate::token::unique_token;

/// Longest sanitised name kept in the temp file name.
const MAX_NAME_LEN: usize = 100;

/// A received payload on disk. Deleted on drop.
#[derive(Debug)]
pub struct TempScanFile {
    path: PathBuf,
}

impl TempScanFile {
    /// Creates a fresh file in `dir` for connection `conn_id`.
    ///
    /// The name is `scan_<unix-secs>_<conn-id>_<token>_<name>`; creation
    /// fails rather than reuse an existing file.
    pub async fn create(
        dir: &Path,
        conn_id: u64,
        declared_name: &str,
    ) -> std::io::Result<(Self, File)> {
        let path = dir.join(temp_file_name(conn_id, declared_name));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), "temp file created");
        Ok((Self { path }, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempScanFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "temp file deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not delete temp file"),
        }
    }
}

/// Builds the temp file name for a declared upload name.
pub fn temp_file_name(conn_id: u64, declared_name: &str) -> String {
    format!(
        "scan_{}_{}_{}_{}",
        chrono::Utc::now().timestamp(),
        conn_id,
        unique_token(),
        sanitize_name(declared_name)
    )
}

/// Reduces a client-declared name to a safe final path component.
///
/// Only `[A-Za-z0-9._-]` survive; anything else becomes `_`. Empty and
/// dot-only results become `upload`.
pub fn sanitize_name(declared: &str) -> String {
    let last = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name("C:\\Users\\me\\a b.txt"), "a_b.txt");
        assert_eq!(sanitize_name("..."), "upload");
        assert_eq!(sanitize_name(""), "upload");
        assert_eq!(sanitize_name("dir/"), "upload");
        assert_eq!(sanitize_name("tệp.txt"), "t_p.txt");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_name(&long).len(), MAX_NAME_LEN);
    }

    #[test]
    fn names_are_unique_for_same_input() {
        let a = temp_file_name(1, "same.txt");
        let b = temp_file_name(1, "same.txt");
        assert_ne!(a, b);
        assert!(a.starts_with("scan_"));
        assert!(a.ends_with("_same.txt"));
    }

    #[tokio::test]
    async fn guard_deletes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let (guard, file) = TempScanFile::create(dir.path(), 7, "x.bin").await.unwrap();
        drop(file);
        let path = guard.path().to_path_buf();
        assert!(path.exists());
        assert!(path.starts_with(dir.path()));

        drop(guard);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn guard_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (guard, file) = TempScanFile::create(dir.path(), 1, "x").await.unwrap();
        drop(file);
        std::fs::remove_file(guard.path()).unwrap();
        drop(guard);
    }
}
