//! Transcript folder helpers: newest-file selection and per-file read
//! cursors for incremental polling.

use crate::prompt::PromptError;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Most-recently-modified regular file in `dir`, if any. Subdirectories are
/// ignored; the transcript writer drops flat files into this folder.
pub fn latest_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified()?;
        let replace = match &newest {
            Some((when, _)) => modified > *when,
            None => true,
        };
        if replace {
            newest = Some((modified, entry.path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Whole-file read, surfaced as a builder error so the caller never reaches
/// network dispatch with a missing transcript.
pub fn read_transcript(path: &Path) -> Result<String, PromptError> {
    fs::read_to_string(path).map_err(|source| PromptError::TranscriptRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Per-path byte offsets tracking how much of each transcript has already
/// been sent. Offsets only move forward; a shrunken file snaps the cursor to
/// the new end and an explicit [`reset`](Self::reset) is required to re-read
/// from the start.
#[derive(Debug, Default)]
pub struct TranscriptCursor {
    offsets: HashMap<PathBuf, u64>,
}

impl TranscriptCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content appended since the last call for this path, and whether there
    /// was any. Decoding is lossy, so a cursor landing inside a multi-byte
    /// sequence cannot poison the output.
    pub fn new_content(&mut self, path: &Path) -> Result<(String, bool), PromptError> {
        let bytes = fs::read(path).map_err(|source| PromptError::TranscriptRead {
            path: path.to_path_buf(),
            source,
        })?;
        let len = bytes.len() as u64;
        let offset = self.offsets.get(path).copied().unwrap_or(0);

        if len < offset {
            tracing::warn!(path = %path.display(), "transcript shrank; cursor moved to new end");
            self.offsets.insert(path.to_path_buf(), len);
            return Ok((String::new(), false));
        }
        if len == offset {
            return Ok((String::new(), false));
        }

        let delta = String::from_utf8_lossy(&bytes[offset as usize..]).into_owned();
        self.offsets.insert(path.to_path_buf(), len);
        Ok((delta, true))
    }

    /// Forget the offset for a path so the next poll re-reads the whole file.
    pub fn reset(&mut self, path: &Path) {
        self.offsets.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;

    #[test]
    fn latest_file_picks_most_recently_modified() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("older.txt");
        let newer = dir.path().join("newer.txt");
        fs::write(&older, "a").unwrap();
        fs::write(&newer, "b").unwrap();
        // Push the second file clearly past the first.
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        let file = OpenOptions::new().write(true).open(&newer).unwrap();
        file.set_modified(later).unwrap();

        assert_eq!(latest_file(dir.path()).unwrap(), Some(newer));
    }

    #[test]
    fn latest_file_empty_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_file(dir.path()).unwrap(), None);
    }

    #[test]
    fn cursor_returns_full_content_then_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        fs::write(&path, "hello").unwrap();

        let mut cursor = TranscriptCursor::new();
        assert_eq!(cursor.new_content(&path).unwrap(), ("hello".into(), true));
        assert_eq!(cursor.new_content(&path).unwrap(), (String::new(), false));
    }

    #[test]
    fn cursor_returns_exactly_the_appended_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        fs::write(&path, "hello").unwrap();

        let mut cursor = TranscriptCursor::new();
        cursor.new_content(&path).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(" world".as_bytes()).unwrap();
        drop(file);

        assert_eq!(cursor.new_content(&path).unwrap(), (" world".into(), true));
    }

    #[test]
    fn shrunken_file_yields_nothing_until_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        fs::write(&path, "hello world").unwrap();

        let mut cursor = TranscriptCursor::new();
        cursor.new_content(&path).unwrap();

        fs::write(&path, "hi").unwrap();
        assert_eq!(cursor.new_content(&path).unwrap(), (String::new(), false));

        cursor.reset(&path);
        assert_eq!(cursor.new_content(&path).unwrap(), ("hi".into(), true));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let mut cursor = TranscriptCursor::new();
        let err = cursor.new_content(Path::new("/no/such/file.txt")).unwrap_err();
        assert!(matches!(err, PromptError::TranscriptRead { .. }));
    }
}
