//! # Selection Module
//!
//! The file the user dropped on the widget or chose in the picker.
//! Nothing here looks inside the file: decodability is discovered later
//! by the playback element.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Extensions offered by the file picker's "audio" filter.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "oga", "m4a", "aac", "mp4", "mka", "webm", "aif", "aiff", "caf",
];

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a regular file")]
    NotAFile(PathBuf),
}

/// The user's chosen audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// File name as shown to the user.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Where the content lives.
    pub path: PathBuf,
}

impl SelectedFile {
    /// Builds a selection from a path on disk, reading its size from metadata.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SelectionError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|source| SelectionError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(SelectionError::NotAFile(path.to_path_buf()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            size: metadata.len(),
            path: path.to_path_buf(),
        })
    }

    /// Lower-cased extension, used as a decoder hint.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("visualizer-selection-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn reads_name_and_size() {
        let path = temp_file("track.MP3", &[0u8; 42]);
        let selected = SelectedFile::from_path(&path).unwrap();
        assert_eq!(selected.name, "track.MP3");
        assert_eq!(selected.size, 42);
        assert_eq!(selected.extension().as_deref(), Some("mp3"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = SelectedFile::from_path("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, SelectionError::Unreadable { .. }));
    }

    #[test]
    fn directory_is_not_a_selection() {
        let err = SelectedFile::from_path(std::env::temp_dir()).unwrap_err();
        assert!(matches!(err, SelectionError::NotAFile(_)));
    }

    #[test]
    fn picker_filter_lists_lowercase_extensions() {
        assert!(AUDIO_EXTENSIONS.contains(&"flac"));
        assert!(AUDIO_EXTENSIONS.iter().all(|ext| *ext == ext.to_ascii_lowercase()));
    }
}
