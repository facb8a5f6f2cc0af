//! Recorded audio packaged for upload

use std::path::{Path, PathBuf};

use crate::error::{JournalError, Result};

/// Audio container inferred from a file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// MPEG layer 3
    Mp3,
    /// RIFF wave
    Wav,
    /// Core Audio format
    Caf,
    /// MPEG-4 audio; also the fallback for unknown extensions
    M4a,
}

impl AudioFormat {
    /// Format for a path, by extension (case-insensitive)
    ///
    /// # Examples
    ///
    /// ```
    /// use voice_journal::providers::AudioFormat;
    ///
    /// assert_eq!(AudioFormat::from_path("clip.WAV"), AudioFormat::Wav);
    /// assert_eq!(AudioFormat::from_path("clip.ogg"), AudioFormat::M4a);
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("mp3") => Self::Mp3,
            Some("wav") => Self::Wav,
            Some("caf") => Self::Caf,
            _ => Self::M4a,
        }
    }

    /// MIME type sent with the upload
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mp3",
            Self::Wav => "audio/wav",
            Self::Caf => "audio/x-caf",
            Self::M4a => "audio/m4a",
        }
    }

    /// File name sent with the upload
    pub fn upload_name(self) -> &'static str {
        match self {
            Self::Mp3 => "audio.mp3",
            Self::Wav => "audio.wav",
            Self::Caf => "audio.caf",
            Self::M4a => "audio.m4a",
        }
    }
}

/// A recorded clip ready to be transcribed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Where the clip was read from
    pub path: PathBuf,
    /// Container format
    pub format: AudioFormat,
    /// Raw file contents, passed through unmodified
    pub bytes: Vec<u8>,
}

impl AudioClip {
    /// Read a clip from disk
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Device` when the file is missing or empty.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            JournalError::Device(format!("Failed to read recording {}: {}", path.display(), e))
        })?;
        if bytes.is_empty() {
            return Err(
                JournalError::Device(format!("Recording {} is empty", path.display())).into(),
            );
        }
        Ok(Self::from_bytes(path, bytes))
    }

    /// Wrap bytes already in memory
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let path = path.into();
        Self {
            format: AudioFormat::from_path(&path),
            path,
            bytes,
        }
    }

    /// MIME type of the clip
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    /// Upload file name of the clip
    pub fn upload_name(&self) -> &'static str {
        self.format.upload_name()
    }
}
