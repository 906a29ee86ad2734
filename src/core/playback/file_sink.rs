//! Audio output that writes each played resource to a file.
//!
//! Used by the command-line tool, and handy for inspecting what the HD
//! backend returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::element::{AudioElement, AudioOutput};
use crate::core::cache::AudioResource;
use crate::errors::{SpeechError, SpeechResult};

/// [`AudioOutput`] writing into a directory.
#[derive(Debug, Clone)]
pub struct FileAudioOutput {
    dir: PathBuf,
    written: Arc<Mutex<Vec<PathBuf>>>,
}

impl FileAudioOutput {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, oldest first.
    pub fn written(&self) -> Vec<PathBuf> {
        self.written.lock().clone()
    }
}

impl AudioOutput for FileAudioOutput {
    fn create_element(&self) -> Arc<dyn AudioElement> {
        Arc::new(FileElement {
            dir: self.dir.clone(),
            written: Arc::clone(&self.written),
            source: Mutex::new(None),
        })
    }
}

struct FileElement {
    dir: PathBuf,
    written: Arc<Mutex<Vec<PathBuf>>>,
    source: Mutex<Option<AudioResource>>,
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        _ => "mp3",
    }
}

#[async_trait]
impl AudioElement for FileElement {
    fn set_source(&self, resource: &AudioResource) {
        *self.source.lock() = Some(resource.clone());
    }

    async fn start(&self) -> SpeechResult<()> {
        let resource = self
            .source
            .lock()
            .clone()
            .ok_or_else(|| SpeechError::Failed("No audio source attached".to_string()))?;

        let path = self.dir.join(format!(
            "speech-{}.{}",
            resource.id(),
            extension_for(resource.mime_type())
        ));
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SpeechError::Failed(format!("Failed to create output dir: {e}")))?;
        tokio::fs::write(&path, resource.data())
            .await
            .map_err(|e| SpeechError::Failed(format!("Failed to write {}: {e}", path.display())))?;

        info!(path = %path.display(), bytes = resource.len(), "Audio written");
        self.written.lock().push(path);
        Ok(())
    }

    fn pause(&self) {}

    fn resume(&self) {}

    fn halt(&self) {
        self.source.lock().take();
    }

    async fn ended(&self) -> SpeechResult<()> {
        Ok(())
    }
}
