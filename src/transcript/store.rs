use std::{fs::{self, File}, io::{BufReader, BufWriter, Write}, path::{Path, PathBuf}};

#[allow(unused_imports)]
use log::{info,warn,debug,error};
use tempfile::NamedTempFile;

use crate::podchaser::Episode;
use super::data::{PersistedTranscript, Transcription};

const PODCAST_TITLE_MAX: usize = 50;
const EPISODE_TITLE_MAX: usize = 80;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Writes one JSON file per transcript into a directory.
///
/// File names are `{podcast}_{episode}_{date}.json` after sanitising, so two episodes that
/// sanitise to the same triple share a file and the later one replaces the earlier.
pub struct TranscriptStore {
    output_dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn file_name(podcast_title: &str, episode_title: &str, date: &str) -> String {
        format!(
            "{}_{}_{}.json",
            sanitize(podcast_title, PODCAST_TITLE_MAX),
            sanitize(episode_title, EPISODE_TITLE_MAX),
            date,
        )
    }

    /// Serialises the record to a temp file next to the target and renames it into place,
    /// so a crash never leaves a half-written transcript behind.
    pub fn persist(&self, transcription: Transcription, episode: &Episode, podcast_title: &str) -> Result<PathBuf, StoreError> {
        let record = PersistedTranscript::new(transcription, episode, podcast_title);
        let path = self.output_dir.join(Self::file_name(podcast_title, &record.episode_title, &record.episode_date));
        if path.exists() {
            warn!("{} already exists, overwriting with episode {}", path.display(), episode);
        }

        let mut tmp = NamedTempFile::new_in(&self.output_dir)?;
        {
            let mut w = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut w, &record)?;
            w.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::IOError(e.error))?;

        info!("saved transcription to {}", path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<PersistedTranscript, StoreError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Keeps letters, digits, space, `-` and `_`, trims, then caps at `max` characters.
pub fn sanitize(s: &str, max: usize) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .chars()
        .take(max)
        .collect()
}
