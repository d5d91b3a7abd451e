use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};

use crate::podchaser::Episode;

/// One timestamped segment: `(start, end)` in seconds, `end` is open for the last segment.
#[serde_as]
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Chunk {
    #[serde_as(as = "(DurationSecondsWithFrac<f64>, Option<DurationSecondsWithFrac<f64>>)")]
    pub timestamp: (Duration, Option<Duration>),
    pub text: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct Transcription {
    pub text: String,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

/// What ends up on disk, one file per transcribed episode.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PersistedTranscript {
    pub podcast_title: String,
    pub episode_title: String,
    pub episode_date: String,
    pub audio_url: String,
    #[serde(rename = "transcription_text")]
    pub transcript_text: String,
    #[serde(rename = "transcription_chunks", default)]
    pub chunks: Vec<Chunk>,
    pub episode_metadata: serde_json::Value,
}

impl PersistedTranscript {
    pub fn new(transcription: Transcription, episode: &Episode, podcast_title: &str) -> Self {
        let Transcription { text, chunks } = transcription;
        Self {
            podcast_title: podcast_title.to_owned(),
            episode_title: episode.title.clone(),
            episode_date: normalize_date(episode.air_date.as_deref()),
            audio_url: episode.audio_url().unwrap_or_default().to_owned(),
            transcript_text: text,
            chunks,
            episode_metadata: episode.metadata(),
        }
    }
}

/// Date part of an air date (everything before a `T` or space), `unknown` if absent.
pub fn normalize_date(air_date: Option<&str>) -> String {
    air_date
        .map(str::trim)
        .and_then(|d| d.split(['T', ' ']).next())
        .filter(|d| !d.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| "unknown".to_owned())
}
