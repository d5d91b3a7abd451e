mod data;
mod store;

pub use data::{normalize_date, Chunk, PersistedTranscript, Transcription};
pub use store::{sanitize, StoreError, TranscriptStore};
