#[allow(unused_imports)]
use log::{info,warn,debug,error};

use crate::config::BackendConfig;
use crate::transcript::Transcription;

/// Extracts a transcript from a job's stdout.
///
/// A `json_marker` line carrying `{"text", "chunks"}` is preferred. Without one the text
/// between `result_marker` and `segments_marker` (or the end) is joined line by line and no
/// chunks are produced. `None` when neither yields any text.
pub fn parse(stdout: &str, config: &BackendConfig) -> Option<Transcription> {
    parse_structured(stdout, &config.json_marker)
        .or_else(|| parse_sentinels(stdout, &config.result_marker, &config.segments_marker))
        .filter(|t| !t.text.is_empty())
}

fn parse_structured(stdout: &str, marker: &str) -> Option<Transcription> {
    if marker.is_empty() {
        return None;
    }
    let payload = stdout.lines().find_map(|l| l.trim_start().strip_prefix(marker))?;
    match serde_json::from_str::<Transcription>(payload.trim()) {
        Ok(mut t) => {
            t.text = t.text.trim().to_owned();
            Some(t)
        }
        Err(e) => {
            warn!("malformed structured result, falling back to text markers: {}", e);
            None
        }
    }
}

fn parse_sentinels(stdout: &str, result_marker: &str, segments_marker: &str) -> Option<Transcription> {
    let mut found = false;
    let mut capturing = false;
    let mut parts = vec![];
    for line in stdout.lines() {
        if line.contains(result_marker) {
            found = true;
            capturing = true;
        } else if line.contains(segments_marker) {
            capturing = false;
        } else if capturing {
            let l = line.trim();
            if !l.is_empty() && !l.starts_with('=') {
                parts.push(l);
            }
        }
    }
    found.then(|| Transcription {
        text: parts.join(" "),
        chunks: vec![],
    })
}
