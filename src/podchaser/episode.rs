use std::fmt::Display;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Podcast {
    #[serde(deserialize_with = "crate::serde::string_or_number::deserialize")]
    pub id: String,
    pub title: String,
}

/// An episode as returned by discovery. Only the fields the pipeline acts on are typed,
/// the record itself is kept as received and written back out as episode metadata.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Episode {
    pub title: String,
    pub air_date: Option<String>,
    pub audio_url: Option<String>,
    /// Raw discovery record, typed keys included.
    pub record: Map<String, Value>,
}

#[derive(Deserialize)]
struct EpisodeFields {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "airDate", default, with = "crate::serde::empty_as_none")]
    air_date: Option<String>,
    #[serde(rename = "audioUrl", default, with = "crate::serde::empty_as_none")]
    audio_url: Option<String>,
}

impl TryFrom<Map<String, Value>> for Episode {
    type Error = serde_json::Error;

    fn try_from(record: Map<String, Value>) -> Result<Self, Self::Error> {
        let fields = EpisodeFields::deserialize(&Value::Object(record.clone()))?;
        Ok(Self {
            title: fields.title.unwrap_or_default(),
            air_date: fields.air_date,
            audio_url: fields.audio_url,
            record,
        })
    }
}

impl From<Episode> for Map<String, Value> {
    fn from(episode: Episode) -> Self {
        episode.record
    }
}

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const OFFSET_FORMATS: [&str; 2] = [
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

impl Episode {
    pub fn new(title: impl Into<String>, air_date: Option<&str>, audio_url: Option<&str>) -> Self {
        let title = title.into();
        let air_date = air_date.filter(|d| !d.trim().is_empty()).map(str::to_owned);
        let audio_url = audio_url.filter(|u| !u.trim().is_empty()).map(str::to_owned);
        let mut record = Map::new();
        record.insert("title".to_owned(), Value::from(title.as_str()));
        if let Some(d) = &air_date {
            record.insert("airDate".to_owned(), Value::from(d.as_str()));
        }
        if let Some(u) = &audio_url {
            record.insert("audioUrl".to_owned(), Value::from(u.as_str()));
        }
        Self {
            title,
            air_date,
            audio_url,
            record,
        }
    }

    /// Parsed air date. Podchaser uses `YYYY-MM-DD HH:MM:SS`; RFC 3339, ISO 8601 with or
    /// without seconds, fractions or offset, and bare dates are accepted as well.
    pub fn aired_at(&self) -> Option<NaiveDateTime> {
        let raw = self.air_date.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_utc());
        }
        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
                return Some(dt.naive_utc());
            }
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(dt);
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(|d| d.and_time(NaiveTime::MIN))
    }

    /// Sort key for the air date, `None` when the episode has none. Parseable dates are
    /// rendered as fixed-width ISO timestamps, anything else keeps its raw text, so keys
    /// compare lexically either way.
    pub fn air_date_key(&self) -> Option<String> {
        let raw = self.air_date.as_deref()?;
        Some(match self.aired_at() {
            Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.9f").to_string(),
            None => raw.trim().to_owned(),
        })
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// The discovery record exactly as received.
    pub fn metadata(&self) -> Value {
        Value::Object(self.record.clone())
    }
}

impl Display for Episode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.air_date {
            Some(d) => write!(f, "'{}' ({})", self.title, d),
            None => write!(f, "'{}' (undated)", self.title),
        }
    }
}
