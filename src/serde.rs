/// Podchaser returns `""` as often as `null` for missing optional strings.
/// Both are read as `None` so that "absent" has a single representation.
pub(crate) mod empty_as_none {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error>
        where S: Serializer {
        match value {
            Some(v) => s.serialize_some(v),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
        where D: Deserializer<'de> {
        Ok(Option::<String>::deserialize(deserializer)?.filter(|v| !v.trim().is_empty()))
    }
}

/// Podchaser ids come back as strings, older responses carry plain numbers.
pub(crate) mod string_or_number {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
        where D: Deserializer<'de> {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Str(s) => s,
            Raw::Num(n) => n.to_string(),
        })
    }
}
