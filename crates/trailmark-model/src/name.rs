//! Path name sanitizer
//!
//! Names arrive from chat input, the network and files on disk, so every
//! construction, rename and deserialization goes through [`sanitize_name`].

/// Label used when a name is blank or has nothing readable left.
pub const DEFAULT_PATH_NAME: &str = "Path";

/// Maximum name length in characters.
pub const MAX_NAME_LEN: usize = 64;

fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == ' ' || ch == '_' || ch == '-'
}

/// Produce a non-blank name of at most [`MAX_NAME_LEN`] characters drawn from
/// `[A-Za-z0-9 _-]`.
pub fn sanitize_name(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return DEFAULT_PATH_NAME.to_string();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_PATH_NAME.to_string();
    }

    let replaced: String = trimmed
        .chars()
        .take(MAX_NAME_LEN)
        .map(|ch| if is_allowed(ch) { ch } else { '_' })
        .collect();
    let cleaned = replaced.trim();

    if !cleaned.chars().any(|ch| ch.is_ascii_alphanumeric()) {
        return DEFAULT_PATH_NAME.to_string();
    }
    cleaned.to_string()
}

/// Serde hook so deserialized names are sanitized on the way in.
pub(crate) fn deserialize_sanitized<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(sanitize_name(raw.as_deref()))
}
