use zbus::zvariant::{Str, Value};

/// Keys longer than this are replaced by their md5 digest so they stay valid file names.
const MAX_KEY_LEN: usize = 200;

#[must_use]
/// Converts a [`Value`] into [`Str`], or return [`None`] if it's not `str`.
pub fn extract_str<'a, 'b>(v: &'a Value<'b>) -> Option<&'a Str<'b>> {
    match v {
        Value::Str(v) => Some(v),
        Value::Value(v) => extract_str(v),
        _ => None,
    }
}

#[must_use]
/// Converts any integer [`Value`] into [`i64`].
pub fn extract_i64(v: &Value<'_>) -> Option<i64> {
    match v {
        Value::I64(v) => Some(*v),
        Value::U64(v) => i64::try_from(*v).ok(),
        Value::I32(v) => Some(i64::from(*v)),
        Value::U32(v) => Some(i64::from(*v)),
        Value::I16(v) => Some(i64::from(*v)),
        Value::U16(v) => Some(i64::from(*v)),
        Value::U8(v) => Some(i64::from(*v)),
        Value::Value(v) => extract_i64(v),
        _ => None,
    }
}

#[must_use]
/// Collects the strings of an `as` array. A plain string counts as a one-element array.
pub fn extract_strings(v: &Value<'_>) -> Option<Vec<String>> {
    match v {
        Value::Array(a) => Some(
            a.iter()
                .filter_map(extract_str)
                .map(ToString::to_string)
                .collect(),
        ),
        Value::Str(s) => Some(vec![s.to_string()]),
        Value::Value(v) => extract_strings(v),
        _ => None,
    }
}

/// Build the cache/memo key of a lyrics query.
///
/// Returns [`None`] when both title and artist are blank.
#[must_use]
pub fn normalize_query_key(title: &str, artist: &str) -> Option<String> {
    let joined = format!("{title} {artist}");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        return None;
    }
    let key: String = trimmed
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    if key.len() > MAX_KEY_LEN {
        return Some(format!("{:x}", md5::compute(key.as_bytes())));
    }
    Some(key)
}
