// Cache keys handed to dfcli so an external build cache can decide whether a result
// can be reused.
//
// A generated key looks like `--version 1.0.0 --property K1=V1,K2=V2`. Properties live
// in a `BTreeMap`, so equivalent property sets always produce the same key.

use std::collections::BTreeMap;

/// Builds the key for `version` and `properties`.
///
/// Returns `None` when no (non-blank) version is given.
pub fn build(version: Option<&str>, properties: &BTreeMap<String, String>) -> Option<String> {
    let version = version.map(str::trim).filter(|v| !v.is_empty())?;
    let mut key = format!("--version {}", version);
    append_properties(&mut key, properties);
    Some(key)
}

/// A caller supplied key with the properties appended the same way a generated key has them.
/// Returns `None` for a blank key.
pub fn with_properties(key: &str, properties: &BTreeMap<String, String>) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let mut key = key.to_string();
    append_properties(&mut key, properties);
    Some(key)
}

/// The key to append to a command: the caller's key when one is given, otherwise a
/// generated one.
pub fn resolve(
    user_key: Option<&str>,
    version: Option<&str>,
    properties: &BTreeMap<String, String>,
) -> Option<String> {
    match user_key.and_then(|k| with_properties(k, properties)) {
        Some(key) => Some(key),
        None => build(version, properties),
    }
}

fn append_properties(key: &mut String, properties: &BTreeMap<String, String>) {
    if properties.is_empty() {
        return;
    }
    let joined = properties
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    key.push_str(" --property ");
    key.push_str(&joined);
}
