//! Settings loading.
//!
//! Defaults are serialized to JSON, the user file is deep-merged over them,
//! the result is deserialized, and `EXTHOST_*` variables are applied last.
//!
//! Merge rules: objects merge per key, arrays and scalars are replaced, and
//! `null` in the file leaves the default in place.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::ExtHostSettings;

/// `~/.exthost/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".exthost").join("settings.json")
}

/// Load from [`settings_path`] with environment overrides.
pub fn load_settings() -> Result<ExtHostSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with environment overrides.
///
/// A missing file yields the defaults; an unreadable or malformed one is an
/// error.
pub fn load_settings_from_path(path: &Path) -> Result<ExtHostSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<ExtHostSettings> {
    let defaults = serde_json::to_value(ExtHostSettings::default())?;
    let merged = if path.exists() {
        debug!(?path, "loading settings file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "no settings file, using defaults");
        defaults
    };
    Ok(serde_json::from_value(merged)?)
}

/// Recursively merge `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `EXTHOST_*` overrides. Unparseable values are logged and ignored.
pub fn apply_env_overrides(settings: &mut ExtHostSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

fn apply_overrides_from(settings: &mut ExtHostSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("EXTHOST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("EXTHOST_PORT") {
        if let Some(port) = checked("EXTHOST_PORT", &v, |s| parse_u16_range(s, 0, 65535)) {
            settings.server.port = port;
        }
    }
    if let Some(v) = read("EXTHOST_CHANNEL_BUFFER") {
        if let Some(n) = checked("EXTHOST_CHANNEL_BUFFER", &v, |s| {
            parse_usize_range(s, 1, 1_000_000)
        }) {
            settings.server.channel_buffer = n;
        }
    }
    if let Some(v) = read("EXTHOST_HANDLER_TIMEOUT_MS") {
        if let Some(ms) = checked("EXTHOST_HANDLER_TIMEOUT_MS", &v, |s| {
            parse_u64_range(s, 1, 3_600_000)
        }) {
            settings.broker.handler_timeout_ms = ms;
        }
    }
    if let Some(v) = read("EXTHOST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("EXTHOST_LOG_JSON") {
        if let Some(json) = checked("EXTHOST_LOG_JSON", &v, parse_bool) {
            settings.logging.json = json;
        }
    }
}

fn checked<T>(key: &str, value: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let parsed = parse(value);
    if parsed.is_none() {
        warn!(key, value, "invalid env override, ignoring");
    }
    parsed
}

/// Parse `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, case-insensitively.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` in `min..=max`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a `u64` in `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a `usize` in `min..=max`.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}
