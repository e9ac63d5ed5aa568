//! `KEY=value` settings source

use std::collections::HashMap;

use tracing::warn;

/// Ordered key/value pairs read from a settings file.
///
/// Later assignments of the same key win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsSource {
    entries: Vec<(String, String)>,
}

impl SettingsSource {
    /// Parse `KEY=value` lines. Blank and `#` lines are ignored.
    ///
    /// Values may be quoted. A ` #` after an unquoted value, or after the closing quote, starts
    /// a comment; `#` inside a word or inside quotes is kept.
    pub fn parse(text: &str) -> Self {
        let mut source = Self::default();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

            let Some((key, value)) = line.split_once('=') else {
                warn!("Ignoring line {} without '=' in settings source", idx + 1);
                continue;
            };

            let key = key.trim();
            if key.is_empty() {
                warn!("Ignoring line {} with an empty key", idx + 1);
                continue;
            }
            source.set(key, parse_value(value.trim()));
        }

        source
    }

    /// Get the effective value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get a key's value, treating empty (or whitespace-only) as absent
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// Assign a key, replacing any earlier value
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Let non-empty process environment values override the listed keys
    pub fn overlay(&mut self, env: &HashMap<String, String>, keys: &[&str]) {
        for key in keys {
            if let Some(value) = env.get(*key).filter(|v| !v.is_empty()) {
                self.set(key, value.clone());
            }
        }
    }

    /// Keys in first-seen order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

fn parse_value(value: &str) -> &str {
    if let Some(quote) = value.chars().next().filter(|c| *c == '"' || *c == '\'') {
        if let Some(end) = value[1..].find(quote) {
            let rest = value[end + 2..].trim_start();
            if rest.is_empty() || rest.starts_with('#') {
                return &value[1..end + 1];
            }
        }
        // unbalanced or trailing text: taken literally
        return value;
    }
    strip_comment(value)
}

fn strip_comment(value: &str) -> &str {
    let comment = value
        .char_indices()
        .find(|&(i, c)| c == '#' && i > 0 && value[..i].ends_with(char::is_whitespace))
        .map(|(i, _)| i);
    match comment {
        Some(i) => value[..i].trim_end(),
        None => value,
    }
}
