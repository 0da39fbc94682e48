//! Localized strings loaded from a `key:value` file.
//!
//! ```text
//! # comment
//! Accounts.Login.Success:Welcome back, {0}!
//! ```
//!
//! The key is everything before the first `:`, the value everything after it
//! with tab characters removed. Lines starting with `#` or without a `:` are
//! skipped. Unknown keys translate to themselves.

use crate::error::{ProtocolError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct LanguageResource {
    path: Option<PathBuf>,
    sentences: RwLock<Arc<HashMap<String, String>>>,
}

impl LanguageResource {
    /// An empty table; every key translates to itself.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table backed by `path`. Nothing is read until [`reload`](Self::reload).
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            sentences: RwLock::default(),
        }
    }

    /// A table built from in-memory text.
    pub fn from_text(text: &str) -> Self {
        Self {
            path: None,
            sentences: RwLock::new(Arc::new(parse(text))),
        }
    }

    /// Re-read the backing file and swap the table in.
    ///
    /// A missing file or one with no usable lines leaves the current table in
    /// place and returns `Ok(0)`.
    pub fn reload(&self) -> Result<usize> {
        let Some(ref path) = self.path else {
            return Ok(0);
        };
        if !path.exists() {
            warn!(path = %path.display(), "Language file not found");
            return Ok(0);
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::ConfigError(format!(
                "Failed to read language file {}: {e}",
                path.display()
            ))
        })?;
        let table = parse(&text);
        if table.is_empty() {
            warn!(path = %path.display(), "Language file has no entries");
            return Ok(0);
        }

        let count = table.len();
        *self.sentences.write() = Arc::new(table);
        info!(path = %path.display(), entries = count, "Language file loaded");
        Ok(count)
    }

    /// Look up `id` and substitute `{0}`, `{1}`, … with `args`.
    ///
    /// A placeholder with no matching argument leaves the text unformatted.
    pub fn translate(&self, id: &str, args: &[&dyn Display]) -> String {
        let table = self.sentences.read().clone();
        match table.get(id) {
            Some(template) => match format_args_indexed(template, args) {
                Some(text) => text,
                None => {
                    warn!(id, arg_count = args.len(), "Translation placeholder count mismatch");
                    template.clone()
                }
            },
            None => id.to_string(),
        }
    }

    /// [`translate`](Self::translate) with no arguments.
    pub fn get(&self, id: &str) -> String {
        self.translate(id, &[])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sentences.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sentences.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.to_string(), value.replace('\t', "")))
        .collect()
}

/// Replace `{n}` placeholders. `None` if one refers past the end of `args`.
fn format_args_indexed(template: &str, args: &[&dyn Display]) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => match after[..close].parse::<usize>() {
                Ok(index) => {
                    out.push_str(&args.get(index)?.to_string());
                    rest = &after[close + 1..];
                }
                Err(_) => {
                    out.push('{');
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines() {
        let lang = LanguageResource::from_text(
            "# header\nGreeting:Hello\t{0}\nno separator here\nUrl:http://x\n",
        );
        assert_eq!(lang.len(), 2);
        assert_eq!(lang.translate("Greeting", &[&"Ana"]), "Hello Ana");
        assert_eq!(lang.get("Url"), "http://x");
    }

    #[test]
    fn unknown_key_is_identity() {
        let lang = LanguageResource::new();
        assert_eq!(lang.get("Missing.Key"), "Missing.Key");
    }

    #[test]
    fn missing_argument_returns_template() {
        let lang = LanguageResource::from_text("Pair:{0} and {1}");
        assert_eq!(lang.translate("Pair", &[&1]), "{0} and {1}");
        assert_eq!(lang.translate("Pair", &[&1, &2]), "1 and 2");
    }
}
