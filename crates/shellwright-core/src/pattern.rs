//! Start/end pattern parsing.
//!
//! Patterns use `regex` syntax. A pattern may also be written in delimited
//! form, `/body/flags`, where `flags` is any combination of `imsxU`. The
//! delimiters are stripped and the flags become an inline `(?flags)` group,
//! so `/\$ $/m` and `(?m)\$ $` compile to the same matcher.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{Error, Result};

lazy_static! {
    static ref DELIMITED: Regex = Regex::new(r"(?s)^/(.*)/([imsxU]*)$").unwrap();
}

/// A compiled start or end pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Parse and compile a pattern.
    ///
    /// An empty pattern, or a delimited pattern with an empty body, is
    /// rejected as a compilation failure rather than matching everything.
    pub fn parse(source: &str) -> Result<Self> {
        let (body, flags) = match DELIMITED.captures(source) {
            Some(caps) => (
                caps.get(1).map_or("", |m| m.as_str()),
                caps.get(2).map_or("", |m| m.as_str()),
            ),
            None => (source, ""),
        };

        if body.is_empty() {
            return Err(Error::Regex {
                pattern: source.to_string(),
                reason: "empty pattern".to_string(),
            });
        }

        let expr = if flags.is_empty() {
            body.to_string()
        } else {
            format!("(?{flags}){body}")
        };

        let regex = Regex::new(&expr).map_err(|e| Error::Regex {
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Check whether the pattern matches anywhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The pattern as originally supplied.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}
