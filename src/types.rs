//! Shared types for git-fastclone

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("value cannot be empty")]
    Empty,
    #[error("value cannot start with '{0}'")]
    InvalidStart(char),
    #[error("value cannot contain control characters")]
    ControlCharacter,
}

/// A remote repository URL.
///
/// The URL is treated as an opaque identity. Validation only rejects values
/// git would misread:
/// - Empty strings
/// - Strings starting with `-` (would be parsed as an option)
/// - Strings containing null bytes or control characters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoUrl(String);

impl RepoUrl {
    /// Returns the URL as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory name a plain `git clone` would pick for this URL.
    ///
    /// Takes the last path segment and strips a trailing `.git`.
    pub fn checkout_name(&self) -> Option<&str> {
        let trimmed = self.0.trim_end_matches('/');
        let segment = trimmed
            .rsplit(['/', ':'])
            .next()
            .unwrap_or(trimmed);
        let name = segment.strip_suffix(".git").unwrap_or(segment);

        if name.is_empty() || name == "." || name == ".." {
            None
        } else {
            Some(name)
        }
    }
}

impl FromStr for RepoUrl {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        if s.starts_with('-') {
            return Err(ParseError::InvalidStart('-'));
        }

        if s.chars().any(char::is_control) {
            return Err(ParseError::ControlCharacter);
        }

        Ok(RepoUrl(s.to_string()))
    }
}

impl fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cache key of a reference mirror.
///
/// Derived from a URL by dropping the scheme and any `user@` prefix, then
/// flattening `/` and `:` into `-`. URLs that only differ by scheme or auth
/// segment share a key, and therefore a mirror and a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MirrorKey(String);

impl MirrorKey {
    /// Separator that replaces `/` and `:` in keys
    pub const SEPARATOR: char = '-';

    pub fn from_url(url: &RepoUrl) -> Self {
        let rest = url.as_str();
        let rest = match rest.rfind("://") {
            Some(idx) => &rest[idx + 3..],
            None => rest,
        };
        let rest = match rest.split_once('@') {
            Some((_auth, host)) => host,
            None => rest,
        };

        MirrorKey(rest.replace(['/', ':'], &Self::SEPARATOR.to_string()))
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MirrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
