//! Name patterns shared by the quick filter and per-folder filters.

use regex::{Regex, RegexBuilder};

/// A compiled name pattern.
///
/// Plain text matches case-insensitively as a substring. A pattern
/// containing `*` or `?` is an anchored, case-insensitive glob where `*` is
/// any run of characters and `?` is exactly one. A glob that fails to
/// compile falls back to substring matching. Surrounding whitespace is
/// part of the pattern; a blank pattern matches everything.
#[derive(Debug, Clone)]
pub enum NamePattern {
    /// Matches every name.
    Any,
    /// Lower-cased needle.
    Substring(String),
    Glob(Regex),
}

impl NamePattern {
    pub fn new(pattern: &str) -> Self {
        if pattern.trim().is_empty() {
            return Self::Any;
        }
        if !is_glob(pattern) {
            return Self::Substring(pattern.to_lowercase());
        }
        match RegexBuilder::new(&glob_to_regex(pattern))
            .case_insensitive(true)
            .build()
        {
            Ok(re) => Self::Glob(re),
            Err(e) => {
                tracing::debug!(pattern, error = %e, "glob did not compile, using substring match");
                Self::Substring(pattern.to_lowercase())
            }
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Substring(needle) => name.to_lowercase().contains(needle.as_str()),
            Self::Glob(re) => re.is_match(name),
        }
    }

    pub fn is_glob(&self) -> bool {
        matches!(self, Self::Glob(_))
    }
}

/// Returns `true` if `pattern` contains glob metacharacters.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

fn glob_to_regex(pattern: &str) -> String {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    re
}
