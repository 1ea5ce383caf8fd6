//! Paths served without authentication.
//!
//! One pattern per line, first comma-separated field, `#` starts a comment.
//! Patterns containing `*` are shell globs over the whole path: `*` and `?`
//! stay within one segment, `[abc]`, `[a-z]` and `[^abc]` are character
//! classes and `\` escapes the next character. An unterminated `[` is taken
//! literally. Anything without `*` is a plain prefix.

use regex::Regex;
use std::path::Path;
use tracing::debug;

#[derive(Clone, Debug)]
enum Rule {
    Prefix(String),
    Glob(Regex),
}

impl Rule {
    fn parse(pattern: &str) -> Result<Self, regex::Error> {
        if !pattern.contains('*') {
            return Ok(Self::Prefix(pattern.to_string()));
        }
        Ok(Self::Glob(Regex::new(&glob_expr(pattern))?))
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Glob(regex) => regex.is_match(path),
        }
    }
}

fn literal(c: char) -> String {
    regex::escape(c.encode_utf8(&mut [0; 4]))
}

/// Anchored regex equivalent of a shell glob.
fn glob_expr(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut expr = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => expr.push_str("[^/]*"),
            '?' => expr.push_str("[^/]"),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                expr.push_str(&literal(chars[i]));
            }
            '[' => match class_expr(&chars[i + 1..]) {
                Some((class, used)) => {
                    expr.push_str(&class);
                    i += used;
                }
                None => expr.push_str(&literal('[')),
            },
            other => expr.push_str(&literal(other)),
        }
        i += 1;
    }
    expr.push('$');
    expr
}

/// Translates the body of a `[...]` class. Returns the regex class and how
/// many characters it consumed, `]` included.
fn class_expr(body: &[char]) -> Option<(String, usize)> {
    let mut class = String::from("[");
    let mut i = 0;
    if body.first() == Some(&'^') {
        class.push('^');
        i += 1;
    }
    let start = i;
    while i < body.len() {
        match body[i] {
            ']' if i > start => {
                class.push(']');
                return Some((class, i + 1));
            }
            '-' if i > start && body.get(i + 1).is_some_and(|c| *c != ']') => class.push('-'),
            '\\' if i + 1 < body.len() => {
                i += 1;
                class.push_str(&literal(body[i]));
            }
            c => class.push_str(&literal(c)),
        }
        i += 1;
    }
    None
}

#[derive(Clone, Debug, Default)]
pub struct IgnoreAuth {
    rules: Vec<Rule>,
}

impl IgnoreAuth {
    /// # Errors
    /// Returns an error if a glob pattern cannot be compiled.
    pub fn parse(contents: &str) -> Result<Self, regex::Error> {
        let mut rules = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let pattern = line.split(',').next().unwrap_or_default().trim();
            if pattern.is_empty() {
                continue;
            }
            rules.push(Rule::parse(pattern)?);
        }
        debug!("loaded {} ignore-auth rules", rules.len());
        Ok(Self { rules })
    }

    /// Reads a list from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or holds a bad pattern.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::parse(&contents)?)
    }

    #[must_use]
    pub fn is_ignored(&self, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(path))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
