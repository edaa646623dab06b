//! Path patterns and locations.
//!
//! Patterns use the `/a/:id` syntax: literal segments match themselves,
//! `:name` captures one segment, `:name?` captures an optional segment and
//! `:name*` captures the rest of the path. A trailing slash is optional.

use std::collections::BTreeMap;

use regex::Regex;
use url::Url;

/// A compiled route path pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    regex: Regex,
    keys: Vec<String>,
}

impl RoutePattern {
    pub fn compile(path: &str) -> Result<Self, regex::Error> {
        let mut expr = String::from("^");
        let mut keys = Vec::new();

        for segment in path.trim_end_matches('/').split('/').skip(1) {
            if let Some(param) = segment.strip_prefix(':') {
                let (name, modifier) = match param.chars().last() {
                    Some('?') => (&param[..param.len() - 1], Some('?')),
                    Some('*') => (&param[..param.len() - 1], Some('*')),
                    _ => (param, None),
                };
                match modifier {
                    Some('?') => expr.push_str(&format!("(?:/(?P<{}>[^/]+))?", name)),
                    Some('*') => expr.push_str(&format!("/(?P<{}>.+?)", name)),
                    _ => expr.push_str(&format!("/(?P<{}>[^/]+)", name)),
                }
                keys.push(name.to_string());
            } else {
                expr.push('/');
                expr.push_str(&regex::escape(segment));
            }
        }
        expr.push_str("/?$");

        Ok(Self {
            source: path.to_string(),
            regex: Regex::new(&expr)?,
            keys,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a path (no query) and return the captured parameters.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let captures = self.regex.captures(path)?;
        Some(
            self.keys
                .iter()
                .filter_map(|key| {
                    captures
                        .name(key)
                        .map(|m| (key.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

/// A navigation target split into path and query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl Location {
    /// Parse an app-relative location such as `/a/123?q=tag:foo`.
    pub fn parse(location: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse("http://sidebar.invalid/")?;
        let url = base.join(location)?;
        Ok(Self {
            path: url.path().to_string(),
            query: url.query_pairs().into_owned().collect(),
        })
    }
}
