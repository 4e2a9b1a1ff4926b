// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Name-based metric filtering.

use std::fmt;

use regex_lite::Regex;

/// Decides which metric names a snapshot includes.
///
/// With no include patterns every name matches; with include patterns a name
/// must match one of them. A matching exclude pattern always wins.
///
/// Patterns are compared as exact names by default. When built with
/// `use_regex`, each pattern compiles to a regular expression that must match
/// the whole name, so `"request.*"` matches `"requests"` but not
/// `"http_requests"`.
#[derive(Debug, Default)]
pub struct MetricFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl MetricFilter {
    /// A filter that matches every metric name.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter from include and exclude patterns.
    ///
    /// Returns an error if `use_regex` is set and a pattern fails to compile.
    pub fn new<I, E>(includes: I, excludes: E, use_regex: bool) -> Result<Self, InvalidPatternError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Ok(Self {
            includes: Pattern::compile_all(includes, use_regex)?,
            excludes: Pattern::compile_all(excludes, use_regex)?,
        })
    }

    /// `true` if a metric with this name should be reported.
    pub fn matches(&self, name: &str) -> bool {
        if self.excludes.iter().any(|pattern| pattern.matches(name)) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|pattern| pattern.matches(name))
    }
}

#[derive(Debug)]
enum Pattern {
    Exact(String),
    Regex(Regex),
}

impl Pattern {
    fn compile_all<I>(patterns: I, use_regex: bool) -> Result<Vec<Self>, InvalidPatternError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        patterns
            .into_iter()
            .map(|pattern| Self::compile(pattern.as_ref(), use_regex))
            .collect()
    }

    fn compile(pattern: &str, use_regex: bool) -> Result<Self, InvalidPatternError> {
        if use_regex {
            // Anchored so a pattern must match the whole name, not a substring.
            match Regex::new(&format!("^(?:{pattern})$")) {
                Ok(regex) => Ok(Self::Regex(regex)),
                Err(source) => Err(InvalidPatternError {
                    pattern: pattern.to_string(),
                    source,
                }),
            }
        } else {
            Ok(Self::Exact(pattern.to_string()))
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(pattern) => pattern == name,
            Self::Regex(regex) => regex.is_match(name),
        }
    }
}

/// A filter pattern that failed to compile as a regular expression.
#[derive(Debug)]
pub struct InvalidPatternError {
    pattern: String,
    source: regex_lite::Error,
}

impl InvalidPatternError {
    /// The pattern that failed to compile.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Display for InvalidPatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid metric filter pattern {:?}: {}",
            self.pattern, self.source
        )
    }
}

impl std::error::Error for InvalidPatternError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
