// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Glob patterns matched against the first path component to refuse
//! mounting. The original matches with `fnmatch(3)`; here each glob is
//! compiled once into a `regex::Regex` (the teacher's own pattern-matching
//! crate) rather than pulling in a separate glob-matching dependency.

use anyhow::Context;
use regex::Regex;
use std::fs;
use std::path::Path;

#[derive(Debug, Default)]
pub struct FilterSet {
    patterns: Vec<Regex>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading filter_file {:?}", path))?;
        Self::from_lines(contents.lines())
    }

    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Self> {
        let mut patterns = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            patterns.push(
                compile_glob(line).with_context(|| format!("invalid filter pattern {:?}", line))?,
            );
        }
        Ok(FilterSet { patterns })
    }

    /// `true` if `name` matches any filter pattern (the name is refused).
    pub fn is_filtered(&self, name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(name))
    }
}

/// Translates one shell-glob pattern (`*`, `?`, `[...]`, `[!...]`) into an
/// anchored regular expression.
fn compile_glob(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(glob.len() + 2);
    pattern.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            '[' => {
                pattern.push('[');
                if let Some(&'!') = chars.peek() {
                    chars.next();
                    pattern.push('^');
                }
                for c2 in chars.by_ref() {
                    if c2 == ']' {
                        pattern.push(']');
                        break;
                    }
                    if c2 == '\\' || c2 == '^' {
                        pattern.push('\\');
                    }
                    pattern.push(c2);
                }
            }
            c if is_regex_special(c) => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

fn is_regex_special(c: char) -> bool {
    matches!(c, '.' | '+' | '(' | ')' | '|' | '^' | '$' | '\\' | '{' | '}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_prefix() {
        let filters = FilterSet::from_lines(["bad*"]).unwrap();
        assert!(filters.is_filtered("badness"));
        assert!(!filters.is_filtered("goodness"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let filters = FilterSet::from_lines(["a?c"]).unwrap();
        assert!(filters.is_filtered("abc"));
        assert!(!filters.is_filtered("ac"));
        assert!(!filters.is_filtered("abbc"));
    }

    #[test]
    fn character_class_and_negation() {
        let filters = FilterSet::from_lines(["[abc]*", "[!xyz]oo"]).unwrap();
        assert!(filters.is_filtered("apple"));
        assert!(filters.is_filtered("foo"));
        assert!(!filters.is_filtered("xoo"));
    }

    #[test]
    fn comment_and_blank_lines_are_ignored() {
        let filters = FilterSet::from_lines(["# comment", "", "bad*"]).unwrap();
        assert!(filters.is_filtered("badness"));
        assert!(!filters.is_filtered("# comment"));
    }

    #[test]
    fn dots_in_pattern_are_literal() {
        let filters = FilterSet::from_lines(["a.b"]).unwrap();
        assert!(filters.is_filtered("a.b"));
        assert!(!filters.is_filtered("axb"));
    }
}
