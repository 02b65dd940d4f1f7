//! Case- and accent-insensitive term matching
//!
//! Text is folded (NFKD, combining marks dropped, lowercased) and every folded
//! byte remembers the byte range of the original character it came from, so
//! matches found in folded text map back to exact slices of the input.

use regex::Regex;
use std::ops::Range;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::error::{AdvisorError, Result};

/// Fold text for comparison: `"Não Há"` becomes `"nao ha"`
pub fn fold(text: &str) -> String {
    FoldedText::new(text).folded
}

pub(crate) struct FoldedText {
    folded: String,
    /// Original byte range for every byte of `folded`
    origin: Vec<(usize, usize)>,
}

impl FoldedText {
    pub(crate) fn new(text: &str) -> Self {
        let mut folded = String::with_capacity(text.len());
        let mut origin = Vec::with_capacity(text.len());

        for (start, ch) in text.char_indices() {
            let end = start + ch.len_utf8();
            for base in std::iter::once(ch).nfkd() {
                if is_combining_mark(base) {
                    continue;
                }
                for lower in base.to_lowercase() {
                    folded.push(lower);
                    origin.extend(std::iter::repeat((start, end)).take(lower.len_utf8()));
                }
            }
        }

        Self { folded, origin }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.folded
    }

    /// Original byte range covered by the folded range `start..end`
    pub(crate) fn original_range(&self, start: usize, end: usize) -> Range<usize> {
        self.origin[start].0..self.origin[end - 1].1
    }
}

/// One occurrence of a configured term in a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMatch {
    /// The term as configured
    pub term: String,
    /// Byte range in the original text, extended to the end of the word
    pub range: Range<usize>,
}

/// Finds configured terms on word starts.
///
/// A match must begin at a word boundary and is extended to the end of the
/// word it ends in, so `garantido` also removes `garantidos`.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    patterns: Vec<(String, Regex)>,
}

impl TermMatcher {
    pub fn new(terms: &[String]) -> Result<Self> {
        let mut patterns = Vec::new();
        for term in terms {
            let folded = fold(term);
            let words: Vec<String> = folded.split_whitespace().map(regex::escape).collect();
            if words.is_empty() {
                continue;
            }
            let regex = Regex::new(&words.join(r"\s+")).map_err(|e| {
                AdvisorError::ConfigError(format!("invalid forbidden term '{}': {}", term, e))
            })?;
            patterns.push((term.clone(), regex));
        }
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Every occurrence of every term, ordered by position then term order
    pub fn find_all(&self, text: &str) -> Vec<TermMatch> {
        let folded = FoldedText::new(text);
        let haystack = folded.as_str();
        let mut matches = Vec::new();

        for (term, regex) in &self.patterns {
            let mut pos = 0;
            while pos <= haystack.len() {
                let Some(found) = regex.find_at(haystack, pos) else {
                    break;
                };
                if found.is_empty() {
                    break;
                }
                if starts_word(haystack, found.start()) {
                    let end = word_end(haystack, found.end());
                    matches.push(TermMatch {
                        term: term.clone(),
                        range: folded.original_range(found.start(), end),
                    });
                    pos = end;
                } else {
                    pos = next_char_boundary(haystack, found.start());
                }
            }
        }

        // Terms sharing a prefix (`guarantee`, `guaranteed`) extend to the same word
        matches.sort_by_key(|m| (m.range.start, m.range.end));
        matches.dedup_by(|later, earlier| later.range == earlier.range);
        matches
    }
}

fn starts_word(text: &str, at: usize) -> bool {
    text[..at]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}

fn word_end(text: &str, from: usize) -> usize {
    let mut end = from;
    for c in text[from..].chars() {
        if !c.is_alphanumeric() {
            break;
        }
        end += c.len_utf8();
    }
    end
}

fn next_char_boundary(text: &str, at: usize) -> usize {
    text[at..]
        .chars()
        .next()
        .map_or(text.len() + 1, |c| at + c.len_utf8())
}
