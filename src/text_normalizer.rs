/*!
 * Text cleaning between document extraction and speech synthesis.
 *
 * Extracted document text carries layout noise that sounds wrong when read
 * aloud: page numbers, running headers and footers, hyphenated line breaks,
 * bullets and private-use glyphs. `normalize` removes that noise and yields a
 * `NormalizedText` that is guaranteed to contain speakable characters.
 */

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::EmptyContentError;

// @const: Page-number-only lines ("12", "Page 3", "3 / 10", "- 4 -", "page 2 of 9")
static PAGE_NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:-\s*\d+\s*-|(?:page|p\.)?\s*\d+(?:\s*(?:/|of)\s*\d+)?)$").unwrap()
});

// @const: Whitespace runs
static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// @const: Word fragment broken by a hyphen at the end of a line
static HYPHEN_BREAK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\p{L})-\n\s*(\p{Ll})").unwrap()
});

/// Lines longer than this are never treated as running headers or footers
const MAX_HEADER_CHARS: usize = 80;

/// Lines at the top and bottom of a page that may hold headers, footers or page numbers
const EDGE_LINES: usize = 2;

/// Pages needed before a repeated line counts as a running header
const MIN_PAGES_FOR_HEADERS: usize = 3;

/// Raw text as it came out of a document source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentText(String);

impl DocumentText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for DocumentText {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for DocumentText {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// Cleaned narration text
///
/// Only `normalize` can build one, so holding a `NormalizedText` means the
/// text has at least one alphanumeric character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Clean raw document text for narration
pub fn normalize(raw: &DocumentText) -> Result<NormalizedText, EmptyContentError> {
    let unescaped = raw.as_str().replace("\\'", "'").replace("\r\n", "\n");

    // Without form feeds there are no page boundaries, so no page furniture either
    let paginated = unescaped.contains('\x0c');
    let pages: Vec<Vec<&str>> = unescaped
        .split('\x0c')
        .map(|page| page.lines().map(str::trim).collect())
        .collect();

    let repeated = if paginated { repeated_edge_lines(&pages) } else { HashSet::new() };
    if !repeated.is_empty() {
        debug!("Dropping {} repeated header/footer line(s)", repeated.len());
    }

    let mut kept = String::with_capacity(unescaped.len());
    for page in &pages {
        let edges = edge_indices(page);
        for (idx, line) in page.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            if paginated && edges.contains(&idx) && (is_page_number(line) || repeated.contains(*line)) {
                continue;
            }
            kept.push_str(line);
            kept.push('\n');
        }
    }

    let joined = HYPHEN_BREAK_REGEX.replace_all(&kept, "$1$2");

    let speakable: String = joined
        .chars()
        .map(|c| if is_speakable(c) { c } else { ' ' })
        .collect();

    let collapsed = WHITESPACE_REGEX.replace_all(&speakable, " ").trim().to_string();

    if !collapsed.chars().any(char::is_alphanumeric) {
        return Err(EmptyContentError);
    }

    debug!(
        "Normalized {} raw chars into {} narration chars",
        raw.as_str().chars().count(),
        collapsed.chars().count()
    );
    Ok(NormalizedText(collapsed))
}

fn is_page_number(line: &str) -> bool {
    PAGE_NUMBER_REGEX.is_match(line)
}

/// Indices of the first and last few non-empty lines of a page
fn edge_indices(page: &[&str]) -> Vec<usize> {
    let filled: Vec<usize> = page
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(idx, _)| idx)
        .collect();
    let head = filled.iter().take(EDGE_LINES);
    let tail = filled.iter().rev().take(EDGE_LINES);
    head.chain(tail).copied().collect()
}

/// Short page-edge lines that repeat across pages (running headers and footers)
fn repeated_edge_lines<'a>(pages: &[Vec<&'a str>]) -> HashSet<&'a str> {
    // pdftotext ends every page with a form feed, leaving a blank tail page
    let pages: Vec<&Vec<&str>> = pages
        .iter()
        .filter(|page| page.iter().any(|line| !line.is_empty()))
        .collect();

    if pages.len() < MIN_PAGES_FOR_HEADERS {
        return HashSet::new();
    }

    let mut counts: HashMap<&'a str, usize> = HashMap::new();
    for page in &pages {
        let mut seen_on_page: HashSet<&str> = HashSet::new();
        for idx in edge_indices(page) {
            let line = page[idx];
            if is_header_candidate(line) && seen_on_page.insert(line) {
                *counts.entry(line).or_default() += 1;
            }
        }
    }

    let threshold = pages.len() / 2;
    counts
        .into_iter()
        .filter(|(_, count)| *count > threshold)
        .map(|(line, _)| line)
        .collect()
}

fn is_header_candidate(line: &str) -> bool {
    !line.is_empty() && line.chars().count() <= MAX_HEADER_CHARS
}

fn is_speakable(c: char) -> bool {
    if c.is_alphanumeric() || c.is_whitespace() {
        return true;
    }
    if c.is_control() {
        return false;
    }
    matches!(
        c,
        '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"' | '(' | ')' | '-' | '%' | '&'
            | '$' | '€' | '£' | '/' | '+' | '=' | '@' | '#'
            | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}' | '\u{2013}' | '\u{2014}'
    )
}
