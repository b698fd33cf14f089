//! Fuzzy file matching for file-retrieval requests.
//!
//! A request like "open the quartely report" is reduced to its content
//! words and compared against each known file's name and description.
//! Comparison ignores case, file extensions and `_`/`-` separators, and
//! tolerates small spelling differences through a character-level
//! similarity ratio.

use similar::TextDiff;

use crate::models::{FileMatch, FileRecord};

const REQUEST_WORDS: &[&str] = &[
    "open", "show", "me", "the", "file", "files", "get", "pull", "up", "fetch", "please", "a",
    "an", "my", "download", "named", "called", "find", "document", "doc", "can", "you", "i",
    "want", "need", "to", "see", "of",
];

const EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "md", "xls", "xlsx", "csv", "ppt", "pptx", "json", "rtf",
];

/// Lowercase, drop a trailing extension, turn separators into spaces.
fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let stem = match lower.rsplit_once('.') {
        Some((stem, ext)) if EXTENSIONS.contains(&ext) => stem.to_string(),
        _ => lower,
    };
    tokens(&stem).join(" ")
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == '_' || c == '-' || c == '.' || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_string()
        })
        .filter(|t| !t.is_empty() && !EXTENSIONS.contains(&t.as_str()))
        .collect()
}

/// Content words of a file request.
fn normalize_query(query: &str) -> Vec<String> {
    tokens(&query.to_lowercase())
        .into_iter()
        .filter(|t| !REQUEST_WORDS.contains(&t.as_str()))
        .collect()
}

fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    TextDiff::from_chars(a, b).ratio() as f64
}

/// Fraction of query tokens that occur inside the name.
fn containment(query_tokens: &[String], name: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let hits = query_tokens.iter().filter(|t| name.contains(t.as_str())).count();
    hits as f64 / query_tokens.len() as f64
}

/// Score one file against an already-normalized query.
fn score(query_tokens: &[String], file: &FileRecord) -> f64 {
    let query = query_tokens.join(" ");
    let name = normalize_name(&file.name);
    let description = file.description.trim().to_lowercase();

    let name_score = ratio(&query, &name);
    let description_score = ratio(&query, &description);
    let contained = containment(query_tokens, &name);

    name_score.max(description_score).max(contained)
}

/// Files whose name or description is similar to `query`, best first.
pub fn match_files(query: &str, files: &[FileRecord], threshold: f64) -> Vec<FileMatch> {
    let query_tokens = normalize_query(query);
    if query_tokens.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<FileMatch> = files
        .iter()
        .filter_map(|file| {
            let similarity = score(&query_tokens, file);
            (similarity >= threshold).then(|| FileMatch {
                file: file.clone(),
                similarity,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}

/// User-visible summary of a file-match result.
pub fn render_matches(matches: &[FileMatch]) -> String {
    if matches.is_empty() {
        return "No matching files found.".to_string();
    }
    let mut out = format!(
        "Found {} matching file{}:\n",
        matches.len(),
        if matches.len() == 1 { "" } else { "s" }
    );
    for (i, m) in matches.iter().enumerate() {
        out.push_str(&format!("{}. {}", i + 1, m.file.name));
        if let Some(collection) = &m.file.collection {
            out.push_str(&format!(" ({})", collection));
        }
        out.push_str(&format!(" [{:.0}%]", m.similarity * 100.0));
        if !m.file.description.is_empty() {
            out.push_str(&format!(" - {}", m.file.description));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}
