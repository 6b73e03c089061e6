//! Parser for porcelain annotate output.
//!
//! Each annotated line starts with a header `<hash> <orig> <final> [<count>]`,
//! followed by commit metadata the first time a hash is seen, and ends with
//! the line content prefixed by a tab.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{LineAnnotation, UNCOMMITTED_HASH};

#[derive(Debug, Default, Clone)]
struct CommitMeta {
    author: String,
    author_time: Option<i64>,
    summary: String,
}

fn is_header(line: &str) -> Option<&str> {
    let hash = line.split(' ').next()?;
    (hash.len() == 40 && hash.bytes().all(|b| b.is_ascii_hexdigit())).then_some(hash)
}

/// Parse annotate output into one entry per line of the annotated file.
///
/// Malformed input yields the annotations recovered so far.
pub fn parse_porcelain(raw: &str) -> Vec<LineAnnotation> {
    let mut commits: HashMap<String, CommitMeta> = HashMap::new();
    let mut out = Vec::new();
    let mut current: Option<String> = None;

    for line in raw.lines() {
        if line.starts_with('\t') {
            let Some(hash) = current.take() else {
                tracing::warn!("annotate content line without header; stopping");
                break;
            };
            let meta = commits.get(&hash).cloned().unwrap_or_default();
            out.push(to_annotation(hash, meta));
            continue;
        }

        if current.is_none() {
            match is_header(line) {
                Some(hash) => {
                    commits.entry(hash.to_string()).or_default();
                    current = Some(hash.to_string());
                }
                None if line.trim().is_empty() => {}
                None => {
                    tracing::warn!(line, "unexpected annotate line; stopping");
                    break;
                }
            }
            continue;
        }

        let Some(hash) = current.as_deref() else {
            continue;
        };
        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        let meta = commits.entry(hash.to_string()).or_default();
        match key {
            "author" => meta.author = value.to_string(),
            "author-time" => meta.author_time = value.parse().ok(),
            "summary" => meta.summary = value.to_string(),
            _ => {}
        }
    }

    out
}

fn to_annotation(hash: String, meta: CommitMeta) -> LineAnnotation {
    if hash == UNCOMMITTED_HASH {
        return LineAnnotation::uncommitted();
    }
    LineAnnotation {
        commit_hash: hash,
        author: meta.author,
        date: meta
            .author_time
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        description_summary: meta.summary,
    }
}
