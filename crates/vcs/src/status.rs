//! Parsing of status output and classification into resource groups.
//!
//! Two textual shapes are understood, selected explicitly by [`StatusFormat`]:
//!
//! ```text
//! two-column:     XY path[ -> renamed]
//! single-column:  C path
//! ```
//!
//! Both parsers skip lines that are not records and never fail; a garbled
//! trailing line is dropped.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{
    Resource, ResourceGroupKind, ResourceGroups, ResourceStatus, StatusCode, StatusEntry,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFormat {
    #[default]
    TwoColumn,
    SingleColumn,
}

impl StatusFormat {
    /// Arguments that make the external tool print this shape.
    pub fn args(self) -> &'static [&'static str] {
        match self {
            StatusFormat::TwoColumn => &[
                "-c",
                "core.quotepath=false",
                "status",
                "--porcelain",
                "--untracked-files=all",
            ],
            StatusFormat::SingleColumn => &["status"],
        }
    }

    pub fn parse(self, raw: &str) -> Vec<StatusEntry> {
        match self {
            StatusFormat::TwoColumn => parse_two_column(raw),
            StatusFormat::SingleColumn => parse_single_column(raw),
        }
    }
}

const CONFLICT_CODES: [&str; 7] = ["DD", "AU", "UD", "UA", "DU", "AA", "UU"];

fn is_two_column_code(c: char) -> bool {
    matches!(c, ' ' | 'M' | 'A' | 'D' | 'R' | 'C' | 'U' | 'T' | '?' | '!')
}

pub fn parse_two_column(raw: &str) -> Vec<StatusEntry> {
    raw.lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let entry = parse_two_column_line(line);
            if entry.is_none() {
                tracing::trace!(line, "skipping non-record status line");
            }
            entry
        })
        .collect()
}

fn parse_two_column_line(line: &str) -> Option<StatusEntry> {
    let mut chars = line.chars();
    let index = chars.next()?;
    let worktree = chars.next()?;
    if chars.next()? != ' ' || !is_two_column_code(index) || !is_two_column_code(worktree) {
        return None;
    }
    if index == ' ' && worktree == ' ' {
        return None;
    }

    let rest = chars.as_str();
    let (path, rename) = match rest.split_once(" -> ") {
        Some((from, to)) => (unquote(from), Some(unquote(to))),
        None => (unquote(rest), None),
    };
    if path.is_empty() {
        return None;
    }

    Some(StatusEntry {
        code: StatusCode::TwoColumn { index, worktree },
        path,
        rename,
    })
}

pub fn parse_single_column(raw: &str) -> Vec<StatusEntry> {
    raw.lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut chars = line.chars();
            let code = chars.next()?;
            if !matches!(code, '?' | '!' | 'M' | 'A' | 'R' | 'C' | 'I') || chars.next()? != ' ' {
                tracing::trace!(line, "skipping non-record status line");
                return None;
            }
            let path = unquote(chars.as_str());
            (!path.is_empty()).then_some(StatusEntry {
                code: StatusCode::SingleColumn(code),
                path,
                rename: None,
            })
        })
        .collect()
}

/// Undo C-style quoting applied to unusual paths.
fn unquote(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
    else {
        return raw.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut iter = inner.bytes().peekable();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        match iter.next() {
            Some(b'n') => bytes.push(b'\n'),
            Some(b't') => bytes.push(b'\t'),
            Some(b'"') => bytes.push(b'"'),
            Some(b'\\') => bytes.push(b'\\'),
            Some(d @ b'0'..=b'7') => {
                let mut digits = vec![d];
                while digits.len() < 3 {
                    match iter.peek() {
                        Some(&o @ b'0'..=b'7') => {
                            digits.push(o);
                            iter.next();
                        }
                        _ => break,
                    }
                }
                let value = digits
                    .iter()
                    .fold(0u32, |acc, o| acc * 8 + u32::from(o - b'0'));
                // Beyond one byte: keep the escape verbatim
                match u8::try_from(value) {
                    Ok(byte) => bytes.push(byte),
                    Err(_) => {
                        bytes.push(b'\\');
                        bytes.extend_from_slice(&digits);
                    }
                }
            }
            Some(other) => {
                bytes.push(b'\\');
                bytes.push(other);
            }
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Classify raw entries into a fresh generation of resource groups.
pub fn classify(root: &Path, entries: &[StatusEntry]) -> ResourceGroups {
    let mut groups = ResourceGroups::default();

    for entry in entries {
        let path = root.join(&entry.path);
        let rename = entry.rename.as_ref().map(|r| root.join(r));
        let resource = |group, status| Resource {
            group,
            path: path.clone(),
            status,
            rename: rename.clone(),
        };

        for (group, status) in statuses_for(entry.code) {
            groups.push(resource(group, status));
        }
    }

    groups
}

fn statuses_for(code: StatusCode) -> Vec<(ResourceGroupKind, ResourceStatus)> {
    use ResourceGroupKind::{Index, Merge, WorkingTree};

    match code {
        StatusCode::TwoColumn { index, worktree } => {
            let pair: String = [index, worktree].iter().collect();
            if CONFLICT_CODES.contains(&pair.as_str()) {
                let status = match pair.as_str() {
                    "DD" => ResourceStatus::BothDeleted,
                    "AU" => ResourceStatus::AddedByUs,
                    "UD" => ResourceStatus::DeletedByThem,
                    "UA" => ResourceStatus::AddedByThem,
                    "DU" => ResourceStatus::DeletedByUs,
                    "AA" => ResourceStatus::BothAdded,
                    _ => ResourceStatus::BothModified,
                };
                return vec![(Merge, status)];
            }

            let mut out = Vec::with_capacity(2);
            let index_status = match index {
                'M' => Some(ResourceStatus::IndexModified),
                'A' => Some(ResourceStatus::IndexAdded),
                'D' => Some(ResourceStatus::IndexDeleted),
                'R' => Some(ResourceStatus::IndexRenamed),
                'C' => Some(ResourceStatus::IndexCopied),
                _ => None,
            };
            if let Some(status) = index_status {
                out.push((Index, status));
            }

            let worktree_status = match worktree {
                'M' => Some(ResourceStatus::Modified),
                'D' => Some(ResourceStatus::Deleted),
                '?' => Some(ResourceStatus::Untracked),
                '!' => Some(ResourceStatus::Ignored),
                _ => None,
            };
            if let Some(status) = worktree_status {
                out.push((WorkingTree, status));
            }
            out
        }
        StatusCode::SingleColumn(c) => {
            let status = match c {
                '?' => ResourceStatus::Untracked,
                '!' => ResourceStatus::Missing,
                'M' => ResourceStatus::Modified,
                'A' => ResourceStatus::Added,
                'R' => ResourceStatus::Deleted,
                'C' => return vec![(Merge, ResourceStatus::Conflict)],
                'I' => ResourceStatus::Ignored,
                _ => return Vec::new(),
            };
            vec![(WorkingTree, status)]
        }
    }
}
