use std::iter;

use vcs::LineAnnotation;

use super::diff::LineHunk;

/// Carry annotations of the reference lines over to the buffer.
///
/// Unchanged lines keep their annotation; every line a hunk introduces gets
/// the uncommitted placeholder. Ranges past the end of `cached` are clamped,
/// which also covers deletions that run to end of file.
pub fn remap(cached: &[LineAnnotation], hunks: &[LineHunk]) -> Vec<LineAnnotation> {
    let mut out = Vec::with_capacity(cached.len());
    let mut cursor = 0;

    for hunk in hunks {
        let unchanged_until = hunk.original_start.saturating_sub(1).min(cached.len());
        if unchanged_until > cursor {
            out.extend_from_slice(&cached[cursor..unchanged_until]);
            cursor = unchanged_until;
        }

        out.extend(iter::repeat_with(LineAnnotation::uncommitted).take(hunk.modified_len()));

        if !hunk.is_insertion() {
            cursor = cursor.max(hunk.original_end.min(cached.len()));
        }
    }

    if cursor < cached.len() {
        out.extend_from_slice(&cached[cursor..]);
    }
    out
}
