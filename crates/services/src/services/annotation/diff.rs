use similar::{Algorithm, DiffTag, capture_diff_slices};

/// One contiguous change between the reference lines and the buffer.
///
/// Line numbers are 1-based and inclusive. An end of `0` marks an empty
/// range: a pure insertion has `original_end == 0` and `original_start` set
/// to the reference line the new lines are inserted before; a pure deletion
/// has `modified_end == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineHunk {
    pub original_start: usize,
    pub original_end: usize,
    pub modified_start: usize,
    pub modified_end: usize,
}

impl LineHunk {
    pub fn is_insertion(&self) -> bool {
        self.original_end == 0
    }

    pub fn is_deletion(&self) -> bool {
        self.modified_end == 0
    }

    /// Buffer lines introduced by this hunk.
    pub fn modified_len(&self) -> usize {
        if self.is_deletion() {
            0
        } else {
            (self.modified_end + 1).saturating_sub(self.modified_start)
        }
    }
}

/// Line-diff primitive the remap engine consumes.
pub trait LineDiff: Send + Sync {
    /// Hunks ordered by original position.
    fn diff(&self, original: &[&str], modified: &[&str]) -> Vec<LineHunk>;
}

/// Myers line diff from `similar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarLineDiff;

impl LineDiff for SimilarLineDiff {
    fn diff(&self, original: &[&str], modified: &[&str]) -> Vec<LineHunk> {
        let ops = capture_diff_slices(Algorithm::Myers, original, modified);

        let mut hunks = Vec::new();
        // Half-open 0-based ranges of the change being accumulated
        let mut pending: Option<(usize, usize, usize, usize)> = None;

        for op in ops {
            let (tag, old, new) = op.as_tag_tuple();
            if tag == DiffTag::Equal {
                if let Some(range) = pending.take() {
                    hunks.push(to_hunk(range));
                }
                continue;
            }
            pending = Some(match pending {
                Some((old_start, _, new_start, _)) => (old_start, old.end, new_start, new.end),
                None => (old.start, old.end, new.start, new.end),
            });
        }
        if let Some(range) = pending {
            hunks.push(to_hunk(range));
        }
        hunks
    }
}

fn to_hunk((old_start, old_end, new_start, new_end): (usize, usize, usize, usize)) -> LineHunk {
    LineHunk {
        original_start: old_start + 1,
        original_end: if old_end > old_start { old_end } else { 0 },
        modified_start: new_start + 1,
        modified_end: if new_end > new_start { new_end } else { 0 },
    }
}
