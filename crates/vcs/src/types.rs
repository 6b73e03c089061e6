use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Every operation the model can run against a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Status,
    Add,
    RevertFiles,
    Commit,
    Clean,
    Branch,
    Checkout,
    Reset,
    Fetch,
    Pull,
    Push,
    Sync,
    Init,
    Show,
    Stage,
    GetCommitTemplate,
}

impl OperationKind {
    pub const ALL: [OperationKind; 16] = [
        OperationKind::Status,
        OperationKind::Add,
        OperationKind::RevertFiles,
        OperationKind::Commit,
        OperationKind::Clean,
        OperationKind::Branch,
        OperationKind::Checkout,
        OperationKind::Reset,
        OperationKind::Fetch,
        OperationKind::Pull,
        OperationKind::Push,
        OperationKind::Sync,
        OperationKind::Init,
        OperationKind::Show,
        OperationKind::Stage,
        OperationKind::GetCommitTemplate,
    ];

    /// Read-only operations skip the post-run status refresh and the
    /// mutation permit.
    pub fn is_read_only(self) -> bool {
        matches!(self, OperationKind::Show | OperationKind::GetCommitTemplate)
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Immutable set of running operations.
///
/// Kinds are counted, so two overlapping runs of the same kind keep the flag
/// raised until both have ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationsInProgress {
    flags: u32,
    counts: [u16; 16],
}

impl OperationsInProgress {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn start(&self, op: OperationKind) -> Self {
        let mut next = self.clone();
        let slot = &mut next.counts[op as usize];
        *slot = slot.saturating_add(1);
        next.flags |= op.bit();
        next
    }

    #[must_use]
    pub fn end(&self, op: OperationKind) -> Self {
        let mut next = self.clone();
        let slot = &mut next.counts[op as usize];
        *slot = slot.saturating_sub(1);
        if *slot == 0 {
            next.flags &= !op.bit();
        }
        next
    }

    pub fn is_running(&self, op: OperationKind) -> bool {
        self.flags & op.bit() != 0
    }

    pub fn is_idle(&self) -> bool {
        self.flags == 0
    }

    pub fn running(&self) -> impl Iterator<Item = OperationKind> + '_ {
        OperationKind::ALL
            .into_iter()
            .filter(|op| self.is_running(*op))
    }
}

/// Lifecycle of the repository handle owned by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryState {
    Uninitialized,
    Idle,
    NotARepository,
}

/// Raw status code columns as printed by the external tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    TwoColumn { index: char, worktree: char },
    SingleColumn(char),
}

/// One status record exactly as emitted by the external tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub code: StatusCode,
    pub path: String,
    pub rename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceStatus {
    IndexModified,
    IndexAdded,
    IndexDeleted,
    IndexRenamed,
    IndexCopied,
    Modified,
    Deleted,
    Untracked,
    Ignored,
    Missing,
    /// Scheduled for addition by a single-column backend
    Added,
    /// Unresolved merge reported by a single-column backend
    Conflict,
    BothAdded,
    BothDeleted,
    BothModified,
    AddedByUs,
    AddedByThem,
    DeletedByUs,
    DeletedByThem,
}

impl ResourceStatus {
    pub fn is_conflict(self) -> bool {
        matches!(
            self,
            ResourceStatus::Conflict
                | ResourceStatus::BothAdded
                | ResourceStatus::BothDeleted
                | ResourceStatus::BothModified
                | ResourceStatus::AddedByUs
                | ResourceStatus::AddedByThem
                | ResourceStatus::DeletedByUs
                | ResourceStatus::DeletedByThem
        )
    }

    /// Whether the tool reports a renamed path under its new name for this kind.
    pub fn shows_new_name(self) -> bool {
        matches!(
            self,
            ResourceStatus::IndexRenamed | ResourceStatus::Modified | ResourceStatus::Deleted
        )
    }

    /// One-letter badge for UI decorations.
    pub fn letter(self) -> char {
        match self {
            ResourceStatus::IndexModified | ResourceStatus::Modified => 'M',
            ResourceStatus::IndexAdded | ResourceStatus::Added => 'A',
            ResourceStatus::IndexDeleted | ResourceStatus::Deleted => 'D',
            ResourceStatus::IndexRenamed => 'R',
            ResourceStatus::IndexCopied => 'C',
            ResourceStatus::Untracked => 'U',
            ResourceStatus::Ignored => 'I',
            ResourceStatus::Missing => '!',
            ResourceStatus::Conflict
            | ResourceStatus::BothAdded
            | ResourceStatus::BothDeleted
            | ResourceStatus::BothModified
            | ResourceStatus::AddedByUs
            | ResourceStatus::AddedByThem
            | ResourceStatus::DeletedByUs
            | ResourceStatus::DeletedByThem => 'C',
        }
    }
}

/// The three fixed buckets a changed file can appear in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceGroupKind {
    Merge,
    Index,
    WorkingTree,
}

impl ResourceGroupKind {
    pub fn id(self) -> &'static str {
        match self {
            ResourceGroupKind::Merge => "merge",
            ResourceGroupKind::Index => "index",
            ResourceGroupKind::WorkingTree => "workingTree",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceGroupKind::Merge => "Merge Changes",
            ResourceGroupKind::Index => "Staged Changes",
            ResourceGroupKind::WorkingTree => "Changes",
        }
    }
}

/// A changed file placed in one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub group: ResourceGroupKind,
    pub path: PathBuf,
    pub status: ResourceStatus,
    pub rename: Option<PathBuf>,
}

impl Resource {
    /// The path the UI should open for this resource.
    pub fn resource_path(&self) -> &Path {
        match &self.rename {
            Some(renamed) if self.status.shows_new_name() => renamed,
            _ => &self.path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub kind: ResourceGroupKind,
    pub resources: Vec<Resource>,
}

impl ResourceGroup {
    pub fn new(kind: ResourceGroupKind) -> Self {
        Self {
            kind,
            resources: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn find(&self, path: &Path) -> Option<&Resource> {
        self.resources.iter().find(|r| r.resource_path() == path)
    }
}

/// One generation of the three live groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroups {
    pub merge: ResourceGroup,
    pub index: ResourceGroup,
    pub working_tree: ResourceGroup,
}

impl Default for ResourceGroups {
    fn default() -> Self {
        Self {
            merge: ResourceGroup::new(ResourceGroupKind::Merge),
            index: ResourceGroup::new(ResourceGroupKind::Index),
            working_tree: ResourceGroup::new(ResourceGroupKind::WorkingTree),
        }
    }
}

impl ResourceGroups {
    pub fn get(&self, kind: ResourceGroupKind) -> &ResourceGroup {
        match kind {
            ResourceGroupKind::Merge => &self.merge,
            ResourceGroupKind::Index => &self.index,
            ResourceGroupKind::WorkingTree => &self.working_tree,
        }
    }

    pub fn push(&mut self, resource: Resource) {
        let group = match resource.group {
            ResourceGroupKind::Merge => &mut self.merge,
            ResourceGroupKind::Index => &mut self.index,
            ResourceGroupKind::WorkingTree => &mut self.working_tree,
        };
        group.resources.push(resource);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceGroup> {
        [&self.merge, &self.index, &self.working_tree].into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefKind {
    Branch,
    Tag,
    RemoteHead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub name: String,
    pub commit: String,
    pub kind: RefKind,
}

/// HEAD or a named branch. Detached heads carry no name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: Option<String>,
    pub commit: Option<String>,
    pub upstream: Option<String>,
    pub ahead: Option<u32>,
    pub behind: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub message: String,
    pub parents: Vec<String>,
}

pub const UNCOMMITTED_HASH: &str = "0000000000000000000000000000000000000000";

/// Authorship of one line at a reference revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAnnotation {
    pub commit_hash: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub description_summary: String,
}

impl LineAnnotation {
    /// Placeholder for a line that exists only in the live buffer.
    pub fn uncommitted() -> Self {
        Self {
            commit_hash: UNCOMMITTED_HASH.to_string(),
            author: "You".to_string(),
            date: None,
            description_summary: "Uncommitted changes".to_string(),
        }
    }

    pub fn is_uncommitted(&self) -> bool {
        self.commit_hash == UNCOMMITTED_HASH
    }
}

/// Options for committing
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Commit all tracked modifications, not just the index
    pub all: bool,
    pub amend: bool,
    pub signoff: bool,
}
