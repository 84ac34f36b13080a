//! Per-path status values and their rendering.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::flags::{Status, StatusSet};

/// How a conflicted path differs between the merge sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    BothModified,
    BothAdded,
    BothDeleted,
    AddedByUs,
    AddedByThem,
    DeletedByUs,
    DeletedByThem,
}

impl ConflictKind {
    /// Derive the conflict kind from which index stages are present.
    ///
    /// Returns `None` when no stage is present.
    #[must_use]
    pub const fn from_stages(ancestor: bool, ours: bool, theirs: bool) -> Option<Self> {
        match (ancestor, ours, theirs) {
            (true, true, true) => Some(Self::BothModified),
            (false, true, true) => Some(Self::BothAdded),
            (true, false, false) => Some(Self::BothDeleted),
            (false, true, false) => Some(Self::AddedByUs),
            (false, false, true) => Some(Self::AddedByThem),
            (true, false, true) => Some(Self::DeletedByUs),
            (true, true, false) => Some(Self::DeletedByThem),
            (false, false, false) => None,
        }
    }

    /// Two-letter code as printed by `git status --short`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::BothModified => "UU",
            Self::BothAdded => "AA",
            Self::BothDeleted => "DD",
            Self::AddedByUs => "AU",
            Self::AddedByThem => "UA",
            Self::DeletedByUs => "DU",
            Self::DeletedByThem => "UD",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::BothModified => "both modified",
            Self::BothAdded => "both added",
            Self::BothDeleted => "both deleted",
            Self::AddedByUs => "added by us",
            Self::AddedByThem => "added by them",
            Self::DeletedByUs => "deleted by us",
            Self::DeletedByThem => "deleted by them",
        }
    }
}

/// Which pair of trees a rendering compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Single combined view of HEAD against the working tree.
    #[default]
    HeadVsWorkingTree,
    /// Staged changes, rendered in the two-column form.
    HeadVsIndex,
    /// Unstaged changes, rendered in the two-column form.
    IndexVsWorkingTree,
}

/// Reduced, display-oriented view of a flag combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Summary {
    UpToDate,
    Added,
    Renamed,
    Copied,
    Modified,
    Removed,
    /// Added to the index, then deleted from the working tree.
    AddedThenRemoved,
    Conflict(ConflictKind),
    Excluded,
    NotManaged,
    Unknown,
}

/// Status of one path relative to HEAD, the index and the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    flags: StatusSet,
    is_directory: bool,
    seen_in_ui: bool,
    renamed: bool,
    copied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflict: Option<ConflictKind>,
}

impl StatusEntry {
    /// Create an entry, normalizing the flag set.
    ///
    /// An empty set collapses to [`Status::UpToDate`]. A set holding
    /// [`Status::InConflict`] drops every local-change tag and is described
    /// by [`ConflictKind::BothModified`] until a kind is supplied.
    #[must_use]
    pub fn new(flags: StatusSet, is_directory: bool) -> Self {
        let (flags, conflict) = if flags.is_empty() {
            (StatusSet::single(Status::UpToDate), None)
        } else if flags.contains(Status::InConflict) {
            (
                flags.difference(StatusSet::LOCAL_CHANGES),
                Some(ConflictKind::BothModified),
            )
        } else {
            (flags, None)
        };
        Self {
            flags,
            is_directory,
            seen_in_ui: false,
            renamed: false,
            copied: false,
            old_path: None,
            conflict,
        }
    }

    #[must_use]
    pub fn up_to_date(is_directory: bool) -> Self {
        Self::new(StatusSet::single(Status::UpToDate), is_directory)
    }

    #[must_use]
    pub fn excluded(is_directory: bool) -> Self {
        Self::new(StatusSet::single(Status::NotVersionedExcluded), is_directory)
    }

    #[must_use]
    pub fn not_managed(is_directory: bool) -> Self {
        Self::new(StatusSet::single(Status::NotVersionedNotManaged), is_directory)
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self::new(StatusSet::single(Status::Unknown), false)
    }

    #[must_use]
    pub fn conflicted(kind: ConflictKind, is_directory: bool) -> Self {
        let mut entry = Self::new(StatusSet::single(Status::InConflict), is_directory);
        entry.conflict = Some(kind);
        entry
    }

    /// Mark the entry as renamed from `old_path`.
    #[must_use]
    pub fn with_rename(mut self, old_path: impl Into<PathBuf>) -> Self {
        self.renamed = true;
        self.copied = false;
        self.old_path = Some(old_path.into());
        self
    }

    /// Mark the entry as copied from `old_path`.
    #[must_use]
    pub fn with_copy(mut self, old_path: impl Into<PathBuf>) -> Self {
        self.copied = true;
        self.renamed = false;
        self.old_path = Some(old_path.into());
        self
    }

    #[must_use]
    pub const fn with_seen_in_ui(mut self, seen: bool) -> Self {
        self.seen_in_ui = seen;
        self
    }

    pub(crate) fn mark_seen_in_ui(&mut self) {
        self.seen_in_ui = true;
    }

    #[must_use]
    pub const fn flags(&self) -> StatusSet {
        self.flags
    }

    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.is_directory
    }

    #[must_use]
    pub const fn seen_in_ui(&self) -> bool {
        self.seen_in_ui
    }

    #[must_use]
    pub const fn is_renamed(&self) -> bool {
        self.renamed
    }

    #[must_use]
    pub const fn is_copied(&self) -> bool {
        self.copied
    }

    #[must_use]
    pub fn old_path(&self) -> Option<&Path> {
        self.old_path.as_deref()
    }

    #[must_use]
    pub const fn conflict_kind(&self) -> Option<ConflictKind> {
        self.conflict
    }

    #[must_use]
    pub const fn contains(&self, status: Status) -> bool {
        self.flags.contains(status)
    }

    #[must_use]
    pub const fn contains_any(&self, statuses: StatusSet) -> bool {
        self.flags.intersects(statuses)
    }

    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.flags == StatusSet::single(Status::UpToDate)
    }

    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.flags.contains(Status::Unknown)
    }

    #[must_use]
    pub const fn is_excluded(&self) -> bool {
        self.flags.contains(Status::NotVersionedExcluded)
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        self.flags.contains(Status::InConflict)
    }

    #[must_use]
    pub const fn has_local_changes(&self) -> bool {
        self.flags.intersects(StatusSet::LOCAL_CHANGES)
    }

    /// Pick the most important entry, as used for folder annotations.
    pub fn most_important<'a, I>(entries: I) -> Option<&'a Self>
    where
        I: IntoIterator<Item = &'a Self>,
    {
        entries.into_iter().max_by_key(|e| e.flags)
    }

    /// Reduce the flag combination to a single display state.
    #[must_use]
    pub fn summary(&self) -> Summary {
        let f = self.flags;
        if f.contains(Status::InConflict) {
            Summary::Conflict(self.conflict.unwrap_or(ConflictKind::BothModified))
        } else if f.contains(Status::NewHeadWorkingTree) {
            self.added_summary()
        } else if f.contains(Status::RemovedHeadWorkingTree) {
            Summary::Removed
        } else if f.contains(Status::ModifiedHeadWorkingTree) {
            Summary::Modified
        } else if f.contains(Status::NewHeadIndex) && f.contains(Status::RemovedIndexWorkingTree) {
            Summary::AddedThenRemoved
        } else if f.intersects(StatusSet::LOCAL_CHANGES) {
            Summary::Modified
        } else if f.contains(Status::NotVersionedExcluded) {
            Summary::Excluded
        } else if f.contains(Status::NotVersionedNotManaged) {
            Summary::NotManaged
        } else if f.contains(Status::Unknown) {
            Summary::Unknown
        } else {
            Summary::UpToDate
        }
    }

    const fn added_summary(&self) -> Summary {
        if self.renamed {
            Summary::Renamed
        } else if self.copied {
            Summary::Copied
        } else {
            Summary::Added
        }
    }

    /// Short status marker.
    ///
    /// [`Mode::HeadVsWorkingTree`] yields a single combined marker (`M`,
    /// `A`, `D`, ...). The other modes yield the two-column `index/worktree`
    /// form with `-` for an unchanged column (`-/M`, `A/D`, `R/-`).
    #[must_use]
    pub fn short_status_text(&self, mode: Mode) -> String {
        match mode {
            Mode::HeadVsWorkingTree => self.combined_marker().to_string(),
            Mode::HeadVsIndex | Mode::IndexVsWorkingTree => self.two_column_marker(),
        }
    }

    fn combined_marker(&self) -> &'static str {
        match self.summary() {
            Summary::Added => "A",
            Summary::Renamed => "R",
            Summary::Copied => "C",
            Summary::Modified => "M",
            Summary::Removed => "D",
            Summary::AddedThenRemoved => "-",
            Summary::Conflict(_) => "C",
            Summary::Excluded => "I",
            Summary::UpToDate | Summary::NotManaged | Summary::Unknown => "",
        }
    }

    fn two_column_marker(&self) -> String {
        let index = self.index_column();
        let worktree = self.worktree_column();
        if index.is_none() && worktree.is_none() {
            return match self.summary() {
                Summary::Conflict(kind) => kind.code().to_string(),
                _ => self.combined_marker().to_string(),
            };
        }
        format!("{}/{}", index.unwrap_or("-"), worktree.unwrap_or("-"))
    }

    fn index_column(&self) -> Option<&'static str> {
        let f = self.flags;
        if f.contains(Status::NewHeadIndex) {
            Some(if self.renamed {
                "R"
            } else if self.copied {
                "C"
            } else {
                "A"
            })
        } else if f.contains(Status::ModifiedHeadIndex) {
            Some("M")
        } else if f.contains(Status::RemovedHeadIndex) {
            Some("D")
        } else {
            None
        }
    }

    fn worktree_column(&self) -> Option<&'static str> {
        let f = self.flags;
        if f.contains(Status::NewIndexWorkingTree) {
            Some("A")
        } else if f.contains(Status::ModifiedIndexWorkingTree) {
            Some("M")
        } else if f.contains(Status::RemovedIndexWorkingTree) {
            Some("D")
        } else if f.intersects(StatusSet::HEAD_INDEX) {
            None
        } else if f.contains(Status::NewHeadWorkingTree) {
            // index equals HEAD, so HEAD vs working tree is the unstaged change
            Some("A")
        } else if f.contains(Status::ModifiedHeadWorkingTree) {
            Some("M")
        } else if f.contains(Status::RemovedHeadWorkingTree) {
            Some("D")
        } else {
            None
        }
    }

    /// Human readable status.
    #[must_use]
    pub fn status_text(&self, mode: Mode) -> String {
        if mode != Mode::HeadVsWorkingTree {
            let index = self.index_word();
            let worktree = self.worktree_word();
            if index.is_some() || worktree.is_some() {
                return format!("{}/{}", index.unwrap_or("-"), worktree.unwrap_or("-"));
            }
        }
        match self.summary() {
            Summary::UpToDate => "Up to date".to_string(),
            Summary::Added => "Added".to_string(),
            Summary::Renamed => "Renamed".to_string(),
            Summary::Copied => "Copied".to_string(),
            Summary::Modified => "Modified".to_string(),
            Summary::Removed => "Removed".to_string(),
            Summary::AddedThenRemoved => "Added, removed from working tree".to_string(),
            Summary::Conflict(kind) => format!("In conflict ({})", kind.description()),
            Summary::Excluded => "Ignored".to_string(),
            Summary::NotManaged => "Not managed".to_string(),
            Summary::Unknown => "Unknown".to_string(),
        }
    }

    fn index_word(&self) -> Option<&'static str> {
        self.index_column().map(letter_word)
    }

    fn worktree_word(&self) -> Option<&'static str> {
        self.worktree_column().map(letter_word)
    }

    /// Whether an update from `self` to `other` is invisible to consumers.
    ///
    /// Compares the flag set, directory-ness and the rendered status text.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.flags == other.flags
            && self.is_directory == other.is_directory
            && self.status_text(Mode::HeadVsIndex) == other.status_text(Mode::HeadVsIndex)
    }
}

fn letter_word(letter: &'static str) -> &'static str {
    match letter {
        "A" => "Added",
        "R" => "Renamed",
        "C" => "Copied",
        "M" => "Modified",
        "D" => "Removed",
        _ => letter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(statuses: &[Status]) -> StatusEntry {
        StatusEntry::new(StatusSet::of(statuses), false)
    }

    #[test]
    fn test_empty_flags_collapse_to_uptodate() {
        let e = StatusEntry::new(StatusSet::EMPTY, false);
        assert!(e.is_up_to_date());
        assert_eq!(e.summary(), Summary::UpToDate);
    }

    #[test]
    fn test_conflict_excludes_local_changes() {
        let e = entry(&[Status::InConflict, Status::ModifiedHeadIndex, Status::NewHeadWorkingTree]);
        assert_eq!(e.flags(), StatusSet::single(Status::InConflict));
        assert_eq!(e.conflict_kind(), Some(ConflictKind::BothModified));
        assert!(!e.has_local_changes());
    }

    #[test]
    fn test_conflict_kind_from_stages() {
        assert_eq!(ConflictKind::from_stages(true, true, true), Some(ConflictKind::BothModified));
        assert_eq!(ConflictKind::from_stages(false, true, true), Some(ConflictKind::BothAdded));
        assert_eq!(ConflictKind::from_stages(true, false, false), Some(ConflictKind::BothDeleted));
        assert_eq!(ConflictKind::from_stages(false, true, false), Some(ConflictKind::AddedByUs));
        assert_eq!(ConflictKind::from_stages(false, false, true), Some(ConflictKind::AddedByThem));
        assert_eq!(ConflictKind::from_stages(true, false, true), Some(ConflictKind::DeletedByUs));
        assert_eq!(ConflictKind::from_stages(true, true, false), Some(ConflictKind::DeletedByThem));
        assert_eq!(ConflictKind::from_stages(false, false, false), None);
    }

    #[test]
    fn test_modified_in_worktree_text() {
        let e = entry(&[Status::ModifiedHeadWorkingTree]);
        assert_eq!(e.short_status_text(Mode::HeadVsWorkingTree), "M");
        assert_eq!(e.short_status_text(Mode::HeadVsIndex), "-/M");
        assert_eq!(e.short_status_text(Mode::IndexVsWorkingTree), "-/M");
        assert_eq!(e.status_text(Mode::HeadVsWorkingTree), "Modified");
        assert_eq!(e.status_text(Mode::HeadVsIndex), "-/Modified");
    }

    #[test]
    fn test_modified_both_columns_text() {
        let e = entry(&[
            Status::ModifiedHeadIndex,
            Status::ModifiedIndexWorkingTree,
            Status::ModifiedHeadWorkingTree,
        ]);
        assert_eq!(e.short_status_text(Mode::HeadVsWorkingTree), "M");
        assert_eq!(e.short_status_text(Mode::HeadVsIndex), "M/M");
    }

    #[test]
    fn test_added_then_removed() {
        let e = entry(&[Status::NewHeadIndex, Status::RemovedIndexWorkingTree]);
        assert_eq!(e.summary(), Summary::AddedThenRemoved);
        assert_eq!(e.short_status_text(Mode::HeadVsIndex), "A/D");
        assert_eq!(e.short_status_text(Mode::HeadVsWorkingTree), "-");

        let renamed = e.with_rename("/repo/old.txt");
        assert_eq!(renamed.summary(), Summary::AddedThenRemoved);
        assert_eq!(renamed.short_status_text(Mode::HeadVsIndex), "R/D");
    }

    #[test]
    fn test_untracked_text() {
        let e = entry(&[Status::NewIndexWorkingTree, Status::NewHeadWorkingTree]);
        assert_eq!(e.summary(), Summary::Added);
        assert_eq!(e.short_status_text(Mode::HeadVsWorkingTree), "A");
        assert_eq!(e.short_status_text(Mode::HeadVsIndex), "-/A");
    }

    #[test]
    fn test_renamed_text() {
        let e = entry(&[Status::NewHeadIndex, Status::NewHeadWorkingTree]).with_rename("/repo/from");
        assert_eq!(e.summary(), Summary::Renamed);
        assert_eq!(e.short_status_text(Mode::HeadVsWorkingTree), "R");
        assert_eq!(e.short_status_text(Mode::HeadVsIndex), "R/-");
        assert_eq!(e.status_text(Mode::HeadVsIndex), "Renamed/-");
        assert_eq!(e.old_path(), Some(Path::new("/repo/from")));
    }

    #[test]
    fn test_conflict_text() {
        let e = StatusEntry::conflicted(ConflictKind::DeletedByThem, false);
        assert_eq!(e.short_status_text(Mode::HeadVsWorkingTree), "C");
        assert_eq!(e.short_status_text(Mode::HeadVsIndex), "UD");
        assert_eq!(e.status_text(Mode::HeadVsWorkingTree), "In conflict (deleted by them)");
    }

    #[test]
    fn test_bookkeeping_text() {
        assert_eq!(StatusEntry::excluded(true).short_status_text(Mode::HeadVsWorkingTree), "I");
        assert_eq!(StatusEntry::up_to_date(false).short_status_text(Mode::HeadVsIndex), "");
        assert_eq!(StatusEntry::not_managed(false).status_text(Mode::HeadVsIndex), "Not managed");
        assert_eq!(StatusEntry::unknown().summary(), Summary::Unknown);
    }

    #[test]
    fn test_equivalence() {
        let a = entry(&[Status::ModifiedHeadWorkingTree, Status::ModifiedIndexWorkingTree]);
        let b = a.clone().with_seen_in_ui(true);
        assert!(a.is_equivalent(&b));

        let dir = StatusEntry::new(a.flags(), true);
        assert!(!a.is_equivalent(&dir));

        let added = entry(&[Status::NewHeadIndex, Status::NewHeadWorkingTree]);
        let renamed = added.clone().with_rename("/repo/x");
        assert!(!added.is_equivalent(&renamed));

        let c1 = StatusEntry::conflicted(ConflictKind::BothAdded, false);
        let c2 = StatusEntry::conflicted(ConflictKind::BothModified, false);
        assert!(!c1.is_equivalent(&c2));
    }

    #[test]
    fn test_most_important() {
        let entries = vec![
            StatusEntry::up_to_date(false),
            entry(&[Status::ModifiedHeadWorkingTree]),
            StatusEntry::conflicted(ConflictKind::BothModified, false),
            StatusEntry::excluded(false),
        ];
        let top = StatusEntry::most_important(&entries).unwrap();
        assert!(top.is_conflict());
        assert!(StatusEntry::most_important(&Vec::new()).is_none());
    }
}
