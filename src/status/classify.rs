//! Mapping of raw three-way comparisons to canonical status combinations.
//!
//! The VCS reports two columns per path: HEAD against the index and the
//! index against the working tree. The HEAD against working tree column is
//! derived here. A few column pairs do not determine it exactly; those cases
//! are resolved by the named [`Rule`]s so callers can see which assumption
//! was made.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::entry::{ConflictKind, StatusEntry};
use super::flags::{Status, StatusSet};
use crate::error::StatusError;

/// Difference between two trees for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    #[default]
    Unmodified,
    Added,
    Modified,
    Deleted,
}

impl Change {
    /// Every change kind.
    pub const ALL: [Self; 4] = [Self::Unmodified, Self::Added, Self::Modified, Self::Deleted];
}

/// Raw status of one path as reported by a status provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStatus {
    /// HEAD compared to the index.
    pub head_index: Change,
    /// Index compared to the working tree; `Added` means untracked.
    pub index_worktree: Change,
    /// Set when the path has unmerged index stages.
    pub conflict: Option<ConflictKind>,
    /// Path matches an ignore rule.
    pub ignored: bool,
    /// Source of a rename detected between HEAD and the index.
    pub renamed_from: Option<PathBuf>,
    /// Source of a copy detected between HEAD and the index.
    pub copied_from: Option<PathBuf>,
}

impl RawStatus {
    #[must_use]
    pub fn new(head_index: Change, index_worktree: Change) -> Self {
        Self {
            head_index,
            index_worktree,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn untracked() -> Self {
        Self::new(Change::Unmodified, Change::Added)
    }

    #[must_use]
    pub fn ignored() -> Self {
        Self {
            ignored: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn conflicted(kind: ConflictKind) -> Self {
        Self {
            conflict: Some(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn renamed_from(mut self, from: impl Into<PathBuf>) -> Self {
        self.renamed_from = Some(from.into());
        self
    }
}

/// Assumption applied when the two reported columns are ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Unmerged stages override whatever the columns say.
    ConflictWins,
    /// Added to the index and deleted on disk: absent from both HEAD and
    /// the working tree, so there is no HEAD/working tree difference.
    AddedThenRemoved,
    /// Removed from the index but still on disk: assumed modified against
    /// HEAD, content is not compared.
    UnstagedKeptOnDisk,
    /// Modified in the index and again in the working tree: assumed still
    /// modified against HEAD even if the second edit reverted the first.
    ModifiedTwice,
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub flags: StatusSet,
    pub rule: Option<Rule>,
}

impl Classification {
    const fn plain(statuses: &[Status]) -> Self {
        Self {
            flags: StatusSet::of(statuses),
            rule: None,
        }
    }

    const fn ruled(statuses: &[Status], rule: Rule) -> Self {
        Self {
            flags: StatusSet::of(statuses),
            rule: Some(rule),
        }
    }
}

/// Map a raw three-way comparison to its canonical flag combination.
///
/// # Errors
///
/// Returns [`StatusError::Inconsistent`] for column pairs no repository
/// state can produce, such as a path deleted from the index that is also
/// modified in the working tree.
pub fn classify(path: &Path, raw: &RawStatus) -> Result<Classification, StatusError> {
    use Change::{Added, Deleted, Modified, Unmodified};
    use Status::{
        ModifiedHeadIndex, ModifiedHeadWorkingTree, ModifiedIndexWorkingTree, NewHeadIndex,
        NewHeadWorkingTree, NewIndexWorkingTree, NotVersionedExcluded, RemovedHeadIndex,
        RemovedHeadWorkingTree, RemovedIndexWorkingTree, UpToDate,
    };

    if raw.conflict.is_some() {
        return Ok(Classification::ruled(&[Status::InConflict], Rule::ConflictWins));
    }

    if raw.ignored {
        return match (raw.head_index, raw.index_worktree) {
            (Unmodified, Unmodified | Added) => Ok(Classification::plain(&[NotVersionedExcluded])),
            (h, w) => Err(inconsistent(path, "ignored", h, w)),
        };
    }

    let classification = match (raw.head_index, raw.index_worktree) {
        (Unmodified, Unmodified) => Classification::plain(&[UpToDate]),
        (Unmodified, Added) => Classification::plain(&[NewIndexWorkingTree, NewHeadWorkingTree]),
        (Unmodified, Modified) => {
            Classification::plain(&[ModifiedIndexWorkingTree, ModifiedHeadWorkingTree])
        }
        (Unmodified, Deleted) => {
            Classification::plain(&[RemovedIndexWorkingTree, RemovedHeadWorkingTree])
        }
        (Added, Unmodified) => Classification::plain(&[NewHeadIndex, NewHeadWorkingTree]),
        (Added, Modified) => Classification::plain(&[
            NewHeadIndex,
            ModifiedIndexWorkingTree,
            NewHeadWorkingTree,
        ]),
        (Added, Deleted) => Classification::ruled(
            &[NewHeadIndex, RemovedIndexWorkingTree],
            Rule::AddedThenRemoved,
        ),
        (Modified, Unmodified) => {
            Classification::plain(&[ModifiedHeadIndex, ModifiedHeadWorkingTree])
        }
        (Modified, Modified) => Classification::ruled(
            &[ModifiedHeadIndex, ModifiedIndexWorkingTree, ModifiedHeadWorkingTree],
            Rule::ModifiedTwice,
        ),
        (Modified, Deleted) => Classification::plain(&[
            ModifiedHeadIndex,
            RemovedIndexWorkingTree,
            RemovedHeadWorkingTree,
        ]),
        (Deleted, Unmodified) => {
            Classification::plain(&[RemovedHeadIndex, RemovedHeadWorkingTree])
        }
        (Deleted, Added) => Classification::ruled(
            &[RemovedHeadIndex, NewIndexWorkingTree, ModifiedHeadWorkingTree],
            Rule::UnstagedKeptOnDisk,
        ),
        (h @ (Added | Modified), w @ Added) | (h @ Deleted, w @ (Modified | Deleted)) => {
            return Err(inconsistent(path, "tracked", h, w));
        }
    };
    Ok(classification)
}

fn inconsistent(path: &Path, what: &str, head_index: Change, index_worktree: Change) -> StatusError {
    StatusError::inconsistent(
        path,
        format!("{what} path with HEAD/index {head_index:?} and index/working tree {index_worktree:?}"),
    )
}

/// Classify `raw` and build the resulting entry.
///
/// Carries rename, copy and conflict details over to the entry.
///
/// # Errors
///
/// Propagates [`classify`] errors.
pub fn to_entry(path: &Path, raw: &RawStatus, is_directory: bool) -> Result<StatusEntry, StatusError> {
    if let Some(kind) = raw.conflict {
        return Ok(StatusEntry::conflicted(kind, is_directory));
    }

    let classification = classify(path, raw)?;
    if let Some(rule) = classification.rule {
        tracing::trace!(path = %path.display(), ?rule, "Applied status rule");
    }

    let mut entry = StatusEntry::new(classification.flags, is_directory);
    if classification.flags.contains(Status::NewHeadIndex) {
        if let Some(from) = &raw.renamed_from {
            entry = entry.with_rename(from);
        } else if let Some(from) = &raw.copied_from {
            entry = entry.with_copy(from);
        }
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::entry::{Mode, Summary};

    fn flags(raw: &RawStatus) -> StatusSet {
        classify(Path::new("/repo/f"), raw).unwrap().flags
    }

    #[test]
    fn test_every_column_pair() {
        let mut ok = 0;
        let mut rejected = 0;
        for h in Change::ALL {
            for w in Change::ALL {
                match classify(Path::new("/repo/f"), &RawStatus::new(h, w)) {
                    Ok(c) => {
                        ok += 1;
                        assert!(!c.flags.is_empty());
                        assert!(!c.flags.contains(Status::InConflict));
                    }
                    Err(StatusError::Inconsistent { path, .. }) => {
                        rejected += 1;
                        assert_eq!(path, PathBuf::from("/repo/f"));
                    }
                }
            }
        }
        assert_eq!(ok, 12);
        assert_eq!(rejected, 4);
    }

    #[test]
    fn test_unmodified() {
        assert_eq!(flags(&RawStatus::default()), StatusSet::single(Status::UpToDate));
    }

    #[test]
    fn test_untracked() {
        assert_eq!(
            flags(&RawStatus::untracked()),
            StatusSet::of(&[Status::NewIndexWorkingTree, Status::NewHeadWorkingTree])
        );
    }

    #[test]
    fn test_modified_in_worktree() {
        assert_eq!(
            flags(&RawStatus::new(Change::Unmodified, Change::Modified)),
            StatusSet::of(&[Status::ModifiedHeadWorkingTree, Status::ModifiedIndexWorkingTree])
        );
    }

    #[test]
    fn test_deleted_externally() {
        assert_eq!(
            flags(&RawStatus::new(Change::Unmodified, Change::Deleted)),
            StatusSet::of(&[Status::RemovedIndexWorkingTree, Status::RemovedHeadWorkingTree])
        );
    }

    #[test]
    fn test_removed_from_index() {
        assert_eq!(
            flags(&RawStatus::new(Change::Deleted, Change::Unmodified)),
            StatusSet::of(&[Status::RemovedHeadIndex, Status::RemovedHeadWorkingTree])
        );
    }

    #[test]
    fn test_added_then_removed_rule() {
        let c = classify(Path::new("/repo/f"), &RawStatus::new(Change::Added, Change::Deleted)).unwrap();
        assert_eq!(c.rule, Some(Rule::AddedThenRemoved));
        assert_eq!(
            c.flags,
            StatusSet::of(&[Status::NewHeadIndex, Status::RemovedIndexWorkingTree])
        );
        assert!(!c.flags.intersects(StatusSet::HEAD_WORKING_TREE));
    }

    #[test]
    fn test_unstaged_kept_on_disk_rule() {
        let c = classify(Path::new("/repo/f"), &RawStatus::new(Change::Deleted, Change::Added)).unwrap();
        assert_eq!(c.rule, Some(Rule::UnstagedKeptOnDisk));
        assert!(c.flags.contains(Status::ModifiedHeadWorkingTree));
    }

    #[test]
    fn test_modified_twice_rule() {
        let c = classify(Path::new("/repo/f"), &RawStatus::new(Change::Modified, Change::Modified)).unwrap();
        assert_eq!(c.rule, Some(Rule::ModifiedTwice));
        assert!(c.flags.contains(Status::ModifiedHeadWorkingTree));
    }

    #[test]
    fn test_conflict_wins() {
        let mut raw = RawStatus::conflicted(ConflictKind::BothAdded);
        raw.head_index = Change::Added;
        raw.index_worktree = Change::Modified;
        let c = classify(Path::new("/repo/f"), &raw).unwrap();
        assert_eq!(c.rule, Some(Rule::ConflictWins));
        assert_eq!(c.flags, StatusSet::single(Status::InConflict));

        let entry = to_entry(Path::new("/repo/f"), &raw, false).unwrap();
        assert_eq!(entry.conflict_kind(), Some(ConflictKind::BothAdded));
    }

    #[test]
    fn test_ignored() {
        assert_eq!(
            flags(&RawStatus::ignored()),
            StatusSet::single(Status::NotVersionedExcluded)
        );

        let mut tracked_ignored = RawStatus::ignored();
        tracked_ignored.head_index = Change::Modified;
        assert!(classify(Path::new("/repo/f"), &tracked_ignored).is_err());
    }

    #[test]
    fn test_inconsistent_pairs() {
        for (h, w) in [
            (Change::Added, Change::Added),
            (Change::Modified, Change::Added),
            (Change::Deleted, Change::Modified),
            (Change::Deleted, Change::Deleted),
        ] {
            let err = classify(Path::new("/repo/f"), &RawStatus::new(h, w)).unwrap_err();
            assert!(err.to_string().contains("/repo/f"));
        }
    }

    #[test]
    fn test_to_entry_rename() {
        let raw = RawStatus::new(Change::Added, Change::Unmodified).renamed_from("/repo/old");
        let entry = to_entry(Path::new("/repo/new"), &raw, false).unwrap();
        assert!(entry.is_renamed());
        assert_eq!(entry.old_path(), Some(Path::new("/repo/old")));
        assert_eq!(entry.summary(), Summary::Renamed);
    }

    #[test]
    fn test_to_entry_rename_ignored_without_index_add() {
        let raw = RawStatus::new(Change::Unmodified, Change::Modified).renamed_from("/repo/old");
        let entry = to_entry(Path::new("/repo/new"), &raw, false).unwrap();
        assert!(!entry.is_renamed());
    }

    #[test]
    fn test_to_entry_added_then_removed_text() {
        let raw = RawStatus::new(Change::Added, Change::Deleted).renamed_from("/repo/old");
        let entry = to_entry(Path::new("/repo/new"), &raw, false).unwrap();
        assert_eq!(entry.summary(), Summary::AddedThenRemoved);
        assert_eq!(entry.short_status_text(Mode::HeadVsIndex), "R/D");
    }
}
