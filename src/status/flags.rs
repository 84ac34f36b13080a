//! Status tags and the combinable flag set.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single fact about how HEAD, the index and the working tree differ for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NewHeadIndex,
    NewHeadWorkingTree,
    NewIndexWorkingTree,
    ModifiedHeadIndex,
    ModifiedHeadWorkingTree,
    ModifiedIndexWorkingTree,
    RemovedHeadIndex,
    RemovedHeadWorkingTree,
    RemovedIndexWorkingTree,
    InConflict,
    NotVersionedExcluded,
    NotVersionedNotManaged,
    UpToDate,
    Unknown,
}

impl Status {
    /// Every status tag in declaration order.
    pub const ALL: [Self; 14] = [
        Self::NewHeadIndex,
        Self::NewHeadWorkingTree,
        Self::NewIndexWorkingTree,
        Self::ModifiedHeadIndex,
        Self::ModifiedHeadWorkingTree,
        Self::ModifiedIndexWorkingTree,
        Self::RemovedHeadIndex,
        Self::RemovedHeadWorkingTree,
        Self::RemovedIndexWorkingTree,
        Self::InConflict,
        Self::NotVersionedExcluded,
        Self::NotVersionedNotManaged,
        Self::UpToDate,
        Self::Unknown,
    ];

    const fn bit(self) -> u16 {
        1 << self as u16
    }

    /// Importance of the tag; higher wins.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::InConflict => 10,
            Self::RemovedHeadIndex | Self::RemovedHeadWorkingTree | Self::RemovedIndexWorkingTree => 9,
            Self::NewHeadIndex | Self::NewHeadWorkingTree | Self::NewIndexWorkingTree => 8,
            Self::ModifiedHeadIndex | Self::ModifiedHeadWorkingTree | Self::ModifiedIndexWorkingTree => {
                7
            }
            Self::NotVersionedExcluded => 4,
            Self::UpToDate => 3,
            Self::NotVersionedNotManaged => 2,
            Self::Unknown => 1,
        }
    }
}

/// A set of [`Status`] tags.
///
/// Ordered by importance: the set holding the most important tag is greater,
/// ties are broken by the raw bit pattern so the order is total.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusSet(u16);

impl StatusSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Every new, modified or removed tag.
    pub const LOCAL_CHANGES: Self = Self::of(&[
        Status::NewHeadIndex,
        Status::NewHeadWorkingTree,
        Status::NewIndexWorkingTree,
        Status::ModifiedHeadIndex,
        Status::ModifiedHeadWorkingTree,
        Status::ModifiedIndexWorkingTree,
        Status::RemovedHeadIndex,
        Status::RemovedHeadWorkingTree,
        Status::RemovedIndexWorkingTree,
    ]);

    /// Differences between HEAD and the index.
    pub const HEAD_INDEX: Self = Self::of(&[
        Status::NewHeadIndex,
        Status::ModifiedHeadIndex,
        Status::RemovedHeadIndex,
    ]);

    /// Differences between the index and the working tree.
    pub const INDEX_WORKING_TREE: Self = Self::of(&[
        Status::NewIndexWorkingTree,
        Status::ModifiedIndexWorkingTree,
        Status::RemovedIndexWorkingTree,
    ]);

    /// Differences between HEAD and the working tree.
    pub const HEAD_WORKING_TREE: Self = Self::of(&[
        Status::NewHeadWorkingTree,
        Status::ModifiedHeadWorkingTree,
        Status::RemovedHeadWorkingTree,
    ]);

    /// Build a set from a slice of tags.
    #[must_use]
    pub const fn of(statuses: &[Status]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < statuses.len() {
            bits |= statuses[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// A set holding a single tag.
    #[must_use]
    pub const fn single(status: Status) -> Self {
        Self(status.bit())
    }

    #[must_use]
    pub const fn contains(self, status: Status) -> bool {
        self.0 & status.bit() != 0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn insert(&mut self, status: Status) {
        self.0 |= status.bit();
    }

    pub fn remove(&mut self, status: Status) {
        self.0 &= !status.bit();
    }

    /// Iterate over the tags in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Status> {
        Status::ALL.into_iter().filter(move |s| self.contains(*s))
    }

    /// Rank of the most important tag, 0 for the empty set.
    #[must_use]
    pub fn importance(self) -> u8 {
        self.iter().map(Status::rank).max().unwrap_or(0)
    }
}

impl Ord for StatusSet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.importance()
            .cmp(&other.importance())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for StatusSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl From<Status> for StatusSet {
    fn from(status: Status) -> Self {
        Self::single(status)
    }
}

impl FromIterator<Status> for StatusSet {
    fn from_iter<I: IntoIterator<Item = Status>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        set.extend(iter);
        set
    }
}

impl Extend<Status> for StatusSet {
    fn extend<I: IntoIterator<Item = Status>>(&mut self, iter: I) {
        for status in iter {
            self.insert(status);
        }
    }
}

impl Serialize for StatusSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for StatusSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let statuses = Vec::<Status>::deserialize(deserializer)?;
        Ok(statuses.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_operations() {
        let mut set = StatusSet::of(&[Status::ModifiedHeadWorkingTree]);
        assert!(set.contains(Status::ModifiedHeadWorkingTree));
        assert!(!set.contains(Status::ModifiedHeadIndex));

        set.insert(Status::ModifiedIndexWorkingTree);
        assert_eq!(set.len(), 2);
        assert!(set.intersects(StatusSet::INDEX_WORKING_TREE));
        assert!(!set.intersects(StatusSet::HEAD_INDEX));

        set.remove(Status::ModifiedHeadWorkingTree);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Status::ModifiedIndexWorkingTree]
        );
        assert!(StatusSet::EMPTY.is_empty());
    }

    #[test]
    fn test_local_changes_excludes_bookkeeping_tags() {
        for status in [
            Status::InConflict,
            Status::NotVersionedExcluded,
            Status::NotVersionedNotManaged,
            Status::UpToDate,
            Status::Unknown,
        ] {
            assert!(!StatusSet::LOCAL_CHANGES.contains(status));
        }
        assert_eq!(StatusSet::LOCAL_CHANGES.len(), 9);
    }

    #[test]
    fn test_importance_order() {
        let conflict = StatusSet::single(Status::InConflict);
        let removed = StatusSet::of(&[Status::RemovedHeadIndex, Status::RemovedHeadWorkingTree]);
        let added = StatusSet::of(&[Status::NewHeadIndex, Status::NewHeadWorkingTree]);
        let modified = StatusSet::single(Status::ModifiedHeadWorkingTree);
        let excluded = StatusSet::single(Status::NotVersionedExcluded);
        let uptodate = StatusSet::single(Status::UpToDate);
        let not_managed = StatusSet::single(Status::NotVersionedNotManaged);
        let unknown = StatusSet::single(Status::Unknown);

        let mut sets = vec![
            unknown, modified, conflict, uptodate, excluded, not_managed, added, removed,
        ];
        sets.sort();
        assert_eq!(
            sets,
            vec![unknown, not_managed, uptodate, excluded, modified, added, removed, conflict]
        );
    }

    #[test]
    fn test_order_is_total() {
        let a = StatusSet::of(&[Status::ModifiedHeadIndex, Status::ModifiedHeadWorkingTree]);
        let b = StatusSet::of(&[Status::ModifiedIndexWorkingTree, Status::ModifiedHeadWorkingTree]);
        assert_eq!(a.importance(), b.importance());
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn test_serde_as_list() {
        let set = StatusSet::of(&[Status::NewIndexWorkingTree, Status::NewHeadWorkingTree]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["new_head_working_tree","new_index_working_tree"]"#);

        let back: StatusSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
