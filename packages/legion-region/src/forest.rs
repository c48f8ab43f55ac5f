use dashmap::DashMap;

use crate::requirement::{RegionRequirement, RequirementTarget};

/// What the forest remembers about one partition: whether its subregions
/// were proven pairwise-disjoint at creation time. Aliased partitions
/// (the `create_partition_by_*` variants that don't guarantee disjoint
/// colors) always conflict across colors unless the privileges don't.
#[derive(Debug, Clone, Copy)]
pub struct PartitionInfo {
    pub disjoint: bool,
}

/// The region-tree forest is the one piece of shared, cross-context
/// state a core in this crate interacts with only through an interface
/// (spec.md §1's explicit non-goal list puts the forest itself out of
/// scope). `RegionForest` is that interface: logical dependence analysis
/// asks it whether two requirements conflict, and relies on nothing else
/// about how index/field spaces are actually stored.
pub trait RegionForest: Send + Sync {
    fn register_partition(&self, partition_id: u64, disjoint: bool);
    fn partition_is_disjoint(&self, partition_id: u64) -> bool;

    /// Do two requirements conflict under this forest's knowledge of
    /// partition disjointness? Delegates to `RegionRequirement::conflicts_with`
    /// for everything except the disjoint-partition case (spec.md §4.3:
    /// "Disjoint regions in the same partition do not conflict").
    fn conflicts(&self, a: &RegionRequirement, b: &RegionRequirement) -> bool {
        if let (
            RequirementTarget::Partition {
                partition: pa,
                ..
            },
            RequirementTarget::Partition {
                partition: pb,
                ..
            },
        ) = (&a.target, &b.target)
        {
            if pa.parent == pb.parent
                && pa.partition_id == pb.partition_id
                && pa.color != pb.color
                && self.partition_is_disjoint(pa.partition_id)
            {
                return false;
            }
        }
        a.conflicts_with(b)
    }
}

/// Reference forest implementation: a concurrent map from partition id
/// to its disjointness, queried lock-free on the read path and written
/// only when a partition is created (spec.md §6: "lock-free reads under
/// RCU-like semantics, writes serialized per-tree"). This is the shape
/// the real region-tree forest's partition-color-space cache takes; it
/// carries no index/field-space geometry because dependence analysis
/// never needs more than disjointness to decide a conflict.
pub struct SimpleForest {
    partitions: DashMap<u64, PartitionInfo>,
}

impl SimpleForest {
    pub fn new() -> Self {
        SimpleForest {
            partitions: DashMap::new(),
        }
    }
}

impl Default for SimpleForest {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionForest for SimpleForest {
    fn register_partition(&self, partition_id: u64, disjoint: bool) {
        self.partitions
            .insert(partition_id, PartitionInfo { disjoint });
    }

    fn partition_is_disjoint(&self, partition_id: u64) -> bool {
        self.partitions
            .get(&partition_id)
            .map(|info| info.disjoint)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FieldId, FieldSpaceId, IndexSpaceId, LogicalPartition, LogicalRegion, RegionTreeId};
    use crate::requirement::{CoherenceMode, Privilege};

    fn parent() -> LogicalRegion {
        LogicalRegion {
            index_space: IndexSpaceId::new(1, 0),
            field_space: FieldSpaceId::new(1, 0),
            tree_id: RegionTreeId::new(1, 0),
        }
    }

    fn subregion(color: u64) -> RegionRequirement {
        RegionRequirement::new(
            RequirementTarget::Partition {
                partition: LogicalPartition {
                    parent: parent(),
                    partition_id: 5,
                    color,
                },
                projection_id: 0,
            },
            [FieldId(0)],
            Privilege::WriteOnly,
            CoherenceMode::Exclusive,
        )
    }

    #[test]
    fn disjoint_partition_colors_do_not_conflict() {
        let forest = SimpleForest::new();
        forest.register_partition(5, true);
        let a = subregion(0);
        let b = subregion(1);
        assert!(!forest.conflicts(&a, &b));
    }

    #[test]
    fn aliased_partition_colors_conflict_on_write() {
        let forest = SimpleForest::new();
        forest.register_partition(5, false);
        let a = subregion(0);
        let b = subregion(1);
        assert!(forest.conflicts(&a, &b));
    }

    #[test]
    fn same_color_always_conflicts_on_write() {
        let forest = SimpleForest::new();
        forest.register_partition(5, true);
        let a = subregion(0);
        let b = subregion(0);
        assert!(forest.conflicts(&a, &b));
    }

    #[test]
    fn unregistered_partition_defaults_to_aliased() {
        let forest = SimpleForest::new();
        let a = subregion(0);
        let b = subregion(1);
        assert!(forest.conflicts(&a, &b));
    }
}
