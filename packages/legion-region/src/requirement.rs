use std::collections::BTreeSet;

use crate::ids::{FieldId, LogicalPartition, LogicalRegion};

/// The access an operation requests against a region/partition's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Privilege {
    ReadOnly,
    ReadWrite,
    WriteOnly,
    /// Carries the reduction operator id; two reductions with the same
    /// op id to the same field/region do not conflict with each other.
    Reduce(u32),
}

impl Privilege {
    pub fn is_write(&self) -> bool {
        matches!(self, Privilege::ReadWrite | Privilege::WriteOnly)
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Privilege::ReadOnly | Privilege::ReadWrite)
    }

    /// True if a requirement granted `self` may be used to satisfy a
    /// child requirement that asks for `requested` (spec.md §3: a
    /// child's privileges must be no broader than what its parent was
    /// granted). `ReadWrite` covers everything; otherwise the requested
    /// privilege must match exactly, and a reduction only covers a
    /// matching reduction operator.
    pub fn permits(&self, requested: &Privilege) -> bool {
        match (self, requested) {
            (Privilege::ReadWrite, _) => true,
            (Privilege::ReadOnly, Privilege::ReadOnly) => true,
            (Privilege::WriteOnly, Privilege::WriteOnly) => true,
            (Privilege::Reduce(a), Privilege::Reduce(b)) => a == b,
            _ => false,
        }
    }
}

/// How strictly concurrent accesses at differing privileges must be
/// ordered. `Simultaneous` and `Relaxed` both permit the mapper to place
/// overlapping instances; logical analysis still serializes writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CoherenceMode {
    Exclusive,
    Atomic,
    Simultaneous,
    Relaxed,
}

/// The region/partition target of a requirement, plus (for partitions)
/// the projection used to map index-space points to subregions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RequirementTarget {
    Region(LogicalRegion),
    Partition {
        partition: LogicalPartition,
        projection_id: u32,
    },
}

/// `(region-or-partition, field-set, privilege)` plus coherence — the
/// unit dependence analysis reasons about (spec.md §3, Entity:
/// RegionRequirement).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegionRequirement {
    pub target: RequirementTarget,
    pub fields: BTreeSet<FieldId>,
    pub privilege: Privilege,
    pub coherence: CoherenceMode,
}

impl RegionRequirement {
    pub fn new(
        target: RequirementTarget,
        fields: impl IntoIterator<Item = FieldId>,
        privilege: Privilege,
        coherence: CoherenceMode,
    ) -> Self {
        RegionRequirement {
            target,
            fields: fields.into_iter().collect(),
            privilege,
            coherence,
        }
    }

    pub fn region(&self) -> Option<LogicalRegion> {
        match &self.target {
            RequirementTarget::Region(r) => Some(*r),
            RequirementTarget::Partition { partition, .. } => Some(partition.parent),
        }
    }

    /// True when the field sets of `self` and `other` overlap.
    pub fn fields_overlap(&self, other: &RegionRequirement) -> bool {
        !self.fields.is_disjoint(&other.fields)
    }

    /// Read-after-read at matching coherence is not a dependence;
    /// everything else involving a write or reduction is (spec.md §4.3).
    pub fn conflicts_with(&self, other: &RegionRequirement) -> bool {
        if self.region() != other.region() {
            return false;
        }
        if !self.fields_overlap(other) {
            return false;
        }
        if self.privilege.is_read() && other.privilege.is_read() && self.coherence == other.coherence {
            return false;
        }
        if let (Privilege::Reduce(a), Privilege::Reduce(b)) = (self.privilege, other.privilege) {
            return a != b;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FieldSpaceId, IndexSpaceId, RegionTreeId};

    fn region(n: u64) -> LogicalRegion {
        LogicalRegion {
            index_space: IndexSpaceId::new(n, 0),
            field_space: FieldSpaceId::new(1, 0),
            tree_id: RegionTreeId::new(1, 0),
        }
    }

    #[test]
    fn read_after_read_same_coherence_does_not_conflict() {
        let r = region(1);
        let a = RegionRequirement::new(
            RequirementTarget::Region(r),
            [FieldId(0)],
            Privilege::ReadOnly,
            CoherenceMode::Exclusive,
        );
        let b = a.clone();
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn write_after_read_conflicts() {
        let r = region(1);
        let reader = RegionRequirement::new(
            RequirementTarget::Region(r),
            [FieldId(0)],
            Privilege::ReadOnly,
            CoherenceMode::Exclusive,
        );
        let writer = RegionRequirement::new(
            RequirementTarget::Region(r),
            [FieldId(0)],
            Privilege::WriteOnly,
            CoherenceMode::Exclusive,
        );
        assert!(reader.conflicts_with(&writer));
    }

    #[test]
    fn disjoint_fields_do_not_conflict() {
        let r = region(1);
        let a = RegionRequirement::new(
            RequirementTarget::Region(r),
            [FieldId(0)],
            Privilege::WriteOnly,
            CoherenceMode::Exclusive,
        );
        let b = RegionRequirement::new(
            RequirementTarget::Region(r),
            [FieldId(1)],
            Privilege::WriteOnly,
            CoherenceMode::Exclusive,
        );
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn disjoint_regions_do_not_conflict() {
        let a = RegionRequirement::new(
            RequirementTarget::Region(region(1)),
            [FieldId(0)],
            Privilege::WriteOnly,
            CoherenceMode::Exclusive,
        );
        let b = RegionRequirement::new(
            RequirementTarget::Region(region(2)),
            [FieldId(0)],
            Privilege::WriteOnly,
            CoherenceMode::Exclusive,
        );
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn same_reduction_op_does_not_conflict() {
        let r = region(1);
        let a = RegionRequirement::new(
            RequirementTarget::Region(r),
            [FieldId(0)],
            Privilege::Reduce(7),
            CoherenceMode::Exclusive,
        );
        let b = a.clone();
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn read_write_permits_anything_but_reduction_requires_matching_op() {
        assert!(Privilege::ReadWrite.permits(&Privilege::WriteOnly));
        assert!(!Privilege::ReadOnly.permits(&Privilege::WriteOnly));
        assert!(Privilege::Reduce(1).permits(&Privilege::Reduce(1)));
        assert!(!Privilege::Reduce(1).permits(&Privilege::Reduce(2)));
    }

    #[test]
    fn differing_reduction_ops_conflict() {
        let r = region(1);
        let a = RegionRequirement::new(
            RequirementTarget::Region(r),
            [FieldId(0)],
            Privilege::Reduce(7),
            CoherenceMode::Exclusive,
        );
        let b = RegionRequirement::new(
            RequirementTarget::Region(r),
            [FieldId(0)],
            Privilege::Reduce(8),
            CoherenceMode::Exclusive,
        );
        assert!(a.conflicts_with(&b));
    }
}
