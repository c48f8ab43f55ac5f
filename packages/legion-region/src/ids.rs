use std::sync::atomic::{AtomicU64, Ordering};

/// Every handle in this crate carries a generation counter alongside its
/// numeric id. The C original passes these around as `void*` and relies
/// on the caller never using a stale pointer; here a stale handle simply
/// fails to compare equal to the forest's current record of it, so
/// use-after-destroy is a comparison, not a dangling read.
pub trait Generational {
    fn generation(&self) -> u64;
}

macro_rules! typed_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub id: u64,
            pub generation: u64,
        }

        impl $name {
            pub fn new(id: u64, generation: u64) -> Self {
                $name { id, generation }
            }
        }

        impl Generational for $name {
            fn generation(&self) -> u64 {
                self.generation
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({}#{})", stringify!($name), self.id, self.generation)
            }
        }
    };
}

typed_id!(IndexSpaceId, "A handle to an index space.");
typed_id!(FieldSpaceId, "A handle to a field space.");
typed_id!(RegionTreeId, "The root id of a region tree.");

/// A field within a field space. Field ids are not generational: fields
/// are allocated and freed within a field space but the space itself
/// carries the generation that guards reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FieldId(pub u32);

/// `(index space, field space, region-tree id)` identifies a logical
/// region uniquely within a forest; this triple is what the C++ source
/// packs into an opaque `LogicalRegion` struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LogicalRegion {
    pub index_space: IndexSpaceId,
    pub field_space: FieldSpaceId,
    pub tree_id: RegionTreeId,
}

impl std::fmt::Display for LogicalRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LogicalRegion(ispace={}, fspace={}, tree={})",
            self.index_space, self.field_space, self.tree_id
        )
    }
}

/// A subregion produced by partitioning a `LogicalRegion`'s index space.
/// `color` identifies this subregion's position within the partition's
/// color space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LogicalPartition {
    pub parent: LogicalRegion,
    pub partition_id: u64,
    pub color: u64,
}

/// Monotonic allocator for one id kind. A `ReplicateContext` wraps one
/// of these per handle kind with a buffered-batch broadcast; a plain
/// `InnerContext` uses it directly.
#[derive(Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn starting_at(first: u64) -> Self {
        IdAllocator {
            next: AtomicU64::new(first),
        }
    }

    pub fn alloc(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn alloc_batch(&self, count: u64) -> std::ops::Range<u64> {
        let start = self.next.fetch_add(count, Ordering::Relaxed);
        start..(start + count)
    }
}
