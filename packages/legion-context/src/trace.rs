use std::collections::{HashMap, HashSet, VecDeque};

use legion_region::RegionTreeId;
use parking_lot::Mutex;

use crate::operation::OperationKind;

/// Each trace id caches up to this many templates under LRU (spec.md §4.7).
pub const MAX_TEMPLATES_PER_TRACE: usize = 16;

/// What one recorded operation looked like, for matching against a live
/// re-entry of the trace (spec.md §4.7: "operation kind,
/// region-requirement field masks and access kinds, mapper decisions
/// taken on first execution").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFingerprint {
    pub kind: OperationKind,
    pub field_mask: u64,
    pub access_mask: u32,
    pub mapper_decision: Vec<u8>,
}

/// A recorded sequence of operation fingerprints plus the mapping
/// decisions made for each and the region trees touched (spec.md §3,
/// Entity: TraceTemplate).
#[derive(Debug, Clone)]
pub struct TraceTemplate {
    pub trace_id: u64,
    pub fingerprints: Vec<OperationFingerprint>,
    pub touched_trees: HashSet<RegionTreeId>,
    valid: bool,
}

impl TraceTemplate {
    pub fn new(
        trace_id: u64,
        fingerprints: Vec<OperationFingerprint>,
        touched_trees: HashSet<RegionTreeId>,
    ) -> Self {
        TraceTemplate {
            trace_id,
            fingerprints,
            touched_trees,
            valid: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// True if the live prefix matches this template's fingerprints
    /// exactly, in order, up to the live prefix's length (spec.md §4.7:
    /// "if the prefix of the live operation sequence matches fingerprints
    /// of a stored template").
    pub fn matches_prefix(&self, live_prefix: &[OperationFingerprint]) -> bool {
        if live_prefix.len() > self.fingerprints.len() {
            return false;
        }
        self.fingerprints[..live_prefix.len()] == *live_prefix
    }
}

/// Per-trace-id LRU cache of recorded templates (spec.md §4.7), modeled
/// as a bounded deque per trace id rather than a single global LRU: each
/// trace id's templates compete only with its own history, matching
/// "each trace id caches up to N templates (default 16) under LRU".
pub struct TraceCache {
    templates: Mutex<HashMap<u64, VecDeque<TraceTemplate>>>,
}

impl TraceCache {
    pub fn new() -> Self {
        TraceCache {
            templates: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self, template: TraceTemplate) {
        let mut templates = self.templates.lock();
        let deque = templates.entry(template.trace_id).or_default();
        deque.push_back(template);
        while deque.len() > MAX_TEMPLATES_PER_TRACE {
            deque.pop_front();
        }
    }

    /// Find the most-recently-used valid template for `trace_id` whose
    /// recorded fingerprints match `live_prefix`, bumping it to
    /// most-recently-used on a hit. Returns `None` (a replay miss) if no
    /// stored template matches or the cache holds none for this trace.
    pub fn try_replay(
        &self,
        trace_id: u64,
        live_prefix: &[OperationFingerprint],
    ) -> Option<TraceTemplate> {
        let mut templates = self.templates.lock();
        let deque = templates.get_mut(&trace_id)?;
        let hit_index = deque
            .iter()
            .enumerate()
            .rev()
            .find(|(_, t)| t.is_valid() && t.matches_prefix(live_prefix))
            .map(|(i, _)| i)?;
        let template = deque.remove(hit_index).unwrap();
        deque.push_back(template.clone());
        Some(template)
    }

    /// Invalidate every template (across every trace id) that touches
    /// `tree` — called when a region tree is destroyed or has its
    /// equivalence sets reset (spec.md §4.7).
    pub fn invalidate_tree(&self, tree: RegionTreeId) {
        let mut templates = self.templates.lock();
        for deque in templates.values_mut() {
            for template in deque.iter_mut() {
                if template.touched_trees.contains(&tree) {
                    template.valid = false;
                }
            }
        }
    }
}

impl Default for TraceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legion_region::{FieldSpaceId, IndexSpaceId};

    fn tree(n: u64) -> RegionTreeId {
        RegionTreeId::new(n, 0)
    }

    fn fp(kind: OperationKind) -> OperationFingerprint {
        OperationFingerprint {
            kind,
            field_mask: 1,
            access_mask: 1,
            mapper_decision: vec![],
        }
    }

    #[test]
    fn exact_prefix_replays() {
        let cache = TraceCache::new();
        let template = TraceTemplate::new(
            7,
            vec![fp(OperationKind::Task), fp(OperationKind::Fill)],
            [tree(1)].into_iter().collect(),
        );
        cache.store(template);
        let live = vec![fp(OperationKind::Task)];
        assert!(cache.try_replay(7, &live).is_some());
    }

    #[test]
    fn mismatched_prefix_misses() {
        let cache = TraceCache::new();
        let template = TraceTemplate::new(7, vec![fp(OperationKind::Task)], HashSet::new());
        cache.store(template);
        let live = vec![fp(OperationKind::Copy)];
        assert!(cache.try_replay(7, &live).is_none());
    }

    #[test]
    fn invalidated_tree_blocks_replay() {
        let cache = TraceCache::new();
        let template = TraceTemplate::new(
            7,
            vec![fp(OperationKind::Task)],
            [tree(3)].into_iter().collect(),
        );
        cache.store(template);
        cache.invalidate_tree(tree(3));
        let live = vec![fp(OperationKind::Task)];
        assert!(cache.try_replay(7, &live).is_none());
    }

    #[test]
    fn cache_evicts_oldest_template_past_the_cap() {
        let cache = TraceCache::new();
        for i in 0..(MAX_TEMPLATES_PER_TRACE + 4) {
            cache.store(TraceTemplate::new(
                1,
                vec![fp(OperationKind::Task), fp(OperationKind::Copy)],
                [tree(i as u64)].into_iter().collect(),
            ));
        }
        let templates = cache.templates.lock();
        assert_eq!(templates.get(&1).unwrap().len(), MAX_TEMPLATES_PER_TRACE);
    }

    #[test]
    fn fingerprints_with_differing_mapper_decisions_are_not_equal() {
        // Property 5 hinges on `mapper_decision` actually being compared,
        // not just kind/field_mask/access_mask.
        let a = OperationFingerprint {
            mapper_decision: vec![1, 2, 3],
            ..fp(OperationKind::Task)
        };
        let b = OperationFingerprint {
            mapper_decision: vec![9],
            ..fp(OperationKind::Task)
        };
        assert_ne!(a, b);
    }

    #[test]
    fn unrelated_ids_do_not_share_budget() {
        let _ = IndexSpaceId::new(0, 0);
        let _ = FieldSpaceId::new(0, 0);
        let cache = TraceCache::new();
        cache.store(TraceTemplate::new(1, vec![fp(OperationKind::Task)], HashSet::new()));
        cache.store(TraceTemplate::new(2, vec![fp(OperationKind::Task)], HashSet::new()));
        let templates = cache.templates.lock();
        assert_eq!(templates.len(), 2);
    }
}
