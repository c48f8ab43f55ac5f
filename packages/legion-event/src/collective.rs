use std::sync::Arc;

use parking_lot::Mutex;

use crate::barrier::{BarrierId, PhaseBarrier};
use crate::event::EventOutcome;

/// A reduction operator's binary fold, applied in place: `lhs = lhs (op) rhs`.
/// Registered by the application, not interpreted by the runtime core.
pub type ReductionApply = Arc<dyn Fn(&mut Vec<u8>, &[u8]) + Send + Sync>;

/// A barrier plus a reduction operator and initial value (spec.md §3).
/// Every arrival contributes a value; the folded result is only
/// observable once every arrival for the generation has landed.
#[derive(Clone)]
pub struct DynamicCollective {
    barrier: PhaseBarrier,
    reduction_op_id: u32,
    initial_value: Vec<u8>,
    apply: ReductionApply,
    accumulator: Arc<Mutex<Vec<u8>>>,
}

impl DynamicCollective {
    pub fn new(
        id: BarrierId,
        arrivals_per_generation: usize,
        reduction_op_id: u32,
        initial_value: Vec<u8>,
        apply: ReductionApply,
    ) -> Self {
        DynamicCollective {
            barrier: PhaseBarrier::new(id, arrivals_per_generation),
            reduction_op_id,
            accumulator: Arc::new(Mutex::new(initial_value.clone())),
            initial_value,
            apply,
        }
    }

    pub fn reduction_op_id(&self) -> u32 {
        self.reduction_op_id
    }

    pub fn barrier(&self) -> &PhaseBarrier {
        &self.barrier
    }

    /// Fold `contribution` into the generation's accumulator and record
    /// one arrival at the underlying barrier.
    pub fn arrive_with_value(&self, contribution: &[u8]) {
        {
            let mut acc = self.accumulator.lock();
            (self.apply)(&mut acc, contribution);
        }
        self.barrier.arrive();
    }

    pub fn arrive_poisoned(&self) {
        self.barrier.arrive_poisoned(true);
    }

    /// Block until this generation's arrivals are all in, then return the
    /// folded result (or the poison outcome if any arrival was poisoned).
    pub async fn result(&self) -> Result<Vec<u8>, EventOutcome> {
        match self.barrier.wait().await {
            EventOutcome::Triggered => Ok(self.accumulator.lock().clone()),
            EventOutcome::Poisoned => Err(EventOutcome::Poisoned),
        }
    }

    /// Advance to a fresh generation with the accumulator reset to the
    /// collective's initial value.
    pub fn advance(&self) -> DynamicCollective {
        DynamicCollective {
            barrier: self.barrier.advance(),
            reduction_op_id: self.reduction_op_id,
            initial_value: self.initial_value.clone(),
            apply: self.apply.clone(),
            accumulator: Arc::new(Mutex::new(self.initial_value.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_u64(lhs: &mut Vec<u8>, rhs: &[u8]) {
        let a = u64::from_le_bytes(lhs.as_slice().try_into().unwrap());
        let b = u64::from_le_bytes(rhs.try_into().unwrap());
        *lhs = (a + b).to_le_bytes().to_vec();
    }

    #[tokio::test]
    async fn collective_folds_all_arrivals() {
        let apply: ReductionApply = Arc::new(sum_u64);
        let collective = DynamicCollective::new(
            BarrierId(100),
            3,
            /* reduction_op_id = */ 1,
            0u64.to_le_bytes().to_vec(),
            apply,
        );
        collective.arrive_with_value(&1u64.to_le_bytes());
        collective.arrive_with_value(&2u64.to_le_bytes());
        collective.arrive_with_value(&3u64.to_le_bytes());
        let result = collective.result().await.unwrap();
        assert_eq!(u64::from_le_bytes(result.try_into().unwrap()), 6);
    }

    #[tokio::test]
    async fn collective_propagates_poison() {
        let apply: ReductionApply = Arc::new(sum_u64);
        let collective = DynamicCollective::new(
            BarrierId(101),
            2,
            1,
            0u64.to_le_bytes().to_vec(),
            apply,
        );
        collective.arrive_with_value(&1u64.to_le_bytes());
        collective.arrive_poisoned();
        assert_eq!(collective.result().await, Err(EventOutcome::Poisoned));
    }

    #[tokio::test]
    async fn advance_resets_accumulator() {
        let apply: ReductionApply = Arc::new(sum_u64);
        let collective = DynamicCollective::new(
            BarrierId(102),
            1,
            1,
            0u64.to_le_bytes().to_vec(),
            apply,
        );
        collective.arrive_with_value(&5u64.to_le_bytes());
        assert_eq!(
            u64::from_le_bytes(collective.result().await.unwrap().try_into().unwrap()),
            5
        );
        let next = collective.advance();
        next.arrive_with_value(&7u64.to_le_bytes());
        assert_eq!(
            u64::from_le_bytes(next.result().await.unwrap().try_into().unwrap()),
            7
        );
    }
}
