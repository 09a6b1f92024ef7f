//! Idempotency ledger.
//!
//! Every reading carries a derived `reading_id` ([`crate::types::generate_reading_id`]).
//! Each of the three per-reading workers — event detector, aggregator,
//! device-status updater — claims its own stage column before doing any
//! work. A failed claim is not an error: it means a redelivery or an
//! overlapping worker already owns this stage, and the caller should
//! acknowledge the message without repeating the work.

use crate::clock::Clock;
use crate::persistence::{PersistenceError, ProcessedReadingStore};
use crate::types::ProcessingStage;

/// Attempt to claim `stage` for `reading_id`. Returns `true` if this call
/// obtained ownership (the caller should do the work), `false` if another
/// attempt already claimed it (the caller should skip the work and ack).
pub async fn claim<S: ProcessedReadingStore + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    reading_id: &str,
    stage: ProcessingStage,
) -> Result<bool, PersistenceError> {
    store.mark_if_absent(reading_id, stage, clock.now_ms()).await
}

pub async fn is_claimed<S: ProcessedReadingStore + ?Sized>(
    store: &S,
    reading_id: &str,
    stage: ProcessingStage,
) -> Result<bool, PersistenceError> {
    store.is_processed(reading_id, stage).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::MemoryStore;

    #[tokio::test]
    async fn second_claim_for_same_stage_fails() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(1000);
        assert!(claim(&store, &clock, "r1", ProcessingStage::Event).await.unwrap());
        assert!(!claim(&store, &clock, "r1", ProcessingStage::Event).await.unwrap());
    }

    #[tokio::test]
    async fn stages_are_independent() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(1000);
        assert!(claim(&store, &clock, "r1", ProcessingStage::Event).await.unwrap());
        assert!(claim(&store, &clock, "r1", ProcessingStage::Aggregate).await.unwrap());
        assert!(claim(&store, &clock, "r1", ProcessingStage::Status).await.unwrap());
    }

    #[tokio::test]
    async fn is_claimed_reflects_prior_claim() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(1000);
        assert!(!is_claimed(&store, "r1", ProcessingStage::Event).await.unwrap());
        claim(&store, &clock, "r1", ProcessingStage::Event).await.unwrap();
        assert!(is_claimed(&store, "r1", ProcessingStage::Event).await.unwrap());
    }
}
