//! Batch id sequence
//!
//! Batch ids are dense and strictly increasing. The counter lives in memory
//! and is reloaded from the highest persisted batch on startup, so a restart
//! continues the sequence without gaps. Allocation happens only under the
//! anchor pipeline's exclusive lock.

use crate::error::StoreResult;
use crate::traits::Store;
use std::sync::atomic::{AtomicU64, Ordering};

/// Dense monotonic id allocator seeded from the store
#[derive(Debug)]
pub struct BatchSequence {
    next: AtomicU64,
}

impl BatchSequence {
    /// Seed the sequence from the highest persisted batch id
    pub async fn load(store: &dyn Store) -> StoreResult<Self> {
        let next = store.max_batch_id().await?.map_or(1, |max| max + 1);
        Ok(Self {
            next: AtomicU64::new(next),
        })
    }

    /// Start from 1 with nothing persisted
    pub fn fresh() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next id
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Peek without allocating
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::collections::HashMap;
    use zkiot_core::crypto::Digest32;
    use zkiot_core::types::MerkleBatch;

    #[test]
    fn test_fresh_starts_at_one() {
        let seq = BatchSequence::fresh();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.current(), 3);
    }

    #[tokio::test]
    async fn test_load_continues_after_restart() {
        let store = MemoryStore::new();
        let batch = MerkleBatch {
            batch_id: 7,
            leaf_count: 1,
            root: Digest32::zero(),
            leaves: vec![Digest32::zero()],
            created_at: 0,
            metadata: String::new(),
            anchors: HashMap::new(),
        };
        // Simulate a pre-existing batch without going through the pipeline.
        store.create_batch_with_leaves(&batch, &[]).await.unwrap();

        let seq = BatchSequence::load(&store).await.unwrap();
        assert_eq!(seq.next(), 8);
    }
}
