// ID Provider Port (for deterministic testing)

use uuid::Uuid;

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a fresh unique ID.
    fn generate(&self) -> Uuid;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate(&self) -> Uuid {
        Uuid::new_v4()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use std::sync::Mutex;

    use super::*;

    /// Hands out UUIDs with an incrementing low byte, so test
    /// assertions can predict ordering.
    pub struct SequentialIdProvider {
        next: Mutex<u8>,
    }

    impl SequentialIdProvider {
        pub fn new() -> Self {
            Self { next: Mutex::new(0) }
        }
    }

    impl Default for SequentialIdProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    impl IdProvider for SequentialIdProvider {
        fn generate(&self) -> Uuid {
            let mut next = self.next.lock().unwrap();
            *next = next.wrapping_add(1);
            Uuid::from_u128(*next as u128)
        }
    }
}
