//! Pre-operation checkpoints.

use super::error::RecoveryResult;
use shared_types::Timestamp;
use uuid::Uuid;

/// Anything whose state can be captured and put back bit-for-bit.
pub trait Snapshottable: Send + Sync {
    fn snapshot(&self) -> RecoveryResult<Vec<u8>>;
    fn restore(&self, snapshot: &[u8]) -> RecoveryResult<()>;
}

/// Saved pre-state of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub id: Uuid,
    pub operation: String,
    pub snapshot: Vec<u8>,
    pub created_at: Timestamp,
}

impl Checkpoint {
    /// Capture `target` now.
    pub fn capture(
        operation: &str,
        target: &dyn Snapshottable,
        created_at: Timestamp,
    ) -> RecoveryResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            operation: operation.to_string(),
            snapshot: target.snapshot()?,
            created_at,
        })
    }

    /// Put `target` back to the captured state.
    pub fn restore_into(&self, target: &dyn Snapshottable) -> RecoveryResult<()> {
        target.restore(&self.snapshot)
    }

    pub fn size_bytes(&self) -> usize {
        self.snapshot.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::RecoveryError;
    use parking_lot::Mutex;

    struct Counter(Mutex<u64>);

    impl Snapshottable for Counter {
        fn snapshot(&self) -> RecoveryResult<Vec<u8>> {
            Ok(self.0.lock().to_le_bytes().to_vec())
        }

        fn restore(&self, snapshot: &[u8]) -> RecoveryResult<()> {
            let bytes: [u8; 8] =
                snapshot
                    .try_into()
                    .map_err(|_| RecoveryError::RestoreFailed {
                        operation: "counter".into(),
                        reason: "bad length".into(),
                    })?;
            *self.0.lock() = u64::from_le_bytes(bytes);
            Ok(())
        }
    }

    #[test]
    fn test_capture_then_restore() {
        let counter = Counter(Mutex::new(7));
        let cp = Checkpoint::capture("bump", &counter, 100).unwrap();
        *counter.0.lock() = 99;
        cp.restore_into(&counter).unwrap();
        assert_eq!(*counter.0.lock(), 7);
        assert_eq!(cp.size_bytes(), 8);
        assert_eq!(cp.operation, "bump");
    }
}
