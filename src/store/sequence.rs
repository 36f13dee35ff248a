//! Sequence authority - global write ordering
//!
//! Sequences:
//! - Are assigned exactly once, at durable insert
//! - Start at 1 and increase by exactly 1 per allocation
//! - Are shared by every document of a store
//!
//! The authority belongs to the persistence backend. The tree engine
//! never counts sequences itself, so in-memory and durable numbering
//! cannot diverge.

use super::errors::{StoreError, StoreResult};

#[derive(Debug, Default)]
pub struct SequenceAuthority {
    /// Highest sequence allocated or replayed. Zero on a fresh store.
    highest: i64,
}

impl SequenceAuthority {
    /// Fresh store.
    pub fn new() -> Self {
        Self { highest: 0 }
    }

    /// Authority resuming after the given highest persisted sequence.
    pub fn from_replayed(highest: i64) -> Self {
        Self {
            highest: highest.max(0),
        }
    }

    /// Observes a sequence found while replaying storage. Must be strictly
    /// greater than everything seen so far; gaps are allowed.
    pub fn observe_replayed(&mut self, sequence: i64) -> StoreResult<()> {
        if sequence <= self.highest {
            return Err(StoreError::SequenceAllocation(format!(
                "non-monotonic replay: observed {} but highest is {}",
                sequence, self.highest
            )));
        }
        self.highest = sequence;
        Ok(())
    }

    /// Allocates the next sequence.
    pub fn allocate(&mut self) -> StoreResult<i64> {
        let next = self.highest.checked_add(1).ok_or_else(|| {
            StoreError::SequenceAllocation("sequence space exhausted".to_string())
        })?;
        self.highest = next;
        Ok(next)
    }

    /// Highest allocated sequence, `None` on a fresh store.
    pub fn highest(&self) -> Option<i64> {
        if self.highest == 0 {
            None
        } else {
            Some(self.highest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_authority_starts_at_zero() {
        let authority = SequenceAuthority::new();
        assert!(authority.highest().is_none());
    }

    #[test]
    fn test_allocation_has_no_gaps() {
        let mut authority = SequenceAuthority::new();
        let allocated: Vec<i64> = (0..5).map(|_| authority.allocate().unwrap()).collect();
        assert_eq!(allocated, vec![1, 2, 3, 4, 5]);
        assert_eq!(authority.highest(), Some(5));
    }

    #[test]
    fn test_observe_replayed_allows_gaps() {
        let mut authority = SequenceAuthority::new();
        authority.observe_replayed(1).unwrap();
        authority.observe_replayed(5).unwrap();
        assert_eq!(authority.allocate().unwrap(), 6);
    }

    #[test]
    fn test_non_monotonic_replay_fails() {
        let mut authority = SequenceAuthority::new();
        authority.observe_replayed(5).unwrap();
        assert!(authority.observe_replayed(5).is_err());
        assert!(authority.observe_replayed(3).is_err());
    }

    #[test]
    fn test_from_replayed() {
        let mut authority = SequenceAuthority::from_replayed(100);
        assert_eq!(authority.highest(), Some(100));
        assert_eq!(authority.allocate().unwrap(), 101);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut authority = SequenceAuthority::from_replayed(i64::MAX);
        assert!(matches!(
            authority.allocate(),
            Err(StoreError::SequenceAllocation(_))
        ));
    }
}
