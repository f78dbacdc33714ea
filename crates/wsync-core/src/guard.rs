use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::debug;

/// Directories with a mutation in flight. Membership suppresses watcher
/// reactions and rejects a second mutation on the same key.
pub struct IgnoreSet {
    entries: Mutex<HashMap<String, Instant>>,
    clock: Arc<dyn Clock>,
}

impl IgnoreSet {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        })
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enters the guarded state for `key`. The returned token leaves it
    /// when dropped, whatever path the mutation took.
    pub fn try_guard(self: &Arc<Self>, key: &str) -> SyncResult<GuardToken> {
        let mut entries = self.entries();
        if entries.contains_key(key) {
            return Err(SyncError::Busy {
                directory: key.to_string(),
            });
        }
        entries.insert(key.to_string(), self.clock.now());
        debug!(directory = %key, "guard acquired");
        Ok(GuardToken {
            set: Arc::clone(self),
            key: key.to_string(),
        })
    }

    pub fn is_guarded(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    pub fn guarded_since(&self, key: &str) -> Option<Instant> {
        self.entries().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn release(&self, key: &str) {
        self.entries().remove(key);
        debug!(directory = %key, "guard released");
    }
}

#[must_use = "dropping the token releases the guard immediately"]
pub struct GuardToken {
    set: Arc<IgnoreSet>,
    key: String,
}

impl GuardToken {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.set.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[test]
    fn token_drop_releases_key() {
        let clock = Arc::new(ManualClock::default());
        let set = IgnoreSet::new(clock.clone());
        let start = clock.now();
        {
            let token = set.try_guard("A").unwrap();
            assert_eq!(token.key(), "A");
            assert!(set.is_guarded("A"));
            assert_eq!(set.guarded_since("A"), Some(start));
        }
        assert!(!set.is_guarded("A"));
        assert!(set.is_empty());

        clock.advance(Duration::from_secs(1));
        let _token = set.try_guard("A").unwrap();
        assert_eq!(set.guarded_since("A"), Some(start + Duration::from_secs(1)));
    }

    #[test]
    fn second_guard_on_same_key_is_busy() {
        let set = IgnoreSet::new(Arc::new(ManualClock::default()));
        let _held = set.try_guard("A").unwrap();
        let err = set.try_guard("A").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Busy);
        let _other = set.try_guard("B").unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn guard_released_on_early_error_return() {
        fn failing_mutation(set: &Arc<IgnoreSet>) -> SyncResult<()> {
            let _token = set.try_guard("A")?;
            Err(SyncError::Config("boom".into()))
        }
        let set = IgnoreSet::new(Arc::new(ManualClock::default()));
        assert!(failing_mutation(&set).is_err());
        assert!(!set.is_guarded("A"));
    }
}
