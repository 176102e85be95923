use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Running = Arc<Mutex<HashMap<i64, Arc<AtomicBool>>>>;

/// Tracks which groups have a scan in flight.
#[derive(Debug, Clone, Default)]
pub struct ScanRegistry {
    running: Running,
}

/// Held for the duration of one group scan; releases the slot on drop.
#[derive(Debug)]
pub struct ScanGuard {
    group_id: i64,
    cancelled: Arc<AtomicBool>,
    running: Running,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the group, or `None` if a scan for it is already running.
    pub fn try_acquire(&self, group_id: i64) -> Option<ScanGuard> {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if running.contains_key(&group_id) {
            return None;
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        running.insert(group_id, cancelled.clone());

        Some(ScanGuard {
            group_id,
            cancelled,
            running: self.running.clone(),
        })
    }

    pub fn is_running(&self, group_id: i64) -> bool {
        let running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        running.contains_key(&group_id)
    }

    /// Asks an in-flight scan to stop at the next link boundary.
    pub fn cancel(&self, group_id: i64) -> bool {
        let running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        match running.get(&group_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

impl ScanGuard {
    pub fn group_id(&self) -> i64 {
        self.group_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        running.remove(&self.group_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let registry = ScanRegistry::new();

        let guard = registry.try_acquire(1).expect("first acquire");
        assert!(registry.try_acquire(1).is_none());
        assert!(registry.try_acquire(2).is_some());
        assert!(registry.is_running(1));

        drop(guard);
        assert!(!registry.is_running(1));
        assert!(registry.try_acquire(1).is_some());
    }

    #[test]
    fn cancel_flags_only_running_scans() {
        let registry = ScanRegistry::new();
        assert!(!registry.cancel(5));

        let guard = registry.try_acquire(5).unwrap();
        assert!(!guard.is_cancelled());
        assert!(registry.cancel(5));
        assert!(guard.is_cancelled());
    }
}
