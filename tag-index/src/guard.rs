use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Allows at most one build at a time. Cloned handles share the flag.
#[derive(Debug, Clone, Default)]
pub struct BuildGuard {
    running: Arc<AtomicBool>,
}

impl BuildGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` if a build is already running.
    pub fn try_start(&self) -> Option<BuildTicket> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BuildTicket {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of a build; releases the guard on drop.
#[derive(Debug)]
pub struct BuildTicket {
    running: Arc<AtomicBool>,
}

impl Drop for BuildTicket {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
