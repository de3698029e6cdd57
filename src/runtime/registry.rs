use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::runtime::process::ProcessHandle;

/// Live push processes by stream index.
///
/// Only the shutdown path reads it. The lock is held for the map operation
/// alone, never across an `.await` or a signal delivery.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    live: Mutex<HashMap<usize, Arc<ProcessHandle>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, Arc<ProcessHandle>>> {
        // The map stays consistent even if a holder panicked.
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the live process for `stream`.
    ///
    /// # Panics
    /// If a process is already registered for `stream`: a worker never
    /// launches again before reaping, so this means two live processes.
    pub fn register(&self, stream: usize, handle: Arc<ProcessHandle>) {
        let pid = handle.pid();
        let previous = self.lock().insert(stream, handle);
        if let Some(previous) = previous {
            panic!(
                "stream {stream}: pid {pid} registered while pid {} is still live",
                previous.pid()
            );
        }
    }

    /// Removes the entry for `stream` only if it is this exact handle.
    pub fn unregister(&self, stream: usize, handle: &Arc<ProcessHandle>) -> bool {
        let mut live = self.lock();
        match live.get(&stream) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                live.remove(&stream);
                true
            }
            _ => false,
        }
    }

    /// Copy of every live entry, ordered by stream index.
    pub fn snapshot_all(&self) -> Vec<(usize, Arc<ProcessHandle>)> {
        let mut snapshot: Vec<_> = self
            .lock()
            .iter()
            .map(|(stream, handle)| (*stream, handle.clone()))
            .collect();
        snapshot.sort_by_key(|(stream, _)| *stream);
        snapshot
    }

    pub fn get(&self, stream: usize) -> Option<Arc<ProcessHandle>> {
        self.lock().get(&stream).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
