//! Keyed registry of cancelable background tasks.
//!
//! Per-entity timers (one interpolation task per player, one publish
//! task per session) live here. Registering a task under a key aborts
//! whatever was registered under that key before, so no two tasks for
//! the same entity can ever run concurrently.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `key`, aborting any previous task for
    /// the same key. Finished handles are swept on the way.
    pub fn replace(&self, key: &str, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().expect("task registry lock poisoned");
        tasks.retain(|_, h| !h.is_finished());
        if let Some(previous) = tasks.insert(key.to_string(), handle) {
            previous.abort();
        }
    }

    /// Aborts and forgets the task under `key`. Returns whether a task
    /// was registered.
    pub fn cancel(&self, key: &str) -> bool {
        let handle = {
            let mut tasks = self.tasks.lock().expect("task registry lock poisoned");
            tasks.remove(key)
        };
        match handle {
            Some(h) => {
                h.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, key: &str) -> bool {
        let tasks = self.tasks.lock().expect("task registry lock poisoned");
        tasks.get(key).map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Number of registered (not necessarily still running) tasks.
    pub fn len(&self) -> usize {
        self.tasks.lock().expect("task registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
