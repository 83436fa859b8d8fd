//! Capabilities the session borrows from its host environment.
//!
//! In a browser these map to `window.location`, `history.replaceState` and a
//! full-page navigation. Non-browser hosts (the CLI, tests) use the in-memory
//! implementations below.

use std::sync::Mutex;

/// Read and rewrite the visible address.
pub trait Location: Send + Sync {
    /// Full current address, including query and fragment.
    fn href(&self) -> String;

    /// Replace the visible address without navigating.
    fn replace(&self, href: &str);
}

/// Perform a full-page navigation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str);
}

/// An address held in memory. Counts how often it was rewritten.
#[derive(Debug)]
pub struct MemoryLocation {
    inner: Mutex<(String, usize)>,
}

impl MemoryLocation {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new((href.into(), 0)),
        }
    }

    /// Number of `replace` calls so far.
    pub fn replacements(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).1
    }
}

impl Location for MemoryLocation {
    fn href(&self) -> String {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).0.clone()
    }

    fn replace(&self, href: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.0 = href.to_string();
        inner.1 += 1;
    }
}

/// Records navigation targets instead of following them.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<String> {
        self.visited
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) {
        self.visited
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
    }
}
