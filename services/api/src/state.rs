//! Application state shared across request handlers.

use std::sync::Arc;

use crate::allocation::AllocationEngine;
use crate::notify::BroadcastNotifier;
use crate::store::Store;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: AllocationEngine,
    notifier: BroadcastNotifier,
}

impl AppState {
    /// Wires the engine to `store`, publishing through `notifier`.
    pub fn new(store: Arc<dyn Store>, notifier: BroadcastNotifier) -> Self {
        let engine = AllocationEngine::new(store, Arc::new(notifier.clone()));
        Self {
            inner: Arc::new(AppStateInner { engine, notifier }),
        }
    }

    pub fn engine(&self) -> &AllocationEngine {
        &self.inner.engine
    }

    /// The live notification feed.
    pub fn notifier(&self) -> &BroadcastNotifier {
        &self.inner.notifier
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.inner.engine.store()
    }
}
