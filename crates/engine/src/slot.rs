//! Single-slot holder for the serving snapshot.
//!
//! Readers clone an `Arc` under a read lock; `replace` swaps the `Arc` under
//! the write lock. Neither side holds the lock for longer than the pointer
//! copy, and a reader that already holds an `Arc` keeps using its snapshot
//! after a swap.

use crate::snapshot::ModelSnapshot;
use flrec_core::error::{RecError, RecResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct ModelSlot {
    current: RwLock<Option<Arc<ModelSnapshot>>>,
}

impl ModelSlot {
    /// An empty slot; `read` fails with `NotReady` until the first install.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RecResult<Arc<ModelSnapshot>> {
        self.current.read().clone().ok_or(RecError::NotReady)
    }

    /// Validate and install `snapshot`, returning its generation.
    /// A snapshot that fails validation is discarded and the current one kept.
    pub fn replace(&self, mut snapshot: ModelSnapshot) -> RecResult<u64> {
        if let Err(e) = snapshot.check_consistency() {
            warn!(error = %e, "Rejecting inconsistent snapshot");
            return Err(e);
        }
        let (items, users) = (snapshot.items().len(), snapshot.users().len());

        let (generation, previous) = {
            let mut current = self.current.write();
            let generation = current.as_ref().map_or(0, |s| s.generation()) + 1;
            snapshot.set_generation(generation);
            (generation, current.replace(Arc::new(snapshot)))
        };

        // The old snapshot is released outside the lock, and only once the
        // last in-flight reader drops its reference.
        info!(
            generation = generation,
            previous = previous.as_ref().map(|s| s.generation()),
            "Model snapshot installed"
        );
        metrics::gauge!("flrec.model.items").set(items as f64);
        metrics::gauge!("flrec.model.users").set(users as f64);
        Ok(generation)
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn generation(&self) -> Option<u64> {
        self.current.read().as_ref().map(|s| s.generation())
    }
}
