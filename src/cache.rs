use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::Result;

type Loader<M> = Box<dyn Fn() -> Result<M> + Send + Sync>;

/// Lazily loaded, process-wide model slot.
///
/// The first successful load is kept for the lifetime of the cache. A failed
/// load leaves the slot empty so the next request tries again.
pub struct ModelCache<M> {
    loader: Loader<M>,
    slot: Mutex<Option<Arc<M>>>,
}

impl<M> ModelCache<M> {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<M> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            slot: Mutex::new(None),
        }
    }

    /// Returns the cached model, loading it on first use.
    ///
    /// The lock is held while loading so concurrent callers never load twice.
    pub fn get_or_load(&self) -> Result<Arc<M>> {
        let mut slot = self.slot.lock();
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        debug!("model cache empty, loading");
        let model = Arc::new((self.loader)()?);
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().is_some()
    }
}
