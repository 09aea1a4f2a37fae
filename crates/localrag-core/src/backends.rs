//! Backend bundles that can be replaced while queries are in flight.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::traits::{Backends, ChannelResolver};
use crate::types::CollectionRefs;

/// A fixed bundle of backends behind an atomic pointer swap.
///
/// Each query clones the current `Arc` once, so a rebuild that calls `swap`
/// never exposes a half-replaced set to a running query.
pub struct SwappableBackends {
    current: RwLock<Arc<Backends>>,
}

impl SwappableBackends {
    pub fn new(backends: Backends) -> Self {
        Self { current: RwLock::new(Arc::new(backends)) }
    }

    pub fn current(&self) -> Arc<Backends> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Install a new bundle and return the previous one.
    pub fn swap(&self, backends: Backends) -> Arc<Backends> {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, Arc::new(backends))
    }
}

#[async_trait]
impl ChannelResolver for SwappableBackends {
    async fn resolve(&self, refs: &CollectionRefs) -> Result<Backends> {
        if let Some(name) = refs.child_collection.as_ref() {
            return Err(Error::MissingReference { kind: "child collection", name: name.clone() });
        }
        if let Some(name) = refs.parent_collection.as_ref() {
            return Err(Error::MissingReference { kind: "parent collection", name: name.clone() });
        }
        if let Some(name) = refs.keyword_index.as_ref() {
            return Err(Error::MissingReference { kind: "keyword index", name: name.clone() });
        }
        Ok(self.current().as_ref().clone())
    }
}
