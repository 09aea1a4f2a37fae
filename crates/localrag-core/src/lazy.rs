//! Init-once handles for expensive resources (models, index connections).

use std::sync::Arc;

use tokio::sync::OnceCell;

type Loader<T> = Arc<dyn Fn() -> anyhow::Result<Arc<T>> + Send + Sync>;

/// A shared handle that is built on first use and reused afterwards.
///
/// Concurrent first callers wait on the same initialization. A failed load
/// leaves the cell empty so a later call may try again.
pub struct Lazy<T: ?Sized + Send + Sync + 'static> {
    cell: OnceCell<Arc<T>>,
    loader: Option<Loader<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Lazy<T> {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        Self { cell: OnceCell::new(), loader: Some(Arc::new(loader)) }
    }

    pub fn ready(value: Arc<T>) -> Self {
        Self { cell: OnceCell::new_with(Some(value)), loader: None }
    }

    /// A handle that never loads; `get` always fails.
    pub fn disabled() -> Self {
        Self { cell: OnceCell::new(), loader: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// False only for a `disabled` handle.
    pub fn is_enabled(&self) -> bool {
        self.loader.is_some() || self.cell.initialized()
    }

    /// Resolve the handle, running the loader on a blocking thread the first time.
    pub async fn get(&self) -> anyhow::Result<Arc<T>> {
        let value = self
            .cell
            .get_or_try_init(|| async {
                let Some(loader) = self.loader.clone() else { anyhow::bail!("no loader configured") };
                tokio::task::spawn_blocking(move || loader()).await.map_err(anyhow::Error::from)?
            })
            .await?;
        Ok(Arc::clone(value))
    }
}
