//! Object storage backends and the document-management client.

use std::sync::Arc;

use docsearch_core::config::{expand_path, StorageBackend, StorageSettings};
use docsearch_core::error::Result;
use docsearch_core::traits::ObjectStore;

pub mod drive;
pub mod fs;
pub mod gcs;
pub mod memory;

pub use drive::DriveClient;
pub use fs::FsObjectStore;
pub use gcs::GcsObjectStore;
pub use memory::MemoryObjectStore;

/// The configured object store. Implementations make one attempt per call.
pub fn object_store_from_settings(settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match settings.backend {
        StorageBackend::Fs => {
            let root = expand_path(&settings.root);
            tracing::info!("Object storage: filesystem at {}", root.display());
            Arc::new(FsObjectStore::new(root))
        }
        StorageBackend::Memory => {
            tracing::info!("Object storage: in-memory");
            Arc::new(MemoryObjectStore::new())
        }
        StorageBackend::Gcs => {
            let store = GcsObjectStore::new(settings)?;
            tracing::info!("Object storage: GCS bucket {}", settings.bucket.as_deref().unwrap_or_default());
            Arc::new(store)
        }
    };
    Ok(store)
}
