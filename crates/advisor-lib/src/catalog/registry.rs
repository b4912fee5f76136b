//! Per-vendor catalog cache
//!
//! Catalogs are loaded on first use and never reloaded. Reads go straight to
//! the concurrent map; loads are serialized so each vendor is loaded once.

use super::loader::normalize_vendor;
use super::{Catalog, CatalogLoader};
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Append-only registry of vendor catalogs
pub struct CatalogRegistry {
    loader: Arc<dyn CatalogLoader>,
    catalogs: DashMap<String, Arc<Catalog>>,
    load_guard: Mutex<()>,
}

impl CatalogRegistry {
    pub fn new(loader: Arc<dyn CatalogLoader>) -> Self {
        Self {
            loader,
            catalogs: DashMap::new(),
            load_guard: Mutex::new(()),
        }
    }

    /// Cached catalog for a vendor, without loading
    pub fn get(&self, vendor: &str) -> Option<Arc<Catalog>> {
        self.catalogs
            .get(&normalize_vendor(vendor))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Cached catalog for a vendor, loading it on first request
    pub async fn get_or_load(&self, vendor: &str) -> Result<Arc<Catalog>> {
        if let Some(catalog) = self.get(vendor) {
            return Ok(catalog);
        }

        let _guard = self.load_guard.lock().await;

        // Another task may have finished the load while we waited
        if let Some(catalog) = self.get(vendor) {
            return Ok(catalog);
        }

        let key = normalize_vendor(vendor);
        let families = self.loader.load(&key).await?;
        let catalog = Arc::new(Catalog::from_families(key.clone(), families)?);

        info!(
            event = "catalog_loaded",
            vendor = %key,
            families = catalog.families().len(),
            instances = catalog.instance_count(),
            "Loaded instance catalog"
        );

        self.catalogs.insert(key, Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Load every vendor the loader knows about
    pub async fn preload_all(&self) -> Result<()> {
        for vendor in self.loader.vendors() {
            self.get_or_load(&vendor).await?;
        }
        Ok(())
    }

    pub fn is_loaded(&self, vendor: &str) -> bool {
        self.catalogs.contains_key(&normalize_vendor(vendor))
    }

    /// Vendors whose catalogs are currently cached
    pub fn loaded_vendors(&self) -> Vec<String> {
        let mut vendors: Vec<String> = self.catalogs.iter().map(|e| e.key().clone()).collect();
        vendors.sort();
        vendors
    }

    /// Vendors the underlying loader can serve
    pub fn known_vendors(&self) -> Vec<String> {
        self.loader.vendors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CloudInstance, InstanceFamily};
    use crate::error::AdvisorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Loader that counts how often it is asked for data
    struct CountingLoader {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl CatalogLoader for CountingLoader {
        async fn load(&self, vendor: &str) -> Result<Vec<InstanceFamily>> {
            if vendor != "custom" {
                return Err(AdvisorError::UnknownVendor(vendor.to_string()));
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(vec![InstanceFamily::new(
                "Test1",
                vec![CloudInstance::new("Test1_4_8", 4, 8.0)],
            )])
        }

        fn vendors(&self) -> Vec<String> {
            vec!["custom".to_string()]
        }
    }

    #[tokio::test]
    async fn test_catalog_loaded_once() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let registry = CatalogRegistry::new(loader.clone());

        assert!(!registry.is_loaded("custom"));
        let first = registry.get_or_load("custom").await.unwrap();
        let second = registry.get_or_load("CUSTOM").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.loaded_vendors(), vec!["custom".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_first_load() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let registry = Arc::new(CatalogRegistry::new(loader.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_or_load("custom").await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let registry = CatalogRegistry::new(loader);

        assert!(registry.get_or_load("gcp").await.is_err());
        assert!(!registry.is_loaded("gcp"));
        assert!(registry.get("gcp").is_none());
    }

    #[tokio::test]
    async fn test_preload_all_known_vendors() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let registry = CatalogRegistry::new(loader.clone());

        assert_eq!(registry.known_vendors(), vec!["custom".to_string()]);
        assert!(registry.loaded_vendors().is_empty());

        registry.preload_all().await.unwrap();
        registry.preload_all().await.unwrap();

        assert_eq!(registry.loaded_vendors(), registry.known_vendors());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }
}
