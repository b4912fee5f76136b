//! Cloud instance catalogs
//!
//! A catalog holds the reference data for one cloud vendor: every SKU with
//! its vCPU count, RAM and per-region price, grouped into families of
//! interchangeable SKUs. Catalogs are loaded once through a
//! [`CatalogLoader`] and cached in a [`CatalogRegistry`].

mod loader;
mod registry;

pub use loader::{parse_families, CatalogSource, JsonCatalogLoader, BUILTIN_VENDORS, CUSTOM_VENDOR};
pub use registry::CatalogRegistry;

use crate::error::{AdvisorError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A purchasable cloud machine type
#[derive(Debug, Clone, PartialEq)]
pub struct CloudInstance {
    pub model: String,
    pub vcpus: u32,
    pub ram_gb: f64,
    /// Hourly price by region; regions without a price are absent
    pub prices: HashMap<String, f64>,
}

impl CloudInstance {
    pub fn new(model: impl Into<String>, vcpus: u32, ram_gb: f64) -> Self {
        Self {
            model: model.into(),
            vcpus,
            ram_gb,
            prices: HashMap::new(),
        }
    }

    pub fn with_price(mut self, region: impl Into<String>, price: f64) -> Self {
        self.prices.insert(region.into(), price);
        self
    }

    /// Price in a region, if the SKU is offered there
    pub fn price_in(&self, region: &str) -> Option<f64> {
        self.prices.get(region).copied()
    }

    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(AdvisorError::CatalogLoad("instance with empty model name".into()));
        }
        if self.vcpus == 0 {
            return Err(AdvisorError::CatalogLoad(format!("{} has no vCPUs", self.model)));
        }
        if !(self.ram_gb.is_finite() && self.ram_gb > 0.0) {
            return Err(AdvisorError::CatalogLoad(format!(
                "{} has invalid RAM {}",
                self.model, self.ram_gb
            )));
        }
        if let Some((region, price)) = self
            .prices
            .iter()
            .find(|(_, p)| !(p.is_finite() && **p >= 0.0))
        {
            return Err(AdvisorError::CatalogLoad(format!(
                "{} has invalid price {} in {}",
                self.model, price, region
            )));
        }
        Ok(())
    }
}

/// SKUs that can replace each other or be combined when right-sizing
#[derive(Debug, Clone)]
pub struct InstanceFamily {
    pub name: String,
    pub members: Vec<Arc<CloudInstance>>,
}

impl InstanceFamily {
    pub fn new(name: impl Into<String>, members: Vec<CloudInstance>) -> Self {
        Self {
            name: name.into(),
            members: members.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Reference data for a single vendor, indexed by model name
#[derive(Debug)]
pub struct Catalog {
    vendor: String,
    families: Vec<InstanceFamily>,
    instances: HashMap<String, Arc<CloudInstance>>,
    family_index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog, rejecting invalid SKUs and duplicate model names
    pub fn from_families(vendor: impl Into<String>, families: Vec<InstanceFamily>) -> Result<Self> {
        let vendor = vendor.into();
        let mut instances = HashMap::new();
        let mut family_index = HashMap::new();

        for (index, family) in families.iter().enumerate() {
            for member in &family.members {
                member.validate()?;
                if instances
                    .insert(member.model.clone(), Arc::clone(member))
                    .is_some()
                {
                    return Err(AdvisorError::CatalogLoad(format!(
                        "duplicate model {} in {} catalog",
                        member.model, vendor
                    )));
                }
                family_index.insert(member.model.clone(), index);
            }
        }

        Ok(Self {
            vendor,
            families,
            instances,
            family_index,
        })
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn families(&self) -> &[InstanceFamily] {
        &self.families
    }

    pub fn family(&self, name: &str) -> Option<&InstanceFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    /// Family by name, failing with [`AdvisorError::UnknownFamily`]
    pub fn require_family(&self, name: &str) -> Result<&InstanceFamily> {
        self.family(name)
            .ok_or_else(|| AdvisorError::UnknownFamily(name.to_string()))
    }

    /// Look up a single SKU by model name
    pub fn instance(&self, model: &str) -> Option<&Arc<CloudInstance>> {
        self.instances.get(model)
    }

    /// Family containing the given model
    pub fn family_of(&self, model: &str) -> Option<&InstanceFamily> {
        self.family_index
            .get(model)
            .and_then(|index| self.families.get(*index))
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

/// Source of vendor catalog data
#[async_trait]
pub trait CatalogLoader: Send + Sync {
    /// Load every family known for a vendor
    async fn load(&self, vendor: &str) -> Result<Vec<InstanceFamily>>;

    /// Vendors this loader can serve
    fn vendors(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_family() -> InstanceFamily {
        InstanceFamily::new(
            "Test1",
            vec![
                CloudInstance::new("Test1_16_32", 16, 32.0).with_price("eastus", 1.6),
                CloudInstance::new("Test1_8_16", 8, 16.0).with_price("eastus", 0.8),
                CloudInstance::new("Test1_4_8", 4, 8.0).with_price("eastus", 0.4),
            ],
        )
    }

    #[test]
    fn test_lookup_by_model_and_family() {
        let catalog = Catalog::from_families("custom", vec![test_family()]).unwrap();

        assert_eq!(catalog.vendor(), "custom");
        assert_eq!(catalog.instance_count(), 3);

        let instance = catalog.instance("Test1_8_16").unwrap();
        assert_eq!(instance.vcpus, 8);
        assert_eq!(instance.ram_gb, 16.0);
        assert_eq!(instance.price_in("eastus"), Some(0.8));
        assert_eq!(instance.price_in("westus"), None);

        let family = catalog.family_of("Test1_4_8").unwrap();
        assert_eq!(family.name, "Test1");
        assert_eq!(family.len(), 3);
        assert!(catalog.family_of("Missing").is_none());

        assert_eq!(catalog.require_family("Test1").unwrap().len(), 3);
        assert!(matches!(
            catalog.require_family("Test9"),
            Err(AdvisorError::UnknownFamily(name)) if name == "Test9"
        ));
    }

    #[test]
    fn test_duplicate_models_rejected() {
        let result = Catalog::from_families("custom", vec![test_family(), test_family()]);
        assert!(matches!(result, Err(AdvisorError::CatalogLoad(_))));
    }

    #[test]
    fn test_invalid_instances_rejected() {
        let zero_cpu = InstanceFamily::new("Bad", vec![CloudInstance::new("Bad_0_8", 0, 8.0)]);
        assert!(Catalog::from_families("custom", vec![zero_cpu]).is_err());

        let zero_ram = InstanceFamily::new("Bad", vec![CloudInstance::new("Bad_2_0", 2, 0.0)]);
        assert!(Catalog::from_families("custom", vec![zero_ram]).is_err());

        let negative_price = InstanceFamily::new(
            "Bad",
            vec![CloudInstance::new("Bad_2_4", 2, 4.0).with_price("eastus", -1.0)],
        );
        assert!(Catalog::from_families("custom", vec![negative_price]).is_err());
    }
}
