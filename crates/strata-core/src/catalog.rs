//! Product catalog - resolves product families to hardware descriptions
//!
//! The catalog is the only place that knows per-product baselines. Discovery
//! copies a baseline into the execution environment and then lets the catalog
//! re-run its product setup once a hw config has been chosen.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::engine::PreemptionMode;
use crate::hw_info::{HardwareInfo, HwConfigError, HwInfoConfig};

const BUILTIN_PLATFORMS: &str = include_str!("platforms.toml");

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read product catalog: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse product catalog: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Catalog default product {0:?} is not listed")]
    UnknownDefault(String),
    #[error("Product {product} has an invalid default config: {source}")]
    InvalidConfig {
        product: String,
        #[source]
        source: HwConfigError,
    },
    #[error("Product {0:?} is listed twice")]
    Duplicate(String),
}

/// Hardware-capability resolution used by discovery
pub trait HardwareCatalog: Send + Sync {
    /// Description used when no product family override resolves
    fn default_platform(&self) -> &HardwareInfo;

    /// Baseline description for a product family short name
    fn resolve(&self, product_family: &str) -> Option<&HardwareInfo>;

    /// Hw config selected by the `default` override for a product family
    fn default_config(&self, product_family: &str) -> Option<HwInfoConfig>;

    /// Re-run product setup on `hw_info` for the given topology
    fn setup(&self, hw_info: &mut HardwareInfo, config: &HwInfoConfig);

    /// Apply product-specific adjustments after setup
    fn configure_custom(&self, hw_info: &mut HardwareInfo);
}

/// Product-specific adjustments applied by `configure_custom`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomSetup {
    /// Upper bound on enabled subslices
    pub max_sub_slices: Option<u32>,
    /// Force the blitter feature on or off
    pub ftr_blitter: Option<bool>,
    /// Replace the default preemption mode
    pub default_preemption_mode: Option<PreemptionMode>,
}

/// A single product entry in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductEntry {
    /// Product family short name (e.g., "tgllp")
    pub name: String,
    /// Hw config string used for `HardwareInfoOverride = "default"`
    pub default_config: String,
    /// Baseline hardware description
    pub hw_info: HardwareInfo,
    #[serde(default)]
    pub custom: CustomSetup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default = "default_version")]
    version: String,
    default: String,
    #[serde(default)]
    product: Vec<ProductEntry>,
}

fn default_version() -> String {
    "1.0".to_string()
}

struct ResolvedProduct {
    entry: ProductEntry,
    default_config: HwInfoConfig,
}

/// Catalog backed by a TOML product table
pub struct BuiltinCatalog {
    products: Vec<ResolvedProduct>,
    default_index: usize,
}

impl std::fmt::Debug for BuiltinCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinCatalog")
            .field("products", &self.product_names())
            .field("default", &self.default_platform().product_family())
            .finish()
    }
}

impl BuiltinCatalog {
    /// Catalog compiled into the crate
    pub fn builtin() -> Self {
        Self::from_toml(BUILTIN_PLATFORMS).expect("embedded product catalog is valid")
    }

    /// Load a catalog from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;

        let mut products: Vec<ResolvedProduct> = Vec::with_capacity(file.product.len());
        for entry in file.product {
            if products.iter().any(|p| p.entry.name.eq_ignore_ascii_case(&entry.name)) {
                return Err(CatalogError::Duplicate(entry.name));
            }
            let default_config = entry.default_config.parse().map_err(|source| {
                CatalogError::InvalidConfig {
                    product: entry.name.clone(),
                    source,
                }
            })?;
            products.push(ResolvedProduct {
                entry,
                default_config,
            });
        }

        let default_index = products
            .iter()
            .position(|p| p.entry.name.eq_ignore_ascii_case(&file.default))
            .ok_or(CatalogError::UnknownDefault(file.default))?;

        debug!(
            version = %file.version,
            products = products.len(),
            "Loaded product catalog"
        );

        Ok(Self {
            products,
            default_index,
        })
    }

    /// Load a catalog from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn product_names(&self) -> Vec<&str> {
        self.products.iter().map(|p| p.entry.name.as_str()).collect()
    }

    fn find(&self, product_family: &str) -> Option<&ResolvedProduct> {
        self.products
            .iter()
            .find(|p| p.entry.name.eq_ignore_ascii_case(product_family))
    }
}

impl HardwareCatalog for BuiltinCatalog {
    fn default_platform(&self) -> &HardwareInfo {
        &self.products[self.default_index].entry.hw_info
    }

    fn resolve(&self, product_family: &str) -> Option<&HardwareInfo> {
        self.find(product_family).map(|p| &p.entry.hw_info)
    }

    fn default_config(&self, product_family: &str) -> Option<HwInfoConfig> {
        self.find(product_family).map(|p| p.default_config)
    }

    fn setup(&self, hw_info: &mut HardwareInfo, config: &HwInfoConfig) {
        if let Some(product) = self.find(&hw_info.platform.product_family) {
            let baseline = &product.entry.hw_info;
            hw_info.feature_table = baseline.feature_table.clone();
            hw_info.gt_system_info.tile_count = baseline.gt_system_info.tile_count;
        }
        config.apply_to(hw_info);
    }

    fn configure_custom(&self, hw_info: &mut HardwareInfo) {
        let Some(product) = self.find(&hw_info.platform.product_family) else {
            return;
        };
        let custom = &product.entry.custom;

        if let Some(max) = custom.max_sub_slices {
            let gt = &mut hw_info.gt_system_info;
            if gt.sub_slice_count > max {
                let eu_per_sub_slice = gt.eu_count / gt.sub_slice_count.max(1);
                gt.sub_slice_count = max;
                gt.eu_count = max.saturating_mul(eu_per_sub_slice);
            }
        }
        if let Some(blitter) = custom.ftr_blitter {
            hw_info.feature_table.ftr_blitter = blitter;
        }
        if let Some(mode) = custom.default_preemption_mode {
            hw_info.capability_table.default_preemption_mode = mode;
        }
    }
}
