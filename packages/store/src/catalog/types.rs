use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on materials per module
pub const MAX_MATERIALS_PER_MODULE: i64 = 20;

/// Status options for products
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Active,
    Inactive,
}

impl Default for ProductStatus {
    fn default() -> Self {
        ProductStatus::Draft
    }
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProductStatus::Draft),
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            other => Err(format!("unknown product status: {other}")),
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status options for material modules
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Active,
    Inactive,
}

impl Default for ModuleStatus {
    fn default() -> Self {
        ModuleStatus::Active
    }
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Active => "active",
            ModuleStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for ModuleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ModuleStatus::Active),
            "inactive" => Ok(ModuleStatus::Inactive),
            other => Err(format!("unknown module status: {other}")),
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sellable product composed of material modules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(rename = "spuCode")]
    pub spu_code: String,
    pub description: Option<String>,
    pub style: Option<String>,
    pub demographic: Option<String>,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(rename = "createdBy")]
    pub created_by: String,
    #[serde(rename = "viewCount")]
    pub view_count: i64,
    #[serde(rename = "downloadCount")]
    pub download_count: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A material module within a product (e.g. cover, sticker sheet)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialModule {
    pub id: String,
    #[serde(rename = "productId")]
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: i64,
    #[serde(default)]
    pub status: ModuleStatus,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A candidate asset inside a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    #[serde(rename = "moduleId")]
    pub module_id: String,
    pub filename: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "fileSize")]
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    #[serde(rename = "sortOrder")]
    pub sort_order: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new product
#[derive(Debug, Clone, Deserialize)]
pub struct ProductCreateInput {
    pub name: String,
    #[serde(rename = "spuCode")]
    pub spu_code: String,
    pub description: Option<String>,
    pub style: Option<String>,
    pub demographic: Option<String>,
    pub status: Option<ProductStatus>,
}

/// Input for updating an existing product (SPU code is immutable)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub style: Option<String>,
    pub demographic: Option<String>,
    pub status: Option<ProductStatus>,
}

/// Input for creating a module under a product
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleCreateInput {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<i64>,
    pub status: Option<ModuleStatus>,
}

/// Input for updating a module (category is immutable)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleUpdateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<i64>,
    pub status: Option<ModuleStatus>,
}

/// Input for registering a material's metadata under a module
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialCreateInput {
    pub filename: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "fileSize")]
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<i64>,
}
