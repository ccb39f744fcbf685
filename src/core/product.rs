//! Products - the public surface a package exposes to its dependents.

use serde::{Deserialize, Serialize};

/// Linkage of a library product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Let the build driver choose
    #[default]
    Automatic,
    Static,
    Dynamic,
}

/// What a product builds into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProductKind {
    Library { linkage: Linkage },
    Executable,
}

impl Default for ProductKind {
    fn default() -> Self {
        ProductKind::Library {
            linkage: Linkage::Automatic,
        }
    }
}

/// A declared product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product name
    pub name: String,

    /// Product kind
    pub kind: ProductKind,

    /// Targets exposed by this product, in declaration order
    pub targets: Vec<String>,
}

impl Product {
    /// Create a library product with automatic linkage.
    pub fn library(
        name: impl Into<String>,
        targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Product {
            name: name.into(),
            kind: ProductKind::default(),
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }
}
