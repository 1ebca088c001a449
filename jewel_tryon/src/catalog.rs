// THEORY:
// The `catalog` module is the product list a shop front-end launches try-on
// sessions from. It is read once, up front, and only looked up by id afterwards.
// Entries carry just what a session needs; unknown JSON fields are ignored.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core_modules::overlay_asset::Product;
use crate::error::{Error, Result};

/// A JSON array of products. Only the fields the engine needs are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn get(&self, id: u64) -> Result<&Product> {
        self.products
            .iter()
            .find(|product| product.id == id)
            .ok_or(Error::ProductNotFound(id))
    }
}
