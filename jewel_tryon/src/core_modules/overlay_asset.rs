// THEORY:
// The `overlay_asset` module resolves a product to the decoded jewelry image the
// compositor draws. Loading happens once, before the capture device is opened, so
// a bad product aborts the session without ever touching the camera.
//
// Whatever format the file is in, the asset that comes out is RGBA8. Images
// without an alpha channel get a fully opaque one.

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbaImage};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A product descriptor as handed over by the shop front-end.
///
/// Extra catalog fields (price, material, ...) are ignored when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image_path: Option<PathBuf>,
}

/// Decoded jewelry image with its product metadata. Immutable after load.
#[derive(Debug, Clone)]
pub struct OverlayAsset {
    image: RgbaImage,
    name: String,
    category: String,
}

impl OverlayAsset {
    /// Loads the image referenced by `product`, resolving relative paths against
    /// `assets_dir`.
    pub fn load(product: &Product, assets_dir: &Path) -> Result<Self> {
        let image_path = product
            .image_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| Error::MissingImagePath(product.name.clone()))?;

        let full_path = resolve_image_path(image_path, assets_dir);
        if !full_path.is_file() {
            return Err(Error::AssetNotFound(full_path));
        }

        let decoded = image::open(&full_path).map_err(|source| Error::AssetDecode {
            path: full_path.clone(),
            source,
        })?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(Error::EmptyAsset(full_path));
        }
        debug!(
            "loaded overlay {} ({}x{}, {:?})",
            full_path.display(),
            decoded.width(),
            decoded.height(),
            decoded.color()
        );
        Ok(Self::from_image(decoded, product))
    }

    /// Wraps an already decoded image, synthesizing alpha if it has none.
    pub fn from_image(image: DynamicImage, product: &Product) -> Self {
        Self {
            image: image.to_rgba8(),
            name: product.name.clone(),
            category: product.category.clone(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

/// Absolute paths are kept; relative ones are looked up under `assets_dir`.
pub fn resolve_image_path(image_path: &Path, assets_dir: &Path) -> PathBuf {
    if image_path.is_absolute() {
        image_path.to_path_buf()
    } else {
        assets_dir.join(image_path)
    }
}
