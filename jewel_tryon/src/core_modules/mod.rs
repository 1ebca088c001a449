pub mod anchor;
pub mod compositor;
pub mod geometry;
pub mod landmarks;
pub mod overlay_asset;
pub mod placement;
pub mod snapshot;

pub mod utils {
    pub mod image_helper;
}
