// THEORY:
// `tryon_viewer` is the desktop front-end of the engine. It owns everything the
// engine keeps behind traits: the OpenCV camera, the landmark networks and the
// HighGUI window.
//
// Setup order:
// 1.  Parse arguments and load the optional config file.
// 2.  Resolve the product, from a catalog or from the command line.
// 3.  Start the session. The overlay asset is checked before the camera opens.
// 4.  Open the window and run until quit.
//
// Usage:
//   tryon_viewer --catalog products.json --product-id 1
//   tryon_viewer --name "Gold Hoops" --category Earrings --image earring_gold.png
//   tryon_viewer --catalog products.json --product-id 4 --video clip.mp4

mod capture;
mod display;
mod face_mesh;
mod mat;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use jewel_tryon::{Catalog, Product, Session, TryOnConfig};
use log::info;

use crate::capture::OpenCvCapture;
use crate::display::HighGuiWindow;
use crate::face_mesh::FaceMeshDetector;

#[derive(Parser, Debug)]
#[command(name = "tryon_viewer")]
#[command(author, version, about = "Live jewelry try-on over a webcam feed", long_about = None)]
struct Args {
    /// JSON product catalog to pick the product from
    #[arg(long, requires = "product_id")]
    catalog: Option<PathBuf>,

    /// Id of the product in the catalog
    #[arg(long, requires = "catalog")]
    product_id: Option<u64>,

    /// Product name, when not using a catalog
    #[arg(long, conflicts_with = "catalog")]
    name: Option<String>,

    /// Product category (Necklace, Earrings, Crown, ...)
    #[arg(long, conflicts_with = "catalog")]
    category: Option<String>,

    /// Overlay image, relative to the assets directory unless absolute
    #[arg(long, conflicts_with = "catalog")]
    image: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera index
    #[arg(long, default_value_t = 0)]
    camera: i32,

    /// Read frames from a video file instead of a camera
    #[arg(long)]
    video: Option<PathBuf>,
}

impl Args {
    fn product(&self) -> anyhow::Result<Product> {
        if let (Some(catalog), Some(id)) = (&self.catalog, self.product_id) {
            let catalog = Catalog::load(catalog).with_context(|| format!("reading catalog {}", catalog.display()))?;
            return Ok(catalog.get(id)?.clone());
        }
        let Some(name) = &self.name else {
            bail!("pass either --catalog with --product-id, or --name with --category and --image");
        };
        Ok(Product {
            id: 0,
            name: name.clone(),
            category: self.category.clone().unwrap_or_default(),
            image_path: self.image.clone(),
        })
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TryOnConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => TryOnConfig::default(),
    };
    let product = args.product()?;
    launch(&args, &config, &product)
}

/// Runs one try-on session. The overlay asset is checked before the camera is
/// opened, and the window only appears once everything is acquired.
fn launch(args: &Args, config: &TryOnConfig, product: &Product) -> anyhow::Result<()> {
    let mut session = Session::new(config);
    session
        .start(
            product,
            || match &args.video {
                Some(path) => OpenCvCapture::file(path),
                None => OpenCvCapture::camera(args.camera),
            },
            || FaceMeshDetector::new(&config.detector),
        )
        .with_context(|| format!("starting try-on for `{}`", product.name))?;

    let mut window = HighGuiWindow::open(&product.name, config.capture_key, config.quit_key)?;
    info!(
        "`{}` is open; snapshots go to {}",
        window.title(),
        session.snapshot_dir().display()
    );
    session.run(&mut window)?;

    info!("try-on finished");
    Ok(())
}
