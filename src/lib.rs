//! Utilities for image-classification transfer learning experiments.
//!
//! - [`data_setup::download`] fetches and unpacks a zipped image dataset.
//! - [`data_setup::factory`] turns `train/` and `test/` image folders into batch producers.
//! - [`model::vit`] builds a frozen ViT-B/16 backbone with a fresh classification head.

pub mod data_setup;
pub mod model;

pub use data_setup::config::DataLoaderConfig;
pub use data_setup::dataloader::{Batch, BatchIter, DataLoader};
pub use data_setup::download::{download_data, DownloadConfig};
pub use data_setup::factory::create_dataloaders;
pub use data_setup::image_folder::ImageFolder;
pub use data_setup::transform::{Transform, TransformPipeline};
pub use model::device::DevicePlacement;
pub use model::vit::{create_model_baseline_vit, ModelConfig, VitClassifier, VitWeights, WeightsSource};
