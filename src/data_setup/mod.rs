pub mod config;
pub mod dataloader;
pub mod download;
pub mod error;
pub mod factory;
pub mod image_folder;
pub mod transform;
