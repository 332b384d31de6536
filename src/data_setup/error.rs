use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataLoaderError {
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("No class directories found in {}", .0.display())]
    NoClasses(PathBuf),

    #[error("No images found for class '{class}' in {}", .dir.display())]
    EmptyClass { class: String, dir: PathBuf },

    #[error("Invalid dataloader config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Tensor error: {0}")]
    TensorError(#[from] candle_core::Error),

    #[error("Failed to build worker pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),

    #[error("Loader panicked on batch {batch_number}: {message}")]
    WorkerPanic { batch_number: usize, message: String },
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Cannot derive an archive file name from {0}")]
    TargetFileName(String),
}
