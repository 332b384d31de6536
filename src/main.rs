//! vit-transfer: fetch an image-folder dataset, build its dataloaders and a
//! frozen ViT-B/16 with a fresh head, then push one test batch through it.
//!
//! Usage:
//!   vit-transfer --source https://example.com/data/pizza_steak_sushi.zip --destination pizza_steak_sushi

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use candle_core::Module;
use clap::Parser;
use log::info;

use vit_transfer::{
    create_dataloaders, create_model_baseline_vit, download_data, DataLoaderConfig, DevicePlacement,
    DownloadConfig, ModelConfig, VitWeights, WeightsSource,
};

#[derive(Parser)]
#[command(name = "vit-transfer", about = "Prepare a ViT transfer-learning experiment", version)]
struct Cli {
    /// URL of the zipped dataset
    #[arg(long)]
    source: String,

    /// Directory name under the data root to extract into
    #[arg(long)]
    destination: String,

    /// Root directory for archives and extracted datasets
    #[arg(long, default_value = "data")]
    data_root: PathBuf,

    /// Keep the downloaded archive after extraction
    #[arg(long)]
    keep_archive: bool,

    /// Samples per batch
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Parallel image loaders per dataloader (default: logical core count)
    #[arg(long)]
    num_workers: Option<usize>,

    /// cpu, cuda[:N], metal[:N], auto or default
    #[arg(long, default_value = "default")]
    device: DevicePlacement,

    /// Stop after building the dataloaders
    #[arg(long)]
    skip_model: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let download_config = DownloadConfig {
        data_root: cli.data_root.clone(),
        remove_source: !cli.keep_archive,
    };
    let image_path = download_data(&cli.source, &cli.destination, &download_config)
        .with_context(|| format!("Failed to download {}", cli.source))?;

    let device = cli.device.resolve()?;
    let mut loader_config = DataLoaderConfig::default().with_batch_size(cli.batch_size);
    if let Some(num_workers) = cli.num_workers {
        loader_config = loader_config.with_num_workers(num_workers);
    }
    loader_config.device = device;

    let weights = VitWeights::default();
    let transform = Arc::new(weights.transforms());
    let (train_dataloader, mut test_dataloader, class_names) = create_dataloaders(
        image_path.join("train"),
        image_path.join("test"),
        transform.clone(),
        transform,
        &loader_config,
    )
    .context("Failed to create dataloaders")?;

    info!("Classes: {:?}", class_names);
    info!(
        "Train: {} images in {} batches, test: {} images in {} batches",
        train_dataloader.dataset_len(),
        train_dataloader.len(),
        test_dataloader.dataset_len(),
        test_dataloader.len()
    );

    if cli.skip_model {
        return Ok(());
    }

    let model_config = ModelConfig {
        weights: WeightsSource::Hub(weights),
        device: cli.device,
        ..ModelConfig::default()
    };
    let model = create_model_baseline_vit(class_names.len(), &model_config)?;
    info!(
        "Model ready on {:?}: head {} -> {}, {} trainable tensors",
        model.device(),
        model.in_features(),
        model.out_features(),
        model.trainable_vars().len()
    );

    if let Some(batch) = test_dataloader.iter().next() {
        let batch = batch?;
        let images = batch.images.to_device(model.device())?;
        let logits = model.forward(&images)?;
        info!("Logits for first test batch: {:?}", logits.dims());
    }

    Ok(())
}
