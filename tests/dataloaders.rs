use std::fs;
use std::path::Path;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use tempfile::tempdir;
use vit_transfer::data_setup::error::DataLoaderError;
use vit_transfer::{create_dataloaders, DataLoader, DataLoaderConfig, TransformPipeline};

/// Writes `per_class` 4x4 images per class; the red channel encodes the sample index.
fn make_split(root: &Path, classes: &[&str], per_class: usize) -> anyhow::Result<()> {
    let mut index = 0u8;
    for class in classes {
        let dir = root.join(class);
        fs::create_dir_all(&dir)?;
        for i in 0..per_class {
            RgbImage::from_pixel(4, 4, Rgb([index, 0, 0])).save(dir.join(format!("{i:02}.png")))?;
            index += 10;
        }
    }
    Ok(())
}

fn epoch_order(loader: &mut DataLoader) -> anyhow::Result<Vec<u32>> {
    let mut order = Vec::new();
    for batch in loader.iter() {
        let batch = batch?;
        let red = batch.images.narrow(1, 0, 1)?.flatten_from(1)?.max(1)?;
        order.extend(red.to_vec1::<f32>()?.into_iter().map(|v| (v * 255.0).round() as u32));
    }
    Ok(order)
}

fn config(batch_size: usize) -> DataLoaderConfig {
    DataLoaderConfig::default().with_batch_size(batch_size).with_num_workers(2)
}

#[test]
fn class_names_come_from_train_dir() -> anyhow::Result<()> {
    let root = tempdir()?;
    make_split(&root.path().join("train"), &["sushi", "pizza", "steak"], 2)?;
    make_split(&root.path().join("test"), &["sushi", "pizza", "steak"], 1)?;

    let transform = Arc::new(TransformPipeline::new());
    let (train, test, class_names) = create_dataloaders(
        root.path().join("train"),
        root.path().join("test"),
        transform.clone(),
        transform,
        &config(4),
    )?;

    assert_eq!(class_names, vec!["pizza", "steak", "sushi"]);
    assert_eq!(train.dataset_len(), 6);
    assert_eq!(train.len(), 2);
    assert_eq!(test.dataset_len(), 3);
    assert_eq!(test.len(), 1);
    assert!(train.shuffles());
    assert!(!test.shuffles());
    Ok(())
}

#[test]
fn test_loader_order_is_stable_and_train_order_changes() -> anyhow::Result<()> {
    let root = tempdir()?;
    make_split(&root.path().join("train"), &["a", "b"], 12)?;
    make_split(&root.path().join("test"), &["a", "b"], 12)?;

    let transform = Arc::new(TransformPipeline::new());
    let (mut train, mut test, _) = create_dataloaders(
        root.path().join("train"),
        root.path().join("test"),
        transform.clone(),
        transform,
        &config(5),
    )?;

    let test_first = epoch_order(&mut test)?;
    let test_second = epoch_order(&mut test)?;
    assert_eq!(test_first, test_second);
    let mut sorted = test_first.clone();
    sorted.sort_unstable();
    assert_eq!(test_first, sorted);

    let train_first = epoch_order(&mut train)?;
    let train_second = epoch_order(&mut train)?;
    assert_eq!(train_first.len(), 24);
    assert_ne!(train_first, train_second);

    let mut a = train_first.clone();
    let mut b = train_second.clone();
    a.sort_unstable();
    b.sort_unstable();
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn transforms_are_applied_per_split() -> anyhow::Result<()> {
    let root = tempdir()?;
    make_split(&root.path().join("train"), &["a"], 2)?;
    make_split(&root.path().join("test"), &["a"], 2)?;

    let (mut train, mut test, _) = create_dataloaders(
        root.path().join("train"),
        root.path().join("test"),
        Arc::new(TransformPipeline::new().resize_exact(8, 8)),
        Arc::new(TransformPipeline::new().center_crop(2)),
        &config(2),
    )?;

    let train_batch = train.iter().next().unwrap()?;
    let test_batch = test.iter().next().unwrap()?;
    assert_eq!(train_batch.images.dims(), &[2, 3, 8, 8]);
    assert_eq!(test_batch.images.dims(), &[2, 3, 2, 2]);
    assert_eq!(test_batch.labels.to_vec1::<u32>()?, vec![0, 0]);
    Ok(())
}

#[test]
fn missing_test_dir_is_an_error() -> anyhow::Result<()> {
    let root = tempdir()?;
    make_split(&root.path().join("train"), &["a"], 1)?;

    let transform = Arc::new(TransformPipeline::new());
    let result = create_dataloaders(
        root.path().join("train"),
        root.path().join("test"),
        transform.clone(),
        transform,
        &config(1),
    );
    assert!(matches!(result, Err(DataLoaderError::DirectoryNotFound(_))));
    Ok(())
}

#[test]
fn mismatched_test_classes_are_not_reconciled() -> anyhow::Result<()> {
    let root = tempdir()?;
    make_split(&root.path().join("train"), &["cat", "dog"], 1)?;
    make_split(&root.path().join("test"), &["bird"], 1)?;

    let transform = Arc::new(TransformPipeline::new());
    let (_, test, class_names) = create_dataloaders(
        root.path().join("train"),
        root.path().join("test"),
        transform.clone(),
        transform,
        &config(1),
    )?;

    assert_eq!(class_names, vec!["cat", "dog"]);
    assert_eq!(test.classes(), &["bird"]);
    Ok(())
}
