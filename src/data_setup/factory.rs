use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};

use super::config::DataLoaderConfig;
use super::dataloader::DataLoader;
use super::error::DataLoaderError;
use super::image_folder::ImageFolder;
use super::transform::Transform;

/// Creates the training and testing [`DataLoader`]s plus the class names.
///
/// The training loader reshuffles every traversal and the testing loader keeps
/// discovery order. Class names come from `train_dir` only; a `test_dir`
/// with different class folders is not reconciled and its labels index into
/// its own sorted class list.
///
/// ```no_run
/// use std::sync::Arc;
/// use vit_transfer::{create_dataloaders, DataLoaderConfig, TransformPipeline};
///
/// let transform = Arc::new(TransformPipeline::new().resize(224).center_crop(224));
/// let (train, test, class_names) = create_dataloaders(
///     "data/pizza_steak_sushi/train",
///     "data/pizza_steak_sushi/test",
///     transform.clone(),
///     transform,
///     &DataLoaderConfig::default().with_batch_size(32),
/// )?;
/// # Ok::<(), vit_transfer::data_setup::error::DataLoaderError>(())
/// ```
pub fn create_dataloaders(
    train_dir: impl AsRef<Path>,
    test_dir: impl AsRef<Path>,
    train_transform: Arc<dyn Transform>,
    test_transform: Arc<dyn Transform>,
    config: &DataLoaderConfig,
) -> Result<(DataLoader, DataLoader, Vec<String>), DataLoaderError> {
    let train_data = ImageFolder::new(train_dir)?;
    let test_data = ImageFolder::new(test_dir)?;

    let class_names = train_data.classes().to_vec();
    if test_data.classes() != class_names.as_slice() {
        warn!(
            "Class folders differ between {} and {}",
            train_data.root().display(),
            test_data.root().display()
        );
    }

    let train_dataloader = DataLoader::new(train_data, train_transform, config.clone(), true)?;
    let test_dataloader = DataLoader::new(test_data, test_transform, config.clone(), false)?;

    debug!(
        "Created dataloaders: {} train batches, {} test batches, classes {:?}",
        train_dataloader.len(),
        test_dataloader.len(),
        class_names
    );

    Ok((train_dataloader, test_dataloader, class_names))
}
