use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use candle_core::{Device, Tensor};
use crossbeam_channel::{bounded, Receiver};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::config::DataLoaderConfig;
use super::error::DataLoaderError;
use super::image_folder::ImageFolder;
use super::transform::Transform;

/// One group of samples: `images` is `(N, C, H, W)` f32, `labels` is `(N,)` u32.
#[derive(Debug)]
pub struct Batch {
    pub images: Tensor,
    pub labels: Tensor,
    pub batch_number: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.dims1().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Restartable batch producer over an [`ImageFolder`].
///
/// Every call to [`DataLoader::iter`] is one traversal (epoch). With shuffling
/// enabled the sample order is redrawn at the start of each traversal,
/// otherwise discovery order is kept.
pub struct DataLoader {
    folder: Arc<ImageFolder>,
    transform: Arc<dyn Transform>,
    config: DataLoaderConfig,
    indices: Vec<usize>,
    rng: Option<StdRng>,
    pool: Arc<ThreadPool>,
}

impl DataLoader {
    pub fn new(
        folder: ImageFolder,
        transform: Arc<dyn Transform>,
        config: DataLoaderConfig,
        shuffle: bool,
    ) -> Result<Self, DataLoaderError> {
        let mut config = config.build()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_workers)
            .thread_name(|i| format!("dataloader-worker-{i}"))
            .build()?;

        let rng = if shuffle {
            if config.shuffle_seed.is_none() {
                config.shuffle_seed = Some(rand::thread_rng().gen());
            }
            config.shuffle_seed.map(StdRng::seed_from_u64)
        } else {
            config.shuffle_seed = None;
            None
        };

        debug!(
            "DataLoader over {}: {} samples, batch size {}, {} workers, shuffle {}",
            folder.root().display(),
            folder.len(),
            config.batch_size,
            config.num_workers,
            shuffle
        );

        Ok(DataLoader {
            indices: (0..folder.len()).collect(),
            folder: Arc::new(folder),
            transform,
            config,
            rng,
            pool: Arc::new(pool),
        })
    }

    /// Starts a traversal. Batches are loaded ahead on a background thread.
    pub fn iter(&mut self) -> BatchIter {
        if let Some(rng) = self.rng.as_mut() {
            self.indices.shuffle(rng);
        }

        let batch_size = self.config.batch_size;
        let drop_last = self.config.drop_last;
        let batches: Vec<Vec<usize>> = self
            .indices
            .chunks(batch_size)
            .filter(|chunk| !drop_last || chunk.len() == batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        BatchIter::spawn(
            batches,
            Arc::clone(&self.folder),
            Arc::clone(&self.transform),
            Arc::clone(&self.pool),
            &self.config,
        )
    }

    /// Number of batches per traversal.
    pub fn len(&self) -> usize {
        let samples = self.folder.len();
        if self.config.drop_last {
            samples / self.config.batch_size
        } else {
            samples.div_ceil(self.config.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dataset_len(&self) -> usize {
        self.folder.len()
    }

    pub fn classes(&self) -> &[String] {
        self.folder.classes()
    }

    pub fn shuffles(&self) -> bool {
        self.rng.is_some()
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }
}

impl<'a> IntoIterator for &'a mut DataLoader {
    type Item = Result<Batch, DataLoaderError>;
    type IntoIter = BatchIter;

    fn into_iter(self) -> BatchIter {
        self.iter()
    }
}

/// One traversal of a [`DataLoader`].
///
/// Dropping it disconnects the queue and stops the loader thread after its
/// current batch. An `Err` item ends the traversal. A panic while loading a
/// batch (in a transform or a worker) is reported as
/// [`DataLoaderError::WorkerPanic`].
pub struct BatchIter {
    receiver: Receiver<Result<Batch, DataLoaderError>>,
    remaining: usize,
}

impl BatchIter {
    fn spawn(
        batches: Vec<Vec<usize>>,
        folder: Arc<ImageFolder>,
        transform: Arc<dyn Transform>,
        pool: Arc<ThreadPool>,
        config: &DataLoaderConfig,
    ) -> Self {
        let (sender, receiver) = bounded(config.prefetch_batches);
        let remaining = batches.len();
        let pin_memory = config.pin_memory;
        let device = config.device.clone();

        thread::spawn(move || {
            for (batch_number, indices) in batches.into_iter().enumerate() {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    load_batch(
                        &folder,
                        transform.as_ref(),
                        &pool,
                        &indices,
                        batch_number,
                        pin_memory,
                        &device,
                    )
                }))
                .unwrap_or_else(|payload| {
                    Err(DataLoaderError::WorkerPanic {
                        batch_number,
                        message: panic_message(payload.as_ref()),
                    })
                });
                let failed = result.is_err();
                if sender.send(result).is_err() || failed {
                    break;
                }
            }
        });

        BatchIter { receiver, remaining }
    }
}

impl Iterator for BatchIter {
    type Item = Result<Batch, DataLoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.receiver.recv().ok()?;
        self.remaining = match item {
            Ok(_) => self.remaining.saturating_sub(1),
            Err(_) => 0,
        };
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn load_batch(
    folder: &ImageFolder,
    transform: &dyn Transform,
    pool: &ThreadPool,
    indices: &[usize],
    batch_number: usize,
    pin_memory: bool,
    device: &Device,
) -> Result<Batch, DataLoaderError> {
    let samples = pool.install(|| {
        indices
            .par_iter()
            .map(|&idx| folder.get(idx, transform))
            .collect::<Result<Vec<_>, _>>()
    })?;

    let (images, labels): (Vec<Tensor>, Vec<u32>) = samples.into_iter().unzip();
    let count = labels.len();

    // stack copies every sample into one contiguous host buffer
    let images = Tensor::stack(&images, 0)?;
    let labels = Tensor::from_vec(labels, count, &Device::Cpu)?;

    let (images, labels) = if pin_memory {
        (images.to_device(device)?, labels.to_device(device)?)
    } else {
        (images, labels)
    };

    Ok(Batch {
        images,
        labels,
        batch_number,
    })
}
