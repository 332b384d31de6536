use candle_core::Device;

use super::error::DataLoaderError;

// Shared by the train and test loaders; shuffle is decided per split by the factory.
#[derive(Clone, Debug)]
pub struct DataLoaderConfig {
    pub batch_size: usize,
    pub num_workers: usize,
    pub prefetch_batches: usize,
    pub pin_memory: bool,
    pub drop_last: bool,
    pub shuffle_seed: Option<u64>,
    pub device: Device,
}

impl DataLoaderConfig {
    pub fn build(self) -> Result<Self, DataLoaderError> {
        if self.batch_size == 0 {
            return Err(DataLoaderError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.num_workers == 0 {
            return Err(DataLoaderError::InvalidConfig("num_workers must be at least 1".into()));
        }
        if self.prefetch_batches == 0 {
            return Err(DataLoaderError::InvalidConfig("prefetch_batches must be at least 1".into()));
        }

        Ok(self)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }
}

// num_workers is resolved here, once, from the host's logical core count
impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            num_workers: num_cpus::get(),
            prefetch_batches: 2,
            pin_memory: true,
            drop_last: false,
            shuffle_seed: None,
            device: Device::Cpu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_all_logical_cores() {
        let config = DataLoaderConfig::default();
        assert_eq!(config.num_workers, num_cpus::get());
        assert!(config.pin_memory);
        assert!(!config.drop_last);
    }

    #[test]
    fn build_rejects_zero_batch_size() {
        let result = DataLoaderConfig::default().with_batch_size(0).build();
        assert!(matches!(result, Err(DataLoaderError::InvalidConfig(_))));
    }

    #[test]
    fn build_rejects_zero_workers() {
        let result = DataLoaderConfig::default().with_num_workers(0).build();
        assert!(matches!(result, Err(DataLoaderError::InvalidConfig(_))));
    }
}
