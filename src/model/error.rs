use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Candle error: {0}")]
    CandleError(#[from] candle_core::Error),

    #[error("Hugging Face hub error: {0}")]
    HubError(#[from] hf_hub::api::sync::ApiError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid device '{0}', expected cpu, cuda[:N], metal[:N], auto or default")]
pub struct ParseDeviceError(pub String);
