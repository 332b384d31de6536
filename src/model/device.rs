use std::fmt;
use std::str::FromStr;

use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;

use super::error::ParseDeviceError;

/// Where the model lives.
///
/// `Default` resolves to the CPU. `BestAvailable` picks CUDA device 0, then
/// Metal device 0, then the CPU, depending on what candle was compiled with.
/// Explicit accelerators are not checked up front; asking for one that is
/// missing fails when the device is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DevicePlacement {
    #[default]
    Default,
    Cpu,
    Cuda(usize),
    Metal(usize),
    BestAvailable,
}

impl DevicePlacement {
    pub fn resolve(&self) -> candle_core::Result<Device> {
        match *self {
            DevicePlacement::Default | DevicePlacement::Cpu => Ok(Device::Cpu),
            DevicePlacement::Cuda(ordinal) => Device::new_cuda(ordinal),
            DevicePlacement::Metal(ordinal) => Device::new_metal(ordinal),
            DevicePlacement::BestAvailable => {
                if cuda_is_available() {
                    Device::new_cuda(0)
                } else if metal_is_available() {
                    Device::new_metal(0)
                } else {
                    Ok(Device::Cpu)
                }
            }
        }
    }
}

impl FromStr for DevicePlacement {
    type Err = ParseDeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (kind, ordinal) = match lower.split_once(':') {
            Some((kind, ordinal)) => {
                let ordinal = ordinal
                    .parse::<usize>()
                    .map_err(|_| ParseDeviceError(s.to_string()))?;
                (kind, Some(ordinal))
            }
            None => (lower.as_str(), None),
        };

        match (kind, ordinal) {
            ("default", None) => Ok(DevicePlacement::Default),
            ("cpu", None) => Ok(DevicePlacement::Cpu),
            ("auto", None) => Ok(DevicePlacement::BestAvailable),
            ("cuda", ordinal) => Ok(DevicePlacement::Cuda(ordinal.unwrap_or(0))),
            ("metal", ordinal) => Ok(DevicePlacement::Metal(ordinal.unwrap_or(0))),
            _ => Err(ParseDeviceError(s.to_string())),
        }
    }
}

impl fmt::Display for DevicePlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePlacement::Default => write!(f, "default"),
            DevicePlacement::Cpu => write!(f, "cpu"),
            DevicePlacement::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            DevicePlacement::Metal(ordinal) => write!(f, "metal:{ordinal}"),
            DevicePlacement::BestAvailable => write!(f, "auto"),
        }
    }
}
