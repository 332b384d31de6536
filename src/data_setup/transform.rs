use candle_core::{Device, Tensor};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbImage};

/// Per-split preprocessing applied to every decoded sample.
///
/// Implementations return a `(C, H, W)` f32 tensor on the CPU. Every sample of a
/// dataset must come out with the same shape, otherwise batches cannot be stacked.
pub trait Transform: Send + Sync {
    fn apply(&self, image: DynamicImage) -> candle_core::Result<Tensor>;
}

impl<F> Transform for F
where
    F: Fn(DynamicImage) -> candle_core::Result<Tensor> + Send + Sync,
{
    fn apply(&self, image: DynamicImage) -> candle_core::Result<Tensor> {
        self(image)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Step {
    Resize(u32),
    ResizeExact { width: u32, height: u32 },
    CenterCrop(u32),
}

/// Resize / crop / to-tensor / normalize, applied in the order the steps were added.
///
/// The image is always converted to RGB and scaled to `[0, 1]` after the geometric steps.
#[derive(Clone, Debug, Default)]
pub struct TransformPipeline {
    steps: Vec<Step>,
    normalize: Option<([f32; 3], [f32; 3])>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize so the shorter side equals `size`, keeping the aspect ratio.
    pub fn resize(mut self, size: u32) -> Self {
        self.steps.push(Step::Resize(size));
        self
    }

    pub fn resize_exact(mut self, width: u32, height: u32) -> Self {
        self.steps.push(Step::ResizeExact { width, height });
        self
    }

    /// Crop a `size` x `size` square from the centre, zero padding smaller images.
    pub fn center_crop(mut self, size: u32) -> Self {
        self.steps.push(Step::CenterCrop(size));
        self
    }

    pub fn normalize(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.normalize = Some((mean, std));
        self
    }

    fn apply_step(image: DynamicImage, step: Step) -> DynamicImage {
        match step {
            Step::Resize(size) => resize_shorter_side(&image, size),
            Step::ResizeExact { width, height } => {
                image.resize_exact(width, height, FilterType::Triangle)
            }
            Step::CenterCrop(size) => center_crop(image, size),
        }
    }
}

impl Transform for TransformPipeline {
    fn apply(&self, image: DynamicImage) -> candle_core::Result<Tensor> {
        let image = self
            .steps
            .iter()
            .fold(image, |img, &step| Self::apply_step(img, step));

        let tensor = to_tensor(&image)?;
        match &self.normalize {
            Some((mean, std)) => {
                let mean = Tensor::from_slice(&mean[..], (3, 1, 1), &Device::Cpu)?;
                let std = Tensor::from_slice(&std[..], (3, 1, 1), &Device::Cpu)?;
                tensor.broadcast_sub(&mean)?.broadcast_div(&std)
            }
            None => Ok(tensor),
        }
    }
}

fn resize_shorter_side(image: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = if width <= height {
        (size, (size as u64 * height as u64 / width.max(1) as u64) as u32)
    } else {
        ((size as u64 * width as u64 / height.max(1) as u64) as u32, size)
    };
    image.resize_exact(new_width, new_height, FilterType::Triangle)
}

fn center_crop(image: DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let image = if width < size || height < size {
        let padded_width = width.max(size);
        let padded_height = height.max(size);
        let mut canvas = RgbImage::new(padded_width, padded_height);
        imageops::overlay(
            &mut canvas,
            &image.to_rgb8(),
            ((padded_width - width) / 2) as i64,
            ((padded_height - height) / 2) as i64,
        );
        DynamicImage::ImageRgb8(canvas)
    } else {
        image
    };

    let (width, height) = image.dimensions();
    let left = ((width - size) as f32 / 2.0).round() as u32;
    let top = ((height - size) as f32 / 2.0).round() as u32;
    image.crop_imm(left, top, size, size)
}

/// HWC u8 pixels to a CHW f32 tensor in `[0, 1]`.
fn to_tensor(image: &DynamicImage) -> candle_core::Result<Tensor> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let data: Vec<f32> = rgb.into_raw().into_iter().map(|x| x as f32 / 255.0).collect();

    Tensor::from_vec(data, (height as usize, width as usize, 3), &Device::Cpu)?
        .permute((2, 0, 1))?
        .contiguous()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
    }

    #[test]
    fn to_tensor_is_chw_and_scaled() -> candle_core::Result<()> {
        let tensor = TransformPipeline::new().apply(solid(4, 2, 255))?;
        assert_eq!(tensor.dims(), &[3, 2, 4]);

        let max = tensor.flatten_all()?.max(0)?.to_scalar::<f32>()?;
        assert!((max - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn resize_keeps_aspect_ratio() -> candle_core::Result<()> {
        let tensor = TransformPipeline::new().resize(8).apply(solid(32, 16, 0))?;
        assert_eq!(tensor.dims(), &[3, 8, 16]);
        Ok(())
    }

    #[test]
    fn center_crop_pads_small_images() -> candle_core::Result<()> {
        let tensor = TransformPipeline::new().center_crop(10).apply(solid(4, 6, 255))?;
        assert_eq!(tensor.dims(), &[3, 10, 10]);

        let corner = tensor.get(0)?.get(0)?.get(0)?.to_scalar::<f32>()?;
        assert_eq!(corner, 0.0);
        Ok(())
    }

    #[test]
    fn normalize_shifts_and_scales() -> candle_core::Result<()> {
        let tensor = TransformPipeline::new()
            .normalize([0.5, 0.5, 0.5], [0.5, 0.5, 0.5])
            .apply(solid(2, 2, 255))?;

        let values = tensor.flatten_all()?.to_vec1::<f32>()?;
        assert!(values.iter().all(|v| (v - 1.0).abs() < 1e-6));
        Ok(())
    }

    #[test]
    fn closures_are_transforms() -> candle_core::Result<()> {
        let transform = |_: DynamicImage| Tensor::zeros((3, 1, 1), candle_core::DType::F32, &Device::Cpu);
        assert_eq!(transform.apply(solid(5, 5, 1))?.dims(), &[3, 1, 1]);
        Ok(())
    }
}
