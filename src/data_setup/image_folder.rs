use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use candle_core::Tensor;
use log::{debug, warn};

use super::error::DataLoaderError;
use super::transform::Transform;

/// A directory whose immediate subdirectories are class labels.
///
/// Class names are the subdirectory names sorted alphabetically, and a sample's
/// label is the index of its class in that list. Images are collected
/// recursively under each class directory and sorted by path, so discovery
/// order does not depend on the filesystem.
#[derive(Clone, Debug)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<(PathBuf, u32)>,
}

impl ImageFolder {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, DataLoaderError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(DataLoaderError::DirectoryNotFound(root.to_path_buf()));
        }

        let valid_extensions: HashSet<String> = image::ImageFormat::all()
            .flat_map(|format| format.extensions_str())
            .map(|ext| ext.to_string())
            .collect();

        let mut classes: Vec<String> = fs::read_dir(root)?
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| match entry.file_name().into_string() {
                Ok(name) => Some(name),
                Err(_) => {
                    warn!("Skipping class directory with a non UTF-8 name: {}", entry.path().display());
                    None
                }
            })
            .collect();
        classes.sort_unstable();

        if classes.is_empty() {
            return Err(DataLoaderError::NoClasses(root.to_path_buf()));
        }

        let mut samples = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let class_dir = root.join(class);
            let mut files = Vec::new();
            collect_images(&class_dir, &valid_extensions, &mut files)?;

            if files.is_empty() {
                return Err(DataLoaderError::EmptyClass {
                    class: class.clone(),
                    dir: root.to_path_buf(),
                });
            }

            files.sort_unstable();
            samples.extend(files.into_iter().map(|path| (path, label as u32)));
        }

        debug!(
            "Scanned {}: {} classes, {} images",
            root.display(),
            classes.len(),
            samples.len()
        );

        Ok(ImageFolder {
            root: root.to_path_buf(),
            classes,
            samples,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn class_to_idx(&self) -> HashMap<String, u32> {
        self.classes
            .iter()
            .enumerate()
            .map(|(idx, class)| (class.clone(), idx as u32))
            .collect()
    }

    pub fn samples(&self) -> &[(PathBuf, u32)] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Decodes sample `index` and runs it through `transform`.
    ///
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize, transform: &dyn Transform) -> Result<(Tensor, u32), DataLoaderError> {
        let (path, label) = &self.samples[index];
        let img = image::open(path)?;
        let tensor = transform.apply(img)?;
        Ok((tensor, *label))
    }
}

fn collect_images(
    dir: &Path,
    valid_extensions: &HashSet<String>,
    out: &mut Vec<PathBuf>,
) -> Result<(), DataLoaderError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, valid_extensions, out)?;
        } else if is_valid_extension(&path, valid_extensions) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_valid_extension(path: &Path, valid_extensions: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| valid_extensions.contains(&ext.to_lowercase()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_setup::transform::TransformPipeline;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_image(path: &Path, value: u8) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(2, 2, Rgb([value, value, value])).save(path).unwrap();
    }

    #[test]
    fn classes_are_sorted_subdirectories() -> anyhow::Result<()> {
        let dir = tempdir()?;
        write_image(&dir.path().join("sushi/a.png"), 1);
        write_image(&dir.path().join("pizza/b.png"), 2);
        write_image(&dir.path().join("steak/nested/c.PNG"), 3);
        fs::write(dir.path().join("README.txt"), "not a class")?;

        let folder = ImageFolder::new(dir.path())?;
        assert_eq!(folder.classes(), &["pizza", "steak", "sushi"]);
        assert_eq!(folder.len(), 3);
        assert_eq!(folder.class_to_idx()["steak"], 1);

        let labels: Vec<u32> = folder.samples().iter().map(|(_, label)| *label).collect();
        assert_eq!(labels, vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn non_image_files_are_ignored() -> anyhow::Result<()> {
        let dir = tempdir()?;
        write_image(&dir.path().join("cat/1.png"), 10);
        fs::write(dir.path().join("cat/notes.txt"), "hello")?;

        let folder = ImageFolder::new(dir.path())?;
        assert_eq!(folder.len(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_class_directory_is_skipped() -> anyhow::Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir()?;
        write_image(&dir.path().join("cat/1.png"), 10);
        write_image(&dir.path().join(OsStr::from_bytes(b"d\xF6g")).join("1.png"), 20);

        let folder = ImageFolder::new(dir.path())?;
        assert_eq!(folder.classes(), &["cat"]);
        assert_eq!(folder.len(), 1);
        Ok(())
    }

    #[test]
    fn missing_root_is_an_error() {
        let result = ImageFolder::new("/definitely/not/here");
        assert!(matches!(result, Err(DataLoaderError::DirectoryNotFound(_))));
    }

    #[test]
    fn empty_class_is_an_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        write_image(&dir.path().join("cat/1.png"), 10);
        fs::create_dir_all(dir.path().join("dog"))?;

        let result = ImageFolder::new(dir.path());
        assert!(matches!(result, Err(DataLoaderError::EmptyClass { ref class, .. }) if class == "dog"));
        Ok(())
    }

    #[test]
    fn get_decodes_and_transforms() -> anyhow::Result<()> {
        let dir = tempdir()?;
        write_image(&dir.path().join("cat/1.png"), 255);

        let folder = ImageFolder::new(dir.path())?;
        let (tensor, label) = folder.get(0, &TransformPipeline::new())?;
        assert_eq!(tensor.dims(), &[3, 2, 2]);
        assert_eq!(label, 0);
        Ok(())
    }
}
