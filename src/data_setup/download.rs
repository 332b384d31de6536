use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use zip::ZipArchive;

use super::error::DownloadError;

#[derive(Clone, Debug)]
pub struct DownloadConfig {
    pub data_root: PathBuf,
    pub remove_source: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            remove_source: true,
        }
    }
}

/// Downloads a zipped dataset from `source` and unzips it into `data_root/destination`.
///
/// Only the destination directory is checked: if it already exists nothing is
/// downloaded, even when an earlier attempt failed halfway and left it empty.
///
/// ```no_run
/// use vit_transfer::{download_data, DownloadConfig};
///
/// let path = download_data(
///     "https://github.com/mrdbourke/pytorch-deep-learning/raw/main/data/pizza_steak_sushi.zip",
///     "pizza_steak_sushi",
///     &DownloadConfig::default(),
/// )?;
/// # Ok::<(), vit_transfer::data_setup::error::DownloadError>(())
/// ```
pub fn download_data(
    source: &str,
    destination: &str,
    config: &DownloadConfig,
) -> Result<PathBuf, DownloadError> {
    let data_path = &config.data_root;
    let image_path = data_path.join(destination);

    if image_path.is_dir() {
        info!("{} directory exists, skipping download.", image_path.display());
        return Ok(image_path);
    }

    info!("Did not find {} directory, creating one...", image_path.display());
    fs::create_dir_all(&image_path)?;

    let target_file = target_file_name(source)?;
    let archive_path = data_path.join(&target_file);

    info!("Downloading {} from {}...", target_file, source);
    fetch_to_file(source, &archive_path)?;

    info!("Unzipping {} data...", target_file);
    extract_zip(&archive_path, &image_path)?;

    if config.remove_source {
        fs::remove_file(&archive_path)?;
    }

    Ok(image_path)
}

fn target_file_name(source: &str) -> Result<String, DownloadError> {
    let without_query = source.split(['?', '#']).next().unwrap_or(source);
    without_query
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| DownloadError::TargetFileName(source.to_string()))
}

fn fetch_to_file(source: &str, path: &Path) -> Result<u64, DownloadError> {
    let mut response = reqwest::blocking::get(source)?.error_for_status()?;
    let mut writer = BufWriter::new(File::create(path)?);
    let written = response.copy_to(&mut writer)?;
    writer.flush()?;
    Ok(written)
}

pub fn extract_zip(archive_path: &Path, out_dir: &Path) -> Result<usize, DownloadError> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = out_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;
        extracted += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(extracted)
}
