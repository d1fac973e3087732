use anyhow::{Context, Result};
use image::{DynamicImage, ImageReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a batch of images comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Images already in memory
    Memory(Vec<DynamicImage>),
    /// Text file listing one absolute image path per line
    PathList(PathBuf),
}

/// Ordered image batch plus the file each image was read from, if any
#[derive(Debug, Clone, Default)]
pub struct ImageBatch {
    pub images: Vec<DynamicImage>,
    pub paths: Vec<Option<PathBuf>>,
}

impl ImageBatch {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageSource {
    pub fn load(self) -> Result<ImageBatch> {
        match self {
            ImageSource::Memory(images) => {
                let paths = vec![None; images.len()];
                Ok(ImageBatch { images, paths })
            }
            ImageSource::PathList(list) => {
                let paths = read_path_list(&list)?;
                let images = paths
                    .iter()
                    .map(|path| load_image(path))
                    .collect::<Result<Vec<_>>>()?;
                debug!("Loaded {} images listed in {}", images.len(), list.display());
                Ok(ImageBatch {
                    images,
                    paths: paths.into_iter().map(Some).collect(),
                })
            }
        }
    }
}

/// Read a newline-delimited list of image paths, skipping blank lines
pub fn read_path_list(list: &Path) -> Result<Vec<PathBuf>> {
    let contents = std::fs::read_to_string(list)
        .with_context(|| format!("Failed to read image list {}", list.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

pub fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image {}: {}", path.display(), e))
}
