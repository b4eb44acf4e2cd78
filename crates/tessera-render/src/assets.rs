// SPDX-License-Identifier: CEPL-1.0
//! Decoding seam between the renderer and the file system.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::mesh::MeshData;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("unsupported asset type: {0}")]
    Unsupported(PathBuf),
}

impl AssetError {
    pub fn decode(path: &Path, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.to_owned(),
            reason: reason.to_string(),
        }
    }
}

/// Decoded 8-bit image. `pixels` holds `width * height * channels` bytes,
/// rows top to bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// `None` when the dimensions do not fit in memory.
    pub fn byte_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.channels as usize)
    }

    /// Non-empty, one to four channels, and `pixels` matches the dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && (1..=4).contains(&self.channels)
            && self.byte_len() == Some(self.pixels.len())
    }

    /// Expands to four channels, filling missing alpha with opaque.
    ///
    /// # Panics
    /// If the channel count is outside `1..=4`.
    pub fn into_rgba(self) -> ImageData {
        assert!(
            (1..=4).contains(&self.channels),
            "image with {} channels",
            self.channels
        );
        if self.channels == 4 {
            return self;
        }
        let c = self.channels as usize;
        let mut out = Vec::with_capacity(self.pixels.len() / c * 4);
        for px in self.pixels.chunks_exact(c) {
            match c {
                1 => out.extend_from_slice(&[px[0], px[0], px[0], 255]),
                2 => out.extend_from_slice(&[px[0], px[0], px[0], px[1]]),
                _ => out.extend_from_slice(&[px[0], px[1], px[2], 255]),
            }
        }
        ImageData {
            width: self.width,
            height: self.height,
            channels: 4,
            pixels: out,
        }
    }
}

/// Image and model decoding, implemented by the application.
pub trait AssetLoader: Send + Sync {
    fn load_image(&self, path: &Path) -> Result<ImageData, AssetError>;

    /// Every mesh in the file, in file order.
    fn load_meshes(&self, path: &Path) -> Result<Vec<MeshData>, AssetError>;

    /// Whether `load_meshes` understands `path`; used when scanning folders.
    fn is_model(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("obj"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_expands_with_opaque_alpha() {
        let img = ImageData {
            width: 2,
            height: 1,
            channels: 3,
            pixels: vec![1, 2, 3, 4, 5, 6],
        };
        assert!(img.is_valid());
        let rgba = img.into_rgba();
        assert_eq!(rgba.channels, 4);
        assert_eq!(rgba.pixels, [1, 2, 3, 255, 4, 5, 6, 255]);
        assert!(rgba.is_valid());
    }

    #[test]
    fn grey_alpha_expands() {
        let img = ImageData {
            width: 1,
            height: 1,
            channels: 2,
            pixels: vec![9, 7],
        };
        assert_eq!(img.into_rgba().pixels, [9, 9, 9, 7]);
    }

    #[test]
    fn short_pixel_buffer_is_invalid() {
        let img = ImageData {
            width: 4,
            height: 4,
            channels: 4,
            pixels: vec![0; 10],
        };
        assert!(!img.is_valid());
    }

    #[test]
    fn zero_channels_is_invalid() {
        let img = ImageData {
            width: 2,
            height: 2,
            channels: 0,
            pixels: vec![],
        };
        assert!(!img.is_valid());
    }

    #[test]
    fn huge_dimensions_do_not_overflow() {
        let img = ImageData {
            width: 65536,
            height: 65536,
            channels: 4,
            pixels: vec![],
        };
        assert!(!img.is_valid());
        let img = ImageData {
            width: u32::MAX,
            height: u32::MAX,
            ..img
        };
        assert_eq!(img.byte_len(), None);
    }
}
