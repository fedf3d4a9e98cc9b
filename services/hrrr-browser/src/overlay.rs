//! Map overlay abstraction.
//!
//! The browser does not render maps. It hands a fetched PNG plus the four
//! corner coordinates of the coverage box to an `OverlaySink`, which owns
//! whatever map or output the front-end uses.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use hrrr_common::{BrowserError, BrowserResult, LayerId, UtcSlot};
use tokio::fs;
use tracing::{debug, info};

/// One frame to place on the map.
#[derive(Debug, Clone)]
pub struct OverlayImage {
    /// Identifier of the image handle; valid until released
    pub handle: u64,
    pub bytes: Bytes,
    /// `[lon, lat]` corners: UL, UR, LR, LL
    pub coordinates: [[f64; 2]; 4],
    pub slot: UtcSlot,
    pub layer: LayerId,
}

/// Receiver of overlay images, e.g. a map layer.
#[async_trait]
pub trait OverlaySink: Send + Sync {
    /// Whether an overlay currently exists.
    async fn has_overlay(&self) -> bool;

    /// Create the overlay for the first time.
    async fn create_overlay(&mut self, image: &OverlayImage) -> BrowserResult<()>;

    /// Replace the image of the existing overlay in place.
    async fn update_overlay(&mut self, image: &OverlayImage) -> BrowserResult<()>;

    /// Drop the overlay; a no-op if none exists.
    async fn remove_overlay(&mut self);
}

/// Writes the current frame to a file, for terminal use.
pub struct FileOverlay {
    path: PathBuf,
    current: Option<(UtcSlot, LayerId)>,
}

impl FileOverlay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Slot and layer of the frame on disk.
    pub fn current(&self) -> Option<&(UtcSlot, LayerId)> {
        self.current.as_ref()
    }

    async fn write(&mut self, image: &OverlayImage) -> BrowserResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.path, &image.bytes)
            .await
            .map_err(|e| BrowserError::Overlay(format!("{}: {}", self.path.display(), e)))?;
        self.current = Some((image.slot, image.layer.clone()));
        Ok(())
    }
}

#[async_trait]
impl OverlaySink for FileOverlay {
    async fn has_overlay(&self) -> bool {
        self.current.is_some()
    }

    async fn create_overlay(&mut self, image: &OverlayImage) -> BrowserResult<()> {
        self.write(image).await?;
        info!(
            path = %self.path.display(),
            slot = %image.slot,
            layer = %image.layer,
            "Created overlay"
        );
        Ok(())
    }

    async fn update_overlay(&mut self, image: &OverlayImage) -> BrowserResult<()> {
        self.write(image).await?;
        debug!(slot = %image.slot, layer = %image.layer, "Updated overlay");
        Ok(())
    }

    async fn remove_overlay(&mut self) {
        if self.current.take().is_some() {
            if let Err(e) = fs::remove_file(&self.path).await {
                debug!(error = %e, "Overlay file already gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hrrr_common::HRRR_CONUS_BBOX;

    fn image(bytes: &'static [u8]) -> OverlayImage {
        OverlayImage {
            handle: 1,
            bytes: Bytes::from_static(bytes),
            coordinates: HRRR_CONUS_BBOX.corner_coordinates(),
            slot: UtcSlot::new(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), 12).unwrap(),
            layer: LayerId::new("REFLECTIVITY"),
        }
    }

    #[tokio::test]
    async fn test_file_overlay_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames/current.png");
        let mut sink = FileOverlay::new(&path);

        assert!(!sink.has_overlay().await);
        sink.create_overlay(&image(b"first")).await.unwrap();
        assert!(sink.has_overlay().await);
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        sink.update_overlay(&image(b"second")).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        sink.remove_overlay().await;
        assert!(!sink.has_overlay().await);
        assert!(!path.exists());
    }
}
