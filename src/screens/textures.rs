use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};

use eframe::egui;
use tracing::{debug, warn};

use crate::services::image_cache::{DecodedImageData, ImageDecodeEvent, spawn_image_decode};

/// Textures keyed by file path, decoded in background batches.
#[derive(Default)]
pub(crate) struct TextureCache {
    textures: HashMap<PathBuf, Option<egui::TextureHandle>>,
    requested: HashSet<PathBuf>,
    batches: Vec<Receiver<ImageDecodeEvent>>,
}

impl TextureCache {
    /// Queue decoding for paths not seen before.
    pub(crate) fn request(&mut self, paths: impl IntoIterator<Item = PathBuf>, max_dimension: u32) {
        let fresh: Vec<PathBuf> = paths
            .into_iter()
            .filter(|path| self.requested.insert(path.clone()))
            .collect();
        if fresh.is_empty() {
            return;
        }
        debug!("Decoding {} new image(s)", fresh.len());
        self.batches.push(spawn_image_decode(fresh, max_dimension));
    }

    /// Upload finished decodes. Returns true while batches are still running.
    pub(crate) fn pump(&mut self, ctx: &egui::Context) -> bool {
        let mut finished = Vec::new();
        let mut decoded = Vec::new();
        for (index, rx) in self.batches.iter().enumerate() {
            loop {
                match rx.try_recv() {
                    Ok(ImageDecodeEvent::Decoded { path, image }) => decoded.push((path, image)),
                    Ok(ImageDecodeEvent::Finished { .. }) => {
                        finished.push(index);
                        break;
                    }
                    Ok(ImageDecodeEvent::Failed { message }) => {
                        warn!("Image decode batch failed: {}", message);
                        finished.push(index);
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished.push(index);
                        break;
                    }
                }
            }
        }

        for (path, image) in decoded {
            let texture = image.and_then(|img| load_texture_from_decoded(ctx, &path, &img));
            self.textures.insert(path, texture);
        }
        for index in finished.into_iter().rev() {
            self.batches.remove(index);
        }
        !self.batches.is_empty()
    }

    pub(crate) fn get(&self, path: &Path) -> Option<&egui::TextureHandle> {
        self.textures.get(path).and_then(Option::as_ref)
    }
}

fn load_texture_from_decoded(
    ctx: &egui::Context,
    path: &Path,
    image: &DecodedImageData,
) -> Option<egui::TextureHandle> {
    let color_image =
        egui::ColorImage::from_rgba_unmultiplied([image.width, image.height], &image.rgba);
    Some(ctx.load_texture(
        path.display().to_string(),
        color_image,
        egui::TextureOptions::LINEAR,
    ))
}
