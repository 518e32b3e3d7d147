use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use image::GenericImageView;
use tracing::{debug, info};

#[derive(Clone)]
pub struct DecodedImageData {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

pub enum ImageDecodeEvent {
    Decoded {
        path: PathBuf,
        image: Option<DecodedImageData>,
    },
    Finished {
        ok: usize,
        miss: usize,
    },
    Failed {
        message: String,
    },
}

/// Decode `paths` off the UI thread, a few at a time.
pub fn spawn_image_decode(paths: Vec<PathBuf>, max_dimension: u32) -> Receiver<ImageDecodeEvent> {
    let (tx, rx) = mpsc::channel::<ImageDecodeEvent>();

    thread::spawn(move || {
        let worker_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .clamp(1, 4);
        let max_jobs = worker_threads.max(1);

        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(err) => {
                let _ = tx.send(ImageDecodeEvent::Failed {
                    message: format!("failed to initialize decode runtime: {err}"),
                });
                return;
            }
        };

        let total = paths.len();
        let tx_progress = tx.clone();
        let tally = runtime.block_on(async move {
            let mut tally = DecodeTally::default();
            let mut in_flight = VecDeque::with_capacity(max_jobs);

            for path in paths {
                let job_path = path.clone();
                let job =
                    tokio::task::spawn_blocking(move || decode_image_data(&job_path, max_dimension));
                in_flight.push_back((path, job));

                if in_flight.len() >= max_jobs
                    && let Some((path, job)) = in_flight.pop_front()
                {
                    tally.report(&tx_progress, path, job.await.unwrap_or(None));
                }
            }
            while let Some((path, job)) = in_flight.pop_front() {
                tally.report(&tx_progress, path, job.await.unwrap_or(None));
            }
            tally
        });
        let DecodeTally { ok, miss } = tally;

        info!("Image decode finished: total={}, ok={}, miss={}", total, ok, miss);
        let _ = tx.send(ImageDecodeEvent::Finished { ok, miss });
    });

    rx
}

#[derive(Default)]
struct DecodeTally {
    ok: usize,
    miss: usize,
}

impl DecodeTally {
    fn report(&mut self, tx: &Sender<ImageDecodeEvent>, path: PathBuf, image: Option<DecodedImageData>) {
        if image.is_some() {
            self.ok += 1;
        } else {
            self.miss += 1;
        }
        let _ = tx.send(ImageDecodeEvent::Decoded { path, image });
    }
}

/// Read and decode one image, shrinking it so neither side exceeds `max_dimension`.
pub fn decode_image_data(path: &Path, max_dimension: u32) -> Option<DecodedImageData> {
    let bytes = std::fs::read(path).ok()?;
    let mut decoded = match image::load_from_memory(&bytes) {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!("Failed to decode {}: {}", path.display(), err);
            return None;
        }
    };
    let (width, height) = decoded.dimensions();
    let max_side = width.max(height);
    if max_side > max_dimension {
        decoded = decoded.resize(
            max_dimension,
            max_dimension,
            image::imageops::FilterType::Triangle,
        );
    }
    let rgba = decoded.to_rgba8();
    Some(DecodedImageData {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 30, 30, 255]));
        img.save(path).unwrap();
    }

    #[test]
    fn large_images_are_downscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hog-rider.png");
        write_png(&path, 512, 256);

        let decoded = decode_image_data(&path, 128).unwrap();
        assert_eq!(decoded.width, 128);
        assert_eq!(decoded.height, 64);
        assert_eq!(decoded.rgba.len(), 128 * 64 * 4);
    }

    #[test]
    fn missing_or_garbage_files_decode_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(decode_image_data(&dir.path().join("nope.png"), 64).is_none());

        let garbage = dir.path().join("garbage.png");
        std::fs::write(&garbage, b"not an image").unwrap();
        assert!(decode_image_data(&garbage, 64).is_none());
    }

    #[test]
    fn background_decode_reports_every_path() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("zap.png");
        write_png(&good, 8, 8);
        let missing = dir.path().join("missing.png");

        let rx = spawn_image_decode(vec![good.clone(), missing.clone()], 64);
        let mut decoded = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                ImageDecodeEvent::Decoded { path, image } => decoded.push((path, image.is_some())),
                ImageDecodeEvent::Finished { ok, miss } => {
                    assert_eq!((ok, miss), (1, 1));
                    break;
                }
                ImageDecodeEvent::Failed { message } => panic!("{message}"),
            }
        }
        decoded.sort();
        assert_eq!(decoded, vec![(missing, false), (good, true)]);
    }
}
