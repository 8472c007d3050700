/// Frame sources
///
/// A source hands out frames with strictly increasing timestamps and never
/// delivers a frame it could not produce.
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::SourceError;
use crate::frame::Frame;

pub trait FrameSource {
    /// Next frame, or `None` at end of stream
    fn next_frame(&mut self) -> Option<Frame>;
}

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Still images in a directory played back as a video.
///
/// Files are taken in lexicographic order and stamped `index / fps`. With
/// pacing enabled, frames are released no faster than the frame rate.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    fps: f64,
    pace: bool,
    started: Option<Instant>,
    skipped: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, fps: f64) -> Result<Self, SourceError> {
        let dir = dir.as_ref();

        if !fps.is_finite() || fps <= 0.0 {
            return Err(SourceError::InvalidFrameRate(fps));
        }

        let entries = std::fs::read_dir(dir).map_err(|source| SourceError::ReadDirFailed {
            path: dir.display().to_string(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(SourceError::Empty(dir.display().to_string()));
        }

        tracing::info!(
            "Image sequence: {} frames at {:.1} fps from {}",
            paths.len(),
            fps,
            dir.display()
        );

        Ok(Self {
            paths,
            next: 0,
            fps,
            pace: false,
            started: None,
            skipped: 0,
        })
    }

    /// Sleep between frames to emulate a live capture rate
    pub fn paced(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Files that failed to decode so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn wait_for(&mut self, timestamp: f64) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + Duration::from_secs_f64(timestamp);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Option<Frame> {
        while self.next < self.paths.len() {
            let index = self.next;
            self.next += 1;

            let path = &self.paths[index];
            let timestamp = index as f64 / self.fps;

            let decoded = image::open(path)
                .map_err(|err| err.to_string())
                .and_then(|img| {
                    Frame::from_rgba_image(img.to_rgba8(), timestamp).map_err(|err| err.to_string())
                });

            match decoded {
                Ok(frame) => {
                    if self.pace {
                        self.wait_for(timestamp);
                    }
                    return Some(frame);
                }
                Err(err) => {
                    self.skipped += 1;
                    tracing::warn!("Skipping {}: {}", path.display(), err);
                }
            }
        }
        None
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("line-call-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_reads_sorted_and_stamps_by_index() {
        let dir = scratch_dir("sorted");
        for (name, shade) in [("frame_002.png", 2u8), ("frame_000.png", 0), ("frame_001.png", 1)] {
            RgbaImage::from_pixel(3, 2, Rgba([shade, 0, 0, 255]))
                .save(dir.join(name))
                .unwrap();
        }
        fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequenceSource::open(&dir, 4.0).unwrap();
        assert_eq!(source.len(), 3);

        let mut seen = Vec::new();
        while let Some(frame) = source.next_frame() {
            seen.push((frame.timestamp(), frame.rgb_at(0, 0).0));
        }
        assert_eq!(seen, vec![(0.0, 0), (0.25, 1), (0.5, 2)]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_undecodable_file_is_skipped() {
        let dir = scratch_dir("corrupt");
        RgbaImage::new(2, 2).save(dir.join("a.png")).unwrap();
        fs::write(dir.join("b.png"), b"garbage").unwrap();
        RgbaImage::new(2, 2).save(dir.join("c.png")).unwrap();

        let mut source = ImageSequenceSource::open(&dir, 10.0).unwrap();
        let stamps: Vec<f64> = std::iter::from_fn(|| source.next_frame())
            .map(|f| f.timestamp())
            .collect();

        // Timestamps keep their index, so they stay strictly increasing
        assert_eq!(stamps, vec![0.0, 0.2]);
        assert_eq!(source.skipped(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_open_errors() {
        let dir = scratch_dir("empty");
        assert!(matches!(
            ImageSequenceSource::open(&dir, 30.0),
            Err(SourceError::Empty(_))
        ));
        assert!(matches!(
            ImageSequenceSource::open(&dir, 0.0),
            Err(SourceError::InvalidFrameRate(_))
        ));
        assert!(matches!(
            ImageSequenceSource::open(dir.join("missing"), 30.0),
            Err(SourceError::ReadDirFailed { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }
}
