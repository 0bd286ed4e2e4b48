use anyhow::Result;
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use std::time::Duration;
use tokio::time::Instant;

/// Perceptual fingerprint of an encoded screen image, base64-encoded.
pub fn compute_phash(image_bytes: &[u8]) -> Result<String> {
    let img = image::load_from_memory(image_bytes)?;
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    let hash = hasher.hash_image(&img);
    Ok(hash.to_base64())
}

pub fn compute_hamming_distance(lhs: &str, rhs: &str) -> u32 {
    let Ok(h1) = ImageHash::<Vec<u8>>::from_base64(lhs) else {
        return u32::MAX;
    };
    let Ok(h2) = ImageHash::<Vec<u8>>::from_base64(rhs) else {
        return u32::MAX;
    };
    h1.dist(&h2)
}

/// Remembers the last frame that went through text extraction and decides
/// whether a new frame is worth extracting again.
#[derive(Debug)]
pub struct ScreenChangeDetector {
    threshold: u32,
    cooldown: Duration,
    last_extracted: Option<(String, Instant)>,
}

impl ScreenChangeDetector {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            last_extracted: None,
        }
    }

    /// Frames without a fingerprint always qualify. Otherwise a frame is
    /// skipped only while it looks unchanged and the cooldown is running.
    pub fn should_extract(&self, phash: Option<&str>, now: Instant) -> bool {
        let Some(phash) = phash else {
            return true;
        };
        let Some((previous, extracted_at)) = &self.last_extracted else {
            return true;
        };

        if now.saturating_duration_since(*extracted_at) >= self.cooldown {
            return true;
        }
        compute_hamming_distance(phash, previous) >= self.threshold
    }

    pub fn record(&mut self, phash: Option<String>, now: Instant) {
        if let Some(phash) = phash {
            self.last_extracted = Some((phash, now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(pattern: impl Fn(u32, u32) -> u8) -> Vec<u8> {
        let img = RgbImage::from_fn(64, 64, |x, y| {
            let v = pattern(x, y);
            image::Rgb([v, v, v])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn identical_frames_have_zero_distance() {
        let frame = png(|x, _| (x * 4) as u8);
        let a = compute_phash(&frame).unwrap();
        let b = compute_phash(&frame).unwrap();
        assert_eq!(compute_hamming_distance(&a, &b), 0);
    }

    #[test]
    fn undecodable_bytes_fail_to_hash() {
        assert!(compute_phash(b"definitely not an image").is_err());
        assert_eq!(compute_hamming_distance("%%%", "%%%"), u32::MAX);
    }

    #[test]
    fn unchanged_frame_is_skipped_until_cooldown() {
        let frame = png(|x, y| ((x + y) * 2) as u8);
        let phash = compute_phash(&frame).unwrap();
        let start = Instant::now();
        let mut detector = ScreenChangeDetector::new(8, Duration::from_secs(20));

        assert!(detector.should_extract(Some(&phash), start));
        detector.record(Some(phash.clone()), start);

        assert!(!detector.should_extract(Some(&phash), start + Duration::from_secs(5)));
        assert!(detector.should_extract(Some(&phash), start + Duration::from_secs(20)));
        assert!(detector.should_extract(None, start + Duration::from_secs(5)));
    }

    #[test]
    fn changed_frame_is_extracted_during_cooldown() {
        let horizontal = compute_phash(&png(|x, _| (x * 4) as u8)).unwrap();
        let vertical = compute_phash(&png(|_, y| 255 - (y * 4) as u8)).unwrap();
        let start = Instant::now();
        let mut detector = ScreenChangeDetector::new(8, Duration::from_secs(20));
        detector.record(Some(horizontal.clone()), start);

        let distance = compute_hamming_distance(&horizontal, &vertical);
        assert_eq!(
            detector.should_extract(Some(&vertical), start + Duration::from_secs(1)),
            distance >= 8
        );
    }
}
