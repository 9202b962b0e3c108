//! # OCR Processing Module
//!
//! This module turns uploaded image bytes into raw text and then into card
//! fields.
//!
//! ## Features
//!
//! - [`TextRecognizer`] abstracts the OCR engine; [`TesseractRecognizer`] is
//!   the production implementation backed by `leptess`
//! - [`OcrService`] runs decoding and recognition on tokio's blocking pool,
//!   bounded by a semaphore so CPU-bound OCR never stalls the request loop
//! - Per-job timeout, metrics and structured logging
//!
//! ## Dependencies
//!
//! - `leptess`: Rust bindings for Tesseract OCR and Leptonica
//! - `image`: Decoding uploads and re-encoding them for Leptonica

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use tokio::sync::Semaphore;
use tracing::{info, warn, Instrument};

use crate::errors::error_logging;
use crate::instance_manager::OcrInstancePool;
use crate::observability;
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;
use crate::text_processing::{parse_card_text, ExtractedCard};

/// Blocking OCR engine: image in, raw text out
///
/// Implementations are called from the blocking thread pool and may take
/// as long as they need.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;

    /// Engine name for logs and metrics
    fn name(&self) -> &str;
}

/// Tesseract-backed recognizer restricted to card characters
pub struct TesseractRecognizer {
    pool: OcrInstancePool,
}

impl TesseractRecognizer {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            pool: OcrInstancePool::new(config),
        }
    }

    /// Initialize one Tesseract instance so misconfiguration fails at startup
    pub fn warm_up(&self) -> Result<(), OcrError> {
        self.pool.warm_up()?;
        info!(
            instances = self.pool.created_count(),
            idle = self.pool.idle_count(),
            "Tesseract engine initialized"
        );
        Ok(())
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let png = encode_for_leptonica(image)?;

        let mut tess = self.pool.checkout()?;
        tess.set_image_from_mem(&png).map_err(|e| {
            OcrError::Extraction(format!("Failed to load image into Tesseract: {e}"))
        })?;
        let text = tess.get_utf8_text().map_err(|e| {
            OcrError::Extraction(format!("Failed to extract text from image: {e}"))
        })?;

        // failed instances are dropped above via `?`
        self.pool.checkin(tess);
        Ok(text)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Decode uploaded bytes, whatever the container format
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, OcrError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Grayscale PNG is understood by every Leptonica build
fn encode_for_leptonica(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image.to_luma8())
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| OcrError::Extraction(format!("Failed to re-encode image: {e}")))?;
    Ok(buffer.into_inner())
}

/// Runs OCR jobs on a bounded slice of the blocking thread pool
pub struct OcrService {
    recognizer: Arc<dyn TextRecognizer>,
    permits: Arc<Semaphore>,
    worker_count: usize,
    timeout: Duration,
}

impl OcrService {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, worker_count: usize, timeout: Duration) -> Self {
        Self {
            recognizer,
            permits: Arc::new(Semaphore::new(worker_count)),
            worker_count,
            timeout,
        }
    }

    pub fn from_config(recognizer: Arc<dyn TextRecognizer>, config: &OcrConfig) -> Self {
        Self::new(
            recognizer,
            config.worker_count,
            Duration::from_secs(config.operation_timeout_secs),
        )
    }

    /// Workers not currently running a job
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn is_ready(&self) -> bool {
        !self.permits.is_closed()
    }

    /// Stop accepting new jobs; running jobs finish normally
    pub fn shutdown(&self) {
        self.permits.close();
    }

    /// Decode the image and recognize its text off the async runtime
    ///
    /// The timeout covers waiting for a free worker as well as the job.
    /// A timed-out job keeps its worker until Tesseract returns.
    pub async fn extract_text(&self, image_bytes: Bytes) -> Result<String, OcrError> {
        let span = observability::ocr_span("extract_text", self.recognizer.name());
        let start_time = Instant::now();
        let image_size = image_bytes.len() as u64;

        let job = async {
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|_| OcrError::Unavailable("OCR worker pool is shut down".to_string()))?;
            observability::record_worker_availability(self.available_workers(), self.worker_count);

            let recognizer = Arc::clone(&self.recognizer);
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let image = decode_image(&image_bytes)?;
                recognizer.recognize(&image)
            })
            .await
            .map_err(|e| OcrError::Extraction(format!("OCR worker failed: {e}")))?
        };

        let result = match tokio::time::timeout(self.timeout, job).instrument(span).await {
            Ok(result) => result,
            Err(_) => Err(OcrError::Timeout(format!(
                "no result after {} seconds",
                self.timeout.as_secs()
            ))),
        };

        let duration = start_time.elapsed();
        observability::record_ocr_metrics(result.is_ok(), duration, image_size);
        observability::record_worker_availability(self.available_workers(), self.worker_count);

        match &result {
            Ok(text) => info!(
                duration_ms = duration.as_millis() as u64,
                image_size_bytes = image_size,
                text_chars = text.chars().count(),
                "OCR extraction completed"
            ),
            Err(OcrError::ImageDecode(e)) => {
                warn!(error = %e, image_size_bytes = image_size, "Uploaded bytes are not a decodable image")
            }
            Err(e) => error_logging::log_ocr_error(
                e,
                "extract_text",
                Some(image_size),
                Some(duration),
            ),
        }

        result
    }

    /// Full pipeline: OCR, normalize, extract card fields
    pub async fn read_card(&self, image_bytes: Bytes) -> Result<ExtractedCard, OcrError> {
        let text = self.extract_text(image_bytes).await?;
        let card = parse_card_text(&text);
        observability::record_card_fields(&card);
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedText(&'static str);

    impl TextRecognizer for FixedText {
        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Slow(Duration);

    impl TextRecognizer for Slow {
        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            std::thread::sleep(self.0);
            Ok(String::new())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    struct CountingPeak {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl TextRecognizer for CountingPeak {
        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(String::new())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn png_bytes() -> Bytes {
        let img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_pixel(8, 8, Luma([255u8]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        Bytes::from(buffer.into_inner())
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, OcrError::ImageDecode(_)));
    }

    #[test]
    fn test_encode_for_leptonica_produces_png() {
        let image = decode_image(&png_bytes()).unwrap();
        let encoded = encode_for_leptonica(&image).unwrap();
        assert_eq!(image::guess_format(&encoded).unwrap(), ImageFormat::Png);
    }

    #[tokio::test]
    async fn test_read_card_runs_full_pipeline() {
        let service = OcrService::new(
            Arc::new(FixedText("\n4111 2222 3333 4444\n09/28 321\n")),
            2,
            Duration::from_secs(5),
        );
        let card = service.read_card(png_bytes()).await.unwrap();
        assert_eq!(card.card_number.as_deref(), Some("4111222233334444"));
        assert_eq!(card.expire_mm.as_deref(), Some("09"));
        assert_eq!(card.expire_yy.as_deref(), Some("28"));
        assert_eq!(card.cvc.as_deref(), Some("321"));
        assert_eq!(service.available_workers(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_decode_error() {
        let service = OcrService::new(Arc::new(FixedText("123")), 1, Duration::from_secs(5));
        let err = service
            .extract_text(Bytes::from_static(b"GIF89a-truncated"))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::ImageDecode(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let service = OcrService::new(
            Arc::new(Slow(Duration::from_millis(500))),
            1,
            Duration::from_millis(50),
        );
        let err = service.extract_text(png_bytes()).await.unwrap_err();
        assert!(matches!(err, OcrError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrency() {
        let recognizer = Arc::new(CountingPeak {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let service = Arc::new(OcrService::new(recognizer.clone(), 2, Duration::from_secs(10)));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.extract_text(png_bytes()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(recognizer.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(service.available_workers(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_jobs() {
        let service = OcrService::new(Arc::new(FixedText("")), 1, Duration::from_secs(5));
        service.shutdown();
        assert!(!service.is_ready());
        let err = service.extract_text(png_bytes()).await.unwrap_err();
        assert!(matches!(err, OcrError::Unavailable(_)));
    }
}
