//! # OCR Instance Manager Module
//!
//! Keeps initialized Tesseract instances around between requests. Creating
//! an instance loads the language model, which costs far more than
//! recognizing a card-sized image, so instances are checked out per job and
//! returned afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};

use leptess::LepTess;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::ocr_config::{ModelType, OcrConfig};
use crate::ocr_errors::OcrError;

/// Pool of Tesseract instances configured for card recognition
///
/// The pool never holds more idle instances than `worker_count`. Concurrency
/// is bounded by the caller (see [`crate::ocr::OcrService`]); the pool only
/// recycles instances.
pub struct OcrInstancePool {
    config: OcrConfig,
    idle: Mutex<Vec<LepTess>>,
    created: AtomicUsize,
}

impl OcrInstancePool {
    /// Create an empty pool. Instances are created on first checkout.
    pub fn new(config: OcrConfig) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(config.worker_count)),
            config,
            created: AtomicUsize::new(0),
        }
    }

    /// Create one instance up front so a broken Tesseract install fails startup
    pub fn warm_up(&self) -> Result<(), OcrError> {
        let tess = self.checkout()?;
        self.checkin(tess);
        Ok(())
    }

    /// Take an idle instance or initialize a new one
    pub fn checkout(&self) -> Result<LepTess, OcrError> {
        if let Some(tess) = self.idle.lock().pop() {
            return Ok(tess);
        }
        self.create_instance()
    }

    /// Return an instance after a successful job
    ///
    /// Instances that failed mid-recognition are dropped by the caller instead.
    pub fn checkin(&self, tess: LepTess) {
        let mut idle = self.idle.lock();
        if idle.len() < self.config.worker_count {
            idle.push(tess);
        }
    }

    /// Total instances created since startup
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn create_instance(&self) -> Result<LepTess, OcrError> {
        let tessdata_path = self
            .config
            .tessdata_path
            .clone()
            .or_else(|| Self::get_tessdata_path(self.config.model_type));

        info!(
            languages = %self.config.languages,
            model = self.config.model_type.tessdata_dir(),
            tessdata_path = ?tessdata_path,
            "Creating new OCR instance"
        );

        let mut tess = LepTess::new(tessdata_path.as_deref(), &self.config.languages)
            .map_err(|e| OcrError::Initialization(format!("Failed to initialize Tesseract: {e}")))?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            self.config.psm_mode.as_str(),
        )
        .map_err(|e| OcrError::Initialization(format!("Failed to set PSM mode: {e}")))?;

        tess.set_variable(
            leptess::Variable::TesseditCharWhitelist,
            &self.config.character_whitelist,
        )
        .map_err(|e| {
            OcrError::Initialization(format!("Failed to set character whitelist: {e}"))
        })?;

        let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(total_instances = total, "OCR instance ready");
        Ok(tess)
    }

    /// Find the tessdata directory for the model type, if installed in a known place
    fn get_tessdata_path(model_type: ModelType) -> Option<String> {
        let dir = model_type.tessdata_dir();
        let candidates = [
            format!("/usr/share/tesseract-ocr/5/{dir}"),
            format!("/usr/share/tesseract-ocr/4.00/{dir}"),
            format!("/usr/share/{dir}"),
            format!("/usr/local/share/{dir}"),
        ];

        let found = candidates
            .into_iter()
            .find(|path| std::path::Path::new(path).exists());
        if found.is_none() {
            debug!(?model_type, "No model-specific tessdata directory, using Tesseract default");
        }
        found
    }
}
