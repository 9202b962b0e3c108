//! # OCR Configuration Module
//!
//! This module defines configuration structures for Tesseract: language,
//! page segmentation, the fixed character whitelist and the size of the
//! blocking worker pool.

use std::env;

use crate::errors::{AppError, AppResult};

// Constants for OCR configuration
pub const DEFAULT_LANGUAGES: &str = "eng";
/// Card text is digits plus the punctuation found around them
pub const CARD_CHARACTER_WHITELIST: &str = "0123456789.,-+*/";
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;
pub const MAX_WORKERS: usize = 64;

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    Auto = 3,
    /// Assume a single column of text
    #[default]
    SingleColumn = 4,
    /// Assume a single uniform block of text
    SingleBlock = 6,
    /// Treat the image as a single text line
    SingleLine = 7,
    /// Find as much text as possible in no particular order
    SparseText = 11,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleColumn => "4",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SparseText => "11",
        }
    }
}

/// Tesseract model type for different accuracy/speed trade-offs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelType {
    /// Fast model (tessdata_fast) - faster processing, lower accuracy
    #[default]
    Fast,
    /// Best model (tessdata_best) - slower processing, higher accuracy
    Best,
}

impl ModelType {
    /// Get the tessdata directory name for this model type
    pub fn tessdata_dir(&self) -> &'static str {
        match self {
            ModelType::Fast => "tessdata_fast",
            ModelType::Best => "tessdata_best",
        }
    }

    fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "fast" => Ok(ModelType::Fast),
            "best" => Ok(ModelType::Best),
            other => Err(AppError::Config(format!(
                "TESSERACT_MODEL must be 'fast' or 'best', got '{}'",
                other
            ))),
        }
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// OCR language codes (e.g., "eng")
    pub languages: String,
    /// Tesseract model type (Fast vs Best accuracy)
    pub model_type: ModelType,
    /// Explicit tessdata directory, overrides the model type lookup
    pub tessdata_path: Option<String>,
    /// Page segmentation mode for OCR
    pub psm_mode: PageSegMode,
    /// Character whitelist restricting OCR output to card-relevant characters
    pub character_whitelist: String,
    /// Maximum number of concurrent OCR jobs on the blocking pool
    pub worker_count: usize,
    /// Timeout for a single OCR job in seconds
    pub operation_timeout_secs: u64,
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            model_type: ModelType::default(),
            tessdata_path: None,
            psm_mode: PageSegMode::default(),
            character_whitelist: CARD_CHARACTER_WHITELIST.to_string(),
            worker_count: default_worker_count(),
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        }
    }
}

impl OcrConfig {
    /// Load OCR settings from the environment, keeping defaults for unset keys
    ///
    /// Language, segmentation mode and whitelist are fixed.
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workers) = env::var("OCR_WORKERS") {
            config.worker_count = workers.trim().parse().map_err(|_| {
                AppError::Config("OCR_WORKERS must be a valid number".to_string())
            })?;
        }
        if let Ok(timeout) = env::var("OCR_TIMEOUT_SECS") {
            config.operation_timeout_secs = timeout.trim().parse().map_err(|_| {
                AppError::Config("OCR_TIMEOUT_SECS must be a valid number of seconds".to_string())
            })?;
        }
        if let Ok(model) = env::var("TESSERACT_MODEL") {
            config.model_type = ModelType::parse(&model)?;
        }
        config.tessdata_path = env::var("TESSDATA_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty());

        Ok(config)
    }

    /// Validate OCR configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.languages.trim().is_empty() {
            return Err(AppError::Config("languages cannot be empty".to_string()));
        }
        if self.character_whitelist.is_empty() {
            return Err(AppError::Config(
                "character_whitelist cannot be empty".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(AppError::Config(
                "worker_count must be greater than 0".to_string(),
            ));
        }
        if self.worker_count > MAX_WORKERS {
            return Err(AppError::Config(format!(
                "worker_count ({}) cannot exceed {}",
                self.worker_count, MAX_WORKERS
            )));
        }
        if self.operation_timeout_secs == 0 {
            return Err(AppError::Config(
                "operation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.operation_timeout_secs > 300 {
            return Err(AppError::Config(
                "operation_timeout_secs cannot be greater than 300 seconds".to_string(),
            ));
        }
        Ok(())
    }
}
