//! # Card OCR Service
//!
//! An HTTP service that reads a payment card image with Tesseract and
//! returns the card number, expiry and CVC it recognized.

pub mod auth;
pub mod config;
pub mod errors;
pub mod instance_manager;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod server;
pub mod text_processing;

// Re-export types for easier access
pub use text_processing::{extract_card_fields, normalize_ocr_text, parse_card_text, ExtractedCard};
