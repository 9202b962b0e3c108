//! # Test Helper Library
//!
//! Shared setup for the HTTP tests: fake recognizers, in-memory images and
//! hand-built multipart requests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use card_ocr::ocr::{OcrService, TextRecognizer};
use card_ocr::ocr_errors::OcrError;
use card_ocr::server::AppState;
use http_body_util::Full;
use hyper::Request;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};

pub const TEST_TOKEN: &str = "test-token";
pub const BOUNDARY: &str = "card-ocr-test-boundary";

/// Recognizer that always returns the same text
pub struct FixedText(pub &'static str);

impl TextRecognizer for FixedText {
    fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
        Ok(self.0.to_string())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Recognizer that always fails like a broken Tesseract install
pub struct BrokenEngine;

impl TextRecognizer for BrokenEngine {
    fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
        Err(OcrError::Extraction("tesseract exploded".to_string()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Build application state around the given recognizer
pub fn app_state(recognizer: Arc<dyn TextRecognizer>, max_upload_bytes: usize) -> Arc<AppState> {
    Arc::new(AppState {
        api_token: TEST_TOKEN.to_string(),
        max_upload_bytes,
        ocr: Arc::new(OcrService::new(recognizer, 2, Duration::from_secs(5))),
        metrics: None,
    })
}

/// A small white PNG
pub fn png_bytes() -> Vec<u8> {
    let img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_pixel(16, 16, Luma([255u8]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

/// Encode a single multipart/form-data part
pub fn multipart_body(field: &str, file_name: &str, content_type: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    if let Some(content_type) = content_type {
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// `POST /ocr/` with a bearer token and the given multipart body
pub fn ocr_request(token: Option<&str>, body: Vec<u8>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/ocr/")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Full::new(Bytes::from(body))).unwrap()
}

/// Empty-bodied request for the non-upload routes
pub fn simple_request(method: &str, uri: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}
