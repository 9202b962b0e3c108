//! HTTP boundary of the card OCR service.
//!
//! Routes:
//! - `POST /ocr/` multipart upload (field `file`), bearer token required
//! - `GET /health/live`, `GET /health/ready`
//! - `GET /metrics` when metrics export is enabled
//!
//! Errors are returned as `{"detail": "..."}` with the status from
//! [`RequestError::status`].

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::server::conn::http1;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info, Instrument};

use crate::auth::check_bearer_token;
use crate::errors::{error_logging, RequestError};
use crate::observability;
use crate::ocr::OcrService;

/// Boxed error type accepted from request bodies
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything a request handler needs, built once at startup
pub struct AppState {
    /// Secret compared against `Authorization: Bearer`
    pub api_token: String,
    pub max_upload_bytes: usize,
    pub ocr: Arc<OcrService>,
    pub metrics: Option<PrometheusHandle>,
}

/// The image part of an upload form
#[derive(Debug)]
pub struct ImageUpload {
    pub content_type: String,
    pub file_name: Option<String>,
    pub data: Bytes,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

/// Handle one request end to end, never failing at the transport level
pub async fn handle_request<B>(req: Request<B>, state: Arc<AppState>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = observability::http_span(method.as_str(), &path);

    let response = match route(req, &state).instrument(span.clone()).await {
        Ok(response) => response,
        Err(err) => {
            let _enter = span.enter();
            error_logging::log_request_error(&err, method.as_str(), &path);
            observability::record_error_metrics(err.kind(), "http");
            error_response(&err)
        }
    };

    observability::record_request_metrics(
        method.as_str(),
        response.status().as_u16(),
        start_time.elapsed(),
    );
    response
}

async fn route<B>(req: Request<B>, state: &AppState) -> Result<Response<Full<Bytes>>, RequestError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::POST, "/ocr/" | "/ocr") => handle_ocr(req, state).await,
        (_, "/ocr/" | "/ocr") => Err(RequestError::MethodNotAllowed),
        (&Method::GET, "/health/live") => Ok(text_response(StatusCode::OK, "OK".to_string())),
        (&Method::GET, "/health/ready") => {
            if state.ocr.is_ready() {
                Ok(text_response(StatusCode::OK, "OK".to_string()))
            } else {
                Ok(text_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "NOT READY: OCR workers shut down".to_string(),
                ))
            }
        }
        (&Method::GET, "/metrics") => match &state.metrics {
            Some(handle) => {
                let mut response = text_response(StatusCode::OK, handle.render());
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
                );
                Ok(response)
            }
            None => Err(RequestError::NotFound),
        },
        _ => Err(RequestError::NotFound),
    }
}

async fn handle_ocr<B>(req: Request<B>, state: &AppState) -> Result<Response<Full<Bytes>>, RequestError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    check_bearer_token(req.headers(), &state.api_token)?;

    let boundary = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|content_type| multer::parse_boundary(content_type).ok())
        .ok_or_else(|| {
            RequestError::MalformedUpload("expected multipart/form-data with a boundary".to_string())
        })?;

    let upload = read_image_upload(req.into_body(), boundary, state.max_upload_bytes).await?;

    if !upload.content_type.starts_with("image/") {
        return Err(RequestError::InvalidContentType);
    }

    debug!(
        content_type = %upload.content_type,
        file_name = ?upload.file_name,
        size_bytes = upload.data.len(),
        "Received image upload"
    );

    let card = state.ocr.read_card(upload.data).await?;

    info!(
        has_card_number = card.card_number.is_some(),
        has_expiry = card.expire_mm.is_some(),
        has_cvc = card.cvc.is_some(),
        "Card fields extracted"
    );

    Ok(json_response(StatusCode::OK, &card))
}

/// Read the body (bounded by `max_bytes`) and pull out the `file` field
pub async fn read_image_upload<B>(
    body: B,
    boundary: String,
    max_bytes: usize,
) -> Result<ImageUpload, RequestError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let collected = Limited::new(body, max_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                RequestError::PayloadTooLarge
            } else {
                RequestError::MalformedUpload(e.to_string())
            }
        })?
        .to_bytes();

    let stream = futures_util::stream::once(async move { Ok::<Bytes, Infallible>(collected) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RequestError::MalformedUpload(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_default();
        let file_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| RequestError::MalformedUpload(e.to_string()))?;

        return Ok(ImageUpload {
            content_type,
            file_name,
            data,
        });
    }

    Err(RequestError::MissingFile)
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error_logging::log_network_error(&e, "serialize_response", None);
            text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            )
        }
    }
}

/// Build the `{"detail": ...}` response for a request error
pub fn error_response(err: &RequestError) -> Response<Full<Bytes>> {
    let mut response = json_response(err.status(), &ErrorBody {
        detail: err.detail(),
    });
    if matches!(err, RequestError::Unauthorized) {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

/// Accept connections until `shutdown` resolves
///
/// Each connection is served on its own task. After shutdown the OCR pool
/// stops taking new jobs; in-flight connections run to completion.
pub async fn run_server<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Card OCR server listening");

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let state = Arc::clone(&state);

                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);

                            let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                                let state = Arc::clone(&state);
                                async move { Ok::<_, Infallible>(handle_request(req, state).await) }
                            });

                            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                                error_logging::log_network_error(
                                    &err,
                                    "serve_http_connection",
                                    Some(&peer_addr.to_string()),
                                );
                            }
                        });
                    }
                    Err(e) => {
                        error_logging::log_network_error(
                            &e,
                            "accept_tcp_connection",
                            Some(&addr.to_string()),
                        );
                    }
                }
            }
        }
    }

    state.ocr.shutdown();
    Ok(())
}
