//! # Unified Application Configuration
//!
//! This module consolidates all service settings into a single structured
//! configuration object loaded from environment variables. Startup validates
//! it once; the request handler receives the parts it needs explicitly.

use std::env;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::OcrConfig;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
    /// Whether to allow privileged ports (< 1024)
    pub allow_privileged_ports: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allow_privileged_ports: false,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> AppResult<()> {
        self.host.parse::<IpAddr>().map_err(|_| {
            AppError::Config(format!("HOST '{}' is not a valid IP address", self.host))
        })?;

        if self.port == 0 {
            return Err(AppError::Config("PORT cannot be 0".to_string()));
        }

        if self.port < 1024 && !self.allow_privileged_ports {
            return Err(AppError::Config(format!(
                "PORT {} is privileged. Set ALLOW_PRIVILEGED_PORTS=true or use port >= 1024",
                self.port
            )));
        }

        if self.max_upload_bytes == 0 {
            return Err(AppError::Config("MAX_UPLOAD_BYTES cannot be 0".to_string()));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            AppError::Config(format!("HOST '{}' is not a valid IP address", self.host))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Bearer token shared with API clients
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub api_token: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

impl AuthConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.api_token.trim().is_empty() {
            return Err(AppError::Config("API_TOKEN cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// API authentication
    pub auth: AuthConfig,
    /// OCR processing configuration
    pub ocr: OcrConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T, expected: &str) -> AppResult<T> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be {expected}"))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// `API_TOKEN` is required; everything else has a default.
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        config.auth.api_token = env::var("API_TOKEN").map_err(|_| {
            AppError::Config("API_TOKEN environment variable is required".to_string())
        })?;

        config.server.host = env::var("HOST").unwrap_or_else(|_| config.server.host.clone());
        config.server.port = parse_env("PORT", config.server.port, "a valid port number")?;
        config.server.max_upload_bytes = parse_env(
            "MAX_UPLOAD_BYTES",
            config.server.max_upload_bytes,
            "a valid number of bytes",
        )?;
        config.server.allow_privileged_ports = env::var("ALLOW_PRIVILEGED_PORTS")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        config.ocr = OcrConfig::from_env()?;
        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.server.validate()?;
        self.auth.validate()?;
        self.ocr.validate()?;
        self.observability.validate().map_err(AppError::Config)?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: api_token=[REDACTED], bind={}:{}, max_upload_bytes={}, ocr_languages={}, ocr_psm={}, ocr_workers={}, ocr_timeout_secs={}, environment={}",
            self.server.host,
            self.server.port,
            self.server.max_upload_bytes,
            self.ocr.languages,
            self.ocr.psm_mode.as_str(),
            self.ocr.worker_count,
            self.ocr.operation_timeout_secs,
            self.observability.environment
        )
    }
}
