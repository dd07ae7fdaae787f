//! Error types for guia-turistico

use thiserror::Error;

/// Main error type for guia-turistico operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Geolocation is not supported by this provider")]
    NotSupported,

    #[error("A geolocation request is already pending")]
    RequestPending,

    #[error("Geolocation permission denied: {0}")]
    PermissionDenied(String),

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("Geolocation timeout: {0}")]
    Timeout(String),

    #[error("Unknown geolocation error (code {code}): {message}")]
    UnknownGeolocation { code: u16, message: String },

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("CORS error: {0}")]
    Cors(String),

    #[error("Geocoding provider rate limit exceeded (HTTP 429)")]
    RateLimited,

    #[error("Geocoding provider temporarily unavailable (HTTP 425)")]
    TemporarilyUnavailable,

    #[error("Geocoding provider returned status: {0}")]
    HttpStatus(u16),

    #[error("Geocoding error: {0}")]
    Geocoding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    /// Message suitable for showing to the end user (pt-BR)
    ///
    /// `Display` keeps the technical text for logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotSupported => "Geolocalização não é suportada neste dispositivo".to_string(),
            Self::RequestPending => {
                "Já existe uma solicitação de localização em andamento".to_string()
            }
            Self::PermissionDenied(_) => "Permissão negada pelo usuário".to_string(),
            Self::PositionUnavailable(_) => "Posição indisponível".to_string(),
            Self::Timeout(_) => "Tempo limite excedido ao obter a localização".to_string(),
            Self::UnknownGeolocation { .. } => {
                "Erro desconhecido ao obter a localização".to_string()
            }
            Self::InvalidPosition(_) | Self::InvalidCoordinates(_) => {
                "Coordenadas inválidas".to_string()
            }
            Self::Cors(_) => {
                "Erro de CORS: não foi possível acessar o serviço de geocodificação".to_string()
            }
            Self::RateLimited => {
                "Limite de requisições excedido. Tente novamente em alguns instantes.".to_string()
            }
            Self::TemporarilyUnavailable => {
                "Serviço temporariamente indisponível. Tente novamente mais tarde.".to_string()
            }
            Self::HttpStatus(status) => format!("Erro ao buscar endereço (HTTP {})", status),
            _ => "Erro ao buscar endereço".to_string(),
        }
    }

    /// True for the errors produced by a geolocation provider
    pub fn is_geolocation_error(&self) -> bool {
        matches!(
            self,
            Self::NotSupported
                | Self::RequestPending
                | Self::PermissionDenied(_)
                | Self::PositionUnavailable(_)
                | Self::Timeout(_)
                | Self::UnknownGeolocation { .. }
        )
    }

    /// Classify a geocoding failure
    ///
    /// Errors whose message mentions CORS or cross-origin access become `Cors`;
    /// everything else is returned unchanged.
    pub fn classify_geocoding(self) -> Self {
        if matches!(self, Self::Cors(_)) {
            return self;
        }
        let message = self.to_string().to_lowercase();
        if message.contains("cors") || message.contains("cross-origin") {
            Self::Cors(self.to_string())
        } else {
            self
        }
    }

    /// Drop the request URL from HTTP errors
    ///
    /// Geocoding URLs carry the user's coordinates, which must not reach logs.
    pub fn without_url(self) -> Self {
        match self {
            Self::Http(e) => Self::Http(e.without_url()),
            other => other,
        }
    }

    /// HTTP status behind this error, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::RateLimited => Some(429),
            Self::TemporarilyUnavailable => Some(425),
            Self::HttpStatus(code) => Some(*code),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a single retry through the configured proxy makes sense
    pub fn is_proxy_retryable(&self) -> bool {
        match self {
            Self::Cors(_) => true,
            Self::Http(e) => e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Result type alias for guia-turistico operations
pub type Result<T> = std::result::Result<T, Error>;
