//! Model gateway abstraction
//!
//! A [`ModelGateway`] turns a prompt (optionally with one image) into raw
//! text. It has no retry policy: failures surface as [`GatewayError`] and the
//! caller decides how to degrade.

use crate::error::GatewayError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::time::{Duration, Instant};

/// Image attached to a model request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    mime: String,
}

impl ImagePayload {
    /// Create payload, sniffing the MIME type from magic bytes
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        let mime = sniff_image_mime(&bytes).to_string();
        Self { bytes, mime }
    }

    /// Create payload with an explicit MIME type
    #[must_use]
    pub fn with_mime(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    /// MIME type
    #[inline]
    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Self-contained `data:` URL
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Guess an image MIME type from its first bytes; PNG when unknown
#[must_use]
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/png",
    }
}

/// File extension for a MIME type
#[must_use]
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// User turn content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserContent {
    /// Text only
    Text(String),
    /// Text followed by one image
    TextWithImage {
        /// Instruction text
        text: String,
        /// Attached image
        image: ImagePayload,
    },
}

impl UserContent {
    /// Instruction text
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::TextWithImage { text, .. } => text,
        }
    }

    /// Attached image, if any
    #[must_use]
    pub fn image(&self) -> Option<&ImagePayload> {
        match self {
            Self::Text(_) => None,
            Self::TextWithImage { image, .. } => Some(image),
        }
    }
}

/// One call to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Optional system prompt
    pub system_prompt: Option<String>,
    /// User content
    pub content: UserContent,
    /// Response length budget
    pub max_tokens: u32,
}

impl ModelRequest {
    /// Default response budget
    pub const DEFAULT_MAX_TOKENS: u32 = 1000;

    /// Text-only request
    #[must_use]
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            content: UserContent::Text(prompt.into()),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
        }
    }

    /// Request with one image
    #[must_use]
    pub fn with_image(prompt: impl Into<String>, image: ImagePayload) -> Self {
        Self {
            system_prompt: None,
            content: UserContent::TextWithImage {
                text: prompt.into(),
                image,
            },
            max_tokens: Self::DEFAULT_MAX_TOKENS,
        }
    }

    /// With system prompt
    #[inline]
    #[must_use]
    pub fn system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// With response budget
    #[inline]
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Black-box "prompt (+ image) in, text out" capability
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Send one request and return the raw reply text
    async fn invoke(&self, request: ModelRequest) -> Result<String, GatewayError>;

    /// Model identifier, for logs
    fn model_name(&self) -> &str;
}

/// Invoke a gateway with a deadline
///
/// A timeout is reported as [`GatewayError::Timeout`], the same as any other
/// gateway failure.
pub async fn invoke_with_timeout(
    gateway: &dyn ModelGateway,
    request: ModelRequest,
    timeout: Duration,
) -> Result<String, GatewayError> {
    let start = Instant::now();
    let outcome = tokio::time::timeout(timeout, gateway.invoke(request)).await;
    let elapsed_ms = start.elapsed().as_millis();

    match outcome {
        Ok(Ok(text)) => {
            tracing::debug!(model = gateway.model_name(), elapsed_ms, "model call completed");
            Ok(text)
        }
        Ok(Err(e)) => {
            tracing::warn!(model = gateway.model_name(), elapsed_ms, error = %e, "model call failed");
            Err(e)
        }
        Err(_) => {
            tracing::warn!(model = gateway.model_name(), elapsed_ms, "model call timed out");
            Err(GatewayError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ModelGateway for Echo {
        async fn invoke(&self, request: ModelRequest) -> Result<String, GatewayError> {
            Ok(request.content.text().to_string())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct Stalled;

    #[async_trait]
    impl ModelGateway for Stalled {
        async fn invoke(&self, _request: ModelRequest) -> Result<String, GatewayError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }

        fn model_name(&self) -> &str {
            "stalled"
        }
    }

    #[test]
    fn sniff_known_formats() {
        assert_eq!(sniff_image_mime(&[0x89, b'P', b'N', b'G', 0x0D]), "image/png");
        assert_eq!(sniff_image_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_image_mime(b"GIF89a"), "image/gif");
        assert_eq!(sniff_image_mime(b"RIFF\0\0\0\0WEBPVP8"), "image/webp");
        assert_eq!(sniff_image_mime(b"??"), "image/png");
    }

    #[test]
    fn data_url_is_base64() {
        let image = ImagePayload::with_mime(b"abc".to_vec(), "image/png");
        assert_eq!(image.data_url(), "data:image/png;base64,YWJj");
    }

    #[test]
    fn request_builders() {
        let request = ModelRequest::with_image("describe", ImagePayload::new(vec![0xFF, 0xD8, 0xFF]))
            .system("json only")
            .max_tokens(2000);
        assert_eq!(request.system_prompt.as_deref(), Some("json only"));
        assert_eq!(request.max_tokens, 2000);
        assert_eq!(request.content.image().unwrap().mime(), "image/jpeg");
        assert_eq!(request.content.text(), "describe");
    }

    #[tokio::test]
    async fn invoke_with_timeout_passes_through() {
        let text = invoke_with_timeout(&Echo, ModelRequest::text("hi"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(text, "hi");
    }

    #[tokio::test]
    async fn invoke_with_timeout_maps_deadline() {
        let err = invoke_with_timeout(&Stalled, ModelRequest::text("hi"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Timeout(Duration::from_millis(50)));
    }
}
