//! STRIDE LLM - model gateway and response parsing
//!
//! Two small pieces sit between the pipeline and the external model:
//! - [`ModelGateway`]: prompt (+ image) in, raw text out, no retries
//! - [`ResponseParser`]: fence-tolerant JSON decoding that keeps the raw
//!   text on failure
//!
//! # Example
//!
//! ```rust,ignore
//! use stride_llm::{GatewayConfig, ModelGateway, ModelRequest, OpenAiGateway, ResponseParser};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = OpenAiGateway::new(GatewayConfig {
//!     api_key: Some("sk-...".into()),
//!     ..GatewayConfig::default()
//! })?;
//!
//! let raw = gateway.invoke(ModelRequest::text("Return {\"ok\": true}")).await?;
//! let value = ResponseParser::new().parse(&raw)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod gateway;
pub mod openai;
pub mod parser;

pub use error::{GatewayError, ParseError};
pub use gateway::{
    extension_for_mime, invoke_with_timeout, sniff_image_mime, ImagePayload, ModelGateway,
    ModelRequest, UserContent,
};
pub use openai::{GatewayConfig, OpenAiGateway, DEFAULT_API_BASE, DEFAULT_MODEL};
pub use parser::{find_json_object, strip_fences, ResponseParser};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
