//! Asset Renderer Port - Avatar and QR Images
//!
//! Rendering internals are not the saga's concern; asset generation only needs
//! image bytes it can upload.

use async_trait::async_trait;

use crate::domain::error::SagaError;

/// An encoded image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
  /// Encoded bytes.
  pub bytes: Vec<u8>,
  /// MIME type, e.g. `image/png`.
  pub content_type: &'static str,
  /// File extension without the dot.
  pub extension: &'static str,
}

/// Image renderer.
#[async_trait]
pub trait AssetRenderer: Send + Sync + 'static {
  /// Deterministic avatar for `seed`: same seed, same image.
  async fn render_avatar(&self, seed: &str) -> Result<RenderedImage, SagaError>;

  /// QR code encoding `content`.
  async fn render_qr(&self, content: &str) -> Result<RenderedImage, SagaError>;
}
