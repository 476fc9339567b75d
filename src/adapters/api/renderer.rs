//! Asset Renderer Adapter
//!
//! QR codes come from an external rendering endpoint (PNG). Avatars are
//! drawn locally: a mirrored 5x5 identicon whose cells and colour are
//! taken from the SHA-256 of the seed, so the same user always gets the
//! same picture.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::instrument;

use super::client::HttpClient;
use crate::domain::error::SagaError;
use crate::ports::renderer::{AssetRenderer, RenderedImage};

const SERVICE: &str = "renderer";
const GRID: usize = 5;

/// QR rendering over HTTP plus local identicons.
pub struct QrServiceRenderer {
  client: Arc<HttpClient>,
  qr_path: String,
  qr_size: u32,
  avatar_size: u32,
}

impl QrServiceRenderer {
  /// `qr_path` is resolved against the client's base URL (or used as-is
  /// if absolute).
  pub fn new(client: Arc<HttpClient>, qr_path: String, qr_size: u32, avatar_size: u32) -> Self {
    Self {
      client,
      qr_path,
      qr_size,
      avatar_size,
    }
  }
}

/// Deterministic identicon SVG for `seed`.
pub fn identicon_svg(seed: &str, size: u32) -> String {
  let digest = hmac_sha256::Hash::hash(seed.as_bytes());
  let color = format!("#{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2]);
  let cell = size as usize / GRID;

  let mut svg = format!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}"><rect width="{size}" height="{size}" fill="#f0f0f0"/>"##
  );
  // Left three columns come from the digest; the right two mirror them.
  for row in 0..GRID {
    for col in 0..3 {
      let bit = row * 3 + col;
      if (digest[3 + bit / 8] >> (bit % 8)) & 1 == 0 {
        continue;
      }
      for x in [col, GRID - 1 - col] {
        let _ = write!(
          svg,
          r#"<rect x="{}" y="{}" width="{cell}" height="{cell}" fill="{color}"/>"#,
          x * cell,
          row * cell
        );
        if x == GRID - 1 - x {
          break;
        }
      }
    }
  }
  svg.push_str("</svg>");
  svg
}

#[async_trait]
impl AssetRenderer for QrServiceRenderer {
  async fn render_avatar(&self, seed: &str) -> Result<RenderedImage, SagaError> {
    Ok(RenderedImage {
      bytes: identicon_svg(seed, self.avatar_size).into_bytes(),
      content_type: "image/svg+xml",
      extension: "svg",
    })
  }

  #[instrument(skip_all)]
  async fn render_qr(&self, content: &str) -> Result<RenderedImage, SagaError> {
    if content.is_empty() {
      return Err(SagaError::Validation("nothing to encode".to_string()));
    }

    let size = format!("{0}x{0}", self.qr_size);
    let builder = self
      .client
      .request(Method::GET, &self.qr_path)
      .query(&[("data", content), ("size", size.as_str()), ("format", "png")]);

    let response = self
      .client
      .send(builder, "qr render")
      .await
      .map_err(|e| SagaError::external(SERVICE, format!("{e:#}")))?;
    let bytes = response
      .bytes()
      .await
      .map_err(|e| SagaError::external(SERVICE, e))?;
    if bytes.is_empty() {
      return Err(SagaError::external(SERVICE, "empty QR image"));
    }

    Ok(RenderedImage {
      bytes: bytes.to_vec(),
      content_type: "image/png",
      extension: "png",
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_identicon_is_deterministic() {
    let a = identicon_svg("6f1c3a52-0000-4000-8000-000000000001", 200);
    let b = identicon_svg("6f1c3a52-0000-4000-8000-000000000001", 200);
    let c = identicon_svg("6f1c3a52-0000-4000-8000-000000000002", 200);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.starts_with("<svg"));
    assert!(a.ends_with("</svg>"));
  }

  #[test]
  fn test_identicon_is_mirrored() {
    let svg = identicon_svg("mirror", 100);
    // Every cell in column 0 has a twin in column 4.
    let left = svg.matches(r#"x="0""#).count();
    let right = svg.matches(r#"x="80""#).count();
    assert_eq!(left, right);
  }
}
