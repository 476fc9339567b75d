//! Asset Generation Use Case (parallel leaf)
//!
//! Triggered directly by the deposit-address stage with the raw
//! deposit bundle. Renders and uploads, concurrently:
//! - an avatar seeded by the user id
//! - QR codes for the custody wallet and the unified deposit address
//! - one QR code per EVM chain, the Solana address and each Bitcoin
//!   address format found in the bundle
//!
//! Each artifact fails alone; whatever succeeded is merged onto the row.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::deposit_bundle::DepositAddresses;
use crate::domain::error::SagaError;
use crate::domain::events::AssetsGenerationTriggered;
use crate::domain::user::UserAssets;
use crate::ports::renderer::{AssetRenderer, RenderedImage};
use crate::ports::storage::ObjectStorage;
use crate::ports::user_repository::UserRepository;

use super::event_bus::EventHandler;
use super::user_record::update_user;

const STAGE: &str = "assets";

/// Asset stage: avatar and QR-code generation.
pub struct AssetGeneration<G: AssetRenderer, S: ObjectStorage, R: UserRepository> {
  renderer: Arc<G>,
  storage: Arc<S>,
  users: Arc<R>,
  save_attempts: u32,
}

impl<G: AssetRenderer, S: ObjectStorage, R: UserRepository> AssetGeneration<G, S, R> {
  pub fn new(renderer: Arc<G>, storage: Arc<S>, users: Arc<R>, save_attempts: u32) -> Self {
    Self {
      renderer,
      storage,
      users,
      save_attempts,
    }
  }

  async fn generate(&self, event: &AssetsGenerationTriggered) -> Result<(), SagaError> {
    let user_id = event.user_id;
    let found = DepositAddresses::from_bundle(&event.raw_deposit_address_bundle);

    let evm = join_all(found.evm.iter().map(|(chain, address)| async move {
      let url = self.qr(user_id, &format!("evm_{chain}"), address).await;
      (chain.clone(), url)
    }));
    let bitcoin = join_all(found.bitcoin.iter().map(|(format, address)| async move {
      let url = self.qr(user_id, &format!("btc_{format}"), address).await;
      (format.clone(), url)
    }));
    let solana = async {
      match &found.solana {
        Some(address) => self.qr(user_id, "solana_deposit", address).await,
        None => None,
      }
    };

    let (avatar, custody, uda, evm, solana, bitcoin) = tokio::join!(
      self.avatar(user_id),
      self.qr(user_id, "proxy_wallet", &event.custody_wallet_address),
      self.qr(user_id, "enclave_uda", &event.deposit_address),
      evm,
      solana,
      bitcoin,
    );

    let generated = UserAssets {
      avatar_url: avatar,
      custody_wallet_qr_url: custody,
      deposit_address_qr_url: uda,
      evm_deposit_qr_urls: collect_urls(evm),
      solana_deposit_qr_url: solana,
      bitcoin_deposit_qr_urls: collect_urls(bitcoin),
    };

    if generated.is_empty() {
      warn!(user_id = %user_id, "No assets generated");
      return Ok(());
    }

    update_user(self.users.as_ref(), user_id, self.save_attempts, |row| {
      row.assets.merge_from(&generated);
      Ok(())
    })
    .await?;

    info!(
      user_id = %user_id,
      avatar = generated.avatar_url.is_some(),
      evm_qr = generated.evm_deposit_qr_urls.len(),
      btc_qr = generated.bitcoin_deposit_qr_urls.len(),
      "User assets stored"
    );
    Ok(())
  }

  async fn avatar(&self, user_id: Uuid) -> Option<String> {
    let rendered = self.renderer.render_avatar(&user_id.to_string()).await;
    self.upload(&format!("avatars/{user_id}"), "avatar", rendered).await
  }

  async fn qr(&self, user_id: Uuid, kind: &str, address: &str) -> Option<String> {
    if address.trim().is_empty() {
      return None;
    }
    let rendered = self.renderer.render_qr(address).await;
    self
      .upload(&format!("qrcodes/{user_id}/{kind}"), kind, rendered)
      .await
  }

  async fn upload(
    &self,
    key_base: &str,
    kind: &str,
    rendered: Result<RenderedImage, SagaError>,
  ) -> Option<String> {
    let image = match rendered {
      Ok(image) => image,
      Err(e) => {
        warn!(kind, error = %e, "Asset rendering failed");
        return None;
      }
    };

    let key = format!("{key_base}.{}", image.extension);
    match self.storage.upload(&key, image.bytes, image.content_type).await {
      Ok(url) if !url.is_empty() => Some(url),
      Ok(_) => None,
      Err(e) => {
        warn!(kind, error = %e, "Asset upload failed");
        None
      }
    }
  }
}

fn collect_urls(results: Vec<(String, Option<String>)>) -> BTreeMap<String, String> {
  results
    .into_iter()
    .filter_map(|(name, url)| url.map(|u| (name, u)))
    .collect()
}

#[async_trait]
impl<G: AssetRenderer, S: ObjectStorage, R: UserRepository> EventHandler<AssetsGenerationTriggered>
  for AssetGeneration<G, S, R>
{
  fn name(&self) -> &'static str {
    STAGE
  }

  #[instrument(skip_all, fields(stage = STAGE, user_id = %event.user_id))]
  async fn handle(&self, event: AssetsGenerationTriggered) -> Result<(), SagaError> {
    self.generate(&event).await
  }
}
