//! User Record Updates - Read-Modify-Write with Compare-and-Swap
//!
//! Stages never save a row they read before an external call. They
//! re-read it here, apply only their own field group and save; a
//! version conflict means another stage wrote in between, so the change
//! is re-applied to a fresh read.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::error::SagaError;
use crate::domain::user::User;
use crate::ports::user_repository::UserRepository;

/// Apply `change` to the stored row and save it, retrying on conflicts.
///
/// `change` may run several times and must only set the caller's own
/// fields. Returns the saved row.
///
/// # Errors
/// `UserNotFound` if the row is gone, the error returned by `change`, or
/// the last `VersionConflict` once `attempts` are exhausted.
pub async fn update_user<R, F>(
  users: &R,
  user_id: Uuid,
  attempts: u32,
  mut change: F,
) -> Result<User, SagaError>
where
  R: UserRepository + ?Sized,
  F: FnMut(&mut User) -> Result<(), SagaError> + Send,
{
  let attempts = attempts.max(1);
  let mut attempt = 0;

  loop {
    attempt += 1;

    let mut user = users
      .find_by_id(user_id)
      .await?
      .ok_or(SagaError::UserNotFound(user_id))?;
    change(&mut user)?;

    match users.save(&user).await {
      Ok(saved) => return Ok(saved),
      Err(e) if e.is_version_conflict() && attempt < attempts => {
        debug!(user_id = %user_id, attempt, error = %e, "Concurrent write, re-reading user");
      }
      Err(e) => return Err(e),
    }
  }
}

/// Persist a stage failure on the row (`last_error`), best effort.
///
/// A failure here is only logged: the stage error is what matters.
pub async fn record_failure<R>(users: &R, user_id: Uuid, stage: &str, error: &SagaError)
where
  R: UserRepository + ?Sized,
{
  if matches!(error, SagaError::UserNotFound(_)) {
    return;
  }

  let message = error.to_string();
  let result = update_user(users, user_id, 3, |user| {
    user.record_failure(stage, &message);
    Ok(())
  })
  .await;

  if let Err(e) = result {
    warn!(user_id = %user_id, stage, error = %e, "Could not record stage failure");
  }
}
