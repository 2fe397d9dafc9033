//! Shared-secret extractor guarding the `/api/v1` routes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rotor_core::error::CoreError;
use rotor_core::hashing::secret_matches;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the automation shared secret.
pub const AUTOMATION_KEY_HEADER: &str = "x-automation-key";

/// Proof that the request presented the configured automation key.
///
/// Add it as an extractor parameter to any handler under `/api/v1`:
///
/// ```ignore
/// async fn my_handler(_key: AutomationKey, State(state): State<AppState>) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AutomationKey;

impl FromRequestParts<AppState> for AutomationKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(AUTOMATION_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(format!(
                    "Missing {AUTOMATION_KEY_HEADER} header"
                )))
            })?;

        if !secret_matches(presented, &state.config.automation_key_digest) {
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid automation key".into(),
            )));
        }

        Ok(AutomationKey)
    }
}
