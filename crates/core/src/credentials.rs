//! Credential pairs and placeholder generation.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated placeholder secrets.
const PLACEHOLDER_SECRET_LENGTH: usize = 24;

/// Prefix marking usernames that were never issued by the provider.
pub const PLACEHOLDER_USERNAME_PREFIX: &str = "pending-";

/// A username/secret pair on the provisioning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    /// Both halves are present and not blank.
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.secret.trim().is_empty()
    }

    /// Placeholder credentials for a system that has not been provisioned.
    ///
    /// Systems carrying these are created already expired so they enter the
    /// renewal cycle on the next detector tick.
    pub fn placeholder(external_id: i32) -> Self {
        let secret: String = rand::rng()
            .sample_iter(&rand::distr::Alphanumeric)
            .take(PLACEHOLDER_SECRET_LENGTH)
            .map(char::from)
            .collect();
        Self {
            username: format!("{PLACEHOLDER_USERNAME_PREFIX}{external_id}"),
            secret,
        }
    }

    /// Whether the username was produced by [`Credentials::placeholder`].
    pub fn is_placeholder_username(username: &str) -> bool {
        username.starts_with(PLACEHOLDER_USERNAME_PREFIX)
    }
}
