//! Resolves a `Webhook`'s encrypted auth secret into the plaintext
//! `AuthCredential` `docpipe_webhook::generic::push` needs. Secret
//! envelope encryption/KMS integration is out of scope (spec §1 excludes
//! "authentication middleware"); `auth_secret_encrypted` is read here as
//! a plain UTF-8 JSON blob shaped for the bound `auth_mode`, not as a
//! real ciphertext. A production deployment swaps this function for one
//! that actually decrypts.

use docpipe_types::webhook::{AuthMode, Webhook};
use docpipe_utils::{DocpipeError, Result};
use docpipe_webhook::AuthCredential;

pub fn resolve(webhook: &Webhook) -> Result<AuthCredential> {
    let Some(secret) = &webhook.auth_secret_encrypted else {
        return Ok(match webhook.auth_mode {
            AuthMode::None => AuthCredential::None,
            _ => {
                return Err(DocpipeError::Webhook(format!(
                    "webhook {} declares auth_mode {:?} but has no auth secret",
                    webhook.id, webhook.auth_mode
                )))
            }
        });
    };
    let parsed: serde_json::Value = serde_json::from_slice(secret)
        .map_err(|e| DocpipeError::Webhook(format!("auth secret for {} is not valid JSON: {e}", webhook.id)))?;

    match webhook.auth_mode {
        AuthMode::None => Ok(AuthCredential::None),
        AuthMode::Basic => {
            let username = parsed["username"].as_str().unwrap_or_default().to_string();
            let password = parsed["password"].as_str().unwrap_or_default().to_string();
            Ok(AuthCredential::Basic { username, password })
        }
        AuthMode::Bearer => {
            let token = parsed["token"].as_str().unwrap_or_default().to_string();
            Ok(AuthCredential::Bearer { token })
        }
        AuthMode::ApiKey => {
            let header_name = parsed["header_name"].as_str().unwrap_or("X-Api-Key").to_string();
            let value = parsed["value"].as_str().unwrap_or_default().to_string();
            Ok(AuthCredential::ApiKey { header_name, value })
        }
    }
}
