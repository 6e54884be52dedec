//! Secret storage in the OS keychain.
//!
//! Provider and webhook secrets can live in the system keychain instead of
//! the environment. At startup [`populate_env_from_keychain`] copies any
//! stored value into its environment variable so [`crate::config::fetch_config`]
//! picks it up unchanged.

use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Keychain service name used for all stored secrets.
const SERVICE: &str = "payvine";

/// Secrets managed by this module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKey {
    ProviderKeyId,
    ProviderKeySecret,
    WebhookSecret,
}

impl CredentialKey {
    /// Keychain entry identifier.
    pub fn keyring_id(self) -> &'static str {
        match self {
            Self::ProviderKeyId => "provider_key_id",
            Self::ProviderKeySecret => "provider_key_secret",
            Self::WebhookSecret => "webhook_secret",
        }
    }

    /// Environment variable the secret is exported to.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::ProviderKeyId => "PAYVINE_PROVIDER_KEY_ID",
            Self::ProviderKeySecret => "PAYVINE_PROVIDER_KEY_SECRET",
            Self::WebhookSecret => "PAYVINE_WEBHOOK_SECRET",
        }
    }

    pub const ALL: [CredentialKey; 3] = [
        Self::ProviderKeyId,
        Self::ProviderKeySecret,
        Self::WebhookSecret,
    ];
}

/// Loads a secret from the keychain, returning `None` if not set.
pub fn load(key: CredentialKey) -> Option<Zeroizing<String>> {
    let entry = keyring::Entry::new(SERVICE, key.keyring_id()).ok()?;
    match entry.get_password() {
        Ok(password) => Some(Zeroizing::new(password)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key = key.keyring_id(), error = %e, "failed to read keychain entry");
            None
        }
    }
}

/// Populates environment variables from the keychain for any secret not
/// already set in the environment.
///
/// Call this at startup before [`crate::config::fetch_config`].
pub fn populate_env_from_keychain() {
    for key in CredentialKey::ALL {
        if std::env::var(key.env_var()).is_err()
            && let Some(value) = load(key)
        {
            debug!(key = key.env_var(), "loaded credential from keychain");
            // SAFETY: called from main before the runtime spawns any task
            unsafe {
                std::env::set_var(key.env_var(), value.as_str());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_vars_match_config_names() {
        let vars: Vec<_> = CredentialKey::ALL.iter().map(|k| k.env_var()).collect();
        assert_eq!(
            vars,
            [
                "PAYVINE_PROVIDER_KEY_ID",
                "PAYVINE_PROVIDER_KEY_SECRET",
                "PAYVINE_WEBHOOK_SECRET"
            ]
        );
    }

    #[test]
    fn keyring_ids_are_distinct() {
        let mut ids: Vec<_> = CredentialKey::ALL.iter().map(|k| k.keyring_id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CredentialKey::ALL.len());
    }
}
