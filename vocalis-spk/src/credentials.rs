//! Read-only credential lookup

use dashmap::DashMap;
use std::fmt;

/// API credentials for one provider
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub api_key: String,
    /// Secondary secret for providers that take a key pair
    pub secret: Option<String>,
}

impl Credential {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: None,
        }
    }

    pub fn with_secret(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: Some(secret.into()),
        }
    }
}

// Keys never reach logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"<redacted>")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Secret store consulted when a provider instance is constructed
pub trait CredentialStore: Send + Sync {
    fn get(&self, provider_id: &str) -> Option<Credential>;
}

/// In-memory credentials
#[derive(Default)]
pub struct StaticCredentials {
    entries: DashMap<String, Credential>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, provider_id: impl Into<String>, credential: Credential) -> Self {
        self.entries.insert(provider_id.into(), credential);
        self
    }

    pub fn insert(&self, provider_id: impl Into<String>, credential: Credential) {
        self.entries.insert(provider_id.into(), credential);
    }
}

impl CredentialStore for StaticCredentials {
    fn get(&self, provider_id: &str) -> Option<Credential> {
        self.entries.get(provider_id).map(|c| c.clone())
    }
}

/// Environment variable credentials.
///
/// Looks up `VOCALIS_<PROVIDER>_API_KEY` / `VOCALIS_<PROVIDER>_SECRET` first,
/// then the provider's conventional variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl EnvCredentials {
    fn conventional(provider_id: &str) -> (&'static [&'static str], &'static [&'static str]) {
        match provider_id {
            "openai" => (&["OPENAI_API_KEY"], &[]),
            "google_cloud" => (&["GOOGLE_CLOUD_API_KEY", "GOOGLE_API_KEY"], &[]),
            "elevenlabs" => (&["ELEVENLABS_API_KEY", "XI_API_KEY"], &[]),
            "naver_clova" => (&["NAVER_CLOVA_CLIENT_ID"], &["NAVER_CLOVA_CLIENT_SECRET"]),
            _ => (&[], &[]),
        }
    }

    fn first_set(names: impl IntoIterator<Item = String>) -> Option<String> {
        names
            .into_iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty())
    }
}

impl CredentialStore for EnvCredentials {
    fn get(&self, provider_id: &str) -> Option<Credential> {
        let prefix = format!(
            "VOCALIS_{}",
            provider_id.to_ascii_uppercase().replace('-', "_")
        );
        let (key_vars, secret_vars) = Self::conventional(provider_id);

        let api_key = Self::first_set(
            std::iter::once(format!("{}_API_KEY", prefix))
                .chain(key_vars.iter().map(|v| v.to_string())),
        )?;
        let secret = Self::first_set(
            std::iter::once(format!("{}_SECRET", prefix))
                .chain(secret_vars.iter().map(|v| v.to_string())),
        );

        Some(Credential { api_key, secret })
    }
}
