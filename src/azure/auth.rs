//! Azure Authentication
//!
//! Wraps an `azure_identity` credential (client secret, managed identity or
//! the developer tools chain) and caches its tokens until shortly before
//! they expire.

use super::environment::CloudEnvironment;
use super::error::ArmError;
use anyhow::{Context, Result};
use azure_core::credentials::{Secret, TokenCredential};
use azure_identity::{
    ClientSecretCredential, DeveloperToolsCredential, ManagedIdentityCredential,
    ManagedIdentityCredentialOptions, UserAssignedId,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Where tokens come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    ManagedIdentity {
        client_id: Option<String>,
    },
    AzureCli,
    StaticToken(String),
}

impl CredentialSource {
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialSource::ClientSecret { .. } => "client-secret",
            CredentialSource::ManagedIdentity { .. } => "managed-identity",
            CredentialSource::AzureCli => "azure-cli",
            CredentialSource::StaticToken(_) => "static-token",
        }
    }
}

/// Azure credentials holder with token caching
#[derive(Clone)]
pub struct AzureCredentials {
    source: Arc<CredentialSource>,
    /// `None` for static tokens
    credential: Option<Arc<dyn TokenCredential>>,
    scope: String,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn new(token: String, ttl: Duration) -> Self {
        Self {
            token,
            expires_at: Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER),
        }
    }

    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Build the `azure_identity` credential behind a source
fn build_credential(source: &CredentialSource) -> Result<Option<Arc<dyn TokenCredential>>> {
    match source {
        CredentialSource::StaticToken(_) => Ok(None),
        CredentialSource::ClientSecret {
            tenant_id,
            client_id,
            client_secret,
        } => {
            tracing::debug!("Building client secret credential for tenant {}", tenant_id);
            let credential = ClientSecretCredential::new(
                tenant_id,
                client_id.clone(),
                Secret::new(client_secret.clone()),
                None,
            )
            .map_err(|e| ArmError::Auth(format!("Failed to create client secret credential: {e}")))?;
            Ok(Some(credential as Arc<dyn TokenCredential>))
        }
        CredentialSource::ManagedIdentity { client_id } => {
            let mut options = ManagedIdentityCredentialOptions::default();
            if let Some(id) = client_id {
                tracing::debug!("Using user-assigned managed identity {}", id);
                options.user_assigned_id = Some(UserAssignedId::ClientId(id.clone()));
            }
            let credential = ManagedIdentityCredential::new(Some(options)).map_err(|e| {
                ArmError::Auth(format!("Failed to create managed identity credential: {e}"))
            })?;
            Ok(Some(credential as Arc<dyn TokenCredential>))
        }
        CredentialSource::AzureCli => {
            let credential = DeveloperToolsCredential::new(None).map_err(|e| {
                ArmError::Auth(format!("Failed to create developer tools credential: {e}"))
            })?;
            Ok(Some(credential as Arc<dyn TokenCredential>))
        }
    }
}

/// Time left until a unix expiry, or the default TTL when it is already past
fn ttl_until(expires_on: i64, now: i64) -> Duration {
    if expires_on > now {
        Duration::from_secs((expires_on - now) as u64)
    } else {
        DEFAULT_TOKEN_TTL
    }
}

impl AzureCredentials {
    pub fn new(source: CredentialSource, environment: CloudEnvironment) -> Result<Self> {
        let credential = build_credential(&source)?;

        Ok(Self {
            source: Arc::new(source),
            credential,
            scope: environment.token_scope(),
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Credentials that always hand out the same token
    pub fn from_static_token(token: &str) -> Result<Self> {
        Self::new(
            CredentialSource::StaticToken(token.to_string()),
            CloudEnvironment::default(),
        )
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Get an access token for ARM calls
    pub async fn get_token(&self) -> Result<String> {
        let credential = match (self.source.as_ref(), &self.credential) {
            (CredentialSource::StaticToken(token), _) => return Ok(token.clone()),
            (_, Some(credential)) => credential,
            (_, None) => {
                return Err(ArmError::Auth("No credential available".to_string()).into());
            }
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let access = credential
            .get_token(&[self.scope.as_str()], None)
            .await
            .map_err(|e| ArmError::Auth(format!("Failed to get Azure AD token: {e}")))
            .with_context(|| format!("Failed to get access token ({})", self.source.kind()))?;

        let token = access.token.secret().to_string();
        let ttl = ttl_until(
            access.expires_on.unix_timestamp(),
            chrono::Utc::now().timestamp(),
        );

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken::new(token.clone(), ttl));
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }
        self.get_token().await
    }
}

/// Settings that decide which credential source to use
#[derive(Debug, Clone, Default)]
pub struct CredentialSettings {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub use_msi: bool,
}

/// Pick a credential source: static token, client secret, managed identity, then Azure CLI
pub fn resolve_credential_source(settings: &CredentialSettings) -> CredentialSource {
    if let Some(token) = non_empty_env("AZURE_ACCESS_TOKEN") {
        return CredentialSource::StaticToken(token);
    }

    let tenant_id = settings
        .tenant_id
        .clone()
        .or_else(|| non_empty_env("AZURE_TENANT_ID"));
    let client_id = settings
        .client_id
        .clone()
        .or_else(|| non_empty_env("AZURE_CLIENT_ID"));
    let client_secret = settings
        .client_secret
        .clone()
        .or_else(|| non_empty_env("AZURE_CLIENT_SECRET"));

    if let (Some(tenant_id), Some(client_id), Some(client_secret)) =
        (tenant_id, client_id.clone(), client_secret)
    {
        return CredentialSource::ClientSecret {
            tenant_id,
            client_id,
            client_secret,
        };
    }

    if settings.use_msi {
        return CredentialSource::ManagedIdentity { client_id };
    }

    CredentialSource::AzureCli
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Get the Azure CLI configuration directory
pub fn get_azure_config_dir() -> Option<PathBuf> {
    if let Some(path) = non_empty_env("AZURE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|p| p.join(".azure"))
}

/// Read the default subscription: `AZURE_SUBSCRIPTION_ID`, then the CLI profile
pub fn get_default_subscription() -> Option<String> {
    if let Some(id) = non_empty_env("AZURE_SUBSCRIPTION_ID") {
        if uuid::Uuid::parse_str(&id).is_ok() {
            return Some(id);
        }
        tracing::warn!("Invalid subscription ID format in AZURE_SUBSCRIPTION_ID");
    }

    let profile_path = get_azure_config_dir()?.join("azureProfile.json");
    let content = std::fs::read_to_string(&profile_path).ok()?;
    default_subscription_from_profile(&content)
}

/// Extract the default subscription id from an `azureProfile.json` document
pub fn default_subscription_from_profile(content: &str) -> Option<String> {
    // The CLI writes this file with a UTF-8 BOM
    let content = content.trim_start_matches('\u{feff}');
    let profile: Value = serde_json::from_str(content).ok()?;

    profile
        .get("subscriptions")?
        .as_array()?
        .iter()
        .find(|s| s.get("isDefault").and_then(Value::as_bool).unwrap_or(false))
        .and_then(|s| s.get("id"))
        .and_then(Value::as_str)
        .filter(|id| uuid::Uuid::parse_str(id).is_ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_subscription_from_profile() {
        let profile = "\u{feff}{\"subscriptions\": [
            {\"id\": \"11111111-1111-1111-1111-111111111111\", \"isDefault\": false},
            {\"id\": \"22222222-2222-2222-2222-222222222222\", \"isDefault\": true}
        ]}";
        assert_eq!(
            default_subscription_from_profile(profile).as_deref(),
            Some("22222222-2222-2222-2222-222222222222")
        );
    }

    #[test]
    fn test_default_subscription_rejects_invalid_id() {
        let profile = r#"{"subscriptions": [{"id": "../../etc", "isDefault": true}]}"#;
        assert!(default_subscription_from_profile(profile).is_none());
    }

    #[test]
    fn test_ttl_until() {
        assert_eq!(ttl_until(1000, 400), Duration::from_secs(600));
        assert_eq!(ttl_until(300, 400), DEFAULT_TOKEN_TTL);
    }

    #[test]
    fn test_builds_credential_per_source() {
        let secret = CredentialSource::ClientSecret {
            tenant_id: "72f988bf-86f1-41af-91ab-2d7cd011db47".to_string(),
            client_id: "03bbedd2-cce5-45ab-9414-1c1cb82361f0".to_string(),
            client_secret: "s3cret".to_string(),
        };
        assert!(build_credential(&secret).unwrap().is_some());

        let msi = CredentialSource::ManagedIdentity {
            client_id: Some("03bbedd2-cce5-45ab-9414-1c1cb82361f0".to_string()),
        };
        assert!(build_credential(&msi).unwrap().is_some());

        let fixed = CredentialSource::StaticToken("t".to_string());
        assert!(build_credential(&fixed).unwrap().is_none());
    }

    #[test]
    fn test_cached_token_validity() {
        assert!(CachedToken::new("t".into(), Duration::from_secs(3600)).is_valid());
        assert!(!CachedToken::new("t".into(), Duration::from_secs(10)).is_valid());
    }

    #[tokio::test]
    async fn test_static_token() {
        let creds = AzureCredentials::from_static_token("test-token").unwrap();
        assert_eq!(creds.get_token().await.unwrap(), "test-token");
        assert_eq!(creds.source().kind(), "static-token");
    }
}
