//! ARM Client
//!
//! Main client for interacting with Azure Resource Manager, combining
//! authentication and HTTP functionality.

use super::auth::{self, AzureCredentials, CredentialSettings, CredentialSource};
use super::error::ArmError;
use super::environment::CloudEnvironment;
use super::http::{ArmHttpClient, RetryPolicy};
use crate::config::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    pub credentials: AzureCredentials,
    pub http: ArmHttpClient,
    pub environment: CloudEnvironment,
    pub subscription_id: String,
}

impl ArmClient {
    /// Create a client from the effective connection configuration
    pub async fn new(config: &Config) -> Result<Self> {
        let environment = config.effective_environment()?;
        let subscription_id = config.effective_subscription().context(
            "No Azure subscription configured. Set AZURE_SUBSCRIPTION_ID, run 'az login' or use --subscription",
        )?;

        let source = auth::resolve_credential_source(&CredentialSettings {
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            use_msi: config.use_msi,
        });
        tracing::info!(
            "Using {} credentials against {} (authority {}, subscription {})",
            source.kind(),
            environment.name,
            environment.authority_host,
            subscription_id
        );

        let credentials = AzureCredentials::new(source, environment.clone())
            .context("Failed to initialize Azure credentials")?;
        let http = ArmHttpClient::new(config.retry_policy())?;

        Ok(Self::from_parts(credentials, http, environment, &subscription_id))
    }

    pub fn from_parts(
        credentials: AzureCredentials,
        http: ArmHttpClient,
        environment: CloudEnvironment,
        subscription_id: &str,
    ) -> Self {
        Self {
            credentials,
            http,
            environment,
            subscription_id: subscription_id.to_string(),
        }
    }

    /// Client against a custom endpoint with a fixed token and no retries
    pub fn with_static_token(resource_manager: &str, token: &str, subscription_id: &str) -> Result<Self> {
        let credentials = AzureCredentials::from_static_token(token)?;
        let http = ArmHttpClient::new(RetryPolicy::none())?;
        Ok(Self::from_parts(
            credentials,
            http,
            CloudEnvironment::custom(resource_manager),
            subscription_id,
        ))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Result<Self> {
        self.http = ArmHttpClient::new(retry)?;
        Ok(self)
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }

    /// Make a GET request to an absolute ARM URL
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        match self.http.get(url, &token).await {
            Err(e) if self.should_refresh(&e) => {
                let token = self.credentials.refresh_token().await?;
                Ok(self.http.get(url, &token).await?)
            }
            result => Ok(result?),
        }
    }

    /// Make a POST request to an absolute ARM URL
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.get_token().await?;
        match self.http.post(url, &token, body).await {
            Err(e) if self.should_refresh(&e) => {
                let token = self.credentials.refresh_token().await?;
                Ok(self.http.post(url, &token, body).await?)
            }
            result => Ok(result?),
        }
    }

    /// A rejected cached token gets one retry with a fresh one
    fn should_refresh(&self, err: &ArmError) -> bool {
        if err.status() != Some(401) {
            return false;
        }
        if matches!(self.credentials.source(), CredentialSource::StaticToken(_)) {
            return false;
        }
        tracing::debug!("Token rejected, refreshing");
        true
    }

    /// GET a resource manager path
    pub async fn get_path(&self, path: &str, api_version: &str) -> Result<Value> {
        let url = self.url(path, api_version, &[])?;
        self.get(url.as_str()).await
    }

    /// Switch to a different subscription
    pub async fn switch_subscription(&mut self, subscription_id: &str) -> Result<()> {
        self.subscription_id = subscription_id.to_string();
        // The subscription may live in another tenant
        self.credentials.refresh_token().await?;
        Ok(())
    }

    /// Build a resource manager URL for a path, adding `api-version` and extra query pairs
    pub fn url(&self, path: &str, api_version: &str, query: &[(String, String)]) -> Result<Url> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        let mut url = Url::parse(&format!("{}{}", self.environment.resource_manager, path))
            .with_context(|| format!("Invalid resource manager URL for path {}", path))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api-version", api_version);
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Path of the configured subscription
    pub fn subscription_path(&self) -> String {
        format!("/subscriptions/{}", self.subscription_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ArmClient {
        ArmClient::with_static_token(
            "https://management.azure.com",
            "token",
            "00000000-0000-0000-0000-000000000000",
        )
        .unwrap()
    }

    #[test]
    fn test_url_adds_api_version() {
        let url = client()
            .url("/subscriptions/abc/resourcegroups", "2022-09-01", &[])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://management.azure.com/subscriptions/abc/resourcegroups?api-version=2022-09-01"
        );
    }

    #[test]
    fn test_url_encodes_extra_query() {
        let url = client()
            .url(
                "subscriptions/abc/providers/Microsoft.Authorization/roleAssignments",
                "2022-04-01",
                &[("$filter".to_string(), "atScope()".to_string())],
            )
            .unwrap();
        assert!(url.as_str().contains("/subscriptions/abc/providers/"));
        assert!(url.as_str().ends_with("&%24filter=atScope%28%29"));
    }

    #[tokio::test]
    async fn test_switch_subscription() {
        let mut client = client();
        client.switch_subscription("sub-2").await.unwrap();
        assert_eq!(client.subscription_path(), "/subscriptions/sub-2");
    }

    #[test]
    fn test_subscription_path() {
        assert_eq!(
            client().subscription_path(),
            "/subscriptions/00000000-0000-0000-0000-000000000000"
        );
    }
}
