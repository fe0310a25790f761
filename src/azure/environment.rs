//! Azure cloud environments
//!
//! Endpoints differ between the public cloud and the sovereign clouds. The
//! environment is picked by name (config `environment` or `AZURE_ENVIRONMENT`).

/// Resource manager and authority endpoints for one Azure cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEnvironment {
    pub name: String,
    pub resource_manager: String,
    pub authority_host: String,
}

impl CloudEnvironment {
    pub fn public() -> Self {
        Self {
            name: "AzurePublicCloud".to_string(),
            resource_manager: "https://management.azure.com".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
        }
    }

    pub fn china() -> Self {
        Self {
            name: "AzureChinaCloud".to_string(),
            resource_manager: "https://management.chinacloudapi.cn".to_string(),
            authority_host: "https://login.chinacloudapi.cn".to_string(),
        }
    }

    pub fn us_government() -> Self {
        Self {
            name: "AzureUSGovernmentCloud".to_string(),
            resource_manager: "https://management.usgovcloudapi.net".to_string(),
            authority_host: "https://login.microsoftonline.us".to_string(),
        }
    }

    /// Environment pointing at an arbitrary resource manager endpoint
    /// (Azure Stack, local mocks)
    pub fn custom(resource_manager: &str) -> Self {
        let resource_manager = resource_manager.trim_end_matches('/').to_string();
        Self {
            name: "Custom".to_string(),
            authority_host: resource_manager.clone(),
            resource_manager,
        }
    }

    /// Look up a preset by name. Accepts the SDK names as well as short aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "azurepubliccloud" | "azurecloud" | "public" => Some(Self::public()),
            "azurechinacloud" | "china" => Some(Self::china()),
            "azureusgovernmentcloud" | "azureusgovernment" | "usgovernment" | "usgov" => {
                Some(Self::us_government())
            }
            _ => None,
        }
    }

    /// OAuth scope for tokens accepted by the resource manager
    pub fn token_scope(&self) -> String {
        format!("{}/.default", self.resource_manager)
    }
}

impl Default for CloudEnvironment {
    fn default() -> Self {
        Self::public()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(
            CloudEnvironment::from_name("AZURECHINACLOUD"),
            Some(CloudEnvironment::china())
        );
        assert_eq!(
            CloudEnvironment::from_name("usgov"),
            Some(CloudEnvironment::us_government())
        );
        assert_eq!(CloudEnvironment::from_name(""), Some(CloudEnvironment::public()));
        assert!(CloudEnvironment::from_name("moon").is_none());
    }

    #[test]
    fn test_token_scope() {
        assert_eq!(
            CloudEnvironment::public().token_scope(),
            "https://management.azure.com/.default"
        );
    }

    #[test]
    fn test_custom_trims_trailing_slash() {
        let env = CloudEnvironment::custom("http://127.0.0.1:8080/");
        assert_eq!(env.resource_manager, "http://127.0.0.1:8080");
    }
}
