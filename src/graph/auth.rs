use crate::config::{ConfigManager, Resource, TenantConfig, TokenCache};
use crate::error::{Offboard365Error, Result};
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, ClientId, ClientSecret, Scope,
    TokenResponse, TokenUrl,
};
use std::time::Duration;

const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Application permissions the app registration needs (documented in `tenant add --help`)
pub const REQUIRED_SCOPES: &[&str] = &[
    "User.ReadWrite.All",
    "Group.ReadWrite.All",
    "Directory.ReadWrite.All",
    "Exchange.ManageAsApp",
];

pub struct GraphAuth {
    config_manager: ConfigManager,
}

impl GraphAuth {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Acquire an app-only token for one resource with the client credentials flow
    pub async fn login_client_credentials(
        &self,
        tenant_config: &TenantConfig,
        resource: Resource,
    ) -> Result<TokenCache> {
        let client_secret = tenant_config.client_secret.as_ref().ok_or_else(|| {
            Offboard365Error::AuthError(format!(
                "Tenant '{}' has no client secret configured",
                tenant_config.name
            ))
        })?;

        tracing::debug!(tenant = %tenant_config.name, scope = resource.scope(), "requesting app-only token");

        let tenant_id = &tenant_config.tenant_id;
        let auth_url = AuthUrl::new(format!(
            "{}/{}/oauth2/v2.0/authorize",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| Offboard365Error::AuthError(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(format!(
            "{}/{}/oauth2/v2.0/token",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| Offboard365Error::AuthError(format!("Invalid token URL: {}", e)))?;

        let client = BasicClient::new(
            ClientId::new(tenant_config.client_id.clone()),
            Some(ClientSecret::new(client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        let token = client
            .exchange_client_credentials()
            .add_scope(Scope::new(resource.scope().to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                Offboard365Error::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        let lifetime = token.expires_in().unwrap_or(Duration::from_secs(3600));
        let expires_at = chrono::Utc::now()
            + chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::hours(1));

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            expires_at,
            tenant_id: tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, resource, &token_cache)?;

        Ok(token_cache)
    }

    /// Cached token if still valid, otherwise a fresh one from the client credentials flow
    pub async fn get_access_token(
        &self,
        tenant_config: &TenantConfig,
        resource: Resource,
    ) -> Result<String> {
        match self.config_manager.load_token(&tenant_config.name, resource) {
            Ok(token) => Ok(token.access_token),
            Err(Offboard365Error::AuthError(_)) | Err(Offboard365Error::TokenNotFound) => {
                if tenant_config.client_secret.is_none() {
                    return Err(Offboard365Error::TokenNotFound);
                }
                let token = self.login_client_credentials(tenant_config, resource).await?;
                Ok(token.access_token)
            }
            Err(e) => Err(e),
        }
    }
}
