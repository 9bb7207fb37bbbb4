use std::sync::Arc;

use crate::config::RemoteApiConfig;
use crate::middleware::error_handling::Result;
use crate::models::{RemoteCredentials, TenantId};
use crate::repositories::SyncStore;
use crate::services::encryption_service::EncryptionService;
use crate::services::remote::{RemoteApiClient, TokenCache};

/// Shared handles for the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SyncStore>,
    pub remote: RemoteApiConfig,
    pub token_cache: Arc<TokenCache>,
    pub jwt_secret: String,
    pub encryption: EncryptionService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SyncStore>,
        remote: RemoteApiConfig,
        jwt_secret: impl Into<String>,
        encryption: EncryptionService,
    ) -> Self {
        Self {
            store,
            remote,
            token_cache: Arc::new(TokenCache::new()),
            jwt_secret: jwt_secret.into(),
            encryption,
        }
    }

    /// Credentials the tenant saved, opened with the service key.
    pub async fn stored_credentials(&self, tenant_id: TenantId) -> Result<Option<RemoteCredentials>> {
        match self.store.load_credentials(tenant_id).await? {
            Some(sealed) => Ok(Some(self.encryption.open_credentials(&sealed)?)),
            None => Ok(None),
        }
    }

    pub async fn store_credentials(
        &self,
        tenant_id: TenantId,
        credentials: &RemoteCredentials,
    ) -> Result<()> {
        let sealed = self.encryption.seal_credentials(credentials)?;
        self.store.save_credentials(tenant_id, &sealed).await?;
        Ok(())
    }

    /// The tenant's stored credentials, or the deployment-wide pair.
    pub async fn credentials_for(&self, tenant_id: TenantId) -> Result<RemoteCredentials> {
        Ok(self
            .stored_credentials(tenant_id)
            .await?
            .filter(RemoteCredentials::is_complete)
            .unwrap_or_else(|| self.remote.fallback_credentials.clone()))
    }

    pub async fn client_for(&self, tenant_id: TenantId) -> Result<RemoteApiClient> {
        let credentials = self.credentials_for(tenant_id).await?;
        Ok(RemoteApiClient::new(
            self.remote.clone(),
            credentials,
            Some(tenant_id),
            Arc::clone(&self.token_cache),
        )?)
    }
}
