use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::auth::memory::MemoryIdentityProvider;
use crate::auth::{AuthError, IdentityProvider, UserDirectory};
use crate::config::Config;
use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::store::memory::{MemoryListingStore, MemoryTaskStore};
use crate::store::{ListingStore, StoreError, TaskStore};

#[derive(Debug, Clone)]
pub struct Settings {
    pub call_timeout: Duration,
    pub min_pickup_lead: chrono::Duration,
    pub default_radius_km: f64,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            call_timeout: config.storage_timeout(),
            min_pickup_lead: config.min_pickup_lead(),
            default_radius_km: config.default_radius_km,
        }
    }
}

pub struct AppState {
    pub listings: Arc<dyn ListingStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub users: Arc<dyn UserDirectory>,
    pub audit: Arc<dyn AuditSink>,
    pub metrics: Metrics,
    pub settings: Settings,
}

impl AppState {
    pub fn in_memory(config: &Config) -> Self {
        let directory = Arc::new(MemoryIdentityProvider::new());

        Self {
            listings: Arc::new(MemoryListingStore::new()),
            tasks: Arc::new(MemoryTaskStore::new()),
            identity: directory.clone(),
            users: directory,
            audit: Arc::new(TracingAuditSink),
            metrics: Metrics::new(),
            settings: Settings::from(config),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn store<T, F>(&self, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.settings.call_timeout, call).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::Dependency("storage call timed out".to_string())),
        }
    }

    pub async fn auth<T, F>(&self, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        match tokio::time::timeout(self.settings.call_timeout, call).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::Dependency("identity call timed out".to_string())),
        }
    }
}
