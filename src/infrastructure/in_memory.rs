use crate::domain::ports::{AuthorizationCodeStore, ConfigurationStore};
use crate::domain::template::{RequestTemplate, TemplateKey};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory template store.
///
/// Uses `Arc<RwLock<HashMap<TemplateKey, RequestTemplate>>>` so clones share state.
/// Ideal for testing or one-off runs where nothing needs to survive the process.
#[derive(Default, Clone)]
pub struct InMemoryConfigurationStore {
    templates: Arc<RwLock<HashMap<TemplateKey, RequestTemplate>>>,
}

impl InMemoryConfigurationStore {
    /// Creates a new, empty in-memory template store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigurationStore for InMemoryConfigurationStore {
    async fn get(&self, key: &TemplateKey) -> Result<Option<RequestTemplate>> {
        let templates = self.templates.read().await;
        Ok(templates.get(key).cloned())
    }

    async fn put(&self, template: RequestTemplate) -> Result<()> {
        let mut templates = self.templates.write().await;
        templates.insert(template.key.clone(), template);
        Ok(())
    }

    async fn list(&self, user_id: &str, profile_id: &str) -> Result<Vec<RequestTemplate>> {
        let templates = self.templates.read().await;
        let mut owned: Vec<RequestTemplate> = templates
            .values()
            .filter(|t| t.key.user_id == user_id && t.key.profile_id == profile_id)
            .cloned()
            .collect();
        owned.sort_by_key(|t| t.key.to_string());
        Ok(owned)
    }

    async fn clear(&self, user_id: &str, profile_id: &str) -> Result<()> {
        let mut templates = self.templates.write().await;
        templates.retain(|key, _| !(key.user_id == user_id && key.profile_id == profile_id));
        Ok(())
    }
}

/// Keeps the last authorization code for the lifetime of the process only.
#[derive(Default, Clone)]
pub struct InMemoryCodeStore {
    code: Arc<RwLock<Option<String>>>,
}

impl InMemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationCodeStore for InMemoryCodeStore {
    async fn save_code(&self, code: &str) -> Result<()> {
        *self.code.write().await = Some(code.to_string());
        Ok(())
    }

    async fn load_code(&self) -> Result<Option<String>> {
        Ok(self.code.read().await.clone())
    }
}
