use super::environment::Environment;
use super::exchange::HttpExchange;
use super::template::{PreparedRequest, RequestTemplate, TemplateKey};
use crate::error::Result;
use async_trait::async_trait;

/// Persistent home of the user-edited request templates and their cached responses.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    async fn get(&self, key: &TemplateKey) -> Result<Option<RequestTemplate>>;
    async fn put(&self, template: RequestTemplate) -> Result<()>;
    async fn list(&self, user_id: &str, profile_id: &str) -> Result<Vec<RequestTemplate>>;
    async fn clear(&self, user_id: &str, profile_id: &str) -> Result<()>;
}

/// Durable slot for the most recent authorization code, so a redirect that
/// arrives while the process is down is not lost.
#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync {
    async fn save_code(&self, code: &str) -> Result<()>;
    async fn load_code(&self) -> Result<Option<String>>;
}

/// Which client certificate a call must present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateTarget {
    pub bank_name: String,
    pub environment: Environment,
}

/// Issues a single request and reports the raw exchange.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &PreparedRequest,
        target: &CertificateTarget,
    ) -> Result<HttpExchange>;
}

/// Something that can show the SCA redirect to the user: a browser, a banking
/// app, or just a terminal.
pub trait ExternalAgent: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

pub type ConfigurationStoreBox = Box<dyn ConfigurationStore>;
pub type AuthorizationCodeStoreBox = Box<dyn AuthorizationCodeStore>;
pub type RequestExecutorBox = Box<dyn RequestExecutor>;
