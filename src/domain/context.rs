use serde::{Deserialize, Serialize};

/// Values derived while one connection attempt progresses through the flow.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentContext {
    pub consent_id: Option<String>,
    pub sca_redirect_url: Option<String>,
    pub authorization_code: Option<String>,
    pub access_token_response: Option<String>,
    pub access_token: Option<String>,
}

impl ConsentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the consent id, treating an empty string as absent.
    pub fn consent_id(&self) -> Option<&str> {
        non_empty(&self.consent_id)
    }

    pub fn sca_redirect_url(&self) -> Option<&str> {
        non_empty(&self.sca_redirect_url)
    }

    pub fn authorization_code(&self) -> Option<&str> {
        non_empty(&self.authorization_code)
    }

    pub fn access_token(&self) -> Option<&str> {
        non_empty(&self.access_token)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
