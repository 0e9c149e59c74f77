use super::environment::Environment;
use super::step::ApiStep;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CONSENT_ID_PLACEHOLDER: &str = "{consentId}";
pub const AUTHORIZATION_CODE_PLACEHOLDER: &str = "{authorizationCode}";

/// Ordered, case-sensitive header or query-parameter map.
pub type OrderedPairs = IndexMap<String, String>;

/// Composite identity of a stored request template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateKey {
    pub user_id: String,
    pub profile_id: String,
    pub bank_id: String,
    pub environment: Environment,
    pub step: ApiStep,
}

impl TemplateKey {
    /// Prefix shared by every key of one user profile.
    pub fn owner_prefix(user_id: &str, profile_id: &str) -> String {
        format!(
            "{}/{}/",
            escape_key_component(user_id),
            escape_key_component(profile_id)
        )
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9-]`.
///
/// The output never contains `/`, `_` or `.`, so those can separate escaped
/// ids without two different ids colliding.
pub fn escape_key_component(id: &str) -> String {
    let mut escaped = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("%{byte:02X}"));
        }
    }
    escaped
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}/{}",
            Self::owner_prefix(&self.user_id, &self.profile_id),
            escape_key_component(&self.bank_id),
            self.environment,
            self.step.slug()
        )
    }
}

/// A user-editable request description for one step, with `{placeholder}`
/// tokens, plus the last raw response it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTemplate {
    #[serde(flatten)]
    pub key: TemplateKey,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: OrderedPairs,
    // Older caches were written before query parameters existed.
    #[serde(default)]
    pub query_parameters: OrderedPairs,
    #[serde(default)]
    pub body: String,
    #[serde(default, alias = "response")]
    pub cached_response: String,
}

impl RequestTemplate {
    pub fn new(key: TemplateKey, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key,
            method: method.into(),
            url: url.into(),
            headers: OrderedPairs::new(),
            query_parameters: OrderedPairs::new(),
            body: String::new(),
            cached_response: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn step(&self) -> ApiStep {
        self.key.step
    }

    /// The request part of the template, ready for substitution.
    pub fn to_request(&self) -> PreparedRequest {
        PreparedRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            query_parameters: self.query_parameters.clone(),
            body: self.body.clone(),
        }
    }
}

/// A concrete request after placeholder substitution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: OrderedPairs,
    pub query_parameters: OrderedPairs,
    pub body: String,
}

impl PreparedRequest {
    /// Base URL plus `&`-joined query parameters. Values are used verbatim.
    pub fn full_url(&self) -> String {
        join_query(&self.url, &self.query_parameters)
    }

    pub fn has_query_parameter(&self, name: &str) -> bool {
        if self.query_parameters.contains_key(name) {
            return true;
        }
        self.url
            .split_once('?')
            .map(|(_, query)| {
                query
                    .split('&')
                    .any(|pair| pair.split('=').next() == Some(name))
            })
            .unwrap_or(false)
    }

    /// Whether the request carries a body on the wire.
    pub fn sends_body(&self) -> bool {
        !self.body.is_empty()
            && matches!(
                self.method.to_ascii_uppercase().as_str(),
                "POST" | "PUT" | "PATCH"
            )
    }
}

pub fn join_query(base: &str, params: &OrderedPairs) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}
