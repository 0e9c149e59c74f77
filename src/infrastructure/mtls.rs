use super::certificate::{CertificateProvider, ClientIdentity};
use crate::domain::exchange::HttpExchange;
use crate::domain::ports::{CertificateTarget, RequestExecutor};
use crate::domain::template::{OrderedPairs, PreparedRequest};
use crate::error::{ConsentError, Result, error_chain};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How the server's certificate is judged during the handshake.
///
/// `AcceptAny` exists because bank sandboxes routinely present certificates
/// that do not chain to a public root. It turns off server authentication and
/// must not be used outside a testing setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerTrust {
    #[default]
    AcceptAny,
    Verify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub server_trust: ServerTrust,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            server_trust: ServerTrust::default(),
        }
    }
}

/// Executes each request on its own short-lived TLS client that presents the
/// bank-specific client certificate.
#[derive(Debug, Clone)]
pub struct MtlsExecutor {
    certificates: CertificateProvider,
    settings: TransportSettings,
}

impl MtlsExecutor {
    pub fn new(certificates: CertificateProvider, settings: TransportSettings) -> Self {
        Self {
            certificates,
            settings,
        }
    }
}

#[async_trait]
impl RequestExecutor for MtlsExecutor {
    async fn execute(
        &self,
        request: &PreparedRequest,
        target: &CertificateTarget,
    ) -> Result<HttpExchange> {
        // Parsed for this call only; dropped together with the client.
        let identity = self
            .certificates
            .resolve(&target.bank_name, &target.environment)?;
        send(request, Some(identity), &self.settings).await
    }
}

/// Sends one request on a fresh client and renders the exchange.
///
/// Redirects are returned, not followed. The client (and with it the TLS
/// session and any pooled connection) is dropped before this returns.
pub async fn send(
    request: &PreparedRequest,
    identity: Option<ClientIdentity>,
    settings: &TransportSettings,
) -> Result<HttpExchange> {
    let method = reqwest::Method::from_bytes(request.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| ConsentError::InvalidRequest(format!("unknown method {:?}", request.method)))?;
    let url = reqwest::Url::parse(&request.full_url())
        .map_err(|e| ConsentError::InvalidRequest(format!("invalid URL {:?}: {e}", request.url)))?;
    let headers = header_map(&request.headers)?;

    let client = build_client(identity, settings)?;
    let mut builder = client.request(method.clone(), url.clone()).headers(headers);
    if request.sends_body() {
        builder = builder.body(request.body.clone());
    }

    info!(%method, %url, "sending request");
    let outcome = match builder.send().await {
        Ok(response) => read_response(response).await,
        Err(e) => Err(transport_error(&e, settings)),
    };
    drop(client);

    match &outcome {
        Ok(exchange) => info!(status = exchange.status_code, "response received"),
        Err(e) => warn!(error = %e, "request failed"),
    }
    outcome
}

fn build_client(identity: Option<ClientIdentity>, settings: &TransportSettings) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_native_tls()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(settings.timeout)
        .pool_max_idle_per_host(0);

    if settings.server_trust == ServerTrust::AcceptAny {
        builder = builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }
    if let Some(identity) = identity {
        debug!(path = %identity.path().display(), "presenting client certificate");
        builder = builder.identity(identity.into_reqwest());
    }

    builder
        .build()
        .map_err(|e| ConsentError::Transport(format!("failed to build TLS client: {}", error_chain(&e))))
}

fn header_map(headers: &OrderedPairs) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| ConsentError::InvalidRequest(format!("invalid header name {name:?}")))?;
        let header_value = HeaderValue::from_str(value.trim())
            .map_err(|_| ConsentError::InvalidRequest(format!("invalid value for header {name:?}")))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

async fn read_response(response: reqwest::Response) -> Result<HttpExchange> {
    let status = response.status().as_u16();
    let mut headers = OrderedPairs::new();
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ConsentError::Transport(format!("failed to read response body: {}", error_chain(&e))))?;
    let body = String::from_utf8_lossy(&bytes);
    Ok(HttpExchange::new(status, headers, &body))
}

fn transport_error(e: &reqwest::Error, settings: &TransportSettings) -> ConsentError {
    if e.is_timeout() {
        ConsentError::Transport(format!("request timed out after {:?}", settings.timeout))
    } else {
        ConsentError::Transport(error_chain(e))
    }
}
