use tracing::{debug, warn};
use url::Url;

/// The redirect shapes that may carry an authorization code back to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRoutes {
    /// Custom URI scheme, e.g. `psd2banking` for `psd2banking://callback?code=...`.
    pub custom_scheme: String,
    /// HTTPS host of the universal-link callback page, if one is registered.
    pub universal_host: Option<String>,
    /// Path prefix of the universal-link callback page.
    pub universal_path: String,
}

impl Default for CallbackRoutes {
    fn default() -> Self {
        Self {
            custom_scheme: "psd2banking".to_string(),
            universal_host: None,
            universal_path: "/callback".to_string(),
        }
    }
}

impl CallbackRoutes {
    pub fn matches(&self, url: &Url) -> bool {
        if url.scheme().eq_ignore_ascii_case(&self.custom_scheme) {
            return true;
        }
        match (&self.universal_host, url.host_str()) {
            (Some(host), Some(actual)) => {
                url.scheme() == "https"
                    && actual.eq_ignore_ascii_case(host)
                    && url.path().starts_with(&self.universal_path)
            }
            _ => false,
        }
    }

    /// Human-readable list of the accepted callback shapes.
    ///
    /// Universal links are only accepted once a host is configured.
    pub fn describe(&self) -> String {
        let custom = format!("{}://...?code=<code>", self.custom_scheme);
        match &self.universal_host {
            Some(host) => format!("{custom} or https://{host}{}?code=<code>", self.universal_path),
            None => format!("{custom} (set --callback-host to also accept https universal links)"),
        }
    }

    /// Returns the first non-empty `code` query value of a recognised callback URL.
    ///
    /// Unrecognised shapes and callbacks without a code are logged and yield `None`.
    pub fn extract_code(&self, raw_url: &str) -> Option<String> {
        let url = match Url::parse(raw_url.trim()) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = raw_url, error = %e, "ignoring unparsable callback URL");
                return None;
            }
        };
        if !self.matches(&url) {
            warn!(url = raw_url, "ignoring callback with unknown shape");
            return None;
        }
        let code = url
            .query_pairs()
            .find(|(name, value)| name == "code" && !value.is_empty())
            .map(|(_, value)| value.into_owned());
        match &code {
            Some(_) => debug!(scheme = url.scheme(), "authorization code received"),
            None => warn!(url = raw_url, "callback carries no code parameter"),
        }
        code
    }
}
