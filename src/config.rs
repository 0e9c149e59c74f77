use crate::application::defaults::DefaultCredentials;
use crate::infrastructure::certificate::CertificateLocations;
use crate::infrastructure::mtls::TransportSettings;
use crate::interfaces::callback::CallbackRoutes;
use std::path::PathBuf;

pub const DEFAULT_CACHE_DIR: &str = ".psd2flow";
pub const CERTIFICATE_FOLDER: &str = "PSD2_Certificates";

/// Everything the engine needs besides the session it runs for.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub certificates: CertificateLocations,
    pub certificate_password: String,
    pub transport: TransportSettings,
    pub callback: CallbackRoutes,
    pub credentials: DefaultCredentials,
    /// Root of the JSON template cache and the durable code slot.
    pub cache_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cache_dir = PathBuf::from(DEFAULT_CACHE_DIR);
        Self {
            certificates: CertificateLocations {
                resource_root: PathBuf::from("resources"),
                bundled_root: PathBuf::from("resources").join(CERTIFICATE_FOLDER),
                user_root: cache_dir.join(CERTIFICATE_FOLDER),
            },
            certificate_password: String::new(),
            transport: TransportSettings::default(),
            callback: CallbackRoutes::default(),
            credentials: DefaultCredentials::default(),
            cache_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mtls::{DEFAULT_TIMEOUT, ServerTrust};

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_dir, PathBuf::from(".psd2flow"));
        assert_eq!(
            config.certificates.user_root,
            PathBuf::from(".psd2flow/PSD2_Certificates")
        );
        assert_eq!(config.transport.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.transport.server_trust, ServerTrust::AcceptAny);
        assert_eq!(config.callback.custom_scheme, "psd2banking");
    }
}
