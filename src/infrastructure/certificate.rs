use crate::domain::environment::Environment;
use crate::error::{ConsentError, Result, error_chain};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the per-bank subdirectory under the certificate roots.
pub fn bank_folder_name(bank_name: &str) -> String {
    bank_name.replace(' ', "_")
}

/// `{SB|RD}_{Test|Prelive|Production}_{Bank_Name}.p12`
pub fn certificate_file_name(bank_name: &str, environment: &Environment) -> String {
    format!(
        "{}_{}_{}.p12",
        environment.prefix_code(),
        environment.type_name(),
        bank_folder_name(bank_name)
    )
}

/// Where client certificates are looked up, in search order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateLocations {
    /// Certificates shipped flat next to the tool.
    pub resource_root: PathBuf,
    /// Shipped certificates organised as `<root>/<Bank_Name>/<file>`.
    pub bundled_root: PathBuf,
    /// User-writable directory with the same `<Bank_Name>/<file>` layout.
    pub user_root: PathBuf,
}

/// A parsed client identity, owned by one request execution.
pub struct ClientIdentity {
    path: PathBuf,
    identity: reqwest::Identity,
}

impl ClientIdentity {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_reqwest(self) -> reqwest::Identity {
        self.identity
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Finds and parses the PKCS#12 client certificate for a bank environment.
///
/// Nothing is cached here: every call reads and parses the container again,
/// so a replaced certificate is picked up by the next request.
#[derive(Debug, Clone)]
pub struct CertificateProvider {
    locations: CertificateLocations,
    password: String,
}

impl CertificateProvider {
    pub fn new(locations: CertificateLocations, password: impl Into<String>) -> Self {
        Self {
            locations,
            password: password.into(),
        }
    }

    pub fn candidate_paths(&self, bank_name: &str, environment: &Environment) -> Vec<PathBuf> {
        let file_name = certificate_file_name(bank_name, environment);
        let folder = bank_folder_name(bank_name);
        vec![
            self.locations.resource_root.join(&file_name),
            self.locations.bundled_root.join(&folder).join(&file_name),
            self.locations.user_root.join(&folder).join(&file_name),
        ]
    }

    pub fn locate(&self, bank_name: &str, environment: &Environment) -> Result<PathBuf> {
        let searched = self.candidate_paths(bank_name, environment);
        match searched.iter().find(|path| path.is_file()) {
            Some(found) => {
                debug!(path = %found.display(), "client certificate located");
                Ok(found.clone())
            }
            None => Err(ConsentError::CertificateNotFound {
                file_name: certificate_file_name(bank_name, environment),
                searched,
            }),
        }
    }

    pub fn resolve(&self, bank_name: &str, environment: &Environment) -> Result<ClientIdentity> {
        let path = self.locate(bank_name, environment)?;
        let der = fs::read(&path)?;
        let identity = parse_pkcs12(&path, &der, &self.password)?;
        info!(path = %path.display(), "client identity loaded");
        Ok(ClientIdentity { path, identity })
    }
}

/// Parses a PKCS#12 container, telling a wrong passphrase apart from a broken file.
pub fn parse_pkcs12(path: &Path, der: &[u8], password: &str) -> Result<reqwest::Identity> {
    // A PKCS#12 PFX is a DER SEQUENCE.
    if der.len() < 4 || der[0] != 0x30 {
        return Err(ConsentError::InvalidCertificateFormat {
            path: path.to_path_buf(),
            reason: "not a DER-encoded PKCS#12 container".to_string(),
        });
    }
    reqwest::Identity::from_pkcs12_der(der, password).map_err(|e| {
        let reason = error_chain(&e);
        if looks_like_bad_password(&reason) {
            ConsentError::InvalidCertificatePassword(path.to_path_buf())
        } else {
            ConsentError::InvalidCertificateFormat {
                path: path.to_path_buf(),
                reason,
            }
        }
    })
}

/// OpenSSL reports a MAC mismatch, Security.framework and SChannel mention the
/// passphrase or password.
fn looks_like_bad_password(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("mac verify") || message.contains("passphrase") || message.contains("password")
}
