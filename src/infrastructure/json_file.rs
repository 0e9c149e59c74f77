use crate::domain::ports::{AuthorizationCodeStore, ConfigurationStore};
use crate::domain::template::{RequestTemplate, TemplateKey, escape_key_component};
use crate::error::{ConsentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// File holding the durable authorization-code slot.
pub const AUTHORIZATION_CODE_FILE: &str = "authorization_code.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredCode {
    code: String,
}

/// A file-backed cache of request templates.
///
/// Templates of one (user, profile) pair live together in
/// `config_<user>_<profile>.json` as a JSON array, with both ids
/// percent-escaped so distinct owners never share a file. Writes go through a temporary
/// file that is renamed into place, so a crash never leaves a torn cache.
///
/// `Clone` shares the write lock, so clones may be handed to different ports.
#[derive(Clone)]
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Opens (and creates if missing) a cache directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn owner_file(&self, user_id: &str, profile_id: &str) -> PathBuf {
        self.root.join(format!(
            "config_{}_{}.json",
            escape_key_component(user_id),
            escape_key_component(profile_id)
        ))
    }

    fn read_owner(&self, path: &Path) -> Result<Vec<RequestTemplate>> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cached configurations yet");
                Ok(Vec::new())
            }
            Err(e) => Err(ConsentError::Io(e)),
        }
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| ConsentError::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl ConfigurationStore for JsonFileStore {
    async fn get(&self, key: &TemplateKey) -> Result<Option<RequestTemplate>> {
        let path = self.owner_file(&key.user_id, &key.profile_id);
        Ok(self.read_owner(&path)?.into_iter().find(|t| &t.key == key))
    }

    async fn put(&self, template: RequestTemplate) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.owner_file(&template.key.user_id, &template.key.profile_id);
        let mut templates = self.read_owner(&path)?;
        match templates.iter_mut().find(|t| t.key == template.key) {
            Some(existing) => *existing = template,
            None => templates.push(template),
        }
        let bytes = serde_json::to_vec_pretty(&templates)?;
        self.write_atomically(&path, &bytes)
    }

    async fn list(&self, user_id: &str, profile_id: &str) -> Result<Vec<RequestTemplate>> {
        let path = self.owner_file(user_id, profile_id);
        Ok(self
            .read_owner(&path)?
            .into_iter()
            .filter(|t| t.key.user_id == user_id && t.key.profile_id == profile_id)
            .collect())
    }

    async fn clear(&self, user_id: &str, profile_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.owner_file(user_id, profile_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to clear configurations");
                Err(ConsentError::Io(e))
            }
        }
    }
}

#[async_trait]
impl AuthorizationCodeStore for JsonFileStore {
    async fn save_code(&self, code: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let bytes = serde_json::to_vec(&StoredCode {
            code: code.to_string(),
        })?;
        self.write_atomically(&self.root.join(AUTHORIZATION_CODE_FILE), &bytes)
    }

    async fn load_code(&self) -> Result<Option<String>> {
        match fs::read(self.root.join(AUTHORIZATION_CODE_FILE)) {
            Ok(bytes) => {
                let stored: StoredCode = serde_json::from_slice(&bytes)?;
                Ok(Some(stored.code).filter(|c| !c.is_empty()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConsentError::Io(e)),
        }
    }
}
