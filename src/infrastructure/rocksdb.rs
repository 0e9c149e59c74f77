use crate::domain::ports::{AuthorizationCodeStore, ConfigurationStore};
use crate::domain::template::{RequestTemplate, TemplateKey};
use crate::error::{ConsentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family for storing request templates.
pub const CF_TEMPLATES: &str = "templates";
/// Column Family for the durable authorization-code slot.
pub const CF_CODES: &str = "authorization_codes";

const LATEST_CODE_KEY: &[u8] = b"latest";

/// A persistent store implementation using RocksDB.
///
/// Holds both request templates and the authorization-code slot, in separate
/// Column Families. Template keys are the `/`-joined composite key with
/// escaped ids, so all templates of one (user, profile) pair are contiguous.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_templates = ColumnFamilyDescriptor::new(CF_TEMPLATES, Options::default());
        let cf_codes = ColumnFamilyDescriptor::new(CF_CODES, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_templates, cf_codes])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ConsentError::Internal(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn owned_keys(&self, user_id: &str, profile_id: &str) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.handle(CF_TEMPLATES)?;
        let prefix = TemplateKey::owner_prefix(user_id, profile_id);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }
}

#[async_trait]
impl ConfigurationStore for RocksDBStore {
    async fn get(&self, key: &TemplateKey) -> Result<Option<RequestTemplate>> {
        let cf = self.handle(CF_TEMPLATES)?;
        match self.db.get_cf(cf, key.to_string().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, template: RequestTemplate) -> Result<()> {
        let cf = self.handle(CF_TEMPLATES)?;
        let value = serde_json::to_vec(&template)?;
        self.db.put_cf(cf, template.key.to_string().as_bytes(), value)?;
        Ok(())
    }

    async fn list(&self, user_id: &str, profile_id: &str) -> Result<Vec<RequestTemplate>> {
        self.owned_keys(user_id, profile_id)?
            .into_iter()
            .map(|(_, value)| serde_json::from_slice(&value).map_err(ConsentError::from))
            .collect()
    }

    async fn clear(&self, user_id: &str, profile_id: &str) -> Result<()> {
        let cf = self.handle(CF_TEMPLATES)?;
        for (key, _) in self.owned_keys(user_id, profile_id)? {
            self.db.delete_cf(cf, key)?;
        }
        Ok(())
    }
}

#[async_trait]
impl AuthorizationCodeStore for RocksDBStore {
    async fn save_code(&self, code: &str) -> Result<()> {
        let cf = self.handle(CF_CODES)?;
        self.db.put_cf(cf, LATEST_CODE_KEY, code.as_bytes())?;
        Ok(())
    }

    async fn load_code(&self) -> Result<Option<String>> {
        let cf = self.handle(CF_CODES)?;
        match self.db.get_cf(cf, LATEST_CODE_KEY)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| ConsentError::Internal(Box::new(e))),
            None => Ok(None),
        }
    }
}
