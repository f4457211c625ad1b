//! Construction of storage providers by name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{
    InMemoryObjectStore, MemoryStorageProvider, ObjectStorageProvider, SqliteStorageProvider,
    StorageError, StorageProvider, StorageResult,
};

/// Free-form keyword arguments handed to a provider constructor.
pub type ProviderArgs = serde_json::Map<String, serde_json::Value>;

/// Builds an uninitialized provider from its arguments.
pub type ProviderConstructor = fn(&ProviderArgs) -> StorageResult<Arc<dyn StorageProvider>>;

/// Name to constructor table for storage backends.
#[derive(Clone)]
pub struct ProviderRegistry {
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// A registry holding `memory`, `sqlite` and `s3`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("memory", build_memory);
        registry.register("sqlite", build_sqlite);
        registry.register("s3", build_object);
        registry
    }

    /// Register (or replace) a constructor under `name`.
    pub fn register(&mut self, name: impl Into<String>, constructor: ProviderConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Build and initialize the provider registered under `name`.
    pub fn create(
        &self,
        name: &str,
        args: &ProviderArgs,
    ) -> StorageResult<Arc<dyn StorageProvider>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| StorageError::UnknownProvider(name.to_string()))?;
        let provider = constructor(args)?;
        provider.initialize()?;
        tracing::debug!(provider = %name, "created storage provider");
        Ok(provider)
    }
}

/// Build and initialize a builtin provider by name.
pub fn create_provider(name: &str, args: &ProviderArgs) -> StorageResult<Arc<dyn StorageProvider>> {
    ProviderRegistry::with_builtins().create(name, args)
}

fn string_arg<'a>(args: &'a ProviderArgs, key: &str, default: &'a str) -> StorageResult<&'a str> {
    match args.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(serde_json::Value::String(s)) => Ok(s),
        Some(other) => Err(StorageError::InvalidArgument(format!(
            "{} must be a string, got {}",
            key, other
        ))),
    }
}

fn build_memory(_args: &ProviderArgs) -> StorageResult<Arc<dyn StorageProvider>> {
    Ok(Arc::new(MemoryStorageProvider::new()))
}

fn build_sqlite(args: &ProviderArgs) -> StorageResult<Arc<dyn StorageProvider>> {
    let db_path = string_arg(args, "db_path", ":memory:")?;
    Ok(Arc::new(SqliteStorageProvider::open(db_path)?))
}

fn build_object(args: &ProviderArgs) -> StorageResult<Arc<dyn StorageProvider>> {
    let bucket = string_arg(args, "bucket_name", "vshell")?;
    let prefix = string_arg(args, "prefix", "")?;
    Ok(Arc::new(ObjectStorageProvider::new(
        InMemoryObjectStore::new(),
        bucket,
        prefix,
    )))
}
