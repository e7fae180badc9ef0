//! Projector registry: name to transform, loaded once and cached.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use readmodel_core::{ProjectorLoader, ReadModelError, Result, Transform};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub id: String,
    pub name: String,
}

/// A registered projector.
#[derive(Clone)]
pub struct Projector {
    pub id: String,
    pub name: String,
    /// Where the code was loaded from; `None` for in-process transforms
    pub source: Option<PathBuf>,
    pub registered_at: DateTime<Utc>,
    pub transform: Arc<dyn Transform>,
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

/// Process-wide map of projector name to transform.
///
/// Registering under an existing name replaces the previous projector.
pub struct ProjectorRegistry {
    loader: Arc<dyn ProjectorLoader>,
    projectors: RwLock<HashMap<String, Projector>>,
}

impl ProjectorRegistry {
    pub fn new(loader: Arc<dyn ProjectorLoader>) -> Self {
        Self {
            loader,
            projectors: RwLock::new(HashMap::new()),
        }
    }

    /// Load the code at `path` and register it under `name`.
    pub fn register(&self, name: &str, path: &Path) -> Result<Registration> {
        validate_name(name)?;
        let transform = self.loader.load(path)?;
        Ok(self.insert(name, Some(path.to_path_buf()), transform))
    }

    /// Register an in-process transform.
    pub fn register_transform(&self, name: &str, transform: Arc<dyn Transform>) -> Result<Registration> {
        validate_name(name)?;
        Ok(self.insert(name, None, transform))
    }

    fn insert(&self, name: &str, source: Option<PathBuf>, transform: Arc<dyn Transform>) -> Registration {
        let registered_at = Utc::now();
        let id = format!("{}-{}", name, registered_at.timestamp_millis());
        let projector = Projector {
            id: id.clone(),
            name: name.to_string(),
            source,
            registered_at,
            transform,
        };

        let replaced = self.projectors.write().insert(name.to_string(), projector);
        if let Some(previous) = replaced {
            tracing::info!(name, id = %id, previous = %previous.id, "Projector replaced");
        } else {
            tracing::info!(name, id = %id, "Projector registered");
        }

        Registration {
            id,
            name: name.to_string(),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Transform>> {
        self.get(name).map(|p| p.transform)
    }

    pub fn get(&self, name: &str) -> Result<Projector> {
        self.projectors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ReadModelError::NotFound(format!("Projector {} not found", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.projectors.read().contains_key(name)
    }

    /// Every projector, ordered by name.
    pub fn list(&self) -> Vec<Projector> {
        let mut projectors: Vec<Projector> = self.projectors.read().values().cloned().collect();
        projectors.sort_by(|a, b| a.name.cmp(&b.name));
        projectors
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ReadModelError::InvalidRequest("projector name must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StaticLoader;
    use readmodel_core::{Event, FnTransform, Record, TransformOutput};

    fn constant(value: i64) -> Arc<dyn Transform> {
        Arc::new(FnTransform(move |_: &Event| {
            Ok(TransformOutput::One(Record::new().with("v", value)))
        }))
    }

    #[test]
    fn register_through_loader() {
        let loader = StaticLoader::new().with("/p/orders.so", constant(1));
        let registry = ProjectorRegistry::new(Arc::new(loader));

        let reg = registry.register("orders", Path::new("/p/orders.so")).unwrap();
        assert_eq!(reg.name, "orders");
        assert!(reg.id.starts_with("orders-"));
        assert!(registry.contains("orders"));
        assert_eq!(
            registry.get("orders").unwrap().source.as_deref(),
            Some(Path::new("/p/orders.so"))
        );
    }

    #[test]
    fn load_failure_leaves_registry_untouched() {
        let registry = ProjectorRegistry::new(Arc::new(StaticLoader::new()));
        let err = registry.register("orders", Path::new("/missing.so")).unwrap_err();
        assert!(matches!(err, ReadModelError::Load(_)));
        assert!(!registry.contains("orders"));
    }

    #[test]
    fn unknown_projector_is_not_found() {
        let registry = ProjectorRegistry::new(Arc::new(StaticLoader::new()));
        assert!(matches!(registry.resolve("nope"), Err(ReadModelError::NotFound(_))));
    }

    #[test]
    fn empty_name_rejected() {
        let registry = ProjectorRegistry::new(Arc::new(StaticLoader::new()));
        assert!(registry.register_transform(" ", constant(1)).is_err());
    }

    #[tokio::test]
    async fn reregistration_replaces() {
        let registry = ProjectorRegistry::new(Arc::new(StaticLoader::new()));
        registry.register_transform("p", constant(1)).unwrap();
        registry.register_transform("p", constant(2)).unwrap();

        assert_eq!(registry.list().len(), 1);
        let event = crate::memory::sample_event("e-1", "t", "2025-01-01T00:00:00Z");
        let out = registry.resolve("p").unwrap().project(&event).await.unwrap();
        let records = out.into_records();
        assert_eq!(records[0].get("v"), Some(&readmodel_core::FieldValue::Int(2)));
    }
}
