use crate::error::Result;
use crate::types::{Event, TransformOutput};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// User-supplied projection from one event to one or more records.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn project(&self, event: &Event) -> Result<TransformOutput>;
}

/// Resolves projector code found at a path into a callable transform.
pub trait ProjectorLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Transform>>;
}

/// Adapts a plain function or closure into a [`Transform`].
pub struct FnTransform<F>(pub F);

#[async_trait]
impl<F> Transform for FnTransform<F>
where
    F: Fn(&Event) -> Result<TransformOutput> + Send + Sync,
{
    async fn project(&self, event: &Event) -> Result<TransformOutput> {
        (self.0)(event)
    }
}
