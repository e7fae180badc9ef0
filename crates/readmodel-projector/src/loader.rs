//! Native projector plugins loaded with `libloading`.
//!
//! A plugin exports `readmodel_projector` (preferred) or `project_event`
//! with the signature `fn(*const c_char) -> *mut c_char`. The argument is
//! the event as JSON; the result is a JSON object or array of objects, or
//! null on failure. An optional `readmodel_free_string` releases results.

use async_trait::async_trait;
use libloading::{Library, Symbol};
use readmodel_core::{Event, ProjectorLoader, ReadModelError, Result, Transform, TransformOutput};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_EXPORT: &[u8] = b"readmodel_projector\0";
pub const NAMED_EXPORT: &[u8] = b"project_event\0";
pub const FREE_EXPORT: &[u8] = b"readmodel_free_string\0";

type FnProject = unsafe extern "C" fn(*const c_char) -> *mut c_char;
type FnFree = unsafe extern "C" fn(*mut c_char);

/// Loads projectors from shared libraries.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ProjectorLoader for DylibLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Transform>> {
        if !path.is_file() {
            return Err(ReadModelError::Load(format!(
                "{} does not exist or is not a file",
                path.display()
            )));
        }

        // Safety: running a library's initializers is the point of loading a plugin.
        let lib = unsafe {
            Library::new(path)
                .map_err(|e| ReadModelError::Load(format!("{}: {}", path.display(), e)))?
        };

        let project = resolve_project(&lib).ok_or_else(|| {
            ReadModelError::Load(format!(
                "{} exports neither readmodel_projector nor project_event",
                path.display()
            ))
        })?;
        let free = unsafe { lib.get::<FnFree>(FREE_EXPORT).ok().map(|s: Symbol<FnFree>| *s) };

        tracing::debug!(
            path = %path.display(),
            releases_results = free.is_some(),
            "Loaded projector library"
        );

        Ok(Arc::new(DylibTransform {
            _lib: Some(Arc::new(lib)),
            path: path.to_path_buf(),
            project,
            free,
        }))
    }
}

fn resolve_project(lib: &Library) -> Option<FnProject> {
    // Copy the fn pointer out of the Symbol; the library outlives it via DylibTransform
    pick_export(|name| unsafe { lib.get::<FnProject>(name).ok().map(|s: Symbol<FnProject>| *s) })
}

/// Look up the projection entry point. The default export wins when both
/// are present.
fn pick_export<T>(mut lookup: impl FnMut(&'static [u8]) -> Option<T>) -> Option<T> {
    [DEFAULT_EXPORT, NAMED_EXPORT]
        .into_iter()
        .find_map(|name| lookup(name))
}

#[derive(Clone)]
struct DylibTransform {
    /// `None` when the functions live in this process
    _lib: Option<Arc<Library>>,
    path: PathBuf,
    project: FnProject,
    free: Option<FnFree>,
}

impl DylibTransform {
    fn call(&self, input: &CStr) -> Result<TransformOutput> {
        let raw = unsafe { (self.project)(input.as_ptr()) };
        if raw.is_null() {
            return Err(ReadModelError::Transform(format!(
                "{} returned no result",
                self.path.display()
            )));
        }

        let text = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
        if let Some(free) = self.free {
            unsafe { free(raw) };
        }

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ReadModelError::Transform(format!("projector output is not JSON: {}", e)))?;
        TransformOutput::from_json(value)
    }
}

#[async_trait]
impl Transform for DylibTransform {
    async fn project(&self, event: &Event) -> Result<TransformOutput> {
        let input = CString::new(serde_json::to_string(event)?)
            .map_err(|e| ReadModelError::Transform(e.to_string()))?;

        let this = self.clone();
        tokio::task::spawn_blocking(move || this.call(&input))
            .await
            .map_err(|e| ReadModelError::Transform(format!("projector panicked: {}", e)))?
    }
}
