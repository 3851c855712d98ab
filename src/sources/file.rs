//! File source: instances loaded through any location spec.
//!
//! Despite the name, the path accepts every registered loader protocol,
//! so HTTP- or object-store-backed instance lists come for free:
//!
//! ```yaml
//! sources:
//!   - type: file
//!     config:
//!       path: file:///tmp/instances.yaml
//!   - type: file
//!     scope: clusters
//!     config:
//!       path: https+json://config.internal/instances.json
//! ```

use async_trait::async_trait;

use super::{instances_from_value, Instance, Source, SourceError};
use crate::config::loader::Loadable;

pub struct FileSource {
    spec: Loadable,
}

impl FileSource {
    pub fn new(config: &serde_json::Value) -> Result<Self, SourceError> {
        let path = config
            .get("path")
            .and_then(|p| p.as_str())
            .ok_or_else(|| SourceError::new("file", "config must contain a string \"path\""))?;
        let spec = Loadable::from_compact(path)
            .map_err(|e| SourceError::new("file", e.to_string()))?;
        Ok(Self { spec })
    }
}

#[async_trait]
impl Source for FileSource {
    async fn get(&self) -> Result<Vec<Instance>, SourceError> {
        let value = self
            .spec
            .load()
            .await
            .and_then(|v| v.into_structured())
            .map_err(|e| SourceError::new(self.spec.to_string(), e.to_string()))?;
        instances_from_value(&self.spec.to_string(), value)
    }
}
