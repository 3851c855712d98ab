//! Inline source: instances supplied directly in configuration.
//!
//! ```yaml
//! sources:
//!   - type: inline
//!     config:
//!       instances:
//!         - name: my_service
//!           service_clusters: [P2]
//! ```

use async_trait::async_trait;

use super::{instances_from_value, Instance, Source, SourceError};

pub struct InlineSource {
    instances: Vec<Instance>,
}

impl InlineSource {
    pub fn new(config: &serde_json::Value) -> Result<Self, SourceError> {
        let instances = config
            .get("instances")
            .cloned()
            .ok_or_else(|| SourceError::new("inline", "config must contain \"instances\""))?;
        Ok(Self {
            instances: instances_from_value("inline", instances)?,
        })
    }
}

#[async_trait]
impl Source for InlineSource {
    async fn get(&self) -> Result<Vec<Instance>, SourceError> {
        Ok(self.instances.clone())
    }
}
