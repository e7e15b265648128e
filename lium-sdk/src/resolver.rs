use crate::catalog::Catalog;
use crate::error::{LiumError, Result};
use lium_common::Pod;

/// A pod given either as an already-fetched record or as an id, name or HUID.
#[derive(Debug, Clone, PartialEq)]
pub enum PodRef {
    Id(String),
    Pod(Pod),
}

impl PodRef {
    /// Human-readable name for log lines and error messages.
    pub fn label(&self) -> &str {
        match self {
            PodRef::Id(id) => id,
            PodRef::Pod(pod) if !pod.name.is_empty() => &pod.name,
            PodRef::Pod(pod) => &pod.id,
        }
    }

    /// Stable key for results: the pod id once resolved, otherwise the raw input.
    pub fn identifier(&self) -> &str {
        match self {
            PodRef::Id(id) => id,
            PodRef::Pod(pod) => &pod.id,
        }
    }
}

impl From<&str> for PodRef {
    fn from(s: &str) -> Self {
        PodRef::Id(s.to_string())
    }
}

impl From<String> for PodRef {
    fn from(s: String) -> Self {
        PodRef::Id(s)
    }
}

impl From<&String> for PodRef {
    fn from(s: &String) -> Self {
        PodRef::Id(s.clone())
    }
}

impl From<Pod> for PodRef {
    fn from(pod: Pod) -> Self {
        PodRef::Pod(pod)
    }
}

impl From<&Pod> for PodRef {
    fn from(pod: &Pod) -> Self {
        PodRef::Pod(pod.clone())
    }
}

#[derive(Clone)]
pub struct PodResolver {
    catalog: Catalog,
}

impl PodResolver {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// Cache first, then one live refresh, then `NotFound`.
    pub async fn resolve(&self, target: impl Into<PodRef>) -> Result<Pod> {
        let key = match target.into() {
            PodRef::Pod(pod) => return Ok(pod),
            PodRef::Id(key) => key,
        };
        let key = key.trim();

        if let Some(pod) = self.catalog.cache().get(key) {
            return Ok(pod);
        }

        tracing::debug!("[resolver] cache miss for '{}', refreshing pod list", key);
        self.catalog.list_pods().await?;
        self.catalog
            .cache()
            .get(key)
            .ok_or_else(|| LiumError::NotFound(format!("pod '{}'", key)))
    }

    /// Live lookup by pod name or HUID, bypassing the cache.
    pub async fn pod_by_name(&self, name: &str) -> Result<Pod> {
        let name = name.trim();
        self.catalog
            .list_pods()
            .await?
            .into_iter()
            .find(|p| p.name == name || p.huid == name)
            .ok_or_else(|| LiumError::NotFound(format!("pod '{}'", name)))
    }
}
