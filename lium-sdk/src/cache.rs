use lium_common::Pod;
use std::collections::HashMap;
use std::sync::RwLock;

/// Last observed pod listing, indexed by id, name and HUID.
///
/// Every refresh replaces the whole index; readers never see a mix of two
/// listings.
#[derive(Debug, Default)]
pub struct PodCache {
    index: RwLock<HashMap<String, Pod>>,
}

impl PodCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, pods: &[Pod]) {
        let mut index = HashMap::with_capacity(pods.len() * 3);
        for pod in pods {
            for key in [&pod.id, &pod.name, &pod.huid] {
                if !key.is_empty() {
                    index.insert(key.clone(), pod.clone());
                }
            }
        }
        // A poisoned lock only means a writer panicked mid-swap of a plain map.
        let mut guard = self.index.write().unwrap_or_else(|e| e.into_inner());
        *guard = index;
    }

    pub fn get(&self, key: &str) -> Option<Pod> {
        let guard = self.index.read().unwrap_or_else(|e| e.into_inner());
        guard.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lium_common::{RawPod, generate_huid};

    fn pod(id: &str, name: &str) -> Pod {
        Pod::from(RawPod {
            id: id.to_string(),
            pod_name: name.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn indexes_every_alias() {
        let cache = PodCache::new();
        cache.replace(&[pod("p-1", "trainer")]);
        let huid = generate_huid("p-1");
        for key in ["p-1", "trainer", huid.as_str()] {
            assert_eq!(cache.get(key).map(|p| p.id), Some("p-1".to_string()));
        }
    }

    #[test]
    fn replace_drops_stale_entries() {
        let cache = PodCache::new();
        cache.replace(&[pod("p-1", "a")]);
        cache.replace(&[pod("p-2", "b")]);
        assert!(cache.get("p-1").is_none());
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn empty_names_are_not_keys() {
        let cache = PodCache::new();
        cache.replace(&[pod("p-1", "")]);
        assert!(cache.get("").is_none());
    }
}
