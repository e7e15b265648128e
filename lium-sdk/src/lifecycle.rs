use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{LiumError, Result};
use crate::resolver::{PodRef, PodResolver};
use crate::transport::HttpTransport;
use lium_common::{Pod, Provisioned, RawPod};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Polling and settle delays used while pods come up.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleTimings {
    /// Between `GET /pods/{id}` polls in `retrieve`.
    pub poll_interval: Duration,
    /// Between pod listings in `wait_ready`.
    pub ready_check_interval: Duration,
    /// Before the first pod listing when a rent response has no id.
    pub settle_delay: Duration,
    /// Before the second, last pod listing.
    pub settle_retry_delay: Duration,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            ready_check_interval: Duration::from_secs(10),
            settle_delay: Duration::from_secs(3),
            settle_retry_delay: Duration::from_secs(2),
        }
    }
}

fn rent_payload(name: &str, template_id: &str, public_keys: &[String]) -> Value {
    json!({
        "pod_name": name,
        "template_id": template_id,
        "user_public_key": public_keys,
    })
}

/// The pod record embedded in a rent response, if there is one.
fn pod_from_rent_response(response: &Value) -> Option<Pod> {
    let id = response.get("id").and_then(Value::as_str)?;
    if id.is_empty() {
        return None;
    }
    serde_json::from_value::<RawPod>(response.clone())
        .ok()
        .map(Pod::from)
}

fn rent_response_id(response: &Value) -> Option<&str> {
    response
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

pub struct Lifecycle {
    transport: Arc<HttpTransport>,
    catalog: Catalog,
    resolver: PodResolver,
    config: Config,
    timings: LifecycleTimings,
}

impl Lifecycle {
    pub fn new(
        transport: Arc<HttpTransport>,
        catalog: Catalog,
        resolver: PodResolver,
        config: Config,
        timings: LifecycleTimings,
    ) -> Self {
        Self {
            transport,
            catalog,
            resolver,
            config,
            timings,
        }
    }

    async fn rent(&self, executor_id: &str, payload: &Value) -> Result<Value> {
        let pod_name = payload.get("pod_name").and_then(Value::as_str).unwrap_or_default();
        tracing::info!("[lifecycle] renting executor {} as '{}'", executor_id, pod_name);
        self.transport
            .post(&format!("/executors/{}/rent", executor_id), payload)
            .await
    }

    /// Rent `executor_id` and return the resulting pod.
    pub async fn create(
        &self,
        executor_id: &str,
        name: &str,
        template_id: &str,
        public_keys: &[String],
    ) -> Result<Pod> {
        let response = self
            .rent(executor_id, &rent_payload(name, template_id, public_keys))
            .await?;

        if let Some(id) = rent_response_id(&response) {
            return self.retrieve(id, false, Duration::ZERO).await;
        }

        self.catalog
            .list_pods()
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| LiumError::NotFound(format!("pod '{}'", name)))
    }

    /// Fetch a pod, optionally polling until it reports RUNNING.
    ///
    /// On timeout the last observed pod is returned, not an error.
    pub async fn retrieve(&self, pod_id: &str, wait_until_running: bool, timeout: Duration) -> Result<Pod> {
        let interval = self.timings.poll_interval;
        let mut elapsed = Duration::ZERO;
        loop {
            let pod = self.catalog.retrieve_pod(pod_id).await?;
            if !wait_until_running || pod.is_running() || interval.is_zero() || timeout.is_zero() {
                return Ok(pod);
            }
            tracing::debug!(
                "[lifecycle] pod {} status={}, elapsed={:?}",
                pod_id,
                pod.status,
                elapsed
            );
            tokio::time::sleep(interval).await;
            elapsed += interval;
            if elapsed >= timeout {
                tracing::warn!(
                    "[lifecycle] pod {} still {} after {:?}, giving up",
                    pod_id,
                    pod.status,
                    timeout
                );
                return Ok(pod);
            }
        }
    }

    /// Release the rental on `executor_id`.
    pub async fn delete(&self, executor_id: &str) -> Result<()> {
        tracing::info!("[lifecycle] releasing executor {}", executor_id);
        self.transport
            .delete(&format!("/executors/{}/rent", executor_id))
            .await?;
        Ok(())
    }

    /// Release the rental behind a pod.
    pub async fn down(&self, target: impl Into<PodRef>) -> Result<()> {
        let pod = self.resolver.resolve(target).await?;
        let executor_id = pod
            .executor_id()
            .ok_or_else(|| LiumError::NotFound(format!("executor for pod '{}'", pod.name)))?;
        self.delete(executor_id).await
    }

    /// Rent an executor with sensible defaults.
    ///
    /// When the API does not echo the new pod, the pod list is checked twice
    /// after short settle delays; if the pod still cannot be seen the result is
    /// a [`Provisioned::Placeholder`].
    pub async fn up(
        &self,
        executor_id: &str,
        name: Option<&str>,
        template_id: Option<&str>,
        public_keys: Option<Vec<String>>,
    ) -> Result<Provisioned> {
        let template_id = match template_id {
            Some(id) => id.to_string(),
            None => self
                .catalog
                .list_templates()
                .await?
                .into_iter()
                .next()
                .map(|t| t.id)
                .ok_or_else(|| LiumError::NotFound("template".to_string()))?,
        };

        let public_keys = match public_keys.filter(|k| !k.is_empty()) {
            Some(keys) => keys,
            None => {
                let keys = self.config.public_keys();
                if keys.is_empty() {
                    return Err(LiumError::configuration(
                        "no SSH public keys found",
                        "set LIUM_SSH_KEY_PATH or [ssh] key_path to a key with a matching .pub file",
                    ));
                }
                keys
            }
        };

        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("lium-pod-{}", Uuid::new_v4()));

        let snapshot: HashMap<String, String> = self
            .catalog
            .list_pods()
            .await?
            .into_iter()
            .map(|p| (p.name, p.id))
            .collect();

        let response = self
            .rent(executor_id, &rent_payload(&name, &template_id, &public_keys))
            .await?;
        if let Some(pod) = pod_from_rent_response(&response) {
            return Ok(Provisioned::Confirmed(pod));
        }

        tokio::time::sleep(self.timings.settle_delay).await;
        if let Some(pod) = self
            .find_listed(|p| p.name == name && !snapshot.contains_key(&p.name))
            .await
        {
            return Ok(Provisioned::Confirmed(pod));
        }

        tokio::time::sleep(self.timings.settle_retry_delay).await;
        if let Some(pod) = self.find_listed(|p| p.name == name).await {
            return Ok(Provisioned::Confirmed(pod));
        }

        tracing::warn!(
            "[lifecycle] pod '{}' on executor {} not visible yet, returning placeholder",
            name,
            executor_id
        );
        Ok(Provisioned::Placeholder {
            name,
            executor_id: executor_id.to_string(),
        })
    }

    // Listing failures here only mean "not seen yet".
    async fn find_listed<F>(&self, pred: F) -> Option<Pod>
    where
        F: Fn(&Pod) -> bool,
    {
        match self.catalog.list_pods().await {
            Ok(pods) => pods.into_iter().find(|p| pred(p)),
            Err(e) => {
                tracing::warn!("[lifecycle] pod listing failed while settling: {}", e);
                None
            }
        }
    }

    /// Poll until the pod is RUNNING with an SSH command; `None` on timeout.
    ///
    /// An id, name or HUID that is not listed yet is waited for like any
    /// other not-ready pod.
    pub async fn wait_ready(&self, target: impl Into<PodRef>, timeout: Duration) -> Result<Option<Pod>> {
        let target = target.into();
        let key = target.identifier().trim().to_string();
        let by_id = matches!(target, PodRef::Pod(_));
        let interval = self.timings.ready_check_interval;
        let mut elapsed = Duration::ZERO;
        while elapsed < timeout {
            let current = self
                .catalog
                .list_pods()
                .await?
                .into_iter()
                .find(|p| p.id == key || (!by_id && (p.name == key || p.huid == key)));
            match current {
                Some(pod) if pod.is_ready() => {
                    tracing::info!("[lifecycle] pod {} ready", key);
                    return Ok(Some(pod));
                }
                Some(pod) => tracing::debug!("[lifecycle] pod {} status={}", key, pod.status),
                None => tracing::debug!("[lifecycle] pod {} not listed yet", key),
            }
            if interval.is_zero() {
                break;
            }
            tokio::time::sleep(interval).await;
            elapsed += interval;
        }
        tracing::warn!("[lifecycle] pod {} not ready after {:?}", key, timeout);
        Ok(None)
    }
}
