use crate::cache::PodCache;
use crate::error::{LiumError, Result};
use crate::transport::HttpTransport;
use lium_common::{gpu_type_matches, parse_gpu_types, Executor, Pod, RawExecutor, RawPod, Template};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Price,
    GpuCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Client-side machine query. Unset bounds do not filter.
#[derive(Debug, Clone, Default)]
pub struct MachineFilter {
    /// Comma-separated GPU types, e.g. `"H100,A100"`.
    pub gpu_types: Option<String>,
    pub min_gpu_count: Option<u32>,
    pub max_gpu_count: Option<u32>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort_by: SortBy,
    pub order: SortOrder,
}

impl MachineFilter {
    pub fn matches(&self, executor: &Executor) -> bool {
        let wanted = self
            .gpu_types
            .as_deref()
            .map(parse_gpu_types)
            .unwrap_or_default();
        gpu_type_matches(&executor.gpu_type, &wanted)
            && self.min_gpu_count.map_or(true, |n| executor.gpu_count >= n)
            && self.max_gpu_count.map_or(true, |n| executor.gpu_count <= n)
            && self.min_price.map_or(true, |p| executor.price_per_hour >= p)
            && self.max_price.map_or(true, |p| executor.price_per_hour <= p)
    }

    /// Filter and sort. The sort is stable, so ties keep API order.
    pub fn apply(&self, executors: Vec<Executor>) -> Vec<Executor> {
        let mut out: Vec<Executor> = executors.into_iter().filter(|e| self.matches(e)).collect();
        out.sort_by(|a, b| {
            let ord = match self.sort_by {
                SortBy::Price => a
                    .price_per_hour
                    .partial_cmp(&b.price_per_hour)
                    .unwrap_or(Ordering::Equal),
                SortBy::GpuCount => a.gpu_count.cmp(&b.gpu_count),
            };
            match self.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        out
    }
}

/// Read-only views of the fleet: executors, pods and templates.
#[derive(Clone)]
pub struct Catalog {
    transport: Arc<HttpTransport>,
    cache: Arc<PodCache>,
}

impl Catalog {
    pub fn new(transport: Arc<HttpTransport>, cache: Arc<PodCache>) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &PodCache {
        &self.cache
    }

    pub async fn list_executors(&self) -> Result<Vec<Executor>> {
        let raw: Option<Vec<RawExecutor>> = self.transport.get("/executors").await?;
        let executors: Vec<Executor> = raw.unwrap_or_default().into_iter().map(Executor::from).collect();
        tracing::debug!("[catalog] {} executors available", executors.len());
        Ok(executors)
    }

    /// Live pod listing; also refreshes the pod cache.
    pub async fn list_pods(&self) -> Result<Vec<Pod>> {
        let raw: Option<Vec<RawPod>> = self.transport.get("/pods").await?;
        let pods: Vec<Pod> = raw.unwrap_or_default().into_iter().map(Pod::from).collect();
        self.cache.replace(&pods);
        tracing::debug!("[catalog] {} pods listed", pods.len());
        Ok(pods)
    }

    pub async fn list_templates(&self) -> Result<Vec<Template>> {
        let raw: Option<Vec<Template>> = self.transport.get("/templates").await?;
        Ok(raw.unwrap_or_default())
    }

    pub async fn retrieve_pod(&self, pod_id: &str) -> Result<Pod> {
        let raw: Option<RawPod> = self.transport.get(&format!("/pods/{}", pod_id)).await?;
        raw.map(Pod::from)
            .ok_or_else(|| LiumError::NotFound(format!("pod '{}'", pod_id)))
    }

    pub async fn list_executors_by_gpu(&self, gpu_type: &str) -> Result<Vec<Executor>> {
        let executors = self.list_executors().await?;
        Ok(executors
            .into_iter()
            .filter(|e| e.gpu_type.eq_ignore_ascii_case(gpu_type.trim()))
            .collect())
    }

    pub async fn list_machines(&self, filter: &MachineFilter) -> Result<Vec<Executor>> {
        Ok(filter.apply(self.list_executors().await?))
    }

    /// Distinct GPU types currently on offer, sorted.
    pub async fn gpu_types(&self) -> Result<Vec<String>> {
        let types: BTreeSet<String> = self
            .list_executors()
            .await?
            .into_iter()
            .map(|e| e.gpu_type)
            .collect();
        Ok(types.into_iter().collect())
    }

    pub async fn executor_by_huid(&self, huid: &str) -> Result<Executor> {
        self.list_executors()
            .await?
            .into_iter()
            .find(|e| e.huid == huid)
            .ok_or_else(|| LiumError::NotFound(format!("executor '{}'", huid)))
    }
}
