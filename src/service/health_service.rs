//! Health reconciler: live probes merged with declared instance status.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{
    Actor, HealthSnapshot, Observation, ProbeReport, QosInstance, SubscriptionId, UsageCounters,
};
use crate::error::PlatformError;
use crate::persistence::LifecycleStore;

/// Path of the usage endpoint on a tenant backend.
pub const USAGE_PATH: &str = "/api/v1/usage";

/// Reachability and usage checks against a tenant's public URLs.
#[async_trait]
pub trait HealthProbe: Send + Sync + Debug {
    /// Requests `url` once and reports what happened.
    async fn probe(&self, url: &str) -> Observation;

    /// Reads usage counters from a tenant backend, if it reports them.
    async fn usage(&self, back_end_url: &str) -> Option<UsageCounters>;
}

/// [`HealthProbe`] over plain HTTP GET requests.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: reqwest::Client,
}

impl HttpProbe {
    /// Builds a probe whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Internal`] if the HTTP client cannot be
    /// constructed.
    pub fn new(timeout: Duration) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Internal(format!("http client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Observation {
        let started = Instant::now();
        match self.http.get(url).send().await {
            Ok(resp) if resp.status().is_server_error() => Observation::Unreachable {
                error: format!("HTTP {}", resp.status()),
            },
            Ok(resp) => Observation::Reachable {
                latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                status_code: resp.status().as_u16(),
            },
            Err(e) => Observation::Unreachable {
                error: e.to_string(),
            },
        }
    }

    async fn usage(&self, back_end_url: &str) -> Option<UsageCounters> {
        let url = format!("{}{USAGE_PATH}", back_end_url.trim_end_matches('/'));
        let resp = match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::debug!(%url, status = %resp.status(), "usage endpoint unavailable");
                return None;
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "usage request failed");
                return None;
            }
        };
        resp.json::<UsageCounters>()
            .await
            .inspect_err(|e| tracing::debug!(%url, error = %e, "usage body unreadable"))
            .ok()
    }
}

/// Response of [`HealthService::get_health`].
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HealthReport {
    /// The live instance, or `null` if none is provisioned.
    pub qos_instance: Option<QosInstance>,
    /// Derived health view.
    pub health_check: HealthSnapshot,
}

/// Read-only health queries. Never writes instance status.
#[derive(Debug, Clone)]
pub struct HealthService {
    store: Arc<dyn LifecycleStore>,
    probe: Arc<dyn HealthProbe>,
}

impl HealthService {
    /// Creates a new `HealthService`.
    #[must_use]
    pub fn new(store: Arc<dyn LifecycleStore>, probe: Arc<dyn HealthProbe>) -> Self {
        Self { store, probe }
    }

    /// Probes the instance of a subscription the actor may see.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NotFound`] if the subscription is missing
    /// or not visible to the actor.
    pub async fn get_health(
        &self,
        actor: &Actor,
        subscription_id: SubscriptionId,
    ) -> Result<HealthReport, PlatformError> {
        match self.store.get_subscription(subscription_id).await? {
            Some(sub) if actor.can_access(sub.user_id) => {}
            _ => return Err(PlatformError::not_found("subscription", subscription_id)),
        }

        let Some(instance) = self
            .store
            .find_instance_by_subscription(subscription_id)
            .await?
        else {
            return Ok(HealthReport {
                qos_instance: None,
                health_check: HealthSnapshot::without_instance(subscription_id, Utc::now()),
            });
        };

        let report = self.probe_instance(&instance).await;
        let snapshot = HealthSnapshot::merge(&instance, report, Utc::now());
        if !snapshot.discrepancies.is_empty() {
            tracing::info!(
                %subscription_id,
                discrepancies = snapshot.discrepancies.len(),
                "declared status disagrees with probes"
            );
        }
        Ok(HealthReport {
            qos_instance: Some(instance),
            health_check: snapshot,
        })
    }

    async fn probe_instance(&self, instance: &QosInstance) -> ProbeReport {
        let frontend = self.observe(instance.front_end_url.as_deref());
        let backend = self.observe(instance.back_end_url.as_deref());
        let usage = async {
            match instance.back_end_url.as_deref() {
                Some(url) => self.probe.usage(url).await,
                None => None,
            }
        };
        let (frontend, backend, usage) = tokio::join!(frontend, backend, usage);
        ProbeReport {
            frontend,
            backend,
            usage,
        }
    }

    async fn observe(&self, url: Option<&str>) -> Observation {
        match url {
            Some(url) => self.probe.probe(url).await,
            None => Observation::NotConfigured,
        }
    }
}
