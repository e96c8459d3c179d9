//! Derived, non-authoritative health view of a subscription's instance.
//!
//! A [`HealthSnapshot`] merges the declared per-service statuses of a
//! [`QosInstance`] with live probe observations. Probes never change the
//! declared status; disagreements are surfaced as [`Discrepancy`] entries
//! for an admin to act on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::instance::{QosInstance, ServiceKind, ServiceStatus};
use super::SubscriptionId;

/// Result of probing one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Observation {
    /// The URL answered.
    Reachable {
        /// Round-trip latency in milliseconds.
        latency_ms: u64,
        /// HTTP status returned.
        status_code: u16,
    },
    /// The URL did not answer, or answered with a server error.
    Unreachable {
        /// Transport or HTTP error description.
        error: String,
    },
    /// The instance has no URL for this service.
    NotConfigured,
    /// This service is not probed directly.
    NotProbed,
}

impl Observation {
    /// Returns `true` for [`Observation::Reachable`].
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }
}

/// Usage counters reported by the tenant backend.
///
/// Tenant backends report these in camelCase; both spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UsageCounters {
    /// Registered staff/customer accounts.
    #[serde(default, alias = "amountUser")]
    pub amount_user: u64,
    /// Configured tables.
    #[serde(default, alias = "amountTable")]
    pub amount_table: u64,
    /// Orders placed.
    #[serde(default, alias = "amountOrder")]
    pub amount_order: u64,
    /// Storage used, in bytes.
    #[serde(default, alias = "usedStorage")]
    pub used_storage: u64,
}

/// Kind of disagreement between declared and observed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Declared ACTIVE but the probe failed.
    DeclaredUpButUnreachable,
    /// Declared INACTIVE or ERROR but the probe succeeded.
    DeclaredDownButReachable,
}

/// A single declared-vs-observed disagreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Discrepancy {
    /// Affected service.
    pub service: ServiceKind,
    /// What disagrees.
    pub kind: DiscrepancyKind,
    /// Persisted status.
    pub declared: ServiceStatus,
    /// Suggested status for an admin to set, if any.
    pub suggested: Option<ServiceStatus>,
}

/// Merged declared + observed view of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceHealth {
    /// Which service.
    pub service: ServiceKind,
    /// Persisted status.
    pub declared: ServiceStatus,
    /// Probe result.
    pub observed: Observation,
}

/// Per-subscription health aggregate. Recomputed on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthSnapshot {
    /// Subscription the snapshot is for.
    pub subscription_id: SubscriptionId,
    /// Whether a live instance exists.
    pub instance_exists: bool,
    /// Worst-of-three declared status, if an instance exists.
    pub overall_status: Option<ServiceStatus>,
    /// Per-service view.
    pub services: Vec<ServiceHealth>,
    /// Declared-vs-observed disagreements.
    pub discrepancies: Vec<Discrepancy>,
    /// Usage counters, if the backend reported them.
    pub usage: Option<UsageCounters>,
    /// When the probes ran.
    pub checked_at: DateTime<Utc>,
}

/// Raw probe results fed into [`HealthSnapshot::merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Frontend probe.
    pub frontend: Observation,
    /// Backend probe.
    pub backend: Observation,
    /// Usage counters from the backend.
    pub usage: Option<UsageCounters>,
}

impl HealthSnapshot {
    /// Snapshot for a subscription without a live instance.
    #[must_use]
    pub fn without_instance(subscription_id: SubscriptionId, checked_at: DateTime<Utc>) -> Self {
        Self {
            subscription_id,
            instance_exists: false,
            overall_status: None,
            services: Vec::new(),
            discrepancies: Vec::new(),
            usage: None,
            checked_at,
        }
    }

    /// Merges declared instance status with probe observations.
    #[must_use]
    pub fn merge(instance: &QosInstance, report: ProbeReport, checked_at: DateTime<Utc>) -> Self {
        let services = vec![
            ServiceHealth {
                service: ServiceKind::Database,
                declared: instance.status_db,
                observed: Observation::NotProbed,
            },
            ServiceHealth {
                service: ServiceKind::Frontend,
                declared: instance.status_fe,
                observed: report.frontend,
            },
            ServiceHealth {
                service: ServiceKind::Backend,
                declared: instance.status_be,
                observed: report.backend,
            },
        ];
        let discrepancies = services.iter().filter_map(discrepancy_for).collect();

        Self {
            subscription_id: instance.subscription_id,
            instance_exists: true,
            overall_status: Some(instance.overall_status()),
            services,
            discrepancies,
            usage: report.usage,
            checked_at,
        }
    }
}

fn discrepancy_for(health: &ServiceHealth) -> Option<Discrepancy> {
    let (kind, suggested) = match (&health.observed, health.declared) {
        (Observation::Unreachable { .. }, ServiceStatus::Active) => (
            DiscrepancyKind::DeclaredUpButUnreachable,
            Some(ServiceStatus::Error),
        ),
        (Observation::Reachable { .. }, ServiceStatus::Inactive | ServiceStatus::Error) => {
            (DiscrepancyKind::DeclaredDownButReachable, None)
        }
        _ => return None,
    };
    Some(Discrepancy {
        service: health.service,
        kind,
        declared: health.declared,
        suggested,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstanceId, UserId};

    fn instance(db: ServiceStatus, fe: ServiceStatus, be: ServiceStatus) -> QosInstance {
        let now = Utc::now();
        QosInstance {
            id: InstanceId::new(),
            subscription_id: SubscriptionId::new(),
            user_id: UserId::new(),
            db_name: None,
            front_end_url: Some("https://fe.example.com".to_string()),
            back_end_url: Some("https://be.example.com".to_string()),
            status_db: db,
            status_fe: fe,
            status_be: be,
            response_time: None,
            uptime: None,
            db_size: None,
            version: None,
            deployed_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            revision: 0,
        }
    }

    fn up() -> Observation {
        Observation::Reachable {
            latency_ms: 42,
            status_code: 200,
        }
    }

    fn down() -> Observation {
        Observation::Unreachable {
            error: "connection refused".to_string(),
        }
    }

    #[test]
    fn healthy_instance_has_no_discrepancies() {
        use ServiceStatus::Active;
        let inst = instance(Active, Active, Active);
        let snapshot = HealthSnapshot::merge(
            &inst,
            ProbeReport {
                frontend: up(),
                backend: up(),
                usage: Some(UsageCounters::default()),
            },
            Utc::now(),
        );
        assert!(snapshot.instance_exists);
        assert_eq!(snapshot.overall_status, Some(Active));
        assert!(snapshot.discrepancies.is_empty());
        assert_eq!(snapshot.services.len(), 3);
    }

    #[test]
    fn unreachable_active_backend_is_flagged_not_changed() {
        use ServiceStatus::Active;
        let inst = instance(Active, Active, Active);
        let snapshot = HealthSnapshot::merge(
            &inst,
            ProbeReport {
                frontend: up(),
                backend: down(),
                usage: None,
            },
            Utc::now(),
        );
        assert_eq!(snapshot.discrepancies.len(), 1);
        let flagged = snapshot.discrepancies.first();
        assert_eq!(flagged.map(|d| d.service), Some(ServiceKind::Backend));
        assert_eq!(flagged.and_then(|d| d.suggested), Some(ServiceStatus::Error));
        // Declared status is advisory input only.
        assert_eq!(snapshot.overall_status, Some(Active));
        assert_eq!(inst.status_be, Active);
    }

    #[test]
    fn reachable_but_declared_inactive_is_flagged() {
        use ServiceStatus::{Active, Inactive};
        let inst = instance(Active, Inactive, Active);
        let snapshot = HealthSnapshot::merge(
            &inst,
            ProbeReport {
                frontend: up(),
                backend: up(),
                usage: None,
            },
            Utc::now(),
        );
        assert_eq!(snapshot.overall_status, Some(Inactive));
        assert_eq!(
            snapshot.discrepancies.first().map(|d| d.kind),
            Some(DiscrepancyKind::DeclaredDownButReachable)
        );
    }

    #[test]
    fn maintenance_and_missing_urls_are_not_discrepancies() {
        use ServiceStatus::{Active, Maintenance};
        let inst = instance(Active, Maintenance, Active);
        let snapshot = HealthSnapshot::merge(
            &inst,
            ProbeReport {
                frontend: down(),
                backend: Observation::NotConfigured,
                usage: None,
            },
            Utc::now(),
        );
        assert!(snapshot.discrepancies.is_empty());
        assert_eq!(snapshot.overall_status, Some(Maintenance));
    }

    #[test]
    fn usage_counters_read_camel_case() {
        let json = r#"{"amountUser":12,"amountTable":30,"amountOrder":4521,"usedStorage":1048576}"#;
        let usage: Option<UsageCounters> = serde_json::from_str(json).ok();
        assert_eq!(usage.map(|u| u.amount_order), Some(4521));
    }
}
