//! Provisioned runtime instance (frontend, backend, database) of a
//! subscription, with its per-service status machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{InstanceId, SubscriptionId, UserId};
use crate::error::{ExistingInstance, PlatformError};

/// Status of one service (database, frontend or backend) of an instance.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    /// Not deployed.
    #[default]
    Inactive,
    /// Serving traffic.
    Active,
    /// Deliberately taken down for maintenance.
    Maintenance,
    /// Deployment in progress.
    Deploying,
    /// Failed.
    Error,
}

impl ServiceStatus {
    /// All statuses.
    pub const ALL: [Self; 5] = [
        Self::Inactive,
        Self::Active,
        Self::Maintenance,
        Self::Deploying,
        Self::Error,
    ];

    /// Display severity: ERROR > MAINTENANCE > DEPLOYING > INACTIVE > ACTIVE.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Inactive => 1,
            Self::Deploying => 2,
            Self::Maintenance => 3,
            Self::Error => 4,
        }
    }

    /// Returns `true` if a single service may move from `self` to `to`.
    ///
    /// INACTIVE→DEPLOYING→ACTIVE is the deploy path; MAINTENANCE and ERROR
    /// are reachable from ACTIVE or DEPLOYING, and recover through
    /// DEPLOYING.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Inactive, Self::Deploying)
                | (Self::Deploying, Self::Active)
                | (
                    Self::Active | Self::Deploying,
                    Self::Maintenance | Self::Error
                )
                | (Self::Error | Self::Maintenance, Self::Deploying)
        )
    }

    /// Wire name (`"ACTIVE"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Active => "ACTIVE",
            Self::Maintenance => "MAINTENANCE",
            Self::Deploying => "DEPLOYING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PlatformError::Validation(format!("unknown service status: {s}")))
    }
}

/// Aggregated display status across the three services.
///
/// ACTIVE only when every service is ACTIVE; otherwise the most severe
/// non-ACTIVE status present.
#[must_use]
pub fn overall_status(statuses: [ServiceStatus; 3]) -> ServiceStatus {
    statuses
        .into_iter()
        .max_by_key(|s| s.severity())
        .unwrap_or(ServiceStatus::Active)
}

/// One of the three services making up an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// The tenant database.
    Database,
    /// The customer-facing frontend.
    Frontend,
    /// The ordering backend.
    Backend,
}

impl ServiceKind {
    /// All services, in display order.
    pub const ALL: [Self; 3] = [Self::Database, Self::Frontend, Self::Backend];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Frontend => "frontend",
            Self::Backend => "backend",
        }
    }
}

impl FromStr for ServiceKind {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database" | "db" => Ok(Self::Database),
            "frontend" | "fe" => Ok(Self::Frontend),
            "backend" | "be" => Ok(Self::Backend),
            other => Err(PlatformError::Validation(format!("unknown service: {other}"))),
        }
    }
}

/// Whole-instance status operations applied to all three services at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    /// Every service to DEPLOYING.
    DeployAll,
    /// Every service to ACTIVE.
    ActivateAll,
    /// Every service to MAINTENANCE.
    MaintenanceAll,
}

impl BulkAction {
    /// Target status of the action.
    #[must_use]
    pub const fn target(self) -> ServiceStatus {
        match self {
            Self::DeployAll => ServiceStatus::Deploying,
            Self::ActivateAll => ServiceStatus::Active,
            Self::MaintenanceAll => ServiceStatus::Maintenance,
        }
    }
}

/// Provisioned runtime for one subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QosInstance {
    /// Instance identifier.
    pub id: InstanceId,
    /// Owning subscription (unique among live instances).
    pub subscription_id: SubscriptionId,
    /// Owner, copied from the subscription.
    pub user_id: UserId,
    /// Tenant database name.
    pub db_name: Option<String>,
    /// Public frontend URL.
    pub front_end_url: Option<String>,
    /// Backend base URL.
    pub back_end_url: Option<String>,
    /// Database service status.
    pub status_db: ServiceStatus,
    /// Frontend service status.
    pub status_fe: ServiceStatus,
    /// Backend service status.
    pub status_be: ServiceStatus,
    /// Last recorded response time in milliseconds.
    pub response_time: Option<u32>,
    /// Last recorded uptime percentage.
    pub uptime: Option<f64>,
    /// Database size in bytes.
    pub db_size: Option<u64>,
    /// Deployed application version.
    pub version: Option<String>,
    /// Time of the last deployment.
    pub deployed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency counter, bumped on every write.
    pub revision: u64,
}

impl QosInstance {
    /// Returns `true` once soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Status of a single service.
    #[must_use]
    pub const fn service_status(&self, service: ServiceKind) -> ServiceStatus {
        match service {
            ServiceKind::Database => self.status_db,
            ServiceKind::Frontend => self.status_fe,
            ServiceKind::Backend => self.status_be,
        }
    }

    /// Sets the status of a single service without validation.
    pub fn set_service_status(&mut self, service: ServiceKind, status: ServiceStatus) {
        match service {
            ServiceKind::Database => self.status_db = status,
            ServiceKind::Frontend => self.status_fe = status,
            ServiceKind::Backend => self.status_be = status,
        }
    }

    /// Sets every service to the same status.
    pub fn set_all(&mut self, status: ServiceStatus) {
        self.status_db = status;
        self.status_fe = status;
        self.status_be = status;
    }

    /// Aggregated status across the three services.
    #[must_use]
    pub fn overall_status(&self) -> ServiceStatus {
        overall_status([self.status_db, self.status_fe, self.status_be])
    }

    /// Conflict diagnostic for a rejected duplicate creation.
    #[must_use]
    pub fn as_existing(&self) -> ExistingInstance {
        ExistingInstance {
            instance_id: self.id,
            db_name: self.db_name.clone(),
            front_end_url: self.front_end_url.clone(),
            back_end_url: self.back_end_url.clone(),
        }
    }
}

/// Partial instance update. `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InstancePatch {
    /// New database name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    /// New frontend URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_end_url: Option<String>,
    /// New backend URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_end_url: Option<String>,
    /// New database status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_db: Option<ServiceStatus>,
    /// New frontend status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_fe: Option<ServiceStatus>,
    /// New backend status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_be: Option<ServiceStatus>,
    /// New response time (ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u32>,
    /// New uptime percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<f64>,
    /// New database size (bytes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_size: Option<u64>,
    /// New application version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// New deployment time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
}

/// Keeps `new` only if it differs from `current`.
fn changed<T: PartialEq + Clone>(new: Option<&T>, current: Option<&T>) -> Option<T> {
    new.filter(|n| Some(*n) != current).cloned()
}

impl InstancePatch {
    /// Returns the subset of this patch that actually differs from
    /// `current`.
    #[must_use]
    pub fn diff(&self, current: &QosInstance) -> Self {
        Self {
            db_name: changed(self.db_name.as_ref(), current.db_name.as_ref()),
            front_end_url: changed(self.front_end_url.as_ref(), current.front_end_url.as_ref()),
            back_end_url: changed(self.back_end_url.as_ref(), current.back_end_url.as_ref()),
            status_db: changed(self.status_db.as_ref(), Some(&current.status_db)),
            status_fe: changed(self.status_fe.as_ref(), Some(&current.status_fe)),
            status_be: changed(self.status_be.as_ref(), Some(&current.status_be)),
            response_time: changed(self.response_time.as_ref(), current.response_time.as_ref()),
            uptime: changed(self.uptime.as_ref(), current.uptime.as_ref()),
            db_size: changed(self.db_size.as_ref(), current.db_size.as_ref()),
            version: changed(self.version.as_ref(), current.version.as_ref()),
            deployed_at: changed(self.deployed_at.as_ref(), current.deployed_at.as_ref()),
        }
    }

    /// Names of the fields this patch sets.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let mut push = |set: bool, name: &'static str| {
            if set {
                fields.push(name);
            }
        };
        push(self.db_name.is_some(), "db_name");
        push(self.front_end_url.is_some(), "front_end_url");
        push(self.back_end_url.is_some(), "back_end_url");
        push(self.status_db.is_some(), "status_db");
        push(self.status_fe.is_some(), "status_fe");
        push(self.status_be.is_some(), "status_be");
        push(self.response_time.is_some(), "response_time");
        push(self.uptime.is_some(), "uptime");
        push(self.db_size.is_some(), "db_size");
        push(self.version.is_some(), "version");
        push(self.deployed_at.is_some(), "deployed_at");
        fields
    }

    /// Returns `true` if the patch sets nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    /// Checks URL shape and metric ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Validation`] on a malformed field.
    pub fn validate(&self) -> Result<(), PlatformError> {
        validate_url("front_end_url", self.front_end_url.as_deref())?;
        validate_url("back_end_url", self.back_end_url.as_deref())?;
        if let Some(name) = self.db_name.as_deref() {
            validate_db_name(name)?;
        }
        if let Some(uptime) = self.uptime
            && !(0.0..=100.0).contains(&uptime)
        {
            return Err(PlatformError::Validation(format!(
                "uptime must be between 0 and 100, got {uptime}"
            )));
        }
        Ok(())
    }

    /// Writes every set field into `instance`.
    pub fn apply_to(&self, instance: &mut QosInstance) {
        if let Some(v) = &self.db_name {
            instance.db_name = Some(v.clone());
        }
        if let Some(v) = &self.front_end_url {
            instance.front_end_url = Some(v.clone());
        }
        if let Some(v) = &self.back_end_url {
            instance.back_end_url = Some(v.clone());
        }
        if let Some(v) = self.status_db {
            instance.status_db = v;
        }
        if let Some(v) = self.status_fe {
            instance.status_fe = v;
        }
        if let Some(v) = self.status_be {
            instance.status_be = v;
        }
        if let Some(v) = self.response_time {
            instance.response_time = Some(v);
        }
        if let Some(v) = self.uptime {
            instance.uptime = Some(v);
        }
        if let Some(v) = self.db_size {
            instance.db_size = Some(v);
        }
        if let Some(v) = &self.version {
            instance.version = Some(v.clone());
        }
        if let Some(v) = self.deployed_at {
            instance.deployed_at = Some(v);
        }
    }
}

/// Checks that an optional URL is absolute http(s).
///
/// # Errors
///
/// Returns [`PlatformError::Validation`] otherwise.
pub fn validate_url(field: &str, url: Option<&str>) -> Result<(), PlatformError> {
    match url {
        Some(u) if !(u.starts_with("http://") || u.starts_with("https://")) => Err(
            PlatformError::Validation(format!("{field} must be an http(s) URL: {u}")),
        ),
        _ => Ok(()),
    }
}

/// Database names are lowercase identifiers, at most 63 bytes.
///
/// # Errors
///
/// Returns [`PlatformError::Validation`] otherwise.
pub fn validate_db_name(name: &str) -> Result<(), PlatformError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PlatformError::Validation(format!("invalid db_name: {name}")))
    }
}

/// Default tenant database name for a subscription.
#[must_use]
pub fn default_db_name(subscription_id: SubscriptionId) -> String {
    let simple = subscription_id.as_uuid().simple().to_string();
    format!("qos_{}", simple.get(..12).unwrap_or(&simple))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn instance() -> QosInstance {
        let now = Utc::now();
        QosInstance {
            id: InstanceId::new(),
            subscription_id: SubscriptionId::new(),
            user_id: UserId::new(),
            db_name: Some("qos_pho24".to_string()),
            front_end_url: Some("https://pho24.example.com".to_string()),
            back_end_url: Some("https://api.pho24.example.com".to_string()),
            status_db: ServiceStatus::Active,
            status_fe: ServiceStatus::Active,
            status_be: ServiceStatus::Active,
            response_time: Some(120),
            uptime: Some(99.9),
            db_size: None,
            version: Some("1.4.0".to_string()),
            deployed_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            revision: 0,
        }
    }

    #[test]
    fn overall_is_active_only_when_all_active() {
        use ServiceStatus::*;
        assert_eq!(overall_status([Active, Active, Active]), Active);
        assert_eq!(overall_status([Active, Inactive, Active]), Inactive);
        assert_eq!(overall_status([Deploying, Inactive, Active]), Deploying);
        assert_eq!(overall_status([Deploying, Maintenance, Inactive]), Maintenance);
        assert_eq!(overall_status([Maintenance, Error, Active]), Error);
    }

    #[test]
    fn service_transitions_follow_deploy_path() {
        use ServiceStatus::*;
        assert!(Inactive.can_transition_to(Deploying));
        assert!(!Inactive.can_transition_to(Active));
        assert!(Deploying.can_transition_to(Active));
        assert!(Active.can_transition_to(Maintenance));
        assert!(Deploying.can_transition_to(Error));
        assert!(Error.can_transition_to(Deploying));
        assert!(!Error.can_transition_to(Active));
        assert!(Maintenance.can_transition_to(Deploying));
        assert!(!Maintenance.can_transition_to(Active));
        assert!(!Inactive.can_transition_to(Error));
    }

    #[test]
    fn diff_keeps_only_changed_fields() {
        let current = instance();
        let patch = InstancePatch {
            db_name: current.db_name.clone(),
            front_end_url: Some("https://new.pho24.example.com".to_string()),
            status_db: Some(ServiceStatus::Active),
            status_be: Some(ServiceStatus::Maintenance),
            uptime: Some(99.9),
            ..InstancePatch::default()
        };
        let diff = patch.diff(&current);
        assert_eq!(diff.field_names(), vec!["front_end_url", "status_be"]);
    }

    #[test]
    fn identical_patch_diffs_to_empty() {
        let current = instance();
        let patch = InstancePatch {
            version: current.version.clone(),
            status_fe: Some(current.status_fe),
            ..InstancePatch::default()
        };
        assert!(patch.diff(&current).is_empty());
    }

    #[test]
    fn apply_writes_set_fields_only() {
        let mut current = instance();
        let patch = InstancePatch {
            status_fe: Some(ServiceStatus::Error),
            db_size: Some(4096),
            ..InstancePatch::default()
        };
        patch.apply_to(&mut current);
        assert_eq!(current.status_fe, ServiceStatus::Error);
        assert_eq!(current.db_size, Some(4096));
        assert_eq!(current.status_db, ServiceStatus::Active);
    }

    #[test]
    fn set_all_equalizes_services() {
        let mut current = instance();
        current.set_all(BulkAction::MaintenanceAll.target());
        for service in ServiceKind::ALL {
            assert_eq!(current.service_status(service), ServiceStatus::Maintenance);
        }
    }

    #[test]
    fn validation_rejects_relative_urls_and_bad_names() {
        let patch = InstancePatch {
            back_end_url: Some("api.example.com".to_string()),
            ..InstancePatch::default()
        };
        assert!(patch.validate().is_err());
        assert!(validate_db_name("Qos-Prod").is_err());
        assert!(validate_db_name("qos_prod_01").is_ok());
    }

    #[test]
    fn default_db_name_is_a_valid_identifier() {
        let name = default_db_name(SubscriptionId::new());
        assert!(name.starts_with("qos_"));
        assert_eq!(name.len(), 16);
        assert!(validate_db_name(&name).is_ok());
    }
}
