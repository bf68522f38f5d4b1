use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Available,
    Unavailable,
    ErrorQuota,
}

impl ServiceStatus {
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::PendingCreate | Self::PendingUpdate | Self::PendingDelete
        )
    }

    /// Status after a successful declaration, or `None` if unchanged.
    pub fn after_success(self) -> Option<Self> {
        match self {
            Self::PendingCreate | Self::PendingUpdate => Some(Self::Available),
            _ => None,
        }
    }
}

/// A private backend service exposed through the appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: Uuid,
    pub enabled: bool,
    pub network_id: Uuid,
    pub ip_addresses: Vec<String>,
    pub port: u16,
    pub proxy_protocol: bool,
    pub status: ServiceStatus,
    pub host: Option<String>,
    pub availability_zone: Option<String>,
}

impl Service {
    pub fn is_deleting(&self) -> bool {
        self.status == ServiceStatus::PendingDelete
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_screaming_snake_case() {
        assert_eq!(ServiceStatus::PendingCreate.to_string(), "PENDING_CREATE");
        assert_eq!(
            "ERROR_QUOTA".parse::<ServiceStatus>().unwrap(),
            ServiceStatus::ErrorQuota
        );
    }

    #[test]
    fn only_pending_create_and_update_become_available() {
        assert_eq!(
            ServiceStatus::PendingCreate.after_success(),
            Some(ServiceStatus::Available)
        );
        assert_eq!(
            ServiceStatus::PendingUpdate.after_success(),
            Some(ServiceStatus::Available)
        );
        assert_eq!(ServiceStatus::Unavailable.after_success(), None);
        assert_eq!(ServiceStatus::Available.after_success(), None);
    }
}
