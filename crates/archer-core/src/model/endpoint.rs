use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EndpointStatus {
    PendingApproval,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    PendingRejected,
    Available,
    Rejected,
    Failed,
}

impl EndpointStatus {
    /// Statuses the endpoint reconciler acts on.
    pub fn is_actionable(self) -> bool {
        !matches!(self, Self::PendingApproval | Self::Rejected | Self::Failed)
    }

    /// Statuses that still produce a virtual server on the device.
    pub fn is_declared(self) -> bool {
        !matches!(
            self,
            Self::PendingDelete
                | Self::PendingRejected
                | Self::PendingApproval
                | Self::Rejected
                | Self::Failed
        )
    }

    /// Status after a successful declaration, or `None` if unchanged.
    pub fn after_success(self) -> Option<Self> {
        match self {
            Self::PendingCreate | Self::PendingUpdate => Some(Self::Available),
            Self::PendingRejected => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Destination-side port of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPort {
    pub port_id: Uuid,
    pub network_id: Uuid,
    pub subnet_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub segment: Option<u16>,
    /// The port was created on behalf of the endpoint and is released with it.
    pub owned: bool,
}

/// An injected endpoint of a service, joined with the service fields the
/// declaration needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: Uuid,
    pub service_id: Uuid,
    pub status: EndpointStatus,
    pub port: EndpointPort,
    pub service_port: u16,
    pub proxy_protocol: bool,
}

impl Endpoint {
    pub fn is_deleting(&self) -> bool {
        self.status == EndpointStatus::PendingDelete
    }
}
