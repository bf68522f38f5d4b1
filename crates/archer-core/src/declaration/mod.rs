// ── Declarative config builder ──
//
// Pure mapping from rows to AS3 tenants. No I/O: the reconcilers resolve
// segments, SNAT addresses and destination IPs first and hand in specs.
// Rows that must disappear from the device are simply left out.

pub mod irule;

use std::collections::BTreeMap;

use archer_api::as3::{
    AppObject, Application, IRule, Pointer, Pool, PoolMember, SnatPool, Tenant, VirtualService,
};
use archer_api::naming;
use uuid::Uuid;

use crate::model::{Endpoint, Service};

pub use irule::IRULE_NAME;

/// Tenant holding every service of a host.
pub const COMMON_TENANT: &str = "Common";
/// The only application AS3 allows in `Common`.
pub const SHARED_APPLICATION: &str = "Shared";
/// Application holding the virtual servers of an endpoint tenant.
pub const ENDPOINT_APPLICATION: &str = "endpoints";
/// Health monitor attached to every service pool.
pub const POOL_MONITOR: &str = "/Common/gateway_icmp";

const PROFILE_L4: &str = "/Common/fastL4";
const PROFILE_TCP: &str = "/Common/tcp";

/// A service with everything resolved that its objects need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub service: Service,
    pub segment: u16,
    /// SNAT addresses (one per device), without route-domain suffix.
    pub snat_addresses: Vec<String>,
}

/// An endpoint with its resolved destination address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub endpoint: Endpoint,
    pub ip_address: String,
}

pub fn pool_name(service_id: Uuid) -> String {
    format!("pool-{service_id}")
}

pub fn snat_pool_name(service_id: Uuid) -> String {
    format!("snatpool-{service_id}")
}

pub fn virtual_name(endpoint_id: Uuid) -> String {
    format!("endpoint-{endpoint_id}")
}

fn scoped(address: &str, segment: u16) -> String {
    format!("{address}%{segment}")
}

fn shared_path(object: &str) -> String {
    format!("/{COMMON_TENANT}/{SHARED_APPLICATION}/{object}")
}

// ── Services ─────────────────────────────────────────────────────────

/// Build the `Common` tenant for a host's services.
///
/// Services in `PENDING_DELETE` are skipped; disabled services keep their
/// pool with every member disabled.
pub fn service_tenant(services: &[ServiceSpec]) -> Tenant {
    let mut app = Application::new(Some("shared"));
    for spec in services.iter().filter(|s| !s.service.is_deleting()) {
        let service = &spec.service;
        app.objects.insert(
            snat_pool_name(service.id),
            AppObject::SnatPool(SnatPool {
                label: service.id.to_string(),
                snat_addresses: spec
                    .snat_addresses
                    .iter()
                    .map(|a| scoped(a, spec.segment))
                    .collect(),
            }),
        );
        app.objects.insert(
            pool_name(service.id),
            AppObject::Pool(Pool {
                label: service.id.to_string(),
                remark: format!("network {}", service.network_id),
                members: vec![PoolMember {
                    service_port: service.port,
                    server_addresses: service
                        .ip_addresses
                        .iter()
                        .map(|a| scoped(a, spec.segment))
                        .collect(),
                    share_nodes: true,
                    enable: service.enabled,
                }],
                monitors: vec![Pointer::BigIp(POOL_MONITOR.to_owned())],
            }),
        );
    }

    let mut tenant = Tenant::default();
    tenant
        .applications
        .insert(SHARED_APPLICATION.to_owned(), app);
    tenant
}

// ── Endpoints ────────────────────────────────────────────────────────

/// Build the `net-<network>` tenant for all endpoints on one network.
///
/// Returns an empty tenant (which removes it from the device) when no
/// endpoint remains declared.
pub fn endpoint_tenant(segment: u16, endpoints: &[EndpointSpec]) -> Tenant {
    let mut objects = BTreeMap::new();
    let mut needs_irule = false;

    for spec in endpoints.iter().filter(|s| s.endpoint.status.is_declared()) {
        let endpoint = &spec.endpoint;
        let mut virtual_service = VirtualService {
            label: endpoint.id.to_string(),
            remark: format!("service {}", endpoint.service_id),
            virtual_addresses: vec![scoped(&spec.ip_address, segment)],
            virtual_port: endpoint.service_port,
            allow_vlans: vec![naming::vlan_path(segment)],
            pool: Pointer::BigIp(shared_path(&pool_name(endpoint.service_id))),
            snat: Pointer::BigIp(shared_path(&snat_pool_name(endpoint.service_id))),
            persistence_methods: Vec::new(),
            profile_l4: None,
            profile_tcp: None,
            irules: Vec::new(),
        };

        let object = if endpoint.proxy_protocol {
            needs_irule = true;
            virtual_service.profile_tcp = Some(Pointer::BigIp(PROFILE_TCP.to_owned()));
            virtual_service.irules = vec![Pointer::Use(IRULE_NAME.to_owned())];
            AppObject::ServiceTcp(virtual_service)
        } else {
            virtual_service.profile_l4 = Some(Pointer::BigIp(PROFILE_L4.to_owned()));
            AppObject::ServiceL4(virtual_service)
        };
        objects.insert(virtual_name(endpoint.id), object);
    }

    let mut tenant = Tenant::default();
    if objects.is_empty() {
        return tenant;
    }
    if needs_irule {
        objects.insert(
            IRULE_NAME.to_owned(),
            AppObject::IRule(IRule {
                label: IRULE_NAME.to_owned(),
                irule: irule::proxy_protocol_v2(),
            }),
        );
    }
    let mut app = Application::new(None);
    app.objects = objects;
    tenant
        .applications
        .insert(ENDPOINT_APPLICATION.to_owned(), app);
    tenant
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::{EndpointPort, EndpointStatus, ServiceStatus};

    fn service(status: ServiceStatus) -> ServiceSpec {
        ServiceSpec {
            service: Service {
                id: Uuid::new_v4(),
                enabled: true,
                network_id: Uuid::new_v4(),
                ip_addresses: vec!["10.0.0.10".into(), "10.0.0.11".into()],
                port: 80,
                proxy_protocol: false,
                status,
                host: Some("agent-1".into()),
                availability_zone: None,
            },
            segment: 100,
            snat_addresses: vec!["10.0.0.200".into()],
        }
    }

    fn endpoint(status: EndpointStatus, proxy_protocol: bool) -> EndpointSpec {
        EndpointSpec {
            endpoint: Endpoint {
                id: Uuid::new_v4(),
                service_id: Uuid::new_v4(),
                status,
                port: EndpointPort {
                    port_id: Uuid::new_v4(),
                    network_id: Uuid::new_v4(),
                    subnet_id: None,
                    ip_address: Some("192.168.1.5".into()),
                    segment: Some(200),
                    owned: true,
                },
                service_port: 443,
                proxy_protocol,
            },
            ip_address: "192.168.1.5".into(),
        }
    }

    #[test]
    fn service_becomes_pool_and_snat_pool() {
        let spec = service(ServiceStatus::PendingCreate);
        let id = spec.service.id;
        let tenant = service_tenant(&[spec]);
        let value = serde_json::to_value(&tenant).unwrap();
        let shared = &value["Shared"];

        assert_eq!(shared["template"], "shared");
        assert_eq!(
            shared[snat_pool_name(id)],
            json!({
                "class": "SNAT_Pool",
                "label": id.to_string(),
                "snatAddresses": ["10.0.0.200%100"],
            })
        );
        assert_eq!(shared[pool_name(id)]["class"], "Pool");
        assert_eq!(
            shared[pool_name(id)]["members"],
            json!([{
                "servicePort": 80,
                "serverAddresses": ["10.0.0.10%100", "10.0.0.11%100"],
                "shareNodes": true,
                "enable": true,
            }])
        );
        assert_eq!(
            shared[pool_name(id)]["monitors"],
            json!([{ "bigip": POOL_MONITOR }])
        );
    }

    #[test]
    fn deleting_services_are_left_out() {
        let keep = service(ServiceStatus::Available);
        let drop = service(ServiceStatus::PendingDelete);
        let tenant = service_tenant(&[keep.clone(), drop.clone()]);
        let app = &tenant.applications[SHARED_APPLICATION];

        assert!(app.objects.contains_key(&pool_name(keep.service.id)));
        assert!(!app.objects.contains_key(&pool_name(drop.service.id)));
        assert!(!app.objects.contains_key(&snat_pool_name(drop.service.id)));
        assert_eq!(app.objects.len(), 2);
    }

    #[test]
    fn disabled_service_keeps_pool_with_disabled_members() {
        let mut spec = service(ServiceStatus::Available);
        spec.service.enabled = false;
        let id = spec.service.id;
        let tenant = service_tenant(&[spec]);
        match &tenant.applications[SHARED_APPLICATION].objects[&pool_name(id)] {
            AppObject::Pool(pool) => assert!(pool.members.iter().all(|m| !m.enable)),
            other => panic!("expected pool, got {other:?}"),
        }
    }

    #[test]
    fn empty_service_set_keeps_shared_application() {
        let tenant = service_tenant(&[]);
        assert!(tenant.applications[SHARED_APPLICATION].objects.is_empty());
    }

    #[test]
    fn endpoint_becomes_l4_virtual() {
        let spec = endpoint(EndpointStatus::PendingCreate, false);
        let (id, sid) = (spec.endpoint.id, spec.endpoint.service_id);
        let tenant = endpoint_tenant(200, &[spec]);
        let value = serde_json::to_value(&tenant).unwrap();
        let vs = &value[ENDPOINT_APPLICATION][virtual_name(id)];

        assert_eq!(vs["class"], "Service_L4");
        assert_eq!(vs["virtualAddresses"], json!(["192.168.1.5%200"]));
        assert_eq!(vs["virtualPort"], 443);
        assert_eq!(vs["allowVlans"], json!(["/Common/vlan-200"]));
        assert_eq!(
            vs["pool"],
            json!({ "bigip": format!("/Common/Shared/pool-{sid}") })
        );
        assert_eq!(
            vs["snat"],
            json!({ "bigip": format!("/Common/Shared/snatpool-{sid}") })
        );
        assert_eq!(vs["profileL4"], json!({ "bigip": "/Common/fastL4" }));
        assert!(vs.get("iRules").is_none());
        assert!(value[ENDPOINT_APPLICATION].get(IRULE_NAME).is_none());
    }

    #[test]
    fn proxy_protocol_endpoint_gets_tcp_service_and_irule() {
        let spec = endpoint(EndpointStatus::Available, true);
        let id = spec.endpoint.id;
        let tenant = endpoint_tenant(200, &[spec]);
        let value = serde_json::to_value(&tenant).unwrap();
        let app = &value[ENDPOINT_APPLICATION];

        assert_eq!(app[virtual_name(id)]["class"], "Service_TCP");
        assert_eq!(app[virtual_name(id)]["iRules"], json!([{ "use": IRULE_NAME }]));
        assert_eq!(app[virtual_name(id)]["profileTCP"], json!({ "bigip": "/Common/tcp" }));
        assert_eq!(app[IRULE_NAME]["class"], "iRule");
    }

    #[test]
    fn excluded_endpoints_produce_empty_tenant() {
        let tenant = endpoint_tenant(
            200,
            &[
                endpoint(EndpointStatus::PendingDelete, false),
                endpoint(EndpointStatus::PendingRejected, true),
            ],
        );
        assert!(tenant.is_empty());
        assert_eq!(
            serde_json::to_value(&tenant).unwrap(),
            json!({ "class": "Tenant" })
        );
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let services = vec![service(ServiceStatus::Available), service(ServiceStatus::PendingUpdate)];
        assert_eq!(service_tenant(&services), service_tenant(&services));

        let endpoints = vec![
            endpoint(EndpointStatus::Available, true),
            endpoint(EndpointStatus::PendingCreate, false),
        ];
        assert_eq!(
            endpoint_tenant(200, &endpoints),
            endpoint_tenant(200, &endpoints)
        );
    }
}
