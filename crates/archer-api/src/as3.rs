// AS3 declarative config wire types.
//
// Field names, class names and the fixed ADC header values are consumed
// by the appliance firmware as-is. Maps are `BTreeMap` so serialization
// is deterministic for identical input.

use std::collections::BTreeMap;

use serde::Serialize;

/// AS3 schema version the agent writes.
pub const SCHEMA_VERSION: &str = "3.36.0";
/// Fixed declaration id; every POST from every agent reuses it.
pub const DECLARATION_ID: &str = "urn:uuid:07649173-4AF7-48DF-963F-84000C70F0DD";

// ── Envelope ─────────────────────────────────────────────────────────

/// Top-level AS3 request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct As3 {
    pub class: &'static str,
    pub action: &'static str,
    pub persist: bool,
    pub declaration: Adc,
}

impl As3 {
    /// A `deploy` request covering exactly the given tenants.
    ///
    /// `updateMode: selective` means tenants absent from the map are
    /// left untouched on the device.
    pub fn deploy(tenants: BTreeMap<String, Tenant>) -> Self {
        Self {
            class: "AS3",
            action: "deploy",
            persist: false,
            declaration: Adc {
                class: "ADC",
                schema_version: SCHEMA_VERSION,
                update_mode: "selective",
                id: DECLARATION_ID,
                tenants,
            },
        }
    }

    /// Convenience for a single-tenant declaration.
    pub fn single(name: impl Into<String>, tenant: Tenant) -> Self {
        let mut tenants = BTreeMap::new();
        tenants.insert(name.into(), tenant);
        Self::deploy(tenants)
    }

    /// Names of the tenants carried by this declaration.
    pub fn tenant_names(&self) -> impl Iterator<Item = &str> {
        self.declaration.tenants.keys().map(String::as_str)
    }
}

/// The `ADC` declaration body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Adc {
    pub class: &'static str,
    pub schema_version: &'static str,
    pub update_mode: &'static str,
    pub id: &'static str,
    #[serde(flatten)]
    pub tenants: BTreeMap<String, Tenant>,
}

// ── Tenant / Application ─────────────────────────────────────────────

/// A tenant (partition). An empty tenant removes everything in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tenant {
    pub class: &'static str,
    #[serde(flatten)]
    pub applications: BTreeMap<String, Application>,
}

impl Default for Tenant {
    fn default() -> Self {
        Self {
            class: "Tenant",
            applications: BTreeMap::new(),
        }
    }
}

impl Tenant {
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

/// An application inside a tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Application {
    pub class: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<&'static str>,
    #[serde(flatten)]
    pub objects: BTreeMap<String, AppObject>,
}

impl Application {
    pub fn new(template: Option<&'static str>) -> Self {
        Self {
            class: "Application",
            template,
            objects: BTreeMap::new(),
        }
    }
}

/// Objects an application may contain, tagged by their AS3 class.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "class")]
pub enum AppObject {
    Pool(Pool),
    #[serde(rename = "SNAT_Pool")]
    SnatPool(SnatPool),
    #[serde(rename = "Service_L4")]
    ServiceL4(VirtualService),
    #[serde(rename = "Service_TCP")]
    ServiceTcp(VirtualService),
    #[serde(rename = "iRule")]
    IRule(IRule),
}

// ── Objects ──────────────────────────────────────────────────────────

/// Reference to another object, either by AS3 path or by BIG-IP path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Pointer {
    #[serde(rename = "use")]
    Use(String),
    #[serde(rename = "bigip")]
    BigIp(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub label: String,
    pub remark: String,
    pub members: Vec<PoolMember>,
    pub monitors: Vec<Pointer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMember {
    pub service_port: u16,
    pub server_addresses: Vec<String>,
    pub share_nodes: bool,
    pub enable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnatPool {
    pub label: String,
    pub snat_addresses: Vec<String>,
}

/// `Service_L4` / `Service_TCP` body; the class decides which profile applies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualService {
    pub label: String,
    pub remark: String,
    pub virtual_addresses: Vec<String>,
    pub virtual_port: u16,
    pub allow_vlans: Vec<String>,
    pub pool: Pointer,
    pub snat: Pointer,
    pub persistence_methods: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_l4: Option<Pointer>,
    #[serde(rename = "profileTCP", skip_serializing_if = "Option::is_none")]
    pub profile_tcp: Option<Pointer>,
    #[serde(rename = "iRules", skip_serializing_if = "Vec::is_empty")]
    pub irules: Vec<Pointer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IRule {
    pub label: String,
    #[serde(rename = "iRule")]
    pub irule: String,
}
