// iControl REST response shapes.
//
// Only the fields the agent reads are modelled; everything else the
// device returns is ignored.

use serde::Deserialize;

/// `{ "items": [...] }` collection envelope. Missing `items` means empty.
#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: LoginToken,
}

#[derive(Debug, Deserialize)]
pub struct LoginToken {
    pub token: String,
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Error body returned by iControl REST (`{"code":404,"message":"..."}`).
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vlan {
    pub name: String,
    #[serde(default)]
    pub tag: Option<u16>,
    #[serde(default)]
    pub mtu: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteDomain {
    pub name: String,
    pub id: u16,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub vlans: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelfIp {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub vlan: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Partition {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VcmpGuest {
    pub name: String,
    #[serde(default)]
    pub vlans: Vec<String>,
}

/// `GET /mgmt/tm/sys/failover` body.
#[derive(Debug, Deserialize)]
pub struct FailoverStatus {
    #[serde(rename = "apiRawValues")]
    pub api_raw_values: FailoverRaw,
}

#[derive(Debug, Deserialize)]
pub struct FailoverRaw {
    #[serde(rename = "apiAnonymous", default)]
    pub api_anonymous: String,
}

/// `POST /mgmt/shared/appsvcs/declare` response.
#[derive(Debug, Deserialize)]
pub struct DeclareResponse {
    #[serde(default)]
    pub results: Vec<DeclareResult>,
}

#[derive(Debug, Deserialize)]
pub struct DeclareResult {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
}

/// Member of `/mgmt/tm/net/vlan/<vlan>/interfaces`.
#[derive(Debug, Clone, Deserialize)]
pub struct VlanInterface {
    pub name: String,
    #[serde(default)]
    pub tagged: bool,
}
