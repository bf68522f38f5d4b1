// BIG-IP iControl REST + AS3 client
//
// Stateful login session (`X-F5-Auth-Token`), VLAN / route-domain /
// self-IP / partition management, VCMP guest VLAN membership and AS3
// declarations. Used both as the declarative-config target and as a
// VCMP chassis.

pub mod client;
mod declare;
mod device;
pub mod models;
mod network;
mod vcmp;

pub use client::{BigIpClient, BigIpOptions};
