// F5OS chassis REST client
//
// JWT-token session against the F5OS RESTCONF API. Only the VCMP host
// role is supported: VLANs, LAG trunk membership and tenant VLANs.

pub mod client;
mod device;
pub mod models;
pub mod token;
mod vlans;

pub use client::{F5OsClient, F5OsOptions};
