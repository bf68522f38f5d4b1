// PROXY v2 iRule.
//
// Sends the header on the server side as soon as the connection is up.
// The endpoint UUID is the last 36 characters of the virtual server name
// (`.../endpoint-<uuid>`); route-domain suffixes are stripped from the
// addresses before packing.

use crate::proxy_protocol::{
    FAMILY_TCP4, PAYLOAD_LEN, SIGNATURE, TLV_ENDPOINT_ID, UUID_LEN, VERSION_COMMAND,
};

/// Object name of the iRule inside an endpoint tenant.
pub const IRULE_NAME: &str = "proxy_protocol_v2";

/// TCL source of the PROXY v2 iRule.
pub fn proxy_protocol_v2() -> String {
    let mut signature = String::new();
    for byte in SIGNATURE {
        signature.push_str(&format!("\\x{byte:02x}"));
    }

    format!(
        r#"when SERVER_CONNECTED {{
    set endpoint [string range [virtual name] end-{uuid_tail} end]
    scan [getfield [IP::client_addr] "%" 1] {{%d.%d.%d.%d}} s1 s2 s3 s4
    scan [getfield [IP::local_addr clientside] "%" 1] {{%d.%d.%d.%d}} d1 d2 d3 d4
    set header [binary format a12ccSccccccccSScSa{uuid_len} "{signature}" {version} {family} {payload_len} $s1 $s2 $s3 $s4 $d1 $d2 $d3 $d4 [TCP::client_port] [TCP::local_port clientside] {tlv} {uuid_len} $endpoint]
    TCP::respond $header
}}"#,
        uuid_tail = UUID_LEN - 1,
        uuid_len = UUID_LEN,
        version = VERSION_COMMAND,
        family = FAMILY_TCP4,
        payload_len = PAYLOAD_LEN,
        tlv = TLV_ENDPOINT_ID,
    )
}
