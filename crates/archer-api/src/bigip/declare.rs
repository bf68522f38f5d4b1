// AS3 declaration endpoint.

use tracing::{debug, info};

use super::client::{BigIpClient, parse_json};
use super::models::DeclareResponse;
use crate::as3::As3;
use crate::error::Error;

const DECLARE_PATH: &str = "mgmt/shared/appsvcs/declare";

impl BigIpClient {
    /// POST a declaration and check every per-tenant result.
    ///
    /// A 503 (another declaration in progress) is retried by the client's
    /// retry policy. Any tenant result with a code >= 400 fails the call.
    pub async fn declare(&self, declaration: &As3) -> Result<(), Error> {
        let tenants: Vec<&str> = declaration.tenant_names().collect();
        debug!(device = %self.name(), ?tenants, "posting AS3 declaration");

        let body = self.post(DECLARE_PATH, declaration).await?;
        let response: DeclareResponse = if body.trim().is_empty() {
            DeclareResponse {
                results: Vec::new(),
            }
        } else {
            parse_json(&body)?
        };
        check_results(&response)?;

        info!(device = %self.name(), ?tenants, "AS3 declaration applied");
        Ok(())
    }
}

pub(crate) fn check_results(response: &DeclareResponse) -> Result<(), Error> {
    match response.results.iter().find(|r| r.code >= 400) {
        Some(failed) => Err(Error::Declaration {
            tenant: failed.tenant.clone().unwrap_or_default(),
            message: failed.message.clone().unwrap_or_default(),
        }),
        None => Ok(()),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_tenant_result_is_an_error() {
        let response: DeclareResponse = serde_json::from_str(
            r#"{"results":[
                {"code":200,"message":"success","tenant":"Common"},
                {"code":422,"message":"declaration failed","tenant":"net-1"}
            ]}"#,
        )
        .unwrap();
        let err = check_results(&response).unwrap_err();
        assert!(matches!(err, Error::Declaration { ref tenant, .. } if tenant == "net-1"));
    }

    #[test]
    fn no_change_results_are_ok() {
        let response: DeclareResponse =
            serde_json::from_str(r#"{"results":[{"code":200,"message":"no change"}]}"#).unwrap();
        assert!(check_results(&response).is_ok());
    }
}
