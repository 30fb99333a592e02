use std::future::Future;

use futures::future::join_all;
use parley_persist::{CredentialOwner, CredentialProjection};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// One credential's share of a fanned-out tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialOutcome {
    pub credential_owned_by: CredentialOwner,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs `call` once per credential concurrently. Outcomes keep the input
/// order and a failing credential only marks its own entry.
pub async fn fan_out<'a, F, Fut>(tool: &str, credentials: &'a [CredentialProjection], call: F) -> Vec<CredentialOutcome>
where
    F: Fn(&'a CredentialProjection) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let calls = credentials.iter().map(|credential| {
        let pending = call(credential);
        async move { (credential, pending.await) }
    });

    join_all(calls)
        .await
        .into_iter()
        .map(|(credential, result)| match result {
            Ok(results) => CredentialOutcome {
                credential_owned_by: credential.owned_by.clone(),
                ok: true,
                results: Some(results),
                error: None,
            },
            Err(e) => {
                tracing::warn!(
                    tool,
                    owner = %credential.owned_by.email,
                    error = %e,
                    "credential call failed"
                );
                CredentialOutcome {
                    credential_owned_by: credential.owned_by.clone(),
                    ok: false,
                    results: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect()
}
