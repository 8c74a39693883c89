use crate::client::{ProbeRequest, ProbeTransport};
use dpiscope_core::{AliveState, ProbeError};
use std::time::Duration;
use tokio::time::timeout;

/// Races a bodiless request against `limit`.
///
/// - any response, whatever its status ⇒ `Yes`
/// - the timer fires first ⇒ the request is dropped ⇒ `No`
/// - any other failure (DNS, TLS, refused) ⇒ `Unknown`
pub async fn probe_liveness(transport: &dyn ProbeTransport, host: &str, limit: Duration) -> AliveState {
    match timeout(limit, transport.send(host, ProbeRequest::Head)).await {
        Ok(Ok(status)) => {
            tracing::debug!("liveness[{}]: HTTP {}", host, status);
            AliveState::Yes
        }
        Ok(Err(ProbeError::Timeout)) | Err(_) => {
            tracing::debug!("liveness[{}]: timeout after {:?}", host, limit);
            AliveState::No
        }
        Ok(Err(ProbeError::Network(e))) => {
            tracing::debug!("liveness[{}]: {}", host, e);
            AliveState::Unknown
        }
    }
}
