//! # DPI methods
//!
//! Both methods push the same number of bytes toward the host. A middlebox
//! that cuts flows after a fixed byte or packet count trips on both; one that
//! only inspects bodies, or only request lines, trips on one.

use crate::client::{ProbeRequest, ProbeTransport};
use bytes::Bytes;
use dpiscope_core::{ProbeConfig, ProbeError, RawOutcome};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use std::time::Duration;
use tokio::time::{error::Elapsed, timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DpiMethod {
    /// One request with a large random body.
    HugeBody,
    /// Many requests whose request-line padding adds up to the same size.
    LargeReqline,
}

#[derive(Debug, Clone, Copy)]
pub struct MethodParams {
    pub timeout: Duration,
    pub payload_bytes: usize,
    pub reqline_chunk_bytes: usize,
}

impl From<&ProbeConfig> for MethodParams {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            timeout: config.timeout(),
            payload_bytes: config.payload_bytes,
            reqline_chunk_bytes: config.reqline_chunk_bytes,
        }
    }
}

impl MethodParams {
    /// Requests the large-reqline method will issue.
    pub fn reqline_requests(&self) -> usize {
        self.payload_bytes.div_ceil(self.reqline_chunk_bytes.max(1))
    }
}

pub async fn run_method(
    method: DpiMethod,
    transport: &dyn ProbeTransport,
    host: &str,
    params: &MethodParams,
) -> RawOutcome {
    let outcome = match method {
        DpiMethod::HugeBody => huge_body(transport, host, params).await,
        DpiMethod::LargeReqline => large_reqline(transport, host, params).await,
    };
    tracing::debug!("{:?}[{}]: {:?}", method, host, outcome);
    outcome
}

/// Single POST; one timer covers connect, upload and response.
pub async fn huge_body(transport: &dyn ProbeTransport, host: &str, params: &MethodParams) -> RawOutcome {
    let body = random_body(params.payload_bytes);
    settle(timeout(params.timeout, transport.send(host, ProbeRequest::Post { body })).await)
}

/// Sequential GETs under one shared timer. The first failure ends the sequence.
pub async fn large_reqline(transport: &dyn ProbeTransport, host: &str, params: &MethodParams) -> RawOutcome {
    let chunk = params.reqline_chunk_bytes.max(1);
    let sequence = async {
        let mut sent = 0;
        while sent < params.payload_bytes {
            let n = chunk.min(params.payload_bytes - sent);
            transport
                .send(host, ProbeRequest::Get { padding: random_padding(n) })
                .await?;
            sent += n;
        }
        Ok::<_, ProbeError>(())
    };
    settle(timeout(params.timeout, sequence).await)
}

fn settle<T>(result: Result<Result<T, ProbeError>, Elapsed>) -> RawOutcome {
    match result {
        Ok(Ok(_)) => RawOutcome::Completed,
        Ok(Err(ProbeError::Timeout)) | Err(_) => RawOutcome::TimedOut,
        Ok(Err(ProbeError::Network(_))) => RawOutcome::InstantError,
    }
}

fn random_body(n: usize) -> Bytes {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    Bytes::from(buf)
}

fn random_padding(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}
