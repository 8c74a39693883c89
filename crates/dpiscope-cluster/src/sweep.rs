//! # Subnet sweep
//!
//! Checks whether a subnet is reachable at all by HEAD-probing a random sample
//! of its hosts. Only a timeout counts as dead; any answer, even a refusal,
//! proves the path is open. Once `alive_min` hosts have answered, the
//! remaining probes are cancelled.

use dpiscope_core::{ProbeError, SweepConfig, SweepError};
use dpiscope_transport::{ProbeRequest, ProbeTransport};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    base: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Host bits of `addr` are cleared.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, SweepError> {
        if prefix > 32 {
            return Err(SweepError::InvalidCidr(format!("{}/{}", addr, prefix)));
        }
        let mask = u32::MAX.checked_shl(32 - prefix as u32).unwrap_or(0);
        Ok(Self {
            base: u32::from(addr) & mask,
            prefix,
        })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    pub fn block_size(&self) -> u64 {
        1u64 << (32 - self.prefix as u32)
    }

    /// Usable hosts: the block minus its network and broadcast addresses.
    pub fn host_capacity(&self) -> u64 {
        self.block_size().saturating_sub(2)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let a = u32::from(addr) as u64;
        a >= self.base as u64 && a - (self.base as u64) < self.block_size()
    }
}

impl FromStr for Ipv4Cidr {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SweepError::InvalidCidr(s.to_string());
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        Self::new(addr, prefix).map_err(|_| invalid())
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

/// Up to `n` distinct host addresses drawn uniformly from `cidr`.
///
/// Partial Fisher–Yates over the host offsets; the sparse swap map keeps it
/// O(n) regardless of block size.
pub fn sample_hosts<R: Rng + ?Sized>(cidr: &Ipv4Cidr, n: usize, rng: &mut R) -> Vec<Ipv4Addr> {
    let capacity = cidr.host_capacity();
    let n = (n as u64).min(capacity);
    let mut swap: HashMap<u64, u64> = HashMap::new();

    (0..n)
        .map(|i| {
            let r = rng.gen_range(i..capacity);
            let pick = swap.get(&r).copied().unwrap_or(r);
            let displaced = swap.get(&i).copied().unwrap_or(i);
            swap.insert(r, displaced);
            Ipv4Addr::from(cidr.base + pick as u32 + 1)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOutcome {
    Alive,
    Dead,
    EarlyAborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub cidr: Ipv4Cidr,
    pub probed: usize,
    pub alive: usize,
    pub early_aborted: usize,
}

impl SweepReport {
    pub fn dead(&self) -> usize {
        self.probed - self.alive - self.early_aborted
    }
}

pub struct SubnetSweep {
    transport: Arc<dyn ProbeTransport>,
    timeout: Duration,
    config: SweepConfig,
}

impl SubnetSweep {
    pub fn new(transport: Arc<dyn ProbeTransport>, timeout: Duration, config: SweepConfig) -> Self {
        Self {
            transport,
            timeout,
            config,
        }
    }

    pub async fn run(&self, cidr: Ipv4Cidr) -> SweepReport {
        let hosts = sample_hosts(&cidr, self.config.sample_size, &mut rand::thread_rng());
        self.probe_hosts(cidr, hosts).await
    }

    /// Probes an explicit host list as if it were the sample of `cidr`.
    pub async fn probe_hosts(&self, cidr: Ipv4Cidr, hosts: Vec<Ipv4Addr>) -> SweepReport {
        let started = Instant::now();
        let alive_count = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let probed = hosts.len();

        let mut tasks = JoinSet::new();
        for host in hosts {
            tasks.spawn(probe_host(
                self.transport.clone(),
                host.to_string(),
                self.timeout,
                alive_count.clone(),
                self.config.alive_min,
                cancel.clone(),
            ));
        }

        let mut report = SweepReport {
            cidr,
            probed,
            alive: 0,
            early_aborted: 0,
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(HostOutcome::Alive) => report.alive += 1,
                Ok(HostOutcome::EarlyAborted) => report.early_aborted += 1,
                Ok(HostOutcome::Dead) => {}
                Err(e) => tracing::warn!("sweep[{}]: host task failed: {}", cidr, e),
            }
        }

        tracing::info!(
            "sweep[{}]: alive {}/{} (early aborted {}) in {:?}",
            cidr,
            report.alive,
            report.probed,
            report.early_aborted,
            started.elapsed()
        );
        report
    }

    /// Sweeps subnets one after another. With `only_24_prefix` set, other
    /// prefix lengths are skipped.
    pub async fn run_many(&self, cidrs: &[Ipv4Cidr]) -> Vec<SweepReport> {
        let mut reports = Vec::new();
        for cidr in cidrs {
            if self.config.only_24_prefix && cidr.prefix() != 24 {
                tracing::debug!("sweep[{}]: skipped, not a /24", cidr);
                continue;
            }
            reports.push(self.run(*cidr).await);
        }
        reports
    }
}

async fn probe_host(
    transport: Arc<dyn ProbeTransport>,
    host: String,
    limit: Duration,
    alive_count: Arc<AtomicUsize>,
    alive_min: usize,
    cancel: CancellationToken,
) -> HostOutcome {
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => HostOutcome::EarlyAborted,
        r = timeout(limit, transport.send(&host, ProbeRequest::Head)) => match r {
            Ok(Ok(_)) | Ok(Err(ProbeError::Network(_))) => HostOutcome::Alive,
            Ok(Err(ProbeError::Timeout)) | Err(_) => HostOutcome::Dead,
        },
    };

    if outcome == HostOutcome::Alive && alive_count.fetch_add(1, Ordering::SeqCst) + 1 >= alive_min {
        cancel.cancel();
    }
    tracing::debug!("sweep host[{}]: {:?}", host, outcome);
    outcome
}
