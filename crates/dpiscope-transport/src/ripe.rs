use dpiscope_core::{DpiScopeError, WhoamiConfig};
use serde::{Deserialize, Serialize};

/// Public address of this client and the autonomous system announcing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub ip: String,
    pub asn: u32,
    pub holder: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct WhatsMyIp {
    ip: String,
}

#[derive(Debug, Deserialize)]
struct PrefixOverview {
    #[serde(default)]
    asns: Vec<AsnEntry>,
}

#[derive(Debug, Deserialize)]
struct AsnEntry {
    asn: u32,
    #[serde(default)]
    holder: String,
}

fn transport(e: impl std::fmt::Display) -> DpiScopeError {
    DpiScopeError::Transport(format!("whoami: {}", e))
}

async fn get<T: serde::de::DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T, DpiScopeError> {
    let envelope: Envelope<T> = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(transport)?
        .json()
        .await
        .map_err(transport)?;
    Ok(envelope.data)
}

/// Asks RIPEstat for our public IP, then for the first ASN announcing it.
pub async fn whoami(client: &reqwest::Client, config: &WhoamiConfig) -> Result<ClientIdentity, DpiScopeError> {
    let base = config.ripe_api_url.trim_end_matches('/');

    let me: WhatsMyIp = get(client, &format!("{}/whats-my-ip/data.json", base)).await?;
    let overview: PrefixOverview = get(
        client,
        &format!("{}/prefix-overview/data.json?resource={}", base, me.ip),
    )
    .await?;

    let first = overview
        .asns
        .into_iter()
        .next()
        .ok_or_else(|| transport(format!("no ASN announces {}", me.ip)))?;

    tracing::info!("whoami: {} via AS{} ({})", me.ip, first.asn, first.holder);
    Ok(ClientIdentity {
        ip: me.ip,
        asn: first.asn,
        holder: first.holder,
    })
}

#[derive(Debug, Deserialize)]
struct AnnouncedPrefixes {
    #[serde(default)]
    prefixes: Vec<PrefixEntry>,
}

#[derive(Debug, Deserialize)]
struct PrefixEntry {
    prefix: String,
}

/// IPv4 prefixes currently announced by `asn`.
pub async fn announced_prefixes(
    client: &reqwest::Client,
    config: &WhoamiConfig,
    asn: u32,
) -> Result<Vec<String>, DpiScopeError> {
    let base = config.ripe_api_url.trim_end_matches('/');
    let announced: AnnouncedPrefixes = get(
        client,
        &format!("{}/announced-prefixes/data.json?resource=AS{}", base, asn),
    )
    .await?;

    let v4: Vec<String> = announced
        .prefixes
        .into_iter()
        .map(|p| p.prefix)
        .filter(|p| p.contains('.') && p.contains('/'))
        .collect();
    tracing::info!("whoami: AS{} announces {} IPv4 prefixes", asn, v4.len());
    Ok(v4)
}
