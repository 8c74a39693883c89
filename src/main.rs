use clap::{Parser, Subcommand};
use dpiscope_cluster::{DpiOrchestrator, Ipv4Cidr, SubnetSweep};
use dpiscope_codec::ShareCodec;
use dpiscope_core::{AppConfig, CachingRegistry, DpiScopeError, ProbeResult, ProbeTarget};
use dpiscope_transport::{
    announced_prefixes, api_client, whoami, GithubRegistry, GithubRevisionSource, HttpTransport,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dpi-scope", version, about = "TCP 16-20 DPI interference checker")]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "DPISCOPE_CONFIG",
        help = "TOML configuration file; built-in defaults are used when absent"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe every target in a roster.
    Probe {
        #[arg(long, value_name = "FILE", help = "JSON array of {id, provider, url, country}")]
        roster: PathBuf,
        #[arg(long, help = "Client ASN; looked up via RIPEstat when omitted")]
        asn: Option<u32>,
        #[arg(long, help = "Print a share token for the finished session")]
        share: bool,
        #[arg(long, help = "Print the session as JSON instead of a table")]
        json: bool,
    },
    /// Decode a share token.
    Decode { token: String },
    /// Check which subnets answer at all.
    Sweep {
        cidrs: Vec<String>,
        #[arg(long, help = "Also sweep every IPv4 prefix announced by this ASN")]
        asn: Option<u32>,
    },
    /// Show this client's public IP and ASN.
    Whoami,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), DpiScopeError> {
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Probe {
            roster,
            asn,
            share,
            json,
        } => probe(&config, &roster, asn, share, json).await,
        Command::Decode { token } => decode(&config, &token).await,
        Command::Sweep { cidrs, asn } => sweep(&config, &cidrs, asn).await,
        Command::Whoami => {
            let me = whoami(&api_client()?, &config.whoami).await?;
            println!("{}\tAS{}\t{}", me.ip, me.asn, me.holder);
            Ok(())
        }
    }
}

fn share_codec(config: &AppConfig) -> Result<ShareCodec, DpiScopeError> {
    let client = api_client()?;
    let registry_config = Arc::new(config.registry.clone());
    let revisions = GithubRevisionSource::new(client.clone(), registry_config.clone());
    let registry = CachingRegistry::new(GithubRegistry::new(client, registry_config));
    Ok(ShareCodec::new(Arc::new(revisions), Arc::new(registry)))
}

fn load_roster(path: &Path) -> Result<Vec<ProbeTarget>, DpiScopeError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| DpiScopeError::Roster(format!("{}: {}", path.display(), e)))
}

fn print_row(r: &ProbeResult) {
    let fault = r.fault.as_deref().map(|f| format!("\t({})", f)).unwrap_or_default();
    println!(
        "{}\t{} {}\t{}\t{}\t{}{}",
        r.target.id, r.target.country, r.target.provider, r.target.host, r.alive, r.dpi, fault
    );
}

async fn probe(
    config: &AppConfig,
    roster: &Path,
    asn: Option<u32>,
    share: bool,
    json: bool,
) -> Result<(), DpiScopeError> {
    let targets = load_roster(roster)?;

    let asn = match asn {
        Some(asn) => asn,
        None => match whoami(&api_client()?, &config.whoami).await {
            Ok(me) => me.asn,
            Err(e) => {
                tracing::warn!("whoami failed, recording AS0: {}", e);
                0
            }
        },
    };

    let transport =
        HttpTransport::new(&config.probe).map_err(|e| DpiScopeError::Transport(e.to_string()))?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = DpiOrchestrator::new(Arc::new(transport), &config.probe).with_progress(tx);

    let progress = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if update.stage.is_terminal() {
                tracing::info!("target[{}]: {}", update.id, update.stage);
            }
        }
    });

    let session = orchestrator.run(targets, asn).await?;
    drop(orchestrator);
    let _ = progress.await;

    if json {
        let out = serde_json::to_string_pretty(&session).map_err(std::io::Error::from)?;
        println!("{}", out);
    } else {
        session.results().for_each(print_row);
    }

    if share {
        let token = share_codec(config)?.encode(&session).await?;
        println!("share: {}", token);
    }
    Ok(())
}

async fn decode(config: &AppConfig, token: &str) -> Result<(), DpiScopeError> {
    let decoded = share_codec(config)?.decode(token).await?;
    println!(
        "revision {}  timestamp {}  AS{}",
        decoded.revision_hex, decoded.timestamp_ms, decoded.asn
    );
    decoded.items.iter().for_each(print_row);
    Ok(())
}

async fn sweep(config: &AppConfig, cidrs: &[String], asn: Option<u32>) -> Result<(), DpiScopeError> {
    let mut blocks = cidrs
        .iter()
        .map(|c| c.parse::<Ipv4Cidr>())
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(asn) = asn {
        for prefix in announced_prefixes(&api_client()?, &config.whoami, asn).await? {
            blocks.push(prefix.parse()?);
        }
    }

    let transport =
        HttpTransport::new(&config.probe).map_err(|e| DpiScopeError::Transport(e.to_string()))?;
    let sweeper = SubnetSweep::new(Arc::new(transport), config.probe.timeout(), config.sweep.clone());

    for report in sweeper.run_many(&blocks).await {
        let mark = if report.alive >= config.sweep.alive_min {
            "ok"
        } else if report.alive > 0 {
            "partial"
        } else {
            "dead"
        };
        println!("{}\talive {}/{}\t{}", report.cidr, report.alive, report.probed, mark);
    }
    Ok(())
}
