//! PodShare CLI
//!
//! - `init`: give a new resource its owner-only policy
//! - `share` / `revoke`: run the sharing saga against a pod
//! - `inspect`: show the stored policy summary
//! - `log`: query a principal's permission or outgoing log

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use podshare_policy::{CompileOptions, Grants};
use podshare_sharing::{
    cancellation, telemetry, CancelSignal, RevokeRequest, ShareRequest, SharingConfig,
    SharingOrchestrator,
};
use podshare_transport::{HttpPodClient, StaticTokens, TokenPair};
use podshare_types::{PermissionSet, Principal, SharePattern, SystemClock};
use std::sync::Arc;
use tracing::warn;

mod output;

use output::OutputFormat;

/// PodShare CLI application
#[derive(Parser)]
#[command(name = "podshare")]
#[command(about = "PodShare - share pod resources and audit who can see them", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PODSHARE_CONFIG")]
    config: Option<String>,

    /// Bound access token sent as `Authorization: DPoP <token>`
    #[arg(long, env = "PODSHARE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Proof sent in the `DPoP` header
    #[arg(long, env = "PODSHARE_DPOP_PROOF", hide_env_values = true)]
    dpop_proof: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the owner-only default policy for a resource
    Init {
        resource: String,
        #[arg(long)]
        owner: String,
    },

    /// Grant access to a resource
    Share(ShareArgs),

    /// Withdraw a recipient's access
    Revoke(RevokeArgs),

    /// Show the stored policy for a resource
    Inspect { resource: String },

    /// Query a principal's audit log
    Log(LogArgs),
}

#[derive(Args)]
struct ShareArgs {
    resource: String,
    #[arg(long)]
    owner: String,
    /// Recipient WebID
    #[arg(long = "to")]
    recipient: String,
    /// Comma separated: read,write,append,control
    #[arg(long, default_value = "read")]
    permissions: String,
    #[arg(long, default_value = "shared-read")]
    pattern: String,
    /// Defaults to the owner
    #[arg(long)]
    granter: Option<String>,
    #[command(flatten)]
    policy: PolicyArgs,
}

#[derive(Args)]
struct RevokeArgs {
    resource: String,
    #[arg(long)]
    owner: String,
    /// Recipient WebID
    #[arg(long = "from")]
    recipient: String,
    /// What the recipient held
    #[arg(long, default_value = "read")]
    permissions: String,
    /// Pattern for the grants that stay in force
    #[arg(long, default_value = "owner-only")]
    pattern: String,
    #[arg(long)]
    granter: Option<String>,
    #[command(flatten)]
    policy: PolicyArgs,
}

#[derive(Args)]
struct PolicyArgs {
    /// Grant kept in the rewritten policy, as `perms=webid` (repeatable)
    #[arg(long = "keep")]
    keep: Vec<String>,
    /// RFC 3339 expiry for time-limited shares
    #[arg(long)]
    expires_at: Option<String>,
    /// Client id for app-scoped shares (repeatable)
    #[arg(long = "client-id")]
    client_ids: Vec<String>,
    /// Replace read-only grantees with public read access
    #[arg(long)]
    public_read: bool,
}

#[derive(Args)]
struct LogArgs {
    /// Whose log to read
    principal: String,
    /// Only the newest entry per resource
    #[arg(long)]
    latest: bool,
    /// Only resources containing this text
    #[arg(long)]
    resource: Option<String>,
    /// Grants received by the principal
    #[arg(long, conflicts_with = "shared_by_me")]
    shared_with_me: bool,
    /// Grants issued by the principal
    #[arg(long)]
    shared_by_me: bool,
    /// Read the outgoing notification log instead
    #[arg(long, conflicts_with_all = ["latest", "resource", "shared_with_me", "shared_by_me"])]
    outgoing: bool,
}

impl PolicyArgs {
    fn grants(&self) -> anyhow::Result<Grants> {
        let mut grants = Grants::new();
        for raw in &self.keep {
            let Some((permissions, principal)) = raw.split_once('=') else {
                bail!("--keep expects perms=webid, got `{}`", raw);
            };
            grants.add(PermissionSet::parse_list(permissions)?, principal.trim());
        }
        Ok(grants)
    }

    fn options(&self) -> anyhow::Result<CompileOptions> {
        let expires_at = match &self.expires_at {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .with_context(|| format!("invalid --expires-at `{}`", raw))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        Ok(CompileOptions {
            public_read: self.public_read,
            expires_at,
            client_ids: self.client_ids.clone(),
            created_at: None,
        })
    }
}

/// Cancel the saga on Ctrl-C. Steps after the policy write are skipped.
fn cancel_on_interrupt() -> CancelSignal {
    let (handle, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            handle.cancel();
        }
    });
    signal
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = SharingConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Err(err) = telemetry::init_tracing(&config.logging) {
        eprintln!("tracing already initialised: {}", err);
    }

    let mut client = HttpPodClient::new(config.request_timeout())?;
    match (&cli.access_token, &cli.dpop_proof) {
        (Some(access_token), Some(proof)) => {
            client = client.with_tokens(Arc::new(StaticTokens(TokenPair {
                access_token: access_token.clone(),
                proof: proof.clone(),
            })));
        }
        (None, None) => {}
        _ => bail!("--access-token and --dpop-proof must be given together"),
    }
    let sharing = SharingOrchestrator::new(Arc::new(client), Arc::new(SystemClock), config);

    match cli.command {
        Commands::Init { resource, owner } => {
            sharing.initialize_resource(&resource, &owner).await?;
            output::print_success(&format!("{}: owner-only policy written", resource));
        }
        Commands::Share(args) => {
            let request = ShareRequest::new(
                &args.resource,
                &args.owner,
                &args.recipient,
                PermissionSet::parse_list(&args.permissions)?,
                args.pattern.parse::<SharePattern>()?,
            )
            .with_options(args.policy.options()?)
            .with_existing(args.policy.grants()?);
            let request = match &args.granter {
                Some(granter) => request.with_granter(granter),
                None => request,
            };
            let result = sharing.share(request, cancel_on_interrupt()).await?;
            output::print_share(&result, cli.output)?;
        }
        Commands::Revoke(args) => {
            let request = RevokeRequest::new(
                &args.resource,
                &args.owner,
                &args.recipient,
                PermissionSet::parse_list(&args.permissions)?,
            )
            .keeping(args.pattern.parse::<SharePattern>()?, args.policy.grants()?)
            .with_options(args.policy.options()?);
            let request = match &args.granter {
                Some(granter) => request.with_granter(granter),
                None => request,
            };
            let result = sharing.revoke(request, cancel_on_interrupt()).await?;
            output::print_share(&result, cli.output)?;
        }
        Commands::Inspect { resource } => {
            let inspection = sharing.inspect(&resource).await?;
            output::print_inspection(&resource, inspection.as_ref(), cli.output)?;
        }
        Commands::Log(args) => {
            let principal = Principal::parse(&args.principal)?;
            if args.outgoing {
                let records = sharing.audit().read_outgoing(&principal).await?;
                return output::print_outgoing(&records, cli.output);
            }
            let view = sharing.audit().read(&principal).await?;
            if view.skipped > 0 || !view.recovered.is_empty() {
                warn!(
                    skipped = view.skipped,
                    recovered = view.recovered.len(),
                    "log contains damaged lines"
                );
            }
            let mut entries = if args.shared_with_me {
                view.shared_with_me(&principal)
            } else if args.shared_by_me {
                view.shared_by_me(&principal)
            } else if args.latest {
                view.latest_per_resource()
            } else {
                view.entries.clone()
            };
            if args.latest && (args.shared_with_me || args.shared_by_me) {
                entries = podshare_audit::query::latest_per_resource(&entries);
            }
            if let Some(needle) = &args.resource {
                entries = podshare_audit::query::filter_by_resource(&entries, needle);
            }
            output::print_entries(&entries, cli.output)?;
        }
    }
    Ok(())
}
