use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clubsync::application::ports::{MemberPortal, RemoteCollection};
use clubsync::application::services::{RemoteTargets, RunOptions, SyncPipeline};
use clubsync::domain::value_objects::EntityKind;
use clubsync::infrastructure::database::{
    ConnectionPool, PortalStateRepository, TrackingRepository,
};
use clubsync::infrastructure::portal::{HttpPortal, SnapshotDir};
use clubsync::infrastructure::remote::RestCollection;
use clubsync::shared::config::{AppConfig, RemoteTargetConfig};

#[derive(Parser)]
#[command(name = "clubsync")]
#[command(about = "Synchronize club administration data with directory, mailing list and helpdesk targets", long_about = None)]
struct Cli {
    /// Sync every entity even when content hashes match
    #[arg(long)]
    force: bool,

    /// Verbose diagnostic logging
    #[arg(short, long)]
    verbose: bool,

    /// Restrict the run to one entity kind (member, parent, team,
    /// committee, work_history, important_date, helpdesk_customer)
    #[arg(long, value_name = "KIND")]
    entity: Option<String>,

    /// Tracking database location
    #[arg(long, env = "CLUBSYNC_DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("clubsync v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::from_env();
    if let Some(url) = cli.database_url.clone() {
        config.database.url = url;
    }
    config.validate()?;

    let entity_filter = match cli.entity.as_deref() {
        Some(raw) => Some(
            EntityKind::parse(raw)
                .ok_or_else(|| anyhow::anyhow!("unknown entity kind: {raw}"))?,
        ),
        None => None,
    };

    if let Some(path) = config.database.url.strip_prefix("sqlite:") {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    let pool = ConnectionPool::new(&config.database.url, config.database.max_connections).await?;
    pool.migrate().await?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.sync.request_timeout_secs))
        .build()?;

    let source = Arc::new(SnapshotDir::new(config.portal.snapshot_dir.clone()));
    let portal: Option<Arc<dyn MemberPortal>> = config
        .portal
        .automation_url
        .as_deref()
        .map(|url| Arc::new(HttpPortal::new(client.clone(), url)) as Arc<dyn MemberPortal>);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("stop requested, finishing the entity in flight");
                cancel.cancel();
            }
        });
    }

    let pipeline = SyncPipeline::new(
        TrackingRepository::new(pool.get_pool().clone()),
        PortalStateRepository::new(pool.get_pool().clone()),
        build_targets(&client, &config),
        source,
        portal,
        config.sync.clone(),
        cancel,
    );

    let summary = pipeline
        .run(&RunOptions {
            force: cli.force,
            entity_filter,
        })
        .await?;

    for report in &summary.reports {
        info!(
            kind = %report.kind,
            total = report.total,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors.len(),
            "entity kind finished"
        );
    }
    if let Some(reverse) = &summary.reverse {
        info!(
            members = reverse.members_synced,
            fields = reverse.fields_synced,
            errors = reverse.errors.len(),
            "reverse sync finished"
        );
    }

    pool.close().await;

    if summary.cancelled {
        warn!("run was cancelled before completing");
    }
    if summary.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn build_targets(client: &reqwest::Client, config: &AppConfig) -> RemoteTargets {
    let collection = |target: &RemoteTargetConfig, path: &str| -> Arc<dyn RemoteCollection> {
        let scoped = RemoteTargetConfig {
            base_url: format!("{}/{}", target.base_url.trim_end_matches('/'), path),
            ..target.clone()
        };
        Arc::new(RestCollection::new(client.clone(), &scoped))
    };
    RemoteTargets {
        members: collection(&config.directory, "members"),
        contacts: collection(&config.directory, "contacts"),
        team_lists: collection(&config.mailing_list, "lists"),
        committee_groups: collection(&config.directory, "groups"),
        work_history: collection(&config.directory, "work-history"),
        dates: collection(&config.directory, "dates"),
        customers: collection(&config.helpdesk, "customers"),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "clubsync=debug,info"
    } else {
        "clubsync=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
