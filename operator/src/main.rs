//! Operator is a long lived process that runs the Nephio controllers.
#![deny(missing_docs)]

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::{join_all, FutureExt, LocalBoxFuture};
use kube::Client;
use tracing::{info, warn};

use nephio_common::telemetry;
use nephio_operator::{
    gitea::HttpGiteaClient,
    nfdeploy, porch, repository, token,
    utils::{Context, ControllerConfig},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(
        long,
        env = "OPERATOR_OTLP_ENDPOINT",
        default_value = "http://localhost:4317"
    )]
    otlp_endpoint: String,
}

/// Available Subcommands
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the enabled controllers
    Daemon(DaemonOpts),
}

#[derive(clap::Args, Debug)]
struct DaemonOpts {
    /// Comma separated controllers to run, or `*` for all of them.
    #[arg(long, env = "RECONCILERS", default_value = "")]
    reconcilers: String,

    /// Base URL of the gitea server.
    #[arg(long, env = "GIT_URL")]
    git_url: Option<String>,

    /// Namespace of the git secret, defaults to the pod namespace.
    #[arg(long, env = "GIT_NAMESPACE")]
    git_namespace: Option<String>,

    /// Name of the secret holding the gitea admin credentials.
    #[arg(long, env = "GIT_SECRET_NAME", default_value = "git-user-secret")]
    git_secret_name: String,

    /// How long to wait before checking a package revision for approval again.
    #[arg(long, env = "APPROVAL_REQUEUE", default_value = "15s", value_parser = humantime::parse_duration)]
    approval_requeue: Duration,
}

/// Controllers the operator can run.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Reconciler {
    Nfdeploy,
    Repository,
    Token,
    Approval,
}

impl Reconciler {
    fn name(&self) -> &'static str {
        match self {
            Reconciler::Nfdeploy => "nfdeploy",
            Reconciler::Repository => "repository",
            Reconciler::Token => "token",
            Reconciler::Approval => "approval",
        }
    }
}

/// Resolve the enabled controllers from the `--reconcilers` list and the `ENABLE_<NAME>` variables.
fn enabled_reconcilers(
    list: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<BTreeSet<Reconciler>> {
    let mut enabled = BTreeSet::new();
    for name in list.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        if name == "*" {
            enabled.extend(Reconciler::value_variants().iter().copied());
            continue;
        }
        let reconciler = Reconciler::from_str(name, true)
            .map_err(|_| anyhow!("unknown reconciler {name:?}"))?;
        enabled.insert(reconciler);
    }
    for reconciler in Reconciler::value_variants() {
        let var = format!("ENABLE_{}", reconciler.name().to_uppercase());
        if env(&var).is_some_and(|value| value == "true") {
            enabled.insert(*reconciler);
        }
    }
    Ok(enabled)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let metrics_provider = telemetry::init(args.otlp_endpoint.clone()).await?;

    info!(?args.command, ?args.otlp_endpoint, "starting operator");
    match args.command {
        Command::Daemon(opts) => daemon(opts).await?,
    }

    // Flush traces and metrics before shutdown
    telemetry::shutdown(metrics_provider)?;
    Ok(())
}

async fn daemon(opts: DaemonOpts) -> Result<()> {
    let enabled = enabled_reconcilers(&opts.reconcilers, |var| std::env::var(var).ok())?;
    if enabled.is_empty() {
        warn!("no reconcilers enabled");
        return Ok(());
    }

    let config = ControllerConfig {
        git_namespace: opts
            .git_namespace
            .or_else(|| std::env::var("POD_NAMESPACE").ok())
            .unwrap_or_else(|| "default".to_owned()),
        git_secret_name: opts.git_secret_name,
        approval_requeue: opts.approval_requeue,
    };
    let k_client = Client::try_default().await?;
    let gitea = HttpGiteaClient::new(opts.git_url.clone().unwrap_or_default());

    let needs_gitea =
        enabled.contains(&Reconciler::Repository) || enabled.contains(&Reconciler::Token);
    let _connector = match (&opts.git_url, needs_gitea) {
        (Some(_), true) => Some(gitea.connect(
            k_client.clone(),
            &config.git_namespace,
            &config.git_secret_name,
        )),
        (None, true) => {
            warn!("no git url configured, repository and token resources cannot be reconciled");
            None
        }
        _ => None,
    };

    let cx = Arc::new(Context::new(k_client, gitea, config));
    let controllers: Vec<LocalBoxFuture<'static, ()>> = enabled
        .iter()
        .map(|reconciler| {
            info!(reconciler = reconciler.name(), "enabling reconciler");
            match reconciler {
                Reconciler::Nfdeploy => nfdeploy::controller::run(cx.clone()).boxed_local(),
                Reconciler::Repository => repository::controller::run(cx.clone()).boxed_local(),
                Reconciler::Token => token::controller::run(cx.clone()).boxed_local(),
                Reconciler::Approval => porch::approval::run(cx.clone()).boxed_local(),
            }
        })
        .collect();
    join_all(controllers).await;
    Ok(())
}
