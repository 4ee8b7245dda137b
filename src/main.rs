#![deny(clippy::implicit_return)]
#![allow(clippy::needless_return)]

mod application;
mod configuration;
mod domain;
mod infrastructure;

use std::env;
use std::process;

use anyhow::bail;
use anyhow::Error;
use anyhow::Result;
use domain::models::ConnectorName;
use domain::services::ReconnectPolicy;
use domain::services::RelayService;
use domain::services::SessionContext;
use domain::services::SessionService;
use infrastructure::backends::BackendManager;
use infrastructure::connectors::ConnectorManager;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use yansi::Paint;

use crate::application::cli;
use crate::application::server;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::configuration::LogFormat;

fn handle_error(err: Error) {
    eprintln!(
        "{}",
        Paint::red(format!(
            "WhatsApp relay has failed with the following app version and error.\n\nVersion: {}\nCommit: {}\nError: {}",
            env!("CARGO_PKG_VERSION"),
            env!("VERGEN_GIT_DESCRIBE"),
            err
        ))
    );

    let backtrace = err.backtrace();
    if backtrace.to_string() == "disabled backtrace" {
        let args = env::args().collect::<Vec<String>>().join(" ");
        eprintln!("\nRunning the following can help explain further what the issue is:");
        eprintln!("\nRUST_BACKTRACE=1 {args}");
    } else {
        eprintln!("\n{}", backtrace);
    }

    process::exit(1);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| return EnvFilter::new("whatsapp_relay=info,tower_http=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if Config::get(ConfigKey::LogFormat) == LogFormat::Json.to_string() {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?err, "Unable to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = ?err, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn shutdown(session: SessionContext) {
    tracing::info!("Shutting down, logging out of WhatsApp");
    if let Err(err) = session.logout().await {
        tracing::error!(error = ?err, "Failed to log out");
    }
}

async fn run() -> Result<()> {
    let connector_name = match ConnectorName::parse(Config::get(ConfigKey::Connector)) {
        Some(name) => name,
        None => bail!(format!(
            "Unknown connector '{}'",
            Config::get(ConfigKey::Connector)
        )),
    };

    let connector = ConnectorManager::get(connector_name);
    if let Err(err) = connector.health_check().await {
        tracing::warn!(
            error = ?err,
            connector = %connector.name(),
            "Gateway health check failed, the session will keep retrying"
        );
    }

    let policy = ReconnectPolicy {
        reconnect_delay: Config::get_duration(ConfigKey::ReconnectDelay)?,
        init_retry_delay: Config::get_duration(ConfigKey::InitRetryDelay)?,
    };
    let session = SessionService::new(connector, policy);
    let context = session.context();
    let relay = RelayService::new(
        BackendManager::get(),
        context.clone(),
        &Config::get(ConfigKey::FallbackMessage),
    );

    let addr = format!(
        "{}:{}",
        Config::get(ConfigKey::Host),
        Config::get(ConfigKey::Port)
    );
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(
        addr = %addr,
        backend_url = %Config::get(ConfigKey::BackendURL),
        connector = %connector_name,
        instance = %Config::get(ConfigKey::Instance),
        webhook_url = %Config::get(ConfigKey::WebhookURL),
        "WhatsApp relay started"
    );

    tokio::select! {
        res = session.start(relay) => res?,
        res = server::serve(listener, context.clone()) => res?,
        _ = shutdown_signal() => shutdown(context).await,
    }

    return Ok(());
}

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));

    let ready = match cli::parse().await {
        Ok(ready) => ready,
        Err(err) => {
            handle_error(err);
            return;
        }
    };
    if !ready {
        process::exit(0);
    }

    init_tracing();

    if let Err(err) = run().await {
        handle_error(err);
    }

    process::exit(0);
}
