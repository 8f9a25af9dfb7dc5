use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use host_admin::{
    api,
    assignment::{package::HttpPackageInstaller, AssignmentController},
    auth::{HostKeys, KeyAuthorizationService},
    config::Config,
    debugger::ProcessDebugger,
    events::{build_event_emitter, metrics::SiteIdentity, MetricsAggregator},
    host::process::{ProcessHostManager, ProcessHostOptions},
    settings::SettingsManager,
    status::StatusReporter,
    webhooks::{forward::ForwardingWebHookHandler, WebHookDispatcher, WebHookRegistry},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "host_admin=debug,tower_http=info".into()),
        )
        .with(fmt_layer)
        .init();

    info!(port = config.port, host_id = %config.host_id, "host admin starting");

    let identity = SiteIdentity::new(config.subscription_id.clone(), config.site_name.clone());

    // Function host supervisor
    let settings = SettingsManager::new();
    let host = ProcessHostManager::new(
        ProcessHostOptions {
            binary: config.host_binary.clone(),
            args: config.host_args.clone(),
            port: config.host_port,
            startup_timeout: config.host_startup_timeout,
            high_load_threshold: config.high_load_threshold,
            working_dir: config.script_root.clone(),
        },
        Arc::clone(&settings),
    );

    // Telemetry
    let emitter = build_event_emitter(config.event_sink);
    let metrics = MetricsAggregator::new(identity.clone());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;

    // Extension webhooks
    let mut registry = WebHookRegistry::new();
    for (name, upstream) in &config.webhook_extensions {
        info!(extension = %name, upstream = %upstream, "registering webhook");
        registry.register(
            name,
            Arc::new(ForwardingWebHookHandler::new(name, upstream, client.clone())),
        );
    }

    let installer = HttpPackageInstaller::new(client, std::env::temp_dir().join("host-admin"));

    let state = Arc::new(AppState {
        host: host.clone(),
        assignment: AssignmentController::new(
            host.clone(),
            Arc::new(installer),
            settings,
            config.script_root.clone(),
            identity.assignment.clone(),
        ),
        status: StatusReporter::new(
            host.clone(),
            Arc::clone(&emitter),
            config.host_id.clone(),
            identity.clone(),
        ),
        webhooks: WebHookDispatcher::new(
            registry,
            Arc::new(KeyAuthorizationService),
            Arc::clone(&emitter),
            Arc::clone(&metrics),
            config.site_name.clone(),
        ),
        emitter: Arc::clone(&emitter),
        metrics: Arc::clone(&metrics),
        debugger: Arc::new(ProcessDebugger::new(config.debugger_command.clone())),
        keys: HostKeys::new(config.master_key.clone(), config.system_keys.clone()),
        identity,
        self_hosted: config.self_hosted,
    });

    // Background tasks
    {
        let host = Arc::clone(&host);
        tokio::spawn(async move { host.start().await });
    }
    tokio::spawn(Arc::clone(&host).run_exit_watchdog());
    tokio::spawn(metrics.run_flush_loop(emitter, config.metrics_flush_interval));

    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down function host");
    host.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}
