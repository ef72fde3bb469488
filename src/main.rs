use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stockpulse::adapters::{BroadcastHub, PostgresStore, WebhookNotifier};
use stockpulse::alerts::{AlertEvaluationEngine, AlertWorkingSet, DispatchQueue, PendingTriggers};
use stockpulse::cache::PriceCache;
use stockpulse::config::AppConfig;
use stockpulse::domain::ActivationState;
use stockpulse::error::{EngineError, Result};
use stockpulse::ports::{NotificationSender, QuoteProvider};
use stockpulse::providers::{FinnhubQuoteProvider, QuoteSourceAdapter, YahooQuoteProvider};
use stockpulse::scheduler::{self, ScheduleRule};
use stockpulse::services::{HealthServer, HealthState, Metrics};
use stockpulse::sync::PriceSyncEngine;
use stockpulse::window::ActiveWindowController;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DB_PING_INTERVAL: Duration = Duration::from_secs(60);

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{default_level},sqlx=warn,hyper=warn,reqwest=warn"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging.level);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config error: {e}");
        }
        return Err(EngineError::Validation(errors.join("; ")));
    }

    info!(
        watchlist = config.sync.symbols.len(),
        window_open = %config.window.open,
        window_close = %config.window.close,
        "starting market data sync and alert engine"
    );

    let metrics = Arc::new(Metrics::new());
    let health = Arc::new(HealthState::new());
    let cache = Arc::new(PriceCache::new());
    let hub = Arc::new(BroadcastHub::default());

    let mut providers: Vec<Arc<dyn QuoteProvider>> =
        vec![Arc::new(YahooQuoteProvider::new(&config.providers.yahoo)?)];
    if let Some(finnhub) = &config.providers.finnhub {
        providers.push(Arc::new(FinnhubQuoteProvider::new(finnhub)?));
    }
    info!(providers = providers.len(), "quote provider chain ready");

    let adapter = Arc::new(QuoteSourceAdapter::new(
        providers,
        Duration::from_secs(config.providers.timeout_secs),
        Arc::clone(&metrics),
    ));

    let store = Arc::new(
        PostgresStore::connect(&config.database.url, config.database.max_connections).await?,
    );

    let window = Arc::new(ActiveWindowController::new(
        &config.window,
        hub.clone(),
    )?);
    // derive the initial activation state before anything subscribes
    window.evaluate(Utc::now()).await;

    let sync_engine = Arc::new(PriceSyncEngine::new(
        Arc::clone(&cache),
        adapter,
        store.clone(),
        hub.clone(),
        Arc::clone(&health),
        Arc::clone(&metrics),
        config.cache.clone(),
        config.sync.max_consecutive_failures,
        Duration::from_secs(config.sync.active_interval_secs),
        window.subscribe(),
    ));

    let working_set = Arc::new(AlertWorkingSet::new(store.clone(), Arc::clone(&metrics)));
    working_set.reload().await;

    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let pending = Arc::new(PendingTriggers::new());
    let evaluator = Arc::new(AlertEvaluationEngine::new(
        Arc::clone(&cache),
        Arc::clone(&working_set),
        queue_tx,
        Arc::clone(&pending),
        Arc::clone(&metrics),
    ));

    let notifier: Option<Arc<dyn NotificationSender>> = match &config.notifier.gateway_url {
        Some(url) => Some(Arc::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_secs(config.providers.timeout_secs),
        )?)),
        None => {
            warn!("no notification gateway configured, triggers will only be broadcast");
            None
        }
    };

    let dispatcher = Arc::new(DispatchQueue::new(
        store.clone(),
        Arc::clone(&working_set),
        notifier,
        hub.clone(),
        pending,
        Arc::clone(&metrics),
        Duration::from_millis(config.dispatch.drain_interval_ms),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // activation window failsafe
    {
        let window = Arc::clone(&window);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { window.run(shutdown).await });
    }

    // price sync, with a faster cadence in the closing minutes of the window
    {
        let sync_config = config.sync.clone();
        let window_for_pick = Arc::clone(&window);
        let pick = move |state: ActivationState| match state {
            ActivationState::Standby => {
                ScheduleRule::fixed(Duration::from_secs(sync_config.standby_interval_secs))
            }
            ActivationState::Active => {
                let closing = window_for_pick
                    .minutes_to_close(Utc::now())
                    .is_some_and(|minutes| minutes <= sync_config.closing_window_minutes);
                let secs = if closing {
                    sync_config.closing_interval_secs
                } else {
                    sync_config.active_interval_secs
                };
                window_for_pick.active_schedule(Duration::from_secs(secs))
            }
        };

        let watchlist = config.sync.symbols.clone();
        let engine = Arc::clone(&sync_engine);
        let working_set_for_sync = Arc::clone(&working_set);
        let job = move || {
            let engine = Arc::clone(&engine);
            let working_set = Arc::clone(&working_set_for_sync);
            let mut symbols = watchlist.clone();
            async move {
                symbols.extend(working_set.symbols().await);
                symbols.sort();
                symbols.dedup();
                engine.sync_once(&symbols).await;
            }
        };

        let state_rx = window.subscribe();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(scheduler::run_cadenced("price-sync", state_rx, shutdown, pick, job));
    }

    // alert evaluation
    {
        let alerts_config = config.alerts.clone();
        let pick = move |state: ActivationState| {
            let secs = match state {
                ActivationState::Active => alerts_config.eval_active_interval_secs,
                ActivationState::Standby => alerts_config.eval_standby_interval_secs,
            };
            ScheduleRule::fixed(Duration::from_secs(secs))
        };
        let evaluator = Arc::clone(&evaluator);
        let job = move || {
            let evaluator = Arc::clone(&evaluator);
            async move { evaluator.evaluate_all().await }
        };
        let state_rx = window.subscribe();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(scheduler::run_cadenced("alert-eval", state_rx, shutdown, pick, job));
    }

    // working set reload, same cadence in both states
    {
        let working_set = Arc::clone(&working_set);
        let interval = Duration::from_secs(config.alerts.reload_interval_secs);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            scheduler::run_fixed("working-set-reload", interval, shutdown, move || {
                let working_set = Arc::clone(&working_set);
                async move { working_set.reload().await }
            })
            .await
        });
    }

    // trigger dispatch
    {
        let dispatcher = Arc::clone(&dispatcher);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { dispatcher.run(queue_rx, shutdown).await });
    }

    // database liveness feeds the health endpoint
    {
        let store = store.clone();
        let health = Arc::clone(&health);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            scheduler::run_fixed("db-ping", DB_PING_INTERVAL, shutdown, move || {
                let store = store.clone();
                let health = Arc::clone(&health);
                async move {
                    match store.ping().await {
                        Ok(()) => health.record_db_check(true),
                        Err(e) => {
                            error!(error = %e, "database ping failed");
                            health.record_db_check(false);
                        }
                    }
                }
            })
            .await
        });
    }

    // health probes
    {
        let server = HealthServer::new(
            Arc::clone(&health),
            Arc::clone(&metrics),
            Arc::clone(&window),
            config.health_port.unwrap_or(8080),
        );
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "health server exited");
            }
        });
    }

    signal::ctrl_c().await?;
    info!("shutdown signal received, stopping jobs");
    let _ = shutdown_tx.send(true);

    // give the loops a moment to observe the flag
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("final metrics: {}", metrics.summary());

    Ok(())
}
