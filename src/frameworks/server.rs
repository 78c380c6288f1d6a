// Framework bootstrap for the generator server runtime.

use crate::domain::keys::KeySpace;
use crate::domain::ports::{Clock, Economy, GeneratorHook, KeyValueStore, PresenceSource};
use crate::domain::user::UserProfile;
use crate::frameworks::config::{self, Settings};
use crate::frameworks::db;
use crate::interface_adapters::clients::EconomyClient;
use crate::interface_adapters::clients::economy::DisabledEconomy;
use crate::interface_adapters::events::EventBoard;
use crate::interface_adapters::feed;
use crate::interface_adapters::memory_store::InMemoryStore;
use crate::interface_adapters::postgres_store::PostgresStore;
use crate::interface_adapters::presence::PresenceBoard;
use crate::interface_adapters::routes::app;
use crate::interface_adapters::state::{AppState, SystemClock};
use crate::use_cases::hooks::WorldDropMultiplier;
use crate::use_cases::{
    AutoSellBatcher, BackgroundTasks, CorruptionSettings, CorruptionTask, EngineContext,
    GeneratorCache, GeneratorMaintenance, GeneratorRepository, LockAcquirer, LockManager,
    NotifyTask, RestoreSettings, SellCalculator, SimulationLoop, SimulationSettings,
    UserRepository, spawn_periodic,
};

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::net::SocketAddr;
use std::{io::Result, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    // build state
    let settings = Settings::load(config::settings_path()).map_err(std::io::Error::other)?;
    let store = build_store().await?;
    let economy = build_economy()?;
    let engine = Engine::start(settings, store, config::server_id(), economy);

    let app = app(engine.state.clone());
    tracing::info!(%address, server_id = engine.state.ctx.locks.server_id(), "listening");

    // Serve app and report errors rather than panicking
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "server error");
        });

    engine.shutdown().await;
    served
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

async fn build_store() -> Result<Arc<dyn KeyValueStore>> {
    let Some(database_url) = config::database_url() else {
        tracing::warn!("DATABASE_URL not set; using a process-local store");
        return Ok(Arc::new(InMemoryStore::new(Arc::new(SystemClock))));
    };

    let pool = db::connect_pool(&database_url)
        .await
        .map_err(|e| std::io::Error::other(format!("failed to connect to database: {e}")))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| std::io::Error::other(format!("failed to run migrations: {e}")))?;
    tracing::debug!("database store ready");
    Ok(Arc::new(PostgresStore::new(pool)))
}

fn build_economy() -> Result<Arc<dyn Economy>> {
    let Some(base_url) = config::economy_service_url() else {
        tracing::warn!("ECONOMY_SERVICE_URL not set; paid actions are disabled");
        return Ok(Arc::new(DisabledEconomy));
    };

    let timeout = config::economy_timeout();
    let client = EconomyClient::new(base_url.clone(), timeout)
        .map_err(|e| std::io::Error::other(format!("failed to initialize economy client: {e}")))?;
    tracing::debug!(
        economy_base_url = %base_url,
        economy_timeout_ms = timeout.as_millis(),
        "economy client configured"
    );
    Ok(Arc::new(client))
}

// Everything one process runs: shared state for the HTTP layer plus the owned background tasks.
pub struct Engine {
    pub state: AppState,
    tasks: BackgroundTasks,
    simulation: Arc<SimulationLoop>,
    autosell: Arc<AutoSellBatcher>,
    dispatcher: JoinHandle<()>,
}

impl Engine {
    // Wires the components and starts every periodic task. Must run inside a tokio runtime.
    pub fn start(
        settings: Settings,
        store: Arc<dyn KeyValueStore>,
        server_id: String,
        economy: Arc<dyn Economy>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let keys = KeySpace::new(settings.keys.prefix.clone());
        let catalog = Arc::new(settings.catalog());
        let worlds = Arc::new(settings.world_rules());

        let repository = Arc::new(GeneratorRepository::new(store.clone(), keys.clone()));
        let locks = Arc::new(LockManager::new(
            store.clone(),
            keys.clone(),
            clock.clone(),
            &server_id,
            settings.lock_ttl(),
        ));
        let users = Arc::new(UserRepository::new(store, keys));
        let presence = Arc::new(PresenceBoard::new());
        let events = Arc::new(EventBoard::new(clock));

        // Foreground dispatcher: one consumer applying presentation commands in order.
        let (presentation, presentation_rx) = feed::channel(config::PRESENTATION_CHANNEL_CAPACITY);
        let (feed_tx, _) = broadcast::channel(config::FEED_BROADCAST_CAPACITY);
        let dispatcher = tokio::spawn(feed::run_dispatcher(presentation_rx, feed_tx.clone()));

        let hooks: Vec<Arc<dyn GeneratorHook>> =
            vec![Arc::new(WorldDropMultiplier::new(worlds.clone()))];
        let ctx = EngineContext {
            catalog,
            worlds: worlds.clone(),
            repository: repository.clone(),
            locks,
            cache: Arc::new(GeneratorCache::new(repository)),
            users: users.clone(),
            presence: presence.clone(),
            events: events.clone(),
            presentation: Arc::new(presentation),
            hooks,
        };

        let autosell = Arc::new(AutoSellBatcher::new(
            users.clone(),
            worlds,
            economy.clone(),
            SellCalculator::new(settings.autosell.multiplier_limit),
            settings.autosell.flush_interval_seconds,
        ));
        let simulation = Arc::new(SimulationLoop::new(
            ctx.clone(),
            SimulationSettings {
                tick: settings.tick(),
                save_every_ticks: settings.simulation.save_every_ticks,
                online_only: settings.simulation.online_only,
                blacklisted_worlds: settings.simulation.blacklisted_worlds.clone(),
                show_markers: settings.corruption.enabled && settings.corruption.show_markers,
            },
            autosell.clone(),
            StdRng::from_entropy(),
        ));
        let corruption_settings = CorruptionSettings {
            enabled: settings.corruption.enabled,
            percentage: settings.corruption.percentage,
            interval: Duration::from_secs(settings.corruption.interval_minutes * 60),
            notify_interval: Duration::from_secs(settings.corruption.notify_interval_minutes * 60),
            blacklisted_generators: settings.corruption.blacklisted_generators.clone(),
        };
        let corruption = Arc::new(CorruptionTask::new(
            ctx.clone(),
            corruption_settings.clone(),
            StdRng::from_entropy(),
        ));
        let notify = Arc::new(NotifyTask::new(ctx.clone(), corruption_settings.enabled));
        let acquirer = Arc::new(LockAcquirer::new(
            ctx.clone(),
            settings.include_offline_owners(),
        ));
        let maintenance = Arc::new(GeneratorMaintenance::new(
            ctx.clone(),
            economy,
            RestoreSettings {
                safe_restoration: settings.restore.safe_restoration,
                cleanup_orphaned: settings.restore.cleanup_orphaned,
            },
        ));

        let mut tasks = BackgroundTasks::new();
        tasks.push(spawn_periodic(
            "lock-acquirer",
            settings.acquire_interval(),
            move || {
                let acquirer = acquirer.clone();
                async move {
                    match acquirer.run_pass().await {
                        Ok(report) => tracing::debug!(
                            candidates = report.candidates,
                            acquired = report.acquired,
                            renewed = report.renewed,
                            lost = report.lost,
                            released = report.released,
                            "lease scan finished"
                        ),
                        Err(e) => tracing::warn!(error = %e, "lease scan skipped"),
                    }
                }
            },
        ));
        let simulation_task = simulation.clone();
        tasks.push(spawn_periodic("simulation", settings.tick(), move || {
            let simulation = simulation_task.clone();
            async move {
                simulation.run_pass().await;
            }
        }));
        if corruption_settings.enabled {
            let corruption_task = corruption.clone();
            tasks.push(spawn_periodic(
                "corruption",
                Duration::from_secs(1),
                move || {
                    let corruption = corruption_task.clone();
                    async move {
                        corruption.tick().await;
                    }
                },
            ));
            tasks.push(spawn_periodic(
                "corruption-notify",
                corruption_settings.notify_interval,
                move || {
                    let notify = notify.clone();
                    async move {
                        notify.run_pass().await;
                    }
                },
            ));
        }
        let autosell_task = autosell.clone();
        tasks.push(spawn_periodic("autosell", Duration::from_secs(1), move || {
            let autosell = autosell_task.clone();
            async move {
                autosell.tick().await;
            }
        }));
        // Profiles of offline owners with nothing left to deposit are dropped after saving.
        let user_presence = presence.clone();
        let user_sales = autosell.clone();
        tasks.push(spawn_periodic(
            "user-save",
            config::USER_SAVE_INTERVAL,
            move || {
                let users = users.clone();
                let presence = user_presence.clone();
                let sales = user_sales.clone();
                async move {
                    let snapshot = presence.snapshot();
                    let keep = |profile: &UserProfile| {
                        snapshot.is_online(&profile.id) || sales.pending_for(&profile.id).is_some()
                    };
                    match users.save_and_evict(keep).await {
                        Ok(0) => {}
                        Ok(evicted) => tracing::debug!(evicted, "evicted offline user profiles"),
                        Err(e) => tracing::error!(error = %e, "user profile save failed"),
                    }
                }
            },
        ));

        tracing::info!(
            generator_types = ctx.catalog.len(),
            tasks = tasks.len(),
            "engine started"
        );
        let state = AppState {
            ctx,
            maintenance,
            corruption,
            presence,
            events,
            feed_tx,
        };
        Self {
            state,
            tasks,
            simulation,
            autosell,
            dispatcher,
        }
    }

    // Stops the tasks, then writes everything back and gives up every lease.
    pub async fn shutdown(mut self) {
        self.tasks.stop_all().await;
        self.simulation.clear_markers();

        let ctx = &self.state.ctx;
        match ctx.cache.flush_ids(&ctx.locks.held_ids().await).await {
            Ok(saved) => tracing::info!(saved, "generators saved"),
            Err(e) => tracing::error!(error = %e, "final generator save failed"),
        }
        let deposits = self.autosell.flush_all().await;
        if deposits.failed > 0 {
            tracing::warn!(failed = deposits.failed, "some auto-sell deposits failed");
        }
        if let Err(e) = ctx.users.save_all().await {
            tracing::error!(error = %e, "final user profile save failed");
        }
        let released = ctx.locks.release_all().await;
        ctx.cache.clear().await;
        tracing::info!(released, "leases released");

        self.dispatcher.abort();
    }
}
