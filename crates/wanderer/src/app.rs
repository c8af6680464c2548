//! Service wiring: map manager, kill pipeline and the periodic loops.

use crate::bridge::{MapKillSink, SnapshotMapSource};
use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::logging::setup_logging;
use crate::signals::wait_for_shutdown;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use wanderer_kills::{
    AlwaysEntitled, CachedLookup, EntitledMaps, Enricher, Entitlements, FeedSettings, KillCache, KillPipeline,
    KillSubscriptionManager, OfflineLookup, SubscriptionSync, SystemTracker, TimeHandler, WebSocketFeedClient,
};
use wanderer_map::{
    EngineContext, InMemoryRepository, InMemoryStaticInfo, MapManager, PermissiveStaticInfo, StaticInfo, SystemClock,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Application {
    config: AppConfig,
    manager: MapManager,
}

impl Application {
    /// Loads configuration, applies CLI overrides, initializes logging and
    /// builds the map manager.
    pub async fn new(args: CliArgs) -> Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, &args);
        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;

        setup_logging(&config.logging)?;

        let static_info: Arc<dyn StaticInfo> = match config.static_data_path() {
            Some(path) => {
                let systems = InMemoryStaticInfo::from_json_file(&path)?;
                info!(systems = systems.len(), path = %path.display(), "🌌 Static system data loaded");
                Arc::new(systems)
            }
            None => {
                warn!("No static data configured, accepting every solar system id");
                Arc::new(PermissiveStaticInfo)
            }
        };

        let manager = MapManager::new(
            EngineContext {
                repository: Arc::new(InMemoryRepository::with_default_options(config.default_map_options())),
                static_info,
                clock: Arc::new(SystemClock),
                settings: config.engine_settings(),
            },
            config.manager_settings(),
        );

        info!(
            "🚀 Wanderer v{} | config: {}",
            env!("CARGO_PKG_VERSION"),
            args.config_path.display()
        );
        Ok(Self { config, manager })
    }

    /// Runs until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = vec![self.spawn_gc_loop(shutdown_rx.clone())];
        if self.config.kills.enabled {
            tasks.extend(self.spawn_kill_feed(shutdown_rx)?);
        } else {
            info!("Kill feed disabled");
        }

        info!("✅ Wanderer is running, press Ctrl+C to stop");
        wait_for_shutdown().await?;
        info!("🛑 Shutdown signal received, stopping");

        let _ = shutdown_tx.send(true);
        self.manager.shutdown();
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("Background task did not stop in time");
            }
        }

        info!("👋 Wanderer stopped");
        Ok(())
    }

    fn spawn_gc_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let manager = self.manager.clone();
        spawn_periodic("map_gc", self.config.gc_interval(), shutdown, move || {
            let manager = manager.clone();
            async move {
                let expired = manager.run_gc().await;
                if expired > 0 {
                    info!(expired, "♻️ GC pass finished");
                }
            }
        })
    }

    fn spawn_kill_feed(&self, shutdown: watch::Receiver<bool>) -> Result<Vec<JoinHandle<()>>> {
        let kills = &self.config.kills;
        let cache = Arc::new(KillCache::new(kills.max_kills_per_system));
        let pipeline = Arc::new(KillPipeline::new(
            TimeHandler::new(self.config.kill_cutoff()),
            Enricher::new(Arc::new(CachedLookup::new(OfflineLookup)), self.config.retry_policy()),
            cache.clone(),
        ));

        let (client, feed_task) = WebSocketFeedClient::spawn(
            FeedSettings::new(kills.feed_url.clone()),
            pipeline,
            Arc::new(MapKillSink::new(self.manager.clone())),
            shutdown.clone(),
        );

        let entitlements: Arc<dyn Entitlements> = if kills.subscriptions_enabled {
            let entitled = self.config.entitled_maps().map_err(|e| anyhow!(e))?;
            info!(maps = entitled.len(), "Kill feed limited to entitled maps");
            Arc::new(EntitledMaps::new(entitled))
        } else {
            Arc::new(AlwaysEntitled)
        };
        let sync = Arc::new(SubscriptionSync {
            tracker: SystemTracker::new(self.config.active_map_window()),
            subscriptions: Arc::new(KillSubscriptionManager::new()),
            source: Arc::new(SnapshotMapSource::new(self.manager.clone())),
            entitlements,
            client: Arc::new(client),
        });

        let sync_task = spawn_periodic("kill_subscription_sync", self.config.sync_interval(), shutdown.clone(), move || {
            let sync = sync.clone();
            async move {
                if let Err(err) = sync.run_once(Utc::now()).await {
                    warn!(error = %err, "Kill subscription sync failed");
                }
            }
        });

        let cutoff = self.config.kill_cutoff();
        let prune_task = spawn_periodic("kill_cache_prune", self.config.gc_interval(), shutdown, move || {
            let cache = cache.clone();
            async move {
                let removed = cache.prune_older_than(Utc::now() - cutoff);
                if removed > 0 {
                    debug!(removed, "Pruned expired kills");
                }
            }
        });

        info!(url = %kills.feed_url, "💀 Kill feed started");
        Ok(vec![feed_task, sync_task, prune_task])
    }
}

fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(path) = &args.static_data {
        config.maps.static_data_path = Some(path.to_string_lossy().to_string());
    }
    if let Some(url) = &args.feed_url {
        config.kills.feed_url = url.clone();
        config.kills.enabled = true;
    }
    if args.no_kills {
        config.kills.enabled = false;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

/// Runs `tick` every `every` until shutdown is signalled.
fn spawn_periodic<F, Fut>(name: &'static str, every: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                _ = shutdown.changed() => break,
            }
        }
        debug!(name, "Periodic task stopped");
    })
}

/// Creates and runs the application; used by `main`.
pub async fn run(args: CliArgs) -> Result<()> {
    let app = Application::new(args).await.context("Failed to start application")?;
    app.run().await
}
