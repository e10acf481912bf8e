// Service supervisor
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use serde_json::Value;
use tracing::{info, warn};

use crate::event::{MessageBus, Topic, BUS_SERVICE_NAME};
use crate::executor::Executor;
use crate::plugin::manager::PluginManager;
use crate::service::{Service, ServiceContext};
use crate::{EngramError, Result};

/// Owns the executor, the bus, the plugin manager, and every registered
/// service. Construction drives the full bring-up: async-init the bus
/// service first (so subscriptions can be wired before traffic), async-init
/// everything else, then start each service in declaration order.
///
/// Shutdown runs the reverse: stop services back-to-front, close the bus,
/// stop the executor, and surface the first queued background failure as a
/// terminal error.
pub struct Host {
    ctx: Arc<ServiceContext>,
    services: Vec<Box<dyn Service>>,
    errors: Receiver<EngramError>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

impl Host {
    pub fn new(profile_name: &str, services: Vec<Box<dyn Service>>) -> Result<Self> {
        let (error_tx, error_rx) = unbounded();
        let executor = Arc::new(Executor::new(error_tx)?);
        let plugins = Arc::new(PluginManager::new(profile_name)?);
        let bus = Arc::new(MessageBus::new());

        let ctx = Arc::new(ServiceContext {
            bus,
            executor,
            plugins,
        });

        let mut services = services;
        let bus_position = services.iter().position(|s| s.name() == BUS_SERVICE_NAME);
        if bus_position.is_none() {
            warn!("no bus service registered; published events will never be delivered");
        }

        if let Some(position) = bus_position {
            services[position].init_async(&ctx)?;
        }
        for (i, service) in services.iter_mut().enumerate() {
            if Some(i) == bus_position {
                continue;
            }
            service.init_async(&ctx)?;
        }

        for service in services.iter_mut() {
            service.start(&ctx)?;
            info!("service {} started", service.name());
        }

        let (stop_tx, stop_rx) = bounded(1);

        // SIGINT requests an orderly shutdown.
        let stop = stop_tx.clone();
        ctx.executor.run_background(async move {
            tokio::signal::ctrl_c().await.map_err(EngramError::Io)?;
            info!("interrupt received, requesting shutdown");
            let _ = stop.try_send(());
            Ok(())
        });

        Ok(Self {
            ctx,
            services,
            errors: error_rx,
            stop_tx,
            stop_rx,
        })
    }

    pub fn context(&self) -> Arc<ServiceContext> {
        Arc::clone(&self.ctx)
    }

    pub fn publish(&self, topic: Topic, payload: Value) {
        self.ctx.bus.publish(topic, payload);
    }

    /// Ask `wait_for_shutdown` to return. Safe to call from any thread.
    pub fn request_shutdown(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Block the calling thread until a shutdown is requested (or the
    /// timeout elapses), then tear everything down.
    pub fn wait_for_shutdown(mut self, timeout: Option<Duration>) -> Result<()> {
        match timeout {
            Some(timeout) => {
                let _ = self.stop_rx.recv_timeout(timeout);
            }
            None => {
                let _ = self.stop_rx.recv();
            }
        }
        self.shutdown_inner()
    }

    /// Tear down immediately.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<()> {
        for service in self.services.iter_mut().rev() {
            if let Err(err) = service.stop() {
                warn!("service {} failed to stop: {}", service.name(), err);
            }
        }

        self.ctx.bus.shutdown();
        self.ctx.executor.stop();

        // A background failure anywhere during the run is a terminal error
        // carrying the first cause.
        if let Ok(err) = self.errors.try_recv() {
            return Err(err);
        }
        Ok(())
    }
}
