use std::sync::Arc;

use serde_json::Value;

use crate::event::{MessageBus, Topic};
use crate::executor::Executor;
use crate::plugin::manager::PluginManager;
use crate::Result;

/// Shared handles every service works through: the bus for messaging, the
/// executor for async work, and the plugin manager for backends.
pub struct ServiceContext {
    pub bus: Arc<MessageBus>,
    pub executor: Arc<Executor>,
    pub plugins: Arc<PluginManager>,
}

impl ServiceContext {
    pub fn publish(&self, topic: Topic, payload: Value) {
        self.bus.publish(topic, payload);
    }
}

/// A unit of the runtime with a supervised lifecycle:
/// constructed -> async-initialized -> started -> stopped.
///
/// `init_async` resolves plugins and spawns long-running work; it runs on
/// the bus service before anything else so subscriptions can be wired before
/// traffic flows. `start` is where handlers subscribe - never earlier.
pub trait Service: Send {
    fn name(&self) -> &'static str;

    fn init_async(&mut self, ctx: &Arc<ServiceContext>) -> Result<()>;

    fn start(&mut self, ctx: &Arc<ServiceContext>) -> Result<()>;

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}
