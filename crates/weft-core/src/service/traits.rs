use std::any::Any;

use async_trait::async_trait;

use crate::com::signal::HasSignals;
use crate::kernel::error::Result;
use crate::service::context::ServiceContext;
use crate::service::keys::{AutoConnections, KeyDecl};
use crate::service::slots::ServiceSlots;

/// Downcasting support for boxed components.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Behaviour of a component implementation.
///
/// The framework owns the instance and calls the hooks from the component's
/// worker, one at a time, in the order the lifecycle allows:
/// `configuring` (possibly repeated) → `starting` → `updating`/`swapping`
/// any number of times → `stopping`. Declarations (`keys`,
/// `auto_connections`, `register_*`) are read once, at creation.
#[async_trait]
pub trait Service: AsAny + Send + 'static {
    /// Object keys this component binds to.
    fn keys(&self) -> Vec<KeyDecl> {
        Vec::new()
    }

    /// Object signals connected to this component's slots while started.
    fn auto_connections(&self) -> AutoConnections {
        AutoConnections::default()
    }

    fn register_signals(&self, _signals: &mut HasSignals) {}

    fn register_slots(&self, _slots: &mut ServiceSlots<'_>) {}

    async fn configuring(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }

    async fn starting(&mut self, ctx: &mut ServiceContext) -> Result<()>;

    async fn updating(&mut self, ctx: &mut ServiceContext) -> Result<()>;

    /// Called after the object bound to `key` was replaced.
    async fn swapping(&mut self, _ctx: &mut ServiceContext, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn stopping(&mut self, ctx: &mut ServiceContext) -> Result<()>;
}
