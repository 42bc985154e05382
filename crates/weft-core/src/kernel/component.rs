use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::kernel::error::Result;

/// Lifecycle of the long-lived pieces a [`Context`](crate::kernel::context::Context)
/// is made of (the worker pool and the context itself).
#[async_trait]
pub trait KernelComponent: Any + Send + Sync + Debug {
    fn name(&self) -> &'static str;
    async fn initialize(&self) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}
