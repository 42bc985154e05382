use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use weft_core::{KeyDecl, Result, Service, ServiceContext};

/// Writes its `value` parameter into `target` on every update.
#[derive(Debug, Default)]
pub struct ValueSetter {
    value: Value,
}

#[async_trait]
impl Service for ValueSetter {
    fn keys(&self) -> Vec<KeyDecl> {
        vec![KeyDecl::inout("target")]
    }

    async fn configuring(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        self.value = ctx
            .params()
            .get("value")
            .cloned()
            .ok_or_else(|| format!("component '{}' needs a 'value' parameter", ctx.uid()))?;
        Ok(())
    }

    async fn starting(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        ctx.inout("target")?;
        Ok(())
    }

    async fn updating(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        let target = ctx.inout("target")?;
        target.set_value(&self.value)?;
        debug!("'{}' wrote {} into '{}'", ctx.uid(), self.value, target.uid());
        Ok(())
    }

    async fn stopping(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }
}
