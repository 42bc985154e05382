use async_trait::async_trait;
use weft_core::data::MODIFIED_SIG;
use weft_core::{AutoConnections, KeyDecl, Result, Service, ServiceContext, ServiceSlots};

/// Copies the value of `source` into `target` whenever `source` changes,
/// and once more on every update.
#[derive(Debug, Default)]
pub struct Forwarder;

fn forward(ctx: &ServiceContext) -> Result<()> {
    let value = ctx.input("source")?.raw_value();
    ctx.inout("target")?.set_value(value)
}

#[async_trait]
impl Service for Forwarder {
    fn keys(&self) -> Vec<KeyDecl> {
        vec![KeyDecl::input("source"), KeyDecl::inout("target")]
    }

    fn auto_connections(&self) -> AutoConnections {
        AutoConnections::new().with("source", MODIFIED_SIG, "forward")
    }

    fn register_slots(&self, slots: &mut ServiceSlots<'_>) {
        slots.method::<Forwarder, (), _>("forward", |_, ctx, ()| Ok(forward(ctx)?));
    }

    async fn starting(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        ctx.input("source")?;
        ctx.inout("target")?;
        Ok(())
    }

    async fn updating(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        forward(ctx)
    }

    async fn stopping(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }
}
