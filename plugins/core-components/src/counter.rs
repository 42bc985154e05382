use async_trait::async_trait;
use serde_json::json;
use weft_core::data::MODIFIED_SIG;
use weft_core::{AutoConnections, KeyDecl, Result, Service, ServiceContext, ServiceSlots};

const COUNT_KEY: &str = "count";

/// Counts modifications of `source` and publishes the tally as the
/// `Integer` output `count`.
#[derive(Debug, Default)]
pub struct Counter {
    count: i64,
}

#[async_trait]
impl Service for Counter {
    fn keys(&self) -> Vec<KeyDecl> {
        vec![KeyDecl::input("source"), KeyDecl::output(COUNT_KEY)]
    }

    fn auto_connections(&self) -> AutoConnections {
        AutoConnections::new().with("source", MODIFIED_SIG, "count")
    }

    fn register_slots(&self, slots: &mut ServiceSlots<'_>) {
        slots.method::<Counter, (), _>("count", |counter, ctx, ()| {
            counter.count += 1;
            if let Some(output) = ctx.output(COUNT_KEY) {
                output.set_value(counter.count)?;
            }
            Ok(())
        });
    }

    async fn starting(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        ctx.input("source")?;
        self.count = 0;
        ctx.create_output(COUNT_KEY, "Integer", Some(json!(0)))?;
        Ok(())
    }

    async fn updating(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }

    async fn stopping(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        ctx.clear_output(COUNT_KEY);
        Ok(())
    }
}
