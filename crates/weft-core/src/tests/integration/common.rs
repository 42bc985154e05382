use std::sync::Arc;

use async_trait::async_trait;

use crate::app_config::loader::{ConfigFormat, parse_document};
use crate::data::object::MODIFIED_SIG;
use crate::kernel::context::Context;
use crate::kernel::error::Result;
use crate::service::context::ServiceContext;
use crate::service::keys::{AutoConnections, KeyDecl};
use crate::service::slots::ServiceSlots;
use crate::service::tests::fixtures::{MIXER, Mixer, PRODUCER, Producer};
use crate::service::traits::Service;

pub const DOUBLER: &str = "test::Doubler";

/// Writes twice its `source` into its `target` on every source change.
#[derive(Default)]
pub struct Doubler {
    pub applied: usize,
}

#[async_trait]
impl Service for Doubler {
    fn keys(&self) -> Vec<KeyDecl> {
        vec![KeyDecl::input("source"), KeyDecl::inout("target")]
    }

    fn auto_connections(&self) -> AutoConnections {
        AutoConnections::new().with("source", MODIFIED_SIG, "apply")
    }

    fn register_slots(&self, slots: &mut ServiceSlots<'_>) {
        slots.method::<Doubler, (), _>("apply", |doubler, ctx, ()| {
            let value = ctx.input("source")?.value::<i64>()?;
            ctx.inout("target")?.set_value(value * 2)?;
            doubler.applied += 1;
            Ok(())
        });
    }

    async fn starting(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        ctx.input("source")?;
        ctx.inout("target")?;
        Ok(())
    }

    async fn updating(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }

    async fn stopping(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }
}

/// Context built from a document's `context` section, with the document's
/// templates and the test components registered.
pub fn context_from(text: &str, format: ConfigFormat) -> (Arc<Context>, Vec<String>) {
    let document = parse_document(text, format).expect("parse document");
    let context = Context::with_config(document.context.clone()).expect("context");
    context.register_service::<Doubler>(DOUBLER).expect("register doubler");
    context.register_service::<Mixer>(MIXER).expect("register mixer");
    context.register_service::<Producer>(PRODUCER).expect("register producer");
    let ids = context.register_document(&document).expect("register templates");
    (context, ids)
}

/// Every task queued on `worker` so far has run once this returns.
pub async fn drain(context: &Context, worker: &str) {
    context
        .workers()
        .get(worker)
        .expect("worker")
        .run(async {})
        .await
        .expect("barrier");
}
