use async_trait::async_trait;
use serde::Deserialize;
use weft_core::data::MODIFIED_SIG;
use weft_core::{AutoConnections, KeyDecl, Result, Service, ServiceContext, ServiceSlots};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogListenerParams {
    label: Option<String>,
}

/// Reports every modification of its `data` object as an info notification.
#[derive(Debug, Default)]
pub struct LogListener {
    label: Option<String>,
    logged: usize,
}

impl LogListener {
    pub fn logged(&self) -> usize {
        self.logged
    }
}

#[async_trait]
impl Service for LogListener {
    fn keys(&self) -> Vec<KeyDecl> {
        vec![KeyDecl::inout("data")]
    }

    fn auto_connections(&self) -> AutoConnections {
        AutoConnections::new().with("data", MODIFIED_SIG, "log")
    }

    fn register_slots(&self, slots: &mut ServiceSlots<'_>) {
        slots.method::<LogListener, (), _>("log", |listener, ctx, ()| {
            let data = ctx.inout("data")?;
            listener.logged += 1;
            let label = listener.label.as_deref().unwrap_or(data.uid());
            ctx.notify_info(format!("{} modified: {}", label, data.raw_value()));
            Ok(())
        });
    }

    async fn configuring(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        let params: LogListenerParams = ctx.parse_params()?;
        self.label = params.label;
        Ok(())
    }

    async fn starting(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        ctx.inout("data")?;
        self.logged = 0;
        Ok(())
    }

    async fn updating(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }

    async fn stopping(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }
}
