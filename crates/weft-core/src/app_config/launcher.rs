use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;

use crate::app_config::manager::AppConfigManager;
use crate::kernel::error::Result;
use crate::service::context::ServiceContext;
use crate::service::traits::Service;

/// Parameters of `weft::ConfigLauncher`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LauncherParams {
    /// Id of the configuration to launch.
    pub config: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Component that runs another configuration for as long as it is started.
#[derive(Debug, Default)]
pub struct ConfigLauncher {
    params: LauncherParams,
    manager: Option<AppConfigManager>,
}

impl ConfigLauncher {
    pub fn manager(&self) -> Option<&AppConfigManager> {
        self.manager.as_ref()
    }
}

#[async_trait]
impl Service for ConfigLauncher {
    async fn configuring(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        let params: LauncherParams = ctx.parse_params()?;
        ctx.context()?.app_config_template(&params.config)?;
        self.params = params;
        Ok(())
    }

    async fn starting(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        let mut manager = AppConfigManager::new(ctx.context()?, &self.params.config)
            .nested()
            .with_parameters(self.params.parameters.clone());
        if let Some(prefix) = &self.params.prefix {
            manager = manager.with_prefix(prefix.clone());
        }
        if let Err(e) = manager.launch().await {
            // A failed start leaves the manager created; destroy what it built.
            if let Err(cleanup) = manager.stop_and_destroy().await {
                warn!("'{}' could not clean up '{}': {}", ctx.uid(), self.params.config, cleanup);
            }
            return Err(e);
        }
        info!("'{}' launched configuration '{}'", ctx.uid(), self.params.config);
        self.manager = Some(manager);
        Ok(())
    }

    async fn updating(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        match self.manager.as_mut() {
            Some(manager) => manager.update().await,
            None => Ok(()),
        }
    }

    async fn stopping(&mut self, ctx: &mut ServiceContext) -> Result<()> {
        if let Some(mut manager) = self.manager.take() {
            manager.stop_and_destroy().await?;
            info!("'{}' stopped configuration '{}'", ctx.uid(), self.params.config);
        }
        Ok(())
    }
}
