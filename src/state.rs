use std::sync::Arc;

use crate::config::Config;
use crate::telemetry::Metrics;
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: UpstreamClient,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config, metrics: Metrics) -> Result<Self, reqwest::Error> {
        let upstream = UpstreamClient::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            upstream,
            metrics,
        })
    }
}
