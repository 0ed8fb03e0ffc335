//! HTTP trigger surface for course generation
//!
//! Accepts generation requests, hands them to the job launcher and exposes
//! run status by correlation id.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::jobs::CourseJobLauncher;

pub mod handlers;
pub mod models;
pub mod server;

/// API server wrapping a [`CourseJobLauncher`]
pub struct ApiServer {
    launcher: CourseJobLauncher,
    config: Arc<Config>,
}

impl ApiServer {
    pub fn new(launcher: CourseJobLauncher, config: Arc<Config>) -> Self {
        Self { launcher, config }
    }

    /// Start the API server in the background
    pub fn start_background(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.start().await })
    }

    /// Serve until the listener fails
    pub async fn start(self) -> Result<()> {
        info!(
            "🚀 Starting API server on {}:{}",
            self.config.server.host, self.config.server.port
        );
        server::start_http_server(self.launcher, self.config).await
    }
}
