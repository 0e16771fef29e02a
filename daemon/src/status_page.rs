//! `GET /status`
//!
//! Serves the data behind the status page as JSON. Results are split into
//! ungrouped entries and alphabetically sorted groups.

use hyper::{Body, Response, StatusCode};
use schema::{DaemonConfig, Link, PageData};
use std::sync::Arc;
use tracing::error;
use vigil_core::health::CheckContext;
use vigil_core::HealthChecker;

use crate::health_endpoint::{json_response, request_context, text_response};
use crate::Result;

/// Build version reported on the page
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct StatusPage {
    checker: Arc<HealthChecker>,
    title: String,
    show_version: bool,
    links: Vec<Link>,
    request_timeout: Option<std::time::Duration>,
}

impl StatusPage {
    pub fn new(checker: Arc<HealthChecker>) -> Self {
        Self {
            checker,
            title: "System Status".to_string(),
            show_version: true,
            links: Vec::new(),
            request_timeout: None,
        }
    }

    /// Page configured from the daemon settings
    pub fn from_config(checker: Arc<HealthChecker>, config: &DaemonConfig) -> Self {
        Self {
            checker,
            title: config.title.clone(),
            show_version: config.show_version,
            links: config.links.clone(),
            request_timeout: config.request_timeout(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, show: bool) -> Self {
        self.show_version = show;
        self
    }

    #[must_use]
    pub fn with_link(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.links.push(Link::new(name, url));
        self
    }

    /// Evaluate the checker and assemble the page data
    pub async fn page_data(&self, ctx: &CheckContext) -> vigil_core::Result<PageData> {
        let ctx = request_context(ctx, self.request_timeout);
        let results = self.checker.evaluate(&ctx).await?;
        let version = self.show_version.then(|| VERSION.to_string());
        Ok(PageData::from_results(
            self.title.clone(),
            version,
            &results,
            self.links.clone(),
        ))
    }

    pub async fn handle(&self, ctx: &CheckContext) -> Result<Response<Body>> {
        match self.page_data(ctx).await {
            Ok(page) => json_response(StatusCode::OK, &page),
            Err(err) => {
                error!(error = %err, code = err.code(), "status page evaluation failed");
                text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error checking health: {}", err),
                )
            }
        }
    }
}
