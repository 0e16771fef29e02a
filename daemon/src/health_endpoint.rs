//! `GET /health[?no_deps]`

use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Response, StatusCode, Uri};
use schema::is_healthy;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use url::form_urlencoded;
use vigil_core::health::CheckContext;
use vigil_core::HealthChecker;

use crate::Result;

/// Query parameter that skips every dependency probe
pub const NO_DEPS_PARAM: &str = "no_deps";

/// Maps one evaluation of the checker to a status code and JSON body
#[derive(Debug, Clone)]
pub struct HealthEndpoint {
    checker: Arc<HealthChecker>,
    request_timeout: Option<Duration>,
}

impl HealthEndpoint {
    pub fn new(checker: Arc<HealthChecker>) -> Self {
        Self {
            checker,
            request_timeout: None,
        }
    }

    /// Give every evaluation a deadline in addition to the request's own lifetime
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Handle one request.
    ///
    /// With `no_deps` present the response is an empty 200 and no probe runs.
    /// Otherwise: 500 with the error text when evaluation itself fails, else
    /// 200 when every high-importance target is ok and 500 when one is not.
    pub async fn handle(&self, req: &Request<Body>, ctx: &CheckContext) -> Result<Response<Body>> {
        if has_query_param(req.uri(), NO_DEPS_PARAM) {
            debug!("dependency checks skipped");
            return Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Body::empty())?);
        }

        let ctx = request_context(ctx, self.request_timeout);
        let results = match self.checker.evaluate(&ctx).await {
            Ok(results) => results,
            Err(err) => {
                error!(error = %err, code = err.code(), "health evaluation failed");
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
            }
        };

        let status = if is_healthy(&results) {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        debug!(status = status.as_u16(), targets = results.len(), "health evaluated");
        json_response(status, &results)
    }
}

/// Derive the evaluation context for one request
pub(crate) fn request_context(base: &CheckContext, timeout: Option<Duration>) -> CheckContext {
    match timeout {
        Some(timeout) => base.with_timeout(timeout),
        None => base.child(),
    }
}

/// True if `name` appears as a decoded query key, with or without a value
pub(crate) fn has_query_param(uri: &Uri, name: &str) -> bool {
    uri.query()
        .map(|query| form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == name))
        .unwrap_or(false)
}

pub(crate) fn json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Body>> {
    let body = serde_json::to_vec(value)?;
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))?)
}

pub(crate) fn text_response(status: StatusCode, message: String) -> Result<Response<Body>> {
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(message))?)
}
