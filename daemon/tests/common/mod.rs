//! Test utilities for integration tests in the daemon crate.

#![allow(dead_code)]

use hyper::{Body, Request, Response};
use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::health::{probe_fn, CheckContext, HealthError, SharedProbe};

/// Run the given future with a timeout, failing the test if it elapses.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Run a future with a default timeout of 60 seconds.
pub async fn run_with_default_timeout<F, T>(fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    run_with_timeout(Duration::from_secs(60), fut).await
}

/// Probe that always succeeds
pub fn ok_probe() -> SharedProbe {
    Arc::new(probe_fn(|_ctx| async { Ok(()) }))
}

/// Probe that always fails with `message`
pub fn failing_probe(message: &'static str) -> SharedProbe {
    Arc::new(probe_fn(move |_ctx| async move {
        Err(HealthError::failed(message))
    }))
}

/// Probe that never completes on its own
pub fn hanging_probe() -> SharedProbe {
    Arc::new(probe_fn(|_ctx| pending()))
}

/// Probe that counts how often it was invoked
pub fn counting_probe(calls: Arc<AtomicUsize>) -> SharedProbe {
    Arc::new(probe_fn(move |_ctx| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
}

async fn explode(_ctx: CheckContext) -> Result<(), HealthError> {
    panic!("probe bug")
}

/// Probe whose task panics
pub fn panicking_probe() -> SharedProbe {
    Arc::new(probe_fn(explode))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

/// Collect a response body into JSON
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Collect a response body into a string
pub async fn text_body(response: Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
