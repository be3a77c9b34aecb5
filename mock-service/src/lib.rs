//! A small HTTP service for load-testing the load tester.
use axum::{
    debug_handler,
    extract::Path,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lazy_static::lazy_static;
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::{
    num::NonZeroU32,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub fn router() -> Router {
    Router::new()
        .route("/delay/ms/:delay_ms", get(delay).post(delay))
        .route("/delay/normal/:mean_ms/:std_dev_ms", get(normal_delay))
        .route("/status/:code", get(status))
        .route("/flaky/:fail_count/key/:key", get(flaky))
        .route("/limited/:max_tps/key/:key", get(limited))
        .route("/require-header/:name", get(require_header))
        .route("/echo", post(echo))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, router()).await?;
    Ok(())
}

#[debug_handler]
pub async fn delay(Path(delay_ms): Path<u64>) {
    measure();
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

/// Latency drawn from a normal distribution, clamped at zero.
#[debug_handler]
pub async fn normal_delay(Path((mean_ms, std_dev_ms)): Path<(f64, f64)>) -> StatusCode {
    measure();
    let Ok(normal) = Normal::new(mean_ms, std_dev_ms) else {
        return StatusCode::BAD_REQUEST;
    };
    let ms = normal.sample(&mut rand::thread_rng()).max(0.);
    tokio::time::sleep(Duration::from_secs_f64(ms / 1000.)).await;
    StatusCode::OK
}

#[debug_handler]
pub async fn status(Path(code): Path<u16>) -> StatusCode {
    measure();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

lazy_static! {
    static ref FLAKY_MAP: Mutex<HashMap<String, u32>> = Mutex::new(HashMap::new());
}

/// Answers 503 for the first `fail_count` calls with a given key, then 200.
#[debug_handler]
pub async fn flaky(Path((fail_count, key)): Path<(u32, String)>) -> StatusCode {
    measure();
    let seen = {
        let mut map = FLAKY_MAP.lock().unwrap_or_else(PoisonError::into_inner);
        let seen = map.entry(key).or_default();
        *seen += 1;
        *seen
    };

    if seen <= fail_count {
        debug!(seen, fail_count, "Flaky endpoint failing");
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

lazy_static! {
    static ref LIMITED_MAP: Arc<RwLock<HashMap<String, Arc<DefaultDirectRateLimiter>>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// Answers 429 once the key's rate is exceeded.
#[debug_handler]
pub async fn limited(Path((max_tps, key)): Path<(u32, String)>) -> StatusCode {
    measure();
    let Some(max_tps) = NonZeroU32::new(max_tps) else {
        return StatusCode::BAD_REQUEST;
    };

    let read = LIMITED_MAP
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
        .cloned();
    let limiter = match read {
        Some(limiter) => limiter,
        None => LIMITED_MAP
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert_with(|| Arc::new(rate_limiter(max_tps)))
            .clone(),
    };

    match limiter.check() {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::TOO_MANY_REQUESTS,
    }
}

#[debug_handler]
pub async fn require_header(Path(name): Path<String>, headers: HeaderMap) -> StatusCode {
    measure();
    if headers.contains_key(name.as_str()) {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

#[debug_handler]
pub async fn echo(body: String) -> String {
    measure();
    body
}

/** Utils **/

pub fn rate_limiter(tps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(tps))
}

fn measure() {
    counter!("mock_service.requests").increment(1);
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);
}

/** TPS Printer **/

static TPS_MEASURE: AtomicU64 = AtomicU64::new(0);

pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let transactions = TPS_MEASURE.swap(0, Ordering::Relaxed);
        gauge!("mock_service.tps").set(transactions as f64);
        info!("{transactions} TPS");
    }
}
