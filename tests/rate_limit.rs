// tests/rate_limit.rs
//
// Rate limiting through a real listener (peer address from ConnectInfo) and
// under concurrent bursts through the router.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt as _;

use common::{FixedExtractor, FixedSummarizer};
use hn30::api::{self, AppState};
use hn30::proxy::FetchProxy;
use hn30::rate_limit::{RateLimitConfig, RateLimiter};
use hn30::SnapshotCache;

fn state() -> AppState {
    AppState {
        cache: Arc::new(SnapshotCache::new()),
        limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
        proxy: Arc::new(FetchProxy::new().unwrap()),
        extractor: Arc::new(FixedExtractor { text: None }),
        summarizer: Arc::new(FixedSummarizer::default()),
    }
}

#[tokio::test]
async fn peer_address_is_the_identity_without_forwarded_for() {
    let st = state();
    let limiter = st.limiter.clone();
    let app = api::router(st);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let url = format!("http://{addr}/summarize?id=1");

    // story 1 is not cached: the first call gets past the limiter and 404s
    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status().as_u16(), 404);
    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status().as_u16(), 429);

    // a forwarded-for value is a different identity
    let forwarded = client
        .get(&url)
        .header("x-forwarded-for", "198.51.100.77")
        .send()
        .await
        .unwrap();
    assert_eq!(forwarded.status().as_u16(), 404);

    assert_eq!(limiter.tracked(), 2, "127.0.0.1 and 198.51.100.77");
}

#[tokio::test]
async fn concurrent_burst_from_one_client_admits_one() {
    let app = api::router(state());

    let reqs = (0..5).map(|_| {
        let app = app.clone();
        async move {
            let req = Request::builder()
                .uri("/summarize?id=1")
                .header("x-forwarded-for", "203.0.113.50")
                .body(Body::empty())
                .unwrap();
            app.oneshot(req).await.unwrap().status()
        }
    });
    let statuses = futures::future::join_all(reqs).await;

    let admitted = statuses
        .iter()
        .filter(|s| **s != StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(admitted, 1, "statuses: {statuses:?}");
}

#[tokio::test]
async fn requests_without_any_identity_share_one_bucket() {
    let app = api::router(state());
    let mut statuses = Vec::new();
    for _ in 0..2 {
        let req = Request::builder()
            .uri("/summarize?id=1")
            .body(Body::empty())
            .unwrap();
        statuses.push(app.clone().oneshot(req).await.unwrap().status());
    }
    assert_eq!(statuses, [StatusCode::NOT_FOUND, StatusCode::TOO_MANY_REQUESTS]);
}
