// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 真实HTTP客户端与参考提取器下的管线测试

use super::helpers::{build_pipeline, listing, HarnessConfig};
use realty_crawler::domain::models::outcome::UnitOutcome;
use realty_crawler::domain::services::extraction_service::JsonLdExtractor;
use realty_crawler::engines::reqwest_engine::ReqwestEngine;
use realty_crawler::infrastructure::csv_sink::OutputSinks;
use realty_crawler::queue::work_queue::WorkQueue;
use realty_crawler::utils::retry_policy::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING_PAGE: &str = r#"<html><head><title>Villa Mar</title>
<script type="application/ld+json">
{"@type":"House","name":"Villa Mar","description":"Villa with pool",
 "offers":{"price":450000,"priceCurrency":"EUR"}}
</script></head><body>Private pool</body></html>"#;

fn fast_engine() -> Arc<ReqwestEngine> {
    Arc::new(ReqwestEngine::new(RetryPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
        ..Default::default()
    }))
}

#[tokio::test]
async fn test_transient_errors_are_retried_before_extraction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing/1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/listing/1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(LISTING_PAGE, "text/html"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        fast_engine(),
        Arc::new(JsonLdExtractor::default()),
        HarnessConfig::default(),
    );
    let unit = listing("Acme", &format!("{}/listing/1", server.uri()));

    let outcome = pipeline.process(&unit, &WorkQueue::new()).await;

    assert_eq!(outcome, UnitOutcome::Completed { rows_written: 1 });
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(pipeline.gate().consecutive_failures(unit.host()), 0);

    let properties = std::fs::read_to_string(dir.path().join(OutputSinks::PROPERTIES)).unwrap();
    assert!(properties.contains("Villa Mar"));
    assert!(properties.contains("450000"));
}

#[tokio::test]
async fn test_blocked_page_redirects_to_sitemap_urls() {
    let server = MockServer::start().await;
    let sitemap = format!(
        r#"<urlset><url><loc>{0}/a</loc></url><url><loc>{0}/b</loc></url><url><loc>{0}/c</loc></url></urlset>"#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/listing/1"))
        .respond_with(
            ResponseTemplate::new(403).set_body_raw("<h1>Access Denied</h1>", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sitemap, "application/xml"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        fast_engine(),
        Arc::new(JsonLdExtractor::default()),
        HarnessConfig::default(),
    );
    let unit = listing("Acme", &format!("{}/listing/1", server.uri()));

    let outcome = pipeline.process(&unit, &WorkQueue::new()).await;

    assert_eq!(
        outcome,
        UnitOutcome::Redirected {
            strategy: "sitemap",
            urls: 3
        }
    );
    assert_eq!(pipeline.gate().consecutive_failures(unit.host()), 1);
    let discovered = std::fs::read_to_string(dir.path().join(OutputSinks::DISCOVERED)).unwrap();
    assert!(discovered.contains(&format!("{}/c", server.uri())));
}
