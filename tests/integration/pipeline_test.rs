// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 单元处理管线测试
//!
//! 使用桩抓取客户端和提取器，验证闸门、超时、回退与配额在管线中的行为

use super::helpers::{agency, listing, page, Harness, HarnessConfig, StubFetcher, StubRenderer};
use realty_crawler::domain::models::outcome::{FetchOutcome, SkipReason, UnitOutcome};
use realty_crawler::domain::models::work_unit::LedgerKey;
use realty_crawler::infrastructure::csv_sink::OutputSinks;
use realty_crawler::queue::work_queue::WorkQueue;
use realty_crawler::workers::manager::WorkerManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://c.test/listing/1</loc></url>
  <url><loc>https://c.test/listing/2</loc></url>
  <url><loc>https://c.test/listing/3</loc></url>
</urlset>"#;

async fn drain(harness: &Harness, units: Vec<realty_crawler::domain::models::work_unit::WorkUnit>, workers: usize) {
    let queue = Arc::new(WorkQueue::new());
    queue.extend(units);
    let manager = WorkerManager::new(harness.pipeline.clone(), workers, CancellationToken::new());
    manager.run_pass(queue).await;
}

#[tokio::test]
async fn test_per_host_concurrency_never_exceeds_cap() {
    let mut fetcher = StubFetcher::new().with_delay(Duration::from_millis(30));
    let mut units = Vec::new();
    for i in 0..12 {
        let url = format!("https://a.test/listing/{}", i);
        fetcher = fetcher.with_page(&url, &page("Flat"));
        units.push(listing("Acme", &url));
    }
    let harness = Harness::new(fetcher, HarnessConfig::default());

    drain(&harness, units, 8).await;

    let gate = harness.pipeline.gate();
    assert_eq!(gate.peak_in_flight("a.test"), 2);
    assert_eq!(gate.in_flight("a.test"), 0);
    assert_eq!(gate.available_slots("a.test"), 2);
    assert_eq!(harness.pipeline.summary().properties_written, 12);
}

#[tokio::test]
async fn test_breaker_trips_and_skips_without_network() {
    let mut fetcher = StubFetcher::new();
    for i in 0..5 {
        fetcher = fetcher.with(
            &format!("https://b.test/listing/{}", i),
            FetchOutcome::TransportError {
                cause: "connection refused".into(),
            },
        );
    }
    let mut config = HarnessConfig::default();
    config.gate.failure_threshold = 2;
    let harness = Harness::new(fetcher, config);
    let queue = WorkQueue::new();

    let mut outcomes = Vec::new();
    for i in 0..5 {
        let unit = listing("Acme", &format!("https://b.test/listing/{}", i));
        outcomes.push(harness.pipeline.process(&unit, &queue).await);
    }

    assert_eq!(outcomes[0], UnitOutcome::ManualReview);
    assert_eq!(outcomes[1], UnitOutcome::ManualReview);
    assert!(outcomes[2..]
        .iter()
        .all(|o| *o == UnitOutcome::Skipped(SkipReason::HostCoolingDown)));
    assert_eq!(harness.fetcher.call_count(), 2);
    assert!(harness.pipeline.gate().cooldown_until("b.test").is_some());
    assert_eq!(harness.data_rows(OutputSinks::MANUAL_REVIEW), 2);
    assert!(harness.output("scrape_errors.log").contains("unit=https://b.test/listing/0"));
}

#[tokio::test]
async fn test_timeout_charges_one_failure_and_releases_slot() {
    let fetcher = StubFetcher::new()
        .hanging("https://slow.test/listing/1")
        .with_page("https://fast.test/listing/1", &page("Loft"));
    let mut config = HarnessConfig::default();
    config.options.task_timeout = Duration::from_millis(100);
    let harness = Harness::new(fetcher, config);

    drain(
        &harness,
        vec![
            listing("Acme", "https://slow.test/listing/1"),
            listing("Acme", "https://fast.test/listing/1"),
        ],
        2,
    )
    .await;

    let gate = harness.pipeline.gate();
    assert_eq!(gate.consecutive_failures("slow.test"), 1);
    assert_eq!(gate.in_flight("slow.test"), 0);
    assert_eq!(gate.available_slots("slow.test"), 2);

    let summary = harness.pipeline.summary();
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.properties_written, 1);
    assert!(!harness
        .pipeline
        .ledger()
        .is_done(&LedgerKey::Unit("https://slow.test/listing/1".into())));
    assert!(harness.output("scrape_errors.log").contains("timed out"));
}

#[tokio::test]
async fn test_sitemap_redirect_charges_exactly_one_failure() {
    let fetcher = StubFetcher::new()
        .with_page("https://c.test/listing/0", "<html><h1>Access Denied</h1></html>")
        .with_page("https://c.test/sitemap.xml", SITEMAP);
    let harness = Harness::new(fetcher, HarnessConfig::default());
    let queue = WorkQueue::new();
    let unit = listing("Acme", "https://c.test/listing/0");

    let outcome = harness.pipeline.process(&unit, &queue).await;

    assert_eq!(
        outcome,
        UnitOutcome::Redirected {
            strategy: "sitemap",
            urls: 3
        }
    );
    assert_eq!(harness.pipeline.gate().consecutive_failures("c.test"), 1);
    assert_eq!(harness.data_rows(OutputSinks::DISCOVERED), 3);
    assert!(!harness.pipeline.ledger().is_done(&unit.ledger_key()));
    // Not followed unless enabled
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_discovered_urls_are_enqueued_once() {
    let fetcher = StubFetcher::new()
        .with_page("https://c.test/listing/0", "please complete the captcha")
        .with_page("https://c.test/sitemap.xml", SITEMAP);
    let mut config = HarnessConfig::default();
    config.options.follow_discovered = true;
    config.options.max_discovered_per_unit = 2;
    let harness = Harness::new(fetcher, config);
    let queue = WorkQueue::new();

    let parent = listing("Acme", "https://c.test/listing/0");
    harness.pipeline.process(&parent, &queue).await;
    assert_eq!(queue.len(), 2);

    // Children are second generation and never enqueue further units
    let cancel = CancellationToken::new();
    let child = queue.next(&cancel).await.unwrap();
    assert_eq!(child.generation(), 1);
    assert_eq!(child.group(), "Acme");
    harness.pipeline.process(&child, &queue).await;
    queue.complete();
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_unresolved_unit_goes_to_manual_review() {
    let fetcher = StubFetcher::new().with_page("https://d.test/listing/1", "   ");
    let harness = Harness::new(fetcher, HarnessConfig::default());
    let queue = WorkQueue::new();
    let unit = listing("Acme", "https://d.test/listing/1");

    let outcome = harness.pipeline.process(&unit, &queue).await;

    assert_eq!(outcome, UnitOutcome::ManualReview);
    assert_eq!(harness.pipeline.gate().consecutive_failures("d.test"), 1);
    let review = harness.output(OutputSinks::MANUAL_REVIEW);
    assert!(review.contains("https://d.test/listing/1,Acme,Empty content"));
    assert!(!harness.pipeline.ledger().is_done(&unit.ledger_key()));
}

#[tokio::test]
async fn test_fetcher_block_reason_reaches_manual_review() {
    let fetcher = StubFetcher::new().with(
        "https://d.test/listing/2",
        FetchOutcome::Blocked {
            reason: "cloudflare challenge".into(),
        },
    );
    let harness = Harness::new(fetcher, HarnessConfig::default());
    let queue = WorkQueue::new();

    let outcome = harness
        .pipeline
        .process(&listing("Acme", "https://d.test/listing/2"), &queue)
        .await;

    assert_eq!(outcome, UnitOutcome::ManualReview);
    assert_eq!(harness.pipeline.gate().consecutive_failures("d.test"), 1);
    let review = harness.output(OutputSinks::MANUAL_REVIEW);
    assert!(review.contains("Blocked content: cloudflare challenge"));
}

#[tokio::test]
async fn test_sink_error_after_redirect_is_charged_once() {
    let fetcher = StubFetcher::new()
        .with_page("https://c.test/listing/9", "<h1>Access Denied</h1>")
        .with_page("https://c.test/sitemap.xml", SITEMAP);
    let harness = Harness::new(fetcher, HarnessConfig::default());
    // A directory in place of the output file makes every append fail
    std::fs::create_dir(harness.dir.path().join(OutputSinks::DISCOVERED)).unwrap();
    let queue = WorkQueue::new();

    let outcome = harness
        .pipeline
        .process(&listing("Acme", "https://c.test/listing/9"), &queue)
        .await;

    assert_eq!(outcome, UnitOutcome::Failed);
    assert_eq!(harness.pipeline.gate().consecutive_failures("c.test"), 1);
    assert_eq!(harness.pipeline.summary().failed, 1);
    assert!(harness.output("scrape_errors.log").contains("Sink error"));
}

#[tokio::test]
async fn test_breaker_tripped_while_waiting_for_slot_blocks_fetch() {
    let fetcher = StubFetcher::new()
        .with_delay(Duration::from_millis(50))
        .with_page("https://h.test/l/1", "please complete the captcha")
        .with_page("https://h.test/l/2", &page("Flat"));
    let mut config = HarnessConfig::default();
    config.gate.max_concurrency = 1;
    config.gate.failure_threshold = 1;
    let harness = Harness::new(fetcher, config);

    drain(
        &harness,
        vec![
            listing("Acme", "https://h.test/l/1"),
            listing("Acme", "https://h.test/l/2"),
        ],
        2,
    )
    .await;

    assert!(harness.pipeline.gate().cooldown_until("h.test").is_some());
    assert_eq!(harness.fetcher.calls_to("https://h.test/l/2"), 0);
    assert_eq!(harness.data_rows(OutputSinks::PROPERTIES), 0);
    let summary = harness.pipeline.summary();
    assert_eq!(summary.manual_review, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(harness.pipeline.gate().available_slots("h.test"), 1);
}

#[tokio::test]
async fn test_headless_render_recovers_blocked_page() {
    let fetcher = StubFetcher::new().with_page("https://e.test/listing/1", "Access denied");
    let renderer = Arc::new(StubRenderer::returning(Some(&page("Villa"))));
    let config = HarnessConfig {
        renderer: Some(renderer.clone()),
        ..Default::default()
    };
    let harness = Harness::new(fetcher, config);
    let queue = WorkQueue::new();
    let unit = listing("Acme", "https://e.test/listing/1");

    let outcome = harness.pipeline.process(&unit, &queue).await;

    assert_eq!(outcome, UnitOutcome::Completed { rows_written: 1 });
    assert_eq!(*renderer.calls.lock(), 1);
    assert_eq!(harness.pipeline.gate().consecutive_failures("e.test"), 0);
    assert!(harness.pipeline.ledger().is_done(&unit.ledger_key()));
}

#[tokio::test]
async fn test_rendered_challenge_page_is_not_usable() {
    let fetcher = StubFetcher::new().with_page("https://e.test/listing/2", "Access denied");
    let renderer = Arc::new(StubRenderer::returning(Some("<div>captcha</div>")));
    let config = HarnessConfig {
        renderer: Some(renderer),
        ..Default::default()
    };
    let harness = Harness::new(fetcher, config);
    let queue = WorkQueue::new();

    let outcome = harness
        .pipeline
        .process(&listing("Acme", "https://e.test/listing/2"), &queue)
        .await;

    assert_eq!(outcome, UnitOutcome::ManualReview);
    assert_eq!(harness.pipeline.gate().consecutive_failures("e.test"), 1);
}

#[tokio::test]
async fn test_extraction_error_is_logged_and_charged() {
    let fetcher = StubFetcher::new().with_page("https://f.test/listing/1", "<p>BROKEN</p>");
    let harness = Harness::new(fetcher, HarnessConfig::default());
    let queue = WorkQueue::new();

    let outcome = harness
        .pipeline
        .process(&listing("Acme", "https://f.test/listing/1"), &queue)
        .await;

    assert_eq!(outcome, UnitOutcome::Failed);
    assert_eq!(harness.pipeline.gate().consecutive_failures("f.test"), 1);
    assert!(harness.output("scrape_errors.log").contains("Extraction failed"));
    assert_eq!(harness.data_rows(OutputSinks::PROPERTIES), 0);
}

#[tokio::test]
async fn test_per_agency_cap_holds_under_concurrency() {
    let mut fetcher = StubFetcher::new().with_delay(Duration::from_millis(5));
    let mut units = Vec::new();
    for i in 0..20 {
        let url = format!("https://h{}.test/listing", i);
        fetcher = fetcher.with_page(&url, &page("House"));
        units.push(listing("Acme", &url));
    }
    let config = HarnessConfig {
        max_per_agency: 5,
        ..Default::default()
    };
    let harness = Harness::new(fetcher, config);

    drain(&harness, units, 8).await;

    assert_eq!(harness.data_rows(OutputSinks::PROPERTIES), 5);
    assert_eq!(harness.pipeline.quota().count("Acme"), 5);
    assert_eq!(
        harness.pipeline.ledger().group_row_counts().get("Acme"),
        Some(&5)
    );
}

#[tokio::test]
async fn test_agency_pass_records_logo_for_listings() {
    let fetcher = StubFetcher::new()
        .with_page("https://acme.test", &page("Acme Realty"))
        .with_page("https://acme.test/listing/1", &page("Flat"));
    let harness = Harness::new(fetcher, HarnessConfig::default());
    let queue = WorkQueue::new();

    let outcome = harness
        .pipeline
        .process(&agency("Acme", "https://acme.test"), &queue)
        .await;
    assert_eq!(outcome, UnitOutcome::Completed { rows_written: 1 });
    assert_eq!(harness.pipeline.agency_logo("Acme"), "https://acme.test/logo.png");

    harness
        .pipeline
        .process(&listing("Acme", "https://acme.test/listing/1"), &queue)
        .await;

    let properties = harness.output(OutputSinks::PROPERTIES);
    assert!(properties.contains("https://acme.test/logo.png"));
    let agents = harness.output(OutputSinks::AGENTS);
    assert!(agents.contains("Acme,Ana,ana@example.test"));
    assert!(harness
        .pipeline
        .ledger()
        .is_done(&LedgerKey::Group("Acme".into(), "https://acme.test".into())));
}

#[tokio::test]
async fn test_cancelled_run_starts_no_units() {
    let fetcher = StubFetcher::new().with_page("https://g.test/listing/1", &page("Flat"));
    let harness = Harness::new(fetcher, HarnessConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let queue = Arc::new(WorkQueue::new());
    queue.push(listing("Acme", "https://g.test/listing/1"));
    WorkerManager::new(harness.pipeline.clone(), 4, cancel)
        .run_pass(queue.clone())
        .await;

    assert_eq!(harness.fetcher.call_count(), 0);
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_cancel_mid_run_lets_in_flight_unit_finish() {
    let mut fetcher = StubFetcher::new().with_delay(Duration::from_millis(200));
    let mut units = Vec::new();
    for i in 0..3 {
        let url = format!("https://k.test/listing/{}", i);
        fetcher = fetcher.with_page(&url, &page("Flat"));
        units.push(listing("Acme", &url));
    }
    let harness = Harness::new(fetcher, HarnessConfig::default());
    let cancel = CancellationToken::new();

    let queue = Arc::new(WorkQueue::new());
    queue.extend(units);
    let manager = WorkerManager::new(harness.pipeline.clone(), 1, cancel.clone());
    let pass = tokio::spawn({
        let queue = queue.clone();
        async move { manager.run_pass(queue).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.fetcher.call_count(), 1);
    cancel.cancel();
    pass.await.unwrap();

    assert_eq!(harness.fetcher.calls(), vec!["https://k.test/listing/0".to_string()]);
    assert!(harness
        .pipeline
        .ledger()
        .is_done(&LedgerKey::Unit("https://k.test/listing/0".into())));
    assert_eq!(harness.data_rows(OutputSinks::PROPERTIES), 1);
    assert_eq!(queue.len(), 2);
}
