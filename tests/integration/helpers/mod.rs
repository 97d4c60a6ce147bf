// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod stubs;

use realty_crawler::domain::models::work_unit::{SeedRow, WorkUnit};
use realty_crawler::domain::services::agency_quota::AgencyQuota;
use realty_crawler::domain::services::extraction_service::Extractor;
use realty_crawler::engines::api_discovery::ApiDiscoveryStrategy;
use realty_crawler::engines::domain_gate::{DomainGate, GateConfig};
use realty_crawler::engines::fallback::{FallbackCascade, FallbackStrategy, HeadlessRenderStrategy};
use realty_crawler::engines::proxy_rotator::ProxyRotator;
use realty_crawler::engines::sitemap::SitemapStrategy;
use realty_crawler::engines::traits::{Fetcher, Renderer};
use realty_crawler::infrastructure::csv_sink::OutputSinks;
use realty_crawler::infrastructure::progress_ledger::ProgressLedger;
use realty_crawler::workers::crawl_worker::{CrawlPipeline, WorkerOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub use stubs::{StubExtractor, StubFetcher, StubRenderer};

/// 测试管线配置
pub struct HarnessConfig {
    pub gate: GateConfig,
    pub max_per_agency: usize,
    pub checkpoint_every: usize,
    pub options: WorkerOptions,
    pub renderer: Option<Arc<dyn Renderer>>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig {
                max_concurrency: 2,
                failure_threshold: 5,
                cooldown: Duration::from_secs(3600),
            },
            max_per_agency: 20,
            checkpoint_every: 50,
            options: WorkerOptions {
                task_timeout: Duration::from_secs(5),
                fetch_timeout: Duration::from_secs(1),
                ..Default::default()
            },
            renderer: None,
        }
    }
}

/// 绑定在临时输出目录上的管线
pub struct Harness {
    pub dir: TempDir,
    pub fetcher: Arc<StubFetcher>,
    pub pipeline: Arc<CrawlPipeline>,
}

impl Harness {
    pub fn new(fetcher: StubFetcher, config: HarnessConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(fetcher);
        let pipeline = build_pipeline(
            dir.path(),
            fetcher.clone(),
            Arc::new(StubExtractor::default()),
            config,
        );
        Self {
            dir,
            fetcher,
            pipeline,
        }
    }

    pub fn output(&self, file_name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(file_name)).unwrap_or_default()
    }

    /// 输出文件中的数据行数（不含表头）
    pub fn data_rows(&self, file_name: &str) -> usize {
        self.output(file_name).lines().count().saturating_sub(1)
    }
}

pub fn build_pipeline(
    dir: &Path,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    config: HarnessConfig,
) -> Arc<CrawlPipeline> {
    let gate = DomainGate::new(config.gate);

    let mut strategies: Vec<Box<dyn FallbackStrategy>> = vec![
        Box::new(SitemapStrategy::new(fetcher.clone())),
        Box::new(ApiDiscoveryStrategy),
    ];
    if let Some(renderer) = config.renderer {
        strategies.push(Box::new(HeadlessRenderStrategy::new(renderer)));
    }
    let cascade = FallbackCascade::new(strategies, gate.clone());

    let ledger =
        Arc::new(ProgressLedger::load(dir.join("progress.json"), config.checkpoint_every).unwrap());
    let quota = Arc::new(AgencyQuota::with_counts(
        config.max_per_agency,
        ledger.group_row_counts(),
    ));
    let sinks = Arc::new(OutputSinks::open(dir, "scrape_errors.log").unwrap());

    Arc::new(CrawlPipeline::new(
        fetcher,
        extractor,
        gate,
        cascade,
        ledger,
        quota,
        sinks,
        Arc::new(ProxyRotator::default()),
        config.options,
    ))
}

pub fn listing(agency: &str, url: &str) -> WorkUnit {
    WorkUnit::listing(SeedRow::from_pairs([
        ("Agency Name", agency),
        ("Listing URL", url),
        ("ISO", "ES"),
    ]))
}

pub fn agency(name: &str, website: &str) -> WorkUnit {
    WorkUnit::agency(SeedRow::from_pairs([
        ("Agency Name", name),
        ("Website", website),
        ("Country", "Spain"),
    ]))
}

pub fn page(title: &str) -> String {
    format!("<html><head><title>{}</title></head><body>{}</body></html>", title, title)
}
