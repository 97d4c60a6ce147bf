// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::settings::Settings;
use crate::domain::models::records::AGENCY_LOGO_FIELD;
use crate::domain::models::work_unit::WorkUnit;
use crate::domain::services::agency_quota::AgencyQuota;
use crate::domain::services::extraction_service::Extractor;
use crate::domain::services::seed_loader::SeedSet;
use crate::engines::api_discovery::ApiDiscoveryStrategy;
use crate::engines::domain_gate::{DomainGate, GateConfig};
use crate::engines::fallback::{FallbackCascade, FallbackStrategy, HeadlessRenderStrategy};
use crate::engines::proxy_rotator::ProxyRotator;
use crate::engines::sitemap::SitemapStrategy;
use crate::engines::traits::{Fetcher, Renderer};
use crate::infrastructure::csv_sink::OutputSinks;
use crate::infrastructure::progress_ledger::ProgressLedger;
use crate::queue::work_queue::WorkQueue;
use crate::utils::errors::CrawlError;
use crate::workers::crawl_worker::{CrawlPipeline, RunSummary, WorkerOptions};
use crate::workers::manager::WorkerManager;

/// 抓取运行用例
///
/// 先跑机构遍，再跑房源遍；两遍共用同一组工作者、闸门和账本
pub struct RunCrawlUseCase {
    manager: WorkerManager,
    sinks: Arc<OutputSinks>,
}

impl RunCrawlUseCase {
    pub fn new(manager: WorkerManager, sinks: Arc<OutputSinks>) -> Self {
        Self { manager, sinks }
    }

    /// 按配置组装全部组件
    ///
    /// # 参数
    ///
    /// * `settings` - 运行配置
    /// * `fetcher` - 抓取客户端
    /// * `extractor` - 提取器
    /// * `renderer` - 无头渲染器，仅在 `crawler.use_headless` 开启时加入回退级联
    /// * `cancel` - 关闭信号
    ///
    /// # 返回值
    ///
    /// 进度文件损坏或输出目录不可写时返回错误
    pub fn from_settings(
        settings: &Settings,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        renderer: Option<Arc<dyn Renderer>>,
        cancel: CancellationToken,
    ) -> Result<Self, CrawlError> {
        let gate = DomainGate::new(GateConfig::from(&settings.crawler));

        let mut strategies: Vec<Box<dyn FallbackStrategy>> = vec![
            Box::new(SitemapStrategy::new(fetcher.clone())),
            Box::new(ApiDiscoveryStrategy),
        ];
        match renderer {
            Some(renderer) if settings.crawler.use_headless => {
                strategies.push(Box::new(HeadlessRenderStrategy::new(renderer)));
            }
            _ => {}
        }
        let cascade = FallbackCascade::new(strategies, gate.clone());
        info!("Fallback cascade: {:?}", cascade.strategy_names());

        let ledger = Arc::new(ProgressLedger::load(
            settings.output_path(&settings.output.progress_file),
            settings.crawler.checkpoint_every,
        )?);
        let quota = Arc::new(AgencyQuota::with_counts(
            settings.crawler.max_per_agency,
            ledger.group_row_counts(),
        ));
        let sinks = Arc::new(OutputSinks::open(
            &settings.output.dir,
            &settings.output.error_log,
        )?);
        let proxies = Arc::new(match &settings.proxy.file {
            Some(path) => ProxyRotator::from_file(path),
            None => ProxyRotator::default(),
        });
        if !proxies.is_empty() {
            info!("Rotating across {} proxies", proxies.len());
        }

        let pipeline = Arc::new(CrawlPipeline::new(
            fetcher,
            extractor,
            gate,
            cascade,
            ledger,
            quota,
            sinks.clone(),
            proxies,
            WorkerOptions::from(settings),
        ));
        let manager = WorkerManager::new(pipeline, settings.crawler.workers, cancel);

        Ok(Self::new(manager, sinks))
    }

    pub fn manager(&self) -> &WorkerManager {
        &self.manager
    }

    /// 执行一次完整运行
    ///
    /// # 参数
    ///
    /// * `seeds` - 已加载的种子
    ///
    /// # 返回值
    ///
    /// 运行汇总；只有最终落盘进度失败才返回错误
    #[instrument(skip_all, fields(run_id = %Uuid::new_v4()))]
    pub async fn execute(&self, seeds: &SeedSet) -> Result<RunSummary, CrawlError> {
        let pipeline = self.manager.pipeline();
        self.restore_agency_logos();

        let agencies: Vec<WorkUnit> = seeds
            .agencies
            .iter()
            .cloned()
            .map(WorkUnit::agency)
            .filter(|unit| !unit.url().is_empty())
            .collect();
        info!("Agency pass: {} units", agencies.len());
        self.run_pass(agencies).await;

        if self.manager.cancel_token().is_cancelled() {
            warn!("Run interrupted, skipping listing pass");
        } else {
            let listings: Vec<WorkUnit> = seeds
                .listings
                .iter()
                .flat_map(|(_, rows)| rows.iter().cloned())
                .map(WorkUnit::listing)
                .filter(|unit| !unit.url().is_empty())
                .collect();
            info!("Listing pass: {} units", listings.len());
            self.run_pass(listings).await;
        }

        pipeline.ledger().persist()?;

        let summary = pipeline.summary();
        info!(
            agencies = summary.agencies_processed,
            properties = summary.properties_written,
            agents = summary.agents_written,
            manual_review = summary.manual_review,
            redirected = summary.redirected,
            timed_out = summary.timed_out,
            failed = summary.failed,
            skipped = summary.skipped,
            "Run finished"
        );
        Ok(summary)
    }

    async fn run_pass(&self, units: Vec<WorkUnit>) {
        if units.is_empty() {
            return;
        }
        let queue = Arc::new(WorkQueue::new());
        queue.extend(units);
        self.manager.run_pass(queue).await;
    }

    /// 续跑时从已写出的机构富化文件恢复Logo
    fn restore_agency_logos(&self) {
        match self
            .sinks
            .enriched_agencies
            .read_column_pair("Agency Name", AGENCY_LOGO_FIELD)
        {
            Ok(pairs) => {
                for (agency, logo) in &pairs {
                    self.manager.pipeline().set_agency_logo(agency, logo);
                }
            }
            Err(e) => warn!("Cannot reload agency logos: {}", e),
        }
    }
}
