// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use metrics::counter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::settings::Settings;
use crate::domain::models::outcome::{FetchOutcome, SkipReason, UnitOutcome};
use crate::domain::models::records::{DiscoveredUrl, ReviewItem};
use crate::domain::models::work_unit::{UnitKind, WorkUnit};
use crate::domain::services::agency_quota::AgencyQuota;
use crate::domain::services::extraction_service::Extractor;
use crate::engines::domain_gate::DomainGate;
use crate::engines::fallback::{CascadeOutcome, FallbackCascade, FallbackContext};
use crate::engines::proxy_rotator::ProxyRotator;
use crate::engines::traits::Fetcher;
use crate::engines::validators;
use crate::infrastructure::csv_sink::OutputSinks;
use crate::infrastructure::progress_ledger::ProgressLedger;
use crate::queue::work_queue::WorkQueue;
use crate::utils::errors::CrawlError;

/// 单元处理选项
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// 单元墙钟超时
    pub task_timeout: Duration,
    /// 单次请求超时
    pub fetch_timeout: Duration,
    /// 主请求之后的节流等待
    pub throttle: Duration,
    /// 是否将发现的替代URL加入队列
    pub follow_discovered: bool,
    /// 每个单元最多加入队列的替代URL数量
    pub max_discovered_per_unit: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(20),
            throttle: Duration::ZERO,
            follow_discovered: false,
            max_discovered_per_unit: 20,
        }
    }
}

impl From<&Settings> for WorkerOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            task_timeout: settings.task_timeout(),
            fetch_timeout: settings.fetch_timeout(),
            throttle: settings.throttle(),
            follow_discovered: settings.crawler.follow_discovered,
            max_discovered_per_unit: settings.crawler.max_discovered_per_unit,
        }
    }
}

/// 运行计数器
#[derive(Debug, Default)]
pub struct RunStats {
    agencies_processed: AtomicUsize,
    properties_written: AtomicUsize,
    agents_written: AtomicUsize,
    manual_review: AtomicUsize,
    redirected: AtomicUsize,
    timed_out: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

/// 运行结束时的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub agencies_processed: usize,
    pub properties_written: usize,
    pub agents_written: usize,
    pub manual_review: usize,
    pub redirected: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunStats {
    fn bump(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            agencies_processed: self.agencies_processed.load(Ordering::Relaxed),
            properties_written: self.properties_written.load(Ordering::Relaxed),
            agents_written: self.agents_written.load(Ordering::Relaxed),
            manual_review: self.manual_review.load(Ordering::Relaxed),
            redirected: self.redirected.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// 单元处理管线
///
/// 检查账本、配额与熔断后，在单元超时内依次执行
/// 获取槽位、抓取、回退级联、提取和写入
pub struct CrawlPipeline {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    gate: DomainGate,
    cascade: FallbackCascade,
    ledger: Arc<ProgressLedger>,
    quota: Arc<AgencyQuota>,
    sinks: Arc<OutputSinks>,
    proxies: Arc<ProxyRotator>,
    logos: DashMap<String, String>,
    stats: RunStats,
    options: WorkerOptions,
}

impl CrawlPipeline {
    /// 创建处理管线
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        gate: DomainGate,
        cascade: FallbackCascade,
        ledger: Arc<ProgressLedger>,
        quota: Arc<AgencyQuota>,
        sinks: Arc<OutputSinks>,
        proxies: Arc<ProxyRotator>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            gate,
            cascade,
            ledger,
            quota,
            sinks,
            proxies,
            logos: DashMap::new(),
            stats: RunStats::default(),
            options,
        }
    }

    pub fn gate(&self) -> &DomainGate {
        &self.gate
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    pub fn quota(&self) -> &AgencyQuota {
        &self.quota
    }

    pub fn summary(&self) -> RunSummary {
        self.stats.snapshot()
    }

    /// 记录机构Logo，供房源提取兜底
    pub fn set_agency_logo(&self, group: &str, logo: &str) {
        if !logo.is_empty() {
            self.logos.insert(group.to_string(), logo.to_string());
        }
    }

    pub fn agency_logo(&self, group: &str) -> String {
        self.logos
            .get(group)
            .map(|logo| logo.value().clone())
            .unwrap_or_default()
    }

    /// 处理一个单元
    ///
    /// 单元失败不会向外传播：错误写入错误日志并对主机记一次失败
    ///
    /// # 参数
    ///
    /// * `unit` - 工作单元
    /// * `queue` - 共享队列，用于追加发现的单元
    ///
    /// # 返回值
    ///
    /// 单元处理结果
    #[instrument(skip_all, fields(unit = %unit.id(), group = %unit.group(), host = %unit.host()))]
    pub async fn process(&self, unit: &WorkUnit, queue: &WorkQueue) -> UnitOutcome {
        if let Some(reason) = self.admission(unit) {
            debug!("Skipping unit: {:?}", reason);
            RunStats::bump(&self.stats.skipped, 1);
            return UnitOutcome::Skipped(reason);
        }

        let outcome =
            match tokio::time::timeout(self.options.task_timeout, self.run_unit(unit, queue)).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    self.gate.record_failure(unit.host());
                    self.fail(unit, &e)
                }
                Err(_) => {
                    // The slot permit was dropped together with the abandoned future
                    let e = CrawlError::TaskTimeout(self.options.task_timeout);
                    self.sinks.errors.record(&unit.id(), &e.to_string());
                    self.gate.record_failure(unit.host());
                    counter!("units_timed_out_total").increment(1);
                    RunStats::bump(&self.stats.timed_out, 1);
                    UnitOutcome::TimedOut
                }
            };

        if outcome.is_done() {
            counter!("units_completed_total").increment(1);
            self.ledger.mark_done(&unit.ledger_key());
        }
        outcome
    }

    /// 派发前检查，不产生任何网络请求
    fn admission(&self, unit: &WorkUnit) -> Option<SkipReason> {
        if unit.url().is_empty() {
            return Some(SkipReason::NoUrl);
        }
        if self.ledger.is_done(&unit.ledger_key()) {
            return Some(SkipReason::AlreadyDone);
        }
        if unit.kind() == UnitKind::Listing && self.quota.is_full(unit.group()) {
            return Some(SkipReason::QuotaReached);
        }
        if !self.gate.is_allowed(unit.host(), Instant::now()) {
            return Some(SkipReason::HostCoolingDown);
        }
        None
    }

    async fn run_unit(&self, unit: &WorkUnit, queue: &WorkQueue) -> Result<UnitOutcome, CrawlError> {
        let _permit = self.gate.acquire_slot(unit.host()).await?;
        // The breaker may have tripped while this unit waited for a slot
        if !self.gate.is_allowed(unit.host(), Instant::now()) {
            debug!("Host cooled down while waiting for a slot");
            RunStats::bump(&self.stats.skipped, 1);
            return Ok(UnitOutcome::Skipped(SkipReason::HostCoolingDown));
        }
        let proxy = self.proxies.next_proxy();

        let fetched = self
            .fetcher
            .fetch(unit.url(), self.options.fetch_timeout, proxy)
            .await;

        if !self.options.throttle.is_zero() {
            tokio::time::sleep(self.options.throttle).await;
        }

        let (body, problem) = match fetched {
            FetchOutcome::Success { body, .. } => {
                let problem = validators::inspect(&body);
                (body, problem)
            }
            FetchOutcome::TransportError { cause } => {
                // Retries are exhausted; the cascade cannot help without a reachable host
                self.gate.record_failure(unit.host());
                let e = CrawlError::Transport(cause);
                self.sinks.errors.record(&unit.id(), &e.to_string());
                return Ok(self.charged(unit, self.send_to_review(unit, &e)));
            }
            other => (String::new(), Some(other)),
        };

        let body = match problem.as_ref().and_then(FetchOutcome::to_error) {
            None => body,
            Some(problem) => {
                debug!("Primary fetch unusable: {}", problem);
                let ctx = FallbackContext {
                    unit,
                    body: &body,
                    proxy,
                    timeout: self.options.fetch_timeout,
                };
                // The cascade charges the host for every exit except a render
                match self.cascade.resolve(&ctx).await {
                    CascadeOutcome::Rendered { strategy, body } => {
                        debug!("Using content from {}", strategy);
                        body
                    }
                    CascadeOutcome::Redirected { strategy, urls } => {
                        return Ok(self.charged(unit, self.redirect(unit, strategy, urls, queue)));
                    }
                    CascadeOutcome::Unresolved => {
                        return Ok(self.charged(unit, self.send_to_review(unit, &problem)));
                    }
                }
            }
        };

        let rows_written = match unit.kind() {
            UnitKind::Agency => self.store_agency(unit, &body)?,
            UnitKind::Listing => self.store_listing(unit, &body)?,
        };

        self.gate.record_success(unit.host());
        Ok(UnitOutcome::Completed { rows_written })
    }

    /// 记录单元错误并计入失败数，不对主机计失败
    fn fail(&self, unit: &WorkUnit, e: &CrawlError) -> UnitOutcome {
        self.sinks.errors.record(&unit.id(), &e.to_string());
        RunStats::bump(&self.stats.failed, 1);
        UnitOutcome::Failed
    }

    /// 主机已记过失败的分支：写入出错时不再重复计失败
    fn charged(&self, unit: &WorkUnit, result: Result<UnitOutcome, CrawlError>) -> UnitOutcome {
        result.unwrap_or_else(|e| self.fail(unit, &e))
    }

    fn store_agency(&self, unit: &WorkUnit, body: &str) -> Result<usize, CrawlError> {
        let extraction = self.extractor.extract_agency(body, unit.seed())?;

        self.sinks.enriched_agencies.append_row(&extraction.enriched)?;
        self.sinks.profiles.append_record(&extraction.profile)?;
        self.set_agency_logo(unit.group(), &extraction.logo);

        RunStats::bump(&self.stats.agencies_processed, 1);
        info!("Agency enriched");
        Ok(1)
    }

    fn store_listing(&self, unit: &WorkUnit, body: &str) -> Result<usize, CrawlError> {
        let logo = self.agency_logo(unit.group());
        let extraction = self.extractor.extract_listing(body, unit.seed(), &logo)?;

        let accepted = self
            .quota
            .reserve(unit.group(), extraction.properties.len());
        if accepted < extraction.properties.len() {
            debug!(
                "Agency cap reached, discarding {} property rows",
                extraction.properties.len() - accepted
            );
        }
        if accepted > 0 {
            self.sinks
                .properties
                .append_records(&extraction.properties[..accepted])?;
            self.ledger.add_group_rows(unit.group(), accepted);
        }

        let agents: Vec<_> = extraction
            .agents
            .into_iter()
            .map(|mut agent| {
                agent.agency_name = unit.group().to_string();
                agent
            })
            .collect();
        self.sinks.agents.append_records(&agents)?;

        RunStats::bump(&self.stats.properties_written, accepted);
        RunStats::bump(&self.stats.agents_written, agents.len());
        Ok(accepted)
    }

    fn redirect(
        &self,
        unit: &WorkUnit,
        strategy: &'static str,
        urls: Vec<String>,
        queue: &WorkQueue,
    ) -> Result<UnitOutcome, CrawlError> {
        let records: Vec<_> = urls
            .iter()
            .map(|url| DiscoveredUrl {
                agency_name: unit.group().to_string(),
                source_url: unit.url().to_string(),
                discovered_url: url.clone(),
                strategy: strategy.to_string(),
            })
            .collect();
        self.sinks.discovered.append_records(&records)?;

        if self.options.follow_discovered && unit.generation() == 0 {
            let children: Vec<_> = urls
                .iter()
                .take(self.options.max_discovered_per_unit)
                .map(|url| WorkUnit::discovered(unit, url))
                .collect();
            debug!("Enqueueing {} discovered units", children.len());
            queue.extend(children);
        }

        RunStats::bump(&self.stats.redirected, 1);
        Ok(UnitOutcome::Redirected {
            strategy,
            urls: urls.len(),
        })
    }

    fn send_to_review(&self, unit: &WorkUnit, reason: &CrawlError) -> Result<UnitOutcome, CrawlError> {
        self.sinks.manual_review.append_record(&ReviewItem {
            url: unit.url().to_string(),
            agency_name: unit.group().to_string(),
            reason: reason.to_string(),
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })?;

        warn!("Unit sent to manual review: {}", reason);
        RunStats::bump(&self.stats.manual_review, 1);
        Ok(UnitOutcome::ManualReview)
    }
}

/// 抓取工作者
///
/// 从共享队列取单元直到队列耗尽或收到取消信号；
/// 取消只停止领取新单元，已开始的单元照常完成
pub struct CrawlWorker {
    id: usize,
    pipeline: Arc<CrawlPipeline>,
}

impl CrawlWorker {
    pub fn new(id: usize, pipeline: Arc<CrawlPipeline>) -> Self {
        Self { id, pipeline }
    }

    pub fn name(&self) -> String {
        format!("crawl-worker-{}", self.id)
    }

    /// 运行工作者循环
    pub async fn run(&self, queue: Arc<WorkQueue>, cancel: CancellationToken) {
        debug!("{} started", self.name());

        while let Some(unit) = queue.next(&cancel).await {
            let outcome = self.pipeline.process(&unit, &queue).await;
            debug!("{} finished {}: {:?}", self.name(), unit.id(), outcome);
            queue.complete();
        }

        debug!("{} stopped", self.name());
    }
}
