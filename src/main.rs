// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use realty_crawler::application::use_cases::run_crawl::RunCrawlUseCase;
use realty_crawler::config::settings::Settings;
use realty_crawler::domain::services::extraction_service::{
    Extractor, FeatureTaxonomy, JsonLdExtractor,
};
use realty_crawler::domain::services::seed_loader;
use realty_crawler::engines::playwright_engine::ChromiumRenderer;
use realty_crawler::engines::reqwest_engine::ReqwestEngine;
use realty_crawler::engines::traits::{Fetcher, Renderer};
use realty_crawler::infrastructure::metrics::init_metrics;
use realty_crawler::utils::retry_policy::RetryPolicy;
use realty_crawler::utils::telemetry;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 主函数
///
/// 加载配置和种子，依次运行机构遍和房源遍。
/// 第一个命令行参数可指定配置文件；`FEATURE_TAXONOMY` 可指定特征关键词文件
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::from_file(&path)?,
        None => Settings::new()?,
    };

    // 2. Initialize logging and metrics
    telemetry::init_telemetry(settings.logging.json);
    info!("Starting realty-crawler...");
    init_metrics(&settings.metrics);

    // 3. Load seeds; malformed input aborts before any work
    let seeds = seed_loader::load_seeds(&settings.input)?;

    // 4. Initialize components
    let fetcher: Arc<dyn Fetcher> = Arc::new(ReqwestEngine::new(RetryPolicy::from(&settings.retry)));

    let taxonomy = match std::env::var("FEATURE_TAXONOMY") {
        Ok(path) => match FeatureTaxonomy::from_file(Path::new(&path)) {
            Ok(taxonomy) => taxonomy,
            Err(e) => {
                warn!("Falling back to built-in feature taxonomy: {}", e);
                FeatureTaxonomy::default()
            }
        },
        Err(_) => FeatureTaxonomy::default(),
    };
    let extractor: Arc<dyn Extractor> = Arc::new(JsonLdExtractor::new(taxonomy));

    let renderer: Option<Arc<dyn Renderer>> = if settings.crawler.use_headless {
        Some(Arc::new(ChromiumRenderer::from(&settings.render)))
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let use_case =
        RunCrawlUseCase::from_settings(&settings, fetcher, extractor, renderer, cancel.clone())?;
    let shutdown = use_case.manager().spawn_shutdown_listener();

    // 5. Run both passes
    let summary = use_case.execute(&seeds).await?;

    cancel.cancel();
    let _ = shutdown.await;

    info!(
        "Done. Agencies processed: {}, properties written: {}, manual review: {}, timed out: {}",
        summary.agencies_processed,
        summary.properties_written,
        summary.manual_review,
        summary.timed_out
    );
    Ok(())
}
