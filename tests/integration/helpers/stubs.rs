// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use realty_crawler::domain::models::outcome::FetchOutcome;
use realty_crawler::domain::models::records::{
    stable_uid, AgencyExtraction, AgencyProfile, AgentRecord, ListingExtraction, PropertyRecord,
    AGENCY_LOGO_FIELD,
};
use realty_crawler::domain::models::work_unit::SeedRow;
use realty_crawler::domain::services::extraction_service::Extractor;
use realty_crawler::engines::traits::{Fetcher, Renderer};
use realty_crawler::utils::errors::ExtractionError;
use realty_crawler::utils::url_utils;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// 按URL返回预设结果的抓取客户端
///
/// 未预设的URL返回空的404响应
#[derive(Default)]
pub struct StubFetcher {
    responses: HashMap<String, FetchOutcome>,
    hanging: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, outcome: FetchOutcome) -> Self {
        self.responses.insert(url.to_string(), outcome);
        self
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.with(
            url,
            FetchOutcome::Success {
                body: body.to_string(),
                content_type: "text/html".to_string(),
                status: 200,
            },
        )
    }

    /// 该URL的请求永不返回
    pub fn hanging(mut self, url: &str) -> Self {
        self.hanging.insert(url.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == url).count()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration, _proxy: Option<&str>) -> FetchOutcome {
        self.calls.lock().push(url.to_string());

        if self.hanging.contains(url) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.responses
            .get(url)
            .cloned()
            .unwrap_or(FetchOutcome::Success {
                body: String::new(),
                content_type: "text/html".to_string(),
                status: 404,
            })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// 返回固定内容的渲染器
pub struct StubRenderer {
    pub body: Option<String>,
    pub calls: Mutex<usize>,
}

impl StubRenderer {
    pub fn returning(body: Option<&str>) -> Self {
        Self {
            body: body.map(str::to_string),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn render(&self, _url: &str, _timeout: Duration, _proxy: Option<&str>) -> Option<String> {
        *self.calls.lock() += 1;
        self.body.clone()
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// 不解析页面的提取器
///
/// 每个房源页产生一行房源和一个经纪人；页面包含 `BROKEN` 时返回错误
#[derive(Default)]
pub struct StubExtractor;

impl Extractor for StubExtractor {
    fn extract_agency(&self, html: &str, seed: &SeedRow) -> Result<AgencyExtraction, ExtractionError> {
        if html.contains("BROKEN") {
            return Err(ExtractionError::Malformed("unparsable agency page".into()));
        }
        let website = seed.get("Website");
        let logo = format!(
            "{}/logo.png",
            url_utils::site_root(website).unwrap_or_default()
        );

        let mut enriched = seed.clone();
        enriched.set(AGENCY_LOGO_FIELD, logo.as_str());

        Ok(AgencyExtraction {
            enriched,
            profile: AgencyProfile {
                agency_name: seed.get("Agency Name").to_string(),
                website_url: website.to_string(),
                country: seed.get("Country").to_string(),
                ..Default::default()
            },
            logo,
        })
    }

    fn extract_listing(
        &self,
        html: &str,
        seed: &SeedRow,
        agency_logo: &str,
    ) -> Result<ListingExtraction, ExtractionError> {
        if html.contains("BROKEN") {
            return Err(ExtractionError::Malformed("unparsable listing page".into()));
        }
        let url = seed.get("Listing URL");
        let title = "Apartment".to_string();

        Ok(ListingExtraction {
            properties: vec![PropertyRecord {
                unique_id: stable_uid(seed.get("ISO"), url, &title),
                title,
                listing_url: url.to_string(),
                agency_name: seed.get("Agency Name").to_string(),
                primary_image: agency_logo.to_string(),
                ..Default::default()
            }],
            agents: vec![AgentRecord {
                name: "Ana".to_string(),
                email: "ana@example.test".to_string(),
                ..Default::default()
            }],
        })
    }
}
