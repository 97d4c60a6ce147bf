// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::models::outcome::FetchOutcome;
use crate::engines::fallback::{FallbackContext, FallbackResult, FallbackStrategy};
use crate::engines::traits::Fetcher;
use crate::utils::url_utils;

/// 依次探测的站点地图路径
pub const SITEMAP_PATHS: [&str; 2] = ["/sitemap.xml", "/sitemap_index.xml"];

/// 解析 `<urlset>` 站点地图
///
/// 根元素不是 `urlset`（例如站点地图索引）时返回 `None`；
/// `<loc>` 按文档顺序返回并去重
pub fn parse_urlset(xml: &str) -> Option<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut seen_root = false;
    let mut in_url = false;
    let mut in_loc = false;
    let mut urls = Vec::new();
    let mut dedup = HashSet::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if !seen_root && name != "urlset" {
                    return None;
                }
                seen_root = true;
                match name.as_str() {
                    "url" => in_url = true,
                    "loc" if in_url => in_loc = true,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "url" => in_url = false,
                    "loc" => in_loc = false,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) if in_loc => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                if !text.is_empty() && dedup.insert(text.clone()) {
                    urls.push(text);
                }
            }
            Ok(Event::CData(e)) if in_loc => {
                let text = String::from_utf8_lossy(&e.into_inner()).trim().to_string();
                if !text.is_empty() && dedup.insert(text.clone()) {
                    urls.push(text);
                }
            }
            Ok(Event::Eof) => break,
            // Keep whatever was read before the document broke off
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    seen_root.then_some(urls)
}

/// 站点地图发现策略
///
/// 请求站点根下的 `/sitemap.xml` 和 `/sitemap_index.xml`，
/// 第一个可解析为 `urlset` 且含有URL的文档即为替代列表
pub struct SitemapStrategy {
    fetcher: Arc<dyn Fetcher>,
}

impl SitemapStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FallbackStrategy for SitemapStrategy {
    fn name(&self) -> &'static str {
        "sitemap"
    }

    async fn attempt(&self, ctx: &FallbackContext<'_>) -> Option<FallbackResult> {
        let root = url_utils::site_root(ctx.unit.url())?;

        for path in SITEMAP_PATHS {
            let url = format!("{}{}", root, path);
            let outcome = self.fetcher.fetch(&url, ctx.timeout, ctx.proxy).await;

            if let FetchOutcome::Success { body, status, .. } = outcome {
                if !(200..300).contains(&status) {
                    continue;
                }
                if let Some(urls) = parse_urlset(&body) {
                    if !urls.is_empty() {
                        return Some(FallbackResult::Redirected { urls });
                    }
                }
            }
        }
        None
    }
}
