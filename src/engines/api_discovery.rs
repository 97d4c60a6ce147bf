// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;

use crate::engines::fallback::{FallbackContext, FallbackResult, FallbackStrategy};
use crate::utils::url_utils;

static QUOTED_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["'](/[^"']{5,200})["']"#).expect("valid quoted path regex")
});

static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("valid script selector"));

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[type][href]").expect("valid link selector"));

fn is_api_like(path: &str) -> bool {
    let path = path.to_lowercase();
    path.starts_with("/api") || path.contains("search") || path.contains("/list")
}

fn is_feed_type(link_type: &str) -> bool {
    let link_type = link_type.to_lowercase();
    ["rss", "xml", "json"]
        .iter()
        .any(|kind| link_type.contains(kind))
}

/// 从页面标记中发现API或数据源端点
///
/// # 参数
///
/// * `base_url` - 用于解析相对路径的页面URL
/// * `html` - 页面内容
///
/// # 返回值
///
/// 去重后的绝对URL，保持发现顺序
pub fn discover_endpoints(base_url: &str, html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut endpoints = Vec::new();

    let mut push = |candidate: &str| {
        if let Some(absolute) = url_utils::absolute_url(base_url, candidate) {
            if seen.insert(absolute.clone()) {
                endpoints.push(absolute);
            }
        }
    };

    for script in document.select(&SCRIPT_SELECTOR) {
        let text: String = script.text().collect();
        for captures in QUOTED_PATH.captures_iter(&text) {
            let path = &captures[1];
            if is_api_like(path) {
                push(path);
            }
        }
    }

    for link in document.select(&LINK_SELECTOR) {
        let link_type = link.value().attr("type").unwrap_or_default();
        if !is_feed_type(link_type) {
            continue;
        }
        if let Some(href) = link.value().attr("href") {
            push(href);
        }
    }

    endpoints
}

/// API端点发现策略
///
/// 只扫描已有的页面内容，不发起网络请求
#[derive(Default)]
pub struct ApiDiscoveryStrategy;

#[async_trait]
impl FallbackStrategy for ApiDiscoveryStrategy {
    fn name(&self) -> &'static str {
        "api_discovery"
    }

    async fn attempt(&self, ctx: &FallbackContext<'_>) -> Option<FallbackResult> {
        if ctx.body.trim().is_empty() {
            return None;
        }
        let urls = discover_endpoints(ctx.unit.url(), ctx.body);
        if urls.is_empty() {
            None
        } else {
            Some(FallbackResult::Redirected { urls })
        }
    }
}
