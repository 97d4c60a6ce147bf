// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::domain::models::outcome::FetchOutcome;
use crate::engines::traits::Fetcher;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::text_encoding::decode_body;

/// 默认浏览器 User-Agent
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124 Safari/537.36";

/// HTTP抓取客户端
///
/// 基于reqwest实现；按代理缓存客户端以复用连接池，对临时状态码和连接错误按退避策略重试
pub struct ReqwestEngine {
    policy: RetryPolicy,
    clients: Mutex<HashMap<Option<String>, reqwest::Client>>,
}

impl Default for ReqwestEngine {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl ReqwestEngine {
    /// 创建新的抓取客户端
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<reqwest::Client, String> {
        let key = proxy.map(str::to_string);
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .cookie_store(true);

        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| format!("Invalid proxy {}: {}", proxy_url, e))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| e.to_string())?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    async fn backoff(&self, attempt: u32, url: &str, cause: &str) {
        let delay = self.policy.calculate_backoff(attempt);
        counter!("fetch_retries_total").increment(1);
        debug!(
            "Retry {}/{} for {} in {:?} ({})",
            attempt, self.policy.max_retries, url, delay, cause
        );
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Fetcher for ReqwestEngine {
    /// 执行HTTP抓取
    ///
    /// 非2xx且不属于临时状态码的响应仍按 `Success` 返回，由上层决定内容是否可用
    async fn fetch(&self, url: &str, timeout: Duration, proxy: Option<&str>) -> FetchOutcome {
        let client = match self.client_for(proxy) {
            Ok(client) => client,
            Err(cause) => return FetchOutcome::TransportError { cause },
        };

        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            match client.get(url).timeout(timeout).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if RetryPolicy::is_transient_status(status) {
                        if self.policy.should_retry(attempt) {
                            attempt += 1;
                            self.backoff(attempt, url, &format!("HTTP {}", status)).await;
                            continue;
                        }
                        warn!("Giving up on {} after {} retries (HTTP {})", url, attempt, status);
                        return FetchOutcome::TransportError {
                            cause: format!("HTTP {} after {} retries", status, attempt),
                        };
                    }

                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();

                    match response.bytes().await {
                        Ok(bytes) => {
                            debug!(
                                "Fetched {} ({}, {} bytes) in {:?}",
                                url,
                                status,
                                bytes.len(),
                                start.elapsed()
                            );
                            return FetchOutcome::Success {
                                body: decode_body(&bytes, &content_type),
                                content_type,
                                status,
                            };
                        }
                        Err(e) => {
                            if self.policy.should_retry(attempt) {
                                attempt += 1;
                                self.backoff(attempt, url, &e.to_string()).await;
                                continue;
                            }
                            return FetchOutcome::TransportError {
                                cause: e.to_string(),
                            };
                        }
                    }
                }
                // Builder errors (malformed URL etc.) will never succeed
                Err(e) if e.is_builder() => {
                    return FetchOutcome::TransportError {
                        cause: e.to_string(),
                    };
                }
                Err(e) => {
                    if self.policy.should_retry(attempt) {
                        attempt += 1;
                        self.backoff(attempt, url, &e.to_string()).await;
                        continue;
                    }
                    warn!("Giving up on {} after {} retries: {}", url, attempt, e);
                    return FetchOutcome::TransportError {
                        cause: e.to_string(),
                    };
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}

#[cfg(test)]
#[path = "reqwest_engine_test.rs"]
mod tests;
