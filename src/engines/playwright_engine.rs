// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::future::BoxFuture;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::settings::RenderSettings;
use crate::engines::traits::Renderer;

// Shared browser instance, launched or connected once per process
static BROWSER_INSTANCE: OnceCell<Browser> = OnceCell::const_new();

/// 获取或初始化共享浏览器实例
///
/// 配置了远程调试地址时连接已有的Chrome，否则本地启动
pub async fn get_browser(remote_debugging_url: Option<&str>) -> Result<&'static Browser, String> {
    let remote = remote_debugging_url
        .map(str::to_string)
        .or_else(|| std::env::var("CHROMIUM_REMOTE_DEBUGGING_URL").ok());

    BROWSER_INSTANCE
        .get_or_try_init(|| async move {
            let (browser, mut handler) = if let Some(ref url) = remote {
                info!("Connecting to remote Chrome instance at: {}", url);
                Browser::connect(url.as_str())
                    .await
                    .map_err(|e| format!("Failed to connect to remote Chrome: {}", e))?
            } else {
                let config = BrowserConfig::builder()
                    .no_sandbox()
                    .request_timeout(Duration::from_secs(30))
                    .arg("--disable-gpu")
                    .arg("--disable-dev-shm-usage")
                    .build()?;

                Browser::launch(config).await.map_err(|e| e.to_string())?
            };

            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            Ok(browser)
        })
        .await
}

/// 无头浏览器渲染器
///
/// 基于chromiumoxide实现；导航后额外等待一段时间让页面脚本完成加载
pub struct ChromiumRenderer {
    settle: Duration,
    remote_debugging_url: Option<String>,
}

impl ChromiumRenderer {
    pub fn new(settle: Duration, remote_debugging_url: Option<String>) -> Self {
        Self {
            settle,
            remote_debugging_url,
        }
    }

    /// 在截止时间内渲染页面
    ///
    /// 超时只作用于导航、等待和读取内容，页面随后总会被关闭；
    /// 外层放弃该future时由 `CloseOnDrop` 在后台关闭
    async fn render_page(&self, url: &str, timeout: Duration) -> Result<String, String> {
        let deadline = tokio::time::Instant::now() + timeout;
        let browser = tokio::time::timeout_at(
            deadline,
            get_browser(self.remote_debugging_url.as_deref()),
        )
        .await
        .map_err(|_| "timed out connecting to the browser".to_string())??;

        let page = tokio::time::timeout_at(deadline, browser.new_page(url))
            .await
            .map_err(|_| "timed out opening page".to_string())?
            .map_err(|e| e.to_string())?;
        let mut tab = CloseOnDrop::new(page, close_page);

        let content = tokio::time::timeout_at(deadline, async {
            let page = tab.get()?;
            if let Err(e) = page.wait_for_navigation().await {
                debug!("Navigation wait failed for {}: {}", url, e);
            }
            tokio::time::sleep(self.settle).await;
            page.content().await.map_err(|e| e.to_string())
        })
        .await
        .unwrap_or_else(|_| Err(format!("timed out after {:?}", timeout)));

        tab.close().await;
        content
    }
}

fn close_page(page: Page) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }
    })
}

/// 需要显式关闭的资源（浏览器标签页）
///
/// 未关闭就被丢弃时在后台关闭，避免共享浏览器中残留标签页
struct CloseOnDrop<T: Send + 'static> {
    item: Option<T>,
    close: fn(T) -> BoxFuture<'static, ()>,
}

impl<T: Send + 'static> CloseOnDrop<T> {
    fn new(item: T, close: fn(T) -> BoxFuture<'static, ()>) -> Self {
        Self {
            item: Some(item),
            close,
        }
    }

    fn get(&self) -> Result<&T, String> {
        self.item.as_ref().ok_or_else(|| "already closed".to_string())
    }

    async fn close(&mut self) {
        if let Some(item) = self.item.take() {
            (self.close)(item).await;
        }
    }
}

impl<T: Send + 'static> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        let Some(item) = self.item.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn((self.close)(item));
        }
    }
}

impl From<&RenderSettings> for ChromiumRenderer {
    fn from(settings: &RenderSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.settle_ms),
            settings.remote_debugging_url.clone(),
        )
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    /// 渲染页面
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    /// * `timeout` - 整体超时（包含浏览器启动）
    /// * `proxy` - 共享浏览器不支持按页面设置代理，忽略
    ///
    /// # 返回值
    ///
    /// 渲染成功且内容非空时返回页面HTML
    async fn render(&self, url: &str, timeout: Duration, proxy: Option<&str>) -> Option<String> {
        if proxy.is_some() {
            debug!("Proxy is not applied to the shared browser for {}", url);
        }

        let start = Instant::now();
        match self.render_page(url, timeout).await {
            Ok(content) if !content.trim().is_empty() => {
                debug!("Rendered {} in {:?}", url, start.elapsed());
                Some(content)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Headless render failed for {}: {}", url, e);
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

#[cfg(test)]
#[path = "playwright_engine_test.rs"]
mod tests;
