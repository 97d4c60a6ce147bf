// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::models::outcome::FetchOutcome;

/// 抓取客户端特质
///
/// 实现方在内部完成临时错误的重试；不得触碰任何共享的可变状态
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 执行一次 GET 抓取
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    /// * `timeout` - 单次请求超时
    /// * `proxy` - 出口代理（可选）
    async fn fetch(&self, url: &str, timeout: Duration, proxy: Option<&str>) -> FetchOutcome;

    /// 客户端名称
    fn name(&self) -> &'static str;
}

/// 无头渲染器特质
#[async_trait]
pub trait Renderer: Send + Sync {
    /// 在完整浏览器中渲染页面，失败或内容为空时返回 `None`
    async fn render(&self, url: &str, timeout: Duration, proxy: Option<&str>) -> Option<String>;

    /// 渲染器名称
    fn name(&self) -> &'static str;
}
