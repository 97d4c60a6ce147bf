// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::models::work_unit::WorkUnit;
use crate::engines::domain_gate::DomainGate;
use crate::engines::traits::Renderer;
use crate::engines::validators;

/// 回退策略的输入
pub struct FallbackContext<'a> {
    /// 当前单元
    pub unit: &'a WorkUnit,
    /// 主抓取得到的页面内容（可能为空）
    pub body: &'a str,
    /// 本单元使用的代理
    pub proxy: Option<&'a str>,
    /// 单次请求超时
    pub timeout: Duration,
}

/// 单个策略的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackResult {
    /// 替代URL列表
    Redirected { urls: Vec<String> },
    /// 渲染得到的页面内容
    Rendered { body: String },
}

/// 回退策略特质
#[async_trait]
pub trait FallbackStrategy: Send + Sync {
    /// 策略名称，用于日志和指标
    fn name(&self) -> &'static str;

    /// 尝试为单元找到可用内容，无结果时返回 `None`
    async fn attempt(&self, ctx: &FallbackContext<'_>) -> Option<FallbackResult>;
}

/// 回退级联的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    /// 被重定向到替代URL列表（主机已记一次失败）
    Redirected {
        strategy: &'static str,
        urls: Vec<String>,
    },
    /// 获得可提取的页面内容
    Rendered {
        strategy: &'static str,
        body: String,
    },
    /// 所有策略均失败（主机已记一次失败）
    Unresolved,
}

/// 无头渲染策略
pub struct HeadlessRenderStrategy {
    renderer: Arc<dyn Renderer>,
}

impl HeadlessRenderStrategy {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl FallbackStrategy for HeadlessRenderStrategy {
    fn name(&self) -> &'static str {
        "headless"
    }

    async fn attempt(&self, ctx: &FallbackContext<'_>) -> Option<FallbackResult> {
        let body = self
            .renderer
            .render(ctx.unit.url(), ctx.timeout, ctx.proxy)
            .await?;

        // A rendered challenge page is still unusable
        if let Some(signature) = validators::detect_block(&body) {
            debug!(
                "Rendered page for {} still blocked ({})",
                ctx.unit.url(),
                signature
            );
            return None;
        }
        Some(FallbackResult::Rendered { body })
    }
}

/// 回退级联
///
/// 按顺序尝试各策略，在第一个产生结果的策略处停止。
/// 未得到可提取内容的路径都会对所属主机恰好记一次失败
pub struct FallbackCascade {
    strategies: Vec<Box<dyn FallbackStrategy>>,
    gate: DomainGate,
}

impl FallbackCascade {
    /// 创建回退级联
    ///
    /// # 参数
    ///
    /// * `strategies` - 按尝试顺序排列的策略
    /// * `gate` - 用于记录主机失败的闸门
    pub fn new(strategies: Vec<Box<dyn FallbackStrategy>>, gate: DomainGate) -> Self {
        Self { strategies, gate }
    }

    /// 策略名称（按顺序）
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// 执行回退级联
    ///
    /// # 参数
    ///
    /// * `ctx` - 回退输入
    ///
    /// # 返回值
    ///
    /// 级联的最终结果
    pub async fn resolve(&self, ctx: &FallbackContext<'_>) -> CascadeOutcome {
        for strategy in &self.strategies {
            let Some(result) = strategy.attempt(ctx).await else {
                debug!("Fallback {} found nothing for {}", strategy.name(), ctx.unit.url());
                continue;
            };

            counter!("fallback_resolved_total", "strategy" => strategy.name()).increment(1);

            return match result {
                FallbackResult::Redirected { urls } => {
                    info!(
                        "Fallback {} redirected {} to {} URLs",
                        strategy.name(),
                        ctx.unit.url(),
                        urls.len()
                    );
                    // The direct fetch still failed
                    self.gate.record_failure(ctx.unit.host());
                    CascadeOutcome::Redirected {
                        strategy: strategy.name(),
                        urls,
                    }
                }
                FallbackResult::Rendered { body } => CascadeOutcome::Rendered {
                    strategy: strategy.name(),
                    body,
                },
            };
        }

        self.gate.record_failure(ctx.unit.host());
        CascadeOutcome::Unresolved
    }
}
