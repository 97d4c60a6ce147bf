// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

use crate::config::settings::RetrySettings;

/// 需要自动重试的HTTP状态码
pub const TRANSIENT_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: false,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            backoff_multiplier: settings.backoff_multiplier,
            ..Default::default()
        }
    }
}

impl RetryPolicy {
    /// 不重试的策略
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// 计算第 `attempt` 次重试（从1开始）前的退避时间
    ///
    /// 未启用抖动时结果随 `attempt` 单调不减
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.max(1.0).powi(exponent);

        // 限制最大退避时间
        let capped_backoff = backoff_secs.min(self.max_backoff.as_secs_f64());

        let final_backoff = if self.enable_jitter && capped_backoff > 0.0 {
            let jitter_range = capped_backoff * self.jitter_factor;
            let jitter = rand::random_range(-jitter_range..=jitter_range);
            (capped_backoff + jitter).max(0.0)
        } else {
            capped_backoff
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 是否应该重试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// 状态码是否属于临时错误
    pub fn is_transient_status(status: u16) -> bool {
        TRANSIENT_STATUS_CODES.contains(&status)
    }
}
