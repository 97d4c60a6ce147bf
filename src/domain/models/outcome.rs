// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::CrawlError;

/// 单次抓取结果
///
/// 每次抓取尝试恰好产生一个变体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 获得响应（状态码不一定是2xx，由上层判断内容是否可用）
    Success {
        body: String,
        content_type: String,
        status: u16,
    },
    /// 命中反爬页面
    Blocked { reason: String },
    /// 无可用内容
    Empty,
    /// 重试耗尽后的网络错误
    TransportError { cause: String },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    /// 不可用结果对应的单元错误，`Success` 返回 `None`
    pub fn to_error(&self) -> Option<CrawlError> {
        match self {
            FetchOutcome::Success { .. } => None,
            FetchOutcome::Blocked { reason } => Some(CrawlError::BlockedContent(reason.clone())),
            FetchOutcome::Empty => Some(CrawlError::EmptyContent),
            FetchOutcome::TransportError { cause } => Some(CrawlError::Transport(cause.clone())),
        }
    }
}

/// 单元处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// 提取完成并写入
    Completed { rows_written: usize },
    /// 被回退重定向到替代URL列表
    Redirected { strategy: &'static str, urls: usize },
    /// 进入人工审核队列
    ManualReview,
    /// 超过单元超时被放弃
    TimedOut,
    /// 管线或提取器出错
    Failed,
    /// 因账本、配额或熔断被跳过
    Skipped(SkipReason),
}

impl UnitOutcome {
    /// 是否应写入进度账本
    pub fn is_done(&self) -> bool {
        matches!(self, UnitOutcome::Completed { .. })
    }
}

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyDone,
    QuotaReached,
    HostCoolingDown,
    NoUrl,
}
