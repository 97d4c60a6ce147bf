// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;
use thiserror::Error;

/// 抓取单元错误类型
///
/// 除 `Seed`、`Config` 与启动阶段的 `Ledger` 错误外，其余错误都只终止当前单元，不会中断整个运行
#[derive(Error, Debug)]
pub enum CrawlError {
    /// 网络错误（重试耗尽后）
    #[error("Transport error: {0}")]
    Transport(String),

    /// 检测到反爬页面
    #[error("Blocked content: {0}")]
    BlockedContent(String),

    /// 无可用内容
    #[error("Empty content")]
    EmptyContent,

    /// 提取器失败
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// 主机槽位池已关闭
    #[error("Host slot pool closed: {0}")]
    Gate(#[from] tokio::sync::AcquireError),

    /// 单元超时
    #[error("Task timed out after {0:?}")]
    TaskTimeout(Duration),

    /// 种子文件错误
    #[error("Seed error: {0}")]
    Seed(#[from] SeedError),

    /// 进度账本错误
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// 输出错误
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(String),
}

/// 提取器错误类型
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    #[error("Malformed markup: {0}")]
    Malformed(String),

    #[error("Missing seed field: {0}")]
    MissingField(String),

    #[error("{0}")]
    Other(String),
}

/// 种子文件错误类型
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Cannot read seed file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed seed file {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Seed file {path} has no header row")]
    MissingHeader { path: String },

    #[error("Invalid delimiter {0:?}, expected a single byte")]
    InvalidDelimiter(String),
}

/// 进度账本错误类型
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// 输出文件错误类型
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
