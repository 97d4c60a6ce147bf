// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// - 进度账本（progress_ledger）：可续跑的完成记录
/// - CSV输出（csv_sink）：追加写入的表格输出
/// - 错误日志（error_log）：非致命错误的持久记录
/// - 指标（metrics）：Prometheus 导出
pub mod csv_sink;
pub mod error_log;
pub mod metrics;
pub mod progress_ledger;
