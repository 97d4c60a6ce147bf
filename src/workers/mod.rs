// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 单元处理管线、工作者循环和工作者生命周期管理
pub mod crawl_worker;
pub mod manager;

pub use crawl_worker::{CrawlPipeline, CrawlWorker, RunSummary, WorkerOptions};
pub use manager::WorkerManager;
