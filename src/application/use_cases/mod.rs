// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 用例模块
///
/// 一次抓取运行的完整流程
pub mod run_crawl;
