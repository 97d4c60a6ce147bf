// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 提取服务（extraction_service）：提取器契约与默认的 JSON-LD 提取器
/// - 机构配额（agency_quota）：每个机构的结果行数上限
/// - 种子加载（seed_loader）：读取并分组种子文件
pub mod agency_quota;
pub mod extraction_service;
pub mod seed_loader;
