// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// - 领域模型（models）：工作单元、抓取结果和输出记录
/// - 服务（services）：提取、配额和种子加载
///
/// 领域层不依赖网络或文件输出的具体实现
pub mod models;
pub mod services;
