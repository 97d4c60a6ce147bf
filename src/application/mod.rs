// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 把领域服务、引擎和基础设施组装为一次完整的抓取运行
pub mod use_cases;
