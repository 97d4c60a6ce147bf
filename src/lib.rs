// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 组装一次完整的抓取运行
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 工作单元、输出记录、种子加载、配额和提取器
pub mod domain;

/// 引擎模块
///
/// 抓取客户端、主机闸门、回退级联和代理轮换
pub mod engines;

/// 基础设施模块
///
/// 进度账本、CSV输出、错误日志和指标导出
pub mod infrastructure;

/// 队列模块
///
/// 工作单元的共享队列
pub mod queue;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 单元处理管线和工作者管理
pub mod workers;
