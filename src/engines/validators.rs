// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::outcome::FetchOutcome;

/// 反爬页面特征（小写匹配）
pub const BLOCK_SIGNATURES: [&str; 3] = ["access denied", "cf-chl-bypass", "captcha"];

/// 检查页面内容是否为反爬页面
///
/// # 返回值
///
/// 命中时返回对应的特征串
pub fn detect_block(body: &str) -> Option<&'static str> {
    let lower = body.to_lowercase();
    BLOCK_SIGNATURES
        .iter()
        .find(|signature| lower.contains(*signature))
        .copied()
}

/// 检查页面内容是否可用
///
/// 空白内容返回 `Empty`，反爬页面返回 `Blocked`，可用时返回 `None`
pub fn inspect(body: &str) -> Option<FetchOutcome> {
    if body.trim().is_empty() {
        return Some(FetchOutcome::Empty);
    }
    detect_block(body).map(|signature| FetchOutcome::Blocked {
        reason: format!("matched block signature '{}'", signature),
    })
}
