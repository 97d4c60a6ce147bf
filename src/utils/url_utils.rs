// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use url::{ParseError, Url};

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 解析相对链接，失败时返回 `None`
pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    match Url::parse(base) {
        Ok(base_url) => resolve_url(&base_url, href).ok().map(String::from),
        Err(_) => Url::parse(href).ok().map(String::from),
    }
}

/// 提取URL的主机标识（小写 host[:port]）
///
/// 无法解析的URL直接使用原字符串
pub fn host_of(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host.to_lowercase(), port),
            (Some(host), None) => host.to_lowercase(),
            _ => url.trim().to_lowercase(),
        },
        Err(_) => url.trim().to_lowercase(),
    }
}

/// 站点根地址 `{scheme}://{host}`
pub fn site_root(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}
