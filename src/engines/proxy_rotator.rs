// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// 代理文件中的一项
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProxyEntry {
    Url(String),
    Pair {
        http: Option<String>,
        https: Option<String>,
    },
}

impl ProxyEntry {
    fn into_url(self) -> Option<String> {
        let url = match self {
            ProxyEntry::Url(url) => Some(url),
            ProxyEntry::Pair { http, https } => https.or(http),
        }?;
        let url = url.trim().to_string();
        (!url.is_empty()).then_some(url)
    }
}

/// 代理轮换器
///
/// 在固定列表上轮询，不做健康检查
#[derive(Debug, Default)]
pub struct ProxyRotator {
    proxies: Vec<String>,
    next: AtomicUsize,
}

impl ProxyRotator {
    pub fn new(proxies: Vec<String>) -> Self {
        Self {
            proxies,
            next: AtomicUsize::new(0),
        }
    }

    /// 从JSON文件加载代理列表
    ///
    /// 文件内容为字符串数组或 `{"http": ..., "https": ...}` 对象数组（优先 https）。
    /// 文件不可读或格式错误时记录警告并返回空轮换器
    pub fn from_file(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot read proxy file {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Vec<ProxyEntry>>(&content) {
            Ok(entries) => {
                let proxies: Vec<String> =
                    entries.into_iter().filter_map(ProxyEntry::into_url).collect();
                info!("Loaded {} proxies from {}", proxies.len(), path.display());
                Self::new(proxies)
            }
            Err(e) => {
                warn!("Invalid proxy file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// 取下一个代理，列表为空时返回 `None`
    pub fn next_proxy(&self) -> Option<&str> {
        if self.proxies.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Some(self.proxies[index].as_str())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
