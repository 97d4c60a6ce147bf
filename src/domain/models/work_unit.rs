// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::utils::url_utils;

/// 种子行
///
/// 保留原始列顺序的一行种子数据，原样传递给提取器
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRow {
    fields: Vec<(String, String)>,
}

impl SeedRow {
    /// 从表头和记录创建种子行
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut row = Self::default();
        for (k, v) in pairs {
            row.set(k, v);
        }
        row
    }

    /// 读取字段，缺失时返回空字符串
    pub fn get(&self, key: &str) -> &str {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    /// 设置字段，已存在时原位覆盖
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// 列名（按顺序）
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// 键值对（按顺序）
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// 机构网站
    Agency,
    /// 房源页面
    Listing,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnitKind::Agency => write!(f, "agency"),
            UnitKind::Listing => write!(f, "listing"),
        }
    }
}

/// 进度账本中的键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LedgerKey {
    /// (组ID, 站点ID)，用于机构单元
    Group(String, String),
    /// 单元ID，用于房源单元
    Unit(String),
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerKey::Group(group, site) => write!(f, "{}|{}", group, site),
            LedgerKey::Unit(id) => write!(f, "{}", id),
        }
    }
}

/// 工作单元
///
/// 一个可调度的抓取目标及其种子上下文，创建后不可变
#[derive(Debug, Clone)]
pub struct WorkUnit {
    kind: UnitKind,
    url: String,
    group: String,
    host: String,
    seed: Arc<SeedRow>,
    generation: u8,
}

impl WorkUnit {
    /// 创建机构单元
    pub fn agency(seed: SeedRow) -> Self {
        let url = seed.get("Website").trim().to_string();
        let group = seed.get("Agency Name").to_string();
        Self::build(UnitKind::Agency, url, group, Arc::new(seed), 0)
    }

    /// 创建房源单元
    pub fn listing(seed: SeedRow) -> Self {
        let url = seed.get("Listing URL").trim().to_string();
        let group = seed.get("Agency Name").to_string();
        Self::build(UnitKind::Listing, url, group, Arc::new(seed), 0)
    }

    /// 由回退发现的URL派生新的房源单元，沿用父单元的种子
    pub fn discovered(parent: &WorkUnit, url: &str) -> Self {
        let mut seed = (*parent.seed).clone();
        seed.set("Listing URL", url);
        Self::build(
            UnitKind::Listing,
            url.trim().to_string(),
            parent.group.clone(),
            Arc::new(seed),
            parent.generation.saturating_add(1),
        )
    }

    fn build(kind: UnitKind, url: String, group: String, seed: Arc<SeedRow>, generation: u8) -> Self {
        let host = url_utils::host_of(&url);
        Self {
            kind,
            url,
            group,
            host,
            seed,
            generation,
        }
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// 所属组（机构名称）
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn seed(&self) -> &SeedRow {
        &self.seed
    }

    /// 0 表示来自种子文件；回退发现的单元 >= 1
    pub fn generation(&self) -> u8 {
        self.generation
    }

    /// 用于日志和错误记录的标识
    pub fn id(&self) -> String {
        match self.kind {
            UnitKind::Agency => format!("agency:{}", self.group),
            UnitKind::Listing => self.url.clone(),
        }
    }

    /// 账本键
    pub fn ledger_key(&self) -> LedgerKey {
        match self.kind {
            UnitKind::Agency => LedgerKey::Group(self.group.clone(), self.url.clone()),
            UnitKind::Listing => LedgerKey::Unit(self.url.clone()),
        }
    }
}
