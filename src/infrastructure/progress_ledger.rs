// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::domain::models::work_unit::LedgerKey;
use crate::utils::errors::LedgerError;

/// 进度文件格式
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(rename = "processedGroupKeys", alias = "processed_agencies", default)]
    processed_group_keys: Vec<(String, String)>,
    #[serde(rename = "processedUnitIds", alias = "processed_listings", default)]
    processed_unit_ids: Vec<String>,
    #[serde(rename = "groupRowCounts", default)]
    group_row_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct LedgerState {
    groups: HashSet<(String, String)>,
    units: HashSet<String>,
    row_counts: HashMap<String, usize>,
    since_checkpoint: usize,
}

impl LedgerState {
    fn snapshot(&self) -> LedgerFile {
        let mut groups: Vec<_> = self.groups.iter().cloned().collect();
        groups.sort();
        let mut units: Vec<_> = self.units.iter().cloned().collect();
        units.sort();

        LedgerFile {
            processed_group_keys: groups,
            processed_unit_ids: units,
            group_row_counts: self
                .row_counts
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }
}

/// 进度账本
///
/// 记录已完成的单元，支持中断后续跑。所有集合在同一把锁下修改；
/// 落盘在单独的写锁下串行执行，先写临时文件再原子替换
pub struct ProgressLedger {
    path: PathBuf,
    checkpoint_every: usize,
    state: Mutex<LedgerState>,
    writer: Mutex<()>,
}

impl ProgressLedger {
    /// 加载进度账本
    ///
    /// # 参数
    ///
    /// * `path` - 进度文件路径，不存在时从空账本开始
    /// * `checkpoint_every` - 每完成多少个单元落盘一次
    ///
    /// # 返回值
    ///
    /// 文件存在但无法读取或解析时返回错误
    pub fn load(path: impl Into<PathBuf>, checkpoint_every: usize) -> Result<Self, LedgerError> {
        let path = path.into();
        let mut state = LedgerState::default();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if !content.trim().is_empty() {
                let file: LedgerFile = serde_json::from_str(&content)?;
                state.groups = file.processed_group_keys.into_iter().collect();
                state.units = file.processed_unit_ids.into_iter().collect();
                state.row_counts = file.group_row_counts.into_iter().collect();
            }
            info!(
                "Resuming from {}: {} groups, {} units already done",
                path.display(),
                state.groups.len(),
                state.units.len()
            );
        }

        Ok(Self {
            path,
            checkpoint_every: checkpoint_every.max(1),
            state: Mutex::new(state),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 单元是否已完成
    pub fn is_done(&self, key: &LedgerKey) -> bool {
        let state = self.state.lock();
        match key {
            LedgerKey::Group(group, site) => state.groups.contains(&(group.clone(), site.clone())),
            LedgerKey::Unit(id) => state.units.contains(id),
        }
    }

    /// 标记单元完成
    ///
    /// 达到检查点间隔时落盘；落盘失败只记录警告
    ///
    /// # 返回值
    ///
    /// 单元此前未完成时返回true
    pub fn mark_done(&self, key: &LedgerKey) -> bool {
        let checkpoint_due = {
            let mut state = self.state.lock();
            let inserted = match key {
                LedgerKey::Group(group, site) => state.groups.insert((group.clone(), site.clone())),
                LedgerKey::Unit(id) => state.units.insert(id.clone()),
            };
            if !inserted {
                return false;
            }
            state.since_checkpoint += 1;
            if state.since_checkpoint >= self.checkpoint_every {
                state.since_checkpoint = 0;
                true
            } else {
                false
            }
        };

        if checkpoint_due {
            if let Err(e) = self.persist() {
                warn!("Checkpoint to {} failed: {}", self.path.display(), e);
            }
        }
        true
    }

    /// 累加机构已写入的房源行数
    pub fn add_group_rows(&self, group: &str, rows: usize) {
        if rows == 0 {
            return;
        }
        let mut state = self.state.lock();
        *state.row_counts.entry(group.to_string()).or_insert(0) += rows;
    }

    /// 各机构已写入的房源行数
    pub fn group_row_counts(&self) -> HashMap<String, usize> {
        self.state.lock().row_counts.clone()
    }

    /// 已完成的机构数与单元数
    pub fn len(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.groups.len(), state.units.len())
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.groups.is_empty() && state.units.is_empty()
    }

    /// 立即落盘
    pub fn persist(&self) -> Result<(), LedgerError> {
        let _writer = self.writer.lock();
        let snapshot = self.state.lock().snapshot();
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(
            "Checkpoint written to {} ({} groups, {} units)",
            self.path.display(),
            snapshot.processed_group_keys.len(),
            snapshot.processed_unit_ids.len()
        );
        Ok(())
    }
}
