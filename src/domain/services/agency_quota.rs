// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use std::collections::HashMap;

/// 每个机构的结果配额
///
/// 计数达到上限后，该机构的后续单元不再派发，已在途单元的多余结果被丢弃
#[derive(Debug)]
pub struct AgencyQuota {
    max_per_group: usize,
    counts: Mutex<HashMap<String, usize>>,
}

impl AgencyQuota {
    /// 创建配额
    ///
    /// # 参数
    ///
    /// * `max_per_group` - 每个机构最多写入的房源行数
    pub fn new(max_per_group: usize) -> Self {
        Self::with_counts(max_per_group, HashMap::new())
    }

    /// 以已有计数（通常来自进度账本）创建配额
    pub fn with_counts(max_per_group: usize, counts: HashMap<String, usize>) -> Self {
        Self {
            max_per_group,
            counts: Mutex::new(counts),
        }
    }

    /// 机构是否已满
    pub fn is_full(&self, group: &str) -> bool {
        self.count(group) >= self.max_per_group
    }

    /// 为机构预留行数
    ///
    /// # 返回值
    ///
    /// 实际获准写入的行数（`0..=requested`）
    pub fn reserve(&self, group: &str, requested: usize) -> usize {
        let mut counts = self.counts.lock();
        let count = counts.entry(group.to_string()).or_insert(0);
        let accepted = requested.min(self.max_per_group.saturating_sub(*count));
        *count += accepted;
        accepted
    }

    /// 机构当前计数
    pub fn count(&self, group: &str) -> usize {
        self.counts.lock().get(group).copied().unwrap_or(0)
    }

}
