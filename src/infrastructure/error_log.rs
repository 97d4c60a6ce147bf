// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// 持久化错误日志
///
/// 每条非致命错误一行：`<RFC3339时间> ERROR unit=<单元ID> <原因>`
pub struct ErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 记录一条错误
    ///
    /// 写入失败只产生警告，不影响运行
    pub fn record(&self, unit_id: &str, cause: &str) {
        error!(unit = unit_id, "{}", cause);

        let line = format!(
            "{} ERROR unit={} {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            unit_id,
            cause.replace('\n', " ")
        );

        let _guard = self.lock.lock();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));

        if let Err(e) = result {
            warn!("Cannot append to error log {}: {}", self.path.display(), e);
        }
    }
}
