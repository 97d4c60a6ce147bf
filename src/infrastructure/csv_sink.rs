// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::models::work_unit::SeedRow;
use crate::infrastructure::error_log::ErrorLog;
use crate::utils::errors::SinkError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Default)]
struct SinkState {
    header_written: bool,
    columns: Vec<String>,
}

/// 追加写入的CSV输出
///
/// 每个文件一把锁，保证并发写入时每一行完整；表头只在文件为空时写入一次
pub struct CsvSink {
    path: PathBuf,
    state: Mutex<SinkState>,
}

impl CsvSink {
    /// 打开输出文件
    ///
    /// 文件已存在时读取其表头，后续行按该表头写入
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let mut state = SinkState::default();

        if path.exists() {
            let content = std::fs::read(&path)?;
            let content = content.strip_prefix(UTF8_BOM).unwrap_or(&content[..]);
            if !content.is_empty() {
                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(true)
                    .from_reader(content);
                state.columns = reader.headers()?.iter().map(str::to_string).collect();
                state.header_written = true;
            }
        }

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(&self, new_file: bool) -> Result<File, SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if new_file {
            file.write_all(UTF8_BOM)?;
        }
        Ok(file)
    }

    /// 追加一条记录，首次写入时以字段名作为表头
    pub fn append_record<T: Serialize>(&self, record: &T) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        let file = self.open_file(!state.header_written)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(!state.header_written)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;

        state.header_written = true;
        Ok(())
    }

    /// 追加多条记录
    pub fn append_records<T: Serialize>(&self, records: &[T]) -> Result<(), SinkError> {
        for record in records {
            self.append_record(record)?;
        }
        Ok(())
    }

    /// 追加一行种子格式的数据
    ///
    /// 表头取自第一行；之后的行按表头列投影，缺失列写空值
    pub fn append_row(&self, row: &SeedRow) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        let new_file = !state.header_written;
        let file = self.open_file(new_file)?;
        let mut writer = csv::WriterBuilder::new().from_writer(file);

        if new_file {
            state.columns = row.keys().map(str::to_string).collect();
            writer.write_record(&state.columns)?;
        }
        writer.write_record(state.columns.iter().map(|c| row.get(c)))?;
        writer.flush()?;

        state.header_written = true;
        Ok(())
    }

    /// 读取整个文件中两列的映射（用于续跑时恢复机构Logo）
    pub fn read_column_pair(&self, key: &str, value: &str) -> Result<Vec<(String, String)>, SinkError> {
        let _state = self.state.lock();
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read(&self.path)?;
        let content = content.strip_prefix(UTF8_BOM).unwrap_or(&content[..]);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content);

        let headers = reader.headers()?.clone();
        let (Some(key_idx), Some(value_idx)) = (
            headers.iter().position(|h| h == key),
            headers.iter().position(|h| h == value),
        ) else {
            return Ok(Vec::new());
        };

        let mut pairs = Vec::new();
        for record in reader.records() {
            let record = record?;
            pairs.push((
                record.get(key_idx).unwrap_or_default().to_string(),
                record.get(value_idx).unwrap_or_default().to_string(),
            ));
        }
        Ok(pairs)
    }
}

/// 一次运行的全部输出
pub struct OutputSinks {
    pub enriched_agencies: CsvSink,
    pub profiles: CsvSink,
    pub properties: CsvSink,
    pub agents: CsvSink,
    pub manual_review: CsvSink,
    pub discovered: CsvSink,
    pub errors: ErrorLog,
}

impl OutputSinks {
    pub const ENRICHED_AGENCIES: &'static str = "enriched_agencies.csv";
    pub const PROFILES: &'static str = "profile_import.csv";
    pub const PROPERTIES: &'static str = "properties_import.csv";
    pub const AGENTS: &'static str = "agents_import.csv";
    pub const MANUAL_REVIEW: &'static str = "manual_review.csv";
    pub const DISCOVERED: &'static str = "discovered_urls.csv";

    /// 在输出目录下打开全部输出文件
    ///
    /// # 参数
    ///
    /// * `dir` - 输出目录，不存在时创建
    /// * `error_log` - 错误日志文件名
    pub fn open(dir: &Path, error_log: &str) -> Result<Self, SinkError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            enriched_agencies: CsvSink::open(dir.join(Self::ENRICHED_AGENCIES))?,
            profiles: CsvSink::open(dir.join(Self::PROFILES))?,
            properties: CsvSink::open(dir.join(Self::PROPERTIES))?,
            agents: CsvSink::open(dir.join(Self::AGENTS))?,
            manual_review: CsvSink::open(dir.join(Self::MANUAL_REVIEW))?,
            discovered: CsvSink::open(dir.join(Self::DISCOVERED))?,
            errors: ErrorLog::new(dir.join(error_log)),
        })
    }
}
