// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::config::settings::InputSettings;
use crate::domain::models::work_unit::SeedRow;
use crate::utils::errors::SeedError;

/// 种子集合
#[derive(Debug, Clone, Default)]
pub struct SeedSet {
    /// 机构种子
    pub agencies: Vec<SeedRow>,
    /// 按机构分组的房源种子，保持首次出现的顺序
    pub listings: Vec<(String, Vec<SeedRow>)>,
}

/// 解析分隔符配置
///
/// 支持单字节字符，以及转义写法 `\t` 和 `tab`
pub fn parse_delimiter(raw: &str) -> Result<u8, SeedError> {
    match raw {
        "\\t" | "tab" | "TAB" => Ok(b'\t'),
        _ if raw.len() == 1 => Ok(raw.as_bytes()[0]),
        _ => Err(SeedError::InvalidDelimiter(raw.to_string())),
    }
}

/// 读取种子文件
///
/// 首行为表头；行的列数与表头不一致或文件不可读时返回错误
pub fn load_rows(path: &Path, delimiter: u8) -> Result<Vec<SeedRow>, SeedError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: display.clone(),
        source,
    })?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let malformed = |source: csv::Error| SeedError::Malformed {
        path: display.clone(),
        source,
    };

    let headers = reader.headers().map_err(malformed)?.clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(SeedError::MissingHeader {
            path: display.clone(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(malformed)?;
        rows.push(SeedRow::from_pairs(
            headers
                .iter()
                .map(str::trim)
                .zip(record.iter().map(str::trim)),
        ));
    }
    Ok(rows)
}

/// 按 `Agency Name` 分组，保持首次出现的顺序
pub fn group_by_agency(rows: Vec<SeedRow>) -> Vec<(String, Vec<SeedRow>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<SeedRow>)> = Vec::new();

    for row in rows {
        let name = row.get("Agency Name").to_string();
        match index.get(&name) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(name.clone(), groups.len());
                groups.push((name, vec![row]));
            }
        }
    }
    groups
}

/// 按输入配置加载全部种子
pub fn load_seeds(input: &InputSettings) -> Result<SeedSet, SeedError> {
    let delimiter = parse_delimiter(&input.delimiter)?;

    let agencies = load_rows(&input.agencies_path, delimiter)?;
    info!(
        "Loaded {} agency seeds from {}",
        agencies.len(),
        input.agencies_path.display()
    );

    let listings = match &input.listings_path {
        Some(path) => {
            let rows = load_rows(path, delimiter)?;
            info!("Loaded {} listing seeds from {}", rows.len(), path.display());
            group_by_agency(rows)
        }
        None => Vec::new(),
    };

    Ok(SeedSet { agencies, listings })
}
