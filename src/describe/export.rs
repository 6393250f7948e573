// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 结果导出: JSON 数组 + CSV 表格

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::info;

use super::PersonDescription;
use crate::error::DescribeError;

/// 写出 `[{image, description}, ...]` (UTF-8, 缩进, 保留非 ASCII)
pub fn write_results_json(results: &[PersonDescription], path: &Path) -> Result<(), DescribeError> {
    let json = serde_json::to_string_pretty(results)?;
    fs::write(path, json)?;
    info!("💾 {} 条结果已保存到 {}", results.len(), path.display());
    Ok(())
}

/// 单元格文本: 字符串原样输出, 缺失或 null 为空, 其余为 JSON 文本
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// 表头为 `image` + 首条描述的键; 没有结果 (或首条描述为空) 时不写文件, 返回 false
pub fn write_results_csv(results: &[PersonDescription], path: &Path) -> Result<bool, DescribeError> {
    let Some(first) = results.first() else {
        info!("No results to convert to CSV.");
        return Ok(false);
    };
    let keys: Vec<&String> = match first.description.as_object() {
        Some(map) if !map.is_empty() => map.keys().collect(),
        _ => {
            info!("首条描述为空, 跳过 CSV");
            return Ok(false);
        }
    };

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["image"];
    header.extend(keys.iter().map(|k| k.as_str()));
    writer.write_record(&header)?;

    for item in results {
        let mut row = vec![item.image.clone()];
        row.extend(keys.iter().map(|k| cell(item.description.get(k.as_str()))));
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!("💾 CSV 已保存到 {}", path.display());
    Ok(true)
}
