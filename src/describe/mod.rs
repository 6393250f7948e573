// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 人物描述阶段
//!
//! 读取 `person_<n>.jpg`, 逐张调用描述服务, 从返回文本中截取 JSON 对象,
//! 汇总写出 results.json 与 results.csv。单张失败只记录日志并跳过。

pub mod export;
pub mod gemini;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::DescribeConfig;
use crate::error::DescribeError;

pub use export::{write_results_csv, write_results_json};
pub use gemini::GeminiClient;

/// 发送给描述服务的提示词
pub const DEFAULT_PROMPT: &str = "Proporcione la siguiente información sobre la persona en esta imagen en formato JSON, con las claves y los valores en español: rango de edad (mínima y máxima), género, descripción demográfica y perfil de consumidor (por ejemplo, deportista, tecnológico, etc.).";

/// 描述服务: 图片 + 提示词 → 自由文本
pub trait DescriptionClient {
    fn describe(&self, image: &Path, prompt: &str) -> Result<String, DescribeError>;
}

/// 单张图片的描述结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonDescription {
    /// 文件名 (不含目录)
    pub image: String,
    pub description: Value,
}

/// 描述阶段汇总
#[derive(Clone, Debug, Default)]
pub struct DescribeSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub json_path: PathBuf,
    pub csv_path: Option<PathBuf>,
}

/// 第一个 `{` 到最后一个 `}` (含)
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// 从自由文本中解析描述对象
pub fn parse_description(text: &str) -> Result<Value, DescribeError> {
    let span = extract_json_span(text).ok_or(DescribeError::MissingJson)?;
    Ok(serde_json::from_str(span)?)
}

/// `person_<n>.jpg` 中的序号
fn person_number(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let digits = name.strip_prefix("person_")?.strip_suffix(".jpg")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// 按序号排序取前 `limit` 张
pub fn collect_person_images(dir: &Path, limit: usize) -> Result<Vec<PathBuf>, DescribeError> {
    if !dir.is_dir() {
        return Err(DescribeError::MissingDirectory(dir.to_path_buf()));
    }

    let mut images: Vec<(u64, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| person_number(&path).map(|n| (n, path)))
        .collect();
    if images.is_empty() {
        return Err(DescribeError::NoImages(dir.to_path_buf()));
    }

    images.sort_by_key(|(n, _)| *n);
    Ok(images.into_iter().take(limit).map(|(_, p)| p).collect())
}

/// 逐张描述; 失败的图片被跳过
pub fn describe_all<C: DescriptionClient + ?Sized>(
    client: &C,
    images: &[PathBuf],
    prompt: &str,
) -> Vec<PersonDescription> {
    info!("🧠 开始描述 {} 张人物图片", images.len());
    let mut results = Vec::with_capacity(images.len());

    for path in images {
        info!("  → {}", path.display());
        let text = match client.describe(path, prompt) {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️ 描述失败 {}: {}", path.display(), e);
                continue;
            }
        };
        let description = match parse_description(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!("⚠️ 无法解析 {} 的响应: {} | 原文: {}", path.display(), e, text.trim());
                continue;
            }
        };

        let image = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        results.push(PersonDescription { image, description });
    }

    info!("✅ 描述完成: {}/{} 成功", results.len(), images.len());
    results
}

/// 完整描述阶段: 收集 → 描述 → 导出
pub fn run_describe<C: DescriptionClient + ?Sized>(
    client: &C,
    crop_dir: &Path,
    config: &DescribeConfig,
) -> Result<DescribeSummary, DescribeError> {
    let images = collect_person_images(crop_dir, config.limit)?;
    let results = describe_all(client, &images, DEFAULT_PROMPT);

    write_results_json(&results, &config.results_json)?;
    let csv_path = match &config.results_csv {
        Some(path) if write_results_csv(&results, path)? => Some(path.clone()),
        _ => None,
    };

    Ok(DescribeSummary {
        attempted: images.len(),
        succeeded: results.len(),
        json_path: config.results_json.clone(),
        csv_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// 按文件名返回预设文本
    struct ScriptedClient {
        replies: HashMap<String, Result<String, u16>>,
    }

    impl DescriptionClient for ScriptedClient {
        fn describe(&self, image: &Path, _prompt: &str) -> Result<String, DescribeError> {
            let name = image.file_name().unwrap().to_string_lossy().into_owned();
            match self.replies.get(&name) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(status)) => Err(DescribeError::Service {
                    status: *status,
                    message: "quota".to_string(),
                }),
                None => Err(DescribeError::EmptyResponse),
            }
        }
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"jpg").unwrap();
    }

    #[test]
    fn test_json_span_from_free_text() {
        let text = "Aquí está:\n```json\n{\"género\": \"femenino\", \"edad\": {\"min\": 20}}\n```";
        assert_eq!(
            extract_json_span(text),
            Some("{\"género\": \"femenino\", \"edad\": {\"min\": 20}}")
        );
        assert_eq!(extract_json_span("sin objeto"), None);
        assert_eq!(extract_json_span("} al revés {"), None);
    }

    #[test]
    fn test_parse_description_errors() {
        assert!(matches!(
            parse_description("nothing here"),
            Err(DescribeError::MissingJson)
        ));
        assert!(matches!(
            parse_description("{ not json }"),
            Err(DescribeError::Json(_))
        ));
        let value = parse_description("ok {\"a\": 1} fin").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_collects_person_images_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["person_10.jpg", "person_2.jpg", "person_1.jpg", "other.jpg", "person_x.jpg"] {
            touch(dir.path(), name);
        }
        let images = collect_person_images(dir.path(), 10).unwrap();
        let names: Vec<String> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["person_1.jpg", "person_2.jpg", "person_10.jpg"]);

        assert_eq!(collect_person_images(dir.path(), 2).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_or_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            collect_person_images(&dir.path().join("nope"), 10),
            Err(DescribeError::MissingDirectory(_))
        ));
        assert!(matches!(
            collect_person_images(dir.path(), 10),
            Err(DescribeError::NoImages(_))
        ));
    }

    #[test]
    fn test_failures_are_skipped() {
        let images: Vec<PathBuf> = ["person_1.jpg", "person_2.jpg", "person_3.jpg", "person_4.jpg"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let client = ScriptedClient {
            replies: HashMap::from([
                ("person_1.jpg".to_string(), Ok("{\"género\": \"masculino\"}".to_string())),
                ("person_2.jpg".to_string(), Ok("Lo siento, no puedo.".to_string())),
                ("person_3.jpg".to_string(), Err(429)),
                ("person_4.jpg".to_string(), Ok("```{\"género\": \"femenino\"}```".to_string())),
            ]),
        };

        let results = describe_all(&client, &images, DEFAULT_PROMPT);
        let names: Vec<&str> = results.iter().map(|r| r.image.as_str()).collect();
        assert_eq!(names, vec!["person_1.jpg", "person_4.jpg"]);
        assert_eq!(results[1].description["género"], "femenino");
    }

    #[test]
    fn test_run_describe_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let crops = dir.path().join("cropped_persons");
        fs::create_dir_all(&crops).unwrap();
        touch(&crops, "person_1.jpg");
        touch(&crops, "person_2.jpg");

        let client = ScriptedClient {
            replies: HashMap::from([
                ("person_1.jpg".to_string(), Ok("{\"edad\": \"20-30\", \"género\": \"femenino\"}".to_string())),
                ("person_2.jpg".to_string(), Ok("{\"edad\": \"40-50\", \"género\": \"masculino\"}".to_string())),
            ]),
        };
        let config = DescribeConfig {
            results_json: dir.path().join("results.json"),
            results_csv: Some(dir.path().join("results.csv")),
            ..DescribeConfig::default()
        };

        let summary = run_describe(&client, &crops, &config).unwrap();
        assert_eq!((summary.attempted, summary.succeeded), (2, 2));
        assert_eq!(summary.csv_path, config.results_csv);

        let json = fs::read_to_string(&config.results_json).unwrap();
        assert!(json.contains("femenino"));
        let parsed: Vec<PersonDescription> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[1].image, "person_2.jpg");
    }
}
