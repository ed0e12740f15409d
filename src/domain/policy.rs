// ==========================================
// 参考数据导入引擎 - 安全策略与压缩包清单
// ==========================================

use serde::{Deserialize, Serialize};

const MB: u64 = 1024 * 1024;

// ==========================================
// SecurityPolicy - 按导入类型配置的安全策略
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    // ===== 单文件 =====
    pub max_file_size: u64, // 单个文件（含压缩包本身）上限，字节

    // ===== 压缩包 =====
    pub max_files: usize,
    pub max_compression_ratio: f64,
    pub max_entry_size: u64,
    pub allowed_extensions: Vec<String>, // 小写，含点号，如 ".xml"

    // ===== 结构限制 =====
    pub max_xml_depth: usize,
    pub max_json_depth: usize,
    pub max_array_length: usize,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            max_file_size: 50 * MB,
            max_files: 200,
            max_compression_ratio: 15.0,
            max_entry_size: 50 * MB,
            allowed_extensions: vec![".xml".to_string(), ".json".to_string()],
            max_xml_depth: 100,
            max_json_depth: 50,
            max_array_length: 10_000,
        }
    }
}

impl SecurityPolicy {
    /// 扩展名是否在白名单内（大小写不敏感）
    pub fn allows_extension(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }
}

// ==========================================
// ArchiveManifest - 已校验的压缩包清单
// ==========================================
// 红线: 校验通过后不含绝对路径与 `..` 段
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub relative_path: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveManifest {
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveManifest {
    pub fn total_uncompressed(&self) -> u64 {
        self.entries.iter().map(|e| e.uncompressed_size).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
