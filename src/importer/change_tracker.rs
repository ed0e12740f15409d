// ==========================================
// 参考数据导入引擎 - 参考文件变更跟踪
// ==========================================
// 职责: 基于 SHA-256 内容摘要判断参考文件是否需要重新导入
// 范围: 仅匹配参考文件通配模式的文件名（如 reference_*.xml）
//       不匹配的文件一律视为需要处理
// 持久化: 单个 JSON 对象 { "<文件名>": "<sha256-hex>" }，每次变更同步落盘
// 并发: 无内部锁，同一缓存文件只允许单写者
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// 流式读取缓冲区大小
const HASH_BUFFER_SIZE: usize = 8192;

pub struct ChangeTracker {
    cache_path: PathBuf,
    patterns: Vec<Regex>,
    hashes: BTreeMap<String, String>,
}

impl ChangeTracker {
    /// 创建跟踪器并加载已有缓存
    ///
    /// 缓存文件不存在时从空开始；缓存损坏时记录错误并从空开始
    pub fn new(cache_path: impl Into<PathBuf>, patterns: &[String]) -> ImportResult<Self> {
        let cache_path = cache_path.into();
        let patterns = patterns
            .iter()
            .map(|p| glob_to_regex(p))
            .collect::<ImportResult<Vec<_>>>()?;
        let hashes = load_cache(&cache_path);

        debug!(
            cache = %cache_path.display(),
            entries = hashes.len(),
            "变更跟踪缓存已加载"
        );

        Ok(Self {
            cache_path,
            patterns,
            hashes,
        })
    }

    /// 默认缓存路径
    ///
    /// 优先级: REFERENCE_IMPORT_HASH_CACHE > 用户数据目录 > 当前目录
    pub fn default_cache_path() -> PathBuf {
        if let Ok(path) = std::env::var("REFERENCE_IMPORT_HASH_CACHE") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return PathBuf::from(trimmed);
            }
        }
        dirs::data_dir()
            .map(|dir| dir.join("reference-import").join("file_hashes.json"))
            .unwrap_or_else(|| PathBuf::from("./file_hashes.json"))
    }

    /// 文件名是否属于参考文件
    pub fn is_reference_file(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(file_name))
    }

    /// 是否需要处理
    ///
    /// 非参考文件恒为 true；参考文件在未记录或摘要变化时为 true
    pub fn needs_processing(&self, path: &Path) -> ImportResult<bool> {
        let name = file_name_of(path)?;
        if !self.is_reference_file(&name) {
            return Ok(true);
        }

        let Some(stored) = self.hashes.get(&name) else {
            return Ok(true);
        };
        let current = compute_sha256(path)?;
        Ok(stored != &current)
    }

    /// 记录文件当前摘要并落盘
    ///
    /// 非参考文件不记录，缓存只保存参考文件名
    pub fn mark_processed(&mut self, path: &Path) -> ImportResult<()> {
        let name = file_name_of(path)?;
        if !self.is_reference_file(&name) {
            debug!(file = %name, "非参考文件，不记录摘要");
            return Ok(());
        }
        let digest = compute_sha256(path)?;
        debug!(file = %name, sha256 = %digest, "记录文件摘要");
        self.hashes.insert(name, digest);
        self.persist()
    }

    /// 清空全部记录并落盘
    pub fn clear(&mut self) -> ImportResult<()> {
        self.hashes.clear();
        info!(cache = %self.cache_path.display(), "变更跟踪缓存已清空");
        self.persist()
    }

    pub fn stored_digest(&self, file_name: &str) -> Option<&str> {
        self.hashes.get(file_name).map(String::as_str)
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    // 先写同目录临时文件再 rename，保证缓存文件不会半写
    fn persist(&self) -> ImportResult<()> {
        if let Some(parent) = self.cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.hashes)
            .map_err(|e| ImportError::InternalError(format!("摘要缓存序列化失败: {}", e)))?;

        let mut tmp = self.cache_path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.cache_path)?;
        Ok(())
    }
}

// ==========================================
// 内部工具函数
// ==========================================

fn load_cache(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        return BTreeMap::new();
    }
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()));
    match parsed {
        Ok(map) => map,
        Err(e) => {
            error!(cache = %path.display(), error = %e, "摘要缓存读取失败，按空缓存处理");
            BTreeMap::new()
        }
    }
}

fn file_name_of(path: &Path) -> ImportResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ImportError::FileNotFound(path.display().to_string()))
}

/// 通配模式（`*` / `?`）转锚定正则
fn glob_to_regex(pattern: &str) -> ImportResult<Regex> {
    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr)
        .map_err(|e| ImportError::Configuration(format!("参考文件模式无效 '{}': {}", pattern, e)))
}

/// 流式计算文件 SHA-256（十六进制小写）
pub fn compute_sha256(path: &Path) -> ImportResult<String> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
