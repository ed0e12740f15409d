// ==========================================
// 参考数据导入引擎 - 单文件校验
// ==========================================
// 职责: 文件大小上限 + 扩展名与内容类型一致性（文件头嗅探）
// 嗅探规则:
// - .zip  → 本地文件头 PK\x03\x04（或空包 PK\x05\x06）
// - .xml  → 去除 BOM/空白后以 '<' 开头
// - .json → 去除 BOM/空白后以 '{' 或 '[' 开头
// 其他扩展名只校验大小
// ==========================================

use crate::domain::SecurityPolicy;
use crate::importer::error::{ImportError, ImportResult, ValidationReason};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// 嗅探读取的字节数
const SNIFF_LEN: u64 = 512;

const MIME_ZIP: &str = "application/zip";
const MIME_XML: &str = "application/xml";
const MIME_JSON: &str = "application/json";

pub struct FileValidator;

impl FileValidator {
    /// 校验单个文件
    pub fn validate_file(path: &Path, policy: &SecurityPolicy) -> ImportResult<()> {
        let label = path.display().to_string();
        let metadata = fs::metadata(path).map_err(|_| ImportError::FileNotFound(label.clone()))?;

        let size = metadata.len();
        if size > policy.max_file_size {
            return Err(ImportError::validation(
                label,
                ValidationReason::FileTooLarge {
                    size,
                    max: policy.max_file_size,
                },
            ));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let expected = match ext.as_str() {
            "zip" => MIME_ZIP,
            "xml" => MIME_XML,
            "json" => MIME_JSON,
            _ => {
                debug!(file = %label, size, "文件校验通过（仅大小）");
                return Ok(());
            }
        };

        let mut head = Vec::with_capacity(SNIFF_LEN as usize);
        fs::File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;
        let detected = sniff_content_type(&head);
        if detected != expected {
            return Err(ImportError::validation(
                label,
                ValidationReason::ContentTypeMismatch {
                    expected: expected.to_string(),
                    detected: detected.to_string(),
                },
            ));
        }

        debug!(file = %label, size, content_type = detected, "文件校验通过");
        Ok(())
    }
}

/// 根据文件头判断内容类型
pub fn sniff_content_type(head: &[u8]) -> &'static str {
    if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        return MIME_ZIP;
    }
    if head.is_empty() {
        return "inode/x-empty";
    }

    let text = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    match text.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'<') => MIME_XML,
        Some(b'{') | Some(b'[') => MIME_JSON,
        Some(_) if std::str::from_utf8(text).is_ok() => "text/plain",
        Some(_) => "application/octet-stream",
        None => "text/plain",
    }
}
