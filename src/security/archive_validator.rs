// ==========================================
// 参考数据导入引擎 - 压缩包安全校验与解压
// ==========================================
// 流程: 先校验、后解压（任何字节写盘前完成全部清单校验）
// 校验顺序（快速失败）:
// 1. 条目数 ≤ max_files
// 2. 压缩比 = 解压总大小 / 压缩包磁盘大小 ≤ max_compression_ratio（大小为 0 直接失败）
// 3. 每个条目解压大小 ≤ max_entry_size
// 4. 条目路径非绝对路径、不含 `..`
// 5. 条目扩展名在白名单内（目录条目除外）
// 解压阶段: 每个条目按 max_entry_size 截断读取（不信任头部声明的大小），
//           写出后再做单文件校验；任何失败都会删除本次已写出的文件与目录
// ==========================================

use crate::domain::{ArchiveEntry, ArchiveManifest, SecurityPolicy};
use crate::importer::error::{ImportError, ImportResult, ValidationReason};
use crate::security::file_validator::FileValidator;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

pub struct ArchiveValidator;

impl ArchiveValidator {
    /// 校验压缩包并解压到目标目录
    ///
    /// # 返回
    /// - Ok(paths): 已解压并通过单文件校验的文件路径（不含目录）
    /// - Err(Validation): 违反安全策略；目标目录中不残留本次写出的任何文件
    pub fn validate_and_extract(
        archive_path: &Path,
        dest_dir: &Path,
        policy: &SecurityPolicy,
    ) -> ImportResult<Vec<PathBuf>> {
        let manifest = Self::inspect(archive_path, policy)?;

        let mut written = ExtractionLog::default();
        match Self::extract(archive_path, dest_dir, &manifest, policy, &mut written) {
            Ok(files) => {
                info!(
                    archive = %archive_path.display(),
                    files = files.len(),
                    dest = %dest_dir.display(),
                    "压缩包解压完成"
                );
                Ok(files)
            }
            Err(e) => {
                warn!(archive = %archive_path.display(), error = %e, "解压失败，清理已写出文件");
                written.rollback();
                Err(e)
            }
        }
    }

    /// 只做清单校验（不写盘）
    pub fn inspect(archive_path: &Path, policy: &SecurityPolicy) -> ImportResult<ArchiveManifest> {
        let label = archive_path.display().to_string();
        let compressed_size = fs::metadata(archive_path)
            .map_err(|_| ImportError::FileNotFound(label.clone()))?
            .len();
        if compressed_size == 0 {
            return Err(ImportError::validation(label, ValidationReason::EmptyArchive));
        }

        let mut archive = ZipArchive::new(fs::File::open(archive_path)?)?;

        // 1. 条目数
        let count = archive.len();
        if count > policy.max_files {
            return Err(ImportError::validation(
                label,
                ValidationReason::TooManyFiles {
                    count,
                    max: policy.max_files,
                },
            ));
        }

        let mut manifest = ArchiveManifest::default();
        for index in 0..count {
            let entry = archive.by_index_raw(index)?;
            manifest.entries.push(ArchiveEntry {
                relative_path: entry.name().to_string(),
                compressed_size: entry.compressed_size(),
                uncompressed_size: entry.size(),
                is_dir: entry.is_dir(),
            });
        }

        // 2. 压缩比
        let uncompressed = manifest.total_uncompressed();
        let ratio = uncompressed as f64 / compressed_size as f64;
        info!(
            archive = %label,
            compressed_size,
            uncompressed_size = uncompressed,
            ratio = %format!("{:.2}", ratio),
            entries = count,
            "压缩包统计"
        );
        if ratio > policy.max_compression_ratio {
            return Err(ImportError::validation(
                label,
                ValidationReason::CompressionRatio {
                    ratio,
                    max: policy.max_compression_ratio,
                },
            ));
        }

        // 3. 条目大小
        if let Some(entry) = manifest
            .entries
            .iter()
            .find(|e| e.uncompressed_size > policy.max_entry_size)
        {
            return Err(ImportError::validation(
                entry.relative_path.clone(),
                ValidationReason::EntryTooLarge {
                    size: entry.uncompressed_size,
                    max: policy.max_entry_size,
                },
            ));
        }

        // 4. 路径穿越
        if let Some(entry) = manifest
            .entries
            .iter()
            .find(|e| is_unsafe_path(&e.relative_path))
        {
            return Err(ImportError::validation(
                entry.relative_path.clone(),
                ValidationReason::PathTraversal,
            ));
        }

        // 5. 扩展名白名单
        if let Some(entry) = manifest
            .entries
            .iter()
            .find(|e| !e.is_dir && !policy.allows_extension(&e.relative_path))
        {
            return Err(ImportError::validation(
                entry.relative_path.clone(),
                ValidationReason::ExtensionNotAllowed,
            ));
        }

        Ok(manifest)
    }

    fn extract(
        archive_path: &Path,
        dest_dir: &Path,
        manifest: &ArchiveManifest,
        policy: &SecurityPolicy,
        written: &mut ExtractionLog,
    ) -> ImportResult<Vec<PathBuf>> {
        written.create_dir_all(dest_dir)?;
        let mut archive = ZipArchive::new(fs::File::open(archive_path)?)?;
        let mut extracted = Vec::new();

        for (index, expected) in manifest.entries.iter().enumerate() {
            let entry = archive.by_index(index)?;
            let relative = entry
                .enclosed_name()
                .map(Path::to_path_buf)
                .ok_or_else(|| {
                    ImportError::validation(
                        expected.relative_path.clone(),
                        ValidationReason::PathTraversal,
                    )
                })?;
            let target = dest_dir.join(&relative);

            if entry.is_dir() {
                written.create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                written.create_dir_all(parent)?;
            }

            // 只创建新文件，已存在的文件不覆盖，回滚也不会删到它
            let mut out = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
            {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    return Err(ImportError::validation(
                        expected.relative_path.clone(),
                        ValidationReason::TargetExists,
                    ));
                }
                Err(e) => return Err(e.into()),
            };
            written.files.push(target.clone());
            let copied = io::copy(&mut entry.take(policy.max_entry_size + 1), &mut out)?;
            if copied > policy.max_entry_size {
                return Err(ImportError::validation(
                    expected.relative_path.clone(),
                    ValidationReason::EntryTooLarge {
                        size: copied,
                        max: policy.max_entry_size,
                    },
                ));
            }
            drop(out);

            FileValidator::validate_file(&target, policy)?;
            debug!(entry = %expected.relative_path, bytes = copied, "条目已解压");
            extracted.push(target);
        }

        Ok(extracted)
    }
}

/// 条目路径是否不安全（绝对路径 / 盘符 / 含 `..`）
fn is_unsafe_path(name: &str) -> bool {
    if name.starts_with('/') || name.starts_with('\\') {
        return true;
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    name.contains("..")
}

// ==========================================
// ExtractionLog - 本次解压写出的文件与目录
// ==========================================
#[derive(Default)]
struct ExtractionLog {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl ExtractionLog {
    /// 创建目录并记录新建的各级目录
    fn create_dir_all(&mut self, dir: &Path) -> io::Result<()> {
        let mut missing: Vec<PathBuf> = dir
            .ancestors()
            .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
            .map(Path::to_path_buf)
            .collect();
        fs::create_dir_all(dir)?;
        // 由浅到深记录，回滚时逆序删除
        missing.reverse();
        self.dirs.extend(missing);
        Ok(())
    }

    fn rollback(&mut self) {
        for file in self.files.drain(..).rev() {
            if let Err(e) = fs::remove_file(&file) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(file = %file.display(), error = %e, "清理解压文件失败");
                }
            }
        }
        for dir in self.dirs.drain(..).rev() {
            // 只删除空目录
            let _ = fs::remove_dir(&dir);
        }
    }
}
