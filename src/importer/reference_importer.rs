// ==========================================
// 参考数据导入引擎 - 参考数据导入器（编排）
// ==========================================
// 流程: 按配置顺序逐文件 → 变更跟踪判定 → 解析 → 逐条 upsert → 提交
// 事务: 以"单个文件"为原子单位；第 N 个文件失败时，1..N-1 已提交，
//       当前文件回滚后错误上抛，剩余文件不再处理
// 顺序: 只按配置的 reference_order 处理（被引用的表先导入），不枚举目录
// ==========================================

use crate::config::ImportConfigProvider;
use crate::domain::{ExtractedRecord, ImportMapping};
use crate::importer::change_tracker::ChangeTracker;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::lookup_resolver::LookupResolver;
use crate::repository::{DbSession, RecordUpserter, UpsertOutcome};
use crate::security::{ArchiveValidator, FileValidator};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// 进度日志间隔（条）
const PROGRESS_INTERVAL: usize = 100;

/// 解压子目录名
const EXTRACTED_DIR: &str = "extracted";

/// 一次导入的文件处理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub processed_files: Vec<String>,
    pub skipped_files: Vec<String>,
}

// ==========================================
// ReferenceImporter
// ==========================================
pub struct ReferenceImporter<C>
where
    C: ImportConfigProvider,
{
    // 配置读取器
    config: C,

    // 导入组件
    resolver: LookupResolver,
    upserter: RecordUpserter,

    // 变更跟踪缓存路径（None 表示不跟踪）
    hash_cache: Option<PathBuf>,
    force: bool,
}

impl<C> ReferenceImporter<C>
where
    C: ImportConfigProvider,
{
    pub fn new(config: C) -> Self {
        Self {
            config,
            resolver: LookupResolver::new(),
            upserter: RecordUpserter::new(),
            hash_cache: None,
            force: false,
        }
    }

    /// 启用参考文件变更跟踪
    pub fn with_change_tracking(mut self, cache_path: impl Into<PathBuf>) -> Self {
        self.hash_cache = Some(cache_path.into());
        self
    }

    /// 强制模式: 忽略变更跟踪，全部重新导入
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// 清空外键缓存
    pub fn clear_lookup_cache(&mut self) {
        self.resolver.clear_cache();
    }

    /// 处理解压目录中的全部参考文件
    ///
    /// # 参数
    /// - extracted_dir: 解压目录
    /// - import_type: 导入类型
    /// - session: 数据库会话（调用方独占）
    ///
    /// # 返回
    /// - Ok(ProcessOutcome): 已处理 / 已跳过（缺失或未变更）的文件名
    /// - Err: 配置错误、解析错误或持久化错误（当前文件已回滚）
    #[instrument(skip(self, extracted_dir, session), fields(dir = %extracted_dir.display()))]
    pub fn process_all(
        &mut self,
        extracted_dir: &Path,
        import_type: &str,
        session: &mut dyn DbSession,
    ) -> ImportResult<ProcessOutcome> {
        let start_time = Instant::now();
        self.resolver.clear_cache();

        let order = self.config.reference_order(import_type)?;
        let parser = UniversalFileParser::new(self.config.security_policy(import_type)?);
        let mut tracker = match &self.hash_cache {
            Some(cache) => Some(ChangeTracker::new(
                cache.clone(),
                &self.config.reference_patterns(import_type)?,
            )?),
            None => None,
        };

        info!(import_type = %import_type, files = order.len(), force = self.force, "开始导入参考数据");
        let mut outcome = ProcessOutcome::default();

        for file_name in order {
            let path = extracted_dir.join(&file_name);
            if !path.is_file() {
                warn!(file = %file_name, path = %path.display(), "文件不存在，跳过");
                outcome.skipped_files.push(file_name);
                continue;
            }

            if let (Some(tracker), false) = (tracker.as_ref(), self.force) {
                if !tracker.needs_processing(&path)? {
                    info!(file = %file_name, "参考文件未变更，跳过");
                    outcome.skipped_files.push(file_name);
                    continue;
                }
            }

            let mapping = self.config.file_mapping(import_type, &file_name)?;
            let written = self.process_file_in_transaction(&path, &mapping, &parser, session)?;
            info!(file = %file_name, records = written, "文件导入完成");

            if let Some(tracker) = tracker.as_mut() {
                // 数据已提交，摘要写入失败只影响下次是否重复导入
                if let Err(e) = tracker.mark_processed(&path) {
                    error!(file = %file_name, error = %e, "记录文件摘要失败");
                }
            }
            outcome.processed_files.push(file_name);
        }

        info!(
            import_type = %import_type,
            processed = outcome.processed_files.len(),
            skipped = outcome.skipped_files.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "参考数据导入结束"
        );
        Ok(outcome)
    }

    /// 校验附件压缩包、解压到 work_dir/extracted 并导入
    #[instrument(skip(self, archive_path, work_dir, session), fields(archive = %archive_path.display()))]
    pub fn import_archive(
        &mut self,
        archive_path: &Path,
        work_dir: &Path,
        import_type: &str,
        session: &mut dyn DbSession,
    ) -> ImportResult<ProcessOutcome> {
        let policy = self.config.security_policy(import_type)?;
        FileValidator::validate_file(archive_path, &policy)?;

        let extract_dir = work_dir.join(EXTRACTED_DIR);
        let files = ArchiveValidator::validate_and_extract(archive_path, &extract_dir, &policy)?;
        debug!(files = files.len(), dir = %extract_dir.display(), "附件已解压");

        self.process_all(&extract_dir, import_type, session)
    }

    // 单文件事务: begin → 解析 → upsert → commit；任何失败先回滚再上抛
    fn process_file_in_transaction(
        &mut self,
        path: &Path,
        mapping: &ImportMapping,
        parser: &UniversalFileParser,
        session: &mut dyn DbSession,
    ) -> ImportResult<usize> {
        session.begin()?;

        let result = self
            .load_file(path, mapping, parser, session)
            .and_then(|written| {
                session.commit()?;
                Ok(written)
            });

        if let Err(e) = &result {
            error!(file = %path.display(), error = %e, "文件导入失败，回滚当前事务");
            if let Err(rollback_err) = session.rollback() {
                error!(error = %rollback_err, "事务回滚失败");
            }
        }
        result
    }

    fn load_file(
        &mut self,
        path: &Path,
        mapping: &ImportMapping,
        parser: &UniversalFileParser,
        session: &mut dyn DbSession,
    ) -> ImportResult<usize> {
        let records = {
            let mut mapper = FieldMapper::new(&mut self.resolver, &mut *session);
            parser.parse(path, mapping, &mut mapper)?
        };

        let mut written: BTreeMap<&str, usize> = BTreeMap::new();
        let mut skipped = 0usize;
        for record in &records {
            match self.persist(session, record)? {
                UpsertOutcome::Written => {
                    let count = written.entry(record.table.as_str()).or_insert(0);
                    *count += 1;
                    if *count % PROGRESS_INTERVAL == 0 {
                        info!(table = %record.table, records = *count, "导入进度");
                    }
                }
                UpsertOutcome::SkippedNoKey => skipped += 1,
            }
        }

        for (table, count) in &written {
            info!(table = %table, total = count, "表记录写入完成");
        }
        if skipped > 0 {
            warn!(file = %path.display(), skipped, "记录缺少 id/code，未写入");
        }
        Ok(written.values().sum())
    }

    fn persist(
        &self,
        session: &mut dyn DbSession,
        record: &ExtractedRecord,
    ) -> ImportResult<UpsertOutcome> {
        self.upserter
            .upsert(session, record)
            .map_err(|source| ImportError::Persistence {
                table: record.table.clone(),
                source,
            })
    }
}
