// ==========================================
// 参考数据导入引擎 - 记录落库（Upsert）
// ==========================================
// 职责: 单条记录 "插入，主键冲突时覆盖非主键列"
// 规则:
// - 缺少 id/code 的记录直接跳过（不写无主键参考数据）
// - NULL 列不参与 INSERT
// - 冲突时后写覆盖（不合并）
// ==========================================

use crate::domain::mapping::is_valid_identifier;
use crate::domain::ExtractedRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::session::DbSession;
use tracing::{debug, trace};

/// 单条记录落库结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Written,
    SkippedNoKey,
}

pub struct RecordUpserter;

impl RecordUpserter {
    pub fn new() -> Self {
        Self
    }

    /// 插入或更新一条记录
    ///
    /// # 返回
    /// - Ok(Written): 已执行 upsert
    /// - Ok(SkippedNoKey): 缺少标识列，未执行任何语句
    /// - Err: 标识符非法或数据库执行失败（调用方负责回滚当前文件事务）
    pub fn upsert(
        &self,
        session: &mut dyn DbSession,
        record: &ExtractedRecord,
    ) -> RepositoryResult<UpsertOutcome> {
        if record.key_column().is_none() {
            debug!(table = %record.table, "记录缺少 id/code，跳过落库");
            return Ok(UpsertOutcome::SkippedNoKey);
        }

        if !is_valid_identifier(&record.table) {
            return Err(RepositoryError::InvalidIdentifier(record.table.clone()));
        }

        let populated: Vec<(&str, _)> = record
            .columns
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(column, value)| (column.as_str(), value))
            .collect();

        if populated.is_empty() {
            return Err(RepositoryError::EmptyRecord(record.table.clone()));
        }
        if let Some((bad, _)) = populated.iter().find(|(c, _)| !is_valid_identifier(c)) {
            return Err(RepositoryError::InvalidIdentifier((*bad).to_string()));
        }

        let columns: Vec<&str> = populated.iter().map(|(c, _)| *c).collect();
        let sql = session.dialect().upsert_sql(&record.table, &columns);

        let param_names: Vec<String> = columns.iter().map(|c| format!(":{}", c)).collect();
        let params: Vec<(&str, _)> = param_names
            .iter()
            .zip(populated.iter())
            .map(|(name, (_, value))| (name.as_str(), *value))
            .collect();

        trace!(table = %record.table, sql = %sql, "执行 upsert");
        session.execute(&sql, &params)?;
        session.flush()?;

        Ok(UpsertOutcome::Written)
    }
}

impl Default for RecordUpserter {
    fn default() -> Self {
        Self::new()
    }
}
