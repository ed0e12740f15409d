// ==========================================
// 参考数据导入引擎 - 数据库会话 Trait
// ==========================================
// 职责: 导入核心消费的数据库会话接口（不包含实现）
// 红线: 单写者，运行期内独占；不做内部加锁
// ==========================================

use crate::domain::FieldValue;
use crate::repository::error::RepositoryResult;

/// 命名绑定参数（`:name` → 值）
pub type NamedParams<'a> = [(&'a str, &'a FieldValue)];

// ==========================================
// SqlDialect - upsert 语法方言
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    /// `ON DUPLICATE KEY UPDATE col = VALUES(col)`
    MySql,
    /// `ON CONFLICT DO UPDATE SET col = excluded.col`（不指定冲突列，任一主键/唯一约束均触发）
    Sqlite,
}

impl SqlDialect {
    /// 生成 "插入，冲突时覆盖非主键列" 语句
    ///
    /// # 参数
    /// - table: 已校验表名
    /// - columns: 已校验列名（按绑定顺序）
    pub fn upsert_sql(&self, table: &str, columns: &[&str]) -> String {
        let column_list = columns.join(", ");
        let placeholders = columns
            .iter()
            .map(|c| format!(":{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let update_columns: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|c| !crate::domain::record::KEY_COLUMNS.contains(c))
            .collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table, column_list, placeholders
        );

        match self {
            SqlDialect::MySql => {
                if !update_columns.is_empty() {
                    let updates = update_columns
                        .iter()
                        .map(|c| format!("{} = VALUES({})", c, c))
                        .collect::<Vec<_>>()
                        .join(", ");
                    sql.push_str(" ON DUPLICATE KEY UPDATE ");
                    sql.push_str(&updates);
                }
            }
            SqlDialect::Sqlite => {
                // 与 ON DUPLICATE KEY 一致，冲突目标留空（SQLite >= 3.35）
                if update_columns.is_empty() {
                    sql.push_str(" ON CONFLICT DO NOTHING");
                } else {
                    let updates = update_columns
                        .iter()
                        .map(|c| format!("{} = excluded.{}", c, c))
                        .collect::<Vec<_>>()
                        .join(", ");
                    sql.push_str(" ON CONFLICT DO UPDATE SET ");
                    sql.push_str(&updates);
                }
            }
        }

        sql
    }
}

// ==========================================
// DbSession Trait
// ==========================================
// 实现者: SqliteSession
// 事务边界由调用方（ReferenceImporter）按文件控制
pub trait DbSession {
    /// 当前会话使用的 SQL 方言
    fn dialect(&self) -> SqlDialect;

    /// 执行查询，返回首行首列（无结果返回 None）
    fn query_scalar(
        &mut self,
        sql: &str,
        params: &NamedParams<'_>,
    ) -> RepositoryResult<Option<FieldValue>>;

    /// 执行写语句，返回影响行数
    fn execute(&mut self, sql: &str, params: &NamedParams<'_>) -> RepositoryResult<usize>;

    /// 开启事务
    fn begin(&mut self) -> RepositoryResult<()>;

    /// 提交当前事务
    fn commit(&mut self) -> RepositoryResult<()>;

    /// 回滚当前事务（无活动事务时为空操作）
    fn rollback(&mut self) -> RepositoryResult<()>;

    /// 将已执行语句推送到数据库
    fn flush(&mut self) -> RepositoryResult<()>;

    /// 是否处于活动事务中
    fn in_transaction(&self) -> bool;
}
