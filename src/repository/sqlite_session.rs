// ==========================================
// 参考数据导入引擎 - SQLite 会话实现
// ==========================================
// 职责: DbSession 的 rusqlite 实现
// 红线: 只做语句执行与事务控制，不含导入规则
// ==========================================

use crate::db::{configure_sqlite_connection, open_sqlite_connection};
use crate::domain::FieldValue;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::session::{DbSession, NamedParams, SqlDialect};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, ToSql};
use tracing::{debug, trace};

// FieldValue → SQLite 存储类型
impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            FieldValue::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            FieldValue::Boolean(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            other => ToSqlOutput::Owned(Value::Text(other.to_sql_text().unwrap_or_default())),
        })
    }
}

fn field_value_from_sql(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Integer(i) => FieldValue::Integer(i),
        Value::Real(f) => FieldValue::Float(f),
        Value::Text(s) => FieldValue::Text(s),
        Value::Blob(b) => FieldValue::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn log_sql(sql: &str) {
    trace!(sql = %sql, "执行 SQL");
}

// ==========================================
// SqliteSession
// ==========================================
pub struct SqliteSession {
    conn: Connection,
    in_tx: bool,
}

impl SqliteSession {
    /// 打开数据库文件并应用统一 PRAGMA
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self { conn, in_tx: false })
    }

    /// 内存数据库（测试/演练用）
    pub fn open_in_memory() -> RepositoryResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// 从已有连接创建会话（幂等地再次应用 PRAGMA）
    pub fn from_connection(conn: Connection) -> RepositoryResult<Self> {
        configure_sqlite_connection(&conn)?;
        Ok(Self { conn, in_tx: false })
    }

    /// 开启 SQL 跟踪（trace 级别日志）
    pub fn enable_sql_trace(&mut self) {
        self.conn.trace(Some(log_sql));
    }

    /// 底层连接（建表/校验用）
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn bind<'a>(params: &'a NamedParams<'a>) -> Vec<(&'a str, &'a dyn ToSql)> {
        params
            .iter()
            .map(|(name, value)| (*name, *value as &dyn ToSql))
            .collect()
    }
}

impl DbSession for SqliteSession {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn query_scalar(
        &mut self,
        sql: &str,
        params: &NamedParams<'_>,
    ) -> RepositoryResult<Option<FieldValue>> {
        let bound = Self::bind(params);
        let mut stmt = self.conn.prepare(sql)?;
        let value: Option<Value> = stmt
            .query_row(bound.as_slice(), |row| row.get::<_, Value>(0))
            .optional()?;

        Ok(value
            .map(field_value_from_sql)
            .filter(|v| !v.is_null()))
    }

    fn execute(&mut self, sql: &str, params: &NamedParams<'_>) -> RepositoryResult<usize> {
        let bound = Self::bind(params);
        let mut stmt = self.conn.prepare(sql)?;
        Ok(stmt.execute(bound.as_slice())?)
    }

    fn begin(&mut self) -> RepositoryResult<()> {
        if self.in_tx {
            return Err(RepositoryError::DatabaseTransactionError(
                "事务已开启，不支持嵌套".to_string(),
            ));
        }
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        self.in_tx = true;
        debug!("事务已开启");
        Ok(())
    }

    fn commit(&mut self) -> RepositoryResult<()> {
        if !self.in_tx {
            return Err(RepositoryError::DatabaseTransactionError(
                "无活动事务可提交".to_string(),
            ));
        }
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        self.in_tx = false;
        debug!("事务已提交");
        Ok(())
    }

    fn rollback(&mut self) -> RepositoryResult<()> {
        if !self.in_tx {
            return Ok(());
        }
        // 无论 ROLLBACK 成败，会话都回到无事务状态
        self.in_tx = false;
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        debug!("事务已回滚");
        Ok(())
    }

    fn flush(&mut self) -> RepositoryResult<()> {
        // rusqlite 语句即时执行，无缓冲
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> SqliteSession {
        let session = SqliteSession::open_in_memory().unwrap();
        session
            .connection()
            .execute_batch("CREATE TABLE region (id INTEGER PRIMARY KEY, code TEXT UNIQUE)")
            .unwrap();
        session
    }

    #[test]
    fn test_query_scalar_found_and_missing() {
        let mut session = setup();
        let code = FieldValue::Text("EU".to_string());
        session
            .execute(
                "INSERT INTO region (id, code) VALUES (:id, :code)",
                &[(":id", &FieldValue::Integer(3)), (":code", &code)],
            )
            .unwrap();

        let found = session
            .query_scalar("SELECT id FROM region WHERE code = :value", &[(":value", &code)])
            .unwrap();
        assert_eq!(found, Some(FieldValue::Integer(3)));

        let missing = FieldValue::Text("XX".to_string());
        let found = session
            .query_scalar("SELECT id FROM region WHERE code = :value", &[(":value", &missing)])
            .unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut session = setup();
        session.begin().unwrap();
        session
            .execute(
                "INSERT INTO region (id, code) VALUES (:id, :code)",
                &[
                    (":id", &FieldValue::Integer(1)),
                    (":code", &FieldValue::Text("AS".to_string())),
                ],
            )
            .unwrap();
        session.rollback().unwrap();
        assert!(!session.in_transaction());

        let count: i64 = session
            .connection()
            .query_row("SELECT COUNT(*) FROM region", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_nested_begin_rejected_and_rollback_without_tx_is_noop() {
        let mut session = setup();
        assert!(session.rollback().is_ok());
        session.begin().unwrap();
        assert!(session.begin().is_err());
        session.commit().unwrap();
        assert!(session.commit().is_err());
    }

    #[test]
    fn test_unique_violation_is_classified() {
        let mut session = setup();
        let code = FieldValue::Text("EU".to_string());
        let insert = "INSERT INTO region (id, code) VALUES (:id, :code)";
        session
            .execute(insert, &[(":id", &FieldValue::Integer(1)), (":code", &code)])
            .unwrap();
        let err = session
            .execute(insert, &[(":id", &FieldValue::Integer(2)), (":code", &code)])
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }
}
