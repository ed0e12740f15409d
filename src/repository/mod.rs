// ==========================================
// 参考数据导入引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含导入规则
// ==========================================
// 职责: 数据库会话抽象 + 记录落库
// 约束: 所有值使用参数绑定；表名/列名只来自已校验配置
// ==========================================

pub mod error;
pub mod record_upserter;
pub mod session;
pub mod sqlite_session;

// 重导出核心类型
pub use error::{RepositoryError, RepositoryResult};
pub use record_upserter::{RecordUpserter, UpsertOutcome};
pub use session::{DbSession, NamedParams, SqlDialect};
pub use sqlite_session::SqliteSession;
