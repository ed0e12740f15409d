// ==========================================
// 参考数据导入引擎 - 外键代码解析器
// ==========================================
// 职责: 人类可读代码 → 已存储的外键值
// 缓存: 按 (表名, 原始值) 缓存，包含未命中结果（负缓存）
// 生命周期: 缓存归属单个解析器实例，不同导入类型之间需显式 clear_cache()
// 失败: 数据库执行失败记录日志并按未命中处理，不写入缓存
// ==========================================

use crate::domain::{FieldValue, LookupSpec};
use crate::repository::DbSession;
use std::collections::HashMap;
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
pub struct LookupResolver {
    cache: HashMap<(String, String), Option<FieldValue>>,
}

impl LookupResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析外键代码
    ///
    /// # 参数
    /// - session: 数据库会话
    /// - lookup: 查询规则（表名来自已校验配置）
    /// - raw_value: 源数据中的代码
    ///
    /// # 返回
    /// - Some(value): 查到的存储值
    /// - None: 未命中或查询失败
    pub fn resolve(
        &mut self,
        session: &mut dyn DbSession,
        lookup: &LookupSpec,
        raw_value: &str,
    ) -> Option<FieldValue> {
        let key = (lookup.table.as_str().to_string(), raw_value.to_string());
        if let Some(cached) = self.cache.get(&key) {
            debug!(table = %lookup.table, value = %raw_value, "外键缓存命中");
            return cached.clone();
        }

        let sql = lookup.render_query();
        let bound = FieldValue::Text(raw_value.to_string());
        match session.query_scalar(&sql, &[(LookupSpec::VALUE_PARAM, &bound)]) {
            Ok(found) => {
                if found.is_none() {
                    warn!(table = %lookup.table, value = %raw_value, "外键代码未找到");
                }
                self.cache.insert(key, found.clone());
                found
            }
            Err(e) => {
                error!(
                    table = %lookup.table,
                    value = %raw_value,
                    error = %e,
                    "外键查询失败"
                );
                None
            }
        }
    }

    /// 清空缓存（导入类型之间调用）
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
