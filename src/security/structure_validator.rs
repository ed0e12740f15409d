// ==========================================
// 参考数据导入引擎 - 结构限制校验
// ==========================================
// 职责: JSON 嵌套深度 / 数组长度、XML 嵌套深度
// 实现: 显式栈迭代，不使用递归（对抗性深嵌套输入不会耗尽调用栈）
// 深度约定: 根值深度为 1，每进入一层容器 +1（叶子值计入所在层）
// ==========================================

use crate::importer::error::ValidationReason;
use serde_json::Value;

/// 校验 JSON 结构限制
pub fn validate_json_structure(
    root: &Value,
    max_depth: usize,
    max_array_length: usize,
) -> Result<(), ValidationReason> {
    let mut stack: Vec<(&Value, usize)> = vec![(root, 1)];

    while let Some((value, depth)) = stack.pop() {
        if depth > max_depth {
            return Err(ValidationReason::NestingTooDeep {
                depth,
                max: max_depth,
            });
        }
        match value {
            Value::Array(items) => {
                if items.len() > max_array_length {
                    return Err(ValidationReason::ArrayTooLong {
                        length: items.len(),
                        max: max_array_length,
                    });
                }
                stack.extend(items.iter().map(|item| (item, depth + 1)));
            }
            Value::Object(map) => {
                stack.extend(map.values().map(|item| (item, depth + 1)));
            }
            _ => {}
        }
    }

    Ok(())
}

/// XML 元素深度检查（树构建器每打开一个元素调用一次）
pub fn check_xml_depth(depth: usize, max_depth: usize) -> Result<(), ValidationReason> {
    if depth > max_depth {
        return Err(ValidationReason::NestingTooDeep {
            depth,
            max: max_depth,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested_arrays(levels: usize) -> Value {
        let mut value = json!(1);
        for _ in 0..levels {
            value = Value::Array(vec![value]);
        }
        value
    }

    #[test]
    fn test_flat_document_passes() {
        let doc = json!([{"code": "AT", "name": "Austria"}, {"code": "DE"}]);
        assert!(validate_json_structure(&doc, 50, 10_000).is_ok());
    }

    #[test]
    fn test_depth_limit() {
        // 3 层数组 + 叶子 = 深度 4
        let doc = nested_arrays(3);
        assert!(validate_json_structure(&doc, 4, 10).is_ok());
        assert_eq!(
            validate_json_structure(&doc, 3, 10),
            Err(ValidationReason::NestingTooDeep { depth: 4, max: 3 })
        );
    }

    #[test]
    fn test_nested_array_length_limit() {
        let doc = json!({"items": {"inner": [1, 2, 3, 4]}});
        assert_eq!(
            validate_json_structure(&doc, 50, 3),
            Err(ValidationReason::ArrayTooLong { length: 4, max: 3 })
        );
    }

    #[test]
    fn test_xml_depth_check() {
        assert!(check_xml_depth(100, 100).is_ok());
        assert!(check_xml_depth(101, 100).is_err());
    }
}
