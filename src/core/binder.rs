//! 模板绑定模块
//!
//! 将抽取出的参数值合并进规则的查询模板。模板文本原样输出，
//! 占位符保持 :name 标记，值只经由执行器的参数绑定设施传递，
//! 用户可控内容永远不会拼接进SQL文本。

use crate::core::models::{BoundStatement, CompiledRule, ParamValue};
use crate::error::EngineError;
use std::collections::{BTreeMap, BTreeSet};

/// 扫描模板中的 :name 占位符名集合
///
/// 占位符语法：冒号后跟 [A-Za-z_][A-Za-z0-9_]*。
/// 模板来自规则作者（受信数据），不处理字符串字面量内的冒号。
pub fn scan_placeholders(template: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b':' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() {
                let c = bytes[end];
                let is_ident = c.is_ascii_alphanumeric() || c == b'_';
                let is_head_ok = end > start || c.is_ascii_alphabetic() || c == b'_';
                if is_ident && is_head_ok {
                    end += 1;
                } else {
                    break;
                }
            }
            if end > start {
                names.insert(template[start..end].to_string());
            }
            i = end;
        } else {
            i += 1;
        }
    }

    names
}

/// 绑定参数到模板
///
/// 必填参数缺失在此处是编程错误（调用方必须已经短路为缺参响应），
/// 返回 MissingRequiredParameter 拒绝绑定。缺席的可选参数绑定为
/// None（执行时为SQL NULL），模板以 `(:p IS NULL OR col = :p)` 形式
/// 将其退化为恒真过滤，绝不会变成空字符串等值过滤。
pub fn bind(
    rule: &CompiledRule,
    values: &BTreeMap<String, ParamValue>,
) -> Result<BoundStatement, EngineError> {
    let mut missing = Vec::new();
    for spec in &rule.rule.parameters {
        if spec.required && !values.contains_key(&spec.name) {
            missing.push(spec.name.clone());
        }
    }
    if !missing.is_empty() {
        return Err(EngineError::MissingRequiredParameter(missing));
    }

    let params = rule
        .rule
        .parameters
        .iter()
        .map(|spec| (spec.name.clone(), values.get(&spec.name).cloned()))
        .collect();

    Ok(BoundStatement {
        sql: rule.rule.template.clone(),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::compile_rule;
    use crate::core::models::{ExtractionHint, ParamKind, ParamSpec, Rule, RuleStatus};
    use std::collections::BTreeMap;

    fn test_rule(required_b: bool) -> CompiledRule {
        let rule = Rule {
            id: 1,
            name: "测试规则".to_string(),
            description: String::new(),
            trigger_words: vec!["库存".to_string()],
            synonyms: BTreeMap::new(),
            parameters: vec![
                ParamSpec {
                    name: "a".to_string(),
                    kind: ParamKind::Enum,
                    required: true,
                    hint: ExtractionHint {
                        values: vec!["深圳".to_string()],
                        ..Default::default()
                    },
                },
                ParamSpec {
                    name: "b".to_string(),
                    kind: ParamKind::Text,
                    required: required_b,
                    hint: ExtractionHint {
                        anchors: vec!["供应商".to_string()],
                        ..Default::default()
                    },
                },
            ],
            template: "SELECT * FROM t WHERE a = :a AND (:b IS NULL OR b = :b)".to_string(),
            priority: 50,
            status: RuleStatus::Active,
            category: String::new(),
            row_cap: None,
        };
        compile_rule(rule).unwrap()
    }

    #[test]
    fn test_scan_placeholders() {
        let names = scan_placeholders("SELECT * FROM t WHERE a = :a AND (:b IS NULL OR b = :b)");
        assert_eq!(
            names,
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_scan_ignores_bare_colon() {
        let names = scan_placeholders("SELECT ':' || :name FROM t WHERE x = ': '");
        assert_eq!(names, BTreeSet::from(["name".to_string()]));
    }

    #[test]
    fn test_bind_two_values_produces_two_params() {
        let rule = test_rule(true);
        let values = BTreeMap::from([
            ("a".to_string(), ParamValue::Text("深圳".to_string())),
            ("b".to_string(), ParamValue::Text("天马".to_string())),
        ]);

        let stmt = bind(&rule, &values).unwrap();
        assert_eq!(stmt.params.len(), 2);
        assert_eq!(stmt.params[0].0, "a");
        assert_eq!(stmt.params[1].0, "b");
        assert!(stmt.params.iter().all(|(_, v)| v.is_some()));
        // 模板文本不含任何抽取值
        assert!(!stmt.sql.contains("深圳"));
        assert!(!stmt.sql.contains("天马"));
    }

    #[test]
    fn test_bind_rejects_missing_required() {
        let rule = test_rule(true);
        let values = BTreeMap::from([("a".to_string(), ParamValue::Text("深圳".to_string()))]);

        let err = bind(&rule, &values).unwrap_err();
        match err {
            EngineError::MissingRequiredParameter(names) => {
                assert_eq!(names, vec!["b".to_string()]);
            }
            other => panic!("意外错误类型: {:?}", other),
        }
    }

    #[test]
    fn test_bind_absent_optional_becomes_null() {
        let rule = test_rule(false);
        let values = BTreeMap::from([("a".to_string(), ParamValue::Text("深圳".to_string()))]);

        let stmt = bind(&rule, &values).unwrap();
        // 绑定值数量恒等于声明的参数数量，可选缺席占位为 None
        assert_eq!(stmt.params.len(), 2);
        assert!(stmt.params[0].1.is_some());
        assert!(stmt.params[1].1.is_none());
    }
}
