//! 端到端场景测试
//!
//! 用内存SQLite同时充当规则来源与查询执行器，覆盖从自然语言
//! 问题到响应信封的完整链路。

use crate::core::engine::{AnswerOptions, QueryEngine};
use crate::core::executor::CancelToken;
use crate::core::models::{MatchOutcome, ParamValue};
use crate::storage::database::SqliteStore;
use std::sync::Arc;

fn engine_with_fixture() -> (QueryEngine, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .execute_batch(
            r#"
            CREATE TABLE inventory (
                factory TEXT NOT NULL,
                supplier TEXT NOT NULL,
                material TEXT NOT NULL,
                qty INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            INSERT INTO inventory VALUES
                ('深圳', '天马', '液晶面板', 120, '2024-03-01'),
                ('深圳', '京东方', '背光模组', 80, '2024-03-02'),
                ('重庆', '天马', '液晶面板', 60, '2024-03-03'),
                ('南昌', '华星', '偏光片', 200, '2024-03-04');
            "#,
        )
        .unwrap();
    store.seed_default_rules().unwrap();

    let engine = QueryEngine::new(
        store.clone(),
        store.clone(),
        crate::core::executor::ExecOptions::default(),
    )
    .unwrap();
    (engine, store)
}

#[test]
fn test_scenario_factory_inventory_query() {
    let (engine, _store) = engine_with_fixture();
    let envelope = engine.answer(
        "查询深圳工厂库存",
        &AnswerOptions::default(),
        &CancelToken::new(),
    );

    assert!(envelope.matched);
    assert_eq!(envelope.rule_name.as_deref(), Some("工厂库存查询"));
    assert_eq!(envelope.row_count, 2);
    assert!(!envelope.truncated);
    assert!(envelope.error_kind.is_none());
    assert!(envelope
        .rows
        .iter()
        .all(|row| row.get("factory") == Some(&serde_json::json!("深圳"))));
}

#[test]
fn test_scenario_no_trigger_match() {
    let (engine, _store) = engine_with_fixture();
    let envelope = engine.answer("随便问问", &AnswerOptions::default(), &CancelToken::new());

    assert!(!envelope.matched);
    assert_eq!(envelope.error_kind.as_deref(), Some("NoMatch"));
    assert_eq!(envelope.row_count, 0);
}

#[test]
fn test_scenario_missing_required_supplier() {
    let (engine, _store) = engine_with_fixture();
    // 命中供应商规则，但查询里没有任何词典内的供应商名
    let envelope = engine.answer(
        "供应商的库存如何",
        &AnswerOptions::default(),
        &CancelToken::new(),
    );

    assert!(envelope.matched);
    assert_eq!(envelope.error_kind.as_deref(), Some("MissingParameter"));
    assert_eq!(envelope.missing_parameters, vec!["supplier".to_string()]);
    assert_eq!(envelope.row_count, 0);
}

#[test]
fn test_scenario_supplier_query_executes() {
    let (engine, _store) = engine_with_fixture();
    let envelope = engine.answer(
        "查询天马供应商库存",
        &AnswerOptions::default(),
        &CancelToken::new(),
    );

    assert!(envelope.matched);
    assert_eq!(envelope.rule_name.as_deref(), Some("供应商库存查询"));
    assert_eq!(envelope.row_count, 2);
    assert!(envelope
        .rows
        .iter()
        .all(|row| row.get("supplier") == Some(&serde_json::json!("天马"))));
}

#[test]
fn test_scenario_refresh_does_not_affect_held_snapshot() {
    let (engine, store) = engine_with_fixture();

    // 慢请求在刷新前获取快照
    let before = engine.snapshot();

    // 刷新期间规则1被删除
    store.delete_rule(1).unwrap();
    let stats = engine.refresh_catalog().unwrap();
    assert_eq!(stats.active, 2);

    // 持有旧快照的请求仍按原目录解析
    let outcome = engine.resolve_on("查询深圳工厂库存", &before, &CancelToken::new());
    match outcome {
        MatchOutcome::Matched(m) => assert_eq!(m.rule.rule.name, "工厂库存查询"),
        other => panic!("旧快照上应命中工厂规则: {:?}", other),
    }

    // 新快照上工厂规则已不存在，回落到库存总览
    let outcome = engine.resolve("查询深圳工厂库存", &CancelToken::new());
    match outcome {
        MatchOutcome::Matched(m) => assert_eq!(m.rule.rule.name, "库存总览"),
        other => panic!("新快照上应回落到总览规则: {:?}", other),
    }
}

#[test]
fn test_resolve_is_idempotent_on_same_snapshot() {
    let (engine, _store) = engine_with_fixture();
    let snapshot = engine.snapshot();

    let first = engine.resolve_on("查询深圳工厂库存", &snapshot, &CancelToken::new());
    let second = engine.resolve_on("查询深圳工厂库存", &snapshot, &CancelToken::new());

    match (first, second) {
        (MatchOutcome::Matched(a), MatchOutcome::Matched(b)) => {
            assert_eq!(a.rule.rule.id, b.rule.rule.id);
            assert_eq!(a.score, b.score);
            assert_eq!(a.values, b.values);
            assert_eq!(a.missing_required, b.missing_required);
        }
        other => panic!("两次解析结果不一致: {:?}", other),
    }
}

#[test]
fn test_optional_factory_falls_back_to_overview() {
    let (engine, _store) = engine_with_fixture();
    // 只有"库存"触发词命中，可选factory未出现 -> 无过滤汇总
    let envelope = engine.answer("库存情况", &AnswerOptions::default(), &CancelToken::new());

    assert!(envelope.matched);
    assert_eq!(envelope.rule_name.as_deref(), Some("库存总览"));
    // 三个工厂都在汇总里，可选参数缺席绝不等于空串过滤
    assert_eq!(envelope.row_count, 3);
}

#[test]
fn test_empty_query_short_circuits() {
    let (engine, _store) = engine_with_fixture();
    let envelope = engine.answer("   ？！", &AnswerOptions::default(), &CancelToken::new());

    assert!(!envelope.matched);
    assert_eq!(envelope.error_kind.as_deref(), Some("NoMatch"));
}

#[test]
fn test_caller_row_cap_override_truncates() {
    let (engine, _store) = engine_with_fixture();
    let opts = AnswerOptions {
        row_cap: Some(1),
        timeout: None,
    };
    let envelope = engine.answer("查询天马供应商库存", &opts, &CancelToken::new());

    assert_eq!(envelope.row_count, 1);
    assert!(envelope.truncated);
}

#[test]
fn test_cancelled_before_resolution() {
    let (engine, _store) = engine_with_fixture();
    let cancel = CancelToken::new();
    cancel.cancel();

    let envelope = engine.answer("查询深圳工厂库存", &AnswerOptions::default(), &cancel);
    assert!(!envelope.matched);
    assert_eq!(envelope.error_kind.as_deref(), Some("Cancelled"));
}

#[test]
fn test_extracted_enum_value_reaches_statement() {
    let (engine, _store) = engine_with_fixture();
    let outcome = engine.resolve("重庆工厂的库存", &CancelToken::new());

    match outcome {
        MatchOutcome::Matched(m) => {
            assert_eq!(
                m.values.get("factory"),
                Some(&ParamValue::Text("重庆".to_string()))
            );
            assert!(m.missing_required.is_empty());
        }
        other => panic!("应命中工厂规则: {:?}", other),
    }
}
