//! 结果整形模块
//!
//! 将行数据与元信息整形为统一的响应信封。纯函数，无状态。

use crate::core::models::{CompiledRule, QueryResult, ResponseEnvelope, UnmatchedReason};
use crate::error::EngineError;
use uuid::Uuid;

fn empty_envelope(request_id: Uuid) -> ResponseEnvelope {
    ResponseEnvelope {
        matched: false,
        rule_id: None,
        rule_name: None,
        row_count: 0,
        truncated: false,
        rows: Vec::new(),
        missing_parameters: Vec::new(),
        error_kind: None,
        request_id,
    }
}

/// 成功结果的信封
pub fn format_success(
    result: QueryResult,
    rule: &CompiledRule,
    request_id: Uuid,
) -> ResponseEnvelope {
    ResponseEnvelope {
        matched: true,
        rule_id: Some(rule.rule.id),
        rule_name: Some(rule.rule.name.clone()),
        row_count: result.row_count,
        truncated: result.truncated,
        rows: result.rows,
        missing_parameters: Vec::new(),
        error_kind: None,
        request_id,
    }
}

/// 未命中的信封（errorKind 取自统一的错误分类）
pub fn format_unmatched(reason: UnmatchedReason, request_id: Uuid) -> ResponseEnvelope {
    ResponseEnvelope {
        error_kind: Some(EngineError::from(reason).kind().to_string()),
        ..empty_envelope(request_id)
    }
}

/// 必填参数缺失的澄清信封（跳过执行）
pub fn format_missing_parameters(
    rule: &CompiledRule,
    missing: Vec<String>,
    request_id: Uuid,
) -> ResponseEnvelope {
    ResponseEnvelope {
        matched: true,
        rule_id: Some(rule.rule.id),
        rule_name: Some(rule.rule.name.clone()),
        missing_parameters: missing,
        error_kind: Some("MissingParameter".to_string()),
        ..empty_envelope(request_id)
    }
}

/// 执行失败的信封（不透明，不携带底层错误文本）
pub fn format_execution_error(
    error: &EngineError,
    rule: &CompiledRule,
    request_id: Uuid,
) -> ResponseEnvelope {
    ResponseEnvelope {
        matched: true,
        rule_id: Some(rule.rule.id),
        rule_name: Some(rule.rule.name.clone()),
        error_kind: Some(error.kind().to_string()),
        ..empty_envelope(request_id)
    }
}
