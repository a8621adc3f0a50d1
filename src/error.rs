//! 引擎错误分类
//!
//! 区分"预期内的业务结果"（空查询、未命中、缺参）与"执行失败"
//! （临时性/结构性）。前者以结构化结果返回给调用方，后者按重试
//! 策略处理后再上浮。

use crate::core::models::UnmatchedReason;
use thiserror::Error;

/// 引擎统一错误类型
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// 规范化后查询为空
    #[error("查询内容为空")]
    EmptyQuery,

    /// 没有任何规则的触发词命中
    #[error("未命中任何规则")]
    NoTriggerMatch,

    /// 必填参数未能从查询中抽取
    #[error("缺少必填参数: {0:?}")]
    MissingRequiredParameter(Vec<String>),

    /// 临时性执行失败（连接/超时/锁），可重试一次
    #[error("查询执行临时失败: {0}")]
    Transient(String),

    /// 结构性执行失败（语句本身有问题），不可重试
    #[error("查询语句无法执行: {0}")]
    Structural(String),

    /// 调用方取消或超过截止时间
    #[error("请求已取消")]
    Cancelled,
}

impl EngineError {
    /// 响应信封中的 errorKind 字符串
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::EmptyQuery | EngineError::NoTriggerMatch => "NoMatch",
            EngineError::MissingRequiredParameter(_) => "MissingParameter",
            EngineError::Transient(_) => "Transient",
            EngineError::Structural(_) => "Structural",
            EngineError::Cancelled => "Cancelled",
        }
    }
}

impl From<UnmatchedReason> for EngineError {
    /// 未命中原因归入错误分类，信封的 errorKind 统一经 [`EngineError::kind`] 产生
    fn from(reason: UnmatchedReason) -> Self {
        match reason {
            UnmatchedReason::EmptyQuery => EngineError::EmptyQuery,
            UnmatchedReason::NoTriggerMatch => EngineError::NoTriggerMatch,
            UnmatchedReason::Cancelled => EngineError::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_strings() {
        assert_eq!(EngineError::EmptyQuery.kind(), "NoMatch");
        assert_eq!(EngineError::NoTriggerMatch.kind(), "NoMatch");
        assert_eq!(
            EngineError::MissingRequiredParameter(vec!["supplier".to_string()]).kind(),
            "MissingParameter"
        );
        assert_eq!(EngineError::Transient("busy".to_string()).kind(), "Transient");
        assert_eq!(EngineError::Structural("syntax".to_string()).kind(), "Structural");
        assert_eq!(EngineError::Cancelled.kind(), "Cancelled");
    }

    #[test]
    fn test_unmatched_reason_maps_to_kind() {
        assert_eq!(EngineError::from(UnmatchedReason::EmptyQuery).kind(), "NoMatch");
        assert_eq!(
            EngineError::from(UnmatchedReason::NoTriggerMatch).kind(),
            "NoMatch"
        );
        assert_eq!(
            EngineError::from(UnmatchedReason::Cancelled).kind(),
            "Cancelled"
        );
    }
}
