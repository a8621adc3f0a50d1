//! 问数 (wenshu) - 规则驱动的自然语言查询引擎
//!
//! 把非结构化的自然语言问题（如"深圳工厂的库存情况"）解析为
//! 安全参数化、可执行的关系查询，并返回统一形状的结果集。
//!
//! 核心设计原则：
//! - 规则驱动、完全确定：触发词/同义词重叠打分 + 优先级决胜
//! - 抽取值只经参数绑定进入语句，绝不拼接SQL
//! - 目录快照不可变，刷新旁路重建后原子替换
//! - 匹配歧义、参数缺失、执行失败都可预期地降级

pub mod core;
pub mod error;
pub mod storage;

pub use crate::core::catalog::{CatalogStats, RuleCatalog, RuleSource};
pub use crate::core::engine::{AnswerOptions, QueryEngine};
pub use crate::core::executor::{CancelToken, ExecOptions, ExecutorFailure, QueryExecutor};
pub use crate::core::models::{
    MatchOutcome, ParamKind, ParamSpec, ParamValue, ResponseEnvelope, Rule, RuleStatus,
};
pub use crate::error::EngineError;
pub use crate::storage::config::{AppConfig, ConfigManager};
pub use crate::storage::database::SqliteStore;
