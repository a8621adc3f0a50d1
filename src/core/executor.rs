//! 执行器模块
//!
//! 经外部查询执行器协作方运行绑定后的语句。
//!
//! 设计原则：
//! - 硬行数上限：达到上限置 truncated 标记，绝不静默丢行
//! - 失败分类：临时性（连接/超时/锁）带退避重试一次；
//!   结构性（语句本身有问题）绝不重试，记日志供规则作者修正，
//!   对最终用户只呈现不透明的失败
//! - 执行前观察取消信号，取消后绝不下发语句

use crate::core::models::{BoundStatement, CompiledRule, ParamValue, QueryResult, Row};
use crate::error::EngineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// 取消令牌：调用方提供的截止时间/手动取消信号
///
/// 从匹配到执行的各阶段边界处观察；克隆共享同一取消状态。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// 创建永不超时的令牌
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带截止时间的令牌
    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// 手动取消
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 是否已取消（手动取消或超过截止时间）
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

/// 执行器协作方的失败分类
#[derive(Debug, Clone, Error)]
pub enum ExecutorFailure {
    /// 临时性失败：连接中断、超时、锁冲突
    #[error("临时性执行失败: {0}")]
    Transient(String),
    /// 结构性失败：语句无法准备或类型不符
    #[error("结构性执行失败: {0}")]
    Structural(String),
}

/// 查询执行器协作方
///
/// 必须支持命名/位置参数绑定（绝不允许字面量替换），且在
/// `max_rows` 之内返回行，不得物化无界结果集。
pub trait QueryExecutor: Send + Sync {
    /// 运行参数化语句
    fn run(
        &self,
        sql: &str,
        params: &[(String, Option<ParamValue>)],
        max_rows: usize,
        timeout: Duration,
    ) -> Result<Vec<Row>, ExecutorFailure>;
}

/// 执行选项
#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    /// 行数上限
    pub row_cap: usize,
    /// 单次执行超时
    pub timeout: Duration,
    /// 临时性失败重试前的退避
    pub retry_backoff: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            row_cap: 20,
            timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// 执行器 - 外部协作方之上的薄封装
pub struct Executor {
    backend: Arc<dyn QueryExecutor>,
}

impl Executor {
    /// 创建执行器
    pub fn new(backend: Arc<dyn QueryExecutor>) -> Self {
        Self { backend }
    }

    /// 执行绑定语句
    ///
    /// 多取一行探测截断：实际请求 row_cap + 1 行，超出则置
    /// truncated 并截到上限。
    pub fn execute(
        &self,
        stmt: &BoundStatement,
        rule: &CompiledRule,
        opts: &ExecOptions,
        cancel: &CancelToken,
    ) -> Result<QueryResult, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let rule_id = rule.rule.id;
        let probe = opts.row_cap.saturating_add(1);

        let mut attempt = self.backend.run(&stmt.sql, &stmt.params, probe, opts.timeout);

        if let Err(ExecutorFailure::Transient(msg)) = &attempt {
            tracing::warn!(rule_id, error = %msg, "临时性执行失败，退避后重试一次");
            std::thread::sleep(opts.retry_backoff);
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            attempt = self.backend.run(&stmt.sql, &stmt.params, probe, opts.timeout);
        }

        match attempt {
            Ok(mut rows) => {
                let truncated = rows.len() > opts.row_cap;
                rows.truncate(opts.row_cap);
                let row_count = rows.len();
                if truncated {
                    tracing::debug!(rule_id, row_cap = opts.row_cap, "结果超过行数上限，已截断");
                }
                Ok(QueryResult {
                    rows,
                    row_count,
                    truncated,
                    rule_id,
                })
            }
            Err(ExecutorFailure::Transient(msg)) => {
                tracing::warn!(rule_id, error = %msg, "重试后仍为临时性失败");
                Err(EngineError::Transient(msg))
            }
            Err(ExecutorFailure::Structural(msg)) => {
                // 记录规则ID与绑定语句，供规则作者修正；对用户不透明
                tracing::error!(rule_id, sql = %stmt.sql, error = %msg, "结构性执行失败，不重试");
                Err(EngineError::Structural(msg))
            }
        }
    }
}
