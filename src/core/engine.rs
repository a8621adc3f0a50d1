//! 查询引擎 - 各组件的编排层
//!
//! 控制流：原始文本 -> 规范化 -> 匹配（查目录快照）-> 参数抽取
//! -> 模板绑定 -> 执行 -> 结果整形 -> 调用方。
//!
//! 并发模型：每个请求独立处理，除目录快照外无共享可变状态；
//! 请求开始时获取一次快照并全程使用，目录刷新旁路重建后原子
//! 替换，进行中的请求不受影响。

use crate::core::binder;
use crate::core::catalog::{CatalogHandle, CatalogStats, RuleCatalog, RuleSource};
use crate::core::executor::{CancelToken, ExecOptions, Executor, QueryExecutor};
use crate::core::extractor;
use crate::core::formatter;
use crate::core::matcher;
use crate::core::models::{
    MatchOutcome, MatchedRule, ResponseEnvelope, UnmatchedReason,
};
use crate::core::normalizer;
use crate::error::EngineError;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 调用方可覆盖的单次请求选项
#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerOptions {
    /// 行数上限覆盖（优先于规则与引擎默认值）
    pub row_cap: Option<usize>,
    /// 执行超时覆盖
    pub timeout: Option<Duration>,
}

/// 查询引擎
pub struct QueryEngine {
    catalog: CatalogHandle,
    rule_source: Arc<dyn RuleSource>,
    executor: Executor,
    defaults: ExecOptions,
}

impl QueryEngine {
    /// 创建引擎并从规则来源构建初始目录快照
    pub fn new(
        rule_source: Arc<dyn RuleSource>,
        query_executor: Arc<dyn QueryExecutor>,
        defaults: ExecOptions,
    ) -> Result<Self> {
        let rules = rule_source.list_active_rules()?;
        let catalog = CatalogHandle::new(RuleCatalog::build(rules));

        Ok(Self {
            catalog,
            rule_source,
            executor: Executor::new(query_executor),
            defaults,
        })
    }

    /// 获取当前目录快照
    pub fn snapshot(&self) -> Arc<RuleCatalog> {
        self.catalog.snapshot()
    }

    /// 从规则来源重建目录并原子替换快照
    ///
    /// 刷新之间串行化；进行中的请求继续使用各自已获取的快照。
    pub fn refresh_catalog(&self) -> Result<CatalogStats> {
        self.catalog.rebuild(|| {
            let rules = self.rule_source.list_active_rules()?;
            Ok(RuleCatalog::build(rules))
        })
    }

    /// 解析：自然语言问题 -> 匹配结果
    ///
    /// 使用调用时刻的目录快照；同一查询对同一快照幂等。
    pub fn resolve(&self, query: &str, cancel: &CancelToken) -> MatchOutcome {
        self.resolve_on(query, &self.snapshot(), cancel)
    }

    /// 在指定快照上解析（慢请求全程使用入口快照）
    pub fn resolve_on(
        &self,
        query: &str,
        catalog: &RuleCatalog,
        cancel: &CancelToken,
    ) -> MatchOutcome {
        if cancel.is_cancelled() {
            return MatchOutcome::Unmatched {
                reason: UnmatchedReason::Cancelled,
            };
        }

        let normalized = normalizer::normalize(query);
        if normalized.is_empty() {
            // 空查询短路，不做任何规则查找
            return MatchOutcome::Unmatched {
                reason: UnmatchedReason::EmptyQuery,
            };
        }

        let selection = match matcher::select(&normalized, catalog) {
            Some(s) => s,
            None => {
                return MatchOutcome::Unmatched {
                    reason: UnmatchedReason::NoTriggerMatch,
                }
            }
        };

        if selection.ambiguous {
            tracing::debug!(
                rule_id = selection.rule.rule.id,
                "同优先级同得分竞争，已按ID升序确定性决胜"
            );
        }

        let extraction = extractor::extract(&selection.rule, &normalized);

        MatchOutcome::Matched(MatchedRule {
            rule: selection.rule,
            score: selection.score,
            values: extraction.values,
            missing_required: extraction.missing_required,
        })
    }

    /// 执行：匹配结果 -> 响应信封
    ///
    /// 必填参数缺失时短路为澄清响应，跳过执行。
    pub fn execute(
        &self,
        outcome: &MatchOutcome,
        opts: &AnswerOptions,
        cancel: &CancelToken,
    ) -> ResponseEnvelope {
        self.execute_traced(outcome, opts, cancel, Uuid::new_v4())
    }

    /// 一站式：问题 -> 响应信封
    pub fn answer(
        &self,
        query: &str,
        opts: &AnswerOptions,
        cancel: &CancelToken,
    ) -> ResponseEnvelope {
        let request_id = Uuid::new_v4();
        tracing::info!(%request_id, query, "收到查询");

        let snapshot = self.snapshot();
        let outcome = self.resolve_on(query, &snapshot, cancel);
        self.execute_traced(&outcome, opts, cancel, request_id)
    }

    fn execute_traced(
        &self,
        outcome: &MatchOutcome,
        opts: &AnswerOptions,
        cancel: &CancelToken,
        request_id: Uuid,
    ) -> ResponseEnvelope {
        let matched = match outcome {
            MatchOutcome::Unmatched { reason } => {
                tracing::info!(%request_id, ?reason, "查询未命中");
                return formatter::format_unmatched(*reason, request_id);
            }
            MatchOutcome::Matched(m) => m,
        };

        tracing::info!(
            %request_id,
            rule_id = matched.rule.rule.id,
            rule_name = %matched.rule.rule.name,
            score = matched.score,
            "命中规则"
        );

        if !matched.missing_required.is_empty() {
            tracing::info!(
                %request_id,
                missing = ?matched.missing_required,
                "必填参数缺失，返回澄清响应"
            );
            return formatter::format_missing_parameters(
                &matched.rule,
                matched.missing_required.clone(),
                request_id,
            );
        }

        let stmt = match binder::bind(&matched.rule, &matched.values) {
            Ok(s) => s,
            Err(e) => {
                // 到达此处说明调用方未先短路缺参，按执行失败整形
                tracing::error!(%request_id, rule_id = matched.rule.rule.id, error = %e, "绑定被拒绝");
                return formatter::format_execution_error(&e, &matched.rule, request_id);
            }
        };

        let exec_opts = ExecOptions {
            row_cap: opts
                .row_cap
                .or(matched.rule.rule.row_cap)
                .unwrap_or(self.defaults.row_cap),
            timeout: opts.timeout.unwrap_or(self.defaults.timeout),
            retry_backoff: self.defaults.retry_backoff,
        };

        match self.executor.execute(&stmt, &matched.rule, &exec_opts, cancel) {
            Ok(result) => {
                tracing::info!(
                    %request_id,
                    row_count = result.row_count,
                    truncated = result.truncated,
                    "查询完成"
                );
                formatter::format_success(result, &matched.rule, request_id)
            }
            Err(EngineError::Cancelled) => {
                formatter::format_unmatched(UnmatchedReason::Cancelled, request_id)
            }
            Err(e) => formatter::format_execution_error(&e, &matched.rule, request_id),
        }
    }
}
