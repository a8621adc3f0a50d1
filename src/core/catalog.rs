//! 规则目录模块
//!
//! 持有当前所有启用规则的不可变快照及其派生索引。
//!
//! 设计原则：
//! - 快照整体重建，绝不原地修改规则
//! - 刷新在旁路构建新快照，然后一次性原子替换
//! - 读路径无锁争用，进行中的请求持续使用其获取时的快照
//! - 校验失败的规则排除出目录并记录日志，不致命

use crate::core::binder::scan_placeholders;
use crate::core::models::{CompiledRule, ParamKind, Rule, RuleStatus};
use crate::core::normalizer;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// 规则来源协作方：只读的规则定义供给
pub trait RuleSource: Send + Sync {
    /// 返回全部启用规则，每条恰好一次
    fn list_active_rules(&self) -> Result<Vec<Rule>>;
}

/// 目录构建统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CatalogStats {
    /// 进入快照的规则数
    pub active: usize,
    /// 校验失败或停用被排除的规则数
    pub rejected: usize,
}

/// 规则目录 - 不可变快照
#[derive(Debug)]
pub struct RuleCatalog {
    /// 编译后的启用规则，按ID升序
    rules: Vec<Arc<CompiledRule>>,
    /// 触发短语 -> 规则ID 倒排表（大目录时用于候选剪枝）
    postings: HashMap<String, Vec<i64>>,
    /// 构建统计
    stats: CatalogStats,
}

impl RuleCatalog {
    /// 从规则列表构建快照
    ///
    /// 停用规则与校验失败的规则被排除并记录日志。
    pub fn build(rules: Vec<Rule>) -> Self {
        let mut compiled = Vec::new();
        let mut rejected = 0usize;
        let mut seen_ids = HashSet::new();

        for rule in rules {
            if rule.status == RuleStatus::Inactive {
                tracing::debug!(rule_id = rule.id, name = %rule.name, "规则已停用，跳过");
                rejected += 1;
                continue;
            }
            if !seen_ids.insert(rule.id) {
                tracing::warn!(rule_id = rule.id, name = %rule.name, "规则ID重复，跳过");
                rejected += 1;
                continue;
            }
            match compile_rule(rule) {
                Ok(c) => compiled.push(Arc::new(c)),
                Err(_) => rejected += 1,
            }
        }

        compiled.sort_by_key(|c| c.rule.id);

        let mut postings: HashMap<String, Vec<i64>> = HashMap::new();
        for c in &compiled {
            for phrase in &c.trigger_phrases {
                postings.entry(phrase.clone()).or_default().push(c.rule.id);
            }
        }

        let stats = CatalogStats {
            active: compiled.len(),
            rejected,
        };
        tracing::info!(active = stats.active, rejected = stats.rejected, "规则目录构建完成");

        Self {
            rules: compiled,
            postings,
            stats,
        }
    }

    /// 启用规则（按ID升序）
    pub fn active_rules(&self) -> &[Arc<CompiledRule>] {
        &self.rules
    }

    /// 按ID查找规则
    pub fn get(&self, id: i64) -> Option<&Arc<CompiledRule>> {
        self.rules
            .binary_search_by_key(&id, |c| c.rule.id)
            .ok()
            .map(|idx| &self.rules[idx])
    }

    /// 触发短语倒排表
    pub fn postings(&self) -> &HashMap<String, Vec<i64>> {
        &self.postings
    }

    /// 构建统计
    pub fn stats(&self) -> CatalogStats {
        self.stats
    }

    /// 快照是否为空
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// 编译单条规则：校验 + 缓存派生数据
///
/// 校验内容：
/// - 模板占位符必须都有对应参数声明
/// - 必填参数必须出现在模板占位符中
/// - 参数名不得重复；enum参数必须声明非空取值集合
/// - 同义词展开后触发短语不得为空（否则永远无法命中）
pub fn compile_rule(rule: Rule) -> Result<CompiledRule, RuleValidationError> {
    let placeholders = scan_placeholders(&rule.template);

    let mut param_names = HashSet::new();
    for spec in &rule.parameters {
        if !param_names.insert(spec.name.as_str()) {
            tracing::warn!(rule_id = rule.id, name = %rule.name, param = %spec.name, "参数名重复，规则被排除");
            return Err(RuleValidationError::DuplicateParameter(spec.name.clone()));
        }
        if spec.kind == ParamKind::Enum && spec.hint.values.is_empty() {
            tracing::warn!(rule_id = rule.id, name = %rule.name, param = %spec.name, "enum参数取值集合为空，规则被排除");
            return Err(RuleValidationError::EmptyEnumValues(spec.name.clone()));
        }
        if spec.required && !placeholders.contains(&spec.name) {
            tracing::warn!(rule_id = rule.id, name = %rule.name, param = %spec.name, "必填参数在模板中无占位符，规则被排除");
            return Err(RuleValidationError::RequiredParamNotInTemplate(spec.name.clone()));
        }
    }

    for ph in &placeholders {
        if !param_names.contains(ph.as_str()) {
            tracing::warn!(rule_id = rule.id, name = %rule.name, placeholder = %ph, "模板占位符无对应参数声明，规则被排除");
            return Err(RuleValidationError::UnknownPlaceholder(ph.clone()));
        }
    }

    let trigger_phrases = expand_trigger_phrases(&rule);
    if trigger_phrases.is_empty() {
        tracing::warn!(rule_id = rule.id, name = %rule.name, "触发短语为空，规则被排除");
        return Err(RuleValidationError::NoTriggerPhrases);
    }

    Ok(CompiledRule {
        rule,
        trigger_phrases,
        placeholders,
    })
}

/// 将触发词经同义词表展开为扁平短语集合（规范化、去重）
fn expand_trigger_phrases(rule: &Rule) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut phrases = Vec::new();

    let mut push = |surface: &str| {
        let normalized = normalizer::normalize(surface).text;
        if !normalized.is_empty() && seen.insert(normalized.clone()) {
            phrases.push(normalized);
        }
    };

    for word in &rule.trigger_words {
        push(word);
        if let Some(equivalents) = rule.synonyms.get(word) {
            for surface in equivalents {
                push(surface);
            }
        }
    }

    phrases
}

/// 规则校验失败原因
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleValidationError {
    /// 参数名重复
    #[error("参数名重复: {0}")]
    DuplicateParameter(String),
    /// enum参数取值集合为空
    #[error("enum参数取值集合为空: {0}")]
    EmptyEnumValues(String),
    /// 必填参数在模板中无占位符
    #[error("必填参数在模板中无占位符: {0}")]
    RequiredParamNotInTemplate(String),
    /// 模板占位符无对应参数声明
    #[error("模板占位符无对应参数声明: {0}")]
    UnknownPlaceholder(String),
    /// 展开后触发短语为空
    #[error("展开后触发短语为空")]
    NoTriggerPhrases,
}

/// 目录句柄 - 原子快照交换
///
/// 读路径只克隆一次Arc；刷新方之间由重建锁串行化，
/// 新快照在旁路构建完成后经写锁一次性替换。
pub struct CatalogHandle {
    current: RwLock<Arc<RuleCatalog>>,
    rebuild_lock: Mutex<()>,
}

impl CatalogHandle {
    /// 以初始快照创建句柄
    pub fn new(catalog: RuleCatalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// 获取当前快照（请求开始时调用一次，全程使用同一快照）
    pub fn snapshot(&self) -> Arc<RuleCatalog> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 串行化重建并原子替换快照
    ///
    /// 构建闭包在持有重建锁、不持有读写锁的情况下执行，
    /// 构建期间读方继续使用旧快照。
    pub fn rebuild<F>(&self, build: F) -> Result<CatalogStats>
    where
        F: FnOnce() -> Result<RuleCatalog>,
    {
        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let fresh = build()?;
        let stats = fresh.stats();

        let mut slot = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Arc::new(fresh);

        Ok(stats)
    }
}
