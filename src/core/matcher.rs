//! 规则匹配模块
//!
//! 对规范化查询给每条启用规则打分，按确定性决胜策略选出胜者。
//!
//! 打分：规则的展开触发短语中，作为子串出现在规范化文本里的
//! 去重短语个数。子串包含（而非词元精确匹配）是领域既定语义：
//! 源领域大量使用短多字名词，短触发词的过度匹配由规则作者通过
//! 优先级声明解决，不在匹配器里隐式加权。
//!
//! 决胜顺序：优先级降序 -> 得分降序 -> 规则ID升序。
//! 规则集在数百条量级，经触发短语倒排表扫一遍即可，
//! 正确性与确定性优先于渐进复杂度。

use crate::core::catalog::RuleCatalog;
use crate::core::models::CompiledRule;
use crate::core::normalizer::NormalizedQuery;
use std::collections::HashMap;
use std::sync::Arc;

/// 匹配选择结果：胜出规则与其得分
#[derive(Debug, Clone)]
pub struct Selection {
    /// 胜出规则
    pub rule: Arc<CompiledRule>,
    /// 命中的去重触发短语数
    pub score: usize,
    /// 是否存在同优先级同得分的竞争者（仅用于观测，决胜仍确定）
    pub ambiguous: bool,
}

/// 在目录快照上选出胜者
///
/// 经触发短语倒排表打分：每个作为子串出现在查询里的短语，给其
/// 倒排的全部规则各计1分（短语在目录层已去重）。得分为0的规则
/// 被丢弃；无任何命中返回 None。
pub fn select(normalized: &NormalizedQuery, catalog: &RuleCatalog) -> Option<Selection> {
    let mut scores: HashMap<i64, usize> = HashMap::new();
    for (phrase, rule_ids) in catalog.postings() {
        if normalized.text.contains(phrase.as_str()) {
            for id in rule_ids {
                *scores.entry(*id).or_insert(0) += 1;
            }
        }
    }

    let mut candidates: Vec<(Arc<CompiledRule>, usize)> = scores
        .into_iter()
        .filter_map(|(id, score)| catalog.get(id).map(|rule| (rule.clone(), score)))
        .collect();

    // 决胜排序：优先级降序 -> 得分降序 -> ID升序
    candidates.sort_by(|(a, a_score), (b, b_score)| {
        b.rule
            .priority
            .cmp(&a.rule.priority)
            .then(b_score.cmp(a_score))
            .then(a.rule.id.cmp(&b.rule.id))
    });

    let mut iter = candidates.into_iter();
    let (rule, score) = iter.next()?;
    let ambiguous = iter
        .next()
        .map_or(false, |(next, next_score)| {
            next.rule.priority == rule.rule.priority && next_score == score
        });

    Some(Selection {
        rule,
        score,
        ambiguous,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Rule, RuleStatus};
    use crate::core::normalizer::normalize;
    use std::collections::BTreeMap;

    fn rule(id: i64, priority: i32, triggers: &[&str]) -> Rule {
        Rule {
            id,
            name: format!("规则{}", id),
            description: String::new(),
            trigger_words: triggers.iter().map(|s| s.to_string()).collect(),
            synonyms: BTreeMap::new(),
            parameters: Vec::new(),
            template: "SELECT 1".to_string(),
            priority,
            status: RuleStatus::Active,
            category: String::new(),
            row_cap: None,
        }
    }

    fn catalog(rules: Vec<Rule>) -> RuleCatalog {
        RuleCatalog::build(rules)
    }

    #[test]
    fn test_no_trigger_match_returns_none() {
        let c = catalog(vec![rule(1, 50, &["库存"])]);
        assert!(select(&normalize("随便问问"), &c).is_none());
    }

    #[test]
    fn test_substring_containment_matches() {
        let c = catalog(vec![rule(1, 50, &["工厂"])]);
        let sel = select(&normalize("查询深圳工厂库存"), &c).unwrap();
        assert_eq!(sel.rule.rule.id, 1);
        assert_eq!(sel.score, 1);
    }

    #[test]
    fn test_score_counts_distinct_phrases() {
        let c = catalog(vec![rule(1, 50, &["工厂", "库存", "物料"])]);
        let sel = select(&normalize("查询深圳工厂库存"), &c).unwrap();
        assert_eq!(sel.score, 2);
    }

    #[test]
    fn test_priority_dominates_score() {
        // 规则1命中2个短语但优先级低，规则2命中1个短语但优先级高
        let c = catalog(vec![
            rule(1, 10, &["工厂", "库存"]),
            rule(2, 90, &["库存"]),
        ]);
        let sel = select(&normalize("深圳工厂库存"), &c).unwrap();
        assert_eq!(sel.rule.rule.id, 2);
    }

    #[test]
    fn test_score_breaks_priority_tie() {
        let c = catalog(vec![
            rule(1, 50, &["库存"]),
            rule(2, 50, &["工厂", "库存"]),
        ]);
        let sel = select(&normalize("深圳工厂库存"), &c).unwrap();
        assert_eq!(sel.rule.rule.id, 2);
        assert_eq!(sel.score, 2);
    }

    #[test]
    fn test_lowest_id_breaks_full_tie() {
        let c = catalog(vec![
            rule(7, 50, &["库存"]),
            rule(3, 50, &["存货", "库存"]),
        ]);
        // 两条规则各命中1个短语，优先级相同，ID小者胜
        let sel = select(&normalize("查库存"), &c).unwrap();
        assert_eq!(sel.rule.rule.id, 3);
        assert!(sel.ambiguous);
    }

    #[test]
    fn test_selection_is_deterministic_on_repeated_runs() {
        let c = catalog(vec![
            rule(5, 50, &["库存"]),
            rule(2, 50, &["库存"]),
            rule(9, 50, &["库存"]),
        ]);
        let n = normalize("库存查询");
        let first = select(&n, &c).unwrap().rule.rule.id;
        for _ in 0..20 {
            assert_eq!(select(&n, &c).unwrap().rule.rule.id, first);
        }
        assert_eq!(first, 2);
    }

    #[test]
    fn test_synonym_expansion_scores() {
        let mut r = rule(1, 50, &["库存"]);
        r.synonyms = BTreeMap::from([("库存".to_string(), vec!["存货".to_string()])]);
        let c = catalog(vec![r]);
        let sel = select(&normalize("深圳存货情况"), &c).unwrap();
        assert_eq!(sel.rule.rule.id, 1);
    }

    #[test]
    fn test_zero_score_rules_discarded_even_with_high_priority() {
        let c = catalog(vec![
            rule(1, 99, &["发货"]),
            rule(2, 10, &["库存"]),
        ]);
        let sel = select(&normalize("查库存"), &c).unwrap();
        assert_eq!(sel.rule.rule.id, 2);
    }
}
