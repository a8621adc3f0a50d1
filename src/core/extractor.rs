//! 参数抽取模块
//!
//! 按胜出规则的参数规格，从规范化查询文本中拉取类型化的值。
//! 不构建完整语法分析：enum按封闭取值集合找首次出现，string按
//! 词典或锚点词捕获，date按固定格式扫描，number取首个数字串。
//!
//! 必填参数抽取失败记入 missing_required 后继续抽取其余参数
//! （非致命，部分结果）；可选参数失败直接省略，由绑定器退化为
//! 无过滤条件。

use crate::core::models::{CompiledRule, ExtractionHint, ParamKind, ParamValue};
use crate::core::normalizer::NormalizedQuery;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// 内置日期格式（提示未声明时使用）
const DEFAULT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日"];

/// 抽取结果
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// 抽取成功的参数值
    pub values: BTreeMap<String, ParamValue>,
    /// 未能抽取的必填参数名
    pub missing_required: Vec<String>,
}

/// 对胜出规则执行参数抽取
pub fn extract(rule: &CompiledRule, normalized: &NormalizedQuery) -> Extraction {
    let text = normalized.text.as_str();

    // 捕获边界：本规则所有参数的锚点词都视作停止标记
    let all_anchors: Vec<&str> = rule
        .rule
        .parameters
        .iter()
        .flat_map(|p| p.hint.anchors.iter().map(|a| a.as_str()))
        .collect();

    let mut result = Extraction::default();
    for spec in &rule.rule.parameters {
        let value = match spec.kind {
            ParamKind::Enum => extract_enum(&spec.hint, text),
            ParamKind::Text => extract_text(&spec.hint, text, &all_anchors),
            ParamKind::Date => extract_date(&spec.hint, text),
            ParamKind::Number => extract_number(text),
        };

        match value {
            Some(v) => {
                result.values.insert(spec.name.clone(), v);
            }
            None if spec.required => result.missing_required.push(spec.name.clone()),
            None => {}
        }
    }

    result
}

/// enum抽取：封闭取值集合中首次（按字节位置）出现者胜
///
/// 规范值的每个等价表面形式都参与查找，命中任一形式都抽取为规范值。
fn extract_enum(hint: &ExtractionHint, text: &str) -> Option<ParamValue> {
    let mut earliest: Option<(usize, &str)> = None;

    for canonical in &hint.values {
        let mut surfaces = vec![canonical.as_str()];
        if let Some(extra) = hint.value_synonyms.get(canonical) {
            surfaces.extend(extra.iter().map(|s| s.as_str()));
        }

        for surface in surfaces {
            let lowered = surface.to_lowercase();
            if let Some(pos) = text.find(&lowered) {
                let better = match earliest {
                    None => true,
                    Some((best_pos, _)) => pos < best_pos,
                };
                if better {
                    earliest = Some((pos, canonical.as_str()));
                }
            }
        }
    }

    earliest.map(|(_, canonical)| ParamValue::Text(canonical.to_string()))
}

/// string抽取：词典优先，词典未命中回落锚点捕获
///
/// 锚点捕获取锚点后的文本，至下一个停止标记（任意锚点词或空白）
/// 或串尾为止。词典外的新实体仍可经锚点抽取。
fn extract_text(hint: &ExtractionHint, text: &str, all_anchors: &[&str]) -> Option<ParamValue> {
    let mut earliest: Option<(usize, &str)> = None;
    for entry in &hint.dictionary {
        let lowered = entry.to_lowercase();
        if let Some(pos) = text.find(&lowered) {
            let better = earliest.map_or(true, |(best_pos, _)| pos < best_pos);
            if better {
                earliest = Some((pos, entry.as_str()));
            }
        }
    }
    if let Some((_, entry)) = earliest {
        return Some(ParamValue::Text(entry.to_string()));
    }

    for anchor in &hint.anchors {
        let lowered = anchor.to_lowercase();
        if let Some(pos) = text.find(&lowered) {
            let after = &text[pos + lowered.len()..];
            let captured = capture_until_marker(after, all_anchors);
            if !captured.is_empty() {
                return Some(ParamValue::Text(captured));
            }
        }
    }

    None
}

/// 捕获到下一个停止标记（锚点词或空白）或串尾
fn capture_until_marker(after: &str, markers: &[&str]) -> String {
    let after = after.trim_start();
    let mut end = after.len();

    if let Some(pos) = after.find(char::is_whitespace) {
        end = end.min(pos);
    }
    for marker in markers {
        let lowered = marker.to_lowercase();
        if let Some(pos) = after.find(&lowered) {
            end = end.min(pos);
        }
    }

    after[..end].trim().to_string()
}

/// date抽取：取文本中首个形如日期的片段，逐格式尝试解析
fn extract_date(hint: &ExtractionHint, text: &str) -> Option<ParamValue> {
    let formats: Vec<&str> = if hint.date_formats.is_empty() {
        DEFAULT_DATE_FORMATS.to_vec()
    } else {
        hint.date_formats.iter().map(|s| s.as_str()).collect()
    };

    for candidate in date_candidates(text) {
        for fmt in &formats {
            if let Ok(date) = NaiveDate::parse_from_str(&candidate, fmt) {
                return Some(ParamValue::Date(date));
            }
        }
    }

    None
}

/// 切出连续的"数字+日期分隔符"片段作为日期候选
fn date_candidates(text: &str) -> Vec<String> {
    let is_date_char =
        |c: char| c.is_ascii_digit() || matches!(c, '-' | '/' | '年' | '月' | '日');

    let mut candidates = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if is_date_char(c) {
            current.push(c);
        } else if !current.is_empty() {
            candidates.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        candidates.push(current);
    }

    // 纯数字片段不是日期候选
    candidates.retain(|c| c.chars().any(|ch| !ch.is_ascii_digit()));
    candidates
}

/// number抽取：首个数字串（可带一个小数点）
fn extract_number(text: &str) -> Option<ParamValue> {
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            let mut seen_dot = false;
            while i < bytes.len() {
                let c = bytes[i];
                if c.is_ascii_digit() {
                    i += 1;
                } else if c == b'.' && !seen_dot && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
                    seen_dot = true;
                    i += 1;
                } else {
                    break;
                }
            }
            if let Ok(n) = text[start..i].parse::<f64>() {
                return Some(ParamValue::Number(n));
            }
        } else {
            i += 1;
        }
    }

    None
}
