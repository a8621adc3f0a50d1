//! 查询规范化模块
//!
//! 将原始问题文本转成统一形态：小写、去首尾空白、内部空白折叠、
//! 剥离有限的停用标点。分词采用简单的空白/中日韩字符切分，
//! 不引入统计分词器。

/// 停用标点集合（有界，中英文常见句读）
const STOP_PUNCTUATION: &[char] = &[
    '，', '。', '？', '！', '、', '；', '：', '（', '）', '【', '】',
    '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}',
    ',', '?', '!', ';', '(', ')', '[', ']', '"', '\'',
];

/// 规范化后的查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    /// 规范化文本（匹配与抽取都在此文本上进行）
    pub text: String,
    /// 切分出的词元序列
    pub tokens: Vec<String>,
}

impl NormalizedQuery {
    /// 规范化后是否为空
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// 是否为中日韩表意文字
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'   // CJK统一表意文字
        | '\u{3400}'..='\u{4DBF}' // 扩展A
        | '\u{F900}'..='\u{FAFF}' // 兼容表意文字
    )
}

/// 规范化原始查询文本
///
/// 小写、剥离停用标点（替换为空格）、折叠内部空白为单个空格。
/// 空输入产出空的 `NormalizedQuery`，由调用方短路为 EmptyQuery。
pub fn normalize(raw: &str) -> NormalizedQuery {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if STOP_PUNCTUATION.contains(&c) {
            cleaned.push(' ');
        } else {
            for lc in c.to_lowercase() {
                cleaned.push(lc);
            }
        }
    }

    // 折叠内部空白
    let text = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let tokens = tokenize(&text);

    NormalizedQuery { text, tokens }
}

/// 简单的空白/CJK感知切分
///
/// CJK字符各自成词元，ASCII字母数字连续段成词元，其余字符作为边界。
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if is_cjk(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            current.push(c);
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
