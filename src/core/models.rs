//! 核心数据模型定义
//!
//! 规则定义、参数规格、匹配结果与响应信封。
//! 所有结构必须可序列化，规则以JSON形式入库存储。

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

/// 规则状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// 启用，参与匹配
    #[default]
    Active,
    /// 停用，构建目录快照时排除
    Inactive,
}

/// 参数类型（封闭枚举，目录构建时校验）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// 自由文本（供应商名、物料名等），按词典或锚点词抽取
    #[serde(rename = "string")]
    Text,
    /// 封闭取值集合（工厂名、状态标签等）
    Enum,
    /// 日期，按固定格式扫描
    Date,
    /// 数字，按数字串扫描
    Number,
}

/// 抽取提示：每个参数一份声明式配置，新增实体类型不需要新代码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExtractionHint {
    /// enum类型的封闭取值集合（规范值）
    #[serde(default)]
    pub values: Vec<String>,
    /// 规范值 -> 等价表面形式（命中任一形式都抽取为规范值）
    #[serde(default)]
    pub value_synonyms: BTreeMap<String, Vec<String>>,
    /// string类型的锚点词（如"供应商"、"物料"），捕获锚点后的文本
    #[serde(default)]
    pub anchors: Vec<String>,
    /// string类型的参考词典，优先于锚点捕获
    #[serde(default)]
    pub dictionary: Vec<String>,
    /// date类型的候选格式，空则使用内置默认格式
    #[serde(default)]
    pub date_formats: Vec<String>,
}

/// 参数规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// 参数名，对应模板中的 :name 占位符
    pub name: String,
    /// 参数类型
    pub kind: ParamKind,
    /// 是否必填
    pub required: bool,
    /// 抽取提示
    #[serde(default)]
    pub hint: ExtractionHint,
}

/// 规则定义 - 存储的意图定义
///
/// 将触发词映射到参数化查询模板。规则本身不包含任何可执行代码，
/// 匹配与抽取行为完全由声明的数据驱动。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// 规则唯一ID（稳定，同优先级同得分时按ID升序决胜）
    pub id: i64,
    /// 规则名称（用于显示，历史版本间不保证唯一）
    pub name: String,
    /// 规则描述
    #[serde(default)]
    pub description: String,
    /// 触发词集合
    pub trigger_words: Vec<String>,
    /// 同义词表：规范词 -> 等价表面形式集合
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
    /// 参数规格（有序）
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
    /// 查询模板，使用 :name 命名占位符，禁止字符串拼接
    pub template: String,
    /// 优先级，数字越大越优先
    pub priority: i32,
    /// 规则状态
    #[serde(default)]
    pub status: RuleStatus,
    /// 分类标签，仅作分组展示，不参与匹配
    #[serde(default)]
    pub category: String,
    /// 行数上限覆盖（为空则使用引擎默认值）
    #[serde(default)]
    pub row_cap: Option<usize>,
}

/// 编译后的规则 - 目录构建产物
///
/// 在规则之上缓存：经同义词展开并规范化的触发短语集合、
/// 模板占位符集合。构建一次，匹配路径只读。
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    /// 原始规则定义
    pub rule: Rule,
    /// 展开并规范化后的触发短语（去重）
    pub trigger_phrases: Vec<String>,
    /// 模板中出现的占位符名集合
    pub placeholders: BTreeSet<String>,
}

/// 抽取出的参数值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// 文本值（enum类型抽取结果为规范值文本）
    Text(String),
    /// 数字值
    Number(f64),
    /// 日期值
    Date(NaiveDate),
}

impl ParamValue {
    /// 转为JSON值（用于信封与日志）
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Text(s) => serde_json::Value::String(s.clone()),
            ParamValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ParamValue::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        }
    }
}

/// 未命中原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnmatchedReason {
    /// 规范化后查询为空
    EmptyQuery,
    /// 无任何规则触发词命中
    NoTriggerMatch,
    /// 解析开始前已被取消
    Cancelled,
}

/// 命中详情
#[derive(Debug, Clone)]
pub struct MatchedRule {
    /// 胜出规则
    pub rule: Arc<CompiledRule>,
    /// 命中的去重触发短语数
    pub score: usize,
    /// 抽取成功的参数值
    pub values: BTreeMap<String, ParamValue>,
    /// 未能抽取的必填参数名
    pub missing_required: Vec<String>,
}

/// 解析结果 - 每次请求的瞬态产物，不持久化
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// 命中某条规则
    Matched(MatchedRule),
    /// 未命中
    Unmatched {
        /// 未命中原因
        reason: UnmatchedReason,
    },
}

impl MatchOutcome {
    /// 是否命中
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }
}

/// 绑定后的语句
///
/// 模板文本原样保留 :name 占位标记，值以参数列表随行传递，
/// 永远不会拼接进SQL文本。缺席的可选参数以 None 占位，
/// 绑定值数量恒等于声明的参数数量。
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    /// 含命名占位符的语句文本
    pub sql: String,
    /// 按参数声明顺序排列的 (参数名, 值) 对
    pub params: Vec<(String, Option<ParamValue>)>,
}

/// 结果行：统一形状的记录
pub type Row = serde_json::Map<String, serde_json::Value>;

/// 查询结果
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// 结果行（有序）
    pub rows: Vec<Row>,
    /// 行数
    pub row_count: usize,
    /// 是否因行数上限被截断
    pub truncated: bool,
    /// 来源规则ID（可追溯性）
    pub rule_id: i64,
}

/// 响应信封 - 返回给调用方的统一形状
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// 是否命中规则
    pub matched: bool,
    /// 命中规则ID
    pub rule_id: Option<i64>,
    /// 命中规则名称
    pub rule_name: Option<String>,
    /// 行数
    pub row_count: usize,
    /// 是否被行数上限截断
    pub truncated: bool,
    /// 结果行
    pub rows: Vec<Row>,
    /// 未能抽取的必填参数名
    pub missing_parameters: Vec<String>,
    /// 错误类别: NoMatch | MissingParameter | Transient | Structural | Cancelled
    pub error_kind: Option<String>,
    /// 请求追踪ID
    pub request_id: Uuid,
}
