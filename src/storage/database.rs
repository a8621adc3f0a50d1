//! 数据库存储模块
//!
//! 使用SQLite同时承担两个协作方角色：规则来源（rules表）与
//! 查询执行器（命名参数绑定执行业务查询）。
//! 值只经由rusqlite的参数绑定设施进入语句，绝不拼接SQL文本。

use crate::core::catalog::RuleSource;
use crate::core::executor::{ExecutorFailure, QueryExecutor};
use crate::core::models::{ParamValue, Row, Rule, RuleStatus};
use anyhow::Result;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, ErrorCode, ToSql, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// SQLite存储
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 打开或创建数据库文件
    pub fn open(path: &Path) -> Result<Self> {
        // 确保目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    /// 打开内存数据库（测试与演示）
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 初始化表结构
    fn init_tables(&self) -> Result<()> {
        self.lock().execute_batch(
            r#"
            -- 规则表
            CREATE TABLE IF NOT EXISTS rules (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                trigger_words_json TEXT NOT NULL,
                synonyms_json TEXT NOT NULL DEFAULT '{}',
                parameters_json TEXT NOT NULL DEFAULT '[]',
                template TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 50,
                status TEXT NOT NULL DEFAULT 'active',
                category TEXT NOT NULL DEFAULT '',
                row_cap INTEGER
            );

            -- 创建索引
            CREATE INDEX IF NOT EXISTS idx_rules_status ON rules(status);
            CREATE INDEX IF NOT EXISTS idx_rules_priority ON rules(priority DESC);
            "#,
        )?;
        Ok(())
    }

    /// 保存规则（存在则整条替换）
    pub fn save_rule(&self, rule: &Rule) -> Result<()> {
        let trigger_words_json = serde_json::to_string(&rule.trigger_words)?;
        let synonyms_json = serde_json::to_string(&rule.synonyms)?;
        let parameters_json = serde_json::to_string(&rule.parameters)?;
        let status = match rule.status {
            RuleStatus::Active => "active",
            RuleStatus::Inactive => "inactive",
        };

        self.lock().execute(
            r#"
            INSERT OR REPLACE INTO rules
            (id, name, description, trigger_words_json, synonyms_json, parameters_json,
             template, priority, status, category, row_cap)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                rule.id,
                rule.name,
                rule.description,
                trigger_words_json,
                synonyms_json,
                parameters_json,
                rule.template,
                rule.priority,
                status,
                rule.category,
                rule.row_cap.map(|n| n as i64),
            ],
        )?;
        Ok(())
    }

    /// 删除规则
    pub fn delete_rule(&self, rule_id: i64) -> Result<()> {
        self.lock()
            .execute("DELETE FROM rules WHERE id = ?1", params![rule_id])?;
        Ok(())
    }

    /// 执行任意建表/造数脚本（演示数据与测试夹具用）
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock().execute_batch(sql)?;
        Ok(())
    }

    /// 规则表为空时写入一组起始规则
    pub fn seed_default_rules(&self) -> Result<usize> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM rules", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(0);
        }

        let rules = default_rules();
        let seeded = rules.len();
        for rule in &rules {
            self.save_rule(rule)?;
        }
        tracing::info!(count = seeded, "规则表为空，已写入起始规则");
        Ok(seeded)
    }
}

impl RuleSource for SqliteStore {
    /// 加载全部启用规则
    fn list_active_rules(&self) -> Result<Vec<Rule>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, description, trigger_words_json, synonyms_json,
                   parameters_json, template, priority, status, category, row_cap
            FROM rules
            WHERE status = 'active'
            ORDER BY id
            "#,
        )?;

        let rules = stmt.query_map([], |row| {
            let trigger_words_json: String = row.get(3)?;
            let synonyms_json: String = row.get(4)?;
            let parameters_json: String = row.get(5)?;
            let status_str: String = row.get(8)?;
            let row_cap: Option<i64> = row.get(10)?;

            Ok(Rule {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                trigger_words: serde_json::from_str(&trigger_words_json).unwrap_or_default(),
                synonyms: serde_json::from_str(&synonyms_json).unwrap_or_default(),
                parameters: serde_json::from_str(&parameters_json).unwrap_or_default(),
                template: row.get(6)?,
                priority: row.get(7)?,
                status: if status_str == "inactive" {
                    RuleStatus::Inactive
                } else {
                    RuleStatus::Active
                },
                category: row.get(9)?,
                row_cap: row_cap.map(|n| n as usize),
            })
        })?;

        rules.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

/// 绑定值封装：None 绑定为 SQL NULL
struct BindValue<'a>(&'a Option<ParamValue>);

impl ToSql for BindValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            None => ToSqlOutput::Owned(Value::Null),
            Some(ParamValue::Text(s)) => ToSqlOutput::Owned(Value::Text(s.clone())),
            Some(ParamValue::Number(n)) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    ToSqlOutput::Owned(Value::Integer(*n as i64))
                } else {
                    ToSqlOutput::Owned(Value::Real(*n))
                }
            }
            Some(ParamValue::Date(d)) => {
                ToSqlOutput::Owned(Value::Text(d.format("%Y-%m-%d").to_string()))
            }
        })
    }
}

/// rusqlite错误分类：锁/中断为临时性，其余为结构性
fn classify(err: rusqlite::Error) -> ExecutorFailure {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::OperationInterrupted => ExecutorFailure::Transient(err.to_string()),
            _ => ExecutorFailure::Structural(err.to_string()),
        },
        _ => ExecutorFailure::Structural(err.to_string()),
    }
}

fn value_ref_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::json!(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

impl QueryExecutor for SqliteStore {
    fn run(
        &self,
        sql: &str,
        params: &[(String, Option<ParamValue>)],
        max_rows: usize,
        timeout: Duration,
    ) -> Result<Vec<Row>, ExecutorFailure> {
        let deadline = Instant::now() + timeout;
        let conn = self.lock();

        // 聚合/排序语句在产出第一行之前就完成全部计算，行循环里的
        // 检查命不中它们；截止时间要能在语句执行中途打断step
        conn.progress_handler(100, Some(move || Instant::now() >= deadline));
        let result = run_statement(&conn, sql, params, max_rows, deadline);
        conn.progress_handler(0, None::<fn() -> bool>);

        match result {
            // 截止时间已过的中断统一报为超时
            Err(ExecutorFailure::Transient(_)) if Instant::now() >= deadline => {
                Err(ExecutorFailure::Transient("查询超时".to_string()))
            }
            other => other,
        }
    }
}

fn run_statement(
    conn: &Connection,
    sql: &str,
    params: &[(String, Option<ParamValue>)],
    max_rows: usize,
    deadline: Instant,
) -> Result<Vec<Row>, ExecutorFailure> {
    let mut stmt = conn.prepare(sql).map_err(classify)?;
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    for (name, value) in params {
        let marker = format!(":{}", name);
        match stmt.parameter_index(&marker).map_err(classify)? {
            Some(idx) => stmt
                .raw_bind_parameter(idx, BindValue(value))
                .map_err(classify)?,
            // 可选参数可以不出现在模板中
            None => continue,
        }
    }

    let mut result = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next().map_err(classify)? {
        if Instant::now() >= deadline {
            return Err(ExecutorFailure::Transient("查询超时".to_string()));
        }
        if result.len() >= max_rows {
            break;
        }

        let mut record = Row::new();
        for (idx, column) in columns.iter().enumerate() {
            let value = row.get_ref(idx).map_err(classify)?;
            record.insert(column.clone(), value_ref_to_json(value));
        }
        result.push(record);
    }

    Ok(result)
}

/// 起始规则集：工厂库存、供应商库存、库存总览
fn default_rules() -> Vec<Rule> {
    use crate::core::models::{ExtractionHint, ParamKind, ParamSpec};
    use std::collections::BTreeMap;

    let factories = ["深圳", "重庆", "南昌", "宜宾"];

    vec![
        Rule {
            id: 1,
            name: "工厂库存查询".to_string(),
            description: "按工厂查询库存明细".to_string(),
            trigger_words: vec!["工厂".to_string()],
            synonyms: BTreeMap::from([(
                "工厂".to_string(),
                vec!["厂区".to_string(), "基地".to_string()],
            )]),
            parameters: vec![ParamSpec {
                name: "factory".to_string(),
                kind: ParamKind::Enum,
                required: true,
                hint: ExtractionHint {
                    values: factories.iter().map(|s| s.to_string()).collect(),
                    ..Default::default()
                },
            }],
            template: "SELECT factory, supplier, material, qty, updated_at \
                       FROM inventory WHERE factory = :factory"
                .to_string(),
            priority: 60,
            status: RuleStatus::Active,
            category: "库存".to_string(),
            row_cap: None,
        },
        Rule {
            id: 2,
            name: "供应商库存查询".to_string(),
            description: "按供应商查询库存明细".to_string(),
            trigger_words: vec!["供应商".to_string()],
            synonyms: BTreeMap::from([("供应商".to_string(), vec!["厂商".to_string()])]),
            parameters: vec![ParamSpec {
                name: "supplier".to_string(),
                kind: ParamKind::Text,
                required: true,
                hint: ExtractionHint {
                    dictionary: vec![
                        "天马".to_string(),
                        "京东方".to_string(),
                        "华星".to_string(),
                    ],
                    anchors: vec!["供应商".to_string(), "厂商".to_string()],
                    ..Default::default()
                },
            }],
            template: "SELECT factory, supplier, material, qty, updated_at \
                       FROM inventory WHERE supplier = :supplier"
                .to_string(),
            priority: 70,
            status: RuleStatus::Active,
            category: "库存".to_string(),
            row_cap: None,
        },
        Rule {
            id: 3,
            name: "库存总览".to_string(),
            description: "全部或指定工厂的库存汇总".to_string(),
            trigger_words: vec!["库存".to_string()],
            synonyms: BTreeMap::from([(
                "库存".to_string(),
                vec!["存货".to_string(), "库存量".to_string()],
            )]),
            parameters: vec![ParamSpec {
                name: "factory".to_string(),
                kind: ParamKind::Enum,
                required: false,
                hint: ExtractionHint {
                    values: factories.iter().map(|s| s.to_string()).collect(),
                    ..Default::default()
                },
            }],
            template: "SELECT factory, SUM(qty) AS total_qty FROM inventory \
                       WHERE (:factory IS NULL OR factory = :factory) GROUP BY factory"
                .to_string(),
            priority: 10,
            status: RuleStatus::Active,
            category: "库存".to_string(),
            row_cap: None,
        },
    ]
}
