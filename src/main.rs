//! 问数 - 规则驱动的自然语言查询引擎
//!
//! 命令行一次性问答入口：加载配置，打开规则库，构建目录快照，
//! 回答命令行传入的问题并打印响应信封。

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wenshu::{AnswerOptions, CancelToken, ConfigManager, QueryEngine, SqliteStore};

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let query: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("用法: wenshu <问题>");
        eprintln!("示例: wenshu 深圳工厂的库存情况");
        std::process::exit(2);
    }

    let config = ConfigManager::new(ConfigManager::default_path()).load()?;
    let db_path = config
        .db_path
        .clone()
        .unwrap_or_else(ConfigManager::default_db_path);

    tracing::info!(db = %db_path.display(), "启动问数引擎");

    let store = Arc::new(SqliteStore::open(&db_path)?);
    store.seed_default_rules()?;

    let engine = QueryEngine::new(store.clone(), store, config.exec_options())?;

    let cancel = CancelToken::new();
    let envelope = engine.answer(&query, &AnswerOptions::default(), &cancel);

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}
