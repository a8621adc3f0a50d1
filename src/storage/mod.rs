//! 存储模块 - 规则持久化与查询执行的SQLite实现、应用配置

pub mod config;
pub mod database;
