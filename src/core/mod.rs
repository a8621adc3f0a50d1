//! Core模块 - 意图解析与参数化查询的全部核心逻辑

pub mod binder;
pub mod catalog;
pub mod engine;
pub mod executor;
pub mod extractor;
pub mod formatter;
pub mod matcher;
pub mod models;
pub mod normalizer;

#[cfg(test)]
mod integration_tests;
