//! # 分诊外部集成模块
//!
//! 提供与外部系统的连接：
//! - 生成式模型连接器
//! - 病例与医院负载记录源

pub mod connectors;
pub mod records;

pub use connectors::{GeminiConfig, GeminiConnector};
pub use records::{
    parse_hospital_loads, parse_patient_records, JsonRecordSource, LoadReport, RecordSource,
};
