//! # 分诊管理模块
//!
//! 提供配置加载与验证、日志初始化等运维功能

pub mod config;
pub mod logging;

pub use config::{
    load_dotenv, BatchConfig, ClassifierConfig, ConfigManager, ConfigValidator, DirectoryConfig,
    GenerativeConfig, LexicalConfig, LoggingConfig, SeverityConfig, TaxonomyConfig, TriageConfig,
};
pub use logging::{init_tracing, startup_subscriber};
