//! # Triage Core
//!
//! 分诊系统的核心模块，提供基础数据结构、标准专科分类表、错误定义和通用工具。

pub mod error;
pub mod generator;
pub mod keywords;
pub mod models;
pub mod taxonomy;
pub mod utils;

pub use error::{GenerativeError, Result, TriageError};
pub use generator::TextGenerator;
pub use keywords::{compile_keyword_rules, CompiledKeywordRule};
pub use models::*;
pub use taxonomy::{SpecialtyLabel, SpecialtyTaxonomy};
