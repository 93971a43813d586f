//! 通用工具函数

use chrono::Utc;
use uuid::Uuid;

/// 生成一次批处理运行的标识符
pub fn generate_run_id() -> String {
    format!("triage-{}-{}", Utc::now().format("%Y%m%d%H%M%S"), Uuid::new_v4().simple())
}

/// 统一的词条规范化：去除首尾空白并转为小写
pub fn normalize_token(token: &str) -> String {
    token.trim().to_lowercase()
}

/// 字段是否为空或仅含空白
pub fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}
