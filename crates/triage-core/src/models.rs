//! 核心数据模型定义

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::taxonomy::SpecialtyLabel;

/// 患者病例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientCase {
    pub id: String,                   // 患者ID
    pub affected_body_part: String,   // 受影响部位
    pub description: String,          // 伤病描述
    pub raw_severity: Option<String>, // 原始严重程度文本
}

/// 标准化后的严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeverityCategory {
    High,
    Medium,
    Low,
    Chronic,
    Unknown,
}

impl SeverityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityCategory::High => "High",
            SeverityCategory::Medium => "Medium",
            SeverityCategory::Low => "Low",
            SeverityCategory::Chronic => "Chronic",
            SeverityCategory::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SeverityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分类结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassificationSource {
    Lexical,         // 本地关键词匹配
    Generative,      // 生成式模型
    GenerativeError, // 生成式模型失败后的兜底
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClassificationSource::Lexical => "Lexical",
            ClassificationSource::Generative => "Generative",
            ClassificationSource::GenerativeError => "GenerativeError",
        };
        f.write_str(name)
    }
}

/// 单个病例的分类结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub specialty: SpecialtyLabel,
    pub source: ClassificationSource,
    /// 兜底时记录的失败原因
    pub failure: Option<String>,
}

impl ClassificationResult {
    pub fn lexical(specialty: SpecialtyLabel) -> Self {
        Self {
            specialty,
            source: ClassificationSource::Lexical,
            failure: None,
        }
    }

    pub fn generative(specialty: SpecialtyLabel) -> Self {
        Self {
            specialty,
            source: ClassificationSource::Generative,
            failure: None,
        }
    }

    pub fn fallback(specialty: SpecialtyLabel, reason: impl Into<String>) -> Self {
        Self {
            specialty,
            source: ClassificationSource::GenerativeError,
            failure: Some(reason.into()),
        }
    }

    /// 是否为生成式失败后的兜底结果
    pub fn is_fallback(&self) -> bool {
        self.source == ClassificationSource::GenerativeError
    }
}

/// 医院信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HospitalRecord {
    pub name: String,
    pub specialties: BTreeSet<SpecialtyLabel>,
    /// 外部提供的繁忙程度，数值越小越空闲
    pub busyness: Option<f64>,
}

impl HospitalRecord {
    pub fn treats(&self, specialty: &SpecialtyLabel) -> bool {
        self.specialties.contains(specialty)
    }
}

/// 关键词规则（配置形式，专科尚未校验）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub specialty: String,
    pub keywords: Vec<String>,
}

/// 严重程度同义词组（配置形式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityGroup {
    pub category: SeverityCategory,
    pub synonyms: Vec<String>,
}

/// 医院能力条目（配置形式，专科尚未校验）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalEntry {
    pub name: String,
    pub specialties: Vec<String>,
}

/// 医院负载记录，来自外部记录源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalLoad {
    pub name: String,
    #[serde(rename = "busy")]
    pub busyness: f64,
}
