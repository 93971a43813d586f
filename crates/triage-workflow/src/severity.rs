//! 严重程度标准化
//!
//! 将自由文本的严重程度映射到固定的分类集合，用于筛选和分诊，与专科分类无关。

use std::collections::HashMap;
use std::str::FromStr;

use triage_core::utils::normalize_token;
use triage_core::{Result, SeverityCategory, SeverityGroup, TriageError};

/// 严重程度标准化器
#[derive(Debug, Clone)]
pub struct SeverityNormalizer {
    table: HashMap<String, SeverityCategory>,
}

impl SeverityNormalizer {
    /// 由同义词组创建标准化器
    ///
    /// 同一个同义词不能出现在两个不同的分类中，`Unknown` 不能作为目标分类。
    pub fn new(groups: &[SeverityGroup]) -> Result<Self> {
        let mut table = HashMap::new();

        for group in groups {
            if group.category == SeverityCategory::Unknown {
                return Err(TriageError::Configuration(
                    "severity synonyms cannot map to Unknown".to_string(),
                ));
            }
            for synonym in &group.synonyms {
                let key = normalize_token(synonym);
                if key.is_empty() {
                    return Err(TriageError::Configuration(format!(
                        "blank severity synonym under {}",
                        group.category
                    )));
                }
                if let Some(existing) = table.insert(key.clone(), group.category) {
                    if existing != group.category {
                        return Err(TriageError::Configuration(format!(
                            "severity synonym {:?} maps to both {} and {}",
                            key, existing, group.category
                        )));
                    }
                }
            }
        }

        Ok(Self { table })
    }

    /// 标准化严重程度，未知值返回 `Unknown`
    pub fn normalize(&self, raw: &str) -> SeverityCategory {
        self.table
            .get(&normalize_token(raw))
            .copied()
            .unwrap_or(SeverityCategory::Unknown)
    }

    /// 字段缺失时同样返回 `Unknown`
    pub fn normalize_opt(&self, raw: Option<&str>) -> SeverityCategory {
        raw.map(|value| self.normalize(value))
            .unwrap_or(SeverityCategory::Unknown)
    }
}

/// 按严重程度筛选病例
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityFilter {
    All,
    Low,
    Medium,
    High,
    Chronic,
}

impl SeverityFilter {
    pub fn matches(&self, category: SeverityCategory) -> bool {
        match self {
            SeverityFilter::All => true,
            SeverityFilter::Low => category == SeverityCategory::Low,
            SeverityFilter::Medium => category == SeverityCategory::Medium,
            SeverityFilter::High => category == SeverityCategory::High,
            SeverityFilter::Chronic => category == SeverityCategory::Chronic,
        }
    }
}

impl FromStr for SeverityFilter {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_token(s).as_str() {
            "all" => Ok(SeverityFilter::All),
            "low" => Ok(SeverityFilter::Low),
            "medium" => Ok(SeverityFilter::Medium),
            "high" => Ok(SeverityFilter::High),
            "chronic" => Ok(SeverityFilter::Chronic),
            other => Err(TriageError::InvalidArgument(format!(
                "unknown severity filter {:?}, expected all, low, medium, high or chronic",
                other
            ))),
        }
    }
}

impl Default for SeverityFilter {
    fn default() -> Self {
        SeverityFilter::All
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups() -> Vec<SeverityGroup> {
        vec![
            SeverityGroup {
                category: SeverityCategory::High,
                synonyms: vec![
                    "critical".into(),
                    "severe".into(),
                    "serious".into(),
                    "life-threatening".into(),
                ],
            },
            SeverityGroup {
                category: SeverityCategory::Medium,
                synonyms: vec!["moderate".into()],
            },
            SeverityGroup {
                category: SeverityCategory::Low,
                synonyms: vec!["low".into(), "mild".into(), "minor".into()],
            },
            SeverityGroup {
                category: SeverityCategory::Chronic,
                synonyms: vec!["chronic".into(), "stable".into(), "chronic/stable".into()],
            },
        ]
    }

    #[test]
    fn test_normalize_ignores_case_and_whitespace() {
        let normalizer = SeverityNormalizer::new(&groups()).unwrap();
        assert_eq!(normalizer.normalize("  Critical "), SeverityCategory::High);
        assert_eq!(normalizer.normalize("critical"), SeverityCategory::High);
        assert_eq!(normalizer.normalize("CRITICAL"), SeverityCategory::High);
        assert_eq!(normalizer.normalize("Life-Threatening"), SeverityCategory::High);
        assert_eq!(normalizer.normalize("moderate"), SeverityCategory::Medium);
        assert_eq!(normalizer.normalize("Mild"), SeverityCategory::Low);
        assert_eq!(normalizer.normalize("Chronic/Stable"), SeverityCategory::Chronic);
        assert_eq!(normalizer.normalize("stable"), SeverityCategory::Chronic);
    }

    #[test]
    fn test_unknown_values_never_error() {
        let normalizer = SeverityNormalizer::new(&groups()).unwrap();
        assert_eq!(normalizer.normalize(""), SeverityCategory::Unknown);
        assert_eq!(normalizer.normalize("   "), SeverityCategory::Unknown);
        assert_eq!(normalizer.normalize("catastrophic"), SeverityCategory::Unknown);
        assert_eq!(normalizer.normalize_opt(None), SeverityCategory::Unknown);
        assert_eq!(normalizer.normalize_opt(Some("severe")), SeverityCategory::High);
    }

    #[test]
    fn test_conflicting_synonyms_rejected() {
        let mut groups = groups();
        groups.push(SeverityGroup {
            category: SeverityCategory::Low,
            synonyms: vec!["Severe".into()],
        });
        assert!(SeverityNormalizer::new(&groups).is_err());

        let unknown = vec![SeverityGroup {
            category: SeverityCategory::Unknown,
            synonyms: vec!["n/a".into()],
        }];
        assert!(SeverityNormalizer::new(&unknown).is_err());
    }

    #[test]
    fn test_severity_filter() {
        assert_eq!("HIGH".parse::<SeverityFilter>().unwrap(), SeverityFilter::High);
        assert_eq!("all".parse::<SeverityFilter>().unwrap(), SeverityFilter::All);
        assert!("urgent".parse::<SeverityFilter>().is_err());

        assert!(SeverityFilter::All.matches(SeverityCategory::Unknown));
        assert!(SeverityFilter::Chronic.matches(SeverityCategory::Chronic));
        assert!(!SeverityFilter::High.matches(SeverityCategory::Medium));
    }
}
