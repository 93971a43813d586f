//! 标准专科分类表
//!
//! 关键词匹配器、生成式提示词约束和医院目录共享同一份专科列表，
//! 三者之间按字符串完全相等匹配。

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::error::{Result, TriageError};

/// 标准专科标签
///
/// 只能通过 [`SpecialtyTaxonomy`] 构造，因此任何 `SpecialtyLabel` 都属于标准集合。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SpecialtyLabel(String);

impl SpecialtyLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpecialtyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SpecialtyLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for SpecialtyLabel {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SpecialtyLabel {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// 带版本号的标准专科集合
#[derive(Debug, Clone)]
pub struct SpecialtyTaxonomy {
    version: String,
    labels: Vec<SpecialtyLabel>,
    fallback: SpecialtyLabel,
}

impl SpecialtyTaxonomy {
    /// 创建分类表，`fallback` 为生成式调用失败时使用的兜底专科
    pub fn new<S: AsRef<str>>(version: &str, names: &[S], fallback: &str) -> Result<Self> {
        if names.is_empty() {
            return Err(TriageError::Configuration(
                "standard specialty list is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut labels = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if name.trim().is_empty() || name.trim() != name {
                return Err(TriageError::Configuration(format!(
                    "specialty name {:?} is blank or carries surrounding whitespace",
                    name
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(TriageError::Configuration(format!(
                    "specialty {:?} is listed more than once",
                    name
                )));
            }
            labels.push(SpecialtyLabel(name.to_string()));
        }

        let fallback = labels
            .iter()
            .find(|label| label.as_str() == fallback)
            .cloned()
            .ok_or_else(|| {
                TriageError::Configuration(format!(
                    "fallback specialty {:?} is not in the standard list",
                    fallback
                ))
            })?;

        tracing::debug!(
            "Loaded specialty taxonomy {} with {} labels",
            version,
            labels.len()
        );
        Ok(Self {
            version: version.to_string(),
            labels,
            fallback,
        })
    }

    /// 按完全相等查找标签
    pub fn label(&self, name: &str) -> Option<SpecialtyLabel> {
        self.labels.iter().find(|label| label.as_str() == name).cloned()
    }

    /// 查找标签，不存在时返回配置错误；`context` 说明引用来源
    pub fn require(&self, name: &str, context: &str) -> Result<SpecialtyLabel> {
        self.label(name).ok_or_else(|| {
            TriageError::Configuration(format!(
                "{} references unknown specialty {:?} (taxonomy version {})",
                context, name, self.version
            ))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label.as_str() == name)
    }

    /// 全部标签，保持配置中的顺序
    pub fn labels(&self) -> &[SpecialtyLabel] {
        &self.labels
    }

    pub fn fallback(&self) -> &SpecialtyLabel {
        &self.fallback
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> SpecialtyTaxonomy {
        SpecialtyTaxonomy::new(
            "test",
            &["Cardiology", "Neurology", "General/Minor Care"],
            "General/Minor Care",
        )
        .unwrap()
    }

    #[test]
    fn test_label_lookup_is_exact() {
        let taxonomy = taxonomy();
        assert_eq!(taxonomy.label("Neurology").unwrap(), "Neurology");
        assert!(taxonomy.label("neurology").is_none());
        assert!(taxonomy.label(" Neurology").is_none());
        assert_eq!(taxonomy.fallback().as_str(), "General/Minor Care");
        assert_eq!(taxonomy.len(), 3);
    }

    #[test]
    fn test_rejects_inconsistent_lists() {
        assert!(SpecialtyTaxonomy::new::<&str>("v", &[], "X").is_err());
        assert!(SpecialtyTaxonomy::new("v", &["A", "A"], "A").is_err());
        assert!(SpecialtyTaxonomy::new("v", &["A", " B"], "A").is_err());

        let err = SpecialtyTaxonomy::new("v", &["A", "B"], "C").unwrap_err();
        assert!(matches!(err, TriageError::Configuration(_)));
    }

    #[test]
    fn test_require_reports_context() {
        let taxonomy = taxonomy();
        let err = taxonomy.require("Gynecology/Reproductive", "keyword table").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("keyword table"));
        assert!(message.contains("Gynecology/Reproductive"));
    }
}
