//! 关键词表校验
//!
//! 配置验证和关键词匹配器共用同一套规则。

use std::collections::{HashMap, HashSet};

use crate::error::{Result, TriageError};
use crate::models::KeywordRule;
use crate::taxonomy::{SpecialtyLabel, SpecialtyTaxonomy};
use crate::utils::normalize_token;

/// 已校验的专科关键词规则，关键词已标准化为小写
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledKeywordRule {
    pub specialty: SpecialtyLabel,
    pub keywords: HashSet<String>,
}

/// 校验关键词表并保持表顺序
///
/// 专科必须属于标准集合且只出现一次；同一关键词不能出现在两个专科下；
/// 含空白的关键词永远无法与单个词匹配，视为配置错误。
pub fn compile_keyword_rules(
    rules: &[KeywordRule],
    taxonomy: &SpecialtyTaxonomy,
) -> Result<Vec<CompiledKeywordRule>> {
    let mut compiled: Vec<CompiledKeywordRule> = Vec::with_capacity(rules.len());
    let mut owners: HashMap<String, SpecialtyLabel> = HashMap::new();

    for rule in rules {
        let specialty = taxonomy.require(&rule.specialty, "keyword table")?;
        if compiled.iter().any(|c| c.specialty == specialty) {
            return Err(TriageError::Configuration(format!(
                "keyword table lists specialty {:?} more than once",
                rule.specialty
            )));
        }

        let mut keywords = HashSet::new();
        for keyword in &rule.keywords {
            let keyword = normalize_token(keyword);
            if keyword.is_empty() || keyword.contains(char::is_whitespace) {
                return Err(TriageError::Configuration(format!(
                    "keyword {:?} under {} must be a single non-blank token",
                    keyword, specialty
                )));
            }
            if let Some(owner) = owners.get(&keyword) {
                if *owner != specialty {
                    return Err(TriageError::Configuration(format!(
                        "keyword {:?} is listed under both {} and {}",
                        keyword, owner, specialty
                    )));
                }
            }
            owners.insert(keyword.clone(), specialty.clone());
            keywords.insert(keyword);
        }

        compiled.push(CompiledKeywordRule { specialty, keywords });
    }

    Ok(compiled)
}
