//! 关键词专科匹配器
//!
//! 从描述中提取名词短语中心词和空白切分词，按专科表顺序逐一比对关键词，
//! 第一个命中的专科即为结果。不调用任何外部服务。

use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

use triage_core::utils::normalize_token;
use triage_core::{
    compile_keyword_rules, CompiledKeywordRule, KeywordRule, Result, SpecialtyLabel,
    SpecialtyTaxonomy, TriageError,
};

/// 短语切分接口，返回每个名词短语的中心词
pub trait PhraseChunker: Send + Sync {
    fn chunk_heads(&self, text: &str) -> Vec<String>;
}

/// 断开短语的功能词：介词、连词、限定词、代词和助动词
const BOUNDARY_WORDS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "some", "any", "no",
    "of", "with", "without", "in", "into", "on", "onto", "at", "to", "from", "for", "by",
    "after", "before", "since", "during", "due", "over", "under", "near", "following",
    "and", "or", "but", "nor", "because", "while", "as", "than", "via", "per",
    "his", "her", "their", "my", "your", "its", "our",
    "he", "she", "it", "they", "we", "i", "you", "which", "who", "whom",
    "is", "was", "are", "were", "be", "been", "has", "have", "had", "not",
];

/// 基于规则的名词短语切分器
///
/// 词为字母、数字以及词内撇号或连字符的最长序列；遇到标点或功能词时结束当前短语，
/// 短语的最后一个词作为中心词。
#[derive(Debug)]
pub struct HeuristicChunker {
    word_pattern: Regex,
    boundary_words: HashSet<&'static str>,
}

impl HeuristicChunker {
    pub fn new() -> Result<Self> {
        let word_pattern = Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+)*")
            .map_err(|e| TriageError::Internal(format!("invalid word pattern: {}", e)))?;

        Ok(Self {
            word_pattern,
            boundary_words: BOUNDARY_WORDS.iter().copied().collect(),
        })
    }
}

impl PhraseChunker for HeuristicChunker {
    fn chunk_heads(&self, text: &str) -> Vec<String> {
        let mut heads = Vec::new();
        let mut current: Option<String> = None;
        let mut last_end = 0;

        for word in self.word_pattern.find_iter(text) {
            let gap = &text[last_end..word.start()];
            if gap.chars().any(|c| !c.is_whitespace()) {
                heads.extend(current.take());
            }
            last_end = word.end();

            let lower = word.as_str().to_lowercase();
            if self.boundary_words.contains(lower.as_str()) {
                heads.extend(current.take());
            } else {
                current = Some(lower);
            }
        }
        heads.extend(current);

        heads
    }
}

/// 关键词专科匹配器
pub struct LexicalSpecialtyMatcher {
    rules: Vec<CompiledKeywordRule>,
    chunker: Box<dyn PhraseChunker>,
}

impl LexicalSpecialtyMatcher {
    /// 使用默认切分器创建匹配器
    pub fn new(rules: &[KeywordRule], taxonomy: &SpecialtyTaxonomy) -> Result<Self> {
        Self::with_chunker(rules, taxonomy, Box::new(HeuristicChunker::new()?))
    }

    /// 使用指定切分器创建匹配器，关键词表按 `compile_keyword_rules` 校验
    pub fn with_chunker(
        rules: &[KeywordRule],
        taxonomy: &SpecialtyTaxonomy,
        chunker: Box<dyn PhraseChunker>,
    ) -> Result<Self> {
        Ok(Self {
            rules: compile_keyword_rules(rules, taxonomy)?,
            chunker,
        })
    }

    /// 候选词集合：短语中心词与空白切分词的并集
    pub fn candidate_tokens(&self, description: &str) -> HashSet<String> {
        let mut tokens: HashSet<String> = self
            .chunker
            .chunk_heads(description)
            .iter()
            .map(|head| normalize_token(head))
            .collect();

        tokens.extend(
            description
                .to_lowercase()
                .split_whitespace()
                .map(normalize_token),
        );
        tokens.retain(|token| !token.is_empty());
        tokens
    }

    /// 匹配专科，按专科表顺序返回第一个命中的专科；未命中返回 `None`
    pub fn match_specialty(&self, description: &str) -> Option<SpecialtyLabel> {
        let candidates = self.candidate_tokens(description);

        for rule in &self.rules {
            if let Some(token) = candidates.iter().find(|token| rule.keywords.contains(*token)) {
                debug!("Lexical hit on {:?} -> {}", token, rule.specialty);
                return Some(rule.specialty.clone());
            }
        }

        debug!("Lexical miss for {:?}", description);
        None
    }

    /// 专科表顺序
    pub fn specialties(&self) -> impl Iterator<Item = &SpecialtyLabel> {
        self.rules.iter().map(|rule| &rule.specialty)
    }

    pub fn keyword_count(&self) -> usize {
        self.rules.iter().map(|rule| rule.keywords.len()).sum()
    }
}

impl std::fmt::Debug for LexicalSpecialtyMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalSpecialtyMatcher")
            .field("specialties", &self.rules.len())
            .field("keywords", &self.keyword_count())
            .finish()
    }
}
