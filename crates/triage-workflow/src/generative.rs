//! 生成式专科解析器
//!
//! 构造限定在标准专科列表内的提示词，调用外部文本生成能力，
//! 并只接受标准集合中的专科名称。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use triage_core::{GenerativeError, SpecialtyLabel, SpecialtyTaxonomy, TextGenerator};

const PROMPT_ROLE: &str = "You are an expert medical triage assistant. \
Classify the patient's injury or illness description into exactly one of the following medical specialties:";

const PROMPT_INSTRUCTION: &str = "Respond with ONLY the name of the chosen specialty, \
written exactly as it appears in the list above, and nothing else.";

/// JSON 形式回答中的专科字段
const SPECIALTY_FIELD: &str = "medical_specialty";

/// 构造分类提示词
pub fn build_prompt(taxonomy: &SpecialtyTaxonomy, description: &str) -> String {
    let mut prompt = String::with_capacity(512 + description.len());
    prompt.push_str(PROMPT_ROLE);
    prompt.push('\n');
    for label in taxonomy.labels() {
        prompt.push_str("- ");
        prompt.push_str(label.as_str());
        prompt.push('\n');
    }
    prompt.push_str("\nPatient Injury Description: '");
    prompt.push_str(description.trim());
    prompt.push_str("'\n\n");
    prompt.push_str(PROMPT_INSTRUCTION);
    prompt
}

/// 生成式专科解析器
pub struct GenerativeSpecialtyResolver {
    generator: Arc<dyn TextGenerator>,
    taxonomy: Arc<SpecialtyTaxonomy>,
    model: String,
    timeout: Duration,
}

impl GenerativeSpecialtyResolver {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        taxonomy: Arc<SpecialtyTaxonomy>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            taxonomy,
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 解析专科，所有失败都以 `GenerativeError` 返回
    pub async fn resolve(&self, description: &str) -> Result<SpecialtyLabel, GenerativeError> {
        let prompt = build_prompt(&self.taxonomy, description);
        debug!(
            "Escalating to generator {} with model {}",
            self.generator.name(),
            self.model
        );

        let response = tokio::time::timeout(self.timeout, self.generator.generate(&prompt, &self.model))
            .await
            .map_err(|_| GenerativeError::Timeout(self.timeout.as_millis() as u64))??;

        let label = self.interpret(&response);
        if let Err(e) = &label {
            warn!("Generator {} returned unusable output: {}", self.generator.name(), e);
        }
        label
    }

    /// 将模型输出解释为标准专科
    pub fn interpret(&self, response: &str) -> Result<SpecialtyLabel, GenerativeError> {
        let text = strip_code_fence(response.trim());
        if text.is_empty() {
            return Err(GenerativeError::EmptyResponse);
        }

        let candidate = if text.starts_with('{') {
            let value: serde_json::Value =
                serde_json::from_str(text).map_err(|e| GenerativeError::Parse(e.to_string()))?;
            value
                .get(SPECIALTY_FIELD)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    GenerativeError::Parse(format!("missing string field {:?}", SPECIALTY_FIELD))
                })?
        } else {
            text.to_string()
        };

        let candidate = clean_label(&candidate);
        if candidate.is_empty() {
            return Err(GenerativeError::EmptyResponse);
        }

        self.taxonomy
            .label(candidate)
            .ok_or_else(|| GenerativeError::UnrecognizedLabel(candidate.to_string()))
    }
}

/// 去掉 ``` 或 ```json 包裹
fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// 去掉首尾空白、包裹的引号或反引号以及结尾句点
fn clean_label(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_suffix('.').unwrap_or(text).trim();
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim()
}
