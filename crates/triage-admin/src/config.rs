//! 配置管理
//!
//! 内置配置 → 用户配置文件 → 环境变量，逐层覆盖；加载后统一验证

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use triage_core::{
    compile_keyword_rules, HospitalEntry, KeywordRule, SeverityCategory, SeverityGroup,
    SpecialtyTaxonomy,
};

/// 随程序发布的内置配置
const BUILTIN_CONFIG: &str = include_str!("../../../config/triage.toml");

/// 环境变量前缀，例如 `TRIAGE__BATCH__CONCURRENCY=4`
const ENV_PREFIX: &str = "TRIAGE";
const ENV_SEPARATOR: &str = "__";

/// 兼容的 API 密钥环境变量
const LEGACY_KEY_VAR: &str = "GEMINI_KEY";

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: TriageConfig,
}

/// 分诊系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// 标准专科集合
    pub taxonomy: TaxonomyConfig,
    /// 严重程度同义词表
    pub severity: SeverityConfig,
    /// 关键词表
    pub lexical: LexicalConfig,
    /// 医院能力映射
    pub directory: DirectoryConfig,
    /// 分类器参数
    pub classifier: ClassifierConfig,
    /// 生成式模型服务
    pub generative: GenerativeConfig,
    /// 批处理参数
    pub batch: BatchConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 标准专科集合配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    pub version: String,
    pub fallback: String,
    pub specialties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityConfig {
    pub groups: Vec<SeverityGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalConfig {
    pub rules: Vec<KeywordRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub hospitals: Vec<HospitalEntry>,
}

/// 分类器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// 每次升级调用前的最小等待时间（毫秒）
    pub escalation_delay_ms: u64,
    /// 单次生成调用的超时时间（毫秒）
    pub generation_timeout_ms: u64,
    /// 是否按繁忙程度排列候选医院
    pub order_by_busyness: bool,
}

impl ClassifierConfig {
    pub fn escalation_delay(&self) -> Duration {
        Duration::from_millis(self.escalation_delay_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}

/// 生成式模型服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerativeConfig {
    /// 服务地址
    pub endpoint: String,
    /// 模型标识
    pub model: String,
    /// API密钥
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// HTTP请求超时时间（毫秒）
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// 同时处理的病例数
    pub concurrency: usize,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别或过滤指令
    pub level: String,
    /// 日志格式: text 或 json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl TriageConfig {
    /// 只包含内置配置，不读取文件和环境变量
    pub fn builtin() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(BUILTIN_CONFIG, FileFormat::Toml))
            .build()
            .context("Failed to parse built-in configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize built-in configuration")
    }

    /// 构建标准专科集合
    pub fn taxonomy(&self) -> triage_core::Result<SpecialtyTaxonomy> {
        SpecialtyTaxonomy::new(
            &self.taxonomy.version,
            &self.taxonomy.specialties,
            &self.taxonomy.fallback,
        )
    }

    /// 以 TOML 形式输出配置，API 密钥会被隐藏
    pub fn to_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        if redacted.generative.api_key.is_some() {
            redacted.generative.api_key = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&redacted).context("Failed to serialize configuration")
    }
}

impl ConfigManager {
    /// 创建配置管理器，加载并验证配置
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        ConfigValidator::new().validate(&config)?;

        Ok(Self { config })
    }

    /// 加载配置
    pub fn load_config(config_path: Option<&str>) -> Result<TriageConfig> {
        let environment = Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR);
        let mut config = Self::build_config(config_path, environment)?;

        if config.generative.api_key.is_none() {
            config.generative.api_key = std::env::var(LEGACY_KEY_VAR)
                .ok()
                .filter(|key| !key.trim().is_empty());
            if config.generative.api_key.is_some() {
                debug!("Using API key from {}", LEGACY_KEY_VAR);
            }
        }

        match config_path {
            Some(path) => info!("Configuration loaded successfully from: {}", path),
            None => info!("Using built-in configuration"),
        }
        Ok(config)
    }

    fn build_config(config_path: Option<&str>, environment: Environment) -> Result<TriageConfig> {
        let mut builder =
            Config::builder().add_source(File::from_str(BUILTIN_CONFIG, FileFormat::Toml));
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(environment)
            .build()
            .context("Failed to load configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// 获取配置
    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// 检查 API 密钥，只有需要调用生成式模型时才要求
    pub fn require_api_key(&self) -> Result<&str> {
        self.config.generative.api_key.as_deref().with_context(|| {
            format!(
                "{} not set; add it to .env or set {}{}GENERATIVE{}API_KEY",
                LEGACY_KEY_VAR, ENV_PREFIX, ENV_SEPARATOR, ENV_SEPARATOR
            )
        })
    }
}

/// 加载当前目录下的 `.env`，文件不存在时忽略
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Failed to read .env: {}", e),
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&TriageConfig) -> Result<()>,
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "taxonomy",
                validator: |config| {
                    config.taxonomy()?;
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "severity.groups",
                validator: validate_severity,
            },
            ValidationRule {
                field_path: "lexical.rules",
                validator: validate_keywords,
            },
            ValidationRule {
                field_path: "directory.hospitals",
                validator: validate_hospitals,
            },
            ValidationRule {
                field_path: "classifier.generation_timeout_ms",
                validator: |config| {
                    if config.classifier.generation_timeout_ms == 0 {
                        anyhow::bail!("Generation timeout cannot be 0");
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "generative.model",
                validator: |config| {
                    if config.generative.model.trim().is_empty() {
                        anyhow::bail!("Model identifier cannot be empty");
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "batch.concurrency",
                validator: |config| {
                    if config.batch.concurrency == 0 {
                        anyhow::bail!("Batch concurrency must be at least 1");
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "logging.format",
                validator: |config| match config.logging.format.as_str() {
                    "text" | "json" => Ok(()),
                    other => anyhow::bail!("Unknown log format {:?}, expected text or json", other),
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &TriageConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(e.context(format!("Invalid configuration at {}", rule.field_path)));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_severity(config: &TriageConfig) -> Result<()> {
    let mut seen: HashMap<String, SeverityCategory> = HashMap::new();
    for group in &config.severity.groups {
        if group.category == SeverityCategory::Unknown {
            anyhow::bail!("Unknown is the fallback category and cannot have synonyms");
        }
        for synonym in &group.synonyms {
            let key = synonym.trim().to_lowercase();
            if key.is_empty() {
                anyhow::bail!("Blank synonym under {}", group.category);
            }
            if let Some(previous) = seen.insert(key.clone(), group.category) {
                if previous != group.category {
                    anyhow::bail!(
                        "Synonym {:?} maps to both {} and {}",
                        key,
                        previous,
                        group.category
                    );
                }
            }
        }
    }
    Ok(())
}

fn validate_keywords(config: &TriageConfig) -> Result<()> {
    let taxonomy = config.taxonomy()?;
    compile_keyword_rules(&config.lexical.rules, &taxonomy)?;
    Ok(())
}

fn validate_hospitals(config: &TriageConfig) -> Result<()> {
    let taxonomy = config.taxonomy()?;
    let mut names = HashSet::new();

    for hospital in &config.directory.hospitals {
        if !names.insert(hospital.name.as_str()) {
            anyhow::bail!("Hospital {:?} is listed more than once", hospital.name);
        }
        for specialty in &hospital.specialties {
            taxonomy.require(specialty, &format!("hospital map entry {:?}", hospital.name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_with(pairs: &[(&str, &str)]) -> Environment {
        let map: config::Map<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .source(Some(map))
    }

    #[test]
    fn test_builtin_configuration_is_valid() {
        let config = TriageConfig::builtin().unwrap();
        ConfigValidator::new().validate(&config).unwrap();

        let taxonomy = config.taxonomy().unwrap();
        assert_eq!(taxonomy.len(), 24);
        assert_eq!(taxonomy.fallback(), "General/Minor Care");
        assert_eq!(config.directory.hospitals.len(), 14);
        assert_eq!(config.generative.model, "gemini-2.5-flash");
        assert_eq!(config.lexical.rules[0].specialty, "Cardiology");
    }

    #[test]
    fn test_builtin_neurology_keywords_include_seizure() {
        let config = TriageConfig::builtin().unwrap();
        let neurology = config
            .lexical
            .rules
            .iter()
            .find(|rule| rule.specialty == "Neurology")
            .unwrap();
        assert!(neurology.keywords.iter().any(|k| k == "seizure"));
    }

    #[test]
    fn test_user_file_overrides_builtin() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[classifier]\nescalation_delay_ms = 250\ngeneration_timeout_ms = 5000\norder_by_busyness = true\n"
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let config = ConfigManager::build_config(Some(path), env_with(&[])).unwrap();

        assert_eq!(config.classifier.escalation_delay(), Duration::from_millis(250));
        assert!(config.classifier.order_by_busyness);
        // 未覆盖的表来自内置配置
        assert_eq!(config.taxonomy.specialties.len(), 24);
    }

    #[test]
    fn test_environment_overrides_file() {
        let config = ConfigManager::build_config(
            None,
            env_with(&[
                ("TRIAGE__GENERATIVE__MODEL", "gemini-2.5-pro"),
                ("TRIAGE__GENERATIVE__API_KEY", "secret"),
            ]),
        )
        .unwrap();

        assert_eq!(config.generative.model, "gemini-2.5-pro");
        assert_eq!(config.generative.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_missing_user_file_is_an_error() {
        assert!(ConfigManager::build_config(Some("/nonexistent/triage.toml"), env_with(&[])).is_err());
    }

    #[test]
    fn test_validator_rejects_unknown_specialty() {
        let mut config = TriageConfig::builtin().unwrap();
        config.directory.hospitals[0]
            .specialties
            .push("Gynecology/Reproductive".to_string());

        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("directory.hospitals"));
    }

    #[test]
    fn test_validator_rejects_shared_keyword() {
        let mut config = TriageConfig::builtin().unwrap();
        config.lexical.rules[1].keywords.push("Heart".to_string());
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_validator_rejects_keywords_the_matcher_cannot_use() {
        let validator = ConfigValidator::new();

        let mut config = TriageConfig::builtin().unwrap();
        config.lexical.rules[0].keywords.push("heart attack".to_string());
        assert!(validator.validate(&config).is_err());

        let mut config = TriageConfig::builtin().unwrap();
        config.lexical.rules[0].keywords.push("   ".to_string());
        assert!(validator.validate(&config).is_err());

        let mut config = TriageConfig::builtin().unwrap();
        let repeated = KeywordRule {
            specialty: config.lexical.rules[0].specialty.clone(),
            keywords: vec!["palpitations".to_string()],
        };
        config.lexical.rules.push(repeated);
        let err = validator.validate(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("lexical.rules"));
    }

    #[test]
    fn test_validator_rejects_bad_scalars() {
        let validator = ConfigValidator::new();

        let mut config = TriageConfig::builtin().unwrap();
        config.batch.concurrency = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = TriageConfig::builtin().unwrap();
        config.generative.model = "  ".to_string();
        assert!(validator.validate(&config).is_err());

        let mut config = TriageConfig::builtin().unwrap();
        config.logging.format = "xml".to_string();
        assert!(validator.validate(&config).is_err());

        let mut config = TriageConfig::builtin().unwrap();
        config.taxonomy.fallback = "Podiatry".to_string();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_toml_dump_redacts_api_key() {
        let mut config = TriageConfig::builtin().unwrap();
        config.generative.api_key = Some("very-secret".to_string());

        let dumped = config.to_toml().unwrap();
        assert!(!dumped.contains("very-secret"));
        assert!(dumped.contains("<redacted>"));

        let parsed: TriageConfig = toml::from_str(&dumped).unwrap();
        assert_eq!(parsed.directory.hospitals.len(), 14);
    }
}
