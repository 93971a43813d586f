//! 分诊命令行程序

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use triage_admin::{
    init_tracing, load_dotenv, startup_subscriber, ConfigManager, TriageConfig,
};
use triage_core::{GenerativeError, HospitalLoad, PatientCase, TextGenerator};
use triage_integration::{GeminiConfig, GeminiConnector, JsonRecordSource, RecordSource};
use triage_workflow::{BatchOutcome, EngineSettings, SeverityFilter, TriageEngine, TriageReport};

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// 分诊命令行参数
#[derive(Parser, Debug)]
#[command(name = "triage")]
#[command(about = "根据病情描述分诊到医学专科并推荐医院")]
struct Args {
    /// 配置文件路径，覆盖内置配置
    #[arg(short, long)]
    config: Option<String>,

    /// 病例 JSON 文件
    #[arg(long)]
    cases: Option<PathBuf>,

    /// 医院负载 JSON 文件
    #[arg(long)]
    hospitals: Option<PathBuf>,

    /// 严重程度筛选: all, low, medium, high, chronic
    #[arg(short, long, default_value = "all")]
    severity: String,

    /// 按繁忙程度排列候选医院
    #[arg(long)]
    by_busyness: bool,

    /// 输出格式
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,

    /// 同时处理的病例数
    #[arg(long)]
    concurrency: Option<usize>,

    /// 输出生效的配置后退出
    #[arg(long)]
    dump_config: bool,

    /// 直接分类的病情描述
    descriptions: Vec<String>,
}

/// 未配置 API 密钥时使用，所有升级都以兜底专科结束
struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, _prompt: &str, _model: &str) -> Result<String, GenerativeError> {
        Err(GenerativeError::Transport(
            "no API key configured for the generative model".to_string(),
        ))
    }
}

fn build_generator(manager: &ConfigManager) -> Result<Arc<dyn TextGenerator>> {
    let config = manager.config();
    match manager.require_api_key() {
        Ok(api_key) => {
            let connector = GeminiConnector::new(GeminiConfig {
                endpoint: config.generative.endpoint.clone(),
                api_key: api_key.to_string(),
                request_timeout: std::time::Duration::from_millis(
                    config.generative.request_timeout_ms,
                ),
            })?;
            Ok(Arc::new(connector))
        }
        Err(e) => {
            warn!("{:#}; descriptions without a keyword match will use the fallback specialty", e);
            Ok(Arc::new(OfflineGenerator))
        }
    }
}

fn build_engine(
    config: &TriageConfig,
    loads: &[HospitalLoad],
    order_by_busyness: bool,
    generator: Arc<dyn TextGenerator>,
) -> Result<TriageEngine> {
    let taxonomy = Arc::new(config.taxonomy()?);
    let settings = EngineSettings {
        taxonomy,
        severity_groups: &config.severity.groups,
        keyword_rules: &config.lexical.rules,
        hospitals: &config.directory.hospitals,
        hospital_loads: loads,
        model: &config.generative.model,
        escalation_delay: config.classifier.escalation_delay(),
        generation_timeout: config.classifier.generation_timeout(),
        order_by_busyness,
    };
    TriageEngine::build(settings, generator).context("Failed to build triage engine")
}

fn print_report(report: &TriageReport) {
    println!("[{}] {}", report.patient_id, report.description);
    println!(
        "  严重程度: {}  专科: {} ({})",
        report.severity, report.specialty, report.source
    );
    if let Some(reason) = &report.failure {
        println!("  兜底原因: {}", reason);
    }
    match &report.hospitals {
        Some(hospitals) => println!("  医院: {}", hospitals.join(", ")),
        None => println!("  医院: 无"),
    }
}

fn print_outcome(outcome: &BatchOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(outcome).context("Failed to serialize reports")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for report in &outcome.reports {
                print_report(report);
            }
            let summary = &outcome.summary;
            println!(
                "共 {} 例，处理 {} 例: 关键词 {}，生成式 {}，兜底 {}，无医院 {}",
                summary.total,
                summary.processed(),
                summary.lexical,
                summary.generative,
                summary.fallback,
                summary.no_hospital
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 配置加载期间先使用临时订阅者，验证失败的原因也会输出
    let startup = startup_subscriber(args.log_level.as_deref())?;
    let manager = tracing::subscriber::with_default(startup, || {
        load_dotenv();
        ConfigManager::new(args.config.as_deref())
    })?;
    let config = manager.config();

    // 初始化日志
    init_tracing(&config.logging, args.log_level.as_deref())?;

    if args.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if args.cases.is_none() && args.descriptions.is_empty() {
        anyhow::bail!("nothing to triage: pass --cases <FILE> or one or more descriptions");
    }

    let filter: SeverityFilter = args.severity.parse()?;
    let concurrency = args.concurrency.unwrap_or(config.batch.concurrency);
    let order_by_busyness = args.by_busyness || config.classifier.order_by_busyness;

    info!("启动分诊...");
    info!("  模型: {}", config.generative.model);
    info!("  严重程度筛选: {:?}", filter);
    info!("  并发数: {}", concurrency);

    let source = args
        .cases
        .as_ref()
        .map(|cases| JsonRecordSource::new(cases, args.hospitals.as_deref()));

    let loads = match &source {
        Some(source) => source.hospital_loads().await?,
        None => Vec::new(),
    };
    if order_by_busyness && loads.is_empty() {
        warn!("繁忙程度数据不可用，医院保持目录顺序");
    }

    let generator = build_generator(&manager)?;
    let engine = Arc::new(build_engine(config, &loads, order_by_busyness, generator)?);

    if let Some(source) = &source {
        let report = source.patient_records().await?;
        for rejected in &report.rejected {
            warn!("记录被拒绝: {}", rejected);
        }

        let outcome = if concurrency > 1 {
            engine
                .triage_batch_concurrent(report.records, filter, concurrency)
                .await?
        } else {
            engine.triage_batch(&report.records, filter).await
        };
        print_outcome(&outcome, args.format)?;
    }

    if !args.descriptions.is_empty() {
        let cases: Vec<PatientCase> = args
            .descriptions
            .iter()
            .enumerate()
            .map(|(index, description)| PatientCase {
                id: format!("#{}", index + 1),
                affected_body_part: String::new(),
                description: description.clone(),
                raw_severity: None,
            })
            .collect();

        let outcome = engine.triage_batch(&cases, SeverityFilter::All).await;
        print_outcome(&outcome, args.format)?;
    }

    info!("分诊完成，生成式升级 {} 次", engine.escalations());
    Ok(())
}
