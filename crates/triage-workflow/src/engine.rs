//! 分诊引擎
//!
//! 协调严重程度标准化、专科分类和医院目录的核心引擎

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use triage_core::utils::generate_run_id;
use triage_core::{
    ClassificationSource, HospitalEntry, HospitalLoad, KeywordRule,
    PatientCase, Result, SeverityCategory, SeverityGroup, SpecialtyLabel, SpecialtyTaxonomy,
    TextGenerator, TriageError,
};

use crate::classifier::SpecialtyClassifier;
use crate::directory::HospitalDirectory;
use crate::generative::GenerativeSpecialtyResolver;
use crate::lexical::LexicalSpecialtyMatcher;
use crate::severity::{SeverityFilter, SeverityNormalizer};
use crate::throttle::EscalationThrottle;

/// 构建引擎所需的表和参数
#[derive(Debug, Clone)]
pub struct EngineSettings<'a> {
    pub taxonomy: Arc<SpecialtyTaxonomy>,
    pub severity_groups: &'a [SeverityGroup],
    pub keyword_rules: &'a [KeywordRule],
    pub hospitals: &'a [HospitalEntry],
    pub hospital_loads: &'a [HospitalLoad],
    pub model: &'a str,
    pub escalation_delay: Duration,
    pub generation_timeout: Duration,
    pub order_by_busyness: bool,
}

/// 单个病例的分诊结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageReport {
    pub patient_id: String,
    pub affected_body_part: String,
    pub description: String,
    pub severity: SeverityCategory,
    pub specialty: SpecialtyLabel,
    pub source: ClassificationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// `None` 表示没有医院覆盖该专科
    pub hospitals: Option<Vec<String>>,
}

/// 批处理统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub skipped_by_filter: usize,
    pub lexical: usize,
    pub generative: usize,
    pub fallback: usize,
    pub no_hospital: usize,
}

impl BatchSummary {
    fn record(&mut self, report: &TriageReport) {
        match report.source {
            ClassificationSource::Lexical => self.lexical += 1,
            ClassificationSource::Generative => self.generative += 1,
            ClassificationSource::GenerativeError => self.fallback += 1,
        }
        if report.hospitals.is_none() {
            self.no_hospital += 1;
        }
    }

    /// 实际处理的病例数
    pub fn processed(&self) -> usize {
        self.lexical + self.generative + self.fallback
    }
}

/// 一次批处理的结果
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub run_id: String,
    pub reports: Vec<TriageReport>,
    pub summary: BatchSummary,
}

/// 分诊引擎
pub struct TriageEngine {
    taxonomy: Arc<SpecialtyTaxonomy>,
    normalizer: SeverityNormalizer,
    classifier: SpecialtyClassifier,
    directory: HospitalDirectory,
    order_by_busyness: bool,
}

impl TriageEngine {
    /// 创建分诊引擎，任何表与标准专科集合不一致时返回配置错误
    pub fn build(settings: EngineSettings<'_>, generator: Arc<dyn TextGenerator>) -> Result<Self> {
        let normalizer = SeverityNormalizer::new(settings.severity_groups)?;
        let matcher = LexicalSpecialtyMatcher::new(settings.keyword_rules, &settings.taxonomy)?;
        let directory = HospitalDirectory::new(settings.hospitals, &settings.taxonomy)?
            .with_loads(settings.hospital_loads);

        for uncovered in directory.uncovered_specialties(&settings.taxonomy) {
            debug!("No hospital in the directory treats {}", uncovered);
        }

        let resolver = GenerativeSpecialtyResolver::new(
            generator,
            settings.taxonomy.clone(),
            settings.model,
            settings.generation_timeout,
        );
        let throttle = Arc::new(EscalationThrottle::new(settings.escalation_delay));
        let fallback = settings.taxonomy.fallback().clone();
        let classifier = SpecialtyClassifier::new(matcher, resolver, throttle, fallback);

        info!(
            "Triage engine ready: {} specialties, {} keywords, {} hospitals (taxonomy {})",
            settings.taxonomy.len(),
            classifier.matcher().keyword_count(),
            directory.hospitals().len(),
            settings.taxonomy.version()
        );

        Ok(Self {
            taxonomy: settings.taxonomy,
            normalizer,
            classifier,
            directory,
            order_by_busyness: settings.order_by_busyness,
        })
    }

    /// 分诊单个病例
    pub async fn triage_case(&self, case: &PatientCase) -> TriageReport {
        let severity = self.normalizer.normalize_opt(case.raw_severity.as_deref());
        let classification = self.classifier.classify(&case.description).await;
        let hospitals = self.hospitals_for(&classification.specialty);

        if classification.is_fallback() {
            warn!(
                "Patient {} classified by fallback as {}",
                case.id, classification.specialty
            );
        }
        if hospitals.is_none() {
            warn!(
                "No hospital treats {} (patient {})",
                classification.specialty, case.id
            );
        }

        TriageReport {
            patient_id: case.id.clone(),
            affected_body_part: case.affected_body_part.clone(),
            description: case.description.clone(),
            severity,
            specialty: classification.specialty,
            source: classification.source,
            failure: classification.failure,
            hospitals,
        }
    }

    fn hospitals_for(&self, specialty: &SpecialtyLabel) -> Option<Vec<String>> {
        let names = self.directory.hospitals_for(specialty)?;
        if self.order_by_busyness {
            Some(self.directory.order_by_busyness(&names))
        } else {
            Some(names)
        }
    }

    /// 按严重程度筛选病例，保持原顺序
    pub fn filter_cases<'c>(
        &self,
        cases: &'c [PatientCase],
        filter: SeverityFilter,
    ) -> Vec<&'c PatientCase> {
        cases
            .iter()
            .filter(|case| filter.matches(self.normalizer.normalize_opt(case.raw_severity.as_deref())))
            .collect()
    }

    /// 逐个处理病例
    pub async fn triage_batch(&self, cases: &[PatientCase], filter: SeverityFilter) -> BatchOutcome {
        let run_id = generate_run_id();
        let span = info_span!("triage_batch", run_id = %run_id);

        async {
            let selected = self.filter_cases(cases, filter);
            let mut summary = BatchSummary {
                total: cases.len(),
                skipped_by_filter: cases.len() - selected.len(),
                ..Default::default()
            };
            info!(
                "Processing {} of {} cases (filter {:?})",
                selected.len(),
                cases.len(),
                filter
            );

            let mut reports = Vec::with_capacity(selected.len());
            for case in selected {
                let report = self.triage_case(case).await;
                summary.record(&report);
                reports.push(report);
            }

            info!("Batch finished: {:?}", summary);
            BatchOutcome {
                run_id: run_id.clone(),
                reports,
                summary,
            }
        }
        .instrument(span)
        .await
    }

    /// 并发处理病例，同时处理的病例数不超过 `max_concurrency`
    ///
    /// 升级调用仍经过共享节流器，报告按输入顺序返回。
    pub async fn triage_batch_concurrent(
        self: &Arc<Self>,
        cases: Vec<PatientCase>,
        filter: SeverityFilter,
        max_concurrency: usize,
    ) -> Result<BatchOutcome> {
        if max_concurrency == 0 {
            return Err(TriageError::InvalidArgument(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let run_id = generate_run_id();
        let span = info_span!("triage_batch", run_id = %run_id, concurrency = max_concurrency);

        async {
            let total = cases.len();
            let selected: Vec<PatientCase> = cases
                .into_iter()
                .filter(|case| {
                    filter.matches(self.normalizer.normalize_opt(case.raw_severity.as_deref()))
                })
                .collect();
            let mut summary = BatchSummary {
                total,
                skipped_by_filter: total - selected.len(),
                ..Default::default()
            };
            info!(
                "Processing {} of {} cases with up to {} in flight",
                selected.len(),
                total,
                max_concurrency
            );

            let semaphore = Arc::new(Semaphore::new(max_concurrency));
            let mut tasks = JoinSet::new();

            for (index, case) in selected.into_iter().enumerate() {
                let engine = Arc::clone(self);
                let semaphore = Arc::clone(&semaphore);
                tasks.spawn(
                    async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| TriageError::Internal(e.to_string()))?;
                        Ok::<_, TriageError>((index, engine.triage_case(&case).await))
                    }
                    .in_current_span(),
                );
            }

            let mut indexed = Vec::with_capacity(tasks.len());
            while let Some(joined) = tasks.join_next().await {
                let (index, report) =
                    joined.map_err(|e| TriageError::Internal(format!("triage task failed: {}", e)))??;
                indexed.push((index, report));
            }
            indexed.sort_by_key(|(index, _)| *index);

            let reports: Vec<TriageReport> = indexed.into_iter().map(|(_, report)| report).collect();
            for report in &reports {
                summary.record(report);
            }

            info!("Batch finished: {:?}", summary);
            Ok(BatchOutcome {
                run_id: run_id.clone(),
                reports,
                summary,
            })
        }
        .instrument(span)
        .await
    }

    pub fn taxonomy(&self) -> &SpecialtyTaxonomy {
        &self.taxonomy
    }

    pub fn directory(&self) -> &HospitalDirectory {
        &self.directory
    }

    /// 已发生的生成式升级次数
    pub fn escalations(&self) -> u64 {
        self.classifier.escalations()
    }
}
