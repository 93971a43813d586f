//! 病例与医院负载记录源
//!
//! 病例文件中的每条记录单独校验，无效记录只记入加载报告，不影响其余记录。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use triage_core::utils::is_blank;
use triage_core::{HospitalLoad, PatientCase, Result, TriageError};

/// 加载报告
#[derive(Debug, Default)]
pub struct LoadReport {
    pub records: Vec<PatientCase>,
    /// 被拒绝的记录，均为 `TriageError::Validation`
    pub rejected: Vec<TriageError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// 记录源接口
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// 读取病例记录
    async fn patient_records(&self) -> Result<LoadReport>;

    /// 读取医院负载；数据不可用时返回空列表
    async fn hospital_loads(&self) -> Result<Vec<HospitalLoad>>;
}

/// 病例文件中的原始记录
#[derive(Debug, Deserialize)]
struct RawPatientRecord {
    #[serde(rename = "PatientID")]
    patient_id: Option<Value>,
    #[serde(rename = "AffectedBodyPart")]
    affected_body_part: Option<String>,
    #[serde(rename = "Injury/Sickness")]
    description: Option<String>,
    #[serde(rename = "Severity")]
    severity: Option<Value>,
}

impl RawPatientRecord {
    fn into_case(self, index: usize) -> Result<PatientCase> {
        let id = match self.patient_id {
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        if is_blank(id.as_deref()) {
            return Err(TriageError::Validation(format!(
                "record {} has no PatientID",
                index
            )));
        }
        let id = id.unwrap_or_default().trim().to_string();

        if is_blank(self.description.as_deref()) {
            return Err(TriageError::Validation(format!(
                "record {} (patient {}) has no Injury/Sickness",
                index, id
            )));
        }

        // 非字符串的严重程度视为缺失，后续标准化为 Unknown
        let raw_severity = match self.severity {
            Some(Value::String(severity)) => Some(severity),
            _ => None,
        };

        Ok(PatientCase {
            id,
            affected_body_part: self.affected_body_part.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            raw_severity,
        })
    }
}

/// 解析病例 JSON 数组
pub fn parse_patient_records(content: &str) -> Result<LoadReport> {
    let values: Vec<Value> = serde_json::from_str(content)?;
    let mut report = LoadReport::default();

    for (index, value) in values.into_iter().enumerate() {
        let parsed = serde_json::from_value::<RawPatientRecord>(value)
            .map_err(|e| TriageError::Validation(format!("record {}: {}", index, e)))
            .and_then(|raw| raw.into_case(index));

        match parsed {
            Ok(case) => report.records.push(case),
            Err(e) => {
                warn!("Skipping patient record: {}", e);
                report.rejected.push(e);
            }
        }
    }

    Ok(report)
}

/// 解析医院负载 JSON 数组，无效条目被跳过
pub fn parse_hospital_loads(content: &str) -> Result<Vec<HospitalLoad>> {
    let values: Vec<Value> = serde_json::from_str(content)?;

    Ok(values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<HospitalLoad>(value) {
            Ok(load) => Some(load),
            Err(e) => {
                warn!("Skipping hospital record {}: {}", index, e);
                None
            }
        })
        .collect())
}

/// JSON 文件记录源
#[derive(Debug, Clone)]
pub struct JsonRecordSource {
    patients_path: PathBuf,
    hospitals_path: Option<PathBuf>,
}

impl JsonRecordSource {
    pub fn new(patients_path: impl AsRef<Path>, hospitals_path: Option<&Path>) -> Self {
        Self {
            patients_path: patients_path.as_ref().to_path_buf(),
            hospitals_path: hospitals_path.map(Path::to_path_buf),
        }
    }
}

#[async_trait]
impl RecordSource for JsonRecordSource {
    async fn patient_records(&self) -> Result<LoadReport> {
        let content = tokio::fs::read_to_string(&self.patients_path).await?;
        let report = parse_patient_records(&content)?;

        info!(
            "Loaded {} patient records from {} ({} rejected)",
            report.records.len(),
            self.patients_path.display(),
            report.rejected.len()
        );
        Ok(report)
    }

    async fn hospital_loads(&self) -> Result<Vec<HospitalLoad>> {
        let Some(path) = &self.hospitals_path else {
            return Ok(Vec::new());
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let loads = parse_hospital_loads(&content)?;
                info!("Loaded {} hospital loads from {}", loads.len(), path.display());
                Ok(loads)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Hospital file {} not found, busyness unavailable",
                    path.display()
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}
