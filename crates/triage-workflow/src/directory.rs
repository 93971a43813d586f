//! 医院目录
//!
//! 静态的专科与医院能力映射，以及按繁忙程度排序

use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

use triage_core::{
    HospitalEntry, HospitalLoad, HospitalRecord, Result, SpecialtyLabel, SpecialtyTaxonomy,
    TriageError,
};

/// 医院目录
#[derive(Debug, Clone)]
pub struct HospitalDirectory {
    hospitals: Vec<HospitalRecord>,
}

impl HospitalDirectory {
    /// 创建医院目录，所有专科必须属于标准集合，医院名称不能重复
    pub fn new(entries: &[HospitalEntry], taxonomy: &SpecialtyTaxonomy) -> Result<Self> {
        let mut names = HashSet::new();
        let mut hospitals = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.name.trim().is_empty() {
                return Err(TriageError::Configuration(
                    "hospital map contains a blank hospital name".to_string(),
                ));
            }
            if !names.insert(entry.name.clone()) {
                return Err(TriageError::Configuration(format!(
                    "hospital {:?} is listed more than once",
                    entry.name
                )));
            }

            let context = format!("hospital map entry {:?}", entry.name);
            let specialties = entry
                .specialties
                .iter()
                .map(|name| taxonomy.require(name, &context))
                .collect::<Result<BTreeSet<SpecialtyLabel>>>()?;

            hospitals.push(HospitalRecord {
                name: entry.name.clone(),
                specialties,
                busyness: None,
            });
        }

        Ok(Self { hospitals })
    }

    /// 合并外部提供的繁忙程度，目录中不存在的医院会被忽略
    pub fn with_loads(mut self, loads: &[HospitalLoad]) -> Self {
        for load in loads {
            match self.hospitals.iter_mut().find(|h| h.name == load.name) {
                Some(hospital) if load.busyness.is_finite() => {
                    hospital.busyness = Some(load.busyness);
                }
                Some(_) => warn!("Ignoring non-finite busyness for {}", load.name),
                None => warn!("Busyness reported for unknown hospital {}", load.name),
            }
        }
        self
    }

    /// 查询能够治疗该专科的医院，按目录顺序返回；没有医院时返回 `None`
    pub fn hospitals_for(&self, specialty: &SpecialtyLabel) -> Option<Vec<String>> {
        let matching: Vec<String> = self
            .hospitals
            .iter()
            .filter(|hospital| hospital.treats(specialty))
            .map(|hospital| hospital.name.clone())
            .collect();

        debug!("{} hospitals treat {}", matching.len(), specialty);

        if matching.is_empty() {
            None
        } else {
            Some(matching)
        }
    }

    /// 按繁忙程度升序排列医院名称
    ///
    /// 没有繁忙程度的医院排在最后并保持原顺序；繁忙数据不可用或输入为空时原样返回。
    pub fn order_by_busyness(&self, names: &[String]) -> Vec<String> {
        if names.is_empty() || !self.has_busyness() {
            return names.to_vec();
        }

        let mut ranked: Vec<(Option<f64>, &String)> = names
            .iter()
            .map(|name| (self.busyness_of(name), name))
            .collect();

        ranked.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => a.total_cmp(b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        ranked.into_iter().map(|(_, name)| name.clone()).collect()
    }

    /// 是否有任何医院带有繁忙程度
    pub fn has_busyness(&self) -> bool {
        self.hospitals.iter().any(|h| h.busyness.is_some())
    }

    pub fn busyness_of(&self, name: &str) -> Option<f64> {
        self.get_hospital(name).and_then(|h| h.busyness)
    }

    pub fn get_hospital(&self, name: &str) -> Option<&HospitalRecord> {
        self.hospitals.iter().find(|h| h.name == name)
    }

    pub fn hospitals(&self) -> &[HospitalRecord] {
        &self.hospitals
    }

    /// 标准集合中没有任何医院覆盖的专科
    pub fn uncovered_specialties(&self, taxonomy: &SpecialtyTaxonomy) -> Vec<SpecialtyLabel> {
        taxonomy
            .labels()
            .iter()
            .filter(|label| !self.hospitals.iter().any(|h| h.treats(label)))
            .cloned()
            .collect()
    }
}
