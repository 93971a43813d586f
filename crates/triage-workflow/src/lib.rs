//! # 分诊工作流模块
//!
//! 提供从病例描述到候选医院的完整分诊流程，包括：
//! - 严重程度标准化与筛选
//! - 关键词专科匹配
//! - 生成式专科解析与升级节流
//! - 专科分类状态机
//! - 医院目录与繁忙程度排序

pub mod classifier;
pub mod directory;
pub mod engine;
pub mod generative;
pub mod lexical;
pub mod severity;
pub mod throttle;

// 重新导出主要类型
pub use classifier::{
    ClassificationTrace, ClassifierEvent, ClassifierState, ClassifierStateMachine,
    SpecialtyClassifier,
};
pub use directory::HospitalDirectory;
pub use engine::{BatchOutcome, BatchSummary, EngineSettings, TriageEngine, TriageReport};
pub use generative::{build_prompt, GenerativeSpecialtyResolver};
pub use lexical::{HeuristicChunker, LexicalSpecialtyMatcher, PhraseChunker};
pub use severity::{SeverityFilter, SeverityNormalizer};
pub use throttle::EscalationThrottle;
