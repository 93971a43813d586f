//! 专科分类状态机
//!
//! 先做本地关键词匹配，未命中时经节流后升级到生成式解析器，
//! 生成式失败时返回兜底专科。分类器本身从不向调用方返回错误。

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use triage_core::{ClassificationResult, Result, SpecialtyLabel, TriageError};

use crate::generative::GenerativeSpecialtyResolver;
use crate::lexical::LexicalSpecialtyMatcher;
use crate::throttle::EscalationThrottle;

/// 分类状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierState {
    Start,
    LexicalAttempt,
    EscalateToGenerative,
    Resolved,
    Fallback,
}

/// 分类状态转换事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierEvent {
    Begin,
    LexicalHit,
    LexicalMiss,
    GenerativeLabel,
    GenerativeFailure,
}

/// 分类状态机
#[derive(Debug)]
pub struct ClassifierStateMachine {
    transitions: HashMap<(ClassifierState, ClassifierEvent), ClassifierState>,
}

impl ClassifierStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        use ClassifierEvent::*;
        use ClassifierState::*;

        let mut transitions = HashMap::new();

        transitions.insert((Start, Begin), LexicalAttempt);
        transitions.insert((LexicalAttempt, LexicalHit), Resolved);
        transitions.insert((LexicalAttempt, LexicalMiss), EscalateToGenerative);
        transitions.insert((EscalateToGenerative, GenerativeLabel), Resolved);
        transitions.insert((EscalateToGenerative, GenerativeFailure), Fallback);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: ClassifierState, event: ClassifierEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: ClassifierState, event: ClassifierEvent) -> Result<ClassifierState> {
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| TriageError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            })
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: ClassifierState) -> Vec<ClassifierEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }

    /// 终止状态没有出边
    pub fn is_terminal(&self, state: ClassifierState) -> bool {
        self.get_possible_events(state).is_empty()
    }
}

impl Default for ClassifierStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 一次分类经过的状态路径
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationTrace {
    pub result: ClassificationResult,
    pub path: Vec<ClassifierState>,
}

/// 专科分类器
pub struct SpecialtyClassifier {
    state_machine: ClassifierStateMachine,
    matcher: LexicalSpecialtyMatcher,
    resolver: GenerativeSpecialtyResolver,
    throttle: Arc<EscalationThrottle>,
    fallback: SpecialtyLabel,
}

impl SpecialtyClassifier {
    pub fn new(
        matcher: LexicalSpecialtyMatcher,
        resolver: GenerativeSpecialtyResolver,
        throttle: Arc<EscalationThrottle>,
        fallback: SpecialtyLabel,
    ) -> Self {
        Self {
            state_machine: ClassifierStateMachine::new(),
            matcher,
            resolver,
            throttle,
            fallback,
        }
    }

    /// 分类描述，总是返回分类结果
    pub async fn classify(&self, description: &str) -> ClassificationResult {
        self.classify_traced(description).await.result
    }

    /// 分类描述并返回经过的状态路径
    pub async fn classify_traced(&self, description: &str) -> ClassificationTrace {
        let mut path = vec![ClassifierState::Start];
        match self.run(description, &mut path).await {
            Ok(result) => ClassificationTrace { result, path },
            Err(e) => {
                error!("Classifier state machine failed: {}", e);
                path.push(ClassifierState::Fallback);
                ClassificationTrace {
                    result: ClassificationResult::fallback(self.fallback.clone(), e.to_string()),
                    path,
                }
            }
        }
    }

    async fn run(
        &self,
        description: &str,
        path: &mut Vec<ClassifierState>,
    ) -> Result<ClassificationResult> {
        let state = self.step(ClassifierState::Start, ClassifierEvent::Begin, path)?;

        if let Some(specialty) = self.matcher.match_specialty(description) {
            self.step(state, ClassifierEvent::LexicalHit, path)?;
            return Ok(ClassificationResult::lexical(specialty));
        }

        let state = self.step(state, ClassifierEvent::LexicalMiss, path)?;
        self.throttle.acquire().await;
        info!(
            "Escalating to generative resolver (model {})",
            self.resolver.model()
        );

        match self.resolver.resolve(description).await {
            Ok(specialty) => {
                self.step(state, ClassifierEvent::GenerativeLabel, path)?;
                Ok(ClassificationResult::generative(specialty))
            }
            Err(e) => {
                self.step(state, ClassifierEvent::GenerativeFailure, path)?;
                warn!("Generative resolution failed, using {}: {}", self.fallback, e);
                Ok(ClassificationResult::fallback(self.fallback.clone(), e.to_string()))
            }
        }
    }

    fn step(
        &self,
        from: ClassifierState,
        event: ClassifierEvent,
        path: &mut Vec<ClassifierState>,
    ) -> Result<ClassifierState> {
        let to = self.state_machine.transition(from, event)?;
        path.push(to);
        Ok(to)
    }

    pub fn matcher(&self) -> &LexicalSpecialtyMatcher {
        &self.matcher
    }

    pub fn fallback(&self) -> &SpecialtyLabel {
        &self.fallback
    }

    /// 已发生的升级调用次数
    pub fn escalations(&self) -> u64 {
        self.throttle.granted()
    }
}
