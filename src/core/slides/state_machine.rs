use log::{debug, warn};

/// 失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Configuration(String),
    Decode {
        last_sampled: Option<u64>,
        message: String,
    },
    Extraction(String),
}

/// 流水线状态
///
/// `Idle → Sampling → Deduplicating → Extracting → Assembling → Done`，
/// `Failed` 只能从配置校验（Idle）、Sampling 或 Extracting 进入，
/// 任意未终止状态都可被取消。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Sampling,
    Deduplicating,
    Extracting,
    Assembling,
    Done,
    Failed(FailureReason),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Start,
    SamplingFinished,
    DeduplicationFinished,
    ExtractionFinished,
    AssemblyFinished,
    Fail(FailureReason),
    Cancel,
}

impl PipelineState {
    pub fn new() -> Self {
        PipelineState::Idle
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::Failed(_) | PipelineState::Cancelled
        )
    }

    /// 非法转换返回 None
    pub fn transition(&self, event: PipelineEvent) -> Option<PipelineState> {
        use PipelineEvent as E;
        use PipelineState as S;

        match (self, event) {
            (s, E::Cancel) if !s.is_terminal() => Some(S::Cancelled),

            (S::Idle, E::Start) => Some(S::Sampling),
            (S::Idle, E::Fail(reason @ FailureReason::Configuration(_))) => Some(S::Failed(reason)),

            (S::Sampling, E::SamplingFinished) => Some(S::Deduplicating),
            (S::Sampling, E::Fail(reason @ FailureReason::Decode { .. })) => Some(S::Failed(reason)),

            (S::Deduplicating, E::DeduplicationFinished) => Some(S::Extracting),

            (S::Extracting, E::ExtractionFinished) => Some(S::Assembling),
            (S::Extracting, E::Fail(reason @ FailureReason::Extraction(_))) => {
                Some(S::Failed(reason))
            }

            (S::Assembling, E::AssemblyFinished) => Some(S::Done),

            _ => None,
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

/// 记录状态与转换历史
#[derive(Debug, Default)]
pub struct PipelineStateMachine {
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl PipelineStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用事件；非法转换保持原状态并返回 false
    pub fn apply(&mut self, event: PipelineEvent) -> bool {
        match self.state.transition(event.clone()) {
            Some(next) => {
                debug!("🔀 Pipeline {:?} → {:?}", self.state, next);
                let prev = std::mem::replace(&mut self.state, next);
                self.history.push(prev);
                true
            }
            None => {
                warn!("⚠️ Ignoring {:?} in state {:?}", event, self.state);
                false
            }
        }
    }

    pub fn current_state(&self) -> &PipelineState {
        &self.state
    }

    /// 按顺序经过的历史状态（不含当前状态）
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn reset(&mut self) {
        self.state = PipelineState::new();
        self.history.clear();
    }
}
