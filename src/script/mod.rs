/// 액터 스크립트
/// 역할별 스텝 목록과 실행 순서(순차 / 가중치 랜덤)를 정의한다.
// region:    --- Imports
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::action::ActionRequest;
use crate::actor::{ActorRole, ActorState, MissingState};
use crate::handoff::HandoffSpec;
use crate::outcome::ResponseShape;

// endregion: --- Imports

// region:    --- Modules
pub mod buyer;
pub mod selection;
pub mod seller;

pub use selection::{instance_rng, SelectionError, WeightedTable};
// endregion: --- Modules

// region:    --- Step
/// 요청을 만들 수 없는 이유
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error(transparent)]
    Missing(#[from] MissingState),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl BuildError {
    /// 선행 조건 미충족 사유
    pub fn reason(&self) -> String {
        match self {
            BuildError::Missing(MissingState(key)) => key.clone(),
            BuildError::Invalid(reason) => reason.clone(),
        }
    }
}

pub type RequestBuilder =
    Arc<dyn Fn(&ActorState) -> Result<ActionRequest, BuildError> + Send + Sync>;

/// 응답 필드를 상태 키로 저장하는 규칙
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub field: &'static str,
    pub key: &'static str,
}

#[derive(Clone)]
pub struct Step {
    pub name: &'static str,
    pub weight: u32,
    pub build: RequestBuilder,
    pub shape: ResponseShape,
    pub captures: Vec<Capture>,
    pub consumes: Vec<&'static str>,
    pub continue_on_failure: bool,
    pub handoff: Option<HandoffSpec>,
}

impl Step {
    pub fn new<F>(name: &'static str, build: F) -> Self
    where
        F: Fn(&ActorState) -> Result<ActionRequest, BuildError> + Send + Sync + 'static,
    {
        Self {
            name,
            weight: 1,
            build: Arc::new(build),
            shape: ResponseShape::Empty,
            captures: Vec::new(),
            consumes: Vec::new(),
            continue_on_failure: true,
            handoff: None,
        }
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn expect(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn capture(mut self, field: &'static str, key: &'static str) -> Self {
        self.captures.push(Capture { field, key });
        self
    }

    /// 실행 후(성공 여부와 무관) 상태에서 제거할 키
    pub fn consumes(mut self, key: &'static str) -> Self {
        self.consumes.push(key);
        self
    }

    pub fn halt_on_failure(mut self) -> Self {
        self.continue_on_failure = false;
        self
    }

    pub fn handoff(mut self, spec: HandoffSpec) -> Self {
        self.handoff = Some(spec);
        self
    }

    pub fn request(&self, state: &ActorState) -> Result<ActionRequest, BuildError> {
        (self.build)(state)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("shape", &self.shape)
            .field("captures", &self.captures)
            .field("consumes", &self.consumes)
            .field("continue_on_failure", &self.continue_on_failure)
            .field("handoff", &self.handoff)
            .finish()
    }
}
// endregion: --- Step

// region:    --- Actor Script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMode {
    /// 선언 순서대로 한 턴에 한 스텝, 마지막 스텝 후 종료
    Sequential,
    /// 매 턴 가중치 비례로 독립 선택, 스케줄러가 종료시킬 때까지 반복
    Weighted,
}

impl std::str::FromStr for SequenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "sequence" => Ok(SequenceMode::Sequential),
            "weighted" | "random" => Ok(SequenceMode::Weighted),
            other => Err(format!("unknown sequence mode `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script for {0} has no steps")]
    NoSteps(ActorRole),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("invalid script parameters: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct ActorScript {
    role: ActorRole,
    mode: SequenceMode,
    steps: Vec<Step>,
    table: Option<WeightedTable>,
}

impl ActorScript {
    pub fn new(role: ActorRole, mode: SequenceMode, steps: Vec<Step>) -> Result<Self, ScriptError> {
        if steps.is_empty() {
            return Err(ScriptError::NoSteps(role));
        }
        let table = match mode {
            SequenceMode::Sequential => None,
            SequenceMode::Weighted => {
                let weights: Vec<(&str, u32)> = steps.iter().map(|s| (s.name, s.weight)).collect();
                Some(WeightedTable::new(&weights)?)
            }
        };
        Ok(Self {
            role,
            mode,
            steps,
            table,
        })
    }

    pub fn sequential(role: ActorRole, steps: Vec<Step>) -> Result<Self, ScriptError> {
        Self::new(role, SequenceMode::Sequential, steps)
    }

    pub fn weighted(role: ActorRole, steps: Vec<Step>) -> Result<Self, ScriptError> {
        Self::new(role, SequenceMode::Weighted, steps)
    }

    pub fn role(&self) -> ActorRole {
        self.role
    }

    pub fn mode(&self) -> SequenceMode {
        self.mode
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// 이번 턴에 실행할 스텝 (순차 스크립트가 끝나면 None)
    pub fn select<R: Rng + ?Sized>(&self, turn: u32, rng: &mut R) -> Option<&Step> {
        match &self.table {
            None => self.steps.get(turn as usize),
            Some(table) => self.steps.get(table.choose(rng)),
        }
    }

    /// 완료한 턴 수 기준 종료 여부
    pub fn is_finished(&self, turns: u32) -> bool {
        match self.mode {
            SequenceMode::Sequential => turns as usize >= self.steps.len(),
            SequenceMode::Weighted => false,
        }
    }
}
// endregion: --- Actor Script
