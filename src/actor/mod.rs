/// 가상 액터
/// 1. 역할 (판매자 / 구매자)
/// 2. 신원 (토큰, 회원 ID, 인스턴스 번호)
/// 3. 인스턴스별 상태 (경매 ID, 영수증 ID 등)
// region:    --- Imports
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::outcome::is_present;

// endregion: --- Imports

// region:    --- Modules
pub mod instance;
pub mod lifecycle;

pub use instance::{ActorInstance, InstanceContext, InstanceSummary, Roster, Termination, ThinkTime};
pub use lifecycle::Lifecycle;
// endregion: --- Modules

// region:    --- Role & Identity
/// 액터 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActorRole {
    Seller,
    Buyer,
}

impl ActorRole {
    pub const ALL: [ActorRole; 2] = [ActorRole::Seller, ActorRole::Buyer];
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Seller => write!(f, "Seller"),
            ActorRole::Buyer => write!(f, "Buyer"),
        }
    }
}

/// 역할별로 외부에서 주입되는 자격 증명
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub member_id: Option<i64>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            member_id: None,
        }
    }

    pub fn with_member_id(mut self, member_id: i64) -> Self {
        self.member_id = Some(member_id);
        self
    }
}

// 토큰은 로그에 남기지 않는다
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"***")
            .field("member_id", &self.member_id)
            .finish()
    }
}

/// 액터 신원 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorIdentity {
    role: ActorRole,
    credential: Credential,
    instance_id: u64,
}

impl ActorIdentity {
    pub fn new(role: ActorRole, credential: Credential, instance_id: u64) -> Self {
        Self {
            role,
            credential,
            instance_id,
        }
    }

    pub fn role(&self) -> ActorRole {
        self.role
    }

    pub fn token(&self) -> &str {
        &self.credential.token
    }

    pub fn member_id(&self) -> Option<i64> {
        self.credential.member_id
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// 로그 태그용 이름 (예: Seller#3)
    pub fn tag(&self) -> String {
        format!("{}#{}", self.role, self.instance_id)
    }
}
// endregion: --- Role & Identity

// region:    --- Actor State
/// 필요한 상태 값이 없음
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing state value `{0}`")]
pub struct MissingState(pub String);

/// 인스턴스 전용 상태
/// 다른 인스턴스와 참조로 공유하지 않으며, 핸드오프 시에는 값을 복사한다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorState {
    values: BTreeMap<String, Value>,
}

impl ActorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 비어 있지 않은 값만 반환
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|value| is_present(value))
    }

    pub fn require(&self, key: &str) -> Result<&Value, MissingState> {
        self.get(key).ok_or_else(|| MissingState(key.to_string()))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 지정한 키들의 복사본, 하나라도 없으면 첫 번째 누락 키를 반환
    pub fn snapshot(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>, MissingState> {
        keys.iter()
            .map(|key| {
                self.require(key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect()
    }
}

impl From<BTreeMap<String, Value>> for ActorState {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}
// endregion: --- Actor State

// endregion: --- Tests
