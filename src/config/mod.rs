/// 실행 설정
/// 환경 변수에서 읽고, 없으면 기본값을 사용한다.
// region:    --- Imports
use chrono::Utc;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::action::{ReqwestTransport, TransportError};
use crate::actor::{ActorRole, Credential, Roster, ThinkTime};
use crate::auction::{DraftTemplate, PurchaseRequest};
use crate::handoff::HandoffDispatch;
use crate::scheduler::{LoadScheduler, SchedulerConfig};
use crate::script::{self, ScriptError, SequenceMode};

// endregion: --- Imports

// region:    --- Config Error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be set when {role} instances are configured")]
    MissingToken { name: &'static str, role: ActorRole },
    #[error("invalid value for {name}: `{value}` ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
// endregion: --- Config Error

// region:    --- Run Config
/// 역할별 설정
#[derive(Debug, Clone, PartialEq)]
pub struct RoleConfig {
    pub credential: Option<Credential>,
    pub count: u32,
    pub mode: SequenceMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub target_host: String,
    pub seller: RoleConfig,
    pub buyer: RoleConfig,
    pub handoff: HandoffDispatch,
    pub spawn_rate: f64,
    pub think_time: ThinkTime,
    pub run_duration: Option<Duration>,
    pub max_turns: Option<u32>,
    pub respawn: bool,
    pub max_handoff_instances: usize,
    pub handoff_queue_capacity: usize,
    pub request_timeout: Duration,
    pub seed: u64,
    pub timeline_capacity: usize,
    pub draft: DraftTemplate,
    pub bid: PurchaseRequest,
}

impl RunConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로부터 설정 생성 (빈 값은 설정하지 않은 것으로 본다)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let seller = RoleConfig {
            credential: vars.credential("SELLER_TOKEN", "SELLER_ID")?,
            count: vars.parse("SELLER_COUNT", 1)?,
            mode: vars.parse("SELLER_MODE", SequenceMode::Sequential)?,
        };
        let buyer = RoleConfig {
            credential: vars.credential("BUYER_TOKEN", "BUYER_ID")?,
            count: vars.parse("BUYER_COUNT", 0)?,
            mode: vars.parse("BUYER_MODE", SequenceMode::Sequential)?,
        };
        if seller.count > 0 && seller.credential.is_none() {
            return Err(ConfigError::MissingToken {
                name: "SELLER_TOKEN",
                role: ActorRole::Seller,
            });
        }
        if buyer.count > 0 && buyer.credential.is_none() {
            return Err(ConfigError::MissingToken {
                name: "BUYER_TOKEN",
                role: ActorRole::Buyer,
            });
        }

        let handoff = match vars.get("HANDOFF_DISPATCH") {
            None => HandoffDispatch::Scheduled,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "inline" => HandoffDispatch::Inline,
                "scheduled" => HandoffDispatch::Scheduled,
                _ => return Err(invalid("HANDOFF_DISPATCH", &value, "expected inline or scheduled")),
            },
        };

        let spawn_rate: f64 = vars.parse("SPAWN_RATE", 1.0)?;
        if !(spawn_rate.is_finite() && spawn_rate > 0.0) {
            return Err(invalid("SPAWN_RATE", &spawn_rate.to_string(), "must be positive"));
        }

        let think_min: u64 = vars.parse("THINK_TIME_MIN_MS", 1000)?;
        let think_max: u64 = vars.parse("THINK_TIME_MAX_MS", 3000)?;
        if think_min > think_max {
            return Err(invalid(
                "THINK_TIME_MIN_MS",
                &think_min.to_string(),
                "must not exceed THINK_TIME_MAX_MS",
            ));
        }

        let max_handoff_instances: usize = vars.parse("MAX_HANDOFF_INSTANCES", 64)?;
        if max_handoff_instances == 0 {
            return Err(invalid("MAX_HANDOFF_INSTANCES", "0", "must be at least 1"));
        }

        let seed = match vars.parse_opt::<u64>("RNG_SEED")? {
            Some(seed) => seed,
            None => Utc::now().timestamp_millis() as u64,
        };

        Ok(Self {
            target_host: vars
                .get("TARGET_HOST")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            seller,
            buyer,
            handoff,
            spawn_rate,
            think_time: ThinkTime::new(
                Duration::from_millis(think_min),
                Duration::from_millis(think_max),
            ),
            run_duration: vars
                .parse_opt::<u64>("RUN_DURATION_SECS")?
                .map(Duration::from_secs),
            max_turns: vars.parse_opt("MAX_TURNS")?,
            respawn: vars.flag("RESPAWN", true)?,
            max_handoff_instances,
            handoff_queue_capacity: vars.parse("HANDOFF_QUEUE_CAPACITY", 1024)?,
            request_timeout: Duration::from_millis(vars.parse("REQUEST_TIMEOUT_MS", 10_000)?),
            seed,
            timeline_capacity: vars.parse("TIMELINE_CAPACITY", 10_000)?,
            draft: DraftTemplate::default(),
            bid: PurchaseRequest::default(),
        })
    }

    /// 자격 증명이 있는 역할만 등록
    /// 구매자가 등록되어 있을 때만 판매자 경매 생성이 구매자에게 핸드오프한다.
    pub fn roster(&self) -> Result<Roster, ConfigError> {
        let mut roster = Roster::new(self.seed);
        let buyer_ready = self.buyer.credential.is_some();
        if let Some(credential) = &self.buyer.credential {
            roster = roster.with_member(
                credential.clone(),
                script::buyer::script(self.buyer.mode, self.bid)?,
            );
        }
        if let Some(credential) = &self.seller.credential {
            let handoff = buyer_ready.then_some(self.handoff);
            roster = roster.with_member(
                credential.clone(),
                script::seller::script(self.seller.mode, self.draft.clone(), handoff)?,
            );
        }
        Ok(roster)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            population: vec![
                (ActorRole::Seller, self.seller.count),
                (ActorRole::Buyer, self.buyer.count),
            ],
            spawn_rate: self.spawn_rate,
            think_time: self.think_time,
            run_duration: self.run_duration,
            max_turns: self.max_turns,
            respawn: self.respawn,
            max_handoff_instances: self.max_handoff_instances,
            handoff_queue_capacity: self.handoff_queue_capacity,
            timeline_capacity: self.timeline_capacity,
        }
    }

    pub fn transport(&self) -> Result<ReqwestTransport, ConfigError> {
        Ok(ReqwestTransport::new(&self.target_host, self.request_timeout)?)
    }

    /// 설정 전체로 스케줄러 생성
    pub fn scheduler(&self) -> Result<LoadScheduler, ConfigError> {
        let roster = self.roster()?;
        let transport = Arc::new(self.transport()?);
        info!(
            "{:<12} --> 대상 {}, 판매자 {}명({:?}), 구매자 {}명({:?}), 핸드오프 {:?}, 시드 {}",
            "Config",
            self.target_host,
            self.seller.count,
            self.seller.mode,
            self.buyer.count,
            self.buyer.mode,
            self.handoff,
            self.seed
        );
        Ok(LoadScheduler::new(self.scheduler_config(), roster, transport))
    }
}
// endregion: --- Run Config

// region:    --- Env Helpers
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse_opt<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(name)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|e| invalid(name, &value, &e.to_string()))
            })
            .transpose()
    }

    fn parse<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.parse_opt(name)?.unwrap_or(default))
    }

    fn flag(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(invalid(name, &value, "expected true or false")),
            },
        }
    }

    fn credential(
        &self,
        token_name: &'static str,
        id_name: &'static str,
    ) -> Result<Option<Credential>, ConfigError> {
        let member_id = self.parse_opt::<i64>(id_name)?;
        Ok(self.get(token_name).map(|token| {
            let credential = Credential::new(token);
            match member_id {
                Some(id) => credential.with_member_id(id),
                None => credential,
            }
        }))
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
// endregion: --- Env Helpers

// endregion: --- Tests
