// region:    --- Imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::actor::{ActorIdentity, ActorRole};
use crate::outcome::{Classification, OutcomeKind, StepOutcome};

// endregion: --- Imports

// region:    --- Modules
pub mod report;

pub use report::{RunHealth, RunReport, StepKey, StepStats};
// endregion: --- Modules

// region:    --- Event Model
/// 이벤트의 상태 코드 또는 예외
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EventStatus {
    Code(u16),
    Exception(String),
    // 선행 조건 미충족으로 요청을 보내지 않음
    Skipped(String),
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Code(code) => write!(f, "{}", code),
            EventStatus::Exception(reason) => write!(f, "exception: {}", reason),
            EventStatus::Skipped(missing) => write!(f, "skipped: {}", missing),
        }
    }
}

/// 이벤트 싱크에 기록되는 단위 (한 건이 하나의 원자적 레코드)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub role: ActorRole,
    pub instance_id: u64,
    pub step: String,
    pub status: EventStatus,
    pub classification: Classification,
    pub outcome: String,
    // 상태 코드를 받았는지 여부 (본문 형식과 무관)
    #[serde(default)]
    pub responded: bool,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

impl ActionEvent {
    pub fn from_outcome(identity: &ActorIdentity, outcome: &StepOutcome) -> Self {
        let status = match (&outcome.kind, outcome.status_code) {
            (OutcomeKind::PreconditionNotMet { missing }, _) => EventStatus::Skipped(missing.clone()),
            (OutcomeKind::TransportException { reason }, _) => EventStatus::Exception(reason.clone()),
            (_, Some(code)) => EventStatus::Code(code),
            (_, None) => EventStatus::Exception("no response".to_string()),
        };
        Self {
            role: identity.role(),
            instance_id: identity.instance_id(),
            step: outcome.step.clone(),
            status,
            classification: outcome.classification(),
            outcome: outcome.kind.label().to_string(),
            responded: outcome.status_code.is_some(),
            latency: outcome.latency,
            timestamp: outcome.timestamp,
        }
    }

    /// 실제로 요청을 보낸 이벤트인지 여부
    pub fn was_sent(&self) -> bool {
        !matches!(self.status, EventStatus::Skipped(_))
    }
}
// endregion: --- Event Model

// region:    --- Event Sink Trait
/// 이벤트 싱크 트레이트
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: ActionEvent);
}

/// 채널 기반 이벤트 싱크 (스케줄러가 생성하여 모든 액션에 주입)
#[derive(Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<ActionEvent>,
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn record(&self, event: ActionEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!(
                "{:<12} --> 수집기가 종료되어 이벤트를 버립니다: {} {}",
                "EventSink", e.0.role, e.0.step
            );
        }
    }
}

/// 메모리 이벤트 싱크
#[derive(Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<ActionEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기록된 이벤트 복사본
    pub async fn events(&self) -> Vec<ActionEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn record(&self, event: ActionEvent) {
        self.events.lock().await.push(event);
    }
}
// endregion: --- Event Sink Trait

// region:    --- Event Collector
/// 싱크와 수집기 생성
pub fn channel(timeline_capacity: usize) -> (ChannelEventSink, EventCollector) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        ChannelEventSink { sender },
        EventCollector {
            receiver,
            timeline_capacity,
        },
    )
}

/// 이벤트 수집기
/// 모든 싱크가 닫힐 때까지 이벤트를 받아 리포트로 집계한다.
pub struct EventCollector {
    receiver: mpsc::UnboundedReceiver<ActionEvent>,
    timeline_capacity: usize,
}

impl EventCollector {
    pub async fn run(mut self) -> RunReport {
        info!("{:<12} --> 이벤트 수집 시작", "Collector");
        let mut report = RunReport::new(self.timeline_capacity);
        while let Some(event) = self.receiver.recv().await {
            debug!(
                "{:<12} --> {}#{} {} {}",
                "Collector", event.role, event.instance_id, event.step, event.status
            );
            report.record(event);
        }
        info!(
            "{:<12} --> 이벤트 수집 종료: 총 {}건",
            "Collector", report.total_events
        );
        report
    }
}
// endregion: --- Event Collector

// endregion: --- Tests
