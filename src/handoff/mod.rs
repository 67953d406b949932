/// 핸드오프 채널
/// 한 인스턴스의 상태 일부를 복사하여 다른 역할의 새 인스턴스에 전달한다.
/// 참조를 넘기지 않으므로 수신 인스턴스는 항상 일관된 스냅샷을 본다.
// region:    --- Imports
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::actor::{ActorIdentity, ActorRole, ActorState, MissingState};

// endregion: --- Imports

// region:    --- Handoff Spec
/// 수신 인스턴스 실행 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffDispatch {
    /// 보내는 인스턴스의 태스크 안에서 바로 실행
    Inline,
    /// 스케줄러에 전달하여 별도 태스크로 실행
    Scheduled,
}

/// 스텝에 선언되는 핸드오프
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffSpec {
    pub target: ActorRole,
    pub fields: &'static [&'static str],
    pub dispatch: HandoffDispatch,
}

impl HandoffSpec {
    pub fn new(target: ActorRole, fields: &'static [&'static str], dispatch: HandoffDispatch) -> Self {
        Self {
            target,
            fields,
            dispatch,
        }
    }

    /// 현재 상태에서 페이로드 생성 (필드가 하나라도 없으면 실패)
    pub fn prepare(
        &self,
        source: &ActorIdentity,
        state: &ActorState,
    ) -> Result<HandoffPayload, MissingState> {
        Ok(HandoffPayload {
            source_role: source.role(),
            source_instance: source.instance_id(),
            target: self.target,
            values: state.snapshot(self.fields)?,
        })
    }
}

/// 핸드오프 페이로드 (복사된 값)
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffPayload {
    pub source_role: ActorRole,
    pub source_instance: u64,
    pub target: ActorRole,
    pub values: BTreeMap<String, Value>,
}

impl HandoffPayload {
    /// 수신 인스턴스의 초기 상태
    pub fn into_state(self) -> ActorState {
        ActorState::from(self.values)
    }
}
// endregion: --- Handoff Spec

// region:    --- Handoff Channel
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffMessage {
    /// 스케줄러가 새 태스크로 실행
    Deliver(HandoffPayload),
    /// 보낸 인스턴스가 직접 실행함 (집계용)
    RanInline {
        source_role: ActorRole,
        source_instance: u64,
        target: ActorRole,
    },
    Skipped {
        source_role: ActorRole,
        source_instance: u64,
        target: ActorRole,
        reason: String,
    },
}

/// 인스턴스 → 스케줄러 단방향 채널
#[derive(Clone)]
pub struct HandoffChannel {
    sender: mpsc::UnboundedSender<HandoffMessage>,
}

pub type HandoffReceiver = mpsc::UnboundedReceiver<HandoffMessage>;

impl HandoffChannel {
    pub fn open() -> (Self, HandoffReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// 스케줄러에 실행 요청
    pub fn deliver(&self, payload: HandoffPayload) {
        info!(
            "{:<12} --> {}#{} → {} 전달: {:?}",
            "Handoff", payload.source_role, payload.source_instance, payload.target, payload.values
        );
        if let Err(e) = self.sender.send(HandoffMessage::Deliver(payload)) {
            warn!(
                "{:<12} --> 스케줄러가 종료되어 핸드오프를 버립니다: {:?}",
                "Handoff", e.0
            );
        }
    }

    /// 인라인으로 실행한 핸드오프 보고
    pub fn ran_inline(&self, payload: &HandoffPayload) {
        info!(
            "{:<12} --> {}#{} → {} 인라인 실행: {:?}",
            "Handoff", payload.source_role, payload.source_instance, payload.target, payload.values
        );
        let _ = self.sender.send(HandoffMessage::RanInline {
            source_role: payload.source_role,
            source_instance: payload.source_instance,
            target: payload.target,
        });
    }

    /// 건너뛴 핸드오프 보고
    pub fn skipped(&self, source: &ActorIdentity, target: ActorRole, reason: String) {
        warn!(
            "{:<12} --> {} → {} 핸드오프 건너뜀: {}",
            "Handoff",
            source.tag(),
            target,
            reason
        );
        let _ = self.sender.send(HandoffMessage::Skipped {
            source_role: source.role(),
            source_instance: source.instance_id(),
            target,
            reason,
        });
    }
}
// endregion: --- Handoff Channel

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Credential;
    use serde_json::json;

    fn seller() -> ActorIdentity {
        ActorIdentity::new(ActorRole::Seller, Credential::new("s"), 7)
    }

    #[test]
    fn prepare_copies_only_declared_fields() {
        let mut state = ActorState::new();
        state.insert("auctionId", json!("A1"));
        state.insert("listedAuctionId", json!("A0"));
        let spec = HandoffSpec::new(ActorRole::Buyer, &["auctionId"], HandoffDispatch::Scheduled);

        let payload = spec.prepare(&seller(), &state).unwrap();
        state.insert("auctionId", json!("A2"));

        assert_eq!(payload.source_instance, 7);
        let received = payload.into_state();
        assert_eq!(received.get("auctionId"), Some(&json!("A1")));
        assert!(!received.contains("listedAuctionId"));
    }

    #[test]
    fn prepare_fails_without_required_field() {
        let spec = HandoffSpec::new(ActorRole::Buyer, &["auctionId"], HandoffDispatch::Inline);
        let err = spec.prepare(&seller(), &ActorState::new()).unwrap_err();
        assert_eq!(err, MissingState("auctionId".to_string()));
    }

    #[tokio::test]
    async fn skipped_handoff_reaches_receiver() {
        let (channel, mut receiver) = HandoffChannel::open();
        channel.skipped(&seller(), ActorRole::Buyer, "missing auctionId".to_string());
        match receiver.recv().await {
            Some(HandoffMessage::Skipped { source_instance, .. }) => assert_eq!(source_instance, 7),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
