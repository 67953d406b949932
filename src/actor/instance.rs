/// 액터 인스턴스 실행
/// 1. 턴마다 스크립트에서 스텝 선택
/// 2. 액션 실행 (선행 조건이 없으면 요청 없이 건너뜀)
/// 3. 결과 평가: 상태 갱신 → 핸드오프
/// 4. 생각 시간 대기 후 다음 턴 (정지 신호 시 즉시 종료)
// region:    --- Imports
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{ActorIdentity, ActorRole, ActorState, Credential, Lifecycle, MissingState};
use crate::action::{self, Transport};
use crate::event_sink::{ActionEvent, EventSink};
use crate::handoff::{HandoffChannel, HandoffDispatch, HandoffPayload};
use crate::outcome::{is_present, StepOutcome};
use crate::script::{instance_rng, ActorScript, Step};

// endregion: --- Imports

// region:    --- Roster
#[derive(Clone)]
struct Member {
    credential: Credential,
    script: Arc<ActorScript>,
}

/// 역할별 자격 증명과 스크립트, 인스턴스 번호 발급기
#[derive(Clone)]
pub struct Roster {
    seed: u64,
    next_id: Arc<AtomicU64>,
    members: Arc<HashMap<ActorRole, Member>>,
}

impl Roster {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            next_id: Arc::new(AtomicU64::new(0)),
            members: Arc::new(HashMap::new()),
        }
    }

    /// 스크립트의 역할로 등록 (같은 역할은 덮어쓴다)
    pub fn with_member(mut self, credential: Credential, script: ActorScript) -> Self {
        let mut members = (*self.members).clone();
        members.insert(
            script.role(),
            Member {
                credential,
                script: Arc::new(script),
            },
        );
        self.members = Arc::new(members);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn contains(&self, role: ActorRole) -> bool {
        self.members.contains_key(&role)
    }

    /// 지금까지 발급한 인스턴스 수
    pub fn spawned(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// 새 인스턴스 생성 (등록되지 않은 역할이면 None)
    pub fn spawn(&self, role: ActorRole, state: ActorState) -> Option<ActorInstance> {
        let member = self.members.get(&role)?;
        let instance_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Some(ActorInstance::new(
            ActorIdentity::new(role, member.credential.clone(), instance_id),
            Arc::clone(&member.script),
            state,
            instance_rng(self.seed, instance_id),
        ))
    }
}
// endregion: --- Roster

// region:    --- Instance Context
/// 턴 사이 대기 시간 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl ThinkTime {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

/// 모든 인스턴스가 공유하는 실행 환경 (스케줄러가 생성)
#[derive(Clone)]
pub struct InstanceContext {
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<dyn EventSink>,
    pub handoffs: HandoffChannel,
    pub roster: Roster,
    pub think_time: ThinkTime,
    pub max_turns: Option<u32>,
    pub stop: watch::Receiver<bool>,
}

/// 정지 신호가 올 때까지 대기 (송신측이 사라지면 영원히 대기)
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let requested = stop.wait_for(|stopped| *stopped).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}
// endregion: --- Instance Context

// region:    --- Actor Instance
/// 인스턴스 종료 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// 순차 스크립트의 마지막 스텝 완료
    Completed,
    /// 실패 시 중단하는 스텝이 실패
    HaltedOnFailure { step: String },
    /// 스케줄러 정지
    Stopped,
    /// 턴 제한 도달
    TurnLimit,
}

/// 종료된 인스턴스 요약
#[derive(Debug, Clone)]
pub struct InstanceSummary {
    pub role: ActorRole,
    pub instance_id: u64,
    pub turns: u32,
    pub termination: Termination,
    pub state: ActorState,
    /// 인라인 핸드오프로 실행된 인스턴스
    pub children: Vec<InstanceSummary>,
}

pub struct ActorInstance {
    identity: ActorIdentity,
    script: Arc<ActorScript>,
    state: ActorState,
    lifecycle: Lifecycle,
    rng: StdRng,
    turns: u32,
    children: Vec<InstanceSummary>,
}

impl ActorInstance {
    pub fn new(
        identity: ActorIdentity,
        script: Arc<ActorScript>,
        state: ActorState,
        rng: StdRng,
    ) -> Self {
        Self {
            identity,
            script,
            state,
            lifecycle: Lifecycle::Idle,
            rng,
            turns: 0,
            children: Vec::new(),
        }
    }

    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    pub fn state(&self) -> &ActorState {
        &self.state
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// 종료될 때까지 실행
    pub async fn run(self, ctx: &InstanceContext) -> InstanceSummary {
        self.run_boxed(ctx).await
    }

    // 인라인 핸드오프는 같은 태스크 안에서 재귀 실행된다
    fn run_boxed<'a>(
        self,
        ctx: &'a InstanceContext,
    ) -> Pin<Box<dyn Future<Output = InstanceSummary> + Send + 'a>> {
        Box::pin(self.drive(ctx))
    }

    async fn drive(mut self, ctx: &InstanceContext) -> InstanceSummary {
        let tag = self.identity.tag();
        let script = Arc::clone(&self.script);
        let mut stop = ctx.stop.clone();
        info!("{:<12} --> 시작 (초기 상태: {:?})", tag, self.state);

        self.transition(Lifecycle::Running);
        let termination = loop {
            if *stop.borrow() {
                break Termination::Stopped;
            }
            if ctx.max_turns.is_some_and(|limit| self.turns >= limit) {
                break Termination::TurnLimit;
            }
            let Some(step) = script.select(self.turns, &mut self.rng) else {
                break Termination::Completed;
            };

            self.transition(Lifecycle::Executing);
            let outcome = self.execute(step, ctx).await;
            self.turns += 1;

            self.transition(Lifecycle::Evaluating);
            self.apply(step, &outcome);
            if let Some(payload) = self.check_handoff(step, &outcome, ctx) {
                self.run_inline(payload, ctx).await;
            }

            if !outcome.is_success() && !step.continue_on_failure {
                break Termination::HaltedOnFailure {
                    step: step.name.to_string(),
                };
            }
            if script.is_finished(self.turns) {
                break Termination::Completed;
            }

            self.transition(Lifecycle::Waiting);
            let pause = ctx.think_time.sample(&mut self.rng);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = stop_requested(&mut stop) => break Termination::Stopped,
            }
            self.transition(Lifecycle::Running);
        };
        self.transition(Lifecycle::Terminated);

        info!(
            "{:<12} --> 종료: {:?}, 턴 {}",
            tag, termination, self.turns
        );
        InstanceSummary {
            role: self.identity.role(),
            instance_id: self.identity.instance_id(),
            turns: self.turns,
            termination,
            state: self.state,
            children: self.children,
        }
    }

    /// 스텝 1회 실행, 요청을 만들 수 없으면 보내지 않고 건너뛴 결과를 기록
    async fn execute(&self, step: &Step, ctx: &InstanceContext) -> StepOutcome {
        match step.request(&self.state) {
            Ok(request) => {
                action::perform(
                    ctx.transport.as_ref(),
                    ctx.sink.as_ref(),
                    &self.identity,
                    step.name,
                    request,
                    &step.shape,
                )
                .await
            }
            Err(e) => {
                let outcome = StepOutcome::precondition_not_met(step.name, &e.reason());
                warn!(
                    "{:<12} --> {} 선행 조건 미충족: {}",
                    self.identity.tag(),
                    step.name,
                    e
                );
                ctx.sink
                    .record(ActionEvent::from_outcome(&self.identity, &outcome))
                    .await;
                outcome
            }
        }
    }

    /// 상태 갱신: 소비 키 제거 후 성공 응답의 필드 캡처
    fn apply(&mut self, step: &Step, outcome: &StepOutcome) {
        for key in &step.consumes {
            self.state.remove(key);
        }
        if !outcome.is_success() {
            return;
        }
        for capture in &step.captures {
            match outcome.field(capture.field) {
                Some(value) if is_present(value) => {
                    self.state.insert(capture.key, value.clone());
                }
                _ => debug!(
                    "{:<12} --> {} 응답에 {} 없음, 캡처 생략",
                    self.identity.tag(),
                    step.name,
                    capture.field
                ),
            }
        }
    }

    /// 성공한 스텝의 핸드오프 처리, 인라인 실행할 페이로드를 반환
    fn check_handoff(
        &self,
        step: &Step,
        outcome: &StepOutcome,
        ctx: &InstanceContext,
    ) -> Option<HandoffPayload> {
        let spec = step.handoff.as_ref()?;
        if !outcome.is_success() {
            return None;
        }
        match spec.prepare(&self.identity, &self.state) {
            Ok(payload) => match spec.dispatch {
                HandoffDispatch::Inline => Some(payload),
                HandoffDispatch::Scheduled => {
                    ctx.handoffs.deliver(payload);
                    None
                }
            },
            Err(MissingState(key)) => {
                ctx.handoffs
                    .skipped(&self.identity, spec.target, format!("missing `{}`", key));
                None
            }
        }
    }

    async fn run_inline(&mut self, payload: HandoffPayload, ctx: &InstanceContext) {
        let target = payload.target;
        ctx.handoffs.ran_inline(&payload);
        match ctx.roster.spawn(target, payload.into_state()) {
            Some(child) => {
                let summary = child.run_boxed(ctx).await;
                self.children.push(summary);
            }
            None => ctx.handoffs.skipped(
                &self.identity,
                target,
                format!("no script registered for {}", target),
            ),
        }
    }

    fn transition(&mut self, next: Lifecycle) {
        debug_assert!(
            self.lifecycle.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.lifecycle,
            next
        );
        debug!(
            "{:<12} --> {:?} → {:?}",
            self.identity.tag(),
            self.lifecycle,
            next
        );
        self.lifecycle = next;
    }
}
// endregion: --- Actor Instance

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionRequest, TransportError};
    use crate::event_sink::{EventStatus, MemoryEventSink};
    use crate::handoff::{HandoffMessage, HandoffReceiver, HandoffSpec};
    use crate::outcome::{OutcomeKind, RawResponse, ResponseShape};
    use crate::script::SequenceMode;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// 경로별 고정 응답
    struct Canned {
        replies: HashMap<&'static str, (u16, &'static str)>,
        sent: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(replies: &[(&'static str, u16, &'static str)]) -> Arc<Self> {
            Arc::new(Self {
                replies: replies
                    .iter()
                    .map(|(path, status, body)| (*path, (*status, *body)))
                    .collect(),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: &ActionRequest) -> Result<RawResponse, TransportError> {
            self.sent.lock().unwrap().push(request.path.clone());
            let (status, body) = self
                .replies
                .get(request.path.as_str())
                .copied()
                .unwrap_or((404, ""));
            Ok(RawResponse {
                status,
                body: body.to_string(),
            })
        }
    }

    fn create() -> Step {
        Step::new("create", |_| Ok(ActionRequest::post("/items", json!({}))))
            .expect(ResponseShape::Object(&["id"]))
            .capture("id", "itemId")
    }

    fn remove() -> Step {
        Step::new("remove", |state| {
            Ok(ActionRequest::delete(format!(
                "/items/{}",
                state.require("itemId")?.as_str().unwrap_or_default()
            )))
        })
        .consumes("itemId")
    }

    fn context(
        transport: Arc<Canned>,
        sink: Arc<MemoryEventSink>,
        roster: Roster,
    ) -> (InstanceContext, HandoffReceiver, watch::Sender<bool>) {
        let (handoffs, receiver) = HandoffChannel::open();
        let (stop_tx, stop) = watch::channel(false);
        let ctx = InstanceContext {
            transport,
            sink,
            handoffs,
            roster,
            think_time: ThinkTime::none(),
            max_turns: None,
            stop,
        };
        (ctx, receiver, stop_tx)
    }

    fn roster(steps: Vec<Step>) -> Roster {
        Roster::new(1).with_member(
            Credential::new("token"),
            ActorScript::sequential(ActorRole::Seller, steps).unwrap(),
        )
    }

    #[tokio::test]
    async fn sequential_instance_captures_then_consumes() {
        let transport = Canned::new(&[("/items", 200, r#"{"id":"I1"}"#), ("/items/I1", 200, "")]);
        let sink = Arc::new(MemoryEventSink::new());
        let roster = roster(vec![create(), remove()]);
        let (ctx, _rx, _stop) = context(transport.clone(), sink.clone(), roster.clone());

        let instance = roster.spawn(ActorRole::Seller, ActorState::new()).unwrap();
        let summary = instance.run(&ctx).await;

        assert_eq!(summary.termination, Termination::Completed);
        assert_eq!(summary.turns, 2);
        assert!(!summary.state.contains("itemId"));
        assert_eq!(transport.sent(), vec!["/items", "/items/I1"]);
        let steps: Vec<String> = sink.events().await.into_iter().map(|e| e.step).collect();
        assert_eq!(steps, vec!["create", "remove"]);
    }

    #[tokio::test]
    async fn missing_state_skips_without_sending() {
        let transport = Canned::new(&[]);
        let sink = Arc::new(MemoryEventSink::new());
        let roster = roster(vec![remove()]);
        let (ctx, _rx, _stop) = context(transport.clone(), sink.clone(), roster.clone());

        let summary = roster
            .spawn(ActorRole::Seller, ActorState::new())
            .unwrap()
            .run(&ctx)
            .await;

        assert_eq!(summary.termination, Termination::Completed);
        assert!(transport.sent().is_empty());
        let events = sink.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Skipped("itemId".to_string()));
    }

    #[tokio::test]
    async fn failing_halt_step_terminates_instance() {
        let transport = Canned::new(&[("/items", 500, "boom")]);
        let sink = Arc::new(MemoryEventSink::new());
        let roster = roster(vec![create().halt_on_failure(), remove()]);
        let (ctx, _rx, _stop) = context(transport.clone(), sink.clone(), roster.clone());

        let summary = roster
            .spawn(ActorRole::Seller, ActorState::new())
            .unwrap()
            .run(&ctx)
            .await;

        assert_eq!(
            summary.termination,
            Termination::HaltedOnFailure {
                step: "create".to_string()
            }
        );
        assert_eq!(summary.turns, 1);
        assert_eq!(transport.sent(), vec!["/items"]);
    }

    #[tokio::test]
    async fn contract_violation_does_not_capture() {
        let transport = Canned::new(&[("/items", 200, r#"{"name":"x"}"#)]);
        let sink = Arc::new(MemoryEventSink::new());
        let roster = roster(vec![create()]);
        let (ctx, _rx, _stop) = context(transport, sink.clone(), roster.clone());

        let summary = roster
            .spawn(ActorRole::Seller, ActorState::new())
            .unwrap()
            .run(&ctx)
            .await;

        assert!(summary.state.is_empty());
        assert_eq!(sink.events().await[0].outcome, "contract_violation");
    }

    #[tokio::test]
    async fn inline_handoff_runs_child_with_copied_state() {
        let transport = Canned::new(&[
            ("/items", 200, r#"{"id":"I1"}"#),
            ("/items/I1", 200, ""),
        ]);
        let sink = Arc::new(MemoryEventSink::new());
        let seller = ActorScript::sequential(
            ActorRole::Seller,
            vec![create().handoff(HandoffSpec::new(
                ActorRole::Buyer,
                &["itemId"],
                HandoffDispatch::Inline,
            ))],
        )
        .unwrap();
        let buyer = ActorScript::sequential(ActorRole::Buyer, vec![remove()]).unwrap();
        let roster = Roster::new(1)
            .with_member(Credential::new("s"), seller)
            .with_member(Credential::new("b"), buyer);
        let (ctx, mut rx, _stop) = context(transport.clone(), sink.clone(), roster.clone());

        let summary = roster
            .spawn(ActorRole::Seller, ActorState::new())
            .unwrap()
            .run(&ctx)
            .await;

        assert_eq!(summary.children.len(), 1);
        let child = &summary.children[0];
        assert_eq!(child.role, ActorRole::Buyer);
        assert_eq!(child.termination, Termination::Completed);
        assert!(!child.state.contains("itemId"));
        assert_eq!(summary.state.get("itemId"), Some(&json!("I1")));
        assert!(matches!(rx.try_recv(), Ok(HandoffMessage::RanInline { .. })));
        assert_eq!(roster.spawned(), 2);
    }

    #[tokio::test]
    async fn scheduled_handoff_is_sent_to_channel() {
        let transport = Canned::new(&[("/items", 200, r#"{"id":7}"#)]);
        let sink = Arc::new(MemoryEventSink::new());
        let roster = roster(vec![create().handoff(HandoffSpec::new(
            ActorRole::Buyer,
            &["itemId"],
            HandoffDispatch::Scheduled,
        ))]);
        let (ctx, mut rx, _stop) = context(transport, sink, roster.clone());

        roster
            .spawn(ActorRole::Seller, ActorState::new())
            .unwrap()
            .run(&ctx)
            .await;

        match rx.try_recv() {
            Ok(HandoffMessage::Deliver(payload)) => {
                assert_eq!(payload.target, ActorRole::Buyer);
                assert_eq!(payload.values.get("itemId"), Some(&json!(7)));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_step_does_not_hand_off() {
        let transport = Canned::new(&[("/items", 503, "")]);
        let sink = Arc::new(MemoryEventSink::new());
        let roster = roster(vec![create().handoff(HandoffSpec::new(
            ActorRole::Buyer,
            &["itemId"],
            HandoffDispatch::Scheduled,
        ))]);
        let (ctx, mut rx, _stop) = context(transport, sink.clone(), roster.clone());

        roster
            .spawn(ActorRole::Seller, ActorState::new())
            .unwrap()
            .run(&ctx)
            .await;

        assert!(rx.try_recv().is_err());
        assert_eq!(
            sink.events().await[0].outcome,
            OutcomeKind::ServiceFailure { status: 503 }.label()
        );
    }

    #[tokio::test]
    async fn turn_limit_bounds_weighted_instance() {
        let transport = Canned::new(&[("/items", 200, r#"{"id":"I1"}"#)]);
        let sink = Arc::new(MemoryEventSink::new());
        let roster = Roster::new(3).with_member(
            Credential::new("t"),
            ActorScript::new(ActorRole::Seller, SequenceMode::Weighted, vec![create()]).unwrap(),
        );
        let (mut ctx, _rx, _stop) = context(transport, sink.clone(), roster.clone());
        ctx.max_turns = Some(4);

        let summary = roster
            .spawn(ActorRole::Seller, ActorState::new())
            .unwrap()
            .run(&ctx)
            .await;

        assert_eq!(summary.termination, Termination::TurnLimit);
        assert_eq!(sink.events().await.len(), 4);
    }

    #[tokio::test]
    async fn stop_signal_ends_waiting_instance() {
        let transport = Canned::new(&[("/items", 200, r#"{"id":"I1"}"#)]);
        let sink = Arc::new(MemoryEventSink::new());
        let roster = Roster::new(3).with_member(
            Credential::new("t"),
            ActorScript::weighted(ActorRole::Seller, vec![create()]).unwrap(),
        );
        let (mut ctx, _rx, stop) = context(transport, sink.clone(), roster.clone());
        ctx.think_time = ThinkTime::new(Duration::from_secs(60), Duration::from_secs(60));

        let instance = roster.spawn(ActorRole::Seller, ActorState::new()).unwrap();
        let handle = tokio::spawn(async move { instance.run(&ctx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send_replace(true);

        let summary = handle.await.unwrap();
        assert_eq!(summary.termination, Termination::Stopped);
        assert_eq!(summary.turns, 1);
    }

    #[test]
    fn think_time_sample_stays_in_range() {
        let think = ThinkTime::new(Duration::from_millis(300), Duration::from_millis(100));
        assert_eq!(think.min, Duration::from_millis(100));
        let mut rng = instance_rng(5, 1);
        for _ in 0..100 {
            let pause = think.sample(&mut rng);
            assert!(pause >= think.min && pause <= think.max);
        }
    }
}
// endregion: --- Tests
