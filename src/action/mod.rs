/// HTTP 액션 1회 실행
/// 1. 인증 헤더 부착
/// 2. 전송 및 지연 시간 측정
/// 3. 결과 분류
/// 4. 이벤트 싱크에 정확히 1건 기록
// region:    --- Imports
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::actor::ActorIdentity;
use crate::event_sink::{ActionEvent, EventSink};
use crate::outcome::{OutcomeKind, ResponseShape, StepOutcome};

// endregion: --- Imports

// region:    --- Modules
pub mod transport;

pub use transport::{ReqwestTransport, Transport, TransportError};
// endregion: --- Modules

// region:    --- Action Request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// 액션 입력
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ActionRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// 같은 이름의 헤더는 덮어쓴다
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// 모든 요청에 붙는 공통 헤더
    pub fn authorized(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
            .with_header("Content-Type", "application/json")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
// endregion: --- Action Request

// region:    --- Perform
/// 액션 실행
/// 4xx/5xx 는 실패로, 응답을 받지 못한 경우는 예외로 기록하며 호출자에게 에러를 올리지 않는다.
pub async fn perform(
    transport: &dyn Transport,
    sink: &dyn EventSink,
    identity: &ActorIdentity,
    step: &str,
    request: ActionRequest,
    shape: &ResponseShape,
) -> StepOutcome {
    let request = request.authorized(identity.token());
    let timestamp = Utc::now();
    let started = Instant::now();
    let result = transport.send(&request).await;
    let latency = started.elapsed();

    let outcome = match result {
        Ok(response) => StepOutcome::from_response(step, response, shape, latency, timestamp),
        Err(e) => StepOutcome::transport_exception(step, e.to_string(), latency, timestamp),
    };

    log_outcome(identity, &request, &outcome);
    sink.record(ActionEvent::from_outcome(identity, &outcome)).await;
    outcome
}

fn log_outcome(identity: &ActorIdentity, request: &ActionRequest, outcome: &StepOutcome) {
    let tag = identity.tag();
    match &outcome.kind {
        OutcomeKind::Success => info!(
            "{:<12} --> {} {} {} 성공 ({}ms)",
            tag,
            outcome.step,
            request.method,
            request.path,
            outcome.latency.as_millis()
        ),
        OutcomeKind::ServiceFailure { status } => warn!(
            "{:<12} --> {} 실패: {}, Response: {}",
            tag,
            outcome.step,
            status,
            outcome.raw_body.as_deref().unwrap_or_default()
        ),
        OutcomeKind::ContractViolation { missing } => warn!(
            "{:<12} --> {} 응답 형식 위반: 누락 필드 {:?}, Response: {}",
            tag,
            outcome.step,
            missing,
            outcome.raw_body.as_deref().unwrap_or_default()
        ),
        OutcomeKind::TransportException { reason } => error!(
            "{:<12} --> {} 요청 예외: {} {}: {}",
            tag, outcome.step, request.method, request.path, reason
        ),
        OutcomeKind::PreconditionNotMet { missing } => warn!(
            "{:<12} --> {} 선행 조건 미충족: {}",
            tag, outcome.step, missing
        ),
    }
}
// endregion: --- Perform

// endregion: --- Tests
