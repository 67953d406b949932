/// 응답 결과 분류
/// 1. 성공: 200 + JSON 파싱 + 기대 필드 존재
/// 2. 실패: 서비스 실패(200 이외), 계약 위반(필드 누락), 선행 조건 미충족
/// 3. 예외: 전송 계층 오류(타임아웃, 연결 실패, 잘못된 응답 본문)
// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

// endregion: --- Imports

// region:    --- Classification
/// 집계용 3분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    Failure,
    Exception,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Success => write!(f, "success"),
            Classification::Failure => write!(f, "failure"),
            Classification::Exception => write!(f, "exception"),
        }
    }
}

/// 결과 상세 분류
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    // 200 이외의 상태 코드
    ServiceFailure { status: u16 },
    // 200 이지만 선언된 필드가 없거나 비어 있음
    ContractViolation { missing: Vec<String> },
    // 요청에 필요한 상태 값이 없어 요청을 보내지 않음
    PreconditionNotMet { missing: String },
    // 응답을 받지 못했거나 응답 본문을 해석할 수 없음
    TransportException { reason: String },
}

impl OutcomeKind {
    pub fn classification(&self) -> Classification {
        match self {
            OutcomeKind::Success => Classification::Success,
            OutcomeKind::ServiceFailure { .. }
            | OutcomeKind::ContractViolation { .. }
            | OutcomeKind::PreconditionNotMet { .. } => Classification::Failure,
            OutcomeKind::TransportException { .. } => Classification::Exception,
        }
    }

    /// 로그와 리포트에 쓰이는 짧은 이름
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::ServiceFailure { .. } => "service_failure",
            OutcomeKind::ContractViolation { .. } => "contract_violation",
            OutcomeKind::PreconditionNotMet { .. } => "precondition_not_met",
            OutcomeKind::TransportException { .. } => "transport_exception",
        }
    }
}
// endregion: --- Classification

// region:    --- Response Shape
/// 스텝이 성공 응답에 기대하는 본문 형태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// 200 이면 본문과 관계없이 성공
    Empty,
    /// 본문이 JSON 객체이며 모든 필드를 포함
    Object(&'static [&'static str]),
    /// 본문이 JSON 배열이며 모든 원소가 필드를 포함 (캡처는 첫 번째 원소 기준)
    List(&'static [&'static str]),
}

/// 전송 계층이 돌려주는 가공 전 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}
// endregion: --- Response Shape

// region:    --- Classifier
/// 응답 분류 결과와 추출된 필드
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub kind: OutcomeKind,
    pub fields: Option<Map<String, Value>>,
}

/// 응답 분류
pub fn classify(response: &RawResponse, shape: &ResponseShape) -> Classified {
    if response.status != 200 {
        return Classified {
            kind: OutcomeKind::ServiceFailure {
                status: response.status,
            },
            fields: None,
        };
    }

    let expected = match shape {
        ResponseShape::Empty => {
            // 본문이 JSON 객체이면 필드로 남겨 두되, 판정에는 쓰지 않는다
            let fields = match serde_json::from_str::<Value>(&response.body) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            };
            return Classified {
                kind: OutcomeKind::Success,
                fields,
            };
        }
        ResponseShape::Object(fields) | ResponseShape::List(fields) => *fields,
    };

    let body: Value = match serde_json::from_str(&response.body) {
        Ok(body) => body,
        Err(e) => {
            return Classified {
                kind: OutcomeKind::TransportException {
                    reason: format!("malformed response body: {}", e),
                },
                fields: None,
            }
        }
    };

    match (shape, body) {
        (ResponseShape::Object(_), Value::Object(map)) => {
            let missing = missing_fields(&map, expected);
            finish(missing, Some(map))
        }
        (ResponseShape::List(_), Value::Array(items)) => {
            let mut missing: Vec<String> = Vec::new();
            for item in &items {
                let found = match item {
                    Value::Object(map) => missing_fields(map, expected),
                    _ => expected.iter().map(|f| f.to_string()).collect(),
                };
                for field in found {
                    if !missing.contains(&field) {
                        missing.push(field);
                    }
                }
            }
            let first = items.into_iter().next().and_then(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            });
            finish(missing, first)
        }
        _ => Classified {
            kind: OutcomeKind::ContractViolation {
                missing: expected.iter().map(|f| f.to_string()).collect(),
            },
            fields: None,
        },
    }
}

fn finish(missing: Vec<String>, fields: Option<Map<String, Value>>) -> Classified {
    if missing.is_empty() {
        Classified {
            kind: OutcomeKind::Success,
            fields,
        }
    } else {
        Classified {
            kind: OutcomeKind::ContractViolation { missing },
            fields,
        }
    }
}

fn missing_fields(map: &Map<String, Value>, expected: &[&str]) -> Vec<String> {
    expected
        .iter()
        .filter(|field| !map.get(**field).map(is_present).unwrap_or(false))
        .map(|field| field.to_string())
        .collect()
}

/// null, 빈 문자열, 빈 배열/객체는 값이 없는 것으로 본다
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
// endregion: --- Classifier

// region:    --- Step Outcome
/// 액션 1회 실행 결과 (생성 후 불변)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub status_code: Option<u16>,
    pub raw_body: Option<String>,
    pub parsed_fields: Option<Map<String, Value>>,
    pub kind: OutcomeKind,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

impl StepOutcome {
    /// 응답을 받은 경우
    pub fn from_response(
        step: &str,
        response: RawResponse,
        shape: &ResponseShape,
        latency: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let Classified { kind, fields } = classify(&response, shape);
        Self {
            step: step.to_string(),
            status_code: Some(response.status),
            raw_body: Some(response.body),
            parsed_fields: fields,
            kind,
            latency,
            timestamp,
        }
    }

    /// 응답을 받지 못한 경우
    pub fn transport_exception(
        step: &str,
        reason: String,
        latency: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            step: step.to_string(),
            status_code: None,
            raw_body: None,
            parsed_fields: None,
            kind: OutcomeKind::TransportException { reason },
            latency,
            timestamp,
        }
    }

    /// 요청을 보내지 않고 건너뛴 경우
    pub fn precondition_not_met(step: &str, missing: &str) -> Self {
        Self {
            step: step.to_string(),
            status_code: None,
            raw_body: None,
            parsed_fields: None,
            kind: OutcomeKind::PreconditionNotMet {
                missing: missing.to_string(),
            },
            latency: Duration::ZERO,
            timestamp: Utc::now(),
        }
    }

    pub fn classification(&self) -> Classification {
        self.kind.classification()
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.parsed_fields.as_ref().and_then(|f| f.get(name))
    }
}
// endregion: --- Step Outcome

// endregion: --- Tests
