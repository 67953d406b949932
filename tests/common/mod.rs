#![allow(dead_code)]

use async_trait::async_trait;
use auction_load_tester::action::{ActionRequest, Transport, TransportError};
use auction_load_tester::outcome::RawResponse;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use chrono::NaiveDateTime;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const SELLER_TOKEN: &str = "seller-token";
pub const BUYER_TOKEN: &str = "buyer-token";

/// 트레이싱 초기화 (여러 테스트에서 호출해도 한 번만 설치)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

// region:    --- Mock Auction Service
struct Auction {
    owner: String,
    cancelled: bool,
}

#[derive(Default)]
struct MockState {
    next_auction: u64,
    next_receipt: u64,
    auctions: HashMap<String, Auction>,
    created: Vec<String>,
    refunded: HashMap<String, bool>,
    requests: Vec<String>,
}

/// 메모리 경매 서비스 (ID 는 A1, A2 ... / 영수증은 R1, R2 ...)
#[derive(Clone, Default)]
pub struct MockAuction {
    state: Arc<Mutex<MockState>>,
}

impl MockAuction {
    pub fn new() -> Self {
        Self::default()
    }

    /// 받은 요청 목록 ("METHOD path")
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    /// 처리 없이 요청만 기록
    pub fn record(&self, method: &str, path_and_query: &str) {
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("{} {}", method, path_and_query));
    }

    pub fn handle(
        &self,
        method: &str,
        path_and_query: &str,
        authorization: Option<&str>,
        body: &str,
    ) -> (u16, String) {
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("{} {}", method, path_and_query));

        let token = match authorization.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) if token == SELLER_TOKEN || token == BUYER_TOKEN => token.to_string(),
            _ => return (401, json!({"message": "unauthorized"}).to_string()),
        };

        let path = path_and_query.split('?').next().unwrap_or_default();
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            ("POST", ["auctions"]) => match validate_draft(body) {
                Ok(()) => {
                    state.next_auction += 1;
                    let id = format!("A{}", state.next_auction);
                    state.auctions.insert(
                        id.clone(),
                        Auction {
                            owner: token,
                            cancelled: false,
                        },
                    );
                    state.created.push(id.clone());
                    (200, json!({"id": id}).to_string())
                }
                Err(message) => (400, json!({"message": message}).to_string()),
            },
            ("GET", ["auctions", "seller"]) => {
                let mut owned: Vec<&String> = state
                    .auctions
                    .iter()
                    .filter(|(_, a)| a.owner == token && !a.cancelled)
                    .map(|(id, _)| id)
                    .collect();
                owned.sort();
                let items: Vec<Value> = owned.into_iter().map(|id| json!({"id": id})).collect();
                (200, Value::Array(items).to_string())
            }
            ("DELETE", ["auctions", id]) => match state.auctions.get_mut(*id) {
                Some(auction) if !auction.cancelled => {
                    auction.cancelled = true;
                    (200, String::new())
                }
                Some(_) => (409, json!({"message": "already cancelled"}).to_string()),
                None => (404, json!({"message": "auction not found"}).to_string()),
            },
            ("POST", ["auctions", id, "purchase"]) => {
                let open = state.auctions.get(*id).map(|a| !a.cancelled).unwrap_or(false);
                let valid = serde_json::from_str::<Value>(body)
                    .map(|b| b["price"].as_u64().is_some() && b["quantity"].as_u64() > Some(0))
                    .unwrap_or(false);
                if !open {
                    (404, json!({"message": "auction not open"}).to_string())
                } else if !valid {
                    (400, json!({"message": "invalid purchase"}).to_string())
                } else {
                    state.next_receipt += 1;
                    let receipt = format!("R{}", state.next_receipt);
                    state.refunded.insert(receipt.clone(), false);
                    (200, json!({"receiptId": receipt}).to_string())
                }
            }
            ("DELETE", ["auctions", receipt, "refund"]) => match state.refunded.get_mut(*receipt) {
                Some(refunded) if !*refunded => {
                    *refunded = true;
                    (200, String::new())
                }
                Some(_) => (409, json!({"message": "already refunded"}).to_string()),
                None => (404, json!({"message": "receipt not found"}).to_string()),
            },
            _ => (404, String::new()),
        }
    }
}

fn validate_draft(body: &str) -> Result<(), String> {
    let draft: Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let time = |key: &str| {
        draft[key]
            .as_str()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok())
            .ok_or_else(|| format!("{} is missing", key))
    };
    let (request_time, started_at, finished_at) =
        (time("requestTime")?, time("startedAt")?, time("finishedAt")?);
    if started_at >= finished_at || request_time > started_at {
        return Err("invalid schedule".to_string());
    }
    if draft["stock"].as_u64().unwrap_or(0) == 0 {
        return Err("stock must be positive".to_string());
    }
    Ok(())
}
// endregion: --- Mock Auction Service

// region:    --- Fake Transport
/// 네트워크 없이 MockAuction 을 호출하는 전송 계층
pub struct FakeTransport {
    pub mock: MockAuction,
    pub down: bool,
    // 요청은 기록하되 항상 200 HTML 페이지로 응답
    pub maintenance: bool,
}

impl FakeTransport {
    pub fn new(mock: MockAuction) -> Arc<Self> {
        Arc::new(Self {
            mock,
            down: false,
            maintenance: false,
        })
    }

    /// 모든 요청이 연결 실패
    pub fn unreachable(mock: MockAuction) -> Arc<Self> {
        Arc::new(Self {
            mock,
            down: true,
            maintenance: false,
        })
    }

    /// 프록시 점검 페이지처럼 모든 요청에 200 HTML 로 응답
    pub fn maintenance(mock: MockAuction) -> Arc<Self> {
        Arc::new(Self {
            mock,
            down: false,
            maintenance: true,
        })
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &ActionRequest) -> Result<RawResponse, TransportError> {
        if self.down {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let body = request
            .body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        if self.maintenance {
            self.mock.record(&request.method.to_string(), &request.path);
            return Ok(RawResponse {
                status: 200,
                body: "<html>maintenance</html>".to_string(),
            });
        }
        let (status, body) = self.mock.handle(
            &request.method.to_string(),
            &request.path,
            request.header("Authorization"),
            &body,
        );
        Ok(RawResponse { status, body })
    }
}
// endregion: --- Fake Transport

// region:    --- Mock Server
async fn serve(
    State(mock): State<MockAuction>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok());
    let (status, body) = mock.handle(method.as_str(), &path, authorization, &body);
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        body,
    )
}

/// 임의 포트에 목 서버를 띄우고 base URL 반환
pub async fn spawn_server(mock: MockAuction) -> String {
    let app = Router::new().fallback(serve).with_state(mock);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// 아무도 듣지 않는 주소
pub async fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
// endregion: --- Mock Server
