/// 경매 서비스 HTTP 계약
/// 1. 경매 생성        POST   /auctions
/// 2. 판매자 경매 조회  GET    /auctions/seller?offset=&size=
/// 3. 경매 취소        DELETE /auctions/{auctionId}
/// 4. 입찰            POST   /auctions/{auctionId}/purchase
/// 5. 입찰 취소(환불)   DELETE /auctions/{receiptId}/refund
// region:    --- Imports
use serde_json::Value;

use super::model::{AuctionDraft, PurchaseRequest};
use crate::action::ActionRequest;

// endregion: --- Imports

/// 판매자 경매 목록 페이지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellerPage {
    pub offset: u32,
    pub size: u32,
}

impl Default for SellerPage {
    fn default() -> Self {
        Self {
            offset: 0,
            size: 10,
        }
    }
}

impl SellerPage {
    // 서비스 허용 범위: 1 ~ 100
    pub fn new(offset: u32, size: u32) -> Option<Self> {
        (1..=100)
            .contains(&size)
            .then_some(Self { offset, size })
    }
}

/// 경로에 들어갈 ID 표기 (문자열은 따옴표 없이, 예약 문자는 퍼센트 인코딩)
pub fn path_segment(id: &Value) -> String {
    let raw = match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                char::from(b).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}

pub fn create_auction(draft: &AuctionDraft) -> Result<ActionRequest, serde_json::Error> {
    Ok(ActionRequest::post("/auctions", serde_json::to_value(draft)?))
}

pub fn list_seller_auctions(page: SellerPage) -> ActionRequest {
    ActionRequest::get(format!(
        "/auctions/seller?offset={}&size={}",
        page.offset, page.size
    ))
}

pub fn cancel_auction(auction_id: &Value) -> ActionRequest {
    ActionRequest::delete(format!("/auctions/{}", path_segment(auction_id)))
}

pub fn purchase(
    auction_id: &Value,
    request: &PurchaseRequest,
) -> Result<ActionRequest, serde_json::Error> {
    Ok(ActionRequest::post(
        format!("/auctions/{}/purchase", path_segment(auction_id)),
        serde_json::to_value(request)?,
    ))
}

pub fn refund(receipt_id: &Value) -> ActionRequest {
    ActionRequest::delete(format!("/auctions/{}/refund", path_segment(receipt_id)))
}
