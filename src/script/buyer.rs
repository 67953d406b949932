/// 구매자 스크립트
/// 1. 입찰 (핸드오프로 받은 경매 ID 필요)
/// 2. 입찰 취소 (입찰로 받은 영수증 ID 를 한 번만 사용)
// region:    --- Imports
use super::{ActorScript, BuildError, ScriptError, SequenceMode, Step};
use crate::actor::ActorRole;
use crate::auction::model::PurchaseRequest;
use crate::auction::requests;
use crate::outcome::ResponseShape;

// endregion: --- Imports

pub const SUBMIT_BID: &str = "submit_bid";
pub const CANCEL_BID: &str = "cancel_bid";

pub const AUCTION_ID: &str = super::seller::AUCTION_ID;
pub const RECEIPT_ID: &str = "receiptId";

/// 입찰
/// 실패하면 취소할 영수증이 없으므로 인스턴스를 종료한다.
pub fn submit_bid_step(bid: PurchaseRequest) -> Step {
    Step::new(SUBMIT_BID, move |state| {
        let auction_id = state.require(AUCTION_ID)?;
        requests::purchase(auction_id, &bid).map_err(|e| BuildError::Invalid(e.to_string()))
    })
    .weight(1)
    .expect(ResponseShape::Object(&[RECEIPT_ID]))
    .capture(RECEIPT_ID, RECEIPT_ID)
    .halt_on_failure()
}

/// 입찰 취소 (환불)
pub fn cancel_bid_step() -> Step {
    Step::new(CANCEL_BID, |state| {
        Ok(requests::refund(state.require(RECEIPT_ID)?))
    })
    .weight(1)
    .consumes(RECEIPT_ID)
}

pub fn script(mode: SequenceMode, bid: PurchaseRequest) -> Result<ActorScript, ScriptError> {
    PurchaseRequest::new(bid.price, bid.quantity)
        .map_err(|e| ScriptError::Invalid(e.to_string()))?;
    ActorScript::new(
        ActorRole::Buyer,
        mode,
        vec![submit_bid_step(bid), cancel_bid_step()],
    )
}
