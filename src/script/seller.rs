/// 판매자 스크립트
/// 1. 경매 생성 (생성된 ID 를 구매자에게 핸드오프)
/// 2. 판매자 경매 목록 조회
/// 3. 경매 취소
// region:    --- Imports
use chrono::Local;

use super::{ActorScript, BuildError, ScriptError, SequenceMode, Step};
use crate::actor::ActorRole;
use crate::auction::model::DraftTemplate;
use crate::auction::requests::{self, SellerPage};
use crate::handoff::{HandoffDispatch, HandoffSpec};
use crate::outcome::ResponseShape;

// endregion: --- Imports

pub const CREATE_AUCTION: &str = "create_auction";
pub const LIST_AUCTIONS: &str = "list_auctions";
pub const CANCEL_AUCTION: &str = "cancel_auction";

/// 이 인스턴스가 생성한 경매 ID
pub const AUCTION_ID: &str = "auctionId";
/// 목록 조회에서 받은 첫 번째 경매 ID
pub const LISTED_AUCTION_ID: &str = "listedAuctionId";

/// 경매 생성
pub fn create_auction_step(template: DraftTemplate, handoff: Option<HandoffDispatch>) -> Step {
    let step = Step::new(CREATE_AUCTION, move |_| {
        let draft = template
            .draft_at(Local::now().naive_local())
            .map_err(|e| BuildError::Invalid(e.to_string()))?;
        requests::create_auction(&draft).map_err(|e| BuildError::Invalid(e.to_string()))
    })
    .weight(1)
    .expect(ResponseShape::Object(&["id"]))
    .capture("id", AUCTION_ID);

    match handoff {
        Some(dispatch) => step.handoff(HandoffSpec::new(ActorRole::Buyer, &[AUCTION_ID], dispatch)),
        None => step,
    }
}

/// 판매자 경매 목록 조회
pub fn list_auctions_step(page: SellerPage) -> Step {
    Step::new(LIST_AUCTIONS, move |_| Ok(requests::list_seller_auctions(page)))
        .weight(2)
        .expect(ResponseShape::List(&["id"]))
        .capture("id", LISTED_AUCTION_ID)
}

/// 경매 취소
/// 목록에서 받은 ID 가 아니라 이 인스턴스가 직접 생성한 경매를 취소한다.
pub fn cancel_auction_step() -> Step {
    Step::new(CANCEL_AUCTION, |state| {
        Ok(requests::cancel_auction(state.require(AUCTION_ID)?))
    })
    .weight(3)
    .consumes(AUCTION_ID)
}

pub fn script(
    mode: SequenceMode,
    template: DraftTemplate,
    handoff: Option<HandoffDispatch>,
) -> Result<ActorScript, ScriptError> {
    template
        .validate()
        .map_err(|e| ScriptError::Invalid(e.to_string()))?;
    ActorScript::new(
        ActorRole::Seller,
        mode,
        vec![
            create_auction_step(template, handoff),
            list_auctions_step(SellerPage::default()),
            cancel_auction_step(),
        ],
    )
}
