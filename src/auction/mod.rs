pub mod model;
pub mod requests;

pub use model::{AuctionDraft, DraftError, DraftTemplate, PricePolicy, PurchaseRequest};
