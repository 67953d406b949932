// region:    --- Imports
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

// endregion: --- Imports

// 서비스가 허용하는 경매 최대 진행 시간 (분)
const MAX_AUCTION_MINUTES: i64 = 60;
const MAX_DISCOUNT_RATE: f64 = 50.0;

// region:    --- Errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DraftError {
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("auction must start after the request time and finish after it starts")]
    InvalidSchedule,
    #[error("auction duration must be at most 60 minutes in whole minutes, got {0}s")]
    InvalidDuration(i64),
    #[error("variation duration {variation}s must divide the auction duration {auction}s")]
    InvalidVariation { variation: i64, auction: i64 },
    #[error("stock {stock} must cover the purchase limit {limit}")]
    StockBelowLimit { stock: u64, limit: u64 },
    #[error("discount rate {0} must be within (0, 50]")]
    InvalidDiscountRate(f64),
    #[error("price drops to {0} before the auction ends")]
    PriceExhausted(i64),
    #[error("{name} {value} exceeds the supported maximum {max}", max = i64::MAX)]
    OutOfRange { name: &'static str, value: u64 },
}
// endregion: --- Errors

// region:    --- Price Policy
/// 가격 정책
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricePolicy {
    /// 변동 주기마다 일정 금액 인하
    Constant {
        #[serde(rename = "variationWidth")]
        variation_width: u64,
    },
    /// 변동 주기마다 일정 비율 인하
    Percentage {
        #[serde(rename = "discountRate")]
        discount_rate: f64,
    },
}

impl PricePolicy {
    /// 변동 횟수가 적용된 가격
    pub fn price_at_variation(&self, origin_price: u64, variation_count: i64) -> i64 {
        let origin = i64::try_from(origin_price).unwrap_or(i64::MAX);
        match self {
            PricePolicy::Constant { variation_width } => {
                let width = i64::try_from(*variation_width).unwrap_or(i64::MAX);
                origin.saturating_sub(width.saturating_mul(variation_count))
            }
            PricePolicy::Percentage { discount_rate } => {
                let factor = (100.0 - discount_rate) / 100.0;
                let mut price = origin;
                for _ in 0..variation_count {
                    price = (price as f64 * factor).floor() as i64;
                }
                price
            }
        }
    }

    fn validate(&self) -> Result<(), DraftError> {
        match self {
            PricePolicy::Constant { variation_width } if *variation_width == 0 => {
                Err(DraftError::NotPositive("variationWidth"))
            }
            PricePolicy::Constant { variation_width } if i64::try_from(*variation_width).is_err() => {
                Err(DraftError::OutOfRange {
                    name: "variationWidth",
                    value: *variation_width,
                })
            }
            PricePolicy::Percentage { discount_rate }
                if *discount_rate <= 0.0 || *discount_rate > MAX_DISCOUNT_RATE =>
            {
                Err(DraftError::InvalidDiscountRate(*discount_rate))
            }
            _ => Ok(()),
        }
    }
}
// endregion: --- Price Policy

// region:    --- Auction Draft
/// 경매 생성 템플릿 (시간 값은 요청 시점 기준 오프셋)
#[derive(Debug, Clone, PartialEq)]
pub struct DraftTemplate {
    pub product_name: String,
    pub origin_price: u64,
    pub stock: u64,
    pub maximum_purchase_limit_count: u64,
    pub price_policy: PricePolicy,
    pub variation_duration: Duration,
    pub start_offset: Duration,
    pub auction_duration: Duration,
    pub is_show_stock: bool,
}

impl Default for DraftTemplate {
    fn default() -> Self {
        Self {
            product_name: "Sample Product".to_string(),
            origin_price: 10000,
            stock: 50,
            maximum_purchase_limit_count: 5,
            price_policy: PricePolicy::Constant {
                variation_width: 10,
            },
            variation_duration: Duration::minutes(1),
            start_offset: Duration::minutes(1),
            auction_duration: Duration::minutes(60),
            is_show_stock: true,
        }
    }
}

impl DraftTemplate {
    /// 서비스의 생성 규칙을 미리 검증
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.product_name.trim().is_empty() {
            return Err(DraftError::NotPositive("productName length"));
        }
        if self.origin_price == 0 {
            return Err(DraftError::NotPositive("originPrice"));
        }
        if i64::try_from(self.origin_price).is_err() {
            return Err(DraftError::OutOfRange {
                name: "originPrice",
                value: self.origin_price,
            });
        }
        if self.stock == 0 {
            return Err(DraftError::NotPositive("stock"));
        }
        if self.maximum_purchase_limit_count == 0 {
            return Err(DraftError::NotPositive("maximumPurchaseLimitCount"));
        }
        if self.stock < self.maximum_purchase_limit_count {
            return Err(DraftError::StockBelowLimit {
                stock: self.stock,
                limit: self.maximum_purchase_limit_count,
            });
        }
        if self.start_offset <= Duration::zero() || self.auction_duration <= Duration::zero() {
            return Err(DraftError::InvalidSchedule);
        }

        let auction = self.auction_duration.num_seconds();
        if auction > MAX_AUCTION_MINUTES * 60
            || auction % 60 != 0
            || self.auction_duration != Duration::seconds(auction)
        {
            return Err(DraftError::InvalidDuration(auction));
        }

        let variation = self.variation_duration.num_seconds();
        if variation <= 0 || auction % variation != 0 {
            return Err(DraftError::InvalidVariation { variation, auction });
        }

        self.price_policy.validate()?;
        let last_variation = auction / variation - 1;
        let lowest = self
            .price_policy
            .price_at_variation(self.origin_price, last_variation);
        if lowest <= 0 {
            return Err(DraftError::PriceExhausted(lowest));
        }
        Ok(())
    }

    /// 요청 시각 기준으로 경매 생성 요청 본문 생성
    pub fn draft_at(&self, now: NaiveDateTime) -> Result<AuctionDraft, DraftError> {
        self.validate()?;
        let started_at = now + self.start_offset;
        let finished_at = started_at + self.auction_duration;
        AuctionDraft {
            product_name: self.product_name.clone(),
            origin_price: self.origin_price,
            stock: self.stock,
            maximum_purchase_limit_count: self.maximum_purchase_limit_count,
            price_policy: self.price_policy.clone(),
            variation_duration: self.variation_duration,
            request_time: now,
            started_at,
            finished_at,
            is_show_stock: self.is_show_stock,
        }
        .checked()
    }
}

/// 경매 생성 요청 본문
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionDraft {
    pub product_name: String,
    pub origin_price: u64,
    pub stock: u64,
    pub maximum_purchase_limit_count: u64,
    pub price_policy: PricePolicy,
    #[serde(serialize_with = "serialize_iso8601")]
    pub variation_duration: Duration,
    pub request_time: NaiveDateTime,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub is_show_stock: bool,
}

impl AuctionDraft {
    fn checked(self) -> Result<Self, DraftError> {
        if self.request_time < self.started_at && self.started_at < self.finished_at {
            Ok(self)
        } else {
            Err(DraftError::InvalidSchedule)
        }
    }
}

/// ISO-8601 기간 표기 (예: PT1M, PT1H30M, PT45S)
pub fn format_iso8601(duration: Duration) -> String {
    let total = duration.num_seconds();
    if total == 0 {
        return "PT0S".to_string();
    }
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut out = format!("{}PT", sign);
    if hours > 0 {
        out.push_str(&format!("{}H", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}M", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}S", seconds));
    }
    out
}

fn serialize_iso8601<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_iso8601(*duration))
}
// endregion: --- Auction Draft

// region:    --- Purchase
/// 입찰(구매) 요청 본문
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub price: u64,
    pub quantity: u64,
}

impl PurchaseRequest {
    pub fn new(price: u64, quantity: u64) -> Result<Self, DraftError> {
        if price == 0 {
            return Err(DraftError::NotPositive("price"));
        }
        if quantity == 0 {
            return Err(DraftError::NotPositive("quantity"));
        }
        Ok(Self { price, quantity })
    }
}

impl Default for PurchaseRequest {
    fn default() -> Self {
        Self {
            price: 10000,
            quantity: 1,
        }
    }
}
// endregion: --- Purchase

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use serde_json::json;

    #[test]
    fn default_draft_keeps_schedule_ordering() {
        let now = Local::now().naive_local();
        let draft = DraftTemplate::default().draft_at(now).unwrap();
        assert!(draft.request_time <= draft.started_at);
        assert!(draft.started_at < draft.finished_at);
        assert_eq!(draft.finished_at - draft.started_at, Duration::minutes(60));
    }

    #[test]
    fn draft_serializes_with_service_field_names() {
        let now = NaiveDateTime::parse_from_str("2024-11-29T10:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        let draft = DraftTemplate::default().draft_at(now).unwrap();
        let body = serde_json::to_value(&draft).unwrap();
        assert_eq!(body["productName"], json!("Sample Product"));
        assert_eq!(body["originPrice"], json!(10000));
        assert_eq!(body["maximumPurchaseLimitCount"], json!(5));
        assert_eq!(
            body["pricePolicy"],
            json!({"type": "CONSTANT", "variationWidth": 10})
        );
        assert_eq!(body["variationDuration"], json!("PT1M"));
        assert_eq!(body["startedAt"], json!("2024-11-29T10:01:00"));
        assert_eq!(body["finishedAt"], json!("2024-11-29T11:01:00"));
        assert_eq!(body["isShowStock"], json!(true));
    }

    #[test]
    fn percentage_policy_serializes_discount_rate() {
        let policy = PricePolicy::Percentage {
            discount_rate: 10.0,
        };
        assert_eq!(
            serde_json::to_value(&policy).unwrap(),
            json!({"type": "PERCENTAGE", "discountRate": 10.0})
        );
        assert_eq!(policy.price_at_variation(10000, 2), 8100);
    }

    #[test]
    fn rejects_duration_longer_than_an_hour() {
        let template = DraftTemplate {
            auction_duration: Duration::minutes(61),
            ..DraftTemplate::default()
        };
        assert_eq!(template.validate(), Err(DraftError::InvalidDuration(3660)));
    }

    #[test]
    fn rejects_variation_that_does_not_divide_duration() {
        let template = DraftTemplate {
            variation_duration: Duration::minutes(7),
            ..DraftTemplate::default()
        };
        assert!(matches!(
            template.validate(),
            Err(DraftError::InvalidVariation { .. })
        ));
    }

    #[test]
    fn rejects_price_that_would_reach_zero() {
        let template = DraftTemplate {
            origin_price: 500,
            ..DraftTemplate::default()
        };
        assert_eq!(template.validate(), Err(DraftError::PriceExhausted(-90)));
    }

    #[test]
    fn rejects_prices_beyond_i64() {
        let template = DraftTemplate {
            origin_price: u64::MAX,
            ..DraftTemplate::default()
        };
        assert_eq!(
            template.validate(),
            Err(DraftError::OutOfRange {
                name: "originPrice",
                value: u64::MAX,
            })
        );

        let template = DraftTemplate {
            price_policy: PricePolicy::Constant {
                variation_width: u64::MAX,
            },
            ..DraftTemplate::default()
        };
        assert!(matches!(
            template.validate(),
            Err(DraftError::OutOfRange {
                name: "variationWidth",
                ..
            })
        ));
        assert_eq!(
            PricePolicy::Constant {
                variation_width: u64::MAX
            }
            .price_at_variation(100, 3),
            100 - i64::MAX
        );
    }

    #[test]
    fn rejects_stock_below_purchase_limit() {
        let template = DraftTemplate {
            stock: 2,
            ..DraftTemplate::default()
        };
        assert_eq!(
            template.validate(),
            Err(DraftError::StockBelowLimit { stock: 2, limit: 5 })
        );
    }

    #[test]
    fn iso8601_formatting() {
        assert_eq!(format_iso8601(Duration::minutes(1)), "PT1M");
        assert_eq!(format_iso8601(Duration::seconds(5430)), "PT1H30M30S");
        assert_eq!(format_iso8601(Duration::zero()), "PT0S");
    }

    #[test]
    fn purchase_rejects_zero_quantity() {
        assert_eq!(
            PurchaseRequest::new(10000, 0),
            Err(DraftError::NotPositive("quantity"))
        );
    }
}
// endregion: --- Tests
