use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Coupon, DiscountType};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub cart_total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponQuoteResponse {
    pub success: bool,
    pub code: String,
    pub discount_amount: i64,
    pub discount_type: DiscountType,
    pub value: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: i64,
    pub min_order_amount: Option<i64>,
    pub max_discount_amount: Option<i64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCouponRequest {
    pub value: Option<i64>,
    pub min_order_amount: Option<i64>,
    pub max_discount_amount: Option<i64>,
    pub is_active: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponList {
    pub items: Vec<Coupon>,
}
