use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::lifecycle::OrderStatus;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

/// A concrete (color, size) configuration of a product, with its own
/// price and stock counter.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub color: String,
    pub size: String,
    pub price: i64,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub variant_color: Option<String>,
    pub variant_size: Option<String>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash on delivery; the order starts unpaid.
    Cod,
    /// Pre-verified online payment; verification happened at the gateway
    /// before this service sees the order.
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Online => "online",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "cod" => Some(PaymentMethod::Cod),
            "online" => Some(PaymentMethod::Online),
            _ => None,
        }
    }
}

/// Address snapshot frozen onto the order at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    /// None for guest checkout.
    pub user_id: Option<Uuid>,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: String,
    pub shipping_address: ShippingAddress,
    pub invoice_number: String,
    pub cancellation_reason: Option<String>,
    pub return_reason: Option<String>,
    pub admin_note: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub variant_color: Option<String>,
    pub variant_size: Option<String>,
    pub quantity: i32,
    /// Unit price captured at purchase time, never recomputed.
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "percentage" => Some(DiscountType::Percentage),
            "fixed" => Some(DiscountType::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub id: Uuid,
    /// Stored upper-cased; lookups normalize the same way.
    pub code: String,
    pub discount_type: DiscountType,
    pub value: i64,
    pub min_order_amount: Option<i64>,
    /// Cap on the computed discount; meaningful for percentage coupons.
    pub max_discount_amount: Option<i64>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who a notification is addressed to: one customer, or the whole
/// administrator group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Admin,
    User(Uuid),
}

impl Recipient {
    /// Column value for `notifications.recipient_id`; the admin group is
    /// the NULL row.
    pub fn to_column(&self) -> Option<Uuid> {
        match self {
            Recipient::Admin => None,
            Recipient::User(id) => Some(*id),
        }
    }

    pub fn from_column(value: Option<Uuid>) -> Self {
        match value {
            None => Recipient::Admin,
            Some(id) => Recipient::User(id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Recipient,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
