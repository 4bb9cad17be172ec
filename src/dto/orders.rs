use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem, PaymentMethod, ShippingAddress};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    /// Only honored for guest checkout; authenticated callers order their
    /// stored cart.
    pub items: Option<Vec<RequestedItem>>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub coupon: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestedItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub color: Option<String>,
    pub size: Option<String>,
    /// Guest checkout carries client prices; the server still recomputes
    /// the order total from price × quantity.
    pub price: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReturnOrderRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
