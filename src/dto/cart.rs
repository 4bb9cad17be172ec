use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Color and size select a variant; both or neither.
    pub color: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartList {
    pub items: Vec<CartItemDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemDto {
    pub id: Uuid,
    pub product: Product,
    pub variant_color: Option<String>,
    pub variant_size: Option<String>,
    /// Current catalog price for the chosen configuration.
    pub unit_price: i64,
    pub quantity: i32,
}
