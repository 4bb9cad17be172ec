pub mod cart_service;
pub mod coupon_service;
pub mod inventory;
pub mod notification_service;
pub mod order_service;
