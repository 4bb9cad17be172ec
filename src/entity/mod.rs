pub mod audit_logs;
pub mod cart_items;
pub mod coupon_usages;
pub mod coupons;
pub mod notifications;
pub mod order_items;
pub mod orders;
pub mod product_variants;
pub mod products;
pub mod push_subscriptions;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use coupon_usages::Entity as CouponUsages;
pub use coupons::Entity as Coupons;
pub use notifications::Entity as Notifications;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use push_subscriptions::Entity as PushSubscriptions;
pub use users::Entity as Users;
