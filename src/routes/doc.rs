use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{AddToCartRequest, CartItemDto, CartList},
        coupons::{
            CouponList, CouponQuoteResponse, CreateCouponRequest, UpdateCouponRequest,
            ValidateCouponRequest,
        },
        notifications::NotificationList,
        orders::{
            CancelOrderRequest, OrderList, OrderWithItems, PlaceOrderRequest, RequestedItem,
            ReturnOrderRequest,
        },
    },
    lifecycle::OrderStatus,
    models::{
        CartItem, Coupon, DiscountType, Notification, Order, OrderItem, PaymentMethod, Product,
        ProductVariant, Recipient, ShippingAddress, User,
    },
    response::{ApiResponse, Meta},
    routes::{cart, coupons, health, notifications, orders, params},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        orders::place_order,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        orders::request_return,
        coupons::validate_coupon,
        coupons::list_coupons,
        coupons::create_coupon,
        coupons::update_coupon,
        coupons::delete_coupon,
        notifications::list_notifications,
        notifications::mark_read
    ),
    components(
        schemas(
            User,
            Product,
            ProductVariant,
            CartItem,
            Order,
            OrderItem,
            OrderStatus,
            PaymentMethod,
            DiscountType,
            ShippingAddress,
            Coupon,
            Notification,
            Recipient,
            AddToCartRequest,
            CartItemDto,
            CartList,
            PlaceOrderRequest,
            RequestedItem,
            CancelOrderRequest,
            ReturnOrderRequest,
            OrderWithItems,
            OrderList,
            ValidateCouponRequest,
            CouponQuoteResponse,
            CreateCouponRequest,
            UpdateCouponRequest,
            CouponList,
            NotificationList,
            params::Pagination,
            params::OrderListQuery,
            params::CouponListQuery,
            Meta,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<CouponList>,
            ApiResponse<CouponQuoteResponse>,
            ApiResponse<NotificationList>,
            ApiResponse<CartList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order lifecycle endpoints"),
        (name = "Coupons", description = "Coupon validation and admin CRUD"),
        (name = "Notifications", description = "In-app notification feed"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
