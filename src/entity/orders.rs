use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub coupon_code: Option<String>,
    pub status: String,
    pub payment_method: String,
    pub payment_status: String,
    pub shipping_address: Json,
    pub invoice_number: String,
    pub cancellation_reason: Option<String>,
    pub return_reason: Option<String>,
    pub admin_note: Option<String>,
    pub paid_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(has_many = "super::order_items::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::coupon_usages::Entity")]
    CouponUsages,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::order_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::coupon_usages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CouponUsages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
