use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: String,
    pub value: i64,
    pub min_order_amount: Option<i64>,
    pub max_discount_amount: Option<i64>,
    pub is_active: bool,
    pub expires_at: Option<DateTimeWithTimeZone>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_usages::Entity")]
    CouponUsages,
}

impl Related<super::coupon_usages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CouponUsages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
