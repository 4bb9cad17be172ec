//! Inventory ledger: the only code that moves stock counters.
//!
//! Every mutation is a single conditional UPDATE so two concurrent
//! checkouts cannot both observe enough stock and both win. Callers run
//! `reserve` inside their transaction; on error the rollback undoes the
//! lines already decremented, making the call all-or-nothing.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    entity::{
        product_variants::{Column as VariantCol, Entity as ProductVariants},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
};

/// Exact (color, size) pair selecting a variant counter. A line with a
/// key that matches no variant fails outright; it never falls back to
/// the product-level counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantKey {
    pub color: String,
    pub size: String,
}

#[derive(Debug, Clone)]
pub struct StockLine {
    pub product_id: Uuid,
    pub variant: Option<VariantKey>,
    pub quantity: i32,
}

/// Decrement the matching counter for every line, conditioned on
/// `stock >= quantity`.
pub async fn reserve<C: ConnectionTrait>(conn: &C, lines: &[StockLine]) -> AppResult<()> {
    for line in lines {
        if line.quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be greater than 0".to_string(),
            ));
        }

        let affected = match &line.variant {
            Some(key) => {
                ProductVariants::update_many()
                    .col_expr(
                        VariantCol::Stock,
                        Expr::col(VariantCol::Stock).sub(line.quantity),
                    )
                    .filter(VariantCol::ProductId.eq(line.product_id))
                    .filter(VariantCol::Color.eq(key.color.clone()))
                    .filter(VariantCol::Size.eq(key.size.clone()))
                    .filter(VariantCol::Stock.gte(line.quantity))
                    .exec(conn)
                    .await?
                    .rows_affected
            }
            None => {
                Products::update_many()
                    .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(line.quantity))
                    .filter(ProdCol::Id.eq(line.product_id))
                    .filter(ProdCol::Stock.gte(line.quantity))
                    .exec(conn)
                    .await?
                    .rows_affected
            }
        };

        if affected == 0 {
            return Err(reserve_failure(conn, line).await?);
        }
    }
    Ok(())
}

/// Zero rows touched: either the reference is bad or the stock ran out.
/// One extra read tells the caller which, so the customer sees a usable
/// message.
async fn reserve_failure<C: ConnectionTrait>(conn: &C, line: &StockLine) -> AppResult<AppError> {
    match &line.variant {
        Some(key) => {
            let variant = ProductVariants::find()
                .filter(VariantCol::ProductId.eq(line.product_id))
                .filter(VariantCol::Color.eq(key.color.clone()))
                .filter(VariantCol::Size.eq(key.size.clone()))
                .one(conn)
                .await?;
            match variant {
                None => Ok(AppError::BadRequest(format!(
                    "No {} / {} variant for product {}",
                    key.color, key.size, line.product_id
                ))),
                Some(_) => Ok(AppError::InsufficientStock(format!(
                    "Insufficient stock for product {}",
                    line.product_id
                ))),
            }
        }
        None => {
            let product = Products::find_by_id(line.product_id).one(conn).await?;
            match product {
                None => Ok(AppError::BadRequest(format!(
                    "Product {} not found",
                    line.product_id
                ))),
                Some(_) => Ok(AppError::InsufficientStock(format!(
                    "Insufficient stock for product {}",
                    line.product_id
                ))),
            }
        }
    }
}

/// Unconditional increment, the mirror of `reserve`. At-most-once per
/// reservation is guaranteed by the order status guards, not here.
pub async fn release<C: ConnectionTrait>(conn: &C, lines: &[StockLine]) -> AppResult<()> {
    for line in lines {
        let affected = match &line.variant {
            Some(key) => {
                ProductVariants::update_many()
                    .col_expr(
                        VariantCol::Stock,
                        Expr::col(VariantCol::Stock).add(line.quantity),
                    )
                    .filter(VariantCol::ProductId.eq(line.product_id))
                    .filter(VariantCol::Color.eq(key.color.clone()))
                    .filter(VariantCol::Size.eq(key.size.clone()))
                    .exec(conn)
                    .await?
                    .rows_affected
            }
            None => {
                Products::update_many()
                    .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(line.quantity))
                    .filter(ProdCol::Id.eq(line.product_id))
                    .exec(conn)
                    .await?
                    .rows_affected
            }
        };

        if affected == 0 {
            return Err(AppError::Internal(anyhow::anyhow!(
                "stock release matched no counter for product {}",
                line.product_id
            )));
        }
    }
    Ok(())
}
