//! Cart Items Repository

use std::collections::BTreeMap;

use smallvec::SmallVec;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, types::Json};
use uuid::Uuid;

use bazaar::{
    cart::CartItem,
    ids::{CartId, DiscountId, ProductId, VariantId},
};

use crate::database::{amount_to_sql, count_to_sql, try_get_amount, try_get_count};

const GET_CART_ITEMS_SQL: &str = include_str!("../sql/get_cart_items.sql");
const DELETE_CART_ITEMS_SQL: &str = include_str!("../sql/delete_cart_items.sql");
const CREATE_CART_ITEM_SQL: &str = include_str!("../sql/create_cart_item.sql");

struct CartItemRow(CartItem);

#[derive(Debug, Clone, Default)]
pub(crate) struct PgCartItemsRepository;

impl PgCartItemsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Lines of a cart in insertion order.
    pub(crate) async fn get_cart_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartId,
    ) -> Result<Vec<CartItem>, sqlx::Error> {
        let rows = query_as::<Postgres, CartItemRow>(GET_CART_ITEMS_SQL)
            .bind(cart.into_uuid())
            .fetch_all(&mut **tx)
            .await?;

        Ok(rows.into_iter().map(|CartItemRow(item)| item).collect())
    }

    /// Replace every line of a cart.
    pub(crate) async fn replace_cart_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartId,
        items: &[CartItem],
    ) -> Result<(), sqlx::Error> {
        query(DELETE_CART_ITEMS_SQL)
            .bind(cart.into_uuid())
            .execute(&mut **tx)
            .await?;

        for (position, item) in items.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|e| sqlx::Error::Encode(format!("position: {e}").into()))?;

            let applied: Vec<Uuid> = item
                .applied_discount_ids
                .iter()
                .map(|id| id.into_uuid())
                .collect();

            query(CREATE_CART_ITEM_SQL)
                .bind(cart.into_uuid())
                .bind(position)
                .bind(item.product_id.into_uuid())
                .bind(item.variant_id.map(VariantId::into_uuid))
                .bind(count_to_sql(item.quantity, "quantity")?)
                .bind(&item.product_name)
                .bind(Json(&item.variant_options))
                .bind(item.image.as_deref())
                .bind(amount_to_sql(item.unit_price, "unit_price")?)
                .bind(amount_to_sql(item.line_total, "line_total")?)
                .bind(amount_to_sql(item.discount_amount, "discount_amount")?)
                .bind(amount_to_sql(item.final_line_total, "final_line_total")?)
                .bind(applied)
                .bind(item.available)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }
}

impl<'r> FromRow<'r, PgRow> for CartItemRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let variant: Option<Uuid> = row.try_get("variant_uuid")?;
        let options: Json<BTreeMap<String, String>> = row.try_get("variant_options")?;
        let applied: Vec<Uuid> = row.try_get("applied_discount_uuids")?;

        Ok(Self(CartItem {
            product_id: ProductId::from_uuid(row.try_get("product_uuid")?),
            variant_id: variant.map(VariantId::from_uuid),
            quantity: try_get_count(row, "quantity")?,
            product_name: row.try_get("product_name")?,
            variant_options: options.0,
            image: row.try_get("image")?,
            unit_price: try_get_amount(row, "unit_price")?,
            line_total: try_get_amount(row, "line_total")?,
            discount_amount: try_get_amount(row, "discount_amount")?,
            final_line_total: try_get_amount(row, "final_line_total")?,
            applied_discount_ids: applied
                .into_iter()
                .map(DiscountId::from_uuid)
                .collect::<SmallVec<_>>(),
            available: row.try_get("available")?,
        }))
    }
}
