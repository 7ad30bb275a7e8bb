//! Carts Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, query_scalar};
use uuid::Uuid;

use bazaar::{
    cart::{Cart, CartOwner},
    ids::{CartId, CustomerId, DiscountId, ShopId},
};

use crate::database::{amount_to_sql, try_get_amount};

use super::PgCartItemsRepository;

const GET_CART_SQL: &str = include_str!("../sql/get_cart.sql");
const LOCK_CART_SQL: &str = include_str!("../sql/lock_cart.sql");
const FIND_CART_SQL: &str = include_str!("../sql/find_cart.sql");
const CREATE_CART_SQL: &str = include_str!("../sql/create_cart.sql");
const UPDATE_CART_SQL: &str = include_str!("../sql/update_cart.sql");

struct CartRow(Cart);

#[derive(Debug, Clone, Default)]
pub(crate) struct PgCartsRepository {
    items: PgCartItemsRepository,
}

impl PgCartsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            items: PgCartItemsRepository::new(),
        }
    }

    /// The cart belonging to `owner`, if one exists.
    pub(crate) async fn find_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner: &CartOwner,
    ) -> Result<Option<CartId>, sqlx::Error> {
        let (customer, session) = owner_columns(owner);

        let uuid: Option<Uuid> = query_scalar(FIND_CART_SQL)
            .bind(customer)
            .bind(session)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(uuid.map(CartId::from_uuid))
    }

    /// Insert an empty cart. Does nothing if the owner already has one.
    pub(crate) async fn create_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: &Cart,
    ) -> Result<(), sqlx::Error> {
        let (customer, session) = owner_columns(&cart.owner);

        query(CREATE_CART_SQL)
            .bind(cart.id.into_uuid())
            .bind(customer)
            .bind(session)
            .bind(&cart.currency)
            .bind(SqlxTimestamp::from(cart.created_at))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    pub(crate) async fn get_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartId,
    ) -> Result<Cart, sqlx::Error> {
        let CartRow(mut found) = query_as::<Postgres, CartRow>(GET_CART_SQL)
            .bind(cart.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        found.items = self.items.get_cart_items(tx, cart).await?;

        Ok(found)
    }

    /// Like [`get_cart`](Self::get_cart), holding the row lock until the
    /// transaction ends.
    pub(crate) async fn lock_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartId,
    ) -> Result<Cart, sqlx::Error> {
        let CartRow(mut found) = query_as::<Postgres, CartRow>(LOCK_CART_SQL)
            .bind(cart.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        found.items = self.items.get_cart_items(tx, cart).await?;

        Ok(found)
    }

    /// Write back totals, coupons and every line of a priced cart.
    pub(crate) async fn save_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: &Cart,
    ) -> Result<(), sqlx::Error> {
        let applied: Vec<Uuid> = cart
            .applied_discount_ids
            .iter()
            .map(|id| id.into_uuid())
            .collect();

        let rows_affected = query(UPDATE_CART_SQL)
            .bind(cart.id.into_uuid())
            .bind(amount_to_sql(cart.subtotal, "subtotal")?)
            .bind(amount_to_sql(cart.total_discounts, "total_discounts")?)
            .bind(amount_to_sql(cart.shipping_cost, "shipping_cost")?)
            .bind(amount_to_sql(cart.tax_amount, "tax_amount")?)
            .bind(amount_to_sql(cart.grand_total, "grand_total")?)
            .bind(applied)
            .bind(SqlxTimestamp::from(cart.updated_at))
            .execute(&mut **tx)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        self.items.replace_cart_items(tx, cart.id, &cart.items).await
    }
}

fn owner_columns(owner: &CartOwner) -> (Option<Uuid>, Option<&str>) {
    match owner {
        CartOwner::Customer { customer_id } => (Some(customer_id.into_uuid()), None),
        CartOwner::Guest { session_id } => (None, Some(session_id.as_str())),
    }
}

impl<'r> FromRow<'r, PgRow> for CartRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let customer: Option<Uuid> = row.try_get("customer_uuid")?;
        let session: Option<String> = row.try_get("session_id")?;
        let currency: String = row.try_get("currency")?;
        let applied: Vec<Uuid> = row.try_get("applied_discount_uuids")?;

        let owner = match (customer, session) {
            (Some(customer), None) => CartOwner::Customer {
                customer_id: CustomerId::from_uuid(customer),
            },
            (None, Some(session_id)) => CartOwner::Guest { session_id },
            _ => {
                return Err(sqlx::Error::Decode(
                    "cart must have exactly one of customer_uuid and session_id".into(),
                ));
            }
        };

        Ok(Self(Cart {
            id: CartId::from_uuid(row.try_get("uuid")?),
            shop_id: ShopId::from_uuid(row.try_get("shop_uuid")?),
            owner,
            currency: currency.trim_end().to_string(),
            items: Vec::new(),
            subtotal: try_get_amount(row, "subtotal")?,
            total_discounts: try_get_amount(row, "total_discounts")?,
            shipping_cost: try_get_amount(row, "shipping_cost")?,
            tax_amount: try_get_amount(row, "tax_amount")?,
            grand_total: try_get_amount(row, "grand_total")?,
            applied_discount_ids: applied.into_iter().map(DiscountId::from_uuid).collect(),
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        }))
    }
}
