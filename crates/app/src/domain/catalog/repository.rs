//! Catalog Repository

use std::collections::{BTreeMap, BTreeSet};

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use rustc_hash::FxHashMap;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, types::Json};
use uuid::Uuid;

use bazaar::{
    catalog::{CatalogProduct, CatalogVariant},
    ids::{CollectionId, ProductId, ShopId, VariantId},
};

use crate::{
    database::{amount_to_sql, try_get_amount},
    domain::catalog::{
        data::{NewCollection, NewProduct, ProductUpdate},
        records::{CollectionRecord, ProductRecord},
    },
};

const CREATE_PRODUCT_SQL: &str = include_str!("sql/create_product.sql");
const CREATE_VARIANT_SQL: &str = include_str!("sql/create_variant.sql");
const GET_PRODUCTS_SQL: &str = include_str!("sql/get_products.sql");
const GET_VARIANTS_SQL: &str = include_str!("sql/get_variants.sql");
const GET_COLLECTION_IDS_SQL: &str = include_str!("sql/get_collection_ids.sql");
const UPDATE_PRODUCT_SQL: &str = include_str!("sql/update_product.sql");
const DELETE_PRODUCT_SQL: &str = include_str!("sql/delete_product.sql");
const CREATE_COLLECTION_SQL: &str = include_str!("sql/create_collection.sql");
const ADD_COLLECTION_PRODUCT_SQL: &str = include_str!("sql/add_collection_product.sql");

struct ProductRow {
    product: CatalogProduct,
    created_at: Timestamp,
    updated_at: Timestamp,
}

struct VariantRow {
    product_uuid: ProductId,
    variant: CatalogVariant,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgCatalogRepository;

impl PgCatalogRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: &NewProduct,
    ) -> Result<(), sqlx::Error> {
        query(CREATE_PRODUCT_SQL)
            .bind(product.uuid.into_uuid())
            .bind(&product.name)
            .bind(amount_to_sql(product.price, "price")?)
            .bind(product.main_image.as_deref())
            .execute(&mut **tx)
            .await?;

        for variant in &product.variants {
            query(CREATE_VARIANT_SQL)
                .bind(variant.uuid.into_uuid())
                .bind(product.uuid.into_uuid())
                .bind(amount_to_sql(variant.price, "price")?)
                .bind(Json(&variant.options))
                .bind(variant.image.as_deref())
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    /// Live products with their variants, in id order. Missing or deleted
    /// products are simply absent.
    pub(crate) async fn get_products(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        products: &[ProductId],
    ) -> Result<Vec<CatalogProduct>, sqlx::Error> {
        Ok(self
            .get_product_rows(tx, products)
            .await?
            .into_iter()
            .map(|row| row.product)
            .collect())
    }

    pub(crate) async fn get_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductId,
    ) -> Result<ProductRecord, sqlx::Error> {
        let row = self
            .get_product_rows(tx, &[product])
            .await?
            .into_iter()
            .next()
            .ok_or(sqlx::Error::RowNotFound)?;

        let collections = self
            .collection_ids_for_products(tx, &[product])
            .await?
            .remove(&product)
            .unwrap_or_default();

        Ok(ProductRecord {
            product: row.product,
            collections,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn get_product_rows(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        products: &[ProductId],
    ) -> Result<Vec<ProductRow>, sqlx::Error> {
        let uuids: Vec<Uuid> = products.iter().map(|id| id.into_uuid()).collect();

        let mut rows = query_as::<Postgres, ProductRow>(GET_PRODUCTS_SQL)
            .bind(&uuids)
            .fetch_all(&mut **tx)
            .await?;

        let variants = query_as::<Postgres, VariantRow>(GET_VARIANTS_SQL)
            .bind(&uuids)
            .fetch_all(&mut **tx)
            .await?;

        let mut by_product: FxHashMap<ProductId, Vec<CatalogVariant>> = FxHashMap::default();

        for row in variants {
            by_product
                .entry(row.product_uuid)
                .or_default()
                .push(row.variant);
        }

        for row in &mut rows {
            row.product.variants = by_product.remove(&row.product.id).unwrap_or_default();
        }

        Ok(rows)
    }

    pub(crate) async fn collection_ids_for_products(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        products: &[ProductId],
    ) -> Result<FxHashMap<ProductId, BTreeSet<CollectionId>>, sqlx::Error> {
        let uuids: Vec<Uuid> = products.iter().map(|id| id.into_uuid()).collect();

        let pairs: Vec<(Uuid, Uuid)> = query_as(GET_COLLECTION_IDS_SQL)
            .bind(&uuids)
            .fetch_all(&mut **tx)
            .await?;

        let mut collections: FxHashMap<ProductId, BTreeSet<CollectionId>> = FxHashMap::default();

        for (product, collection) in pairs {
            collections
                .entry(ProductId::from_uuid(product))
                .or_default()
                .insert(CollectionId::from_uuid(collection));
        }

        Ok(collections)
    }

    pub(crate) async fn update_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductId,
        update: ProductUpdate,
    ) -> Result<u64, sqlx::Error> {
        let price = update
            .price
            .map(|price| amount_to_sql(price, "price"))
            .transpose()?;

        let rows_affected = query(UPDATE_PRODUCT_SQL)
            .bind(product.into_uuid())
            .bind(update.name)
            .bind(price)
            .bind(update.main_image.is_some())
            .bind(update.main_image.flatten())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub(crate) async fn delete_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductId,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_PRODUCT_SQL)
            .bind(product.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub(crate) async fn create_collection(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        collection: NewCollection,
    ) -> Result<CollectionRecord, sqlx::Error> {
        query_as::<Postgres, CollectionRecord>(CREATE_COLLECTION_SQL)
            .bind(collection.uuid.into_uuid())
            .bind(collection.name)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn add_product_to_collection(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        collection: CollectionId,
        product: ProductId,
    ) -> Result<(), sqlx::Error> {
        query(ADD_COLLECTION_PRODUCT_SQL)
            .bind(collection.into_uuid())
            .bind(product.into_uuid())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            product: CatalogProduct {
                id: ProductId::from_uuid(row.try_get("uuid")?),
                shop_id: ShopId::from_uuid(row.try_get("shop_uuid")?),
                name: row.try_get("name")?,
                price: try_get_amount(row, "price")?,
                main_image: row.try_get("main_image")?,
                variants: Vec::new(),
            },
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        })
    }
}

impl<'r> FromRow<'r, PgRow> for VariantRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let options: Json<BTreeMap<String, String>> = row.try_get("options")?;

        Ok(Self {
            product_uuid: ProductId::from_uuid(row.try_get("product_uuid")?),
            variant: CatalogVariant {
                id: VariantId::from_uuid(row.try_get("uuid")?),
                price: try_get_amount(row, "price")?,
                options: options.0,
                image: row.try_get("image")?,
            },
        })
    }
}

impl<'r> FromRow<'r, PgRow> for CollectionRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            uuid: CollectionId::from_uuid(row.try_get("uuid")?),
            shop_uuid: ShopId::from_uuid(row.try_get("shop_uuid")?),
            name: row.try_get("name")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        })
    }
}
