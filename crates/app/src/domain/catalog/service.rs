//! Catalog service.

use async_trait::async_trait;
use mockall::automock;
use tracing::info;

use bazaar::ids::{CollectionId, ProductId, ShopId};

use crate::{
    database::Db,
    domain::catalog::{
        data::{NewCollection, NewProduct, ProductUpdate},
        errors::CatalogServiceError,
        records::{CollectionRecord, ProductRecord},
        repository::PgCatalogRepository,
    },
};

#[derive(Debug, Clone)]
pub struct PgCatalogService {
    db: Db,
    repository: PgCatalogRepository,
}

impl PgCatalogService {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            repository: PgCatalogRepository::new(),
        }
    }
}

#[async_trait]
impl CatalogService for PgCatalogService {
    #[tracing::instrument(
        name = "catalog.service.create_product",
        skip(self, product),
        fields(shop_uuid = %shop, product_uuid = %product.uuid, variant_count = product.variants.len()),
        err
    )]
    async fn create_product(
        &self,
        shop: ShopId,
        product: NewProduct,
    ) -> Result<ProductRecord, CatalogServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        self.repository.create_product(&mut tx, &product).await?;

        let record = self.repository.get_product(&mut tx, product.uuid).await?;

        tx.commit().await?;

        info!(product_uuid = %product.uuid, "created product");

        Ok(record)
    }

    #[tracing::instrument(
        name = "catalog.service.get_product",
        skip(self),
        fields(shop_uuid = %shop, product_uuid = %product),
        err
    )]
    async fn get_product(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<ProductRecord, CatalogServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = self.repository.get_product(&mut tx, product).await?;

        tx.commit().await?;

        Ok(record)
    }

    #[tracing::instrument(
        name = "catalog.service.update_product",
        skip(self, update),
        fields(shop_uuid = %shop, product_uuid = %product),
        err
    )]
    async fn update_product(
        &self,
        shop: ShopId,
        product: ProductId,
        update: ProductUpdate,
    ) -> Result<ProductRecord, CatalogServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let rows_affected = self
            .repository
            .update_product(&mut tx, product, update)
            .await?;

        if rows_affected == 0 {
            return Err(CatalogServiceError::NotFound);
        }

        let record = self.repository.get_product(&mut tx, product).await?;

        tx.commit().await?;

        Ok(record)
    }

    #[tracing::instrument(
        name = "catalog.service.delete_product",
        skip(self),
        fields(shop_uuid = %shop, product_uuid = %product),
        err
    )]
    async fn delete_product(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<(), CatalogServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let rows_affected = self.repository.delete_product(&mut tx, product).await?;

        if rows_affected == 0 {
            return Err(CatalogServiceError::NotFound);
        }

        tx.commit().await?;

        info!(product_uuid = %product, "deleted product");

        Ok(())
    }

    #[tracing::instrument(
        name = "catalog.service.create_collection",
        skip(self, collection),
        fields(shop_uuid = %shop, collection_uuid = %collection.uuid),
        err
    )]
    async fn create_collection(
        &self,
        shop: ShopId,
        collection: NewCollection,
    ) -> Result<CollectionRecord, CatalogServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let record = self.repository.create_collection(&mut tx, collection).await?;

        tx.commit().await?;

        Ok(record)
    }

    #[tracing::instrument(
        name = "catalog.service.add_to_collection",
        skip(self),
        fields(shop_uuid = %shop, collection_uuid = %collection, product_uuid = %product),
        err
    )]
    async fn add_to_collection(
        &self,
        shop: ShopId,
        collection: CollectionId,
        product: ProductId,
    ) -> Result<(), CatalogServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        self.repository
            .add_product_to_collection(&mut tx, collection, product)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

#[automock]
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Creates a product together with its variants.
    async fn create_product(
        &self,
        shop: ShopId,
        product: NewProduct,
    ) -> Result<ProductRecord, CatalogServiceError>;

    /// Retrieve a single live product.
    async fn get_product(
        &self,
        shop: ShopId,
        product: ProductId,
    ) -> Result<ProductRecord, CatalogServiceError>;

    /// Change a product's name, price or image.
    async fn update_product(
        &self,
        shop: ShopId,
        product: ProductId,
        update: ProductUpdate,
    ) -> Result<ProductRecord, CatalogServiceError>;

    /// Soft-deletes a product.
    async fn delete_product(&self, shop: ShopId, product: ProductId)
    -> Result<(), CatalogServiceError>;

    /// Creates an empty collection.
    async fn create_collection(
        &self,
        shop: ShopId,
        collection: NewCollection,
    ) -> Result<CollectionRecord, CatalogServiceError>;

    /// Adds a product to a collection; adding it twice is a no-op.
    async fn add_to_collection(
        &self,
        shop: ShopId,
        collection: CollectionId,
        product: ProductId,
    ) -> Result<(), CatalogServiceError>;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bazaar::ids::VariantId;
    use testresult::TestResult;

    use crate::{domain::catalog::data::NewVariant, test::TestContext};

    use super::*;

    fn hoodie() -> NewProduct {
        NewProduct {
            uuid: ProductId::new(),
            name: "Hoodie".to_string(),
            price: 5_000,
            main_image: Some("/hoodie.png".to_string()),
            variants: vec![NewVariant {
                uuid: VariantId::new(),
                price: 5_500,
                options: BTreeMap::from([("size".to_string(), "XL".to_string())]),
                image: None,
            }],
        }
    }

    #[tokio::test]
    async fn create_product_returns_product_with_variants() -> TestResult {
        let ctx = TestContext::new().await;
        let new = hoodie();

        let record = ctx.catalog.create_product(ctx.shop_uuid, new.clone()).await?;

        assert_eq!(record.product.id, new.uuid);
        assert_eq!(record.product.shop_id, ctx.shop_uuid);
        assert_eq!(record.product.price, 5_000);
        assert_eq!(record.product.variants.len(), 1);
        assert_eq!(
            record
                .product
                .variants
                .first()
                .and_then(|variant| variant.options.get("size"))
                .map(String::as_str),
            Some("XL")
        );

        Ok(())
    }

    #[tokio::test]
    async fn collections_are_returned_with_the_product() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.catalog.create_product(ctx.shop_uuid, hoodie()).await?;

        let collection = ctx
            .catalog
            .create_collection(
                ctx.shop_uuid,
                NewCollection {
                    uuid: CollectionId::new(),
                    name: "Winter".to_string(),
                },
            )
            .await?;

        ctx.catalog
            .add_to_collection(ctx.shop_uuid, collection.uuid, product.product.id)
            .await?;
        ctx.catalog
            .add_to_collection(ctx.shop_uuid, collection.uuid, product.product.id)
            .await?;

        let record = ctx
            .catalog
            .get_product(ctx.shop_uuid, product.product.id)
            .await?;

        assert_eq!(record.collections.into_iter().collect::<Vec<_>>(), vec![collection.uuid]);

        Ok(())
    }

    #[tokio::test]
    async fn update_product_changes_only_given_fields() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.catalog.create_product(ctx.shop_uuid, hoodie()).await?;

        let updated = ctx
            .catalog
            .update_product(
                ctx.shop_uuid,
                product.product.id,
                ProductUpdate {
                    price: Some(6_000),
                    main_image: Some(None),
                    ..ProductUpdate::default()
                },
            )
            .await?;

        assert_eq!(updated.product.price, 6_000);
        assert_eq!(updated.product.name, "Hoodie");
        assert_eq!(updated.product.main_image, None);

        Ok(())
    }

    #[tokio::test]
    async fn deleted_product_is_not_found() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.catalog.create_product(ctx.shop_uuid, hoodie()).await?;

        ctx.catalog
            .delete_product(ctx.shop_uuid, product.product.id)
            .await?;

        let result = ctx.catalog.get_product(ctx.shop_uuid, product.product.id).await;

        assert!(
            matches!(result, Err(CatalogServiceError::NotFound)),
            "expected NotFound after deletion, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn product_not_visible_to_other_shop() -> TestResult {
        let ctx = TestContext::new().await;
        let product = ctx.catalog.create_product(ctx.shop_uuid, hoodie()).await?;
        let other = ctx.create_shop("Other").await;

        let result = ctx.catalog.get_product(other, product.product.id).await;

        assert!(
            matches!(result, Err(CatalogServiceError::NotFound)),
            "expected NotFound for cross-shop access, got {result:?}"
        );

        Ok(())
    }
}
