//! Carts service.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{Span, info};

use bazaar::{
    cart::{Cart, CartError, CartOwner},
    clock::Clock,
    ids::{CartId, DiscountId, ProductId, ShopId, VariantId},
    reporting::CartWithDiscountDetails,
};

use crate::{
    database::Db,
    domain::{
        carts::{
            errors::CartsServiceError,
            repositories::PgCartsRepository,
            snapshot::{PgSnapshotLoader, SnapshotEngine, engine},
        },
        discounts::repository::PgDiscountsRepository,
        shops::repository::PgShopsRepository,
    },
};

#[derive(Debug, Clone)]
pub struct PgCartsService {
    db: Db,
    carts: PgCartsRepository,
    shops: PgShopsRepository,
    discounts: PgDiscountsRepository,
    snapshots: PgSnapshotLoader,
    clock: Arc<dyn Clock>,
}

impl PgCartsService {
    #[must_use]
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            carts: PgCartsRepository::new(),
            shops: PgShopsRepository::new(),
            discounts: PgDiscountsRepository::new(),
            snapshots: PgSnapshotLoader::new(),
            clock,
        }
    }

    /// Lock the cart, run `operation` against a fresh snapshot and save the
    /// re-priced cart. Nothing is written if the operation fails.
    async fn mutate<R, F>(
        &self,
        shop: ShopId,
        cart: CartId,
        adding: Option<ProductId>,
        operation: F,
    ) -> Result<(Cart, R), CartsServiceError>
    where
        F: FnOnce(&SnapshotEngine<'_>, &mut Cart) -> Result<R, CartError> + Send,
        R: Send,
    {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let mut current = self.carts.lock_cart(&mut tx, cart).await?;

        let store = self
            .snapshots
            .load(&mut tx, &current, adding, Arc::clone(&self.clock))
            .await?;

        let output = operation(&engine(&store), &mut current)?;

        self.carts.save_cart(&mut tx, &current).await?;

        tx.commit().await?;

        Span::current().record("grand_total", current.grand_total);

        Ok((current, output))
    }
}

#[async_trait]
impl CartsService for PgCartsService {
    #[tracing::instrument(
        name = "carts.service.get_or_create_cart",
        skip(self),
        fields(shop_uuid = %shop, cart_uuid = tracing::field::Empty),
        err
    )]
    async fn get_or_create_cart(
        &self,
        shop: ShopId,
        owner: CartOwner,
    ) -> Result<Cart, CartsServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let uuid = match self.carts.find_cart(&mut tx, &owner).await? {
            Some(uuid) => uuid,
            None => {
                let currency = self.shops.get_shop(&mut tx, shop).await?.currency;

                let cart = Cart::new(
                    CartId::new(),
                    shop,
                    owner.clone(),
                    &currency,
                    self.clock.now(),
                )
                .map_err(CartError::from)?;

                self.carts.create_cart(&mut tx, &cart).await?;

                // A concurrent request may have created the owner's cart first.
                self.carts
                    .find_cart(&mut tx, &owner)
                    .await?
                    .ok_or(CartsServiceError::NotFound)?
            }
        };

        let cart = self.carts.get_cart(&mut tx, uuid).await?;

        tx.commit().await?;

        Span::current().record("cart_uuid", tracing::field::display(cart.id));

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.get_cart",
        skip(self),
        fields(shop_uuid = %shop, cart_uuid = %cart),
        err
    )]
    async fn get_cart(&self, shop: ShopId, cart: CartId) -> Result<Cart, CartsServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let found = self.carts.get_cart(&mut tx, cart).await?;

        tx.commit().await?;

        Ok(found)
    }

    #[tracing::instrument(
        name = "carts.service.get_cart_with_details",
        skip(self),
        fields(shop_uuid = %shop, cart_uuid = %cart),
        err
    )]
    async fn get_cart_with_details(
        &self,
        shop: ShopId,
        cart: CartId,
    ) -> Result<CartWithDiscountDetails, CartsServiceError> {
        let mut tx = self.db.begin_shop_transaction(shop).await?;

        let found = self.carts.get_cart(&mut tx, cart).await?;

        let store = self
            .snapshots
            .load(&mut tx, &found, None, Arc::clone(&self.clock))
            .await?;

        tx.commit().await?;

        Ok(engine(&store).details(&found)?)
    }

    #[tracing::instrument(
        name = "carts.service.add_item",
        skip(self),
        fields(
            shop_uuid = %shop,
            cart_uuid = %cart,
            product_uuid = %product,
            grand_total = tracing::field::Empty
        ),
        err
    )]
    async fn add_item(
        &self,
        shop: ShopId,
        cart: CartId,
        product: ProductId,
        variant: Option<VariantId>,
        quantity: u32,
    ) -> Result<Cart, CartsServiceError> {
        let (cart, ()) = self
            .mutate(shop, cart, Some(product), |engine, cart| {
                engine.add_item(cart, product, variant, quantity)
            })
            .await?;

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.update_item",
        skip(self),
        fields(
            shop_uuid = %shop,
            cart_uuid = %cart,
            product_uuid = %product,
            grand_total = tracing::field::Empty
        ),
        err
    )]
    async fn update_item(
        &self,
        shop: ShopId,
        cart: CartId,
        product: ProductId,
        variant: Option<VariantId>,
        quantity: i64,
    ) -> Result<Cart, CartsServiceError> {
        let (cart, ()) = self
            .mutate(shop, cart, None, |engine, cart| {
                engine.update_item(cart, product, variant, quantity)
            })
            .await?;

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.remove_item",
        skip(self),
        fields(
            shop_uuid = %shop,
            cart_uuid = %cart,
            product_uuid = %product,
            grand_total = tracing::field::Empty
        ),
        err
    )]
    async fn remove_item(
        &self,
        shop: ShopId,
        cart: CartId,
        product: ProductId,
        variant: Option<VariantId>,
    ) -> Result<Cart, CartsServiceError> {
        let (cart, ()) = self
            .mutate(shop, cart, None, |engine, cart| {
                engine.remove_item(cart, product, variant)
            })
            .await?;

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.clear_cart",
        skip(self),
        fields(shop_uuid = %shop, cart_uuid = %cart, grand_total = tracing::field::Empty),
        err
    )]
    async fn clear_cart(&self, shop: ShopId, cart: CartId) -> Result<Cart, CartsServiceError> {
        let (cart, ()) = self
            .mutate(shop, cart, None, |engine, cart| engine.clear_cart(cart))
            .await?;

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.apply_coupon",
        skip(self, code),
        fields(
            shop_uuid = %shop,
            cart_uuid = %cart,
            discount_uuid = tracing::field::Empty,
            grand_total = tracing::field::Empty
        ),
        err
    )]
    async fn apply_coupon(
        &self,
        shop: ShopId,
        cart: CartId,
        code: String,
    ) -> Result<Cart, CartsServiceError> {
        let result = self
            .mutate(shop, cart, None, |engine, cart| {
                engine.apply_coupon(cart, &code)
            })
            .await;

        match result {
            Ok((cart, discount)) => {
                Span::current().record("discount_uuid", tracing::field::display(discount));

                info!(cart_uuid = %cart.id, discount_uuid = %discount, "applied coupon");

                Ok(cart)
            }
            // Only the cart's own shop is visible here, so ask whether the code
            // exists anywhere before calling it unknown.
            Err(CartsServiceError::Cart(CartError::CouponNotFound(code))) => {
                let mut tx = self.db.begin_shop_transaction(shop).await?;

                let registered = self
                    .discounts
                    .coupon_code_registered(&mut tx, &code)
                    .await?;

                tx.commit().await?;

                if registered {
                    Err(CartError::CouponShopMismatch.into())
                } else {
                    Err(CartError::CouponNotFound(code).into())
                }
            }
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(
        name = "carts.service.remove_coupon",
        skip(self),
        fields(
            shop_uuid = %shop,
            cart_uuid = %cart,
            discount_uuid = %discount,
            grand_total = tracing::field::Empty
        ),
        err
    )]
    async fn remove_coupon(
        &self,
        shop: ShopId,
        cart: CartId,
        discount: DiscountId,
    ) -> Result<Cart, CartsServiceError> {
        let (cart, ()) = self
            .mutate(shop, cart, None, |engine, cart| {
                engine.remove_coupon(cart, discount)
            })
            .await?;

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.set_charges",
        skip(self),
        fields(shop_uuid = %shop, cart_uuid = %cart, grand_total = tracing::field::Empty),
        err
    )]
    async fn set_charges(
        &self,
        shop: ShopId,
        cart: CartId,
        shipping_cost: u64,
        tax_amount: u64,
    ) -> Result<Cart, CartsServiceError> {
        let (cart, ()) = self
            .mutate(shop, cart, None, |engine, cart| {
                engine.set_charges(cart, shipping_cost, tax_amount)
            })
            .await?;

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.recompute",
        skip(self),
        fields(shop_uuid = %shop, cart_uuid = %cart, grand_total = tracing::field::Empty),
        err
    )]
    async fn recompute(&self, shop: ShopId, cart: CartId) -> Result<Cart, CartsServiceError> {
        let (cart, ()) = self
            .mutate(shop, cart, None, |engine, cart| engine.recompute(cart))
            .await?;

        Ok(cart)
    }
}

#[automock]
#[async_trait]
pub trait CartsService: Send + Sync {
    /// The owner's cart in `shop`, created empty in the shop's currency if
    /// they have none yet.
    async fn get_or_create_cart(
        &self,
        shop: ShopId,
        owner: CartOwner,
    ) -> Result<Cart, CartsServiceError>;

    /// The cart as last priced.
    async fn get_cart(&self, shop: ShopId, cart: CartId) -> Result<Cart, CartsServiceError>;

    /// Re-price the cart without saving it and explain every candidate
    /// discount of every line.
    async fn get_cart_with_details(
        &self,
        shop: ShopId,
        cart: CartId,
    ) -> Result<CartWithDiscountDetails, CartsServiceError>;

    async fn add_item(
        &self,
        shop: ShopId,
        cart: CartId,
        product: ProductId,
        variant: Option<VariantId>,
        quantity: u32,
    ) -> Result<Cart, CartsServiceError>;

    /// Set a line's quantity; zero removes it.
    async fn update_item(
        &self,
        shop: ShopId,
        cart: CartId,
        product: ProductId,
        variant: Option<VariantId>,
        quantity: i64,
    ) -> Result<Cart, CartsServiceError>;

    async fn remove_item(
        &self,
        shop: ShopId,
        cart: CartId,
        product: ProductId,
        variant: Option<VariantId>,
    ) -> Result<Cart, CartsServiceError>;

    async fn clear_cart(&self, shop: ShopId, cart: CartId) -> Result<Cart, CartsServiceError>;

    /// Enter a coupon code. A code owned by another shop is reported as a
    /// mismatch rather than as unknown.
    async fn apply_coupon(
        &self,
        shop: ShopId,
        cart: CartId,
        code: String,
    ) -> Result<Cart, CartsServiceError>;

    async fn remove_coupon(
        &self,
        shop: ShopId,
        cart: CartId,
        discount: DiscountId,
    ) -> Result<Cart, CartsServiceError>;

    /// Store externally computed shipping and tax.
    async fn set_charges(
        &self,
        shop: ShopId,
        cart: CartId,
        shipping_cost: u64,
        tax_amount: u64,
    ) -> Result<Cart, CartsServiceError>;

    /// Re-price the cart against current prices and discounts.
    async fn recompute(&self, shop: ShopId, cart: CartId) -> Result<Cart, CartsServiceError>;
}
