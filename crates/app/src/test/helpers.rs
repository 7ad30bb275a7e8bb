//! Test Helpers

use bazaar::{
    discounts::{DiscountCategory, DiscountTargets, EligibilityScope, NewDiscount, SimpleDiscount},
    ids::{DiscountId, ProductId, SellerId, ShopId},
};

/// An active, unscoped order discount valid from 2020 to 2100.
pub(crate) fn order_discount(
    shop: ShopId,
    discount: SimpleDiscount,
) -> Result<NewDiscount, jiff::Error> {
    Ok(NewDiscount {
        id: DiscountId::new(),
        shop_id: shop,
        seller_id: SellerId::new(),
        name: "Test discount".to_string(),
        category: DiscountCategory::Order,
        discount,
        targets: DiscountTargets::default(),
        coupon_code: None,
        scope: EligibilityScope::All,
        usage_limit: None,
        per_customer_limit: None,
        start_at: "2020-01-01T00:00:00Z".parse()?,
        end_at: "2100-01-01T00:00:00Z".parse()?,
        active: true,
    })
}

/// Like [`order_discount`], targeted at one product.
pub(crate) fn product_discount(
    shop: ShopId,
    product: ProductId,
    discount: SimpleDiscount,
) -> Result<NewDiscount, jiff::Error> {
    let mut new = order_discount(shop, discount)?;

    new.category = DiscountCategory::Product;
    new.targets.products.insert(product);

    Ok(new)
}
