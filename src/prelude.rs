//! Bazaar prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    cache::{Cache, TtlCache},
    cart::{Cart, CartError, CartItem, CartOwner, CartPricingEngine, CartState, ValidationError},
    catalog::{CachedCatalog, Catalog, CatalogError, CatalogProduct, CatalogVariant},
    checkout::{
        CheckoutError, CheckoutOutcome, CheckoutSession, Redemption, SpendSettlement, redemptions,
    },
    clock::{Clock, ManualClock, SystemClock},
    directory::{Directory, DirectoryError},
    discounts::{
        CustomerUsage, Discount, DiscountCategory, DiscountError, DiscountStore,
        DiscountStoreError, DiscountTargets, DiscountType, DiscountUpdate, EligibilityScope,
        NewDiscount, SimpleDiscount,
    },
    eligibility::{EligibilityContext, EligibilityResult, IneligibilityReason, evaluate},
    ids::{
        CartId, CollectionId, CustomerId, DiscountId, ProductId, SegmentId, SellerId, ShopId,
        TypedUuid, VariantId,
    },
    ledger::{UsageLedger, UsageLedgerError},
    memory::{MemoryStore, MemoryStoreError},
    money::{Amount, AmountError},
    reporting::{
        AppliedDiscountDetail, CartItemDetails, CartWithDiscountDetails, DiscountStatus,
        DiscountUsageReport,
    },
    selection::{SelectedDiscount, select_best},
};
