//! Integration tests for a single-use discount raced by concurrent checkouts.
//!
//! Every order is priced from the same stale read of the store, so all of them
//! select "First come, first served" ($15.00 off). Exactly one redemption may
//! succeed; every other order must drop it and fall back to "Everyday saving"
//! ($2.00 off).

use std::thread;

use testresult::TestResult;

use bazaar::{
    cart::CartPricingEngine, checkout::CheckoutOutcome, fixtures::Fixture, ledger::UsageLedger,
};

const ORDERS: usize = 8;

#[test]
fn concurrent_checkouts_redeem_a_single_use_discount_once() -> TestResult {
    let fixture = Fixture::from_set("single-use")?;
    let first_come = fixture.discount("first-come")?;
    let everyone = fixture.discount("everyone")?;
    let gadget = fixture.product("gadget")?;

    let snapshot = fixture.store().snapshot();
    let stale = CartPricingEngine::new(&snapshot, &snapshot, &snapshot, fixture.clock());

    let outcomes: Vec<Result<CheckoutOutcome, String>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..ORDERS)
            .map(|order| {
                let fixture = &fixture;
                let stale = &stale;

                scope.spawn(move || {
                    let mut cart = fixture
                        .guest_cart("main", &format!("session-{order}"))
                        .map_err(|err| err.to_string())?;

                    stale
                        .add_item(&mut cart, gadget, None, 1)
                        .map_err(|err| err.to_string())?;

                    stale
                        .checkout(&mut cart, fixture.store())
                        .map_err(|err| err.to_string())
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_err| Err("thread panicked".to_string()))
            })
            .collect()
    });

    let outcomes = outcomes.into_iter().collect::<Result<Vec<_>, _>>()?;

    let winners: Vec<_> = outcomes
        .iter()
        .filter(|outcome| {
            outcome
                .accepted
                .iter()
                .any(|redemption| redemption.discount_id == first_come)
        })
        .collect();

    assert_eq!(winners.len(), 1);
    assert!(
        winners
            .iter()
            .all(|outcome| outcome.order.grand_total == 2_500 && outcome.dropped.is_empty())
    );

    let losers: Vec<_> = outcomes
        .iter()
        .filter(|outcome| outcome.dropped == vec![first_come])
        .collect();

    assert_eq!(losers.len(), ORDERS - 1);
    assert!(losers.iter().all(|outcome| {
        outcome.order.total_discounts == 200
            && outcome
                .accepted
                .iter()
                .map(|redemption| redemption.discount_id)
                .eq([everyone])
    }));

    let stored = |id| fixture.store().discount(id).map(|d| d.current_usage());

    assert_eq!(stored(first_come), Some(1));
    assert_eq!(stored(everyone), Some(u32::try_from(ORDERS - 1)?));

    Ok(())
}

#[test]
fn ledger_refuses_once_the_cap_is_taken() -> TestResult {
    let fixture = Fixture::from_set("single-use")?;
    let first_come = fixture.discount("first-come")?;

    assert!(fixture.store().try_record_usage(first_come, None, 2_500)?);
    assert!(!fixture.store().try_record_usage(first_come, None, 2_500)?);

    let engine = fixture.engine();
    let mut cart = fixture.guest_cart("main", "late")?;

    engine.add_item(&mut cart, fixture.product("gadget")?, None, 1)?;

    // Priced against the live store, the spent discount is never selected.
    assert_eq!(cart.total_discounts, 200);

    Ok(())
}
