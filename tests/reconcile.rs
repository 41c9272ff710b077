mod support;

use anyhow::Result;

use loki_bridge_swap::error::SwapError;
use loki_bridge_swap::swap::SwapDirection;
use loki_bridge_swap::swap::service::SwapServiceConfig;

use support::{COIN, Harness, bnb_account, bnb_deposit, loki_account, loki_deposit, now};

#[tokio::test]
async fn balances_match_after_sweep() -> Result<()> {
    let mut h = Harness::new(SwapServiceConfig::default())?;
    let alice = loki_account("alice", 1, "bnb1alice");
    let bob = bnb_account("bob", "memo-bob", "L-bob");
    h.add_account(&alice)?;
    h.add_account(&bob)?;
    h.loki
        .deposit(&alice.deposit, loki_deposit("loki-1", 1, 3 * COIN, 10));
    h.loki
        .deposit(&alice.deposit, loki_deposit("loki-pending", 1, 9 * COIN, 1));
    h.bnb.deposit(&bob.deposit, bnb_deposit("bnb-1", "memo-bob", COIN));

    h.service.sweep_all_pending_swaps().await?;
    let reports = h.service.check_all_balances().await?;

    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert!(report.is_balanced(), "{report:?}");
        report.ensure_balanced()?;
    }
    assert_eq!(reports[0].direction, SwapDirection::LokiToBloki);
    assert_eq!(reports[0].transaction_total, 3 * COIN);
    assert_eq!(reports[1].swap_total, COIN);
    Ok(())
}

#[tokio::test]
async fn unswept_deposit_is_a_mismatch() -> Result<()> {
    let mut h = Harness::new(SwapServiceConfig::default())?;
    let alice = loki_account("alice", 1, "bnb1alice");
    h.add_account(&alice)?;
    h.loki
        .deposit(&alice.deposit, loki_deposit("loki-1", 1, 3 * COIN, 10));
    h.service.sweep_all_pending_swaps().await?;

    h.loki
        .deposit(&alice.deposit, loki_deposit("loki-2", 1, 2 * COIN, 10));
    let report = h.service.check_balance(SwapDirection::LokiToBloki).await?;

    assert!(!report.is_balanced());
    assert_eq!(report.transaction_total, 5 * COIN);
    assert_eq!(report.swap_total, 3 * COIN);
    assert!(matches!(
        report.ensure_balanced(),
        Err(SwapError::BalanceMismatch {
            direction: SwapDirection::LokiToBloki,
            ..
        })
    ));
    Ok(())
}

#[tokio::test]
async fn swap_without_a_deposit_is_a_mismatch() -> Result<()> {
    let mut h = Harness::new(SwapServiceConfig::default())?;
    let bob = bnb_account("bob", "memo-bob", "L-bob");
    h.add_account(&bob)?;
    h.service.store_mut().insert_swap(
        SwapDirection::BlokiToLoki,
        &bnb_deposit("phantom", "memo-bob", COIN),
        &bob,
    )?;

    let report = h.service.check_balance(SwapDirection::BlokiToLoki).await?;
    assert_eq!(report.transaction_total, 0);
    assert_eq!(report.swap_total, COIN);
    assert!(!report.is_balanced());
    Ok(())
}

#[tokio::test]
async fn deposits_outside_the_window_are_ignored() -> Result<()> {
    let mut h = Harness::new(SwapServiceConfig::default())?;
    let alice = loki_account("alice", 1, "bnb1alice");
    h.add_account(&alice)?;

    let mut old = loki_deposit("loki-old", 1, 7 * COIN, 500);
    old.timestamp = now() - 3 * 24 * 60 * 60;
    h.loki.deposit(&alice.deposit, old.clone());
    // swept long ago
    h.service
        .store_mut()
        .insert_swap(SwapDirection::LokiToBloki, &old, &alice)?;
    let mut older = loki_deposit("loki-older", 1, 2 * COIN, 900);
    older.timestamp = now() - 4 * 24 * 60 * 60;
    h.loki.deposit(&alice.deposit, older);

    let report = h.service.check_balance(SwapDirection::LokiToBloki).await?;
    assert_eq!(report.transaction_total, 0);
    assert_eq!(report.swap_total, 0);
    assert!(report.is_balanced());
    Ok(())
}
