mod common;

use chrono::Duration;
use common::*;
use core_types::GenomeStatus;
use database::PopulationStore;
use events::EngineEvent;
use risk::BreakerCheck;
use rust_decimal_macros::dec;

#[tokio::test]
async fn daily_loss_over_limit_retires_everyone_until_tomorrow() {
    let mut h = harness(config(4));
    let seeded = h.engine.bootstrap(t0()).await.unwrap();
    let was_active = seeded.count(GenomeStatus::Active);
    assert!(was_active > 0);
    let loser = *seeded.active_ids().iter().next().unwrap();

    h.engine
        .collector()
        .record(vec![
            trade(loser, t0() + Duration::hours(1), dec!(-200)),
            trade(loser, t0() + Duration::hours(1), dec!(-150)),
        ])
        .await
        .unwrap();
    let collected = h.engine.collect(t0() + Duration::hours(2)).await.unwrap();
    assert_eq!(collected.trades, 2);
    assert_eq!(collected.breaker, BreakerCheck::Tripped { loss_pct: dec!(3.5) });

    let halted = h.engine.current();
    assert_eq!(halted.number, 0);
    assert_eq!(halted.count(GenomeStatus::Active), 0);
    assert_eq!(halted.count(GenomeStatus::Retired), seeded.len());
    assert!(h.connector.active().await.is_empty());

    let tripped = drain(&mut h.events).into_iter().find_map(|e| match e {
        EngineEvent::CircuitBreakerTripped(t) => Some(t),
        _ => None,
    });
    let tripped = tripped.unwrap();
    assert_eq!(tripped.loss_pct, dec!(3.5));
    assert_eq!(tripped.retired, was_active);

    let manifest = h.store.latest_generation().await.unwrap().unwrap();
    assert_eq!(manifest.halted_on, Some(t0().date_naive()));
    assert_eq!(manifest.count_with(GenomeStatus::Active), 0);

    // Fitness does not matter for the rest of the day.
    let same_day = h.engine.run_cycle(t0() + Duration::hours(3)).await.unwrap();
    assert_eq!(same_day.active, 0);
    assert_eq!(same_day.retired, h.engine.current().len());

    let next_day = h.engine.run_cycle(t0() + Duration::days(1)).await.unwrap();
    assert!(next_day.active > 0);
    assert!(!h.connector.active().await.is_empty());
}

#[tokio::test]
async fn loss_found_during_a_cycle_publishes_a_retired_generation() {
    let mut h = harness(config(6));
    let seeded = h.engine.bootstrap(t0()).await.unwrap();
    let loser = *seeded.active_ids().iter().next().unwrap();
    h.engine
        .collector()
        .record(vec![trade(loser, t0() + Duration::hours(1), dec!(-351))])
        .await
        .unwrap();

    let report = h.engine.run_cycle(t0() + Duration::hours(2)).await.unwrap();
    assert!(report.circuit_breaker_tripped);
    assert_eq!(report.active, 0);
    assert!(h.engine.current().members.iter().all(|g| g.status() == GenomeStatus::Retired));
}

#[tokio::test]
async fn loss_at_the_limit_keeps_trading() {
    let mut h = harness(config(6));
    let seeded = h.engine.bootstrap(t0()).await.unwrap();
    let loser = *seeded.active_ids().iter().next().unwrap();
    h.engine
        .collector()
        .record(vec![trade(loser, t0() + Duration::hours(1), dec!(-300))])
        .await
        .unwrap();

    let collected = h.engine.collect(t0() + Duration::hours(2)).await.unwrap();
    assert!(!collected.breaker.is_halted());
    assert_eq!(h.engine.current().count(GenomeStatus::Active), seeded.count(GenomeStatus::Active));
}

#[tokio::test]
async fn restart_on_the_same_day_stays_halted() {
    let mut h = harness(config(4));
    let seeded = h.engine.bootstrap(t0()).await.unwrap();
    let loser = *seeded.active_ids().iter().next().unwrap();
    h.engine
        .collector()
        .record(vec![trade(loser, t0() + Duration::hours(1), dec!(-400))])
        .await
        .unwrap();
    h.engine.collect(t0() + Duration::hours(2)).await.unwrap();

    let mut restarted = harness_on(config(4), h.store.clone());
    let restored = restarted.engine.bootstrap(t0() + Duration::hours(3)).await.unwrap();
    assert_eq!(restored.count(GenomeStatus::Active), 0);
    let report = restarted.engine.run_cycle(t0() + Duration::hours(4)).await.unwrap();
    assert_eq!(report.active, 0);
}

#[tokio::test]
async fn redelivered_trade_is_not_counted_twice() {
    let mut h = harness(config(4));
    let seeded = h.engine.bootstrap(t0()).await.unwrap();
    let loser = *seeded.active_ids().iter().next().unwrap();
    let loss = trade(loser, t0() + Duration::hours(1), dec!(-200));

    h.engine.collector().record(vec![loss.clone()]).await.unwrap();
    let first = h.engine.collect(t0() + Duration::hours(2)).await.unwrap();
    assert_eq!(first.breaker, BreakerCheck::Armed { loss_pct: dec!(2.00) });

    let accepted = h.engine.collector().record(vec![loss]).await.unwrap();
    assert_eq!(accepted, 0);
    let second = h.engine.collect(t0() + Duration::hours(3)).await.unwrap();
    assert_eq!(second.trades, 0);
    assert_eq!(second.breaker, BreakerCheck::Armed { loss_pct: dec!(2.00) });
    assert!(h.engine.current().count(GenomeStatus::Active) > 0);
}

#[tokio::test]
async fn trades_reloaded_after_restart_are_not_accepted_again() {
    let mut h = harness(config(4));
    let seeded = h.engine.bootstrap(t0()).await.unwrap();
    let loser = *seeded.active_ids().iter().next().unwrap();
    let loss = trade(loser, t0() + Duration::hours(1), dec!(-200));
    h.engine.collector().record(vec![loss.clone()]).await.unwrap();
    h.engine.collect(t0() + Duration::hours(2)).await.unwrap();

    let mut restarted = harness_on(config(4), h.store.clone());
    restarted.engine.bootstrap(t0() + Duration::hours(3)).await.unwrap();
    assert_eq!(restarted.engine.collector().record(vec![loss]).await.unwrap(), 0);
    let collected = restarted.engine.collect(t0() + Duration::hours(4)).await.unwrap();
    assert_eq!(collected.breaker, BreakerCheck::Armed { loss_pct: dec!(2.00) });
}

#[tokio::test]
async fn first_collection_of_the_next_day_resumes_trading() {
    let mut h = harness(config(4));
    let seeded = h.engine.bootstrap(t0()).await.unwrap();
    let was_active = seeded.count(GenomeStatus::Active);
    let loser = *seeded.active_ids().iter().next().unwrap();
    h.engine
        .collector()
        .record(vec![trade(loser, t0() + Duration::hours(1), dec!(-400))])
        .await
        .unwrap();
    h.engine.collect(t0() + Duration::hours(2)).await.unwrap();
    assert!(h.connector.active().await.is_empty());

    let next_morning = t0() + Duration::hours(13);
    let collected = h.engine.collect(next_morning).await.unwrap();
    assert_eq!(collected.breaker, BreakerCheck::Armed { loss_pct: dec!(0) });

    let resumed = h.engine.current();
    assert_eq!(resumed.number, 0);
    assert_eq!(resumed.halted_on, None);
    assert_eq!(resumed.count(GenomeStatus::Active), was_active);
    assert_eq!(h.connector.active().await.len(), was_active);

    let manifest = h.store.latest_generation().await.unwrap().unwrap();
    assert_eq!(manifest.halted_on, None);
    assert_eq!(manifest.count_with(GenomeStatus::Active), was_active);
}
