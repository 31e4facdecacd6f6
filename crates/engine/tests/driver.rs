mod common;

use chrono::Utc;
use common::*;
use core_types::GenomeStatus;
use engine::EvolutionDriver;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn new_data_wakes_the_driver_between_cycles() {
    let Harness { engine, connector, .. } = harness(config(15));
    let driver = EvolutionDriver::new(engine);
    let handle = driver.handle();
    let mut generations = handle.generations();
    let (stop, stop_rx) = watch::channel(false);
    let task = tokio::spawn(driver.run(stop_rx));

    let seeded = tokio::time::timeout(Duration::from_secs(5), generations.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seeded.number, 0);
    let loser = *seeded.active_ids().iter().next().unwrap();

    handle
        .collector()
        .record(vec![trade(loser, Utc::now(), dec!(-1000))])
        .await
        .unwrap();
    handle.notify_new_data();

    let halted = tokio::time::timeout(Duration::from_secs(5), generations.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(halted.number, 0);
    assert_eq!(halted.count(GenomeStatus::Active), 0);
    assert!(connector.active().await.is_empty());
    assert_eq!(handle.current().count(GenomeStatus::Retired), seeded.len());

    stop.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn driver_stops_when_shutdown_is_dropped() {
    let Harness { engine, .. } = harness(config(16));
    let driver = EvolutionDriver::new(engine);
    let (stop, stop_rx) = watch::channel(false);
    let task = tokio::spawn(driver.run(stop_rx));
    drop(stop);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
