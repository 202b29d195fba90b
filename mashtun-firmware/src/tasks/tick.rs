//! Control tick
//!
//! Wakes the controller task once per control period.

use defmt::*;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};

use crate::config::TICK_MS;

/// Signal to notify controller of tick
///
/// Carries no payload: the controller reads its own clock.
pub static TICK_SIGNAL: Signal<CriticalSectionRawMutex, ()> = Signal::new();

#[embassy_executor::task]
pub async fn tick_task() {
    info!("Tick task started ({} ms)", TICK_MS);

    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS));

    loop {
        ticker.next().await;
        TICK_SIGNAL.signal(());
    }
}
