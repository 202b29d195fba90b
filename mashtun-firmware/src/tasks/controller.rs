//! Main controller task
//!
//! Owns the controller. Runs one control tick per tick signal, executes
//! commands from the link as they arrive, and saves the recipe region to
//! flash after anything that changed it.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_time::Timer;

use mashtun_core::dispatch;
use mashtun_core::TickEvent;

use crate::board::BoardController;
use crate::channels::{ChannelLink, COMMAND_CHANNEL};
use crate::flash::RegionFlash;
use crate::tasks::tick::TICK_SIGNAL;

/// Pause while the TX task drains earlier replies
const REPLY_BACKOFF_MS: u64 = 5;

#[embassy_executor::task]
pub async fn controller_task(mut controller: BoardController, mut flash: RegionFlash<'static>) {
    info!(
        "Controller task started: {:?}, {} stages",
        controller.status(),
        controller.stage_count().unwrap_or(0)
    );

    let mut link = ChannelLink;
    let mut saved_writes = controller.storage().write_count();

    loop {
        match select(TICK_SIGNAL.wait(), COMMAND_CHANNEL.ready_to_receive()).await {
            Either::First(()) => run_tick(&mut controller),
            Either::Second(()) => {
                while !link.has_room_for_replies() {
                    Timer::after_millis(REPLY_BACKOFF_MS).await;
                }
                if let Err(e) = dispatch::poll(&mut controller, &mut link) {
                    warn!("Replies dropped: {:?}", e);
                }
            }
        }

        save_region(&controller, &mut flash, &mut saved_writes).await;
    }
}

/// Run one control tick and log what it did
fn run_tick(controller: &mut BoardController) {
    match controller.run() {
        Ok(outcome) => match outcome.event {
            Some(TickEvent::StageAdvanced(stage)) => info!("Stage {} started", stage),
            Some(TickEvent::RecipeFinished) => info!("Recipe finished"),
            None => {}
        },
        Err(e) => error!("Control tick failed: {:?}", e),
    }
}

/// Write the region image to flash if the controller changed it
async fn save_region(
    controller: &BoardController,
    flash: &mut RegionFlash<'static>,
    saved_writes: &mut usize,
) {
    let writes = controller.storage().write_count();
    if writes == *saved_writes {
        return;
    }

    match flash.save(controller.storage().as_bytes()).await {
        Ok(()) => {
            debug!("Recipe region saved");
            *saved_writes = writes;
        }
        Err(e) => warn!("Failed to save recipe region: {:?}", e),
    }
}
