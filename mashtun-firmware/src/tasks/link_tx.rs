//! Link UART transmit task
//!
//! Writes every queued update to the app as one line.

use defmt::*;
use embassy_rp::uart::BufferedUartTx;
use embedded_io_async::Write;

use crate::channels::UPDATE_CHANNEL;

#[embassy_executor::task]
pub async fn link_tx_task(mut tx: BufferedUartTx) {
    info!("Link TX task started");

    loop {
        let update = UPDATE_CHANNEL.receive().await;

        let text = match update.to_line().encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {:?}: {:?}", update, e);
                continue;
            }
        };

        if let Err(e) = tx.write_all(text.as_bytes()).await {
            warn!("UART write error: {:?}", e);
        }
    }
}
