//! Link UART receive task
//!
//! Splits the byte stream from the app into lines and queues the decoded
//! commands for the controller task.

use defmt::*;
use embassy_rp::uart::BufferedUartRx;
use embedded_io_async::Read;

use mashtun_protocol::{Command, LineParser, MessageError};

use crate::channels::COMMAND_CHANNEL;

/// Buffer size for UART receive
const RX_BUF_SIZE: usize = 64;

#[embassy_executor::task]
pub async fn link_rx_task(mut rx: BufferedUartRx) {
    info!("Link RX task started");

    let mut parser = LineParser::new();
    let mut buf = [0u8; RX_BUF_SIZE];

    loop {
        match rx.read(&mut buf).await {
            Ok(n) if n > 0 => {
                trace!("RX: {} bytes", n);

                for &byte in &buf[..n] {
                    let decoded = match parser.feed(byte) {
                        Ok(Some(line)) => Command::from_line(&line),
                        Ok(None) => continue,
                        Err(e) => {
                            warn!("Line parse error: {:?}", e);
                            Err(MessageError::from(e))
                        }
                    };

                    if let Err(e) = &decoded {
                        debug!("Undecodable command: {:?}", e);
                    }
                    // Undecodable lines still go through so the app gets
                    // the invalid reply
                    COMMAND_CHANNEL.send(decoded).await;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("UART read error: {:?}", e);
            }
        }
    }
}
