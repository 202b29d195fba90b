//! Mashtun - Brewing Controller Firmware
//!
//! Main firmware binary for RP2040-based brewing controllers. Walks a
//! multi-stage mash recipe, driving a stepper-turned gas valve and relay
//! outputs from NTC sensors, and takes commands from the app over UART0.

#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::adc::{self, Adc};
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, Config as UartConfig, Uart};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use mashtun_core::config::{ControllerConfig, PinMap};
use mashtun_core::Controller;

#[macro_use]
mod config;

mod board;
mod channels;
mod flash;
mod tasks;

use crate::board::{EmbassyClock, SharedAdc};
use crate::config::{LINK_BAUD, TIME_UNIT_MS};
use crate::flash::{RegionFlash, RegionImage};

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

static ADC: StaticCell<SharedAdc> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Mashtun firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Load the recipe region (blank on a fresh board)
    let mut flash = RegionFlash::new(p.FLASH, p.DMA_CH0);
    let image = match flash.load().await {
        Ok(Some(image)) => {
            info!("Recipe region loaded from flash");
            image
        }
        Ok(None) => {
            info!("No recipe region in flash, starting blank");
            RegionImage::new()
        }
        Err(e) => {
            warn!("Failed to load recipe region: {:?}, starting blank", e);
            RegionImage::new()
        }
    };

    // Devices from brew.toml
    let adc: &'static SharedAdc = ADC.init(RefCell::new(Adc::new_blocking(
        p.ADC,
        adc::Config::default(),
    )));
    let pins = take_board_pins!(p);
    let registry = unwrap!(board::build_registry(pins, adc));
    info!("{} devices registered", registry.len());

    let config = ControllerConfig {
        time_unit_ms: TIME_UNIT_MS,
        pins: PinMap::default(),
    };
    let controller = unwrap!(Controller::new(config, registry, EmbassyClock, image));

    // Setup UART for the app link
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = LINK_BAUD;

    let tx_buf = TX_BUF.init([0u8; 256]);
    let rx_buf = RX_BUF.init([0u8; 256]);

    let uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, uart_config);
    let uart = uart.into_buffered(Irqs, tx_buf, rx_buf);
    let (tx, rx) = uart.split();

    info!("UART initialized at {} baud", LINK_BAUD);

    // Spawn tasks
    spawner.spawn(tasks::tick_task()).unwrap();
    spawner.spawn(tasks::link_rx_task(rx)).unwrap();
    spawner.spawn(tasks::link_tx_task(tx)).unwrap();
    spawner
        .spawn(tasks::controller_task(controller, flash))
        .unwrap();

    info!("All tasks spawned, firmware running");

    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!("Main loop heartbeat");
    }
}
