//! Embassy tasks

pub mod controller;
pub mod link_rx;
pub mod link_tx;
pub mod tick;

pub use controller::controller_task;
pub use link_rx::link_rx_task;
pub use link_tx::link_tx_task;
pub use tick::tick_task;
