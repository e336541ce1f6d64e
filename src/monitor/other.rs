use std::io;

use log::info;
use tokio::signal::ctrl_c;

/// Create a monitor future for signals
pub async fn create_signal_monitor() -> io::Result<()> {
    ctrl_c().await?;
    info!("received Ctrl-C, exiting");
    Ok(())
}
