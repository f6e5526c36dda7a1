//! Serve command implementation for the Rill CLI.

use rill_server::ServerConfig;

use crate::colors;

/// Start the notebook server.
pub async fn execute(host: &str, port: u16) -> anyhow::Result<()> {
    println!(
        "\n{}Rill{} - Reactive Notebook",
        colors::BOLD,
        colors::RESET
    );
    println!("{}", "─".repeat(50));

    let config = ServerConfig {
        host: host.to_string(),
        port,
    };

    println!(
        "{}  ◆ Server:{} http://{}:{}",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    println!(
        "{}  ◆ Events:{} http://{}:{}/notebook/events",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    println!("{}", "─".repeat(50));
    println!("{}Press Ctrl+C to stop{}", colors::GREEN, colors::RESET);
    println!();

    let scheduler = rill_server::build_scheduler();
    rill_server::serve(scheduler, config).await?;

    Ok(())
}
