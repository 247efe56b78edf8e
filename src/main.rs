//! Deribit Client Main Entry Point
//!
//! Connects to the configured venue, optionally logs in, subscribes to the
//! configured channels and logs every event until disconnection or Ctrl-C.

use deribit_ws_client::{Client, ClientError, ClientResult, Config, ConnectionState, Event};

#[tokio::main]
async fn main() {
    // Load configuration before logging so DEBUG_MODE can pick the filter
    let config = Config::load_or_default();

    let default_filter = if config.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    log::info!("Starting Deribit client");
    config.log_config();

    let client = Client::new(config.clone());
    if let Err(e) = run(&client, &config).await {
        log::error!("Client error: {}", e);
        client.close();
        std::process::exit(1);
    }

    client.log_latency_stats();
    client.close();
    log::info!("Client stopped");
}

async fn run(client: &Client, config: &Config) -> ClientResult<()> {
    client.start().await?;

    if config.has_credentials() {
        client.authenticate().await?;
    }

    for channel in &config.channels {
        client.register_listener(channel, |event: &Event| {
            log::info!("{}: {}", event.channel, event.data);
        });
    }
    client.subscribe(config.channels.iter().cloned()).await?;

    let mut state = client.state_changes();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                return Ok(());
            }
            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *state.borrow();
                log::info!("Connection state: {:?}", current);
                if current == ConnectionState::Disconnected && !config.auto_reconnect {
                    return Err(ClientError::ConnectionClosed);
                }
            }
        }
    }
}
