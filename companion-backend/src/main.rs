use companion_backend::channels::{self, MessageDispatcher, StreamListener};
use companion_backend::config::Config;
use companion_backend::db::Database;
use companion_backend::error::KernelError;
use companion_backend::kernel::{self, Kernel, KernelConfig, SystemClock};
use companion_backend::modules;
use companion_backend::platform::MisskeyApi;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Buffered events between the relay reader and the listener
const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    match run().await {
        Ok(()) => {
            log::info!("Bye");
            // The stdin reader may still be parked in a blocking read
            std::process::exit(0);
        }
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<(), KernelError> {
    let config = Config::from_env()?;
    log::info!("Starting companion for {}", config.host);

    let api = Arc::new(MisskeyApi::from_config(&config)?);
    let account = api.fetch_account_with_retry().await?;
    log::info!("Signed in as {}", account.acct());

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::open(&config.database_url)?;

    let kernel = Arc::new(Kernel::new(
        account,
        KernelConfig::from(&config),
        db,
        api,
        Arc::new(SystemClock),
    )?);
    log::info!("Last seen awake at {}", kernel.last_slept_at());

    kernel.install_all(modules::create_default_modules())?;
    log::info!("Installed {} modules", kernel.runtime().installed().len());

    let cancel = CancellationToken::new();
    let background = kernel::spawn_background(kernel.clone(), cancel.clone());

    // Stream events arrive as newline-delimited JSON on stdin
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let relay_cancel = cancel.clone();
    let relay = tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        match channels::relay_lines(stdin, tx, relay_cancel).await {
            Ok(count) => log::info!("[STREAM] Relay finished after {} events", count),
            Err(e) => log::error!("[STREAM] Relay failed: {}", e),
        }
    });

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutting down...");
            ctrl_c_cancel.cancel();
        }
    });

    log::info!("Companion is now running!");
    let listener = StreamListener::new(Arc::new(MessageDispatcher::new(kernel.clone())));
    listener.run(rx, cancel.clone()).await;

    cancel.cancel();
    let _ = relay.await;
    for handle in background {
        let _ = handle.await;
    }
    kernel.heartbeat();
    Ok(())
}
