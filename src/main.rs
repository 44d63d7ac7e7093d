use std::sync::Arc;

use clap::Parser;

use tagmixer::application::{Application, Configuration};
use tagmixer::listener;
use tagmixer::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Configuration::parse();
    Application::install_logging(&config);

    let application = Application::initialize(config).await;
    let query_addr = application.query_addr();
    let version_addr = application.version_addr();
    let watcher_addr = application.watcher_addr();

    let (index_tx, index_rx) = flume::unbounded();
    let (driver, raw_events) =
        tagmixer::application::application::build_watch_driver(index_tx)?;

    // notify's callback runs on a foreign thread; forward its events into
    // the driver from a blocking task rather than polling an async channel.
    {
        let driver = driver.clone();
        std::thread::spawn(move || {
            while let Ok(result) = raw_events.recv() {
                match result {
                    Ok(event) => driver.handle_event(event),
                    Err(err) => tracing::warn!(error = %err, "notify backend error"),
                }
            }
        });
    }

    let (command_tx, command_rx) = flume::unbounded();
    let batcher_config = watch::BatcherConfig {
        quiescence_window: std::time::Duration::from_millis(application.config.quiescence_window_ms),
        indexer_path: application.config.indexer_path.clone(),
        callgraph: None,
    };

    let engine = application.engine.clone();
    let router = application.router.clone();

    tokio::spawn(watch::run_batcher(index_rx, engine.clone(), None, batcher_config));
    tokio::spawn(watch::run_commands(command_rx, driver, vec![engine]));
    tokio::spawn(listener::serve_version_shutdown(version_addr));
    tokio::spawn(listener::serve_watcher_commands(watcher_addr, command_tx));

    listener::serve(query_addr, router).await
}
