//! `http-feeds`: subscribe to an HTTP feed and print its events.

mod args;

use std::future::Future;
use std::io::{self, Write};

use anyhow::Context;
use clap::Parser;
use http_feeds::{Cursor, Event, FeedClient, StopSignal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::Arguments;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let token = CancellationToken::new();
    tokio::spawn(watch_interrupts(tokio::signal::ctrl_c, token.clone()));

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let t = token.clone();
        tokio::spawn(async move {
            if let Ok(mut term) = signal(SignalKind::terminate()) {
                term.recv().await;
                eprintln!("SIGTERM, stopping subscription…");
                t.cancel();
            }
        });
    }

    let config = args.feed_config();
    let client = FeedClient::new(config.clone()).context("invalid client configuration")?;
    let mut subscription = client
        .subscription(&args.endpoint)
        .context("endpoint must be a valid URL")?;

    if args.verbose {
        eprintln!("subscribing to:");
        eprintln!("endpoint: {}", subscription.endpoint());
        eprintln!("pollDelay: {:?}", config.poll_delay);
        eprintln!("timeout: {:?}", config.long_poll_timeout.unwrap_or_default());
        eprintln!("requestTimeout: {:?}", config.request_timeout.unwrap_or_default());
        eprintln!("lastEventId: {}", args.last_event_id);
    }

    let (tx, mut rx) = mpsc::channel::<Event>(1);
    let stop = StopSignal::from_token(token);

    let runner = tokio::spawn({
        let stop = stop.clone();
        let last_event_id = args.last_event_id.clone();
        async move {
            let mut cursor = Cursor::new(last_event_id);
            let result = subscription.run(&mut cursor, &tx, &stop).await;
            (result, cursor)
        }
    });

    let mut stdout = std::io::stdout().lock();
    while let Some(event) = rx.recv().await {
        let line = render(&event, args.field.as_deref())?;
        if writeln!(stdout, "{line}").is_err() {
            // stdout closed, e.g. piped into `head`.
            stop.stop();
            break;
        }
    }
    drop(rx);

    let (result, cursor) = runner.await.context("subscription task failed")?;
    info!(last_event_id = %cursor, "subscription ended");
    result.context("subscription failed")?;
    Ok(())
}

/// Cancel `token` on the first interrupt and force an exit on the second.
///
/// Returns once interrupts can no longer be received.
async fn watch_interrupts<F, Fut>(mut interrupted: F, token: CancellationToken)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let mut hits = 0usize;
    loop {
        if let Err(error) = interrupted().await {
            warn!(%error, "cannot listen for Ctrl+C");
            return;
        }
        hits += 1;
        if hits == 1 {
            eprintln!("Ctrl+C, stopping subscription… (press again to force)");
            token.cancel();
        } else {
            eprintln!("Force exiting.");
            std::process::exit(130);
        }
    }
}

/// Render one event as a line of output.
fn render(event: &Event, field: Option<&str>) -> anyhow::Result<String> {
    match field {
        Some(key) => Ok(match event.data_field(key) {
            Some(serde_json::Value::String(value)) => value.clone(),
            Some(value) => value.to_string(),
            None => "null".to_string(),
        }),
        None => serde_json::to_string(event).context("failed to encode event"),
    }
}
