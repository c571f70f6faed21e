//! Follow a queue ticket from the terminal.
//!
//! Restores the stored session (or signs in with `QUEUEPASS_PHONE` and
//! `QUEUEPASS_PASSWORD`), refreshes the ticket and logs the countdown until
//! interrupted.

use queuepass_client::realtime::WsTransport;
use queuepass_client::session::FileStorage;
use queuepass_client::view_model::format_wait_time;
use queuepass_client::{ClientConfig, QueueClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const REPORT_INTERVAL: Duration = Duration::from_secs(30);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,queuepass_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env();
    info!(
        api = %config.api.base_url,
        ws = %config.realtime.url,
        session_file = %config.storage.path.display(),
        "Configuration loaded"
    );

    let storage = Arc::new(FileStorage::new(config.storage.path.clone()));
    let client = QueueClient::start(config, storage, WsTransport).await?;

    let _connection = client.on_connection_change(|connected| {
        if *connected {
            info!("Live updates connected");
        } else {
            warn!("Live updates disconnected");
        }
    });
    let _errors = client.on_error(|err| warn!(error = %err, "Live update error"));
    let _updates = client.on_ticket_update(|update| info!(?update, "Ticket update"));

    if !client.session().is_authenticated().await {
        let phone = std::env::var("QUEUEPASS_PHONE").unwrap_or_default();
        let password = std::env::var("QUEUEPASS_PASSWORD").unwrap_or_default();
        if let Err(err) = client.sign_in(&phone, &password).await {
            let notice = err.notice();
            error!(title = %notice.title, description = %notice.description, "Sign-in failed");
            return Err(err.into());
        }
    }

    match client.sync_ticket().await {
        Ok(Some(ticket)) => info!(status = ?ticket.status, position = ?ticket.queue_position, "Ticket loaded"),
        Ok(None) => info!("No ticket on the server"),
        Err(err) => warn!(error = %err, "Could not refresh ticket"),
    }

    if !client.session().has_ticket().await && std::env::var("QUEUEPASS_TAKE_PLACE").is_ok_and(|v| v == "1") {
        client.take_place().await?;
    }

    let mut view = client.ticket_view().await;
    let mut report = tokio::time::interval(REPORT_INTERVAL);

    loop {
        tokio::select! {
            _ = report.tick() => {
                match (client.session().ticket().await, view.as_mut()) {
                    (Some(ticket), Some(view)) => view.sync_ticket(ticket),
                    (Some(_), None) => view = client.ticket_view().await,
                    (None, _) => view = None,
                }

                let Some(view) = view.as_ref() else {
                    info!("No ticket held");
                    continue;
                };
                let metrics = view.metrics();
                info!(
                    people_ahead = metrics.people_ahead,
                    remaining = %format_wait_time(metrics.remaining_minutes),
                    progress = format!("{:.0}%", metrics.progress_percentage),
                    expected_call = %metrics.expected_call_time.format("%H:%M"),
                    server_estimate = %view.estimated_wait(),
                    being_called = metrics.is_being_called,
                    connection = ?client.connection_state(),
                    "Queue status"
                );
            }
            _ = signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    client.shutdown(SHUTDOWN_TIMEOUT).await?;
    Ok(())
}
