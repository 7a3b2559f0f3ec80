use std::sync::Arc;

use chrono::Utc;
use hms_notify::bus::event_types::EVENT_NOTIFICATION;
use hms_notify::error::ResultExt;
use hms_notify::transport::LiveTransport;
use hms_notify::{
    logging, ClientConfig, EventRegistry, HttpNotificationApi, Notification, NotificationSession,
    NotificationStore, NotifyError, SessionCredentials, SocketIoTransport, TokenPair, TokenStore,
};

const ENV_ACCESS_TOKEN: &str = "HMS_ACCESS_TOKEN";
const ENV_REFRESH_TOKEN: &str = "HMS_REFRESH_TOKEN";

struct Options {
    user_id: i64,
    token: Option<String>,
    refresh_token: Option<String>,
    once: bool,
}

#[tokio::main]
async fn main() {
    logging::init();
    if let Err(error) = run().await {
        eprintln!("notify-watch failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), NotifyError> {
    let options = parse_args(std::env::args().skip(1)).map_err(NotifyError::Other)?;
    let config = ClientConfig::from_env()?;

    let tokens = match options.token.or_else(|| env_value(ENV_ACCESS_TOKEN)) {
        Some(access_token) => TokenStore::new(TokenPair {
            access_token,
            refresh_token: options.refresh_token.or_else(|| env_value(ENV_REFRESH_TOKEN)),
        }),
        None => TokenStore::empty(),
    };

    let api = HttpNotificationApi::new(&config, tokens.clone())?;
    let events = EventRegistry::new();
    let transport =
        SocketIoTransport::new(&config, events.clone())?.with_token_source(tokens.clone());
    let store = NotificationStore::new(Arc::new(api));

    println!("connecting to {}", transport.endpoint());
    let transport: Arc<dyn LiveTransport> = Arc::new(transport);
    let mut session = NotificationSession::new(
        SessionCredentials::new(options.user_id, tokens),
        transport,
        store.clone(),
    );

    let report = session.start().await;
    report.log_failures();
    if let Err(error) = report.fetched {
        session.end().await;
        return Err(error.into());
    }

    let now = Utc::now();
    let notifications = store.notifications();
    if notifications.is_empty() {
        println!("no outstanding notifications");
    }
    for notification in &notifications {
        print_notification(notification, now);
    }
    println!("unread: {}", store.unread_count());

    if options.once {
        session.end().await;
        return Ok(());
    }

    let printer = events.subscribe_typed(EVENT_NOTIFICATION, |notification: Notification| {
        print_notification(&notification, Utc::now());
    });
    println!("watching for live notifications, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.or_log("waiting for Ctrl-C");

    drop(printer);
    session.end().await;
    Ok(())
}

fn print_notification(notification: &Notification, now: chrono::DateTime<Utc>) {
    println!(
        "[{}] #{} {}: {} ({})",
        notification.kind,
        notification.id,
        notification.title,
        notification.message,
        notification.age_label(now)
    );
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut user_id = None;
    let mut token = None;
    let mut refresh_token = None;
    let mut once = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--user-id" => {
                let value = next_value(&mut args, "--user-id")?;
                user_id = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| format!("invalid --user-id '{value}'"))?,
                );
            }
            "--token" => token = Some(next_value(&mut args, "--token")?),
            "--refresh-token" => refresh_token = Some(next_value(&mut args, "--refresh-token")?),
            "--once" => once = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    Ok(Options {
        user_id: user_id.ok_or_else(|| "--user-id is required".to_string())?,
        token,
        refresh_token,
        once,
    })
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("missing value for {flag}"))
}

fn print_help() {
    println!(
        "usage: notify-watch --user-id <id> [--token <access>] [--refresh-token <refresh>] [--once]\n\n\
         Environment:\n  \
         HMS_API_BASE_URL, HMS_SOCKET_URL, HMS_SOCKET_PATH\n  \
         HMS_REQUEST_TIMEOUT_MS, HMS_CONNECT_TIMEOUT_MS, HMS_RECONNECT_MAX_ATTEMPTS\n  \
         HMS_ACCESS_TOKEN, HMS_REFRESH_TOKEN"
    );
}
