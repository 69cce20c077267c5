//! Drumline Service - the rule authority
//!
//! Speaks the browser native-messaging protocol on stdin/stdout:
//! - Tracks the active document's hostname
//! - Answers panel queries and applies rule changes
//! - Sends page-block directives and panel pushes
//! - Checkpoints rules to SQLite in the background
//!
//! Logs go to stderr; stdout carries frames only.

mod host;

use anyhow::Result;
use chrono::NaiveTime;
use colored::*;
use drumline_core::{
    authority::AuthorityService,
    database::{Database, KeyValueStore, PersistWriter},
    dispatch::Dispatcher,
    protocol::Envelope,
    Config, DrumlineError, ErrorKind, Hostname,
};
use host::{HostCourier, Inbound, Outbound};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

fn print_banner() {
    eprintln!();
    eprintln!("{}", "╔═══════════════════════════════════════════════════════════════╗".cyan());
    eprintln!("{}", "║                       DRUMLINE AUTHORITY                      ║".cyan());
    eprintln!("{}", "║                Hostname Blocking on a Schedule                ║".cyan());
    eprintln!("{}", "╚═══════════════════════════════════════════════════════════════╝".cyan());
    eprintln!();
}

/// A navigation target without a usable hostname counts as none.
fn navigation_target(hostname: Option<String>) -> Option<Hostname> {
    let raw = hostname?;
    match Hostname::parse(&raw) {
        Ok(hostname) => Some(hostname),
        Err(e) => {
            debug!("No hostname for {:?}: {}", raw, e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter.as_str())
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    print_banner();

    if let Some(parent) = config.database.parent() {
        std::fs::create_dir_all(parent)?;
    }
    eprintln!("{} {}", "Database:".dimmed(), config.database.display());

    let db = Arc::new(Database::open(&config.database)?);
    let (mut service, load_errors) = AuthorityService::load(db.as_ref());

    let rules = service.rules();
    let indefinite = rules.iter().filter(|(_, r)| r.is_indefinitely_blocked()).count();
    eprintln!(
        "{} {} total, {} indefinite",
        "Rules:".dimmed(),
        rules.len(),
        indefinite
    );
    eprintln!();

    let (in_tx, in_rx) = mpsc::channel::<drumline_core::Result<Inbound>>(1000);
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(1000);

    let reader = tokio::spawn(host::read_inbound(tokio::io::stdin(), in_tx));
    let writer = tokio::spawn(host::write_outbound(tokio::io::stdout(), out_rx));

    let courier = Arc::new(HostCourier::new(out_tx.clone()));
    let store: Arc<dyn KeyValueStore> = db;
    let persist = PersistWriter::spawn(store, courier.clone());
    let dispatcher = Dispatcher::new(courier.clone(), courier, persist);

    for err in &load_errors {
        dispatcher.report(err);
    }

    run_event_loop(&mut service, in_rx, &out_tx, &dispatcher, || {
        chrono::Local::now().time()
    })
    .await;

    info!("Service shutting down");
    reader.abort();
    dispatcher.shutdown().await;
    drop(out_tx);
    if let Err(e) = writer.await {
        error!("Output task failed: {}", e);
    }
    Ok(())
}

/// Main event loop; the only place rules change. Returns at end of input or
/// when the host output closes.
async fn run_event_loop(
    service: &mut AuthorityService,
    mut inbound: mpsc::Receiver<drumline_core::Result<Inbound>>,
    out_tx: &mpsc::Sender<Outbound>,
    dispatcher: &Dispatcher,
    clock: impl Fn() -> NaiveTime,
) {
    while let Some(frame) = inbound.recv().await {
        let now = clock();

        let (request_id, result) = match frame {
            Ok(Inbound::Navigation { hostname }) => {
                dispatcher.dispatch(service.on_navigation(navigation_target(hostname), now));
                continue;
            }
            Ok(Inbound::Message {
                request_id,
                envelope,
            }) => (
                request_id,
                Envelope::from_value(envelope).and_then(|e| service.handle(e, now)),
            ),
            Err(e) => (None, Err(e)),
        };

        let reply = match result {
            Ok(outcome) => {
                dispatcher.dispatch(outcome.effects);
                outcome
                    .response
                    .map(|body| Outbound::Response { request_id, body })
            }
            Err(e) => {
                dispatcher.report(&e);
                escalate(request_id, &e)
            }
        };

        if let Some(reply) = reply {
            if out_tx.send(reply).await.is_err() {
                error!("Host output closed");
                break;
            }
        }
    }
}

/// Protocol errors go back to the caller; everything else is reported locally.
fn escalate(request_id: Option<u64>, err: &DrumlineError) -> Option<Outbound> {
    (err.kind() == ErrorKind::Protocol).then(|| Outbound::Error {
        request_id,
        message: err.to_string(),
    })
}
