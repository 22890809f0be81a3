//! Command implementations.

use crate::settings_file::SettingsFile;
use anyhow::{bail, Context, Result};
use marketplace_chat_client::{ChatApiClient, ChatClientConfig};
use outreach_outbox::{Admission, NewOutreachJob, OutreachConfig, OutreachGate, OutreachOutbox};
use outreach_store::{DeliveryClaim, OutreachStore, StoreError, StoreFiles};
use seller_config_and_utils::{Config, Paths};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Map the file/env configuration onto the outbox tunables.
pub fn outreach_config(config: &Config) -> OutreachConfig {
    OutreachConfig {
        queue_capacity: config.outreach.queue_capacity.max(1),
        min_send_interval: Duration::from_millis(config.outreach.min_send_interval_ms),
        ..OutreachConfig::default()
    }
}

pub fn open_store(config: &Config, paths: &Paths) -> OutreachStore {
    OutreachStore::new(StoreFiles {
        pending: paths.outreach_queue_file(),
        sent: paths.outreach_sent_file(),
        dead_letter: paths.outreach_dead_file(),
    })
    .with_retention_days(config.outreach.sent_retention_days)
}

/// Run the delivery worker until Ctrl-C or SIGTERM.
pub async fn run(config: &Config, paths: &Paths) -> Result<()> {
    let store = Arc::new(open_store(config, paths));
    let _claim = claim_delivery(&store)?;

    if !config.has_write_credentials() {
        bail!("marketplace write credentials missing: set OZON_WRITE_CLIENT_ID and OZON_WRITE_API_KEY");
    }

    let client = ChatApiClient::new(ChatClientConfig {
        base_url: config.marketplace.base_url.clone(),
        client_id: config.marketplace.client_id.clone(),
        api_key: config.marketplace.api_key.clone(),
        timeout_secs: config.marketplace.timeout_secs,
    })
    .context("building marketplace chat client")?;

    let settings = Arc::new(SettingsFile::open(paths.seller_settings_file()));
    let (_gate, worker) = OutreachOutbox::new(
        outreach_config(config),
        store,
        settings.clone(),
        settings,
        Arc::new(client),
    )?
    .into_parts();

    let token = worker.cancellation_token();
    let handle = tokio::spawn(worker.run());
    info!(storage_dir = %paths.storage_dir().display(), "Outreach service running");

    shutdown_signal().await?;
    info!("Shutdown requested, stopping delivery worker");
    token.cancel();
    handle.await.context("delivery worker panicked")?;
    Ok(())
}

/// One process delivers from a store. Offline admission takes the same claim,
/// so it never runs beside a worker that has already bootstrapped.
fn claim_delivery(store: &OutreachStore) -> Result<DeliveryClaim> {
    match store.claim_delivery() {
        Ok(claim) => Ok(claim),
        Err(StoreError::Busy { path }) => bail!(
            "a seller-outreach worker is running on this storage ({} is locked)",
            path.display()
        ),
        Err(err) => Err(err).context("claiming the outreach store"),
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("waiting for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")
}

pub fn status(config: &Config, paths: &Paths) -> Result<()> {
    let store = open_store(config, paths);
    println!("storage:      {}", paths.storage_dir().display());
    println!("pending:      {}", store.pending_count()?);
    println!("sent-record:  {}", store.sent_count()?);
    println!("dead-letter:  {}", store.dead_letters()?.len());
    Ok(())
}

pub fn dead_letters(config: &Config, paths: &Paths, limit: usize) -> Result<()> {
    let store = open_store(config, paths);
    for entry in store.recent_dead_letters(limit)? {
        println!("{}", serde_json::to_string(&entry)?);
    }
    Ok(())
}

/// Admit one job into Pending; the next `run` delivers it. Refused while a
/// worker is running on the same storage.
pub fn enqueue(config: &Config, paths: &Paths, request: NewOutreachJob) -> Result<()> {
    let store = Arc::new(open_store(config, paths));
    let _claim = claim_delivery(&store)?;
    let settings = Arc::new(SettingsFile::open(paths.seller_settings_file()));
    let gate = OutreachGate::offline(store, settings);

    match gate.enqueue(request) {
        Admission::Queued { idempotency_key } | Admission::Persisted { idempotency_key } => {
            println!("admitted {idempotency_key}");
        }
        Admission::OutreachDisabled => println!("skipped: outreach disabled for this seller"),
        Admission::SettingsUnavailable => println!("dropped: seller settings unreadable (see logs)"),
        Admission::AlreadySent { idempotency_key } => println!("skipped: {idempotency_key} already delivered"),
        Admission::AlreadyPending { idempotency_key } => println!("skipped: {idempotency_key} already pending"),
        Admission::QueueFull { idempotency_key } => println!("dropped: {idempotency_key}, queue full"),
        Admission::StoreUnavailable { idempotency_key } => {
            println!("dropped: {idempotency_key}, store unavailable (see logs)")
        }
    }
    Ok(())
}

/// Mark a conversation as opened by the buyer.
pub fn activate(paths: &Paths, user_id: i64, chat_id: &str) -> Result<()> {
    let settings = SettingsFile::open(paths.seller_settings_file());
    let seller = settings.update(user_id, |seller| {
        seller.activated_chat_ids.insert(chat_id.trim().to_string());
    })?;
    println!("seller {user_id}: {} activated chats", seller.activated_chat_ids.len());
    Ok(())
}

/// Turn outreach on or off for a seller, optionally changing their pacing.
pub fn set_outreach(paths: &Paths, user_id: i64, enabled: bool, interval_secs: Option<u64>) -> Result<()> {
    let settings = SettingsFile::open(paths.seller_settings_file());
    let seller = settings.update(user_id, |seller| {
        seller.outreach_enabled = enabled;
        if let Some(secs) = interval_secs {
            seller.outreach_interval_secs = secs.max(1);
        }
    })?;
    println!(
        "seller {user_id}: outreach {}, pacing {}s ({})",
        if seller.outreach_enabled { "enabled" } else { "disabled" },
        seller.outreach_interval_secs,
        settings.path().display()
    );
    Ok(())
}
