// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The synchronization pipeline.
//!
//! Three long-lived tasks connected by two bounded channels:
//!
//! ```text
//! discovery --(roster)--> synthesis --(record set)--> transmission
//! ```
//!
//! - **Discovery** fetches the online roster immediately, then once per poll
//!   interval.
//! - **Synthesis** turns each roster into a record set. Empty sets are not
//!   forwarded.
//! - **Transmission** waits for the first record set and sends it right away.
//!   After that it wakes once per update interval, drains everything pending
//!   and sends only the newest set; older ones are counted as coalesced.
//!
//! Every wait races the shared [`CancellationToken`]. Once it fires, stages
//! stop starting new work, a zone update already on the wire is allowed to
//! finish, and [`SyncPipeline::run`] joins all three tasks before returning.
//! A stage that exits drops its sender, which is how the next stage learns no
//! more input is coming.

use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::constants::PIPELINE_CHANNEL_CAPACITY;
use crate::discovery::{Endpoint, EndpointSource};
use crate::dns::records::{record_set_digest, synthesize, DesiredRecord};
use crate::dns::transaction::build_transaction;
use crate::dns::transport::ZoneUpdater;
use crate::dns::zones::group_by_zone;
use crate::dns_errors::SyncError;
use crate::duration::format_duration;
use crate::metrics;

/// Lifecycle of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Created, not yet looping
    Idle,
    /// Processing input
    Running,
    /// Cancelled or out of input; finishing in-flight work
    Draining,
    /// Exited
    Stopped,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A stage's name, state and how many items it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// `discovery`, `synthesis` or `transmission`
    pub name: &'static str,
    /// Last state reached
    pub state: StageState,
    /// Rosters published, record sets published, or cycles transmitted
    pub processed: u64,
}

impl StageReport {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            state: StageState::Idle,
            processed: 0,
        }
    }

    fn advance(&mut self, next: StageState) {
        if self.state != next {
            debug!(stage = self.name, from = %self.state, to = %next, "Stage state change");
            self.state = next;
        }
    }
}

/// Final state of all three stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Discovery stage
    pub discovery: StageReport,
    /// Synthesis stage
    pub synthesis: StageReport,
    /// Transmission stage
    pub transmission: StageReport,
}

impl PipelineReport {
    /// Returns true once every stage has stopped.
    #[must_use]
    pub fn all_stopped(&self) -> bool {
        [&self.discovery, &self.synthesis, &self.transmission]
            .iter()
            .all(|s| s.state == StageState::Stopped)
    }
}

/// Outcome of transmitting one record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    /// Order-independent digest of the record set
    pub digest: String,
    /// Records in the set
    pub records: usize,
    /// Zone batches built from the set
    pub zones: usize,
    /// Zones updated (or logged, in dry-run mode)
    pub succeeded: usize,
    /// Zones whose update failed
    pub failed: usize,
    /// Zones not attempted because of cancellation
    pub skipped: usize,
    /// Nothing was sent
    pub dry_run: bool,
}

/// Group, build and send one record set, one transaction per zone.
///
/// A failed zone is logged and the next zone is still attempted. Cancellation
/// is checked between zones; an update already sent is never interrupted.
pub async fn transmit_record_set<U>(
    records: &[DesiredRecord],
    config: &SyncConfig,
    updater: &U,
    cancel: &CancellationToken,
) -> CycleSummary
where
    U: ZoneUpdater + ?Sized,
{
    let batches = group_by_zone(records, &config.forward_zone, &config.reverse);
    let mut summary = CycleSummary {
        digest: record_set_digest(records),
        records: records.len(),
        zones: batches.len(),
        succeeded: 0,
        failed: 0,
        skipped: 0,
        dry_run: config.dry_run,
    };

    for (index, batch) in batches.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.skipped = batches.len() - index;
            info!(
                remaining = summary.skipped,
                "Cancellation requested, not starting remaining zone updates"
            );
            break;
        }

        let Some(transaction) = build_transaction(&batch.zone, &batch.records) else {
            continue;
        };

        if config.dry_run {
            for record in &batch.records {
                info!(
                    name = %record.name,
                    kind = %record.kind,
                    zone = %batch.zone,
                    value = %record.value,
                    ttl = record.ttl,
                    "DRY RUN: would update record"
                );
            }
            debug!(zone = %batch.zone, "DRY RUN: update would be:\n{}", transaction.to_nsupdate());
            summary.succeeded += 1;
            continue;
        }

        for record in &batch.records {
            debug!(
                name = %record.name,
                kind = %record.kind,
                zone = %batch.zone,
                value = %record.value,
                ttl = record.ttl,
                "Updating record"
            );
        }

        match updater.send(&transaction).await {
            Ok(()) => {
                info!(
                    zone = %batch.zone,
                    records = transaction.record_count(),
                    "Successfully updated zone"
                );
                summary.succeeded += 1;
            }
            Err(e) => {
                error!(
                    zone = %batch.zone,
                    records = transaction.record_count(),
                    reason = e.status_reason(),
                    "Failed to update zone: {}",
                    e
                );
                summary.failed += 1;
            }
        }
    }

    info!(
        records = summary.records,
        zones = summary.zones,
        succeeded = summary.succeeded,
        failed = summary.failed,
        digest = %summary.digest,
        dry_run = summary.dry_run,
        "Update cycle complete"
    );
    summary
}

/// Discovery, synthesis and transmission wired together.
pub struct SyncPipeline<S, U> {
    config: SyncConfig,
    source: S,
    updater: U,
}

impl<S, U> SyncPipeline<S, U>
where
    S: EndpointSource + 'static,
    U: ZoneUpdater + 'static,
{
    /// Create a pipeline; nothing runs until [`SyncPipeline::run`].
    #[must_use]
    pub fn new(config: SyncConfig, source: S, updater: U) -> Self {
        Self {
            config,
            source,
            updater,
        }
    }

    /// Validate the nameserver connection, then run all stages until
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the fatal startup error if validation fails; no stage is
    /// started in that case. Errors inside stages are logged, never returned.
    pub async fn run(self, cancel: CancellationToken) -> Result<PipelineReport, SyncError> {
        let Self {
            config,
            source,
            updater,
        } = self;

        info!(
            zone = %config.forward_zone,
            server = %config.target,
            dry_run = config.dry_run,
            "Validating DNS server connection"
        );
        updater.validate_connection().await?;

        warn!(
            "Records of machines that go offline or leave the tailnet are not removed; \
             they remain until deleted by hand"
        );

        let (roster_tx, roster_rx) = mpsc::channel(PIPELINE_CHANNEL_CAPACITY);
        let (records_tx, records_rx) = mpsc::channel(PIPELINE_CHANNEL_CAPACITY);

        let discovery = tokio::spawn(discovery_stage(
            source,
            config.poll_interval,
            roster_tx,
            cancel.clone(),
        ));
        let synthesis = tokio::spawn(synthesis_stage(
            config.clone(),
            roster_rx,
            records_tx,
            cancel.clone(),
        ));
        let transmission = tokio::spawn(transmission_stage(
            config,
            updater,
            records_rx,
            cancel.clone(),
        ));

        let (discovery, synthesis, transmission) = tokio::join!(discovery, synthesis, transmission);

        let report = PipelineReport {
            discovery: joined("discovery", discovery),
            synthesis: joined("synthesis", synthesis),
            transmission: joined("transmission", transmission),
        };
        info!(
            rosters = report.discovery.processed,
            record_sets = report.synthesis.processed,
            cycles = report.transmission.processed,
            "Pipeline stopped"
        );
        Ok(report)
    }
}

/// Unwrap a joined stage, reporting a panicked task as stopped.
fn joined(
    name: &'static str,
    result: Result<StageReport, tokio::task::JoinError>,
) -> StageReport {
    result.unwrap_or_else(|e| {
        error!(stage = name, error = %e, "Pipeline stage terminated abnormally");
        StageReport {
            name,
            state: StageState::Stopped,
            processed: 0,
        }
    })
}

/// Fetch the roster now and then every `poll_interval`.
pub(crate) async fn discovery_stage<S: EndpointSource>(
    mut source: S,
    poll_interval: Duration,
    tx: mpsc::Sender<Vec<Endpoint>>,
    cancel: CancellationToken,
) -> StageReport {
    let mut report = StageReport::new("discovery");
    info!(interval = %format_duration(poll_interval), "Starting Tailscale polling");

    // The first tick completes immediately.
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    report.advance(StageState::Running);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = source.list_online_endpoints() => result,
        };

        let roster = match result {
            Ok(roster) => roster,
            Err(e) => {
                error!(reason = e.status_reason(), "Failed to get machines: {}", e);
                continue;
            }
        };

        info!(online = roster.len(), "Fetched online machines");
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = tx.send(roster) => {
                if sent.is_err() {
                    debug!("Roster channel closed");
                    break;
                }
                report.processed += 1;
            }
        }
    }

    report.advance(StageState::Draining);
    drop(tx);
    report.advance(StageState::Stopped);
    info!("Tailscale polling stopped");
    report
}

/// Turn each roster into a record set and pass it on.
pub(crate) async fn synthesis_stage(
    config: SyncConfig,
    mut rx: mpsc::Receiver<Vec<Endpoint>>,
    tx: mpsc::Sender<Vec<DesiredRecord>>,
    cancel: CancellationToken,
) -> StageReport {
    let mut report = StageReport::new("synthesis");
    report.advance(StageState::Running);

    loop {
        let roster = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            roster = rx.recv() => match roster {
                Some(roster) => roster,
                None => {
                    debug!("Roster channel closed, stopping synthesis");
                    break;
                }
            },
        };

        let records = synthesize(
            &roster,
            &config.forward_zone,
            config.ttl,
            &config.reverse,
        );
        if records.is_empty() {
            debug!(machines = roster.len(), "No records synthesized, nothing to forward");
            continue;
        }

        debug!(
            machines = roster.len(),
            records = records.len(),
            digest = %record_set_digest(&records),
            "Synthesized record set"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = tx.send(records) => {
                if sent.is_err() {
                    debug!("Record channel closed");
                    break;
                }
                report.processed += 1;
            }
        }
    }

    report.advance(StageState::Draining);
    rx.close();
    drop(tx);
    report.advance(StageState::Stopped);
    debug!("Synthesis stage stopped");
    report
}

/// Send the first record set as soon as it arrives, then the newest pending
/// one every `update_interval`.
pub(crate) async fn transmission_stage<U: ZoneUpdater>(
    config: SyncConfig,
    updater: U,
    mut rx: mpsc::Receiver<Vec<DesiredRecord>>,
    cancel: CancellationToken,
) -> StageReport {
    let mut report = StageReport::new("transmission");
    info!(
        interval = %format_duration(config.update_interval),
        dry_run = config.dry_run,
        "Starting DDNS updates"
    );
    report.advance(StageState::Running);

    let first = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        first = rx.recv() => first,
    };

    if let Some(records) = first {
        transmit_record_set(&records, &config, &updater, &cancel).await;
        report.processed += 1;

        let start = tokio::time::Instant::now() + config.update_interval;
        let mut ticker = tokio::time::interval_at(start, config.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let (newest, closed) = drain_newest(&mut rx);
            if let Some(records) = newest {
                let started = Instant::now();
                transmit_record_set(&records, &config, &updater, &cancel).await;
                report.processed += 1;
                debug!(
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Transmission cycle finished"
                );
            }
            if closed {
                debug!("Record channel closed, stopping transmission");
                break;
            }
        }
    }

    report.advance(StageState::Draining);
    rx.close();
    report.advance(StageState::Stopped);
    info!("DDNS updating stopped");
    report
}

/// Take everything pending without waiting and keep only the newest set.
///
/// Returns the newest set, if any, and whether the channel is closed.
fn drain_newest<T>(rx: &mut mpsc::Receiver<T>) -> (Option<T>, bool) {
    let mut newest = None;
    let mut coalesced = 0usize;

    let closed = loop {
        match rx.try_recv() {
            Ok(item) => {
                if newest.replace(item).is_some() {
                    coalesced += 1;
                }
            }
            Err(TryRecvError::Empty) => break false,
            Err(TryRecvError::Disconnected) => break true,
        }
    };

    if coalesced > 0 {
        debug!(coalesced, "Skipping older pending record sets");
        metrics::record_coalesced(coalesced);
    }
    (newest, closed)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod pipeline_tests;
