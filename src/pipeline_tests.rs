// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the synchronization pipeline.

#[cfg(test)]
mod tests {
    use super::super::{
        transmission_stage, transmit_record_set, StageState, SyncPipeline,
    };
    use crate::config::{ReverseConfig, SyncConfig};
    use crate::discovery::{Endpoint, EndpointSource};
    use crate::dns::records::{DesiredRecord, RecordKind};
    use crate::dns::transaction::UpdateTransaction;
    use crate::dns::transport::{ServerTarget, ZoneUpdater};
    use crate::dns::tsig::Credential;
    use crate::dns_errors::{StartupError, SyncError, TransportError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    // ========================================================================
    // Fakes
    // ========================================================================

    /// Hands out scripted rosters, then repeats the last one.
    struct ScriptedSource {
        rosters: VecDeque<Result<Vec<Endpoint>, SyncError>>,
        last: Vec<Endpoint>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(rosters: Vec<Result<Vec<Endpoint>, SyncError>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                rosters: rosters.into(),
                last: Vec::new(),
                calls: calls.clone(),
            };
            (source, calls)
        }
    }

    #[async_trait]
    impl EndpointSource for ScriptedSource {
        async fn list_online_endpoints(&mut self) -> Result<Vec<Endpoint>, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.rosters.pop_front() {
                Some(Ok(roster)) => {
                    self.last = roster.clone();
                    Ok(roster)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.clone()),
            }
        }
    }

    /// Records every transaction; zones listed in `failing` are rejected.
    #[derive(Clone, Default)]
    struct RecordingUpdater {
        sent: Arc<Mutex<Vec<UpdateTransaction>>>,
        failing: Vec<String>,
        validation: Option<SyncError>,
    }

    impl RecordingUpdater {
        fn sent(&self) -> Vec<UpdateTransaction> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ZoneUpdater for RecordingUpdater {
        async fn validate_connection(&self) -> Result<(), SyncError> {
            match &self.validation {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }

        async fn send(&self, transaction: &UpdateTransaction) -> Result<(), SyncError> {
            self.sent.lock().unwrap().push(transaction.clone());
            if self.failing.contains(&transaction.zone) {
                return Err(TransportError::Rejected {
                    server: "127.0.0.1:53".to_string(),
                    zone: transaction.zone.clone(),
                    code: "REFUSED".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn sync_config(poll: Duration, update: Duration, dry_run: bool) -> SyncConfig {
        SyncConfig {
            forward_zone: "ts.example.com".to_string(),
            ttl: 300,
            poll_interval: poll,
            update_interval: update,
            credential: Credential {
                key_name: "ddns-key".to_string(),
                secret: "c2VjcmV0LWtleS1ieXRlcw==".to_string(),
                algorithm: "hmac-sha256".to_string(),
            },
            dry_run,
            reverse: ReverseConfig::disabled(),
            target: ServerTarget {
                server: "127.0.0.1".to_string(),
                port: 53,
            },
            timeout: Duration::from_secs(1),
        }
    }

    fn endpoint(id: &str, ipv4: &str) -> Endpoint {
        Endpoint {
            id: id.to_string(),
            name: format!("{id}.tail1234.ts.net"),
            ipv4: Some(ipv4.parse().unwrap()),
            ipv6: None,
            online: true,
            last_seen: None,
        }
    }

    fn a_record(name: &str, value: &str, zone: &str) -> DesiredRecord {
        DesiredRecord {
            kind: RecordKind::A,
            name: name.to_string(),
            value: value.to_string(),
            ttl: 300,
            zone: zone.to_string(),
        }
    }

    fn ptr_record(name: &str, zone: &str) -> DesiredRecord {
        DesiredRecord {
            kind: RecordKind::Ptr,
            name: name.to_string(),
            value: "host.ts.example.com".to_string(),
            ttl: 300,
            zone: zone.to_string(),
        }
    }

    fn reverse_enabled(mut config: SyncConfig) -> SyncConfig {
        config.reverse.ipv4.enabled = true;
        config.reverse.ipv4.subnet = Some("100.64.0.0/10".parse().unwrap());
        config.reverse.ipv4.boundary = 24;
        config.reverse.ipv4.zone = Some("100.in-addr.arpa".to_string());
        config
    }

    /// Poll `check` until it holds or five seconds pass.
    async fn wait_for(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    const HOUR: Duration = Duration::from_secs(3600);

    // ========================================================================
    // transmit_record_set
    // ========================================================================

    #[tokio::test]
    async fn test_transmit_sends_one_transaction_per_zone() {
        let config = reverse_enabled(sync_config(HOUR, HOUR, false));
        let updater = RecordingUpdater::default();
        let records = vec![
            a_record("alpha", "100.64.1.1", "ts.example.com"),
            a_record("beta", "100.64.2.1", "ts.example.com"),
            ptr_record("1.1.64.100.in-addr.arpa.", "1.64.100.in-addr.arpa"),
            ptr_record("1.2.64.100.in-addr.arpa.", "2.64.100.in-addr.arpa"),
        ];

        let summary =
            transmit_record_set(&records, &config, &updater, &CancellationToken::new()).await;

        assert_eq!(summary.records, 4);
        assert_eq!(summary.zones, 3);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 0);

        let sent = updater.sent();
        let zones: Vec<&str> = sent.iter().map(|t| t.zone.as_str()).collect();
        assert_eq!(
            zones,
            vec!["1.64.100.in-addr.arpa", "2.64.100.in-addr.arpa", "ts.example.com"]
        );
        assert_eq!(sent[2].operations.len(), 4, "two records, delete + insert each");
    }

    #[tokio::test]
    async fn test_transmit_continues_after_failed_zone() {
        let config = reverse_enabled(sync_config(HOUR, HOUR, false));
        let updater = RecordingUpdater {
            failing: vec!["1.64.100.in-addr.arpa".to_string()],
            ..RecordingUpdater::default()
        };
        let records = vec![
            a_record("alpha", "100.64.1.1", "ts.example.com"),
            ptr_record("1.1.64.100.in-addr.arpa.", "1.64.100.in-addr.arpa"),
        ];

        let summary =
            transmit_record_set(&records, &config, &updater, &CancellationToken::new()).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(updater.sent().len(), 2, "the forward zone is still attempted");
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let config = sync_config(HOUR, HOUR, true);
        let updater = RecordingUpdater::default();
        let records = vec![a_record("alpha", "100.64.1.1", "ts.example.com")];

        let summary =
            transmit_record_set(&records, &config, &updater, &CancellationToken::new()).await;

        assert!(summary.dry_run);
        assert_eq!(summary.succeeded, 1);
        assert!(updater.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_transmit_starts_no_zone() {
        let config = sync_config(HOUR, HOUR, false);
        let updater = RecordingUpdater::default();
        let records = vec![a_record("alpha", "100.64.1.1", "ts.example.com")];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = transmit_record_set(&records, &config, &updater, &cancel).await;

        assert_eq!(summary.skipped, 1);
        assert!(updater.sent().is_empty());
    }

    #[tokio::test]
    async fn test_same_set_has_same_digest() {
        let config = sync_config(HOUR, HOUR, true);
        let updater = RecordingUpdater::default();
        let first = vec![
            a_record("alpha", "100.64.1.1", "ts.example.com"),
            a_record("beta", "100.64.1.2", "ts.example.com"),
        ];
        let reordered: Vec<DesiredRecord> = first.iter().rev().cloned().collect();
        let cancel = CancellationToken::new();

        let a = transmit_record_set(&first, &config, &updater, &cancel).await;
        let b = transmit_record_set(&reordered, &config, &updater, &cancel).await;

        assert_eq!(a.digest, b.digest);
    }

    // ========================================================================
    // Stages
    // ========================================================================

    #[tokio::test]
    async fn test_transmission_keeps_newest_pending_set() {
        let config = sync_config(HOUR, Duration::from_millis(50), false);
        let updater = RecordingUpdater::default();
        let (tx, rx) = mpsc::channel(10);

        for value in ["100.64.0.1", "100.64.0.2", "100.64.0.3"] {
            tx.send(vec![a_record("host", value, "ts.example.com")])
                .await
                .unwrap();
        }

        let stage = tokio::spawn(transmission_stage(
            config,
            updater.clone(),
            rx,
            CancellationToken::new(),
        ));

        wait_for(|| updater.sent().len() >= 2).await;
        drop(tx);
        let report = tokio::time::timeout(Duration::from_secs(5), stage)
            .await
            .unwrap()
            .unwrap();

        let values: Vec<String> = updater
            .sent()
            .iter()
            .map(|t| t.operations[1].to_string())
            .collect();
        assert_eq!(values.len(), 2, "the middle set is coalesced away");
        assert!(values[0].ends_with("100.64.0.1"), "{values:?}");
        assert!(values[1].ends_with("100.64.0.3"), "{values:?}");
        assert_eq!(report.state, StageState::Stopped);
        assert_eq!(report.processed, 2);
    }

    #[tokio::test]
    async fn test_transmission_stops_on_cancel_while_waiting() {
        let config = sync_config(HOUR, HOUR, false);
        let (_tx, rx) = mpsc::channel::<Vec<DesiredRecord>>(1);
        let cancel = CancellationToken::new();

        let stage = tokio::spawn(transmission_stage(
            config,
            RecordingUpdater::default(),
            rx,
            cancel.clone(),
        ));
        cancel.cancel();

        let report = tokio::time::timeout(Duration::from_secs(5), stage)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.state, StageState::Stopped);
        assert_eq!(report.processed, 0);
    }

    // ========================================================================
    // Whole pipeline
    // ========================================================================

    #[tokio::test]
    async fn test_validation_failure_starts_nothing() {
        let (source, calls) = ScriptedSource::new(vec![]);
        let updater = RecordingUpdater {
            validation: Some(
                StartupError::ConnectivityCheck {
                    server: "127.0.0.1:53".to_string(),
                    zone: "ts.example.com".to_string(),
                    reason: "timed out".to_string(),
                }
                .into(),
            ),
            ..RecordingUpdater::default()
        };
        let pipeline = SyncPipeline::new(sync_config(HOUR, HOUR, false), source, updater);

        let err = pipeline.run(CancellationToken::new()).await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_fetch_and_update_are_immediate() {
        // Hour-long intervals: anything sent must come from the startup cycle.
        let roster = vec![endpoint("alpha", "100.64.0.1"), endpoint("beta", "100.64.0.2")];
        let (source, calls) = ScriptedSource::new(vec![Ok(roster)]);
        let updater = RecordingUpdater::default();
        let pipeline =
            SyncPipeline::new(sync_config(HOUR, HOUR, false), source, updater.clone());

        let cancel = CancellationToken::new();
        let run = tokio::spawn(pipeline.run(cancel.clone()));

        wait_for(|| !updater.sent().is_empty()).await;
        cancel.cancel();
        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let sent = updater.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].zone, "ts.example.com");
        assert_eq!(sent[0].record_count(), 2);
        assert!(report.all_stopped());
        assert_eq!(report.discovery.processed, 1);
        assert_eq!(report.transmission.processed, 1);
    }

    #[tokio::test]
    async fn test_discovery_error_is_retried_next_tick() {
        let failure: SyncError = TransportError::Discovery {
            url: "https://api.tailscale.com".to_string(),
            reason: "HTTP 500".to_string(),
        }
        .into();
        let (source, calls) = ScriptedSource::new(vec![
            Err(failure),
            Ok(vec![endpoint("alpha", "100.64.0.1")]),
        ]);
        let updater = RecordingUpdater::default();
        let pipeline = SyncPipeline::new(
            sync_config(Duration::from_millis(30), HOUR, false),
            source,
            updater.clone(),
        );

        let cancel = CancellationToken::new();
        let run = tokio::spawn(pipeline.run(cancel.clone()));

        wait_for(|| !updater.sent().is_empty()).await;
        cancel.cancel();
        let report = run.await.unwrap().unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert!(report.all_stopped());
    }

    #[tokio::test]
    async fn test_empty_roster_is_not_forwarded() {
        let offline = Endpoint {
            online: false,
            ..endpoint("gamma", "100.64.0.9")
        };
        let (source, calls) = ScriptedSource::new(vec![Ok(vec![]), Ok(vec![offline])]);
        let updater = RecordingUpdater::default();
        let pipeline = SyncPipeline::new(
            sync_config(Duration::from_millis(20), Duration::from_millis(20), false),
            source,
            updater.clone(),
        );

        let cancel = CancellationToken::new();
        let run = tokio::spawn(pipeline.run(cancel.clone()));

        wait_for(|| calls.load(Ordering::SeqCst) >= 4).await;
        cancel.cancel();
        let report = run.await.unwrap().unwrap();

        assert!(updater.sent().is_empty());
        assert_eq!(report.synthesis.processed, 0);
        assert_eq!(report.transmission.processed, 0);
        assert!(report.all_stopped());
    }
}
