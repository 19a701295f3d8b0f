use std::{fmt, time::Duration};

use alloy::primitives::{Address, BlockNumber};
use backon::{BackoffBuilder, ExponentialBuilder};
use tokio_util::sync::CancellationToken;

use crate::{
    SyncError,
    alert::{AlertSink, LogAlertSink},
    chain_reader::ChainReader,
    contract::ContractDescriptor,
    range_scanner::RangeScanner,
    reconciler::BlockHeightReconciler,
    store::{Checkpoint, CheckpointStore},
    syncer::EventHandler,
    types::{DecodedLog, SyncResult},
};

/// Steps of a sync pass, in order. Used to tell where a failed pass stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Start,
    ResolveStart,
    ReconcileCeiling,
    ScanAndCommit,
    AdvanceCursor,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Start => "start",
            SyncPhase::ResolveStart => "resolve-start",
            SyncPhase::ReconcileCeiling => "reconcile-ceiling",
            SyncPhase::ScanAndCommit => "scan-and-commit",
            SyncPhase::AdvanceCursor => "advance-cursor",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a successful pass did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SyncReport {
    /// First block the pass looked at.
    pub resume_block: BlockNumber,
    /// Highest block the pass was allowed to reach.
    pub ceiling: BlockNumber,
    /// Last block actually scanned, `None` if there was nothing to scan.
    pub breakpoint: Option<BlockNumber>,
    /// Events handed to the handler and committed.
    pub committed: usize,
    /// Whether the scan reached the ceiling.
    pub caught_up: bool,
}

/// Keeps a contract's event history in a [`CheckpointStore`] in step with the chain.
#[derive(Debug)]
pub struct EventSyncer<R, A = LogAlertSink> {
    pub(super) reader: R,
    pub(super) contract: ContractDescriptor,
    pub(super) store: CheckpointStore,
    pub(super) alerts: A,
    pub(super) events_sync_step: i64,
    pub(super) starting_block: BlockNumber,
    pub(super) buffer_blocks: u64,
    pub(super) max_chunks_per_scan: usize,
    pub(super) monitor_account: Option<Address>,
    pub(super) retry: ExponentialBuilder,
}

impl<R: ChainReader, A: AlertSink> EventSyncer<R, A> {
    #[must_use]
    pub fn reader(&self) -> &R {
        &self.reader
    }

    #[must_use]
    pub fn contract(&self) -> &ContractDescriptor {
        &self.contract
    }

    #[must_use]
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    #[must_use]
    pub fn monitor_account(&self) -> Option<Address> {
        self.monitor_account
    }

    /// Runs one bounded sync pass.
    ///
    /// New events are handed to `handler` in chain order and each one is committed as soon as
    /// the handler accepts it. The pass covers at most the configured number of log queries, see
    /// [`EventSyncer::sync_to_tip`] to keep going until the head is reached.
    ///
    /// # Errors
    ///
    /// Any failure stops the pass and is reported to the alert sink. Events committed before the
    /// failure stay committed and the next pass resumes after them.
    pub async fn sync_events<H: EventHandler>(&self, handler: &mut H) -> SyncResult<SyncReport> {
        let mut phase = SyncPhase::Start;

        match self.run_pass(handler, &mut phase).await {
            Ok(report) => {
                debug!(
                    resume_block = report.resume_block,
                    ceiling = report.ceiling,
                    breakpoint = ?report.breakpoint,
                    committed = report.committed,
                    "Sync pass done"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(phase = %phase, error = %e, "Sync pass failed");
                trace!(phase = %SyncPhase::Failed, "Entered phase");
                self.alerts.notify(&e);
                Err(e)
            }
        }
    }

    /// Runs passes until one reaches its ceiling.
    ///
    /// The returned report is the last pass's, with `committed` summed over all passes.
    pub async fn sync_to_tip<H: EventHandler>(&self, handler: &mut H) -> SyncResult<SyncReport> {
        let mut committed = 0;
        loop {
            let report = self.sync_events(handler).await?;
            committed += report.committed;
            if report.caught_up {
                return Ok(SyncReport { committed, ..report });
            }
        }
    }

    /// Keeps the store in sync until `shutdown` is cancelled.
    ///
    /// Catches up to the head every `poll_interval`. A failed catch-up is retried with
    /// exponential backoff; the retry budget is restored after every success.
    ///
    /// # Errors
    ///
    /// The last error once the retry budget is spent, or right away for errors retrying cannot
    /// fix (see [`SyncError::is_transient`]).
    pub async fn run<H: EventHandler>(
        &self,
        handler: &mut H,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> SyncResult<()> {
        info!(poll_interval_ms = poll_interval.as_millis(), "Polling for contract events");
        let mut backoff = self.retry.build();

        while !shutdown.is_cancelled() {
            let delay = match self.sync_to_tip(handler).await {
                Ok(_) => {
                    backoff = self.retry.build();
                    poll_interval
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => match backoff.next() {
                    Some(delay) => {
                        info!(retry_in_ms = delay.as_millis(), "Retrying sync");
                        delay
                    }
                    None => {
                        error!(error = %e, "Giving up after repeated sync failures");
                        return Err(e);
                    }
                },
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        info!("Event polling stopped");
        Ok(())
    }

    /// Forgets all progress so the next pass starts over from the starting block. Stored events
    /// are kept, and replaying them does not store them twice.
    pub async fn reset_events(&self) -> SyncResult<()> {
        self.store.reset_checkpoint().await?;
        info!(starting_block = self.starting_block, "Event sync reset");
        Ok(())
    }

    async fn run_pass<H: EventHandler>(
        &self,
        handler: &mut H,
        phase: &mut SyncPhase,
    ) -> SyncResult<SyncReport> {
        enter(phase, SyncPhase::ResolveStart);
        let checkpoint = self.store.checkpoint().await?;
        let resume_block = checkpoint
            .map_or(self.starting_block, |checkpoint| checkpoint.resume_block(self.starting_block));
        let last_checked = checkpoint.map_or(0, |checkpoint| checkpoint.scan_cursor());

        enter(phase, SyncPhase::ReconcileCeiling);
        let ceiling = self.reconcile_ceiling(last_checked).await?;

        enter(phase, SyncPhase::ScanAndCommit);
        let scanner = RangeScanner::new(
            &self.reader,
            &self.contract,
            self.events_sync_step,
            self.max_chunks_per_scan,
        );
        let outcome = scanner.scan(resume_block, ceiling).await?;
        let committed = self.handle_and_commit(outcome.events, checkpoint, handler).await?;

        enter(phase, SyncPhase::AdvanceCursor);
        if let Some(breakpoint) = outcome.breakpoint {
            self.store.advance_scan_cursor(breakpoint).await?;
        }

        enter(phase, SyncPhase::Done);
        Ok(SyncReport {
            resume_block,
            ceiling,
            breakpoint: outcome.breakpoint,
            committed,
            caught_up: outcome.breakpoint.is_none_or(|breakpoint| breakpoint >= ceiling),
        })
    }

    async fn reconcile_ceiling(&self, last_checked: BlockNumber) -> SyncResult<BlockNumber> {
        let hint = self.reader.get_latest_block_hint().await?;
        let true_latest = BlockHeightReconciler::new(&self.reader)
            .get_true_latest_block_number(last_checked, hint)
            .await;

        if true_latest.is_none() {
            let inconsistent = SyncError::InconsistentHeight { hint, last_checked };
            warn!(error = %inconsistent, "Falling back to the last checked block");
            self.alerts.notify(&inconsistent);
        }

        Ok(BlockHeightReconciler::<R>::reliable_block_number(
            true_latest,
            last_checked,
            self.buffer_blocks,
        ))
    }

    async fn handle_and_commit<H: EventHandler>(
        &self,
        groups: Vec<Vec<DecodedLog>>,
        checkpoint: Option<Checkpoint>,
        handler: &mut H,
    ) -> SyncResult<usize> {
        let mut committed = 0;

        for decoded in groups.into_iter().flatten() {
            let record = decoded?;
            let position = record.position();

            if checkpoint.is_some_and(|checkpoint| checkpoint.is_committed(position)) {
                trace!(position = %position, "Skipping committed event");
                continue;
            }

            handler.handle(&record.event_name, &record.fields, record.transaction_hash).map_err(
                |e| SyncError::Handler {
                    event_name: record.event_name.clone(),
                    block_number: record.block_number,
                    source: e.into(),
                },
            )?;

            self.store.commit_event(&record).await?;
            committed += 1;
        }

        Ok(committed)
    }
}

fn enter(phase: &mut SyncPhase, next: SyncPhase) {
    trace!(phase = %next, "Entered phase");
    *phase = next;
}
