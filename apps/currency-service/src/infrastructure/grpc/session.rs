//! Stream Session
//!
//! One task per `SubscribeRates` call. The task owns both directions of the
//! stream: it reads rate requests from the client and pushes rate responses
//! whenever its update trigger fires, multiplexed with `tokio::select!`.
//!
//! The session is removed from the registry by its own task when the loop
//! ends, so no push can ever be issued for a session already torn down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;

use super::convert;
use super::proto::currency::v1::{RateRequest, StreamingRateResponse};
use crate::application::services::RateQueryService;
use crate::domain::rates::{RatePair, RateSnapshot, RateTick};
use crate::domain::subscription::{AddOutcome, RegistryError, SessionId, SubscriptionRegistry};
use crate::infrastructure::metrics::{self, PushFailure};

/// Outbound half of a subscription stream.
pub type Outbound = mpsc::Sender<Result<StreamingRateResponse, Status>>;

/// Reasons a session ended other than a clean half-close.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading from the client failed; forwarded as the terminal status.
    #[error("inbound stream failed: {0}")]
    Inbound(Status),

    /// The client stopped reading responses.
    #[error("client disconnected")]
    Disconnected,

    /// The update channel closed.
    #[error("rate updates stopped")]
    UpdatesClosed,

    /// Shutdown was requested.
    #[error("session cancelled")]
    Cancelled,

    /// The session vanished from the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What makes a session push its pairs.
#[derive(Debug)]
pub enum UpdateTrigger {
    /// Every simulator tick, computed from the tick snapshot.
    Tick(broadcast::Receiver<RateTick>),
    /// A fixed per-session interval, computed from the live table.
    Poll(Duration),
}

enum Trigger {
    Tick(broadcast::Receiver<RateTick>),
    Poll(Interval),
}

enum Update {
    Tick(RateTick),
    Poll,
    Lagged(u64),
    Closed,
}

impl Trigger {
    fn new(trigger: UpdateTrigger) -> Self {
        match trigger {
            UpdateTrigger::Tick(rx) => Self::Tick(rx),
            UpdateTrigger::Poll(period) => {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Self::Poll(interval)
            }
        }
    }

    async fn next(&mut self) -> Update {
        match self {
            Self::Tick(rx) => match rx.recv().await {
                Ok(tick) => Update::Tick(tick),
                Err(broadcast::error::RecvError::Lagged(n)) => Update::Lagged(n),
                Err(broadcast::error::RecvError::Closed) => Update::Closed,
            },
            Self::Poll(interval) => {
                interval.tick().await;
                Update::Poll
            }
        }
    }
}

/// A single client's subscription stream.
pub struct StreamSession<S> {
    id: SessionId,
    inbound: S,
    outbound: Outbound,
    registry: Arc<SubscriptionRegistry>,
    query: RateQueryService,
    trigger: Trigger,
    subscriptions: Vec<(RateRequest, RatePair)>,
}

impl<S> StreamSession<S>
where
    S: Stream<Item = Result<RateRequest, Status>> + Unpin + Send,
{
    /// Create a session for an already opened registry entry.
    ///
    /// In tick mode the receiver should be subscribed before the session
    /// is spawned so no tick between open and first poll is missed.
    #[must_use]
    pub fn new(
        id: SessionId,
        inbound: S,
        outbound: Outbound,
        registry: Arc<SubscriptionRegistry>,
        query: RateQueryService,
        trigger: UpdateTrigger,
    ) -> Self {
        Self {
            id,
            inbound,
            outbound,
            registry,
            query,
            trigger: Trigger::new(trigger),
            subscriptions: Vec::new(),
        }
    }

    /// Session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Drive the session until the client closes, the transport fails or
    /// `cancel` fires. Always removes the session from the registry.
    ///
    /// # Errors
    ///
    /// Returns the [`SessionError`] that ended the session; a clean
    /// half-close from the client is `Ok`.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SessionError> {
        tracing::debug!(session_id = self.id, "Stream session started");

        let result = self.drive(&cancel).await;

        let released = self.registry.close_session(self.id);
        tracing::debug!(
            session_id = self.id,
            pairs = released.len(),
            "Stream session closed"
        );

        result
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Err(SessionError::Cancelled),

                message = self.inbound.next() => match message {
                    Some(Ok(request)) => self.handle_request(request, cancel).await?,
                    Some(Err(status)) => {
                        let _ = self.send(Err(status.clone()), cancel).await;
                        return Err(SessionError::Inbound(status));
                    }
                    None => return Ok(()),
                },

                update = self.trigger.next() => match update {
                    Update::Tick(tick) => {
                        let messages = self.compose(&tick.snapshot);
                        tracing::trace!(
                            session_id = self.id,
                            sequence = tick.sequence,
                            pushes = messages.len(),
                            "Pushing tick"
                        );
                        self.push_all(messages, cancel).await?;
                    }
                    Update::Poll => {
                        let messages = self.query.table().read(|snapshot| self.compose(snapshot));
                        self.push_all(messages, cancel).await?;
                    }
                    Update::Lagged(n) => {
                        tracing::warn!(session_id = self.id, lagged = n, "Tick receiver lagged");
                        metrics::record_push_failure(PushFailure::Lagged, n);
                    }
                    Update::Closed => return Err(SessionError::UpdatesClosed),
                },
            }
        }
    }

    async fn handle_request(
        &mut self,
        request: RateRequest,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        match convert::request_to_pair(&request) {
            Ok(pair) => match self.registry.add_pair(self.id, pair.clone())? {
                AddOutcome::Added => {
                    tracing::debug!(
                        session_id = self.id,
                        base = pair.base(),
                        destination = pair.destination(),
                        "Pair subscribed"
                    );
                    self.subscriptions.push((request, pair));
                }
                AddOutcome::Duplicate => {
                    tracing::debug!(
                        session_id = self.id,
                        base = pair.base(),
                        destination = pair.destination(),
                        "Duplicate subscription ignored"
                    );
                }
            },
            Err(invalid) => {
                tracing::debug!(session_id = self.id, error = %invalid, "Rate request rejected");
                let status = convert::invalid_request_status(&invalid);
                self.send(Ok(convert::streaming_error(request, &status)), cancel)
                    .await?;
            }
        }
        Ok(())
    }

    /// One message per subscription, all read from the same snapshot.
    fn compose(&self, snapshot: &RateSnapshot) -> Vec<StreamingRateResponse> {
        self.subscriptions
            .iter()
            .map(
                |(request, pair)| match RateQueryService::quote_at(snapshot, pair) {
                    Ok(quote) => convert::streaming_rate(convert::quote_to_response(*request, quote)),
                    Err(e) => {
                        tracing::warn!(
                            session_id = self.id,
                            pair = %pair,
                            error = %e,
                            "Failed to compute subscribed rate"
                        );
                        metrics::record_push_failure(PushFailure::Compute, 1);
                        convert::streaming_error(*request, &convert::rate_error_status(&e))
                    }
                },
            )
            .collect()
    }

    async fn push_all(
        &self,
        messages: Vec<StreamingRateResponse>,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        let mut sent = 0_u64;
        for message in messages {
            self.send(Ok(message), cancel).await?;
            sent += 1;
        }
        metrics::record_pushes_sent(sent);
        Ok(())
    }

    async fn send(
        &self,
        message: Result<StreamingRateResponse, Status>,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SessionError::Cancelled),
            result = self.outbound.send(message) => result.map_err(|_| {
                metrics::record_push_failure(PushFailure::Disconnected, 1);
                SessionError::Disconnected
            }),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
