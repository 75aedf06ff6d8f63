//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Liveness monitor

use crate::{AccountSession, CommandDispatcher, ServiceError, SessionEvent};
use marionette_protocol::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Result of one liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Not probed: not connected or not in a probed status
    Skipped,
    /// `PONG` received
    Alive,
    /// Timed out or answered with something other than `PONG`
    Unresponsive,
    /// The transport failed during the probe
    Lost,
}

/// Periodically pings logged-in accounts
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    dispatcher: CommandDispatcher,
    interval: Duration,
    timeout: Duration,
}

impl LivenessMonitor {
    /// Create a monitor probing every `interval`, waiting `timeout` for `PONG`
    pub fn new(dispatcher: CommandDispatcher, interval: Duration, timeout: Duration) -> Self {
        Self {
            dispatcher,
            interval,
            timeout,
        }
    }

    /// Probe one session and apply the result to its status
    pub async fn probe(&self, session: &AccountSession) -> ProbeOutcome {
        let account = session.account();
        if !session.status().is_probe_eligible()
            || !self.dispatcher.registry().is_connected(account)
        {
            return ProbeOutcome::Skipped;
        }

        trace!(account = %account, "Probing");
        let (event, outcome) = match self
            .dispatcher
            .send_and_await(account, &Command::Ping, self.timeout)
            .await
        {
            Ok(Command::Pong) => (SessionEvent::PingSucceeded, ProbeOutcome::Alive),
            Ok(other) => {
                warn!(account = %account, reply = %other, "Unexpected probe reply");
                (SessionEvent::PingFailed, ProbeOutcome::Unresponsive)
            }
            Err(ServiceError::NotConnected(_)) => return ProbeOutcome::Skipped,
            Err(ServiceError::Disconnected(_)) => {
                debug!(account = %account, "Transport lost during probe");
                (SessionEvent::TransportLost, ProbeOutcome::Lost)
            }
            Err(err) => {
                debug!(account = %account, error = %err, "Probe failed");
                (SessionEvent::PingFailed, ProbeOutcome::Unresponsive)
            }
        };

        if session.is_stopping() {
            return outcome;
        }
        session.apply(event).await;
        outcome
    }

    /// Probe a session until it is cancelled
    pub fn spawn(&self, session: Arc<AccountSession>) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = session.cancellation().cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = session.cancellation().cancelled() => break,
                    _ = monitor.probe(&session) => {}
                }
            }
            trace!(account = %session.account(), "Liveness loop ended");
        })
    }
}
