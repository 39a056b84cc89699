//! Regime signal relay
//!
//! In-process publish/subscribe for regime readings. The producer side owns a
//! bounded channel and a cell holding the latest signal per pair; publishing
//! never blocks the caller, only sends when a pair's regime changes, and a
//! heartbeat task republishes the latest signals so late subscribers catch up.
//!
//! # Example
//!
//! ```no_run
//! use regime_strategies::relay;
//! use regime_strategies::{RegimeReading, Symbol};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (broadcaster, mut listener) = relay::channel(16);
//!     let pair = Symbol::new("BTCUSDT");
//!
//!     broadcaster.publish_reading(&pair, chrono::Utc::now(), RegimeReading::Pending);
//!     listener.poll();
//!     assert_eq!(listener.current(&pair), RegimeReading::Pending);
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::{Regime, RegimeConfidence, RegimeReading, Symbol};

pub const SIGNAL_TYPE: &str = "REGIME_SIGNAL";

/// Wire message for one regime reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSignal {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub pair: Symbol,
    /// BEAR, NEUTRAL, BULL, TRAINING or UNAVAILABLE
    pub regime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<RegimeConfidence>,
}

impl RegimeSignal {
    pub fn from_reading(pair: Symbol, timestamp: DateTime<Utc>, reading: RegimeReading) -> Self {
        let confidence = match reading {
            RegimeReading::Available { confidence, .. } => Some(confidence),
            _ => None,
        };
        Self {
            kind: SIGNAL_TYPE.to_string(),
            timestamp,
            pair,
            regime: reading.label().to_string(),
            confidence,
        }
    }

    /// Reading carried by the message; unknown labels read as Unavailable
    pub fn reading(&self) -> RegimeReading {
        match self.regime.as_str() {
            "TRAINING" => RegimeReading::Pending,
            "UNAVAILABLE" => RegimeReading::Unavailable,
            label => match label.parse::<Regime>() {
                Ok(regime) => RegimeReading::available(
                    regime,
                    self.confidence
                        .unwrap_or_else(|| RegimeConfidence::certain(regime)),
                ),
                Err(_) => {
                    warn!("Unknown regime label '{}' from {}", label, self.pair);
                    RegimeReading::Unavailable
                }
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Same pair and same regime label
    fn same_state(&self, other: &RegimeSignal) -> bool {
        self.pair == other.pair && self.regime == other.regime
    }
}

/// What happened to a published signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    /// Regime unchanged for the pair; nothing sent
    Unchanged,
    /// Channel full; stored as latest and left to the heartbeat
    Dropped,
    /// No listener left
    Closed,
}

type LatestSignals = Arc<RwLock<HashMap<Symbol, RegimeSignal>>>;

/// Create a connected broadcaster/listener pair with a bounded buffer
pub fn channel(capacity: usize) -> (RegimeBroadcaster, RegimeListener) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        RegimeBroadcaster {
            sender,
            latest: Arc::new(RwLock::new(HashMap::new())),
        },
        RegimeListener {
            receiver,
            current: HashMap::new(),
        },
    )
}

/// Producer side; cheap to clone
#[derive(Debug, Clone)]
pub struct RegimeBroadcaster {
    sender: mpsc::Sender<RegimeSignal>,
    latest: LatestSignals,
}

impl RegimeBroadcaster {
    /// Publish without blocking. Only a change of regime for the pair is sent.
    pub fn publish(&self, signal: RegimeSignal) -> PublishOutcome {
        {
            let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
            if latest
                .get(&signal.pair)
                .is_some_and(|prev| prev.same_state(&signal))
            {
                return PublishOutcome::Unchanged;
            }
            latest.insert(signal.pair.clone(), signal.clone());
        }

        let (pair, regime) = (signal.pair.clone(), signal.regime.clone());
        match self.sender.try_send(signal) {
            Ok(()) => {
                debug!("Published {} regime {}", pair, regime);
                PublishOutcome::Sent
            }
            Err(TrySendError::Full(_)) => {
                warn!("Regime relay full, dropped {} {} (heartbeat will resend)", pair, regime);
                PublishOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Regime relay closed, {} {} not delivered", pair, regime);
                PublishOutcome::Closed
            }
        }
    }

    pub fn publish_reading(
        &self,
        pair: &Symbol,
        timestamp: DateTime<Utc>,
        reading: RegimeReading,
    ) -> PublishOutcome {
        self.publish(RegimeSignal::from_reading(pair.clone(), timestamp, reading))
    }

    /// Last signal published for `pair`, sent or not
    pub fn latest(&self, pair: &Symbol) -> Option<RegimeSignal> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(pair)
            .cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Republish every latest signal each `period` until the listener is gone
    pub async fn run_heartbeat(self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;

            let snapshot: Vec<RegimeSignal> = {
                let latest = self.latest.read().unwrap_or_else(|e| e.into_inner());
                let mut signals: Vec<RegimeSignal> = latest.values().cloned().collect();
                signals.sort_by(|a, b| a.pair.cmp(&b.pair));
                signals
            };

            if self.sender.is_closed() {
                debug!("Regime listener gone, heartbeat stopping");
                return;
            }

            for signal in snapshot {
                if self.sender.send(signal).await.is_err() {
                    debug!("Regime listener gone, heartbeat stopping");
                    return;
                }
            }
        }
    }
}

/// Consumer side
#[derive(Debug)]
pub struct RegimeListener {
    receiver: mpsc::Receiver<RegimeSignal>,
    current: HashMap<Symbol, RegimeReading>,
}

impl RegimeListener {
    fn apply(&mut self, signal: &RegimeSignal) {
        self.current.insert(signal.pair.clone(), signal.reading());
    }

    /// Drain queued messages without waiting; returns how many were applied
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(signal) = self.receiver.try_recv() {
            self.apply(&signal);
            applied += 1;
        }
        applied
    }

    /// Wait for the next message. None once every broadcaster is dropped.
    pub async fn recv(&mut self) -> Option<RegimeSignal> {
        let signal = self.receiver.recv().await?;
        self.apply(&signal);
        Some(signal)
    }

    /// Latest known reading for `pair`; Unavailable until a message arrives
    pub fn current(&self, pair: &Symbol) -> RegimeReading {
        self.current.get(pair).copied().unwrap_or_default()
    }
}

/// Publish one reading per pair, applying each to `listener` right after it
/// is sent so the bounded channel never overflows however many pairs there
/// are. Returns how many signals were applied.
pub fn relay_readings<'a>(
    broadcaster: &RegimeBroadcaster,
    listener: &mut RegimeListener,
    timestamp: DateTime<Utc>,
    readings: impl IntoIterator<Item = (&'a Symbol, RegimeReading)>,
) -> usize {
    let mut applied = 0;
    for (pair, reading) in readings {
        if broadcaster.publish_reading(pair, timestamp, reading) == PublishOutcome::Dropped {
            warn!("Relay dropped the {} reading", pair);
        }
        applied += listener.poll();
    }
    applied
}

/// Keep the heartbeat running for `hold`, handing every signal the listener
/// receives to `on_signal`. Returns how many signals arrived.
pub async fn serve_latest(
    broadcaster: RegimeBroadcaster,
    listener: &mut RegimeListener,
    period: Duration,
    hold: Duration,
    mut on_signal: impl FnMut(&RegimeSignal),
) -> usize {
    let heartbeat = tokio::spawn(broadcaster.run_heartbeat(period));
    let deadline = tokio::time::Instant::now() + hold;
    let mut received = 0;

    while let Ok(Some(signal)) = tokio::time::timeout_at(deadline, listener.recv()).await {
        on_signal(&signal);
        received += 1;
    }

    heartbeat.abort();
    debug!("Relay hold finished, {} signals received", received);
    received
}
