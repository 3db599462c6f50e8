//! Per-endpoint response-time history backing the failover hysteresis check.
//!
//! Maintains a strict fixed-size sliding window of the most recent probe
//! rounds per endpoint. Rounds where an endpoint was not probed, or answered
//! nothing, are recorded as no-response markers so that "consistently faster"
//! always means consecutive observed rounds.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::endpoint::EndpointId;

/// Number of consecutive strictly-faster rounds a challenger needs before it
/// may displace an online, same-tier current connection.
pub const MIN_BETTER_SAMPLES: usize = 3;

/// One recorded probe round for one endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ResponseSample {
    pub recorded_at: DateTime<Utc>,
    pub response_time: Option<Duration>,
}

/// Bounded response-time windows, one per endpoint ever probed.
///
/// Capacity is a hard bound (`MIN_BETTER_SAMPLES`); the window is trimmed on
/// every append and can never grow past it.
#[derive(Debug, Default)]
pub struct ResponseHistory {
    windows: Mutex<HashMap<EndpointId, VecDeque<ResponseSample>>>,
}

impl ResponseHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one round: endpoints in `probed` get their measured time (or
    /// a no-response marker if offline), every other endpoint this history
    /// has seen gets a no-response marker for the round.
    pub fn record_round(&self, probed: &[(EndpointId, Option<Duration>)]) {
        let mut windows = self.windows.lock();
        let now = Utc::now();

        for (id, _) in probed {
            windows.entry(id.clone()).or_default();
        }

        for (id, window) in windows.iter_mut() {
            let response_time = probed
                .iter()
                .find(|(probed_id, _)| probed_id == id)
                .and_then(|(_, rt)| *rt);

            window.push_back(ResponseSample { recorded_at: now, response_time });
            while window.len() > MIN_BETTER_SAMPLES {
                window.pop_front();
            }
        }
    }

    /// Drops the window for a removed endpoint.
    pub fn remove(&self, id: &EndpointId) {
        self.windows.lock().remove(id);
    }

    /// Returns the recorded samples for an endpoint, oldest first.
    #[must_use]
    pub fn samples(&self, id: &EndpointId) -> Vec<ResponseSample> {
        self.windows
            .lock()
            .get(id)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The hysteresis test: `challenger` displaces `incumbent` only when both
    /// have a full window and the challenger was strictly faster in each of
    /// the last `MIN_BETTER_SAMPLES` rounds. A round where the incumbent has
    /// no response counts in the challenger's favor if the challenger
    /// answered; missing challenger responses never count as faster.
    #[must_use]
    pub fn consistently_faster(&self, challenger: &EndpointId, incumbent: &EndpointId) -> bool {
        let windows = self.windows.lock();
        let (Some(challenger_window), Some(incumbent_window)) =
            (windows.get(challenger), windows.get(incumbent))
        else {
            return false;
        };

        if challenger_window.len() < MIN_BETTER_SAMPLES
            || incumbent_window.len() < MIN_BETTER_SAMPLES
        {
            return false;
        }

        challenger_window
            .iter()
            .rev()
            .take(MIN_BETTER_SAMPLES)
            .zip(incumbent_window.iter().rev().take(MIN_BETTER_SAMPLES))
            .all(|(c, i)| match (c.response_time, i.response_time) {
                (Some(challenger_time), Some(incumbent_time)) => challenger_time < incumbent_time,
                (Some(_), None) => true,
                _ => false,
            })
    }
}
