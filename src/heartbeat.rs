//! Heartbeat keepalive and liveness monitoring.
//!
//! Detects a silently dead transport when the server stops talking. Pure
//! deadline bookkeeping over `Instant`s — the session driver owns the actual
//! timer sleep and the frame send, which keeps this testable without I/O.
//!
//! Two-phase scheme: a recurring tick every `interval` arms a delayed
//! heartbeat send (at most one outstanding); each send arms a timeout check
//! at `now + timeout`. The check compares the liveness deadline — refreshed
//! by every inbound packet — against the clock, and either reschedules itself
//! for the remaining gap (tolerating scheduler jitter up to a small slack)
//! or declares a timeout. Missed ticks therefore never tear the connection
//! down on their own; only a genuinely lapsed deadline does.

use std::time::Duration;

use tokio::time::Instant;

/// Jitter tolerance for the timeout check.
const GAP_SLACK: Duration = Duration::from_millis(100);

/// What the driver must do after a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    /// Write a heartbeat packet to the transport.
    Send,
    /// Liveness deadline lapsed: emit the timeout event and disconnect.
    TimedOut,
}

/// Per-connection heartbeat state. Built after each successful handshake,
/// dropped on disconnect.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    /// Next expected liveness signal; reset by every inbound packet.
    deadline: Instant,
    /// Recurring arm-a-send tick.
    tick_at: Instant,
    /// Outstanding delayed heartbeat send, if any.
    send_at: Option<Instant>,
    /// Outstanding timeout check, if any.
    check_at: Option<Instant>,
}

impl Heartbeat {
    /// Build from the negotiated interval. `None` when the server disabled
    /// heartbeats (interval 0).
    pub fn new(interval: Duration, now: Instant) -> Option<Self> {
        if interval.is_zero() {
            return None;
        }
        let timeout = interval * 2;
        Some(Self {
            interval,
            timeout,
            deadline: now + timeout,
            tick_at: now + interval,
            send_at: None,
            check_at: None,
        })
    }

    /// Negotiated send interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Liveness timeout threshold (2x interval).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// An inbound packet arrived: push the liveness deadline out.
    pub fn on_inbound(&mut self, now: Instant) {
        self.deadline = now + self.timeout;
    }

    /// Earliest pending timer, for the driver's `sleep_until`.
    pub fn next_wakeup(&self) -> Instant {
        let mut wakeup = self.tick_at;
        if let Some(at) = self.send_at {
            wakeup = wakeup.min(at);
        }
        if let Some(at) = self.check_at {
            wakeup = wakeup.min(at);
        }
        wakeup
    }

    /// Advance the state machine to `now`. Call repeatedly until it returns
    /// `None`; each `Beat::Send` must be followed by an actual frame write.
    pub fn poll(&mut self, now: Instant) -> Option<Beat> {
        if let Some(at) = self.check_at {
            if now >= at {
                let gap = self.deadline.saturating_duration_since(now);
                if gap > GAP_SLACK {
                    // Spurious wakeup: liveness arrived in the meantime.
                    self.check_at = Some(now + gap);
                } else {
                    return Some(Beat::TimedOut);
                }
            }
        }

        if let Some(at) = self.send_at {
            if now >= at {
                self.send_at = None;
                if self.check_at.is_none() {
                    self.check_at = Some(now + self.timeout);
                }
                return Some(Beat::Send);
            }
        }

        if now >= self.tick_at {
            self.tick_at = now + self.interval;
            if self.send_at.is_none() {
                self.send_at = Some(now + self.interval);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(hb: &mut Heartbeat, now: Instant) -> Vec<Beat> {
        let mut beats = Vec::new();
        while let Some(beat) = hb.poll(now) {
            beats.push(beat);
            if beat == Beat::TimedOut {
                break;
            }
        }
        beats
    }

    #[tokio::test]
    async fn test_zero_interval_disables_monitor() {
        assert!(Heartbeat::new(Duration::ZERO, Instant::now()).is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_twice_interval() {
        let hb = Heartbeat::new(Duration::from_secs(5), Instant::now()).unwrap();
        assert_eq!(hb.interval(), Duration::from_secs(5));
        assert_eq!(hb.timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let start = Instant::now();
        let interval = Duration::from_secs(1);
        let mut hb = Heartbeat::new(interval, start).unwrap();

        // Tick arms a send, the send fires, the check lapses.
        assert!(drain(&mut hb, start + interval).is_empty());
        assert_eq!(drain(&mut hb, start + interval * 2), vec![Beat::Send]);
        assert_eq!(drain(&mut hb, start + interval * 4), vec![Beat::TimedOut]);
    }

    #[tokio::test]
    async fn test_inbound_traffic_defers_timeout() {
        let start = Instant::now();
        let interval = Duration::from_secs(1);
        let mut hb = Heartbeat::new(interval, start).unwrap();

        drain(&mut hb, start + interval);
        assert_eq!(drain(&mut hb, start + interval * 2), vec![Beat::Send]);

        // Liveness just before the check fires: check reschedules instead of
        // timing out.
        hb.on_inbound(start + Duration::from_millis(3500));
        let beats = drain(&mut hb, start + interval * 4);
        assert!(!beats.contains(&Beat::TimedOut));

        // Silence past the refreshed deadline: now it lapses.
        assert_eq!(
            drain(&mut hb, start + Duration::from_millis(5600)),
            vec![Beat::TimedOut]
        );
    }

    #[tokio::test]
    async fn test_one_send_outstanding_at_a_time() {
        let start = Instant::now();
        let interval = Duration::from_secs(1);
        let mut hb = Heartbeat::new(interval, start).unwrap();

        // Several intervals elapse before the driver gets to poll again; only
        // one send comes out.
        drain(&mut hb, start + interval);
        let beats = drain(&mut hb, start + interval * 3);
        assert_eq!(beats, vec![Beat::Send]);
    }

    #[tokio::test]
    async fn test_sends_recur_while_connection_lives() {
        let start = Instant::now();
        let interval = Duration::from_secs(1);
        let mut hb = Heartbeat::new(interval, start).unwrap();

        let mut sends = 0;
        for step in 1..=6 {
            let now = start + interval * step;
            hb.on_inbound(now); // server keeps talking
            for beat in drain(&mut hb, now) {
                assert_eq!(beat, Beat::Send);
                sends += 1;
            }
        }
        assert!(sends >= 2, "expected a recurring cadence, got {}", sends);
    }

    #[tokio::test]
    async fn test_next_wakeup_tracks_earliest_timer() {
        let start = Instant::now();
        let interval = Duration::from_secs(2);
        let mut hb = Heartbeat::new(interval, start).unwrap();
        assert_eq!(hb.next_wakeup(), start + interval);

        drain(&mut hb, start + interval);
        // A send is now pending at tick + interval.
        assert_eq!(hb.next_wakeup(), start + interval * 2);
    }
}
