//! Crash simulation: a node is unavailable until a deadline passes

use dynamo_core::{Error, Result};
use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// Node availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Serving requests
    Available,
    /// Refusing every gated operation
    Crashed { until: Instant },
}

/// Single "unavailable until" deadline guarding a node's operations
pub struct CrashGate {
    node_id: String,
    unavailable_until: RwLock<Option<Instant>>,
}

impl CrashGate {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            unavailable_until: RwLock::new(None),
        }
    }

    /// Current status
    pub fn status(&self) -> Availability {
        match *self.unavailable_until.read() {
            Some(until) if Instant::now() < until => Availability::Crashed { until },
            _ => Availability::Available,
        }
    }

    pub fn is_crashed(&self) -> bool {
        matches!(self.status(), Availability::Crashed { .. })
    }

    /// Fail with [`Error::Unavailable`] while crashed
    pub fn check(&self) -> Result<()> {
        if self.is_crashed() {
            return Err(Error::Unavailable(self.node_id.clone()));
        }
        Ok(())
    }

    /// Become unavailable for `duration`. A window already in effect cannot
    /// be extended, and a window ending past the clock's range is refused.
    pub fn crash(&self, duration: Duration) -> Result<Instant> {
        let mut deadline = self.unavailable_until.write();
        let now = Instant::now();
        if matches!(*deadline, Some(until) if now < until) {
            return Err(Error::AlreadyCrashed(self.node_id.clone()));
        }
        let until = now
            .checked_add(duration)
            .ok_or(Error::InvalidDuration(duration))?;
        *deadline = Some(until);
        Ok(until)
    }

    /// Time left in the current crash window
    pub fn remaining(&self) -> Option<Duration> {
        match self.status() {
            Availability::Crashed { until } => Some(until - Instant::now()),
            Availability::Available => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_crash_window() {
        let gate = CrashGate::new("0");
        assert!(gate.check().is_ok());

        gate.crash(Duration::from_secs(3)).unwrap();
        assert!(matches!(gate.check(), Err(Error::Unavailable(id)) if id == "0"));
        assert_eq!(gate.remaining(), Some(Duration::from_secs(3)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(gate.is_crashed());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(gate.status(), Availability::Available);
        assert!(gate.check().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_cannot_be_extended() {
        let gate = CrashGate::new("0");
        let until = gate.crash(Duration::from_secs(3)).unwrap();

        assert!(matches!(
            gate.crash(Duration::from_secs(10)),
            Err(Error::AlreadyCrashed(_))
        ));
        assert_eq!(gate.status(), Availability::Crashed { until });

        // Once the window passes a new crash is accepted
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(gate.crash(Duration::from_secs(1)).is_ok());
        assert!(gate.is_crashed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_duration_refused() {
        let gate = CrashGate::new("0");

        let result = gate.crash(Duration::from_secs(u64::MAX));
        assert!(matches!(result, Err(Error::InvalidDuration(_))));
        assert_eq!(gate.status(), Availability::Available);

        // The gate is still usable afterwards
        gate.crash(Duration::from_secs(1)).unwrap();
        assert!(gate.is_crashed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_crash() {
        let gate = CrashGate::new("0");
        gate.crash(Duration::ZERO).unwrap();
        assert!(!gate.is_crashed());
    }
}
