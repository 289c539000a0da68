use std::time::Duration;

use tokio::time::Instant;

/// Connection indicator. Shown while disconnected and for a grace period
/// after reconnecting, then hidden.
#[derive(Clone, Copy, Debug)]
pub struct ConnectivityBanner {
    grace: Duration,
    connected: bool,
    connected_at: Option<Instant>,
}

impl ConnectivityBanner {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            connected: false,
            connected_at: None,
        }
    }

    /// Returns whether connectivity changed.
    pub fn set_connected(&mut self, connected: bool, now: Instant) -> bool {
        if connected == self.connected {
            return false;
        }
        self.connected = connected;
        self.connected_at = connected.then_some(now);
        true
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        match self.connected_at {
            Some(at) if self.connected => now.saturating_duration_since(at) < self.grace,
            _ => true,
        }
    }

    /// When a visible "connected" banner should hide, if it is showing one.
    pub fn hides_at(&self) -> Option<Instant> {
        self.connected_at.filter(|_| self.connected).map(|at| at + self.grace)
    }

    pub fn message(&self) -> &'static str {
        if self.connected {
            "Connected"
        } else {
            "Disconnected, reconnecting..."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_until_first_connect() {
        let banner = ConnectivityBanner::new(Duration::from_secs(3));
        assert!(banner.is_visible(Instant::now()));
        assert_eq!(banner.message(), "Disconnected, reconnecting...");
    }

    #[test]
    fn hides_after_grace() {
        let mut banner = ConnectivityBanner::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(banner.set_connected(true, t0));
        assert!(banner.is_visible(t0 + Duration::from_secs(2)));
        assert!(!banner.is_visible(t0 + Duration::from_secs(3)));
        assert_eq!(banner.hides_at(), Some(t0 + Duration::from_secs(3)));
    }

    #[test]
    fn reappears_on_disconnect() {
        let mut banner = ConnectivityBanner::new(Duration::from_secs(3));
        let t0 = Instant::now();
        banner.set_connected(true, t0);
        assert!(banner.set_connected(false, t0 + Duration::from_secs(10)));
        assert!(banner.is_visible(t0 + Duration::from_secs(10)));
        assert!(banner.hides_at().is_none());
    }

    #[test]
    fn repeated_state_is_not_a_change() {
        let mut banner = ConnectivityBanner::new(Duration::from_secs(3));
        let t0 = Instant::now();
        banner.set_connected(true, t0);
        assert!(!banner.set_connected(true, t0 + Duration::from_secs(5)));
        assert!(!banner.is_visible(t0 + Duration::from_secs(5)));
    }
}
