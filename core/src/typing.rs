/// Typing presence: local debounce of keystrokes plus the set of remote
/// users currently typing in the open conversation
use crate::model::TypingEvent;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub struct TypingTracker {
    current_user_id: i64,
    debounce: Duration,
    /// Bounded expiry for remote indicators; None keeps them until a stop event
    ttl: Option<Duration>,
    local_typing: bool,
    deadline: Option<Instant>,
    remote: HashMap<String, Instant>,
}

impl TypingTracker {
    pub fn new(current_user_id: i64, debounce: Duration, ttl: Option<Duration>) -> Self {
        Self {
            current_user_id,
            debounce,
            ttl,
            local_typing: false,
            deadline: None,
            remote: HashMap::new(),
        }
    }

    /// Register a keystroke. Returns true when "typing" must be published.
    pub fn on_keystroke(&mut self, now: Instant) -> bool {
        self.deadline = Some(now + self.debounce);
        if self.local_typing {
            return false;
        }
        self.local_typing = true;
        true
    }

    /// Returns true exactly once when the debounce window has elapsed, i.e.
    /// when "not typing" must be published.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.local_typing = false;
                true
            }
            _ => false,
        }
    }

    /// Stop immediately (message sent, conversation switched). Returns true
    /// when a "not typing" publish is owed.
    pub fn stop(&mut self) -> bool {
        self.deadline = None;
        std::mem::replace(&mut self.local_typing, false)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_typing(&self) -> bool {
        self.local_typing
    }

    /// Apply a remote presence event. Own events are ignored. Returns true
    /// when the visible set changed.
    pub fn apply_remote(&mut self, event: &TypingEvent, now: Instant) -> bool {
        if event.user_id == self.current_user_id {
            return false;
        }
        if event.is_typing {
            self.remote.insert(event.user_name.clone(), now).is_none()
        } else {
            self.remote.remove(&event.user_name).is_some()
        }
    }

    /// Drop remote indicators older than the TTL. No-op without a TTL.
    pub fn expire(&mut self, now: Instant) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let before = self.remote.len();
        self.remote
            .retain(|_, seen| now.saturating_duration_since(*seen) < ttl);
        before - self.remote.len()
    }

    /// Display names currently typing, sorted
    pub fn typing_users(&self) -> Vec<String> {
        let mut names: Vec<String> = self.remote.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear_remote(&mut self) {
        self.remote.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(user_id: i64, name: &str, is_typing: bool) -> TypingEvent {
        TypingEvent {
            conversation_id: 1,
            user_id,
            user_name: name.to_string(),
            is_typing,
        }
    }

    #[test]
    fn test_debounce_publishes_once_each_way() {
        let mut tracker = TypingTracker::new(1, Duration::from_millis(1000), None);
        let t0 = Instant::now();

        assert!(tracker.on_keystroke(t0));
        assert!(!tracker.on_keystroke(t0 + Duration::from_millis(300)));
        assert!(!tracker.on_keystroke(t0 + Duration::from_millis(600)));

        // window restarts at the last keystroke
        assert!(!tracker.poll(t0 + Duration::from_millis(1500)));
        assert!(tracker.poll(t0 + Duration::from_millis(1600)));
        assert!(!tracker.poll(t0 + Duration::from_millis(5000)));
        assert!(!tracker.is_typing());
    }

    #[test]
    fn test_stop_cancels_pending_deadline() {
        let mut tracker = TypingTracker::new(1, Duration::from_millis(1000), None);
        let t0 = Instant::now();
        tracker.on_keystroke(t0);
        assert!(tracker.stop());
        assert!(!tracker.stop());
        assert_eq!(tracker.next_deadline(), None);
        assert!(!tracker.poll(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn test_remote_set_tracks_start_and_stop() {
        let mut tracker = TypingTracker::new(1, Duration::from_millis(1000), None);
        let now = Instant::now();

        assert!(tracker.apply_remote(&event(2, "Grace", true), now));
        assert!(!tracker.apply_remote(&event(2, "Grace", true), now));
        assert!(tracker.apply_remote(&event(3, "Linus", true), now));
        assert!(!tracker.apply_remote(&event(1, "Ada", true), now));
        assert_eq!(tracker.typing_users(), vec!["Grace", "Linus"]);

        assert!(tracker.apply_remote(&event(2, "Grace", false), now));
        assert_eq!(tracker.typing_users(), vec!["Linus"]);
    }

    #[test]
    fn test_without_ttl_indicators_never_expire() {
        let mut tracker = TypingTracker::new(1, Duration::from_millis(1000), None);
        let now = Instant::now();
        tracker.apply_remote(&event(2, "Grace", true), now);
        assert_eq!(tracker.expire(now + Duration::from_secs(3600)), 0);
        assert_eq!(tracker.typing_users(), vec!["Grace"]);
    }

    #[test]
    fn test_ttl_prunes_stale_indicators() {
        let mut tracker =
            TypingTracker::new(1, Duration::from_millis(1000), Some(Duration::from_secs(5)));
        let now = Instant::now();
        tracker.apply_remote(&event(2, "Grace", true), now);
        tracker.apply_remote(&event(3, "Linus", true), now + Duration::from_secs(4));

        assert_eq!(tracker.expire(now + Duration::from_secs(6)), 1);
        assert_eq!(tracker.typing_users(), vec!["Linus"]);
    }
}
