//! Data-source status subscription state.

use crate::types::XtraStatusTrigger;

/// Tracks whether the client is subscribed, and whether the daemon's
/// immediate push for the latest subscribe is still owed to the listener.
#[derive(Debug, Default)]
pub(crate) struct XtraSubscription {
    subscribed: bool,
    resync_pending: bool,
}

impl XtraSubscription {
    /// A subscribe or unsubscribe request was sent.
    pub(crate) fn sent(&mut self, subscribe: bool) {
        self.subscribed = subscribe;
        self.resync_pending = subscribe;
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub(crate) fn resync_pending(&self) -> bool {
        self.resync_pending
    }

    /// Whether a push with `trigger` goes to the listener. Registration
    /// pushes are forwarded once per subscribe; replays after a daemon
    /// restart produce duplicates that are dropped.
    pub(crate) fn admit(&mut self, trigger: XtraStatusTrigger) -> bool {
        match trigger {
            XtraStatusTrigger::UponRegistration => {
                if self.subscribed && self.resync_pending {
                    self.resync_pending = false;
                    true
                } else {
                    false
                }
            }
            XtraStatusTrigger::UponQuery | XtraStatusTrigger::UponStatusChange => true,
        }
    }
}
