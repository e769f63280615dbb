//! Advisory notifications for the UI layer.
//!
//! Nothing here can fail an operation: notices are fire-and-forget, and a
//! caller that never reads them loses nothing but the advice.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::entities::PressureStatus;

/// Something the user should be told about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A reading reached the shared collection
    ReadingShared {
        id: String,
        status: PressureStatus,
        message: &'static str,
    },
    /// A reading stayed local after every share attempt failed
    SavedLocallyOnly { id: String, attempts: u32 },
    /// The local history could not be written; memory still holds it
    LocalSaveFailed { reason: String },
    /// The shared collection could not be loaded
    SharedLoadFailed { reason: String },
    /// A reading was removed from the local history
    ReadingDeleted { id: String },
    /// The live feed ended without being unsubscribed
    FeedClosed,
}

impl Notice {
    /// Short text for a toast
    pub fn headline(&self) -> String {
        match self {
            Notice::ReadingShared { status, .. } => format!("Reading saved: {}", status),
            Notice::SavedLocallyOnly { .. } => {
                "Failed to share reading online. Your data is saved locally.".to_string()
            }
            Notice::LocalSaveFailed { .. } => "Could not save to this device. The reading is kept for this session.".to_string(),
            Notice::SharedLoadFailed { .. } => "Could not load shared readings.".to_string(),
            Notice::ReadingDeleted { .. } => "Reading deleted".to_string(),
            Notice::FeedClosed => "Live updates stopped. Refresh to see new readings.".to_string(),
        }
    }

    /// Whether the notice reports a problem
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Notice::SavedLocallyOnly { .. }
                | Notice::LocalSaveFailed { .. }
                | Notice::SharedLoadFailed { .. }
                | Notice::FeedClosed
        )
    }
}

/// Receiving end handed to the UI
pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

/// Sending end shared by the services
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl Notifier {
    /// A notifier plus the receiver its notices arrive on
    pub fn channel() -> (Self, NoticeReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier that only logs
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Log and deliver a notice
    pub fn notify(&self, notice: Notice) {
        if notice.is_warning() {
            warn!("{}: {:?}", notice.headline(), notice);
        } else {
            info!("{}", notice.headline());
        }

        if let Some(tx) = &self.tx {
            if tx.send(notice).is_err() {
                debug!("Notice receiver dropped");
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::disabled()
    }
}
