//! Status notices for the layer above the client.
//!
//! The client never decides how a link change reaches the user. It emits a
//! [`Notice`] into whatever [`Notifier`] the application installed.

use tokio::sync::mpsc;

use crate::protocol::Rat;
use crate::registration::{FlowId, QosState, RegistrationId};

/// Why a registration went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossReason {
    /// Caller released it.
    Released,
    /// The bound peer handle died.
    PeerDied,
    /// The daemon connection was reset.
    TransportReset,
}

/// A user-visible status change.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// The daemon picked a link for the registration.
    LinkAvailable {
        registration: RegistrationId,
        rat: Rat,
    },
    /// A more preferred link can be switched to.
    BetterLinkAvailable {
        registration: RegistrationId,
        rat: Rat,
    },
    /// The active link is gone.
    LinkLost {
        registration: RegistrationId,
        rat: Rat,
    },
    /// Registration could not be completed; it has been removed.
    RegistrationFailed {
        registration: RegistrationId,
        reason: String,
    },
    /// An established registration was removed.
    RegistrationLost {
        registration: RegistrationId,
        reason: LossReason,
    },
    /// The daemon asks the platform to bring a RAT up or down.
    RatCommand { rat: Rat, up: bool },
    /// A tracked QoS flow changed state.
    QosStatus {
        registration: RegistrationId,
        flow: FlowId,
        state: QosState,
    },
}

impl Notice {
    /// Registration the notice is about, if any.
    pub fn registration(&self) -> Option<RegistrationId> {
        match self {
            Self::LinkAvailable { registration, .. }
            | Self::BetterLinkAvailable { registration, .. }
            | Self::LinkLost { registration, .. }
            | Self::RegistrationFailed { registration, .. }
            | Self::RegistrationLost { registration, .. }
            | Self::QosStatus { registration, .. } => Some(*registration),
            Self::RatCommand { .. } => None,
        }
    }
}

/// Sink for notices. Called without any client lock held; must not block.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notice: Notice);
}

impl<F> Notifier for F
where
    F: Fn(Notice) + Send + Sync + 'static,
{
    fn notify(&self, notice: Notice) {
        self(notice)
    }
}

/// Default notifier: logs every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        tracing::info!("Notice: {:?}", notice);
    }
}

/// Forwards notices into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver its notices arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            tracing::trace!("Notice receiver dropped");
        }
    }
}
