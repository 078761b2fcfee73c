//! Listener surface and notification dispatch
//!
//! Applications observe a call through two independent registrations:
//!
//! - a [`CallListener`], the per-call API (ringing, established, held,
//!   ended, errors...), replaced on every `set_listener`
//! - a [`CallStatusObserver`], coarse lifecycle telemetry for components
//!   that only care whether a call is up
//!
//! The [`EventDispatcher`] delivers to both. A listener that panics is
//! logged and skipped; the state machine carries on.

use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

use crate::errors::SignalingErrorCode;
use crate::session::CallSession;
use crate::transport::PeerProfile;

/// Callbacks for one call
///
/// Every lifecycle callback defaults to [`on_changed`](Self::on_changed), so
/// a listener that only wants "something happened" implements that alone.
#[allow(unused_variables)]
pub trait CallListener: Send + Sync {
    /// Nothing is in progress; a call can be made
    fn on_ready_to_call(&self, call: &CallSession) {
        self.on_changed(call);
    }

    fn on_calling(&self, call: &CallSession) {
        self.on_changed(call);
    }

    /// An inbound call is waiting to be answered
    fn on_ringing(&self, call: &CallSession, caller: &PeerProfile) {
        self.on_changed(call);
    }

    fn on_ringing_back(&self, call: &CallSession) {
        self.on_changed(call);
    }

    fn on_call_established(&self, call: &CallSession) {
        self.on_changed(call);
    }

    fn on_call_busy(&self, call: &CallSession) {
        self.on_changed(call);
    }

    fn on_call_held(&self, call: &CallSession) {
        self.on_changed(call);
    }

    /// Established, with outbound video suppressed
    fn on_call_invisible(&self, call: &CallSession) {
        self.on_changed(call);
    }

    fn on_call_ended(&self, call: &CallSession) {
        self.on_changed(call);
    }

    fn on_error(&self, call: &CallSession, code: SignalingErrorCode, message: &str) {}

    /// Catch-all for the lifecycle callbacks above
    fn on_changed(&self, call: &CallSession) {}
}

/// A listener-bound outcome of the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallNotification {
    ReadyToCall,
    Calling,
    Ringing(PeerProfile),
    RingingBack,
    Established,
    Busy,
    Held,
    Invisible,
    Ended,
    Error {
        code: SignalingErrorCode,
        message: String,
    },
}

impl CallNotification {
    pub fn name(&self) -> &'static str {
        match self {
            CallNotification::ReadyToCall => "ready-to-call",
            CallNotification::Calling => "calling",
            CallNotification::Ringing(_) => "ringing",
            CallNotification::RingingBack => "ringing-back",
            CallNotification::Established => "established",
            CallNotification::Busy => "busy",
            CallNotification::Held => "held",
            CallNotification::Invisible => "invisible",
            CallNotification::Ended => "ended",
            CallNotification::Error { .. } => "error",
        }
    }
}

/// Lifecycle telemetry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStatus {
    RingingBack,
    Established,
    Busy,
    Ended,
    Error {
        code: SignalingErrorCode,
        message: String,
    },
}

/// Receives [`CallStatus`] changes
pub trait CallStatusObserver: Send + Sync {
    fn on_status_change(&self, status: &CallStatus);
}

/// Delivers notifications to the registered listener and status observer
#[derive(Default)]
pub struct EventDispatcher {
    listener: RwLock<Option<Arc<dyn CallListener>>>,
    observer: RwLock<Option<Arc<dyn CallStatusObserver>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listener, returning the previous one
    pub fn set_listener(&self, listener: Option<Arc<dyn CallListener>>) -> Option<Arc<dyn CallListener>> {
        std::mem::replace(&mut *self.listener.write(), listener)
    }

    pub fn listener(&self) -> Option<Arc<dyn CallListener>> {
        self.listener.read().clone()
    }

    /// Replace the status observer, returning the previous one
    pub fn set_status_observer(
        &self,
        observer: Option<Arc<dyn CallStatusObserver>>,
    ) -> Option<Arc<dyn CallStatusObserver>> {
        let previous = std::mem::replace(&mut *self.observer.write(), observer);
        if previous.is_some() {
            debug!("Replacing call status observer");
        }
        previous
    }

    /// Deliver to the current listener, if any
    pub fn notify(&self, call: &CallSession, notification: &CallNotification) {
        // Clone out of the lock so the listener may re-register itself.
        let Some(listener) = self.listener() else {
            debug!("No listener for {} notification", notification.name());
            return;
        };
        Self::deliver(listener.as_ref(), call, notification);
    }

    /// Deliver to a specific listener with panic isolation
    pub fn deliver(listener: &dyn CallListener, call: &CallSession, notification: &CallNotification) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| match notification {
            CallNotification::ReadyToCall => listener.on_ready_to_call(call),
            CallNotification::Calling => listener.on_calling(call),
            CallNotification::Ringing(peer) => listener.on_ringing(call, peer),
            CallNotification::RingingBack => listener.on_ringing_back(call),
            CallNotification::Established => listener.on_call_established(call),
            CallNotification::Busy => listener.on_call_busy(call),
            CallNotification::Held => listener.on_call_held(call),
            CallNotification::Invisible => listener.on_call_invisible(call),
            CallNotification::Ended => listener.on_call_ended(call),
            CallNotification::Error { code, message } => listener.on_error(call, *code, message),
        }));

        if let Err(payload) = result {
            error!(
                "Call listener failed in {} callback: {}",
                notification.name(),
                panic_message(payload.as_ref())
            );
        }
    }

    /// Publish lifecycle telemetry to the status observer, if any
    pub fn publish_status(&self, status: &CallStatus) {
        let Some(observer) = self.observer.read().clone() else {
            return;
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| observer.on_status_change(status)));
        if let Err(payload) = result {
            error!("Call status observer failed: {}", panic_message(payload.as_ref()));
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("has_listener", &self.listener.read().is_some())
            .field("has_observer", &self.observer.read().is_some())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
