//! Call state machine
//!
//! A [`CallSession`] is the aggregate root of one call. It owns the call's
//! flags and negotiated descriptions, the active signaling transport (plus
//! a second one while a transfer is in flight) and the local audio stream.
//!
//! All state sits behind one `parking_lot::Mutex`. User actions and
//! [`SignalingEvent`]s both take that lock, mutate state, issue
//! fire-and-forget requests to the transport, and collect listener
//! notifications. Notifications are delivered only after the lock is
//! released, so a listener may call straight back into the session.
//!
//! ```text
//!                 make_call            ringing-back
//!  ReadyToCall ───────────────▶ OutgoingCall ─────────▶ OutgoingRingBack
//!      │  ▲                          │                          │
//!      │  │ close              established                established
//!      │  │                          ▼                          │
//!      │  └──────── Ended ◀──────  InCall  ◀────────────────────┘
//!      │ attach_call      end_call    ▲
//!      ▼                              │ established (after answer_call)
//!  IncomingCall ──────────────────────┘
//! ```

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use confcall_sdp_core::{
    session_profile_level_id, Codec, CodecCapabilityProvider, Direction, H264Level, H264ParseError, H264Profile,
    ProfileLevelId, SessionDescription,
};

use crate::config::CallConfig;
use crate::engine::{ActiveAudio, LocalEndpoint, SdpNegotiationEngine};
use crate::errors::{CallError, CallResult, SignalingErrorCode};
use crate::events::{SignalingEvent, SignalingEventReceiver};
use crate::listener::{CallListener, CallNotification, CallStatus, CallStatusObserver, EventDispatcher};
use crate::media::{GroupMode, MediaTransport, MediaTransportFactory};
use crate::transport::{PeerProfile, SignalingSession, TransportId};

/// Lifecycle state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    ReadyToCall,
    OutgoingCall,
    OutgoingRingBack,
    IncomingCall,
    InCall,
    Ended,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::ReadyToCall => "ReadyToCall",
            CallState::OutgoingCall => "OutgoingCall",
            CallState::OutgoingRingBack => "OutgoingRingBack",
            CallState::IncomingCall => "IncomingCall",
            CallState::InCall => "InCall",
            CallState::Ended => "Ended",
        };
        f.write_str(name)
    }
}

/// Millisecond clock value, strictly above `previous`
fn next_session_id(previous: u64) -> u64 {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    now.max(previous.saturating_add(1))
}

/// Mutable call state guarded by the session lock
struct SessionState {
    state: CallState,
    session_id: u64,
    on_hold: bool,
    muted: bool,
    invisible: bool,
    in_call: bool,
    local_sd: Option<String>,
    peer_sd: Option<String>,
    active: Option<Arc<dyn SignalingSession>>,
    transferring: Option<Arc<dyn SignalingSession>>,
    audio: Option<Box<dyn MediaTransport>>,
    last_error: Option<(SignalingErrorCode, String)>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            state: CallState::ReadyToCall,
            session_id: next_session_id(0),
            on_hold: false,
            muted: false,
            invisible: false,
            in_call: false,
            local_sd: None,
            peer_sd: None,
            active: None,
            transferring: None,
            audio: None,
            last_error: None,
        }
    }

    fn is_active(&self, transport: TransportId) -> bool {
        self.active.as_ref().is_some_and(|t| t.id() == transport)
    }

    fn is_transferring(&self, transport: TransportId) -> bool {
        self.transferring.as_ref().is_some_and(|t| t.id() == transport)
    }

    fn active_transport(&self, action: &str) -> CallResult<Arc<dyn SignalingSession>> {
        self.active
            .clone()
            .ok_or_else(|| CallError::invalid_state(format!("Not in a call to {}", action)))
    }

    fn endpoint(&self, transport: &dyn SignalingSession) -> CallResult<LocalEndpoint> {
        let audio = self
            .audio
            .as_ref()
            .ok_or_else(|| CallError::invalid_state("no audio stream"))?;
        Ok(LocalEndpoint::new(self.session_id, transport.local_ip(), audio.local_port()))
    }

    fn active_audio(&self) -> CallResult<ActiveAudio> {
        let audio = self
            .audio
            .as_ref()
            .ok_or_else(|| CallError::invalid_state("no audio stream"))?;
        let codec = audio
            .codec()
            .ok_or_else(|| CallError::invalid_state("audio stream has no negotiated codec"))?;
        Ok(ActiveAudio {
            codec,
            dtmf_payload_type: audio.dtmf_type(),
        })
    }

    fn require_in_call(&self) -> CallResult<()> {
        if self.in_call {
            Ok(())
        } else {
            Err(CallError::invalid_state(format!("call is not established ({})", self.state)))
        }
    }

    fn stop_media(&mut self, release: bool) {
        if let Some(audio) = self.audio.as_mut() {
            audio.leave_group();
            if release {
                audio.release();
            }
        }
        if release {
            self.audio = None;
        }
    }

    fn apply_group_mode(&mut self) {
        let mode = GroupMode::from_flags(self.on_hold, self.muted);
        if let Some(audio) = self.audio.as_mut().filter(|a| a.is_joined()) {
            audio.set_group_mode(mode);
        }
    }

    /// Release media and negotiation state, leaving the session reusable
    fn reset(&mut self) {
        self.stop_media(true);
        self.state = CallState::ReadyToCall;
        self.in_call = false;
        self.on_hold = false;
        self.muted = false;
        self.invisible = false;
        self.session_id = next_session_id(self.session_id);
        self.last_error = None;
        self.local_sd = None;
        self.peer_sd = None;
        self.active = None;
        self.transferring = None;
    }

    /// Notification describing the current state, for late listeners
    fn catch_up(&self) -> Option<CallNotification> {
        if let Some((code, message)) = &self.last_error {
            return Some(CallNotification::Error {
                code: *code,
                message: message.clone(),
            });
        }
        if self.in_call {
            return Some(self.established_notification());
        }
        match self.state {
            CallState::ReadyToCall => Some(CallNotification::ReadyToCall),
            CallState::IncomingCall => self
                .active
                .as_ref()
                .and_then(|t| t.peer_profile())
                .map(CallNotification::Ringing),
            CallState::OutgoingCall => Some(CallNotification::Calling),
            CallState::OutgoingRingBack => Some(CallNotification::RingingBack),
            CallState::InCall | CallState::Ended => None,
        }
    }

    fn established_notification(&self) -> CallNotification {
        if self.on_hold {
            CallNotification::Held
        } else if self.invisible {
            CallNotification::Invisible
        } else {
            CallNotification::Established
        }
    }
}

/// Notifications collected under the lock
#[derive(Default)]
struct Outcome {
    notifications: Vec<CallNotification>,
    statuses: Vec<CallStatus>,
}

impl Outcome {
    fn notify(&mut self, notification: CallNotification) {
        self.notifications.push(notification);
    }

    fn status(&mut self, status: CallStatus) {
        self.statuses.push(status);
    }

    fn error(&mut self, code: SignalingErrorCode, message: &str) {
        self.notify(CallNotification::Error {
            code,
            message: message.to_string(),
        });
        self.status(CallStatus::Error {
            code,
            message: message.to_string(),
        });
    }
}

/// One call and its negotiation state
pub struct CallSession {
    local_profile: PeerProfile,
    engine: SdpNegotiationEngine,
    media_factory: Arc<dyn MediaTransportFactory>,
    state: Mutex<SessionState>,
    dispatcher: EventDispatcher,
}

impl CallSession {
    pub fn new(
        local_profile: PeerProfile,
        config: CallConfig,
        capabilities: Arc<dyn CodecCapabilityProvider>,
        media_factory: Arc<dyn MediaTransportFactory>,
    ) -> Self {
        Self {
            local_profile,
            engine: SdpNegotiationEngine::new(capabilities, config),
            media_factory,
            state: Mutex::new(SessionState::new()),
            dispatcher: EventDispatcher::new(),
        }
    }

    pub fn config(&self) -> &CallConfig {
        self.engine.config()
    }

    pub fn engine(&self) -> &SdpNegotiationEngine {
        &self.engine
    }

    /// Register the call listener, replacing any previous one
    ///
    /// With `callback_immediately`, the new listener is told about the
    /// current state right away.
    pub fn set_listener(&self, listener: Option<Arc<dyn CallListener>>, callback_immediately: bool) {
        self.dispatcher.set_listener(listener.clone());
        let Some(listener) = listener.filter(|_| callback_immediately) else {
            return;
        };
        let notification = self.state.lock().catch_up();
        if let Some(notification) = notification {
            EventDispatcher::deliver(listener.as_ref(), self, &notification);
        }
    }

    /// Register the lifecycle status observer, replacing any previous one
    pub fn set_status_observer(&self, observer: Option<Arc<dyn CallStatusObserver>>) {
        self.dispatcher.set_status_observer(observer);
    }

    // ---- outbound actions ----

    /// Call `peer` over `transport` with an audio-only offer
    pub fn make_call(
        &self,
        peer: &PeerProfile,
        transport: Arc<dyn SignalingSession>,
        timeout: Duration,
    ) -> CallResult<()> {
        self.start_outgoing(peer, transport, timeout, false)
    }

    /// Call `peer` over `transport` with an audio and video offer
    pub fn make_conf_call(
        &self,
        peer: &PeerProfile,
        transport: Arc<dyn SignalingSession>,
        timeout: Duration,
    ) -> CallResult<()> {
        self.start_outgoing(peer, transport, timeout, true)
    }

    fn start_outgoing(
        &self,
        peer: &PeerProfile,
        transport: Arc<dyn SignalingSession>,
        timeout: Duration,
        conference: bool,
    ) -> CallResult<()> {
        let mut state = self.state.lock();
        if state.state != CallState::ReadyToCall || state.active.is_some() {
            return Err(CallError::invalid_state(format!("cannot make a call while {}", state.state)));
        }

        let local_ip = transport.local_ip();
        let mut audio = self.media_factory.create_audio_stream(&local_ip)?;
        let local = LocalEndpoint::new(state.session_id, local_ip, audio.local_port());
        let offer = if conference {
            self.engine.conference_offer(&local).encode()
        } else {
            self.engine.initial_offer(&local).encode()
        };

        if let Err(e) = transport.make_call(peer, &offer, timeout) {
            audio.release();
            return Err(e);
        }

        info!("Calling {} on {} (conference: {})", peer, transport.id(), conference);
        state.audio = Some(audio);
        state.local_sd = Some(offer);
        state.active = Some(transport);
        state.state = CallState::OutgoingCall;
        Ok(())
    }

    /// Take ownership of an inbound call carrying `sdp`
    pub fn attach_call(&self, transport: Arc<dyn SignalingSession>, sdp: impl Into<String>) -> CallResult<()> {
        let mut state = self.state.lock();
        if state.state != CallState::ReadyToCall || state.active.is_some() {
            return Err(CallError::invalid_state(format!("cannot attach a call while {}", state.state)));
        }
        info!("Attached incoming call on {}", transport.id());
        state.peer_sd = Some(sdp.into());
        state.active = Some(transport);
        state.state = CallState::IncomingCall;
        Ok(())
    }

    /// Answer the attached call with audio only
    pub fn answer_call(&self, timeout: Duration) -> CallResult<()> {
        self.answer(timeout, false)
    }

    /// Answer the attached call with audio and, if offered, video
    pub fn answer_conf_call(&self, timeout: Duration) -> CallResult<()> {
        self.answer(timeout, true)
    }

    fn answer(&self, timeout: Duration, conference: bool) -> CallResult<()> {
        let mut state = self.state.lock();
        if state.state != CallState::IncomingCall {
            return Err(CallError::invalid_state("No call to answer"));
        }
        let transport = state.active_transport("answer")?;
        if state.audio.is_none() {
            state.audio = Some(self.media_factory.create_audio_stream(&transport.local_ip())?);
        }

        let local = state.endpoint(transport.as_ref())?;
        let peer_sd = state.peer_sd.clone().unwrap_or_default();
        let answer = match self.engine.create_answer(&peer_sd, &local, conference) {
            Ok(answer) => answer.encode(),
            Err(e) => {
                warn!("Cannot answer call on {}: {}", transport.id(), e);
                state.stop_media(true);
                return Err(e);
            }
        };

        if let Err(e) = transport.answer_call(&answer, timeout) {
            warn!("Answer on {} failed: {}", transport.id(), e);
            state.stop_media(true);
            return Err(e);
        }
        info!("Answered call on {} (conference: {})", transport.id(), conference);
        state.local_sd = Some(answer);
        Ok(())
    }

    /// Stop media and send the end signal
    pub fn end_call(&self) {
        let mut state = self.state.lock();
        state.stop_media(true);
        state.in_call = false;
        if let Some(transport) = state.active.clone() {
            info!("Ending call on {}", transport.id());
            state.state = CallState::Ended;
            transport.end_call();
        }
    }

    /// Put the call on hold; a no-op if already held
    pub fn hold_call(&self, timeout: Duration) -> CallResult<()> {
        let mut state = self.state.lock();
        if state.on_hold {
            return Ok(());
        }
        let transport = state.active_transport("hold call")?;
        state.require_in_call()?;

        let local = state.endpoint(transport.as_ref())?;
        let offer = self.engine.hold_offer(&local, &state.active_audio()?).encode();
        transport.change_call(&offer, timeout)?;

        info!("Holding call on {}", transport.id());
        state.local_sd = Some(offer);
        state.on_hold = true;
        state.apply_group_mode();
        Ok(())
    }

    /// Resume a held call; a no-op if not held
    pub fn continue_call(&self, timeout: Duration) -> CallResult<()> {
        let mut state = self.state.lock();
        if !state.on_hold {
            return Ok(());
        }
        let transport = state.active_transport("continue call")?;
        state.require_in_call()?;

        let local = state.endpoint(transport.as_ref())?;
        let offer = self.engine.continue_offer(&local, &state.active_audio()?).encode();
        transport.change_call(&offer, timeout)?;

        info!("Resuming call on {}", transport.id());
        state.local_sd = Some(offer);
        state.on_hold = false;
        state.apply_group_mode();
        Ok(())
    }

    /// Suppress outbound video; a no-op while on hold
    pub fn make_call_invisible(&self, timeout: Duration) -> CallResult<()> {
        let mut state = self.state.lock();
        if state.on_hold {
            return Ok(());
        }
        let transport = state.active_transport("make call invisible")?;
        state.require_in_call()?;

        let local = state.endpoint(transport.as_ref())?;
        let offer = self.engine.invisible_offer(&local).encode();
        transport.change_call(&offer, timeout)?;

        info!("Call on {} is now invisible", transport.id());
        state.local_sd = Some(offer);
        state.invisible = true;
        Ok(())
    }

    /// Restore outbound video; a no-op unless invisible
    pub fn make_call_visible(&self, timeout: Duration) -> CallResult<()> {
        let mut state = self.state.lock();
        if !state.invisible {
            return Ok(());
        }
        let transport = state.active_transport("make call visible")?;

        let local = state.endpoint(transport.as_ref())?;
        let offer = self.engine.conference_offer(&local).encode();
        transport.change_call(&offer, timeout)?;

        info!("Call on {} is visible again", transport.id());
        state.local_sd = Some(offer);
        state.invisible = false;
        Ok(())
    }

    pub fn toggle_mute(&self) {
        let mut state = self.state.lock();
        state.muted = !state.muted;
        debug!("Mute toggled: {}", state.muted);
        state.apply_group_mode();
    }

    /// Send a DTMF event (0-9, `*`=10, `#`=11, A-D=12-15)
    ///
    /// Silently skipped unless the call is up and its stream is joined.
    pub fn send_dtmf(&self, code: u8) -> CallResult<()> {
        if code > 15 {
            return Err(CallError::media(format!("invalid DTMF code {}", code)));
        }
        let mut state = self.state.lock();
        let in_call = state.in_call;
        match state.audio.as_mut().filter(|a| in_call && a.is_joined()) {
            Some(audio) => {
                debug!("Sending DTMF {}", code);
                audio.send_dtmf(code);
            }
            None => debug!("Dropping DTMF {}: no active audio", code),
        }
        Ok(())
    }

    /// Release media and detach the transport; the session can be reused
    pub fn close(&self) {
        let mut state = self.state.lock();
        debug!("Closing call session {}", state.session_id);
        state.reset();
    }

    // ---- inbound events ----

    /// Feed one signaling event through the state machine
    pub fn handle_event(&self, event: SignalingEvent) {
        debug!("Handling {} event for {}", event.name(), event.transport());
        let mut outcome = Outcome::default();
        {
            let mut state = self.state.lock();
            self.apply_event(&mut state, event, &mut outcome);
        }
        self.dispatch(outcome);
    }

    /// Spawn a task feeding every event from `events` into
    /// [`handle_event`](Self::handle_event) until all senders are dropped
    pub fn spawn_event_pump(self: &Arc<Self>, mut events: SignalingEventReceiver) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                session.handle_event(event);
            }
            debug!("Signaling channel closed, event pump exiting");
        })
    }

    fn dispatch(&self, outcome: Outcome) {
        for notification in &outcome.notifications {
            self.dispatcher.notify(self, notification);
        }
        for status in &outcome.statuses {
            self.dispatcher.publish_status(status);
        }
    }

    fn apply_event(&self, state: &mut SessionState, event: SignalingEvent, out: &mut Outcome) {
        // After end_call only inbound sessions are handled, and only to refuse them
        let inbound = matches!(
            event,
            SignalingEvent::Ringing { .. } | SignalingEvent::Transferring { .. }
        );
        if state.state == CallState::Ended && !inbound {
            debug!("Ignoring {} from {} after the call ended", event.name(), event.transport());
            return;
        }

        match event {
            SignalingEvent::Calling { transport } => {
                if state.is_active(transport) {
                    out.notify(CallNotification::Calling);
                }
            }
            SignalingEvent::RingingBack { transport } => {
                if state.is_active(transport) && state.state == CallState::OutgoingCall {
                    state.state = CallState::OutgoingRingBack;
                    out.notify(CallNotification::RingingBack);
                    out.status(CallStatus::RingingBack);
                }
            }
            SignalingEvent::Ringing { session, peer, sdp } => {
                self.on_reinvite(state, session, &peer, sdp);
            }
            SignalingEvent::Established { transport, sdp } => {
                self.on_established(state, transport, sdp, out);
            }
            SignalingEvent::Ended { transport } => self.on_ended(state, transport, out),
            SignalingEvent::Busy { transport } => {
                let outgoing = matches!(state.state, CallState::OutgoingCall | CallState::OutgoingRingBack);
                if !state.is_active(transport) || !outgoing {
                    warn!("Ignoring busy from {} while {}", transport, state.state);
                    return;
                }
                info!("Peer busy on {}", transport);
                out.notify(CallNotification::Busy);
                out.status(CallStatus::Busy);
                state.reset();
            }
            SignalingEvent::CallChangeFailed {
                transport,
                code,
                message,
            } => {
                if !state.is_active(transport) {
                    return;
                }
                warn!(
                    "Call change failed on {}: {}",
                    transport,
                    CallError::from_signaling(code, message.as_str())
                );
                out.notify(CallNotification::Error {
                    code,
                    message: message.clone(),
                });
                state.last_error = Some((code, message));
            }
            SignalingEvent::Error {
                transport,
                code,
                message,
            } => self.on_error(state, transport, code, message, out),
            SignalingEvent::Transferring { new_session, sdp } => {
                self.on_transferring(state, new_session, sdp);
            }
            SignalingEvent::Registration { .. } => {}
        }
    }

    fn on_reinvite(
        &self,
        state: &mut SessionState,
        session: Arc<dyn SignalingSession>,
        peer: &PeerProfile,
        sdp: String,
    ) {
        let same_call = state.in_call
            && state
                .active
                .as_ref()
                .is_some_and(|active| active.call_id() == session.call_id());
        let Some(transport) = state.active.clone().filter(|_| same_call) else {
            warn!("Unexpected re-INVITE from {} on {}, ending it", peer, session.id());
            session.end_call();
            return;
        };

        debug!("Re-INVITE from {} on {}", peer, session.id());
        let on_hold = state.on_hold;
        let answer = state
            .endpoint(transport.as_ref())
            .and_then(|local| self.engine.create_answer(&sdp, &local, true))
            .map(|mut answer| {
                if on_hold {
                    answer.set_direction(Direction::SendOnly);
                }
                answer.encode()
            })
            .and_then(|answer| {
                transport
                    .answer_call(&answer, self.config().session_timeout())
                    .map(|_| answer)
            });

        match answer {
            Ok(answer) => {
                state.local_sd = Some(answer);
                state.peer_sd = Some(sdp);
            }
            Err(e) => {
                error!("Rejecting re-INVITE on {}: {}", session.id(), e);
                session.reject_change(&e.to_string());
            }
        }
    }

    fn on_established(&self, state: &mut SessionState, transport: TransportId, sdp: String, out: &mut Outcome) {
        if state.is_transferring(transport) {
            state.peer_sd = Some(sdp);
            self.complete_transfer(state, out);
            return;
        }
        if !state.is_active(transport) {
            warn!("Ignoring established from inactive transport {}", transport);
            return;
        }

        state.peer_sd = Some(sdp);
        match self.start_media(state) {
            Ok(()) => {
                state.state = CallState::InCall;
                info!("Call established on {}", transport);
                out.notify(state.established_notification());
                out.status(CallStatus::Established);
            }
            Err(e) => self.fail_media(state, e, out),
        }
    }

    fn on_ended(&self, state: &mut SessionState, transport: TransportId, out: &mut Outcome) {
        if state.is_transferring(transport) {
            info!("Transfer target {} ended, abandoning transfer", transport);
            state.transferring = None;
            return;
        }
        if state.transferring.is_some() || !state.is_active(transport) {
            debug!("Ignoring ended from {}", transport);
            return;
        }

        info!("Call ended on {}", transport);
        state.state = CallState::Ended;
        out.notify(CallNotification::Ended);
        out.status(CallStatus::Ended);
        state.reset();
    }

    fn on_error(
        &self,
        state: &mut SessionState,
        transport: TransportId,
        code: SignalingErrorCode,
        message: String,
        out: &mut Outcome,
    ) {
        if state.is_transferring(transport) {
            warn!("Transfer target {} failed: {} {}", transport, code, message);
            state.transferring = None;
            return;
        }
        if !state.is_active(transport) {
            debug!("Ignoring error from {}: {} {}", transport, code, message);
            return;
        }

        let err = CallError::from_signaling(code, message.as_str());
        warn!("Signaling error on {}: {}", transport, err);
        out.error(err.signaling_code(), &message);
        state.last_error = Some((code, message));
        if code.is_fatal() || !state.in_call {
            state.reset();
        }
    }

    fn on_transferring(&self, state: &mut SessionState, new_session: Arc<dyn SignalingSession>, sdp: Option<String>) {
        if state.active.is_none() || !state.in_call {
            warn!("Transfer to {} requested outside a call, ending it", new_session.id());
            new_session.end_call();
            return;
        }

        let config = self.config();
        let result = state.endpoint(new_session.as_ref()).and_then(|local| match &sdp {
            None => {
                let peer = new_session
                    .peer_profile()
                    .ok_or_else(|| CallError::invalid_state("transfer target has no peer"))?;
                let offer = self.engine.initial_offer(&local).encode();
                new_session.make_call(&peer, &offer, config.transfer_timeout())?;
                Ok(offer)
            }
            Some(sdp) => {
                let answer = self.engine.create_answer(sdp, &local, true)?.encode();
                new_session.answer_call(&answer, config.session_timeout())?;
                Ok(answer)
            }
        });

        match result {
            Ok(local_sd) => {
                info!("Transferring call to {}", new_session.id());
                state.local_sd = Some(local_sd);
                state.transferring = Some(new_session);
            }
            Err(e) => {
                error!("Transfer to {} failed: {}", new_session.id(), e);
                new_session.end_call();
            }
        }
    }

    /// Swap the transferring transport in and restart media on it
    fn complete_transfer(&self, state: &mut SessionState, out: &mut Outcome) {
        let Some(new_transport) = state.transferring.take() else {
            return;
        };
        let previous = state.active.replace(Arc::clone(&new_transport));

        if state.audio.is_none() {
            match self.media_factory.create_audio_stream(&new_transport.local_ip()) {
                Ok(audio) => state.audio = Some(audio),
                Err(e) => warn!("Cannot create audio stream for transfer: {}", e),
            }
        } else {
            state.stop_media(false);
        }
        if let Some(previous) = previous {
            info!("Transferred call from {} to {}", previous.id(), new_transport.id());
            previous.end_call();
        }

        if let Err(e) = self.start_media(state) {
            self.fail_media(state, e, out);
        }
    }

    /// Configure the audio stream from the peer's description
    fn start_media(&self, state: &mut SessionState) -> CallResult<()> {
        let peer_sd = state
            .peer_sd
            .clone()
            .ok_or_else(|| CallError::invalid_state("no peer description"))?;
        let negotiated = self.engine.negotiate_media(&peer_sd)?;

        if state.audio.is_none() {
            let transport = state.active_transport("start audio")?;
            state.audio = Some(self.media_factory.create_audio_stream(&transport.local_ip())?);
        }
        let (on_hold, muted) = (state.on_hold, state.muted);
        let audio = state
            .audio
            .as_mut()
            .ok_or_else(|| CallError::invalid_state("no audio stream"))?;

        audio.leave_group();
        audio.associate(&negotiated.address, negotiated.port)?;
        audio.set_codec(&negotiated.codec);
        audio.set_dtmf_type(negotiated.dtmf_payload_type);
        audio.set_mode(negotiated.stream_mode(on_hold));
        if !on_hold {
            audio.join_group();
            audio.set_group_mode(GroupMode::from_flags(on_hold, muted));
        }

        debug!(
            "Audio wired to {}:{} with {}",
            negotiated.address, negotiated.port, negotiated.codec
        );
        state.in_call = true;
        Ok(())
    }

    /// Report a media wiring failure and tear the call down
    fn fail_media(&self, state: &mut SessionState, err: CallError, out: &mut Outcome) {
        error!("Failed to start audio: {}", err);
        out.error(err.signaling_code(), &err.to_string());
        if let Some(transport) = state.active.clone() {
            transport.end_call();
        }
        state.reset();
    }

    // ---- accessors ----

    pub fn state(&self) -> CallState {
        self.state.lock().state
    }

    pub fn session_id(&self) -> u64 {
        self.state.lock().session_id
    }

    /// True once media is wired for an established call
    pub fn is_in_call(&self) -> bool {
        self.state.lock().in_call
    }

    pub fn is_on_hold(&self) -> bool {
        self.state.lock().on_hold
    }

    pub fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    pub fn is_invisible(&self) -> bool {
        self.state.lock().invisible
    }

    /// Last description sent
    pub fn local_sd(&self) -> Option<String> {
        self.state.lock().local_sd.clone()
    }

    /// Last description received
    pub fn peer_sd(&self) -> Option<String> {
        self.state.lock().peer_sd.clone()
    }

    pub fn last_error(&self) -> Option<(SignalingErrorCode, String)> {
        self.state.lock().last_error.clone()
    }

    pub fn active_transport(&self) -> Option<TransportId> {
        self.state.lock().active.as_ref().map(|t| t.id())
    }

    pub fn transferring_transport(&self) -> Option<TransportId> {
        self.state.lock().transferring.as_ref().map(|t| t.id())
    }

    pub fn local_profile(&self) -> &PeerProfile {
        &self.local_profile
    }

    pub fn peer_profile(&self) -> Option<PeerProfile> {
        self.state.lock().active.as_ref().and_then(|t| t.peer_profile())
    }

    /// Codec running on the audio stream
    pub fn audio_codec(&self) -> Option<Codec> {
        self.state.lock().audio.as_ref().and_then(|a| a.codec())
    }

    fn parsed(text: Option<String>) -> Option<SessionDescription> {
        let text = text?;
        match SessionDescription::parse(&text) {
            Ok(sd) => Some(sd),
            Err(e) => {
                debug!("Stored description does not decode: {}", e);
                None
            }
        }
    }

    pub fn peer_video_address(&self) -> Option<String> {
        Self::parsed(self.peer_sd()).map(|sd| self.engine.video_address(&sd))
    }

    /// Peer video port, 0xFFFF when the peer offered no video
    pub fn peer_video_port(&self) -> u16 {
        Self::parsed(self.peer_sd()).map_or(0xFFFF, |sd| self.engine.video_port(&sd))
    }

    pub fn peer_video_protocol(&self) -> Option<String> {
        Self::parsed(self.peer_sd()).and_then(|sd| self.engine.video_protocol(&sd))
    }

    pub fn local_video_protocol(&self) -> Option<String> {
        Self::parsed(self.local_sd()).and_then(|sd| self.engine.video_protocol(&sd))
    }

    /// `sdp://` description of the peer's H.264 video for the video pipeline
    pub fn peer_video_description(&self) -> CallResult<String> {
        let (session_id, peer_sd) = {
            let state = self.state.lock();
            (state.session_id, state.peer_sd.clone())
        };
        let peer_sd = peer_sd.ok_or_else(|| CallError::invalid_state("no peer description"))?;
        let peer = SessionDescription::parse(&peer_sd)?;
        Ok(self.engine.video_description(session_id, &peer))
    }

    fn profile_level(text: Option<String>) -> Result<ProfileLevelId, H264ParseError> {
        let sd = Self::parsed(text).ok_or(H264ParseError::Missing)?;
        session_profile_level_id(&sd)
    }

    pub fn local_video_codec_profile(&self) -> Result<H264Profile, H264ParseError> {
        Self::profile_level(self.local_sd()).map(|id| id.profile)
    }

    pub fn local_video_codec_level(&self) -> Result<H264Level, H264ParseError> {
        Self::profile_level(self.local_sd()).map(|id| id.level)
    }

    pub fn remote_video_codec_profile(&self) -> Result<H264Profile, H264ParseError> {
        Self::profile_level(self.peer_sd()).map(|id| id.profile)
    }

    pub fn remote_video_codec_level(&self) -> Result<H264Level, H264ParseError> {
        Self::profile_level(self.peer_sd()).map(|id| id.level)
    }
}

impl fmt::Debug for CallSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("CallSession");
        debug.field("local_profile", &self.local_profile);
        // Formatting may happen while the state lock is held
        if let Some(state) = self.state.try_lock() {
            debug
                .field("state", &state.state)
                .field("session_id", &state.session_id)
                .field("in_call", &state.in_call)
                .field("on_hold", &state.on_hold)
                .field("invisible", &state.invisible);
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_increase() {
        let first = next_session_id(0);
        assert!(first > 0);
        assert!(next_session_id(first) > first);
        assert_eq!(next_session_id(u64::MAX - 1), u64::MAX);
    }

    #[test]
    fn test_catch_up_mapping() {
        let mut state = SessionState::new();
        assert_eq!(state.catch_up(), Some(CallNotification::ReadyToCall));

        state.state = CallState::OutgoingRingBack;
        assert_eq!(state.catch_up(), Some(CallNotification::RingingBack));

        state.in_call = true;
        state.invisible = true;
        assert_eq!(state.catch_up(), Some(CallNotification::Invisible));
        state.on_hold = true;
        assert_eq!(state.catch_up(), Some(CallNotification::Held));

        state.last_error = Some((SignalingErrorCode::TimeOut, "late".to_string()));
        assert_eq!(
            state.catch_up(),
            Some(CallNotification::Error {
                code: SignalingErrorCode::TimeOut,
                message: "late".to_string(),
            })
        );
    }
}
