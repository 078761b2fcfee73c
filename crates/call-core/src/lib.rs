//! # Conference call core
//!
//! Call-level state machine and offer/answer negotiation for SIP audio and
//! video conference calls.
//!
//! ## Layout
//!
//! - [`session`]: [`CallSession`], the state machine for one call
//! - [`engine`]: [`SdpNegotiationEngine`], builds every offer and answer
//! - [`negotiator`]: codec selection and DTMF passthrough
//! - [`events`] / [`transport`]: what the signaling layer sends in and what
//!   the session asks of it
//! - [`media`]: the audio stream seam
//! - [`listener`]: application callbacks and status telemetry
//! - [`config`] / [`logging`]: runtime configuration and tracing setup
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use confcall_call_core::{signaling_channel, CallConfig, CallSession, PeerProfile};
//! use confcall_sdp_core::StaticCodecProvider;
//! # fn media() -> Arc<dyn confcall_call_core::MediaTransportFactory> { unimplemented!() }
//!
//! # async fn run() {
//! let call = Arc::new(CallSession::new(
//!     PeerProfile::new("sip:alice@example.com"),
//!     CallConfig::default(),
//!     Arc::new(StaticCodecProvider::default()),
//!     media(),
//! ));
//! let (events_tx, events_rx) = signaling_channel();
//! let _pump = call.spawn_event_pump(events_rx);
//! // hand `events_tx` to the signaling layer, then make or attach a call
//! # drop(events_tx);
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod listener;
pub mod logging;
pub mod media;
pub mod negotiator;
pub mod session;
pub mod transport;

pub use config::{CallConfig, LogFormat, VideoResolution};
pub use engine::{ActiveAudio, LocalEndpoint, NegotiatedAudio, SdpNegotiationEngine};
pub use errors::{CallError, CallResult, SignalingErrorCode};
pub use events::{signaling_channel, SignalingEvent, SignalingEventReceiver, SignalingEventSender};
pub use listener::{CallListener, CallNotification, CallStatus, CallStatusObserver, EventDispatcher};
pub use logging::{filter_directives, init_logging, parse_log_level};
pub use media::{GroupMode, MediaTransport, MediaTransportFactory, StreamMode};
pub use negotiator::{answer_direction, remote_direction, CodecNegotiator, DtmfPassthrough};
pub use session::{CallSession, CallState};
pub use transport::{PeerProfile, SignalingSession, TransportId};
