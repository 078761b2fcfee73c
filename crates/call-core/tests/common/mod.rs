//! Recording doubles for the signaling and media collaborators

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use confcall_call_core::{
    CallConfig, CallError, CallListener, CallResult, CallSession, CallStatus, CallStatusObserver,
    GroupMode, MediaTransport, MediaTransportFactory, PeerProfile, SignalingErrorCode, SignalingSession,
    StreamMode, TransportId,
};
use confcall_sdp_core::{Codec, StaticCodecProvider};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Request the call session made of a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    MakeCall { peer: PeerProfile, sdp: String },
    Answer { sdp: String },
    Change { sdp: String },
    Reject { reason: String },
    End,
}

#[derive(Debug)]
pub struct MockTransport {
    id: TransportId,
    call_id: String,
    peer: Option<PeerProfile>,
    calls: Mutex<Vec<TransportCall>>,
    fail_requests: Mutex<bool>,
}

impl MockTransport {
    pub fn new(call_id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: TransportId::new(),
            call_id: call_id.to_string(),
            peer: Some(PeerProfile::new("sip:bob@example.com").with_display_name("Bob")),
            calls: Mutex::new(Vec::new()),
            fail_requests: Mutex::new(false),
        })
    }

    pub fn id(&self) -> TransportId {
        self.id
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn ended(&self) -> bool {
        self.calls.lock().contains(&TransportCall::End)
    }

    pub fn count(&self, matcher: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matcher(c)).count()
    }

    pub fn last_sdp(&self) -> Option<String> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            TransportCall::MakeCall { sdp, .. } | TransportCall::Answer { sdp } | TransportCall::Change { sdp } => {
                Some(sdp.clone())
            }
            _ => None,
        })
    }

    pub fn fail_requests(&self, fail: bool) {
        *self.fail_requests.lock() = fail;
    }

    fn request(&self, call: TransportCall) -> CallResult<()> {
        if *self.fail_requests.lock() {
            return Err(CallError::transport(SignalingErrorCode::SocketError, "socket closed"));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl SignalingSession for MockTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn call_id(&self) -> String {
        self.call_id.clone()
    }

    fn local_ip(&self) -> String {
        "10.0.0.1".to_string()
    }

    fn peer_profile(&self) -> Option<PeerProfile> {
        self.peer.clone()
    }

    fn make_call(&self, peer: &PeerProfile, sdp: &str, _timeout: Duration) -> CallResult<()> {
        self.request(TransportCall::MakeCall {
            peer: peer.clone(),
            sdp: sdp.to_string(),
        })
    }

    fn answer_call(&self, sdp: &str, _timeout: Duration) -> CallResult<()> {
        self.request(TransportCall::Answer { sdp: sdp.to_string() })
    }

    fn change_call(&self, sdp: &str, _timeout: Duration) -> CallResult<()> {
        self.request(TransportCall::Change { sdp: sdp.to_string() })
    }

    fn reject_change(&self, reason: &str) {
        self.calls.lock().push(TransportCall::Reject {
            reason: reason.to_string(),
        });
    }

    fn end_call(&self) {
        self.calls.lock().push(TransportCall::End);
    }
}

/// Observable state of one mock audio stream
#[derive(Debug, Default, Clone)]
pub struct StreamRecord {
    pub remote: Option<(String, u16)>,
    pub codec: Option<Codec>,
    pub dtmf_type: Option<u8>,
    pub mode: Option<StreamMode>,
    pub joined: bool,
    pub group_mode: Option<GroupMode>,
    pub dtmf_sent: Vec<u8>,
    pub released: bool,
}

pub struct MockStream {
    port: u16,
    record: Arc<Mutex<StreamRecord>>,
    fail_associate: bool,
}

impl MediaTransport for MockStream {
    fn local_port(&self) -> u16 {
        self.port
    }

    fn associate(&mut self, address: &str, port: u16) -> CallResult<()> {
        if self.fail_associate {
            return Err(CallError::peer_unreachable(format!("cannot resolve {}", address)));
        }
        self.record.lock().remote = Some((address.to_string(), port));
        Ok(())
    }

    fn set_codec(&mut self, codec: &Codec) {
        self.record.lock().codec = Some(codec.clone());
    }

    fn codec(&self) -> Option<Codec> {
        self.record.lock().codec.clone()
    }

    fn set_dtmf_type(&mut self, payload_type: Option<u8>) {
        self.record.lock().dtmf_type = payload_type;
    }

    fn dtmf_type(&self) -> Option<u8> {
        self.record.lock().dtmf_type
    }

    fn set_mode(&mut self, mode: StreamMode) {
        self.record.lock().mode = Some(mode);
    }

    fn join_group(&mut self) {
        self.record.lock().joined = true;
    }

    fn leave_group(&mut self) {
        self.record.lock().joined = false;
    }

    fn is_joined(&self) -> bool {
        self.record.lock().joined
    }

    fn set_group_mode(&mut self, mode: GroupMode) {
        self.record.lock().group_mode = Some(mode);
    }

    fn send_dtmf(&mut self, code: u8) {
        self.record.lock().dtmf_sent.push(code);
    }

    fn release(&mut self) {
        self.record.lock().released = true;
    }
}

#[derive(Default)]
pub struct MockMediaFactory {
    streams: Mutex<Vec<Arc<Mutex<StreamRecord>>>>,
    fail_associate: Mutex<bool>,
}

impl MockMediaFactory {
    pub fn fail_associate(&self, fail: bool) {
        *self.fail_associate.lock() = fail;
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Snapshot of the most recently created stream
    pub fn last_stream(&self) -> Option<StreamRecord> {
        self.streams.lock().last().map(|record| record.lock().clone())
    }
}

impl MediaTransportFactory for MockMediaFactory {
    fn create_audio_stream(&self, _local_ip: &str) -> CallResult<Box<dyn MediaTransport>> {
        let record = Arc::new(Mutex::new(StreamRecord::default()));
        let mut streams = self.streams.lock();
        let port = 30000 + 2 * streams.len() as u16;
        streams.push(Arc::clone(&record));
        Ok(Box::new(MockStream {
            port,
            record,
            fail_associate: *self.fail_associate.lock(),
        }))
    }
}

/// Listener recording callback names in order
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.as_str() == name).count()
    }

    fn push(&self, name: impl Into<String>) {
        self.events.lock().push(name.into());
    }
}

impl CallListener for RecordingListener {
    fn on_ready_to_call(&self, _call: &CallSession) {
        self.push("ready");
    }

    fn on_calling(&self, _call: &CallSession) {
        self.push("calling");
    }

    fn on_ringing(&self, _call: &CallSession, _caller: &PeerProfile) {
        self.push("ringing");
    }

    fn on_ringing_back(&self, _call: &CallSession) {
        self.push("ringing-back");
    }

    fn on_call_established(&self, _call: &CallSession) {
        self.push("established");
    }

    fn on_call_busy(&self, _call: &CallSession) {
        self.push("busy");
    }

    fn on_call_held(&self, _call: &CallSession) {
        self.push("held");
    }

    fn on_call_invisible(&self, _call: &CallSession) {
        self.push("invisible");
    }

    fn on_call_ended(&self, _call: &CallSession) {
        self.push("ended");
    }

    fn on_error(&self, _call: &CallSession, code: SignalingErrorCode, _message: &str) {
        self.push(format!("error:{}", code.as_str()));
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    statuses: Mutex<Vec<CallStatus>>,
}

impl RecordingObserver {
    pub fn statuses(&self) -> Vec<CallStatus> {
        self.statuses.lock().clone()
    }
}

impl CallStatusObserver for RecordingObserver {
    fn on_status_change(&self, status: &CallStatus) {
        self.statuses.lock().push(status.clone());
    }
}

/// A call session wired to recording doubles
pub struct Harness {
    pub call: Arc<CallSession>,
    pub media: Arc<MockMediaFactory>,
    pub listener: Arc<RecordingListener>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_codecs(StaticCodecProvider::default())
    }

    pub fn with_codecs(codecs: StaticCodecProvider) -> Self {
        let media = Arc::new(MockMediaFactory::default());
        let call = Arc::new(CallSession::new(
            PeerProfile::new("sip:alice@example.com"),
            CallConfig::default(),
            Arc::new(codecs),
            media.clone(),
        ));
        let listener = Arc::new(RecordingListener::default());
        let observer = Arc::new(RecordingObserver::default());
        call.set_listener(Some(listener.clone() as Arc<dyn CallListener>), false);
        call.set_status_observer(Some(observer.clone() as Arc<dyn CallStatusObserver>));
        Self {
            call,
            media,
            listener,
            observer,
        }
    }
}

pub fn bob() -> PeerProfile {
    PeerProfile::new("sip:bob@example.com")
}

/// Audio answer from the peer: PCMU plus telephone-event 101
pub fn peer_audio_sdp() -> String {
    [
        "v=0",
        "o=- 900 900 IN IP4 10.0.0.2",
        "s=-",
        "c=IN IP4 10.0.0.2",
        "t=0 0",
        "m=audio 40000 RTP/AVP 0 101",
        "a=rtpmap:0 PCMU/8000",
        "a=rtpmap:101 telephone-event/8000",
        "a=fmtp:101 0-15",
        "",
    ]
    .join("\r\n")
}

/// Audio and H.264 video offer from the peer
pub fn peer_conference_sdp() -> String {
    [
        "v=0",
        "o=- 901 901 IN IP4 10.0.0.2",
        "s=-",
        "c=IN IP4 10.0.0.2",
        "t=0 0",
        "m=audio 40000 RTP/AVP 8 101",
        "a=rtpmap:8 PCMA/8000",
        "a=rtpmap:101 telephone-event/8000",
        "a=fmtp:101 0-15",
        "m=video 40002 RTP/AVP 109",
        "c=IN IP4 10.0.0.3",
        "a=rtpmap:109 H264/90000",
        "a=fmtp:109 profile-level-id=42e01f;packetization-mode=1",
        "a=framesize:109 1280-720",
        "",
    ]
    .join("\r\n")
}

/// Video-only offer; no audio to answer
pub fn peer_video_only_sdp() -> String {
    [
        "v=0",
        "o=- 902 902 IN IP4 10.0.0.2",
        "s=-",
        "c=IN IP4 10.0.0.2",
        "t=0 0",
        "m=video 40002 RTP/AVP 109",
        "a=rtpmap:109 H264/90000",
        "",
    ]
    .join("\r\n")
}
