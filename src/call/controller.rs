//! # Call Session Controller
//!
//! The WebSocket actor that owns one call from transport connect to close.
//! Each connection walks the phase machine Connecting → Active → Draining →
//! Closed. Closed is terminal and idempotent, and every exit path (clean
//! stop, transport closure, receive-loop error) runs the same teardown:
//! the inbound queue gets its sentinel, archives are closed, the call gauge
//! drops.
//!
//! The speech pipeline and the outbound relay run as separate tasks and are
//! fault-isolated: either one failing silences its capability for the rest of
//! the call but never terminates the controller.

use crate::audio::archive::{CallArchive, Direction};
use crate::audio::codec::{self, TransportEvent};
use crate::audio::queue::{frame_channel, FrameReceiver, FrameSender};
use crate::call::session::CallSession;
use crate::config::AppConfig;
use crate::dialogue::DialoguePolicy;
use crate::error::AppError;
use crate::state::{AppState, ServiceClients};
use crate::synthesis::synthesize_chunks;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle phase of one call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Transport session established, pipeline not yet running
    Connecting,
    /// Greeting queued, receive loop forwarding media
    Active,
    /// Sentinel pushed; already-queued audio still being delivered
    Draining,
    /// Archives and transport closed; terminal
    Closed,
}

/// WebSocket actor handling one call's media stream.
pub struct CallController {
    call_id: String,
    appointment_id: String,
    stream_id: Option<String>,
    phase: CallPhase,
    config: AppConfig,
    services: Arc<ServiceClients>,
    app_state: web::Data<AppState>,
    inbound_tx: FrameSender,
    /// Taken by the speech pipeline task when the transport connects
    inbound_rx: Option<FrameReceiver>,
    inbound_archive: Option<CallArchive>,
    relay_done: bool,
    pipeline_started: bool,
}

impl CallController {
    pub fn new(
        call_id: String,
        appointment_id: String,
        config: AppConfig,
        app_state: web::Data<AppState>,
    ) -> Self {
        let (inbound_tx, inbound_rx) = frame_channel();
        let services = app_state.services.clone();

        Self {
            call_id,
            appointment_id,
            stream_id: None,
            phase: CallPhase::Connecting,
            config,
            services,
            app_state,
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            inbound_archive: None,
            relay_done: false,
            pipeline_started: false,
        }
    }

    /// Spawn the speech pipeline and outbound relay once the transport has
    /// announced its stream id.
    fn handle_connected(&mut self, stream_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        if self.pipeline_started {
            warn!(call_id = %self.call_id, "Duplicate connected event ignored");
            return;
        }
        self.pipeline_started = true;
        self.stream_id = Some(stream_id.clone());

        info!(
            call_id = %self.call_id,
            stream_id = %stream_id,
            appointment_id = %self.appointment_id,
            "Call stream connected"
        );

        let inbound_rx = match self.inbound_rx.take() {
            Some(rx) => rx,
            None => {
                error!(call_id = %self.call_id, "Inbound queue already consumed");
                return;
            }
        };

        let (outbound_tx, outbound_rx) = frame_channel();
        let outbound_archive = open_archive(&self.config, &self.call_id, Direction::Outbound);

        let session = CallSession::new(
            self.call_id.clone(),
            stream_id.clone(),
            self.appointment_id.clone(),
            self.config.calls.default_language.clone(),
        );

        tokio::spawn(run_speech_pipeline(
            self.services.clone(),
            self.config.audio.chunk_bytes,
            session,
            inbound_rx,
            outbound_tx,
            ctx.address(),
        ));

        tokio::spawn(run_outbound_relay(
            outbound_rx,
            outbound_archive,
            stream_id,
            ctx.address(),
        ));
    }

    /// Decode one media event, archive it, and feed the inbound queue. A
    /// malformed frame is dropped and logged; the session continues.
    fn handle_media(&mut self, payload: &str) {
        if !matches!(self.phase, CallPhase::Connecting | CallPhase::Active) {
            return;
        }

        let frame = match codec::decode_media(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(call_id = %self.call_id, "Dropping malformed media frame: {}", e);
                return;
            }
        };

        if let Some(archive) = self.inbound_archive.as_mut() {
            if let Err(e) = archive.write_frame(&frame) {
                warn!(call_id = %self.call_id, "Inbound archive write failed: {}", e);
            }
        }

        if self.inbound_tx.send(frame).is_err() {
            // Transcription ended early; media keeps flowing for the archive
            debug!(call_id = %self.call_id, "Inbound queue detached, frame not forwarded");
        }
    }

    /// Enter Draining: push the sentinel to the inbound queue. The outbound
    /// queue closes causally: the speech pipeline finishes on the inbound
    /// sentinel and closes it as the sole producer, so already-queued audio
    /// is still delivered before the final close.
    fn begin_drain(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if matches!(self.phase, CallPhase::Draining | CallPhase::Closed) {
            return;
        }
        self.phase = CallPhase::Draining;
        self.inbound_tx.finish();
        info!(call_id = %self.call_id, "Call draining");

        if self.relay_done {
            self.finish_close(ctx);
        }
    }

    fn finish_close(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.close(None);
        ctx.stop();
    }

    /// Unconditional teardown. Runs exactly once however the session ends;
    /// re-entering Closed is a no-op.
    fn finalize(&mut self) {
        if self.phase == CallPhase::Closed {
            return;
        }
        self.phase = CallPhase::Closed;
        self.inbound_tx.finish();

        if let Some(mut archive) = self.inbound_archive.take() {
            if let Err(e) = archive.close() {
                warn!(call_id = %self.call_id, "Inbound archive close failed: {}", e);
            }
        }

        self.app_state.end_call();
        info!(
            call_id = %self.call_id,
            stream_id = %self.stream_id.as_deref().unwrap_or("unassigned"),
            "Call session closed"
        );
    }
}

/// Greeting audio has been queued; the session is live.
#[derive(Message)]
#[rtype(result = "()")]
struct GreetingQueued;

/// One encoded outbound media event ready for the transport.
#[derive(Message)]
#[rtype(result = "()")]
struct OutboundMedia(String);

/// The outbound relay delivered everything and exited.
#[derive(Message)]
#[rtype(result = "()")]
struct RelayFinished;

impl Actor for CallController {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        self.app_state.begin_call();
        self.inbound_archive = open_archive(&self.config, &self.call_id, Direction::Inbound);
        info!(call_id = %self.call_id, "Call session connecting");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.finalize();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for CallController {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<TransportEvent>(&text) {
                Ok(TransportEvent::Connected { stream_id }) => {
                    self.handle_connected(stream_id, ctx);
                }
                Ok(TransportEvent::Media { media, .. }) => {
                    self.handle_media(&media.payload);
                }
                Ok(TransportEvent::Stop) => {
                    info!(call_id = %self.call_id, "Media stream stopped by transport");
                    self.begin_drain(ctx);
                }
                Err(e) => {
                    warn!(call_id = %self.call_id, "Unrecognized transport event: {}", e);
                }
            },
            Ok(ws::Message::Binary(_)) => {
                warn!(call_id = %self.call_id, "Unexpected binary frame from transport");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(call_id = %self.call_id, "Transport closed: {:?}", reason);
                self.begin_drain(ctx);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(call_id = %self.call_id, "Unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                // Receive-loop failure: Draining → Closed, cleanup still runs
                let err = AppError::Transport(e.to_string());
                error!(call_id = %self.call_id, "{}", err);
                self.begin_drain(ctx);
                ctx.stop();
            }
        }
    }
}

impl Handler<GreetingQueued> for CallController {
    type Result = ();

    fn handle(&mut self, _msg: GreetingQueued, _ctx: &mut Self::Context) {
        if self.phase == CallPhase::Connecting {
            self.phase = CallPhase::Active;
            info!(call_id = %self.call_id, "Call active");
        }
    }
}

impl Handler<OutboundMedia> for CallController {
    type Result = ();

    fn handle(&mut self, msg: OutboundMedia, ctx: &mut Self::Context) {
        if self.phase != CallPhase::Closed {
            ctx.text(msg.0);
        }
    }
}

impl Handler<RelayFinished> for CallController {
    type Result = ();

    fn handle(&mut self, _msg: RelayFinished, ctx: &mut Self::Context) {
        debug!(call_id = %self.call_id, "Outbound relay finished");
        self.relay_done = true;
        if self.phase == CallPhase::Draining {
            self.finish_close(ctx);
        }
    }
}

/// Open one direction's archive, degrading to no archive on failure.
fn open_archive(config: &AppConfig, call_id: &str, direction: Direction) -> Option<CallArchive> {
    if !config.archive.enabled {
        return None;
    }

    match CallArchive::create(
        Path::new(&config.archive.directory),
        call_id,
        direction,
        config.audio.sample_rate,
        config.audio.channels,
    ) {
        Ok(archive) => {
            debug!(call_id, path = %archive.path().display(), "Archive opened");
            Some(archive)
        }
        Err(e) => {
            warn!(call_id, "Archive unavailable for {} leg: {}", direction.as_str(), e);
            None
        }
    }
}

/// The speech pipeline task: appointment fetch, greeting, then one dialogue
/// turn per finalized transcript. Sole producer of the outbound queue: its
/// exit closes the queue, which lets the relay drain and finish.
async fn run_speech_pipeline(
    services: Arc<ServiceClients>,
    chunk_bytes: usize,
    mut session: CallSession,
    inbound: FrameReceiver,
    mut outbound: FrameSender,
    controller: Addr<CallController>,
) {
    match services.store.fetch(&session.appointment_id).await {
        Ok(Some(record)) => {
            info!(
                appointment_id = %session.appointment_id,
                language = %record.preferred_language.as_deref().unwrap_or("unset"),
                "Appointment record fetched"
            );
            session.apply_record(record);
        }
        Ok(None) => {
            warn!(appointment_id = %session.appointment_id, "No appointment record found");
        }
        Err(e) => {
            // Non-fatal: the call proceeds with the default language and a
            // generic greeting
            error!(appointment_id = %session.appointment_id, "Appointment fetch failed: {}", e);
        }
    }

    let profile = session.profile();

    let greeting = session.greeting_text();
    for frame in synthesize_chunks(services.synthesis.as_ref(), &greeting, profile, chunk_bytes).await
    {
        if outbound.send(frame).is_err() {
            break;
        }
    }
    controller.do_send(GreetingQueued);

    let policy = DialoguePolicy::new(services.reasoning.clone(), services.store.clone());
    let mut transcripts = services.recognition.start(profile, inbound);

    while let Some(transcript) = transcripts.recv().await {
        let decision = policy.decide(&transcript, &mut session).await;
        for frame in synthesize_chunks(
            services.synthesis.as_ref(),
            &decision.response_text,
            profile,
            chunk_bytes,
        )
        .await
        {
            if outbound.send(frame).is_err() {
                break;
            }
        }
    }

    outbound.finish();
    info!(
        call_id = %session.call_id,
        turns = session.history().len(),
        "Speech pipeline finished"
    );
}

/// The outbound relay task: every frame queued before the sentinel is
/// delivered to the transport (and the outbound archive) before the relay
/// reports completion.
async fn run_outbound_relay(
    mut outbound: FrameReceiver,
    mut archive: Option<CallArchive>,
    stream_id: String,
    controller: Addr<CallController>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Some(archive) = archive.as_mut() {
            if let Err(e) = archive.write_frame(&frame) {
                warn!(stream_id = %stream_id, "Outbound archive write failed: {}", e);
            }
        }
        controller.do_send(OutboundMedia(codec::encode_media(&stream_id, &frame)));
    }

    if let Some(mut archive) = archive.take() {
        if let Err(e) = archive.close() {
            warn!(stream_id = %stream_id, "Outbound archive close failed: {}", e);
        }
    }
    controller.do_send(RelayFinished);
}

/// WebSocket endpoint handler for the telephony media stream.
///
/// The routing collaborator passes the appointment id (and optionally a call
/// id) as query parameters; the call id is never derived from the stream id.
pub async fn call_stream(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .unwrap_or_else(|_| web::Query(HashMap::new()));

    let appointment_id = match query.get("appointment_id") {
        Some(id) if !id.is_empty() => id.clone(),
        _ => {
            warn!("Stream connection without appointment_id rejected");
            return Ok(HttpResponse::BadRequest().json(json!({
                "error": "appointment_id query parameter is required"
            })));
        }
    };

    let config = app_state.get_config();
    if app_state.active_calls() as usize >= config.calls.max_concurrent_calls {
        warn!(
            max = config.calls.max_concurrent_calls,
            "Concurrent call limit reached, rejecting stream"
        );
        return Ok(HttpResponse::ServiceUnavailable().json(json!({
            "error": "maximum concurrent calls reached"
        })));
    }

    let call_id = query
        .get("call_id")
        .cloned()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(%call_id, %appointment_id, "New call stream request");

    let controller = CallController::new(call_id, appointment_id, config, app_state);
    ws::start(controller, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_stream_requires_appointment_id() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/stream", web::get().to(call_stream)),
        )
        .await;

        let req = test::TestRequest::get().uri("/stream").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_stream_rejects_over_capacity() {
        let mut config = AppConfig::default();
        config.calls.max_concurrent_calls = 1;
        let state = web::Data::new(AppState::new(config));
        state.begin_call(); // occupy the only slot

        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/stream", web::get().to(call_stream)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/stream?appointment_id=apt-1")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_archive_disabled_yields_none() {
        let mut config = AppConfig::default();
        config.archive.enabled = false;
        assert!(open_archive(&config, "CA1", Direction::Inbound).is_none());
    }
}
