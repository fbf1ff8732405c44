//! Inbound frame dispatch.
//!
//! Every frame the read loop decodes goes through [`Dispatcher::dispatch`]:
//! solicited responses complete the outstanding request with their serial,
//! unsolicited events are matched over the closed [`EventType`] set and
//! turned into registration updates plus a [`Notice`].
//!
//! Nothing here returns an error to the read loop. Malformed frames,
//! unknown serials, unknown events and events for registrations that are
//! already gone are logged and dropped.

use std::sync::Arc;

use bytes::Bytes;

use crate::client::ClientCore;
use crate::codec::PayloadReader;
use crate::error::{CneError, Result};
use crate::notify::Notice;
use crate::protocol::{EventType, Frame, InboundMessage, Rat, STATUS_SUCCESS};
use crate::registration::{FlowId, QosState, RegistrationId};
use crate::request::Response;

/// Routes inbound frames for one client.
pub(crate) struct Dispatcher {
    core: Arc<ClientCore>,
}

impl Dispatcher {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }

    /// Handle one frame.
    pub(crate) fn dispatch(&self, frame: Frame) {
        match frame.classify() {
            Ok(InboundMessage::Solicited {
                serial,
                status,
                body,
            }) => self.on_response(serial, status, body),
            Ok(InboundMessage::Unsolicited { event, body }) => self.on_event(event, body),
            Err(e) => {
                tracing::warn!("Dropping malformed frame ({} bytes): {}", frame.payload_len(), e);
            }
        }
    }

    fn on_response(&self, serial: u32, status: i32, body: Bytes) {
        let Some(req) = self.core.outstanding.take(serial) else {
            tracing::warn!(
                "Response for unknown serial {} (status {}), dropping",
                serial,
                status
            );
            return;
        };

        let request = req.request_type();
        tracing::debug!(
            "{:?} (serial {}) answered with status {} after {:?}",
            request,
            serial,
            status,
            req.age()
        );
        let outcome = if status == STATUS_SUCCESS {
            Ok(Response {
                request_type: request,
                serial,
                body,
            })
        } else {
            Err(CneError::RequestFailed { request, status })
        };
        self.core.complete(req, outcome);
    }

    fn on_event(&self, code: i32, body: Bytes) {
        let Some(event) = EventType::from_code(code) else {
            tracing::warn!("Unknown event type {}, dropping", code);
            return;
        };
        let mut reader = PayloadReader::new(body);
        match self.handle_event(event, &mut reader) {
            Ok(Some(notice)) => self.core.notify(notice),
            Ok(None) => {}
            Err(e) => tracing::warn!("Dropping malformed {:?} event: {}", event, e),
        }
    }

    /// Apply an event to the registration table. Returns the notice to
    /// emit, or `None` when the event no longer applies.
    fn handle_event(&self, event: EventType, reader: &mut PayloadReader) -> Result<Option<Notice>> {
        match event {
            EventType::RatLost => {
                let registration = RegistrationId(reader.get_u32()?);
                let rat = Rat::from_code(reader.get_i32()?);
                let changed = self.core.registrations.lock().rat_lost(registration, rat);
                if !changed {
                    tracing::debug!("RatLost({:?}) for {} does not apply", rat, registration);
                    return Ok(None);
                }
                Ok(Some(Notice::LinkLost { registration, rat }))
            }
            EventType::MorePreferredRatAvailable => {
                let registration = RegistrationId(reader.get_u32()?);
                let rat = Rat::from_code(reader.get_i32()?);
                let offered = self
                    .core
                    .registrations
                    .lock()
                    .offer_better_link(registration, rat);
                if !offered {
                    tracing::debug!("Better link {:?} for {} not applicable", rat, registration);
                    return Ok(None);
                }
                Ok(Some(Notice::BetterLinkAvailable { registration, rat }))
            }
            EventType::BringRatUp | EventType::BringRatDown => {
                let rat = Rat::from_code(reader.get_i32()?);
                Ok(Some(Notice::RatCommand {
                    rat,
                    up: event == EventType::BringRatUp,
                }))
            }
            EventType::QosStatus => {
                let flow = FlowId(reader.get_u32()?);
                let code = reader.get_i32()?;
                let state = QosState::from_code(code)
                    .ok_or_else(|| CneError::Protocol(format!("Unknown QoS status {}", code)))?;
                let owner = self.core.registrations.lock().qos_mut().update(flow, state);
                let Some(registration) = owner else {
                    tracing::debug!("QoS status for untracked {}", flow);
                    return Ok(None);
                };
                Ok(Some(Notice::QosStatus {
                    registration,
                    flow,
                    state,
                }))
            }
        }
    }
}
