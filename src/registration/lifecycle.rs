//! Registration lifecycle: register, link decisions, QoS, release.
//!
//! ```text
//! PendingRegister ──RegisterRole ok──► Active ──release / peer death──► PendingDeregister ──► gone
//!        │                               │                                                    ▲
//!        └────────── failure ────────────┴───────────── transport reset ─────────────────────┘
//! ```
//!
//! Table mutations happen under the registration lock; round trips happen
//! after it is released. A registration that disappears while a round trip
//! is in flight makes the follow-up a logged no-op.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::liveness::{self, PeerHandle};
use super::qos::{FlowId, QosSpec};
use super::table::{CompatibleRats, Confirmation, RegistrationId, RegistrationState, RoleRequest};
use crate::client::ClientCore;
use crate::error::{CneError, Result};
use crate::notify::{LossReason, Notice};
use crate::protocol::{Rat, RequestType};

/// Add a registration and start completing it in the background.
pub(crate) fn register(
    core: &Arc<ClientCore>,
    role: RoleRequest,
    peer: PeerHandle,
) -> Result<RegistrationId> {
    if core.shutdown.is_cancelled() {
        return Err(CneError::Shutdown);
    }
    let role_code = role.role;
    let unbind = CancellationToken::new();
    let id = core.registrations.lock().insert(role, unbind.clone());
    liveness::spawn_watch(Arc::downgrade(core), id, peer, unbind);
    tracing::info!("Registering {} for role {}", id, role_code);

    let task_core = core.clone();
    tokio::spawn(async move {
        if let Err(e) = complete_registration(&task_core, id).await {
            registration_failed(&task_core, id, e).await;
        }
    });
    Ok(id)
}

/// `RegisterRole`, then `GetCompatibleRats`, then announce the link.
async fn complete_registration(core: &Arc<ClientCore>, id: RegistrationId) -> Result<()> {
    let role = core
        .registrations
        .lock()
        .get(id)
        .map(|r| r.role().clone())
        .ok_or(CneError::UnknownRegistration(id))?;

    core.call(RequestType::RegisterRole, |w| role.encode(id, w))
        .await?;
    core.registrations.lock().activate(id)?;

    let response = core
        .call(RequestType::GetCompatibleRats, |w| {
            w.put_i32(id.code());
        })
        .await?;
    let options = CompatibleRats::decode(response.reader())?;
    let rat = core.registrations.lock().apply_candidates(id, options)?;

    tracing::info!("{} active on {:?}", id, rat);
    core.notify(Notice::LinkAvailable {
        registration: id,
        rat,
    });
    Ok(())
}

async fn registration_failed(core: &Arc<ClientCore>, id: RegistrationId, error: CneError) {
    let state = core.registrations.lock().get(id).map(|r| r.state());
    let accepted = match state {
        Some(RegistrationState::PendingRegister) => false,
        Some(RegistrationState::Active) => true,
        _ => {
            tracing::debug!("{} went away while registering: {}", id, error);
            return;
        }
    };

    tracing::warn!("Registration {} failed: {}", id, error);
    // Only a role the daemon accepted needs deregistering.
    match deregister(core, id, accepted).await {
        Ok(true) => core.notify(Notice::RegistrationFailed {
            registration: id,
            reason: error.to_string(),
        }),
        Ok(false) => {}
        Err(e) => tracing::debug!("{} already being released: {}", id, e),
    }
}

/// Release path shared by explicit release and peer death.
pub(crate) async fn release(
    core: &Arc<ClientCore>,
    id: RegistrationId,
    reason: LossReason,
) -> Result<()> {
    if deregister(core, id, true).await? {
        tracing::info!("{} released ({:?})", id, reason);
        core.notify(Notice::RegistrationLost {
            registration: id,
            reason,
        });
    }
    Ok(())
}

/// `-> PendingDeregister`, optional `DeregisterRole` round trip, teardown.
/// Returns false if something else (a transport reset) removed the
/// registration meanwhile.
async fn deregister(core: &Arc<ClientCore>, id: RegistrationId, round_trip: bool) -> Result<bool> {
    core.registrations.lock().begin_deregister(id)?;

    if round_trip {
        let result = core
            .call(RequestType::DeregisterRole, |w| {
                w.put_i32(id.code());
            })
            .await;
        if let Err(e) = result {
            tracing::debug!("DeregisterRole for {} failed: {}", id, e);
        }
    }

    Ok(core.registrations.lock().remove(id).is_some())
}

/// Send `ConfirmRat` and apply the decision once the daemon accepts it.
/// A rejected or timed-out confirmation leaves the registration as it was.
async fn confirm(core: &ClientCore, id: RegistrationId, decision: Confirmation) -> Result<Rat> {
    core.call(RequestType::ConfirmRat, |w| {
        w.put_i32(id.code())
            .put_i32(decision.rat.code())
            .put_bool(decision.satisfied);
    })
    .await?;
    core.registrations.lock().commit(id, decision)?;
    Ok(decision.rat)
}

pub(crate) async fn report_link_satisfaction(
    core: &Arc<ClientCore>,
    id: RegistrationId,
    satisfied: bool,
) -> Result<Rat> {
    let decision = core.registrations.lock().link_satisfaction(id, satisfied)?;
    if !satisfied {
        tracing::info!("{} not satisfied, trying {:?}", id, decision.rat);
    }
    confirm(core, id, decision).await
}

pub(crate) async fn switch_link(core: &Arc<ClientCore>, id: RegistrationId) -> Result<Rat> {
    let decision = core.registrations.lock().accept_switch(id)?;
    confirm(core, id, decision).await
}

pub(crate) async fn reject_switch(core: &Arc<ClientCore>, id: RegistrationId) -> Result<Rat> {
    let decision = core.registrations.lock().reject_switch(id)?;
    confirm(core, id, decision).await
}

/// Request a flow; the granted flow is tracked under `id`.
pub(crate) async fn request_qos(
    core: &Arc<ClientCore>,
    id: RegistrationId,
    spec: QosSpec,
) -> Result<FlowId> {
    core.registrations.lock().ensure_active(id)?;

    let response = core
        .call(RequestType::RequestQosFlow, |w| {
            w.put_i32(id.code());
            spec.encode(w);
        })
        .await?;
    let flow = FlowId(response.reader().get_u32()?);

    let tracked = core.registrations.lock().track_qos(id, flow, spec);
    if let Err(e) = tracked {
        tracing::debug!("{} went away before {} was tracked, releasing it", id, flow);
        if let Err(release_err) = send_release_qos(core, id, flow).await {
            tracing::debug!("Releasing orphaned {}: {}", flow, release_err);
        }
        return Err(e);
    }
    tracing::debug!("{} granted {}", id, flow);
    Ok(flow)
}

pub(crate) async fn release_qos(core: &Arc<ClientCore>, id: RegistrationId, flow: FlowId) -> Result<()> {
    {
        let table = core.registrations.lock();
        if !table.contains(id) {
            return Err(CneError::UnknownRegistration(id));
        }
        match table.qos().get(flow) {
            Some(tracker) if tracker.registration == id => {}
            _ => return Err(CneError::UnknownQosFlow(flow)),
        }
    }

    send_release_qos(core, id, flow).await?;
    core.registrations.lock().qos_mut().remove_owned(id, flow);
    Ok(())
}

async fn send_release_qos(core: &ClientCore, id: RegistrationId, flow: FlowId) -> Result<()> {
    core.call(RequestType::ReleaseQosFlow, |w| {
        w.put_i32(id.code()).put_u32(flow.0);
    })
    .await
    .map(|_| ())
}
