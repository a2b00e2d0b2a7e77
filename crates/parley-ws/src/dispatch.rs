//! Per-message dispatch (§4.1 "Per-message contracts"). Each handler is
//! gated by the per-connection rate limiter before it runs (§4.1
//! "Dispatch"); a rejection yields `error{code:RATE_LIMITED}` without
//! dropping the connection.

use parley_core::error::CoreError;
use parley_core::ratelimit::RateCategory;
use parley_core::registry::LiveConnection;
use parley_core::AppState;
use parley_db::{bans, channels, member_roles, roles, servers};
use parley_models::permissions::{EffectivePermissions, PermissionKey};
use parley_models::ws::{
    ClientMessage, E2eeKind, E2eeRelayPayload, ErrorCode, MediaType, ServerMessage,
    TransportDirection,
};
use parley_util::validation::MAX_CHAT_CIPHERTEXT_LEN;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub struct Ctx<'a> {
    pub state: &'a AppState,
    pub conn: &'a Arc<LiveConnection>,
}

fn error(code: ErrorCode, message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error {
        code,
        message: message.into(),
    }
}

/// §4.1 dispatch table: maps each post-auth message to its rate-limit
/// category. `Auth` never reaches here (handled in the Opened state).
fn rate_category(msg: &ClientMessage) -> Option<RateCategory> {
    Some(match msg {
        ClientMessage::Auth { .. } => return None,
        ClientMessage::Chat { .. } => RateCategory::Chat,
        ClientMessage::E2ee { .. } => RateCategory::E2ee,
        ClientMessage::Speaking { .. } => RateCategory::Speaking,
        ClientMessage::CreateTransport { .. }
        | ClientMessage::ConnectTransport { .. }
        | ClientMessage::Produce { .. }
        | ClientMessage::StopProducer { .. }
        | ClientMessage::Consume { .. }
        | ClientMessage::ResumeConsumer { .. }
        | ClientMessage::SetPreferredLayers { .. } => RateCategory::Media,
        _ => RateCategory::General,
    })
}

pub async fn handle(ctx: &Ctx<'_>, msg: ClientMessage) {
    let category = rate_category(&msg);
    if let Some(category) = category {
        if !ctx.conn.rate_limiter.check(category) {
            ctx.conn.send(error(ErrorCode::RateLimited, "rate limit exceeded"));
            return;
        }
    }

    let result = match msg {
        ClientMessage::Auth { .. } => {
            ctx.conn.send(error(ErrorCode::NotAuthenticated, "already authenticated"));
            Ok(())
        }
        ClientMessage::JoinChannel { channel_id } => handle_join_channel(ctx, channel_id).await,
        ClientMessage::LeaveChannel => handle_leave_channel(ctx).await,
        ClientMessage::Mute { muted } => handle_mute(ctx, muted).await,
        ClientMessage::Deafen { deafened } => handle_deafen(ctx, deafened).await,
        ClientMessage::RtpCapabilities { rtp_capabilities } => {
            handle_rtp_capabilities(ctx, rtp_capabilities).await
        }
        ClientMessage::CreateTransport { direction } => handle_create_transport(ctx, direction).await,
        ClientMessage::ConnectTransport {
            transport_id,
            dtls_parameters,
        } => handle_connect_transport(ctx, transport_id, dtls_parameters).await,
        ClientMessage::Produce {
            transport_id,
            kind,
            rtp_parameters,
            media_type,
        } => handle_produce(ctx, transport_id, kind, rtp_parameters, media_type).await,
        ClientMessage::StopProducer { producer_id } => handle_stop_producer(ctx, producer_id).await,
        ClientMessage::Consume { producer_id } => handle_consume(ctx, producer_id).await,
        ClientMessage::ResumeConsumer { consumer_id } => handle_resume_consumer(ctx, consumer_id).await,
        ClientMessage::SetPreferredLayers {
            consumer_id,
            spatial_layer,
            temporal_layer,
        } => handle_set_preferred_layers(ctx, consumer_id, spatial_layer, temporal_layer).await,
        ClientMessage::Chat {
            ciphertext,
            iv,
            key_epoch,
            encoding,
        } => handle_chat(ctx, ciphertext, iv, key_epoch, encoding).await,
        ClientMessage::E2ee { payload } => handle_e2ee(ctx, payload).await,
        ClientMessage::Speaking { speaking } => handle_speaking(ctx, speaking).await,
        ClientMessage::Kick { user_id, reason } => handle_kick(ctx, user_id, reason).await,
        ClientMessage::MoveUser { user_id, channel_id } => {
            handle_move_user(ctx, user_id, channel_id).await
        }
        ClientMessage::Ban { user_id, reason } => handle_ban(ctx, user_id, reason).await,
        ClientMessage::AssignRole { user_id, role_id } => {
            handle_assign_role(ctx, user_id, role_id, true).await
        }
        ClientMessage::UnassignRole { user_id, role_id } => {
            handle_assign_role(ctx, user_id, role_id, false).await
        }
    };

    if let Err(err) = result {
        tracing::error!(?err, user_id = ctx.conn.user_id, "dispatch failed");
        ctx.conn.send(error(ErrorCode::InternalError, "internal error"));
    }
}

async fn effective_permissions(
    ctx: &Ctx<'_>,
    channel_id: Option<i64>,
) -> Result<EffectivePermissions, CoreError> {
    if ctx.conn.is_admin.load(Ordering::Relaxed) {
        return Ok(EffectivePermissions::all_allow());
    }
    ctx.state
        .effective_permissions(ctx.conn.user_id, ctx.conn.server_id, channel_id)
        .await
}

/// §4.1 `join-channel` / the `move-user` "run the target through
/// join-channel semantics" reuse: leaves any current channel, checks
/// membership preconditions, enters the new channel, and sends the mover's
/// (or moved user's) `joined-channel` reply plus the channel/server
/// broadcasts. Returns the error code to surface on failure.
pub async fn perform_join_channel(
    state: &AppState,
    conn: &Arc<LiveConnection>,
    channel_id: i64,
) -> Result<(), ErrorCode> {
    let channel = channels::get_channel(&state.db, channel_id)
        .await
        .map_err(|_| ErrorCode::InternalError)?
        .ok_or(ErrorCode::ChannelNotFound)?;
    if channel.server_id != conn.server_id {
        return Err(ErrorCode::ChannelNotFound);
    }

    let perms = if conn.is_admin.load(Ordering::Relaxed) {
        EffectivePermissions::all_allow()
    } else {
        state
            .effective_permissions(conn.user_id, conn.server_id, Some(channel_id))
            .await
            .map_err(|_| ErrorCode::InternalError)?
    };
    if !perms.allows(PermissionKey::Join) {
        return Err(ErrorCode::NoPermission);
    }

    if channel.max_users > 0 {
        let current = state.event_bus.registry().channel_members(channel_id).len() as i64;
        if current >= channel.max_users {
            return Err(ErrorCode::ChannelFull);
        }
    }

    if let Some(previous) = conn.channel_id() {
        if previous != channel_id {
            leave_channel_effects(state, conn, previous).await;
        }
    }

    state.event_bus.registry().set_channel(conn.user_id, Some(channel_id));
    let router_rtp_capabilities = state.media.router_rtp_capabilities(channel_id);
    let users = state.event_bus.registry().channel_members(channel_id);

    conn.send(ServerMessage::JoinedChannel {
        channel_id,
        users,
        router_rtp_capabilities,
    });

    for (producer_user_id, producer_id, media_type) in
        state.media.producers_in_channel(channel_id, conn.user_id)
    {
        conn.send(ServerMessage::NewProducer {
            user_id: producer_user_id,
            producer_id,
            media_type,
        });
    }

    state.event_bus.to_channel(
        channel_id,
        Some(conn.user_id),
        ServerMessage::UserJoinedChannel {
            channel_id,
            user_id: conn.user_id,
        },
    );
    state.event_bus.to_server(
        conn.server_id,
        Some(conn.user_id),
        ServerMessage::UserUpdated {
            user_id: conn.user_id,
            channel_id: Some(channel_id),
            is_muted: None,
            is_deafened: None,
        },
    );

    Ok(())
}

/// §4.1 `leave-channel` body, also used for disconnect cleanup and for the
/// "leave any current channel first" step of `join-channel`.
pub async fn leave_channel_effects(state: &AppState, conn: &Arc<LiveConnection>, channel_id: i64) {
    for producer_id in state.media.remove_peer(channel_id, conn.user_id) {
        state.event_bus.to_channel(
            channel_id,
            None,
            ServerMessage::ProducerClosed {
                user_id: conn.user_id,
                producer_id,
            },
        );
    }
    state.event_bus.registry().set_channel(conn.user_id, None);
    state.event_bus.to_channel(
        channel_id,
        Some(conn.user_id),
        ServerMessage::UserLeftChannel {
            channel_id,
            user_id: conn.user_id,
        },
    );
    state.event_bus.to_server(
        conn.server_id,
        Some(conn.user_id),
        ServerMessage::UserUpdated {
            user_id: conn.user_id,
            channel_id: None,
            is_muted: None,
            is_deafened: None,
        },
    );
}

async fn handle_join_channel(ctx: &Ctx<'_>, channel_id: i64) -> Result<(), CoreError> {
    if let Err(code) = perform_join_channel(ctx.state, ctx.conn, channel_id).await {
        ctx.conn.send(error(code, "cannot join that channel"));
    }
    Ok(())
}

async fn handle_leave_channel(ctx: &Ctx<'_>) -> Result<(), CoreError> {
    let Some(channel_id) = ctx.conn.channel_id() else {
        ctx.conn.send(error(ErrorCode::NotInChannel, "not in a channel"));
        return Ok(());
    };
    leave_channel_effects(ctx.state, ctx.conn, channel_id).await;
    Ok(())
}

async fn handle_mute(ctx: &Ctx<'_>, muted: bool) -> Result<(), CoreError> {
    ctx.conn.is_muted.store(muted, Ordering::Relaxed);
    ctx.state.event_bus.to_server(
        ctx.conn.server_id,
        Some(ctx.conn.user_id),
        ServerMessage::UserUpdated {
            user_id: ctx.conn.user_id,
            channel_id: ctx.conn.channel_id(),
            is_muted: Some(muted),
            is_deafened: None,
        },
    );
    Ok(())
}

async fn handle_deafen(ctx: &Ctx<'_>, deafened: bool) -> Result<(), CoreError> {
    ctx.conn.is_deafened.store(deafened, Ordering::Relaxed);
    ctx.state.event_bus.to_server(
        ctx.conn.server_id,
        Some(ctx.conn.user_id),
        ServerMessage::UserUpdated {
            user_id: ctx.conn.user_id,
            channel_id: ctx.conn.channel_id(),
            is_muted: None,
            is_deafened: Some(deafened),
        },
    );
    Ok(())
}

async fn handle_rtp_capabilities(ctx: &Ctx<'_>, rtp_capabilities: serde_json::Value) -> Result<(), CoreError> {
    let Some(channel_id) = ctx.conn.channel_id() else {
        ctx.conn.send(error(ErrorCode::NotInChannel, "not in a channel"));
        return Ok(());
    };
    ctx.state.media.set_rtp_capabilities(channel_id, ctx.conn.user_id, rtp_capabilities);
    Ok(())
}

async fn handle_create_transport(ctx: &Ctx<'_>, direction: TransportDirection) -> Result<(), CoreError> {
    let Some(channel_id) = ctx.conn.channel_id() else {
        ctx.conn.send(error(ErrorCode::NotInChannel, "not in a channel"));
        return Ok(());
    };
    let created = ctx.state.media.create_transport(channel_id, ctx.conn.user_id, direction);
    ctx.conn.send(ServerMessage::TransportCreated {
        transport_id: created.transport_id,
        ice_parameters: created.ice_parameters,
        ice_candidates: created.ice_candidates,
        dtls_parameters: created.dtls_parameters,
    });
    Ok(())
}

async fn handle_connect_transport(
    ctx: &Ctx<'_>,
    transport_id: String,
    dtls_parameters: serde_json::Value,
) -> Result<(), CoreError> {
    let Some(channel_id) = ctx.conn.channel_id() else {
        ctx.conn.send(error(ErrorCode::NotInChannel, "not in a channel"));
        return Ok(());
    };
    if ctx
        .state
        .media
        .connect_transport(channel_id, ctx.conn.user_id, &transport_id, dtls_parameters)
        .is_err()
    {
        ctx.conn.send(error(ErrorCode::InternalError, "unknown transport"));
    }
    Ok(())
}

fn media_permission(media_type: MediaType) -> PermissionKey {
    match media_type {
        MediaType::Mic => PermissionKey::Speak,
        MediaType::Webcam => PermissionKey::Video,
        MediaType::Screen | MediaType::ScreenAudio => PermissionKey::ScreenShare,
    }
}

async fn handle_produce(
    ctx: &Ctx<'_>,
    transport_id: String,
    kind: String,
    rtp_parameters: serde_json::Value,
    media_type: MediaType,
) -> Result<(), CoreError> {
    let Some(channel_id) = ctx.conn.channel_id() else {
        ctx.conn.send(error(ErrorCode::NotInChannel, "not in a channel"));
        return Ok(());
    };

    let perms = effective_permissions(ctx, Some(channel_id)).await?;
    if !perms.allows(media_permission(media_type)) {
        ctx.conn.send(error(ErrorCode::NoPermission, "missing media permission"));
        return Ok(());
    }

    if matches!(media_type, MediaType::Webcam | MediaType::Screen | MediaType::ScreenAudio) {
        let server = servers::get_server(&ctx.state.db, ctx.conn.server_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        let cap = match media_type {
            MediaType::Webcam => server.max_webcam_producers,
            _ => server.max_screen_producers,
        };
        if cap > 0 && ctx.state.media.count_media_type(channel_id, media_type) as i64 >= cap {
            ctx.conn.send(error(ErrorCode::ProducerLimit, "producer cap reached"));
            return Ok(());
        }
    }

    match ctx.state.media.produce(
        channel_id,
        ctx.conn.user_id,
        &transport_id,
        &kind,
        rtp_parameters,
        media_type,
    ) {
        Ok(produced) => {
            ctx.conn.send(ServerMessage::Produced {
                producer_id: produced.producer_id.clone(),
                media_type,
            });
            ctx.state.event_bus.to_channel(
                channel_id,
                Some(ctx.conn.user_id),
                ServerMessage::NewProducer {
                    user_id: ctx.conn.user_id,
                    producer_id: produced.producer_id,
                    media_type,
                },
            );
        }
        Err(_) => {
            ctx.conn.send(error(ErrorCode::InternalError, "unknown transport"));
        }
    }
    Ok(())
}

async fn handle_stop_producer(ctx: &Ctx<'_>, producer_id: String) -> Result<(), CoreError> {
    let Some(channel_id) = ctx.conn.channel_id() else {
        ctx.conn.send(error(ErrorCode::NotInChannel, "not in a channel"));
        return Ok(());
    };
    if ctx
        .state
        .media
        .stop_producer(channel_id, ctx.conn.user_id, &producer_id)
        .is_some()
    {
        ctx.state.event_bus.to_channel(
            channel_id,
            None,
            ServerMessage::ProducerClosed {
                user_id: ctx.conn.user_id,
                producer_id,
            },
        );
    }
    Ok(())
}

async fn handle_consume(ctx: &Ctx<'_>, producer_id: String) -> Result<(), CoreError> {
    let Some(channel_id) = ctx.conn.channel_id() else {
        ctx.conn.send(error(ErrorCode::NotInChannel, "not in a channel"));
        return Ok(());
    };
    match ctx.state.media.consume(channel_id, ctx.conn.user_id, &producer_id) {
        Ok(result) => {
            ctx.conn.send(ServerMessage::ConsumeResult {
                consumer_id: result.consumer_id,
                producer_id,
                kind: result.kind,
                rtp_parameters: result.rtp_parameters,
            });
        }
        Err(parley_media::MediaError::NotReady) => {
            ctx.conn.send(error(ErrorCode::NotReady, "rtp capabilities not set"));
        }
        Err(_) => {
            ctx.conn.send(error(ErrorCode::CannotConsume, "producer cannot be consumed"));
        }
    }
    Ok(())
}

async fn handle_resume_consumer(ctx: &Ctx<'_>, consumer_id: String) -> Result<(), CoreError> {
    let Some(channel_id) = ctx.conn.channel_id() else {
        ctx.conn.send(error(ErrorCode::NotInChannel, "not in a channel"));
        return Ok(());
    };
    if ctx
        .state
        .media
        .resume_consumer(channel_id, ctx.conn.user_id, &consumer_id)
        .is_err()
    {
        ctx.conn.send(error(ErrorCode::InternalError, "unknown consumer"));
    }
    Ok(())
}

async fn handle_set_preferred_layers(
    ctx: &Ctx<'_>,
    consumer_id: String,
    spatial_layer: i32,
    temporal_layer: Option<i32>,
) -> Result<(), CoreError> {
    let Some(channel_id) = ctx.conn.channel_id() else {
        ctx.conn.send(error(ErrorCode::NotInChannel, "not in a channel"));
        return Ok(());
    };
    let spatial = spatial_layer.clamp(0, 2);
    let temporal = temporal_layer.map(|t| t.clamp(0, 2));
    if ctx
        .state
        .media
        .set_preferred_layers(channel_id, ctx.conn.user_id, &consumer_id, spatial, temporal)
        .is_err()
    {
        ctx.conn.send(error(ErrorCode::InternalError, "unknown consumer"));
    }
    Ok(())
}

async fn handle_chat(
    ctx: &Ctx<'_>,
    ciphertext: String,
    iv: String,
    key_epoch: i64,
    encoding: Option<String>,
) -> Result<(), CoreError> {
    let Some(channel_id) = ctx.conn.channel_id() else {
        ctx.conn.send(error(ErrorCode::NotInChannel, "not in a channel"));
        return Ok(());
    };
    if ciphertext.len() > MAX_CHAT_CIPHERTEXT_LEN {
        ctx.conn.send(error(ErrorCode::ChatTooLarge, "ciphertext too large"));
        return Ok(());
    }
    let encoding = encoding.unwrap_or_else(|| "text".to_string());

    let stored = parley_db::chat::insert_message(
        &ctx.state.db,
        parley_util::snowflake::generate(1),
        ctx.conn.server_id,
        channel_id,
        ctx.conn.user_id,
        &ciphertext,
        &iv,
        key_epoch,
        &encoding,
    )
    .await?;

    ctx.state.event_bus.to_channel(
        channel_id,
        None,
        ServerMessage::Chat {
            user_id: ctx.conn.user_id,
            channel_id,
            ciphertext: stored.ciphertext,
            iv: stored.iv,
            key_epoch: stored.key_epoch,
            encoding: stored.encoding,
            timestamp: stored.created_at,
        },
    );
    Ok(())
}

/// §4.5 E2EE relay: opaque beyond `kind` and (where applicable)
/// `targetUserId`. Cross-server delivery is structurally impossible since
/// unicast only ever resolves targets through the session registry and
/// compares `serverId`.
async fn handle_e2ee(ctx: &Ctx<'_>, payload: E2eeRelayPayload) -> Result<(), CoreError> {
    let relay = || ServerMessage::E2ee {
        from_user_id: ctx.conn.user_id,
        payload: payload.clone(),
    };

    let unicast = |target_user_id: i64| {
        if let Some(target) = ctx.state.event_bus.registry().get(target_user_id) {
            if target.server_id == ctx.conn.server_id {
                ctx.state.event_bus.to_user(target_user_id, relay());
            }
        }
    };

    match payload.kind {
        E2eeKind::PublicKeyAnnounce => {
            if let Some(target_user_id) = payload.target_user_id {
                unicast(target_user_id);
            } else if let Some(channel_id) = ctx.conn.channel_id() {
                ctx.state
                    .event_bus
                    .to_channel(channel_id, Some(ctx.conn.user_id), relay());
            }
        }
        E2eeKind::EncryptedChannelKey
        | E2eeKind::VerificationRequest
        | E2eeKind::VerificationConfirm => {
            if let Some(target_user_id) = payload.target_user_id {
                unicast(target_user_id);
            }
        }
        E2eeKind::KeyRatchet => {
            if let Some(channel_id) = ctx.conn.channel_id() {
                ctx.state
                    .event_bus
                    .to_channel(channel_id, Some(ctx.conn.user_id), relay());
            }
        }
    }
    Ok(())
}

async fn handle_speaking(ctx: &Ctx<'_>, speaking: bool) -> Result<(), CoreError> {
    if let Some(channel_id) = ctx.conn.channel_id() {
        ctx.state.event_bus.to_channel(
            channel_id,
            Some(ctx.conn.user_id),
            ServerMessage::Speaking {
                user_id: ctx.conn.user_id,
                speaking,
            },
        );
    }
    Ok(())
}

/// A moderation target must currently be connected to this server; the
/// hub has no concept of acting on an offline member (§4.1 treats kick,
/// ban, and move as live-connection operations).
fn require_online_target(ctx: &Ctx<'_>, user_id: i64) -> Option<Arc<LiveConnection>> {
    let target = ctx.state.event_bus.registry().get(user_id)?;
    if target.server_id != ctx.conn.server_id {
        return None;
    }
    Some(target)
}

async fn handle_kick(ctx: &Ctx<'_>, user_id: i64, reason: Option<String>) -> Result<(), CoreError> {
    let perms = effective_permissions(ctx, None).await?;
    if !perms.allows(PermissionKey::Kick) {
        ctx.conn.send(error(ErrorCode::NoPermission, "missing kick permission"));
        return Ok(());
    }
    let Some(target) = require_online_target(ctx, user_id) else {
        ctx.conn.send(error(ErrorCode::NotInServer, "target is not on this server"));
        return Ok(());
    };

    ctx.state.event_bus.to_user(
        user_id,
        ServerMessage::UserKicked {
            user_id,
            reason: reason.clone(),
        },
    );
    ctx.state.event_bus.to_server(
        ctx.conn.server_id,
        Some(user_id),
        ServerMessage::UserKicked { user_id, reason },
    );
    target.request_close();
    Ok(())
}

async fn handle_move_user(ctx: &Ctx<'_>, user_id: i64, channel_id: i64) -> Result<(), CoreError> {
    let perms = effective_permissions(ctx, None).await?;
    if !perms.allows(PermissionKey::MoveUsers) {
        ctx.conn.send(error(ErrorCode::NoPermission, "missing moveUsers permission"));
        return Ok(());
    }
    let Some(target) = require_online_target(ctx, user_id) else {
        ctx.conn.send(error(ErrorCode::NotInServer, "target is not on this server"));
        return Ok(());
    };

    if perform_join_channel(ctx.state, &target, channel_id).await.is_ok() {
        ctx.state.event_bus.to_server(
            ctx.conn.server_id,
            None,
            ServerMessage::UserMoved { user_id, channel_id },
        );
    } else {
        ctx.conn.send(error(ErrorCode::ChannelNotFound, "cannot move user to that channel"));
    }
    Ok(())
}

async fn handle_ban(ctx: &Ctx<'_>, user_id: i64, reason: Option<String>) -> Result<(), CoreError> {
    let perms = effective_permissions(ctx, None).await?;
    if !perms.allows(PermissionKey::Ban) {
        ctx.conn.send(error(ErrorCode::NoPermission, "missing ban permission"));
        return Ok(());
    }
    let Some(target) = require_online_target(ctx, user_id) else {
        ctx.conn.send(error(ErrorCode::NotInServer, "target is not on this server"));
        return Ok(());
    };

    bans::create_ban(
        &ctx.state.db,
        parley_util::snowflake::generate(1),
        ctx.conn.server_id,
        user_id,
        ctx.conn.user_id,
        reason.as_deref(),
    )
    .await?;

    ctx.state.event_bus.to_user(
        user_id,
        ServerMessage::UserBanned {
            user_id,
            reason: reason.clone(),
        },
    );
    ctx.state.event_bus.to_server(
        ctx.conn.server_id,
        Some(user_id),
        ServerMessage::UserBanned { user_id, reason },
    );
    target.request_close();
    Ok(())
}

async fn handle_assign_role(
    ctx: &Ctx<'_>,
    user_id: i64,
    role_id: i64,
    assign: bool,
) -> Result<(), CoreError> {
    let perms = effective_permissions(ctx, None).await?;
    if !perms.allows(PermissionKey::ManageRoles) {
        ctx.conn.send(error(ErrorCode::NoPermission, "missing manageRoles permission"));
        return Ok(());
    }
    match roles::get_role(&ctx.state.db, role_id).await? {
        Some(role) if role.server_id == ctx.conn.server_id => {}
        _ => {
            ctx.conn.send(error(ErrorCode::InternalError, "unknown role"));
            return Ok(());
        }
    }

    if assign {
        member_roles::assign_role(&ctx.state.db, user_id, ctx.conn.server_id, role_id).await?;
    } else {
        member_roles::unassign_role(&ctx.state.db, user_id, ctx.conn.server_id, role_id).await?;
    }
    ctx.state.invalidate_permissions_for(user_id);

    ctx.state.event_bus.to_server(
        ctx.conn.server_id,
        None,
        ServerMessage::RoleAssigned {
            user_id,
            role_id,
            assigned: assign,
        },
    );

    if ctx.state.event_bus.registry().get(user_id).is_some() {
        let updated = parley_core::permissions::compute_effective_permissions(
            &ctx.state.db,
            user_id,
            ctx.conn.server_id,
            None,
        )
        .await?;
        ctx.state
            .event_bus
            .to_user(user_id, ServerMessage::PermissionsUpdated { permissions: updated });
    }
    Ok(())
}
