//! Per-connection protocol state machine (§4.1): Opened -> Authenticated
//! (server-attached) -> In-channel -> Closed. One task per connection, owns
//! the split socket halves and the connection's `LiveConnection` for the
//! lifetime of the task; cleanup runs exactly once, at the bottom of
//! `handle_connection`, regardless of why the loop exited.
//!
//! Grounded on the teacher's `paracord-ws::handler::handle_connection`
//! structure (split socket, `tokio::select!` merging inbound frames,
//! outbound mpsc, ping interval, forced-close signal) generalized to this
//! system's tagged-JSON protocol instead of Discord-gateway opcodes.

use crate::dispatch::{self, Ctx};
use axum::extract::ws::{Message, WebSocket};
use axum::http::HeaderMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_core::error::CoreError;
use parley_core::observability;
use parley_core::registry::LiveConnection;
use parley_core::{auth as core_auth, bootstrap, invites, AppState};
use parley_db::{bans, channels, members, roles};
use parley_models::permissions::EffectivePermissions;
use parley_models::ws::{ChannelSummary, ClientMessage, ErrorCode, MemberSummary, ServerMessage};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Every 15 s the hub pings each socket (§4.1 "Heartbeat", §5 "Timeouts").
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const KNOWN_CLIENT_TYPES: &[&str] = &[
    "auth",
    "join-channel",
    "leave-channel",
    "mute",
    "deafen",
    "rtp-capabilities",
    "create-transport",
    "connect-transport",
    "produce",
    "stop-producer",
    "consume",
    "resume-consumer",
    "set-preferred-layers",
    "chat",
    "e2ee",
    "speaking",
    "kick",
    "move-user",
    "ban",
    "assign-role",
    "unassign-role",
];

enum ParseOutcome {
    Invalid,
    Unknown,
}

fn parse_client_message(text: &str) -> Result<ClientMessage, ParseOutcome> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|_| ParseOutcome::Invalid)?;
    match serde_json::from_value::<ClientMessage>(value.clone()) {
        Ok(msg) => Ok(msg),
        Err(_) => {
            let known = value
                .get("type")
                .and_then(|t| t.as_str())
                .map(|t| KNOWN_CLIENT_TYPES.contains(&t))
                .unwrap_or(false);
            Err(if known {
                ParseOutcome::Invalid
            } else {
                ParseOutcome::Unknown
            })
        }
    }
}

/// Resolves the key the pre-auth rate limiter uses for this socket (§4.1
/// "configurable trust-proxy flag selects header vs socket address", §6
/// `trustProxy`). Falls back to the socket address if `trustProxy` is set
/// but the header is absent or empty.
pub fn remote_key(trust_proxy: bool, headers: &HeaderMap, addr: SocketAddr) -> String {
    if trust_proxy {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return forwarded.to_string();
        }
    }
    addr.ip().to_string()
}

fn to_message(msg: &ServerMessage) -> Message {
    Message::Text(serde_json::to_string(msg).expect("ServerMessage always serializes").into())
}

async fn send_raw(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) {
    let _ = sender.send(to_message(msg)).await;
}

pub async fn handle_connection(socket: WebSocket, state: AppState, remote_key: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let Some(conn) = authenticate(&mut receiver, &mut sender, &state, &remote_key, tx).await else {
        let _ = sender.close().await;
        return;
    };

    if let Some(displaced) = state.event_bus.registry().insert(conn.clone()) {
        displaced.request_close();
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so we don't ping before the
    // client has had a chance to breathe.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if observability::wire_trace_enabled() {
                            tracing::trace!(target: "wire", user_id = conn.user_id, "outbound frame");
                        }
                        if sender.send(to_message(&msg)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = conn.wait_for_close() => {
                break;
            }
            _ = heartbeat.tick() => {
                if !conn.alive.swap(false, Ordering::SeqCst) {
                    tracing::debug!(user_id = conn.user_id, "heartbeat timeout, force-closing");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if observability::wire_trace_enabled() {
                            tracing::trace!(target: "wire", user_id = conn.user_id, frame = %observability::preview(&text), "inbound frame");
                        }
                        match parse_client_message(&text) {
                            Ok(msg) => {
                                let ctx = Ctx { state: &state, conn: &conn };
                                dispatch::handle(&ctx, msg).await;
                            }
                            Err(ParseOutcome::Invalid) => {
                                conn.send(ServerMessage::Error {
                                    code: ErrorCode::InvalidJson,
                                    message: "malformed frame".into(),
                                });
                            }
                            Err(ParseOutcome::Unknown) => {
                                conn.send(ServerMessage::Error {
                                    code: ErrorCode::UnknownMessage,
                                    message: "unrecognized message type".into(),
                                });
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        conn.send(ServerMessage::Error {
                            code: ErrorCode::InvalidJson,
                            message: "binary frames are not supported".into(),
                        });
                    }
                    Some(Ok(Message::Pong(_))) => {
                        conn.alive.store(true, Ordering::SeqCst);
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Close(_))) => {}
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    cleanup(&state, &conn).await;
}

/// §4.1 Disconnect cleanup: unconditional and idempotent, driven from the
/// single exit point of the connection's select loop above so it always
/// runs exactly once, on graceful close, forced kick/ban, or heartbeat
/// timeout alike (§5 "Cancellation").
async fn cleanup(state: &AppState, conn: &Arc<LiveConnection>) {
    if let Some(channel_id) = conn.channel_id() {
        dispatch::leave_channel_effects(state, conn, channel_id).await;
    }
    state.event_bus.registry().remove(conn.user_id);
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

/// Runs the Opened-state loop: everything but `auth` fails with
/// NOT_AUTHENTICATED and is ignored (the connection stays Opened); `auth`
/// runs the full algorithm in §4.1. Returns `None` once a terminal outcome
/// (rate-limited, rejected, or socket closed) has already been communicated
/// to the client, if applicable.
async fn authenticate(
    receiver: &mut SplitStream<WebSocket>,
    sender: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
    remote_key: &str,
    tx: mpsc::UnboundedSender<ServerMessage>,
) -> Option<Arc<LiveConnection>> {
    loop {
        let text = match receiver.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        };

        let parsed = match parse_client_message(&text) {
            Ok(msg) => msg,
            Err(ParseOutcome::Invalid) => {
                send_raw(
                    sender,
                    &ServerMessage::Error {
                        code: ErrorCode::InvalidJson,
                        message: "malformed frame".into(),
                    },
                )
                .await;
                continue;
            }
            Err(ParseOutcome::Unknown) => {
                send_raw(
                    sender,
                    &ServerMessage::Error {
                        code: ErrorCode::NotAuthenticated,
                        message: "only auth is valid before authentication".into(),
                    },
                )
                .await;
                continue;
            }
        };

        let ClientMessage::Auth {
            nickname,
            public_key,
            password,
            credential,
            admin_token,
        } = parsed
        else {
            send_raw(
                sender,
                &ServerMessage::Error {
                    code: ErrorCode::NotAuthenticated,
                    message: "only auth is valid before authentication".into(),
                },
            )
            .await;
            continue;
        };

        if !state.pre_auth_limiter.check(remote_key) {
            send_raw(
                sender,
                &ServerMessage::AuthResult {
                    success: false,
                    user_id: None,
                    message: Some("Too many auth attempts".into()),
                },
            )
            .await;
            return None;
        }

        match run_auth(
            state,
            &nickname,
            public_key.as_deref(),
            password.as_deref(),
            credential.as_deref(),
            admin_token.as_deref(),
        )
        .await
        {
            Ok(AuthOutcome::Accepted {
                user_id,
                server_id,
                public_key,
                is_admin,
            }) => {
                let conn = Arc::new(LiveConnection::new(
                    user_id,
                    nickname.clone(),
                    server_id,
                    public_key,
                    is_admin,
                    tx,
                ));
                conn.send(ServerMessage::AuthResult {
                    success: true,
                    user_id: Some(user_id),
                    message: None,
                });
                if let Err(err) = send_joined_server(state, &conn).await {
                    tracing::error!(?err, "failed to assemble joined-server");
                    send_raw(sender, &ServerMessage::Error {
                        code: ErrorCode::InternalError,
                        message: "failed to join server".into(),
                    }).await;
                    return None;
                }
                return Some(conn);
            }
            Ok(AuthOutcome::Rejected(message)) => {
                send_raw(
                    sender,
                    &ServerMessage::AuthResult {
                        success: false,
                        user_id: None,
                        message: Some(message),
                    },
                )
                .await;
                return None;
            }
            Err(err) => {
                tracing::error!(?err, "auth failed with an internal error");
                send_raw(
                    sender,
                    &ServerMessage::AuthResult {
                        success: false,
                        user_id: None,
                        message: Some("internal error".into()),
                    },
                )
                .await;
                return None;
            }
        }
    }
}

enum AuthOutcome {
    Accepted {
        user_id: i64,
        server_id: i64,
        public_key: Option<String>,
        is_admin: bool,
    },
    Rejected(String),
}

async fn run_auth(
    state: &AppState,
    nickname: &str,
    public_key: Option<&str>,
    password: Option<&str>,
    credential: Option<&str>,
    admin_token: Option<&str>,
) -> Result<AuthOutcome, CoreError> {
    let server_id = bootstrap::ensure_default_server(&state.db).await?;
    let server = parley_db::servers::get_server(&state.db, server_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if credential.is_some() && public_key.is_none() {
        return Ok(AuthOutcome::Rejected("credential requires a publicKey".into()));
    }

    let accepted = if server.password_hash.is_none() {
        true
    } else if let Some(password) = password {
        server
            .password_hash
            .as_deref()
            .map(|hash| core_auth::verify_password(password, hash).unwrap_or(false))
            .unwrap_or(false)
    } else if let (Some(credential), Some(public_key)) = (credential, public_key) {
        matches!(
            invites::bind_credential(&state.db, server_id, credential, public_key).await?,
            invites::BindOutcome::Bound
        )
    } else {
        false
    };

    if !accepted {
        return Ok(AuthOutcome::Rejected("authentication failed".into()));
    }

    let user = match public_key {
        Some(key) => match parley_db::users::get_by_public_key(&state.db, key).await? {
            Some(existing) => existing,
            None => {
                parley_db::users::create_user(
                    &state.db,
                    parley_util::snowflake::generate(1),
                    nickname,
                    Some(key),
                )
                .await?
            }
        },
        None => {
            parley_db::users::create_user(
                &state.db,
                parley_util::snowflake::generate(1),
                nickname,
                None,
            )
            .await?
        }
    };

    if bans::active_ban(&state.db, server_id, user.id).await?.is_some() {
        return Ok(AuthOutcome::Rejected("banned".into()));
    }

    let is_admin = core_auth::admin_token_matches(state.admin_token.as_deref(), admin_token);

    members::ensure_member(&state.db, user.id, server_id, nickname).await?;
    bootstrap::ensure_member_has_default_role(&state.db, user.id, server_id).await?;

    Ok(AuthOutcome::Accepted {
        user_id: user.id,
        server_id,
        public_key: user.public_key,
        is_admin,
    })
}

/// Assembles and sends `joined-server` (§4.1): server metadata, producer
/// caps, channel list, member list (each enriched with live state where
/// connected), role catalog, and the caller's effective permissions.
async fn send_joined_server(state: &AppState, conn: &Arc<LiveConnection>) -> Result<(), CoreError> {
    let server = parley_db::servers::get_server(&state.db, conn.server_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    let channel_rows = channels::list_channels_for_server(&state.db, conn.server_id).await?;
    let member_rows = members::list_members(&state.db, conn.server_id).await?;
    let role_rows = roles::list_roles_for_server(&state.db, conn.server_id).await?;

    let mut members_out = Vec::with_capacity(member_rows.len());
    for member in &member_rows {
        let user = parley_db::users::get_by_id(&state.db, member.user_id).await?;
        let role_ids = roles::roles_for_member(&state.db, member.user_id, conn.server_id)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let live = state.event_bus.registry().get(member.user_id);
        members_out.push(MemberSummary {
            user_id: member.user_id,
            nickname: member.joined_nickname.clone(),
            channel_id: live.as_ref().and_then(|c| c.channel_id()),
            is_muted: live
                .as_ref()
                .map(|c| c.is_muted.load(Ordering::Relaxed))
                .unwrap_or(false),
            is_deafened: live
                .as_ref()
                .map(|c| c.is_deafened.load(Ordering::Relaxed))
                .unwrap_or(false),
            public_key: user.and_then(|u| u.public_key),
            role_ids,
            avatar_url: None,
        });
    }

    let channels_out = channel_rows
        .iter()
        .map(|c| ChannelSummary {
            id: c.id,
            server_id: c.server_id,
            parent_id: c.parent_id,
            name: c.name.clone(),
            description: c.description.clone(),
            position: c.position as i32,
            max_users: c.max_users as i32,
            is_default: c.is_default,
        })
        .collect();

    let roles_out = role_rows
        .iter()
        .map(|r| parley_models::role::RoleSummary {
            id: r.id,
            name: r.name.clone(),
            priority: r.priority as i32,
            color: r.color.clone(),
            is_default: r.is_default,
        })
        .collect();

    let my_permissions = if conn.is_admin.load(Ordering::Relaxed) {
        EffectivePermissions::all_allow()
    } else {
        state.effective_permissions(conn.user_id, conn.server_id, None).await?
    };

    conn.send(ServerMessage::JoinedServer {
        server_id: server.id,
        name: server.name,
        description: server.description,
        icon_url: server.icon_ref,
        max_webcam_producers: server.max_webcam_producers as i32,
        max_screen_producers: server.max_screen_producers as i32,
        channels: channels_out,
        members: members_out,
        roles: roles_out,
        my_permissions,
    });
    Ok(())
}
