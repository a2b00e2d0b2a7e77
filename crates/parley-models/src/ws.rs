//! WebSocket wire protocol (§4.1, §6). Every frame is a JSON object tagged
//! by `type`; client and server frame sets are modeled as distinct enums so
//! the dispatch table in `parley-ws` can match exhaustively.

use crate::permissions::EffectivePermissions;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaType {
    Mic,
    Webcam,
    Screen,
    ScreenAudio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

/// `kind` discriminator for opaque E2EE relay payloads (§4.5). The server
/// only ever inspects this field and (where applicable) `target_user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum E2eeKind {
    PublicKeyAnnounce,
    EncryptedChannelKey,
    KeyRatchet,
    VerificationRequest,
    VerificationConfirm,
}

/// Stable error-code strings (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidJson,
    NotAuthenticated,
    RateLimited,
    NotInServer,
    NotInChannel,
    ChannelNotFound,
    NoPermission,
    ChannelFull,
    ProducerLimit,
    NotReady,
    CannotConsume,
    ChatTooLarge,
    UnknownMessage,
    InternalError,
}

/// Messages a client may send (§4.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Auth {
        nickname: String,
        #[serde(default)]
        public_key: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        credential: Option<String>,
        #[serde(default)]
        admin_token: Option<String>,
    },
    JoinChannel {
        #[serde(with = "parley_util::wire_id")]
        channel_id: i64,
    },
    LeaveChannel,
    Mute {
        muted: bool,
    },
    Deafen {
        deafened: bool,
    },
    RtpCapabilities {
        rtp_capabilities: Value,
    },
    CreateTransport {
        direction: TransportDirection,
    },
    ConnectTransport {
        transport_id: String,
        dtls_parameters: Value,
    },
    Produce {
        transport_id: String,
        kind: String,
        rtp_parameters: Value,
        media_type: MediaType,
    },
    StopProducer {
        producer_id: String,
    },
    Consume {
        producer_id: String,
    },
    ResumeConsumer {
        consumer_id: String,
    },
    SetPreferredLayers {
        consumer_id: String,
        spatial_layer: i32,
        #[serde(default)]
        temporal_layer: Option<i32>,
    },
    Chat {
        ciphertext: String,
        iv: String,
        key_epoch: i64,
        #[serde(default)]
        encoding: Option<String>,
    },
    E2ee {
        payload: E2eeRelayPayload,
    },
    Speaking {
        speaking: bool,
    },
    Kick {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(default)]
        reason: Option<String>,
    },
    MoveUser {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(with = "parley_util::wire_id")]
        channel_id: i64,
    },
    Ban {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(default)]
        reason: Option<String>,
    },
    AssignRole {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(with = "parley_util::wire_id")]
        role_id: i64,
    },
    UnassignRole {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(with = "parley_util::wire_id")]
        role_id: i64,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct E2eeRelayPayload {
    pub kind: E2eeKind,
    #[serde(default, with = "parley_util::wire_id::option")]
    pub target_user_id: Option<i64>,
    #[serde(flatten)]
    pub rest: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    #[serde(with = "parley_util::wire_id")]
    pub id: i64,
    #[serde(with = "parley_util::wire_id")]
    pub server_id: i64,
    #[serde(with = "parley_util::wire_id::option")]
    pub parent_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub position: i32,
    pub max_users: i32,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberSummary {
    #[serde(with = "parley_util::wire_id")]
    pub user_id: i64,
    pub nickname: String,
    #[serde(with = "parley_util::wire_id::option")]
    pub channel_id: Option<i64>,
    pub is_muted: bool,
    pub is_deafened: bool,
    pub public_key: Option<String>,
    #[serde(with = "parley_util::wire_id::vec")]
    pub role_ids: Vec<i64>,
    pub avatar_url: Option<String>,
}

/// Messages the server may send (§4.1, §6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Error {
        code: ErrorCode,
        message: String,
    },
    AuthResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none", with = "parley_util::wire_id::option", default)]
        user_id: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    JoinedServer {
        #[serde(with = "parley_util::wire_id")]
        server_id: i64,
        name: String,
        description: Option<String>,
        icon_url: Option<String>,
        max_webcam_producers: i32,
        max_screen_producers: i32,
        channels: Vec<ChannelSummary>,
        members: Vec<MemberSummary>,
        roles: Vec<crate::role::RoleSummary>,
        my_permissions: EffectivePermissions,
    },
    JoinedChannel {
        #[serde(with = "parley_util::wire_id")]
        channel_id: i64,
        #[serde(with = "parley_util::wire_id::vec")]
        users: Vec<i64>,
        router_rtp_capabilities: Value,
    },
    UserJoinedChannel {
        #[serde(with = "parley_util::wire_id")]
        channel_id: i64,
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
    },
    UserLeftChannel {
        #[serde(with = "parley_util::wire_id")]
        channel_id: i64,
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
    },
    UserUpdated {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(with = "parley_util::wire_id::option")]
        channel_id: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_muted: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_deafened: Option<bool>,
    },
    TransportCreated {
        transport_id: String,
        ice_parameters: Value,
        ice_candidates: Value,
        dtls_parameters: Value,
    },
    Produced {
        producer_id: String,
        media_type: MediaType,
    },
    NewProducer {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        producer_id: String,
        media_type: MediaType,
    },
    ConsumeResult {
        consumer_id: String,
        producer_id: String,
        kind: String,
        rtp_parameters: Value,
    },
    ProducerClosed {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        producer_id: String,
    },
    Chat {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(with = "parley_util::wire_id")]
        channel_id: i64,
        ciphertext: String,
        iv: String,
        key_epoch: i64,
        encoding: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    E2ee {
        #[serde(with = "parley_util::wire_id")]
        from_user_id: i64,
        payload: E2eeRelayPayload,
    },
    UserKicked {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    UserMoved {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(with = "parley_util::wire_id")]
        channel_id: i64,
    },
    UserBanned {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Speaking {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        speaking: bool,
    },
    RoleAssigned {
        #[serde(with = "parley_util::wire_id")]
        user_id: i64,
        #[serde(with = "parley_util::wire_id")]
        role_id: i64,
        assigned: bool,
    },
    ChannelCreated {
        channel: ChannelSummary,
    },
    ChannelDeleted {
        #[serde(with = "parley_util::wire_id")]
        channel_id: i64,
    },
    PermissionsUpdated {
        permissions: EffectivePermissions,
    },
    ServerUpdated {
        #[serde(with = "parley_util::wire_id")]
        server_id: i64,
        name: String,
        description: Option<String>,
    },
}
