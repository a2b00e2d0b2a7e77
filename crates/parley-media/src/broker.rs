//! Media broker adapter (C5, §4.7): a thin façade over the SFU library.
//! The actual media engine (a mediasoup-style SFU) is an external
//! collaborator per spec; this module owns only the bookkeeping the
//! signaling hub needs — per-channel routers, per-peer transports, and
//! producers/consumers indexed by id — and hands back opaque JSON blobs
//! (ICE/DTLS/RTP parameters) wherever the real SFU would.
//!
//! Grounded on the teacher's `paracord-relay::room::MediaRoomManager`
//! (`DashMap<String, MediaRoom>`, lazy get-or-create, participant index).

use dashmap::DashMap;
use parley_models::ws::{MediaType, TransportDirection};
use serde_json::{json, Value};
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("transport not found")]
    TransportNotFound,
    #[error("producer not found")]
    ProducerNotFound,
    #[error("consumer not found")]
    ConsumerNotFound,
    #[error("peer has not announced rtp capabilities")]
    NotReady,
    #[error("producer is not consumable")]
    CannotConsume,
}

struct TransportState {
    id: String,
    direction: TransportDirection,
}

struct ProducerState {
    id: String,
    user_id: i64,
    kind: String,
    media_type: MediaType,
}

struct ConsumerState {
    id: String,
    producer_id: String,
    paused: bool,
}

#[derive(Default)]
struct PeerState {
    rtp_capabilities: RwLock<Option<Value>>,
    send_transport: RwLock<Option<TransportState>>,
    recv_transport: RwLock<Option<TransportState>>,
    producers: DashMap<String, ProducerState>,
    consumers: DashMap<String, ConsumerState>,
}

/// A per-channel router: an isolation domain shared by all its peers
/// (§3 GLOSSARY "Router"), created lazily on first channel join (§4.7).
struct RouterState {
    rtp_capabilities: Value,
    peers: DashMap<i64, PeerState>,
}

impl RouterState {
    fn new() -> Self {
        Self {
            // Opaque to the server; a real mediasoup router would report
            // its actual supported codecs here.
            rtp_capabilities: json!({ "codecs": [], "headerExtensions": [] }),
            peers: DashMap::new(),
        }
    }
}

pub struct TransportCreated {
    pub transport_id: String,
    pub ice_parameters: Value,
    pub ice_candidates: Value,
    pub dtls_parameters: Value,
}

pub struct ProducedProducer {
    pub producer_id: String,
}

pub struct ConsumeResult {
    pub consumer_id: String,
    pub kind: String,
    pub rtp_parameters: Value,
}

pub struct MediaBroker {
    routers: DashMap<i64, RouterState>,
}

impl Default for MediaBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaBroker {
    pub fn new() -> Self {
        Self {
            routers: DashMap::new(),
        }
    }

    /// Obtains or lazily creates the router for `channel_id` and returns its
    /// RTP capabilities (§4.1 `join-channel` reply, §4.7).
    pub fn router_rtp_capabilities(&self, channel_id: i64) -> Value {
        self.routers
            .entry(channel_id)
            .or_insert_with(RouterState::new)
            .rtp_capabilities
            .clone()
    }

    fn with_router<R>(&self, channel_id: i64, f: impl FnOnce(&RouterState) -> R) -> R {
        let router = self.routers.entry(channel_id).or_insert_with(RouterState::new);
        f(&router)
    }

    pub fn set_rtp_capabilities(&self, channel_id: i64, user_id: i64, rtp_capabilities: Value) {
        self.with_router(channel_id, |router| {
            let peer = router.peers.entry(user_id).or_default();
            *peer.rtp_capabilities.write().unwrap() = Some(rtp_capabilities);
        });
    }

    /// `create-transport{direction}` (§4.1). Synthesizes placeholder
    /// ICE/DTLS parameters — the real SFU would perform the actual WebRTC
    /// handshake setup here.
    pub fn create_transport(
        &self,
        channel_id: i64,
        user_id: i64,
        direction: TransportDirection,
    ) -> TransportCreated {
        let transport_id = Uuid::new_v4().to_string();
        self.with_router(channel_id, |router| {
            let peer = router.peers.entry(user_id).or_default();
            let slot = match direction {
                TransportDirection::Send => &peer.send_transport,
                TransportDirection::Recv => &peer.recv_transport,
            };
            *slot.write().unwrap() = Some(TransportState {
                id: transport_id.clone(),
                direction,
            });
        });
        TransportCreated {
            transport_id: transport_id.clone(),
            ice_parameters: json!({ "usernameFragment": Uuid::new_v4().to_string(), "password": Uuid::new_v4().to_string() }),
            ice_candidates: json!([]),
            dtls_parameters: json!({ "role": "auto", "fingerprints": [] }),
        }
    }

    /// `connect-transport{transportId,dtlsParameters}` (§4.1): no broadcast,
    /// just forwarded to the adapter. Succeeds iff the transport exists.
    pub fn connect_transport(
        &self,
        channel_id: i64,
        user_id: i64,
        transport_id: &str,
        _dtls_parameters: Value,
    ) -> Result<(), MediaError> {
        self.with_router(channel_id, |router| {
            let peer = router.peers.get(&user_id).ok_or(MediaError::TransportNotFound)?;
            let matches = |slot: &RwLock<Option<TransportState>>| {
                slot.read().unwrap().as_ref().map(|t| t.id.as_str()) == Some(transport_id)
            };
            if matches(&peer.send_transport) || matches(&peer.recv_transport) {
                Ok(())
            } else {
                Err(MediaError::TransportNotFound)
            }
        })
    }

    /// Count of currently-active producers of `media_type` across all peers
    /// in the channel (§4.1 `produce`: per-channel caps for webcam/screen).
    pub fn count_media_type(&self, channel_id: i64, media_type: MediaType) -> usize {
        self.with_router(channel_id, |router| {
            router
                .peers
                .iter()
                .map(|peer| peer.producers.iter().filter(|p| p.media_type == media_type).count())
                .sum()
        })
    }

    /// `produce{transportId,kind,rtpParameters,mediaType}` (§4.1). Caller
    /// must already have performed the permission gate and cap check
    /// (`count_media_type`) before calling this.
    pub fn produce(
        &self,
        channel_id: i64,
        user_id: i64,
        transport_id: &str,
        kind: &str,
        _rtp_parameters: Value,
        media_type: MediaType,
    ) -> Result<ProducedProducer, MediaError> {
        self.with_router(channel_id, |router| {
            let peer = router.peers.get(&user_id).ok_or(MediaError::TransportNotFound)?;
            let has_send_transport = peer
                .send_transport
                .read()
                .unwrap()
                .as_ref()
                .map(|t| t.id == transport_id)
                .unwrap_or(false);
            if !has_send_transport {
                return Err(MediaError::TransportNotFound);
            }
            let producer_id = Uuid::new_v4().to_string();
            peer.producers.insert(
                producer_id.clone(),
                ProducerState {
                    id: producer_id.clone(),
                    user_id,
                    kind: kind.to_string(),
                    media_type,
                },
            );
            Ok(ProducedProducer { producer_id })
        })
    }

    /// `stop-producer{producerId}` (§4.1). Returns the producer's media
    /// type iff it was owned by `user_id` and got closed (the caller uses
    /// this to decide whether to broadcast `producer-closed`).
    pub fn stop_producer(&self, channel_id: i64, user_id: i64, producer_id: &str) -> Option<MediaType> {
        self.with_router(channel_id, |router| {
            let peer = router.peers.get(&user_id)?;
            peer.producers
                .remove(producer_id)
                .map(|(_, p)| p.media_type)
        })
    }

    /// All live producers for a user in a channel, for disconnect/leave
    /// cleanup (§4.1 `leave-channel`, "Disconnect cleanup").
    pub fn producers_for_user(&self, channel_id: i64, user_id: i64) -> Vec<String> {
        self.with_router(channel_id, |router| {
            router
                .peers
                .get(&user_id)
                .map(|peer| peer.producers.iter().map(|p| p.id.clone()).collect())
                .unwrap_or_default()
        })
    }

    /// Every live producer in the channel except `exclude_user`'s own, for
    /// `join-channel`'s "one `new-producer` per live producer already
    /// present" replay (§4.1).
    pub fn producers_in_channel(&self, channel_id: i64, exclude_user: i64) -> Vec<(i64, String, MediaType)> {
        self.with_router(channel_id, |router| {
            router
                .peers
                .iter()
                .filter(|entry| *entry.key() != exclude_user)
                .flat_map(|entry| {
                    entry
                        .producers
                        .iter()
                        .map(|p| (p.user_id, p.id.clone(), p.media_type))
                        .collect::<Vec<_>>()
                })
                .collect()
        })
    }

    /// `consume{producerId}` (§4.1). `NotReady` if the peer hasn't sent
    /// `rtp-capabilities` yet; `CannotConsume` if the producer does not
    /// exist (the router would report this as non-consumable).
    pub fn consume(
        &self,
        channel_id: i64,
        user_id: i64,
        producer_id: &str,
    ) -> Result<ConsumeResult, MediaError> {
        self.with_router(channel_id, |router| {
            let peer = router.peers.entry(user_id).or_default();
            if peer.rtp_capabilities.read().unwrap().is_none() {
                return Err(MediaError::NotReady);
            }
            let recv_transport_id = peer
                .recv_transport
                .read()
                .unwrap()
                .as_ref()
                .map(|t| t.id.clone())
                .ok_or(MediaError::TransportNotFound)?;
            let _ = recv_transport_id;

            let producer = router
                .peers
                .iter()
                .find_map(|p| p.producers.get(producer_id).map(|r| r.kind.clone()));
            let Some(kind) = producer else {
                return Err(MediaError::CannotConsume);
            };

            let consumer_id = Uuid::new_v4().to_string();
            // Consumers are created paused (§4.1 "create a paused consumer
            // on the recv transport").
            peer.consumers.insert(
                consumer_id.clone(),
                ConsumerState {
                    id: consumer_id.clone(),
                    producer_id: producer_id.to_string(),
                    paused: true,
                },
            );
            Ok(ConsumeResult {
                consumer_id,
                kind,
                rtp_parameters: json!({ "codecs": [], "encodings": [] }),
            })
        })
    }

    /// `resume-consumer{consumerId}` (§4.1).
    pub fn resume_consumer(&self, channel_id: i64, user_id: i64, consumer_id: &str) -> Result<(), MediaError> {
        self.with_router(channel_id, |router| {
            let peer = router.peers.get(&user_id).ok_or(MediaError::ConsumerNotFound)?;
            let mut entry = peer
                .consumers
                .get_mut(consumer_id)
                .ok_or(MediaError::ConsumerNotFound)?;
            entry.paused = false;
            Ok(())
        })
    }

    /// `set-preferred-layers` (§4.1). Layers are clamped to [0,2] by the
    /// caller before reaching here; this just confirms the consumer exists.
    pub fn set_preferred_layers(
        &self,
        channel_id: i64,
        user_id: i64,
        consumer_id: &str,
        _spatial_layer: i32,
        _temporal_layer: Option<i32>,
    ) -> Result<(), MediaError> {
        self.with_router(channel_id, |router| {
            let peer = router.peers.get(&user_id).ok_or(MediaError::ConsumerNotFound)?;
            if peer.consumers.contains_key(consumer_id) {
                Ok(())
            } else {
                Err(MediaError::ConsumerNotFound)
            }
        })
    }

    /// Tears down all of a peer's transports/producers/consumers (§4.1
    /// `leave-channel`/disconnect cleanup). Returns the producer ids that
    /// were live so the caller can broadcast `producer-closed` for each.
    pub fn remove_peer(&self, channel_id: i64, user_id: i64) -> Vec<String> {
        self.with_router(channel_id, |router| {
            router
                .peers
                .remove(&user_id)
                .map(|(_, peer)| peer.producers.iter().map(|p| p.id.clone()).collect())
                .unwrap_or_default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `count_media_type` is the primitive `handle_produce` caps against
    /// (broker.rs never enforces the cap itself — see its doc comment);
    /// this just confirms it sums producers of one media type across every
    /// peer in the channel rather than per-peer.
    #[test]
    fn count_media_type_sums_producers_across_peers_in_one_channel() {
        let broker = MediaBroker::new();
        for user_id in 1..=3 {
            let t = broker.create_transport(1, user_id, TransportDirection::Send);
            broker.produce(1, user_id, &t.transport_id, "video", json!({}), MediaType::Webcam).unwrap();
        }
        assert_eq!(broker.count_media_type(1, MediaType::Webcam), 3);
        assert_eq!(broker.count_media_type(1, MediaType::Screen), 0, "other media types are not mixed in");
    }

    #[test]
    fn consume_requires_rtp_capabilities_first() {
        let broker = MediaBroker::new();
        broker.create_transport(1, 1, TransportDirection::Send);
        let t = broker.create_transport(1, 1, TransportDirection::Send);
        let produced = broker.produce(1, 1, &t.transport_id, "audio", json!({}), MediaType::Mic).unwrap();

        broker.create_transport(1, 2, TransportDirection::Recv);
        let err = broker.consume(1, 2, &produced.producer_id).unwrap_err();
        assert!(matches!(err, MediaError::NotReady));

        broker.set_rtp_capabilities(1, 2, json!({}));
        let ok = broker.consume(1, 2, &produced.producer_id);
        assert!(ok.is_ok());
    }

    #[test]
    fn consuming_an_unknown_producer_is_cannot_consume() {
        let broker = MediaBroker::new();
        broker.create_transport(1, 2, TransportDirection::Recv);
        broker.set_rtp_capabilities(1, 2, json!({}));
        let err = broker.consume(1, 2, "does-not-exist").unwrap_err();
        assert!(matches!(err, MediaError::CannotConsume));
    }

    #[test]
    fn remove_peer_returns_its_live_producer_ids() {
        let broker = MediaBroker::new();
        let t = broker.create_transport(1, 1, TransportDirection::Send);
        let p1 = broker.produce(1, 1, &t.transport_id, "audio", json!({}), MediaType::Mic).unwrap();
        let removed = broker.remove_peer(1, 1);
        assert_eq!(removed, vec![p1.producer_id]);
        assert!(broker.producers_for_user(1, 1).is_empty());
    }
}
