use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::anyhow;
use log::{debug, warn};
use tokio::{
    net::UdpSocket,
    sync::{broadcast, mpsc, oneshot},
    time::Instant,
};

use crate::{
    dbserver::{connection::ConnectionManager, query},
    message, proto, Config, Message, Peer, PeerEvent, ProlinkError, Result,
};

const STATUS_PORT: u16 = 50002;

/// How long to wait for a tempo-master handoff to be acknowledged before
/// giving up on the caller's behalf.
const HANDOFF_TIMEOUT: Duration = Duration::from_secs(5);

/// How often our own status is rebroadcast, matching the cadence real
/// players use.
const STATUS_INTERVAL: Duration = Duration::from_millis(200);

/// Requests issued through a [`PlayerHandle`] and executed on the task's
/// own loop so they can observe and mutate election state safely.
enum Command {
    LoadTrack {
        target_device: u8,
        source_player: u8,
        source_slot: u8,
        track_type: u8,
        rekordbox_id: u32,
    },
    SyncMode {
        target_device: u8,
        sync: bool,
    },
    OnAir {
        players: [bool; 4],
    },
    FaderStart {
        start: [bool; 4],
        stop: [bool; 4],
    },
    MediaQuery {
        target_device: u8,
        slot: u8,
    },
    SetTempo {
        bpm: f32,
    },
    SetSynced {
        synced: bool,
    },
    SetOwnOnAir {
        on_air: bool,
    },
    SetPlaying {
        playing: bool,
    },
    JumpToBeat {
        beat: u8,
    },
    AdjustPlaybackPosition {
        delta_ms: i64,
    },
    BecomeTempoMaster {
        resp: oneshot::Sender<Result<()>>,
    },
    AppointTempoMaster {
        target_device: u8,
        resp: oneshot::Sender<Result<()>>,
    },
}

/// A cheaply-cloneable front for issuing commands against the running
/// virtual player.
#[derive(Clone)]
pub(crate) struct PlayerHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl PlayerHandle {
    pub(crate) async fn send_load_track_command(
        &self,
        target_device: u8,
        source_player: u8,
        source_slot: u8,
        track_type: u8,
        rekordbox_id: u32,
    ) -> Result<()> {
        self.cmd_tx
            .send(Command::LoadTrack {
                target_device,
                source_player,
                source_slot,
                track_type,
                rekordbox_id,
            })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn send_sync_mode_command(&self, target_device: u8, sync: bool) -> Result<()> {
        self.cmd_tx
            .send(Command::SyncMode { target_device, sync })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn send_on_air_command(&self, players: [bool; 4]) -> Result<()> {
        self.cmd_tx
            .send(Command::OnAir { players })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn send_fader_start_command(
        &self,
        start: [bool; 4],
        stop: [bool; 4],
    ) -> Result<()> {
        self.cmd_tx
            .send(Command::FaderStart { start, stop })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn send_media_query(&self, target_device: u8, slot: u8) -> Result<()> {
        self.cmd_tx
            .send(Command::MediaQuery { target_device, slot })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn set_tempo(&self, bpm: f32) -> Result<()> {
        self.cmd_tx
            .send(Command::SetTempo { bpm })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn set_synced(&self, synced: bool) -> Result<()> {
        self.cmd_tx
            .send(Command::SetSynced { synced })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn set_on_air(&self, on_air: bool) -> Result<()> {
        self.cmd_tx
            .send(Command::SetOwnOnAir { on_air })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn set_playing(&self, playing: bool) -> Result<()> {
        self.cmd_tx
            .send(Command::SetPlaying { playing })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn jump_to_beat(&self, beat: u8) -> Result<()> {
        self.cmd_tx
            .send(Command::JumpToBeat { beat })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn adjust_playback_position(&self, delta_ms: i64) -> Result<()> {
        self.cmd_tx
            .send(Command::AdjustPlaybackPosition { delta_ms })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e).into())
    }

    pub(crate) async fn become_tempo_master(&self) -> Result<()> {
        let (resp, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::BecomeTempoMaster { resp })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e))?;

        match tokio::time::timeout(HANDOFF_TIMEOUT, rx).await {
            Ok(result) => result.map_err(|e| anyhow!("player task gone: {}", e))?,
            Err(_) => Err(ProlinkError::Timeout),
        }
    }

    pub(crate) async fn appoint_tempo_master(&self, target_device: u8) -> Result<()> {
        let (resp, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::AppointTempoMaster { target_device, resp })
            .await
            .map_err(|e| anyhow!("player task gone: {}", e))?;
        rx.await.map_err(|e| anyhow!("player task gone: {}", e))?
    }
}

/// Our own virtual player's broadcastable state: what [`PlayerHandle`]'s
/// mutators change and the status/beat emitters read back.
struct OwnStatus {
    bpm: f32,
    synced: bool,
    on_air: bool,
    playing: bool,
    beat: u32,
    beat_in_bar: u8,
    playback_position_ms: i64,
}

impl Default for OwnStatus {
    fn default() -> OwnStatus {
        OwnStatus {
            bpm: 120.0,
            synced: false,
            on_air: false,
            playing: false,
            beat: 0,
            beat_in_bar: 1,
            playback_position_ms: 0,
        }
    }
}

/// Receives per-device status on port 50002, tracks the tempo master
/// election, resolves track metadata over the database connection,
/// broadcasts our own status and beats, and carries out the commands
/// issued through a [`PlayerHandle`].
pub(crate) struct PlayerTask {
    config: Config,
    device_num: u8,
    socket: Arc<UdpSocket>,
    peers_rx: broadcast::Receiver<PeerEvent>,
    msg_tx: mpsc::Sender<Message>,
    cmd_rx: mpsc::Receiver<Command>,
    connections: ConnectionManager,
    peers: HashMap<u8, Peer>,
    current_tracks: HashMap<u8, message::Track>,
    play_states: HashMap<u8, bool>,
    tempo_master: Option<u8>,
    pending_handoff: Option<oneshot::Sender<Result<()>>>,
    own_status: OwnStatus,
}

impl PlayerTask {
    pub(crate) async fn new(
        config: &Config,
        device_num: u8,
        peers_rx: broadcast::Receiver<PeerEvent>,
        msg_tx: mpsc::Sender<Message>,
    ) -> Result<(PlayerTask, PlayerHandle)> {
        let socket = Arc::new(UdpSocket::bind(("0.0.0.0", STATUS_PORT)).await?);

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let idle_limit = Duration::from_millis(config.idle_limit_ms);

        let task = PlayerTask {
            config: config.clone(),
            device_num,
            socket,
            peers_rx,
            msg_tx,
            cmd_rx,
            connections: ConnectionManager::new(device_num, idle_limit),
            peers: HashMap::new(),
            current_tracks: HashMap::new(),
            play_states: HashMap::new(),
            tempo_master: None,
            pending_handoff: None,
            own_status: OwnStatus::default(),
        };

        Ok((task, PlayerHandle { cmd_tx }))
    }

    pub(crate) async fn run(mut self) -> Result<()> {
        let mut buf = [0; 4096];
        let mut sweep = tokio::time::interval(Duration::from_millis(self.config.idle_limit_ms));
        let mut status_tick = tokio::time::interval(STATUS_INTERVAL);

        let beat_sleep = tokio::time::sleep(self.beat_interval());
        tokio::pin!(beat_sleep);

        loop {
            tokio::select! {
                _ = self.msg_tx.closed() => {
                    return Ok(())
                }
                _ = sweep.tick() => {
                    self.connections.sweep_idle();
                }
                _ = status_tick.tick() => {
                    self.emit_own_status().await?;
                }
                () = &mut beat_sleep => {
                    self.emit_own_beat().await?;
                    beat_sleep.as_mut().reset(Instant::now() + self.beat_interval());
                }
                res = self.peers_rx.recv() => {
                    if let Ok(event) = res {
                        self.handle_peer_event(event);
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    if let Some(cmd) = cmd {
                        let retimes_beat = matches!(cmd, Command::SetTempo { .. });
                        self.handle_command(cmd).await?;
                        if retimes_beat {
                            beat_sleep.as_mut().reset(Instant::now() + self.beat_interval());
                        }
                    }
                }
                res = self.socket.recv_from(&mut buf) => {
                    if let Ok((len, _src)) = res {
                        let data = &buf[0..len];
                        match proto::Packet::parse(data) {
                            Ok(pkt) => self.handle_packet(pkt).await?,
                            Err(e) => debug!(target: "prolink", "error parsing status packet: {}", e),
                        }
                    }
                }
            }
        }
    }

    fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Joined(peer) => {
                self.peers.insert(peer.device_num, peer);
            }
            PeerEvent::Left(peer) => {
                self.peers.remove(&peer.device_num);
                self.current_tracks.remove(&peer.device_num);
                self.play_states.remove(&peer.device_num);
                self.connections.forget(peer.device_num);
                if self.tempo_master == Some(peer.device_num) {
                    self.tempo_master = None;
                }
            }
        }
    }

    /// Sends `data` individually to every known peer's status port. Used
    /// for broadcasts that don't name a single recipient, like our own
    /// status and beats, on-air settings and fader starts.
    async fn fan_out(&self, data: &[u8]) -> Result<()> {
        for peer in self.peers.values() {
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::from(peer.ip_addr)), STATUS_PORT);
            self.socket.send_to(data, addr).await?;
        }
        Ok(())
    }

    /// Sends `data` to `target_device`'s status port, failing with
    /// [`ProlinkError::NoPeer`] if it isn't a device we've seen.
    async fn unicast_to(&self, target_device: u8, data: &[u8]) -> Result<()> {
        let peer = self
            .peers
            .get(&target_device)
            .ok_or(ProlinkError::NoPeer(target_device))?;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::from(peer.ip_addr)), STATUS_PORT);
        self.socket.send_to(data, addr).await?;
        Ok(())
    }

    fn beat_interval(&self) -> Duration {
        let bpm = self.own_status.bpm.max(1.0);
        Duration::from_millis((60_000.0 / bpm) as u64)
    }

    async fn emit_own_status(&mut self) -> Result<()> {
        let pkt = self.build_own_status_packet();
        let mut data = Vec::new();
        pkt.write(&mut data)?;
        self.fan_out(&data).await
    }

    async fn emit_own_beat(&mut self) -> Result<()> {
        self.own_status.beat_in_bar = (self.own_status.beat_in_bar % 4) + 1;
        self.own_status.beat = self.own_status.beat.wrapping_add(1);

        let interval_ms = self.beat_interval().as_millis() as u32;
        let beats_to_bar = 4 - ((self.own_status.beat_in_bar - 1) % 4) as u32;

        let pkt = proto::BeatPacket {
            name: self.config.name.clone(),
            device_num: self.device_num,
            next_beat: interval_ms,
            second_beat: interval_ms * 2,
            next_bar: interval_ms * beats_to_bar,
            fourth_beat: interval_ms * 4,
            second_bar: interval_ms * 8,
            eighth_beat: interval_ms * 8,
            pitch: 0.0,
            bpm: self.own_status.bpm,
            beat: self.own_status.beat_in_bar,
        };

        let mut data = Vec::new();
        pkt.write(&mut data)?;
        self.fan_out(&data).await
    }

    fn build_own_status_packet(&self) -> proto::PlayerStatusPacket {
        let mut flags = 0u8;
        if self.tempo_master == Some(self.device_num) {
            flags |= 0x20;
        }
        if self.own_status.synced {
            flags |= 0x10;
        }
        if self.own_status.on_air {
            flags |= 0x08;
        }

        proto::PlayerStatusPacket {
            name: self.config.name.clone(),
            unknown_10: 0x01,
            device_num: self.device_num,
            unknown_16: 0,
            active: 0x04,
            track_device: 0,
            track_slot: 0,
            track_type: 0,
            rekordbox_id: 0,
            track_num: 0,
            d_l: 0,
            unknown_38: [0; 14],
            d_n: 0,
            unknown_48: [0; 32],
            usb_activity: 0,
            sd_activity: 0,
            u_l: 0,
            s_l: 0,
            link_available: 1,
            unknown_78: 0,
            play_mode: 5,
            firmware_ver: "1.0".to_string(),
            sync_n: 1,
            flags,
            unknown_8b: 0,
            play_state: if self.own_status.playing { 0x03 } else { 0x05 },
            pitch_1: 0x100000,
            m_v: 0,
            bpm: (self.own_status.bpm * 100.0) as u16,
            unknown_94: 0,
            pitch_2: 0x100000,
            p_3: 0,
            m_m: 0,
            m_h: 0,
            beat: self.own_status.beat,
            cue: 0,
            bar_beat: self.own_status.beat_in_bar,
            media_presence: 0,
            u_e: 0,
            s_e: 0,
            emergency_loop_active: 0,
            pitch_3: 0x100000,
            pitch_4: 0x100000,
            seq_num: 0,
            player_type: 0x05,
            unknown_cd: [0; 3],
            extra0: None,
        }
    }

    async fn handle_packet(&mut self, pkt: proto::Packet) -> Result<()> {
        match pkt {
            proto::Packet::PlayerStatus(status) => self.handle_player_status(status).await?,
            proto::Packet::MixerStatus(status) => self.handle_mixer_status(status).await?,
            proto::Packet::MasterHandoffRequest(req) => self.handle_handoff_request(req).await?,
            proto::Packet::MasterHandoffResponse(resp) => self.handle_handoff_response(resp).await?,
            proto::Packet::MediaResponse(resp) => self.handle_media_response(resp).await?,
            _ => (),
        }
        Ok(())
    }

    async fn handle_player_status(&mut self, pkt: proto::PlayerStatusPacket) -> Result<()> {
        if !self.peers.contains_key(&pkt.device_num) {
            warn!("status packet from unknown device {}", pkt.device_num);
            return Ok(());
        }

        self.note_master(pkt.device_num, pkt.is_master()).await?;

        let now_playing = pkt.is_playing();
        if self.play_states.insert(pkt.device_num, now_playing) != Some(now_playing) {
            self.msg_tx
                .send(Message::PlayStateChanged {
                    device_num: pkt.device_num,
                    playing: now_playing,
                })
                .await?;
        }

        let mut track = message::Track {
            player_device: pkt.device_num,
            source_device: pkt.track_device,
            source_slot: pkt.track_slot,
            track_type: pkt.track_type,
            rekordbox_id: pkt.rekordbox_id,
            metadata: None,
        };

        let changed = match self.current_tracks.get(&pkt.device_num) {
            Some(prev) => {
                prev.source_device != track.source_device
                    || prev.source_slot != track.source_slot
                    || prev.rekordbox_id != track.rekordbox_id
            }
            None => true,
        };

        if !changed {
            return Ok(());
        }

        if track.rekordbox_id != 0 {
            if let Some(peer) = self.peers.get(&track.source_device).cloned() {
                match query::fetch_track_metadata(
                    &mut self.connections,
                    self.device_num,
                    track.source_device,
                    &peer.ip_addr,
                    track.source_slot,
                    track.track_type,
                    track.rekordbox_id,
                )
                .await
                {
                    Ok(metadata) => track.metadata = Some(metadata),
                    Err(e) => warn!("metadata fetch failed for device {}: {}", track.player_device, e),
                }
            }
        }

        self.current_tracks.insert(pkt.device_num, track.clone());
        self.msg_tx.send(Message::TrackChanged(track)).await?;

        Ok(())
    }

    async fn handle_mixer_status(&mut self, pkt: proto::MixerStatusPacket) -> Result<()> {
        self.note_master(pkt.device_num, pkt.is_master()).await?;
        Ok(())
    }

    /// Fires `MasterChanged` on every observed transition: no master to a
    /// device, one device to another, or a device dropping the role with
    /// nobody yet claiming it.
    async fn note_master(&mut self, device_num: u8, is_master: bool) -> Result<()> {
        if is_master {
            if self.tempo_master != Some(device_num) {
                self.tempo_master = Some(device_num);
                self.msg_tx.send(Message::MasterChanged(Some(device_num))).await?;
            }
        } else if self.tempo_master == Some(device_num) {
            self.tempo_master = None;
            self.msg_tx.send(Message::MasterChanged(None)).await?;
        }
        Ok(())
    }

    async fn handle_media_response(&mut self, pkt: proto::MediaResponsePacket) -> Result<()> {
        self.msg_tx
            .send(Message::MediaChanged(message::MediaDetail {
                device_num: pkt.device_num,
                slot: pkt.slot,
                track_count: pkt.track_count,
                playlist_count: pkt.playlist_count,
                has_rekordbox_database: pkt.has_rekordbox_database,
                total_bytes: pkt.total_bytes,
                free_bytes: pkt.free_bytes,
            }))
            .await?;
        Ok(())
    }

    async fn handle_handoff_request(&mut self, req: proto::MasterHandoffRequestPacket) -> Result<()> {
        if req.target_device != self.device_num {
            return Ok(());
        }
        if self.tempo_master != Some(self.device_num) {
            // We aren't the master; nothing to yield.
            return Ok(());
        }

        let response = proto::MasterHandoffResponsePacket {
            name: self.config.name.clone(),
            device_num: self.device_num,
            yielding_to: req.device_num,
        };
        let mut data = Vec::new();
        response.write(&mut data)?;
        if let Err(e) = self.unicast_to(req.device_num, &data).await {
            warn!("handoff response to {}: {}", req.device_num, e);
            return Ok(());
        }

        self.tempo_master = Some(req.device_num);
        self.msg_tx
            .send(Message::MasterChanged(Some(req.device_num)))
            .await?;

        Ok(())
    }

    async fn handle_handoff_response(&mut self, resp: proto::MasterHandoffResponsePacket) -> Result<()> {
        if resp.yielding_to != self.device_num {
            return Ok(());
        }

        self.tempo_master = Some(self.device_num);
        self.msg_tx
            .send(Message::MasterChanged(Some(self.device_num)))
            .await?;
        self.emit_own_status().await?;

        if let Some(resp_tx) = self.pending_handoff.take() {
            let _ = resp_tx.send(Ok(()));
        }

        Ok(())
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<()> {
        match cmd {
            Command::LoadTrack {
                target_device,
                source_player,
                source_slot,
                track_type,
                rekordbox_id,
            } => {
                let pkt = proto::LoadTrackCommandPacket {
                    name: self.config.name.clone(),
                    device_num: self.device_num,
                    target_device,
                    source_player,
                    source_slot,
                    track_type,
                    rekordbox_id,
                };
                let mut data = Vec::new();
                pkt.write(&mut data)?;
                if let Err(e) = self.unicast_to(target_device, &data).await {
                    warn!("load-track command to {}: {}", target_device, e);
                }
            }
            Command::SyncMode { target_device, sync } => {
                let pkt = proto::SyncModeCommandPacket {
                    name: self.config.name.clone(),
                    device_num: self.device_num,
                    target_device,
                    sync,
                };
                let mut data = Vec::new();
                pkt.write(&mut data)?;
                if let Err(e) = self.unicast_to(target_device, &data).await {
                    warn!("sync-mode command to {}: {}", target_device, e);
                }
            }
            Command::OnAir { players } => {
                let pkt = proto::OnAirCommandPacket {
                    name: self.config.name.clone(),
                    device_num: self.device_num,
                    players,
                };
                let mut data = Vec::new();
                pkt.write(&mut data)?;
                self.fan_out(&data).await?;
            }
            Command::FaderStart { start, stop } => {
                let pkt = proto::FaderStartCommandPacket {
                    name: self.config.name.clone(),
                    device_num: self.device_num,
                    start,
                    stop,
                };
                let mut data = Vec::new();
                pkt.write(&mut data)?;
                self.fan_out(&data).await?;
            }
            Command::MediaQuery { target_device, slot } => {
                let pkt = proto::MediaQueryPacket {
                    name: self.config.name.clone(),
                    device_num: self.device_num,
                    target_device,
                    slot,
                };
                let mut data = Vec::new();
                pkt.write(&mut data)?;
                if let Err(e) = self.unicast_to(target_device, &data).await {
                    warn!("media query to {}: {}", target_device, e);
                }
            }
            Command::SetTempo { bpm } => {
                self.own_status.bpm = bpm;
            }
            Command::SetSynced { synced } => {
                self.own_status.synced = synced;
            }
            Command::SetOwnOnAir { on_air } => {
                self.own_status.on_air = on_air;
            }
            Command::SetPlaying { playing } => {
                self.own_status.playing = playing;
            }
            Command::JumpToBeat { beat } => {
                self.own_status.beat_in_bar = beat;
            }
            Command::AdjustPlaybackPosition { delta_ms } => {
                self.own_status.playback_position_ms += delta_ms;
            }
            Command::BecomeTempoMaster { resp } => {
                if self.tempo_master == Some(self.device_num) {
                    let _ = resp.send(Ok(()));
                } else if let Some(current) = self.tempo_master {
                    let req = proto::MasterHandoffRequestPacket {
                        name: self.config.name.clone(),
                        device_num: self.device_num,
                        target_device: current,
                    };
                    let mut data = Vec::new();
                    req.write(&mut data)?;
                    if let Err(e) = self.unicast_to(current, &data).await {
                        let _ = resp.send(Err(e));
                        return Ok(());
                    }
                    self.pending_handoff = Some(resp);
                } else {
                    self.tempo_master = Some(self.device_num);
                    self.msg_tx
                        .send(Message::MasterChanged(Some(self.device_num)))
                        .await?;
                    self.emit_own_status().await?;
                    let _ = resp.send(Ok(()));
                }
            }
            Command::AppointTempoMaster { target_device, resp } => {
                if self.tempo_master != Some(self.device_num) {
                    let _ = resp.send(Err(anyhow!("not the current tempo master").into()));
                    return Ok(());
                }

                let response = proto::MasterHandoffResponsePacket {
                    name: self.config.name.clone(),
                    device_num: self.device_num,
                    yielding_to: target_device,
                };
                let mut data = Vec::new();
                response.write(&mut data)?;
                if let Err(e) = self.unicast_to(target_device, &data).await {
                    let _ = resp.send(Err(e));
                    return Ok(());
                }

                self.tempo_master = Some(target_device);
                self.msg_tx
                    .send(Message::MasterChanged(Some(target_device)))
                    .await?;
                let _ = resp.send(Ok(()));
            }
        }

        Ok(())
    }
}
