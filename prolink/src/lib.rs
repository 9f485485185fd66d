use anyhow::anyhow;
use log::error;
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::Instant,
};

mod dbserver;
pub mod message;
mod proto;
mod tasks;

use tasks::{beat::BeatTask, finder::FinderTask, player::PlayerHandle};

pub use message::{Beat, MediaDetail, Message, Track, TrackMetadata};

#[derive(Clone, Debug)]
struct Peer {
    name: String,
    device_num: u8,
    mac_addr: [u8; 6],
    ip_addr: [u8; 4],
    proto_ver: u8,
    last_seen: Instant,
}

impl Peer {
    fn is_same(&self, other: &Self) -> bool {
        self.name == other.name
            && self.mac_addr == other.mac_addr
            && self.ip_addr == other.ip_addr
            && self.proto_ver == other.proto_ver
    }
}

#[derive(Debug, Clone)]
enum PeerEvent {
    Joined(Peer),
    Left(Peer),
}

/// Errors a caller of this crate needs to branch on. `Anyhow`, `Io` and the
/// channel variants wrap internal plumbing failures that can't otherwise be
/// recovered from; the named variants are the ones worth matching on.
#[derive(Error, Debug)]
pub enum ProlinkError {
    /// The link was told to shut down mid-operation.
    #[error("terminating")]
    Terminating,

    /// Something on the network violated the wire format.
    #[error("{error_kind} error at 0x{pos:x} parsing @{timestamp}: \n{dump}")]
    ParseError {
        error_kind: String,
        pos: usize,
        timestamp: u128,
        dump: String,
    },

    /// A call was made against a link that hasn't joined the network yet
    /// (or has already been terminated).
    #[error("prolink is not running")]
    NotRunning,

    /// Device number negotiation didn't converge on a usable number.
    #[error("could not claim a device number: {0}")]
    AssignmentFailed(String),

    /// An operation that should complete within a bounded time did not.
    #[error("operation timed out")]
    Timeout,

    /// The caller asked for something this crate doesn't support, e.g. an
    /// out-of-range slot or channel index.
    #[error("invalid usage: {0}")]
    Usage(String),

    /// A command named a device number that isn't in the live device
    /// table.
    #[error("no peer with device number {0}")]
    NoPeer(u8),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SystemTime(#[from] std::time::SystemTimeError),

    #[error(transparent)]
    WatchRecvError(#[from] watch::error::RecvError),
    #[error(transparent)]
    WatchSendError(#[from] watch::error::SendError<Option<u8>>),
    #[error(transparent)]
    MessageSendError(#[from] mpsc::error::SendError<Message>),
}

pub type Result<T> = std::result::Result<T, ProlinkError>;

/// Tunables for a running link. All but `name` and `device_num` have
/// defaults matching what a real CDJ does.
#[derive(Debug, Clone)]
pub struct Config {
    /// Device name advertised in announce/keep-alive packets, shown in a
    /// mixer's device list.
    pub name: String,
    /// Device number to request; ignored in favor of an auto-assigned
    /// number when `use_standard_player_number` is false and the number
    /// is already taken.
    pub device_num: u8,
    /// Network interface to bind to. `None` picks the first IPv4
    /// interface found.
    pub interface_name: Option<String>,
    /// Gap between keep-alive broadcasts once joined.
    pub announce_interval_ms: u64,
    /// How long to wait for a single reply before giving up on a
    /// request/response exchange (port discovery, dbserver setup).
    pub socket_timeout_ms: u64,
    /// How long a pooled dbserver connection may sit idle before it's
    /// dropped.
    pub idle_limit_ms: u64,
    /// Items requested per `RENDER_MENU` page when walking a track's
    /// metadata.
    pub menu_batch_size: u32,
    /// When false, fall back to scanning 1-15 for a free device number
    /// instead of insisting on `device_num`.
    pub use_standard_player_number: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            name: "prolink-rs".to_string(),
            device_num: 5,
            interface_name: None,
            announce_interval_ms: 1_500,
            socket_timeout_ms: 5_000,
            idle_limit_ms: 30_000,
            menu_batch_size: 64,
            use_standard_player_number: false,
        }
    }
}

/// A joined link to the network: owns the device finder, virtual player
/// and beat finder tasks, and republishes their events on one channel.
pub struct Prolink {
    child_tasks: Vec<JoinHandle<()>>,
    msg_rx: mpsc::Receiver<Message>,
    player: PlayerHandle,
}

impl Prolink {
    /// Joins the Pro DJ Link network described by `config`: claims a
    /// device number, starts listening for devices, beats and player
    /// status, and returns once the join sequence has completed.
    pub async fn join(config: Config) -> Result<Prolink> {
        let (msg_tx, msg_rx) = mpsc::channel(256);
        let (joined_tx, mut joined_rx) = watch::channel(None);
        let (peers_tx, peers_rx) = broadcast::channel(64);

        let mut finder =
            FinderTask::new(&config, joined_tx, peers_tx.clone(), msg_tx.clone()).await?;

        // The finder negotiates the device number we actually end up
        // with, so the player has to be built after it, not before.
        let finder_handle = tokio::spawn(async move {
            if let Err(e) = finder.run().await {
                error!(target: "prolink", "device finder task error: {}", e);
            }
        });

        let device_num = loop {
            if let Some(n) = *joined_rx.borrow() {
                break n;
            }
            joined_rx.changed().await?;
        };

        let (player, player_handle) =
            tasks::player::PlayerTask::new(&config, device_num, peers_tx.subscribe(), msg_tx.clone())
                .await?;
        let player_handle_task = player_handle.clone();

        let player_task_handle = tokio::spawn(async move {
            if let Err(e) = player.run().await {
                error!(target: "prolink", "virtual player task error: {}", e);
            }
        });

        let beat = BeatTask::new(msg_tx.clone()).await?;
        let beat_handle = tokio::spawn(async move {
            if let Err(e) = beat.run().await {
                error!(target: "prolink", "beat finder task error: {}", e);
            }
        });

        Ok(Prolink {
            child_tasks: vec![finder_handle, player_task_handle, beat_handle],
            msg_rx,
            player: player_handle_task,
        })
    }

    /// Waits for and returns the next event: a device joining or leaving,
    /// a beat, a track or media change, or a tempo-master change.
    pub async fn next(&mut self) -> Result<Message> {
        self.msg_rx
            .recv()
            .await
            .ok_or_else(|| anyhow!("link has terminated").into())
    }

    /// Tells `target_device` to load a track from `source_player`'s
    /// media slot.
    pub async fn send_load_track_command(
        &self,
        target_device: u8,
        source_player: u8,
        source_slot: u8,
        track_type: u8,
        rekordbox_id: u32,
    ) -> Result<()> {
        self.player
            .send_load_track_command(
                target_device,
                source_player,
                source_slot,
                track_type,
                rekordbox_id,
            )
            .await
    }

    /// Enables or disables sync mode on `target_device`.
    pub async fn send_sync_mode_command(&self, target_device: u8, sync: bool) -> Result<()> {
        self.player.send_sync_mode_command(target_device, sync).await
    }

    /// Sets which of the four mixer channels are on the air.
    pub async fn send_on_air_command(&self, players: [bool; 4]) -> Result<()> {
        self.player.send_on_air_command(players).await
    }

    /// Starts/stops playback on the named channels, as a mixer does when
    /// a fader crosses its start point.
    pub async fn send_fader_start_command(&self, start: [bool; 4], stop: [bool; 4]) -> Result<()> {
        self.player.send_fader_start_command(start, stop).await
    }

    /// Asks `target_device` for a summary of what's mounted in `slot`.
    pub async fn send_media_query(&self, target_device: u8, slot: u8) -> Result<()> {
        self.player.send_media_query(target_device, slot).await
    }

    /// Sets the tempo reported in our own status/beat broadcasts.
    pub async fn set_tempo(&self, bpm: f32) -> Result<()> {
        self.player.set_tempo(bpm).await
    }

    /// Marks our own player as synced (or not) to the tempo master.
    pub async fn set_synced(&self, synced: bool) -> Result<()> {
        self.player.set_synced(synced).await
    }

    /// Marks our own player's channel as on (or off) the air.
    pub async fn set_on_air(&self, on_air: bool) -> Result<()> {
        self.player.set_on_air(on_air).await
    }

    /// Starts or stops our own player's simulated playback.
    pub async fn set_playing(&self, playing: bool) -> Result<()> {
        self.player.set_playing(playing).await
    }

    /// Jumps our own player's beat-within-bar counter to `beat`.
    pub async fn jump_to_beat(&self, beat: u8) -> Result<()> {
        self.player.jump_to_beat(beat).await
    }

    /// Nudges our own player's simulated playback position by
    /// `delta_ms` milliseconds.
    pub async fn adjust_playback_position(&self, delta_ms: i64) -> Result<()> {
        self.player.adjust_playback_position(delta_ms).await
    }

    /// Claims the tempo master role, yielding from whoever currently
    /// holds it if necessary.
    pub async fn become_tempo_master(&self) -> Result<()> {
        self.player.become_tempo_master().await
    }

    /// Hands the tempo master role to another device. Fails if we are
    /// not the current master.
    pub async fn appoint_tempo_master(&self, target_device: u8) -> Result<()> {
        self.player.appoint_tempo_master(target_device).await
    }

    /// Leaves the network and waits for all child tasks to exit.
    pub async fn terminate(self) {
        drop(self.msg_rx);
        for t in self.child_tasks {
            let _ = tokio::join!(t);
        }
    }
}
