use std::collections::HashMap;

/// A device discovered or lost on the network.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub name: String,
    pub device_num: u8,
    pub mac_addr: [u8; 6],
    pub ip_addr: [u8; 4],
}

/// A beat announcement from a device, delivered once per beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beat {
    pub device_num: u8,
    pub next_beat: u32,
    pub second_beat: u32,
    pub next_bar: u32,
    pub fourth_beat: u32,
    pub second_bar: u32,
    pub eighth_beat: u32,
    pub pitch: f32,
    pub bpm: f32,
    pub beat: u8,
}

/// Track metadata resolved from a player's attached media over the
/// database connection: a handful of well-known fields plus whatever
/// else the menu response carried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub key: Option<String>,
    pub duration_secs: Option<u32>,
    pub bpm: Option<f32>,
    pub fields: HashMap<String, String>,
}

/// Which track is loaded in a player's deck and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub player_device: u8,
    pub source_device: u8,
    pub source_slot: u8,
    pub track_type: u8,
    pub rekordbox_id: u32,
    pub metadata: Option<TrackMetadata>,
}

/// Summary of what's mounted in a media slot, reported in answer to a
/// media query.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDetail {
    pub device_num: u8,
    pub slot: u8,
    pub track_count: u16,
    pub playlist_count: u16,
    pub has_rekordbox_database: bool,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// Events published on the shared bus. `Prolink::next` yields these in
/// delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    DeviceFound(Peer),
    DeviceLost(Peer),
    Beat(Beat),
    TrackChanged(Track),
    MediaChanged(MediaDetail),
    MasterChanged(Option<u8>),
    PlayStateChanged { device_num: u8, playing: bool },
}
