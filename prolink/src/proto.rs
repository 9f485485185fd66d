use std::{convert::TryInto, fs, io::Write};

use anyhow::anyhow;
use byteorder::{BigEndian, WriteBytesExt};
use nom::{
    bytes::complete::{tag, take},
    error::context,
    number::complete::{be_u16, be_u24, be_u32, be_u8},
    IResult,
};
use nom_locate::LocatedSpan;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use pretty_hex::pretty_hex;

use crate::{ProlinkError, Result};

type Span<'a> = LocatedSpan<&'a [u8]>;

#[derive(FromPrimitive)]
#[repr(u8)]
enum PacketType {
    DeviceNumClaim1 = 0x00,
    DeviceNumClaim2 = 0x02,
    DeviceNumClaim3 = 0x04,
    KeepAlive = 0x06,
    AnnounceStatus = 0x0a, // Both announce and status packets (CDJ and mixer) share this type.
    FaderStart = 0x19,
    LoadTrack = 0x1a,
    SyncMode = 0x1e,
    OnAir = 0x1f,
    MediaQuery = 0x26,
    MediaResponse = 0x27,
    Beat = 0x28,
    MasterHandoffRequest = 0x29,
    MasterHandoffResponse = 0x2a,
}

struct PacketHeader {
    name: String,
    proto_ver: u8,
}

const HEADER: &'static [u8] = &[0x51, 0x73, 0x70, 0x74, 0x31, 0x57, 0x6d, 0x4a, 0x4f, 0x4c];

fn header(i: Span) -> IResult<Span, ()> {
    let (i, _) = tag(HEADER)(i)?;
    Ok((i, ()))
}

fn device_name(i: Span) -> IResult<Span, String> {
    let (i, raw_name) = take(20usize)(i)?;
    let name = String::from_utf8_lossy(&raw_name);
    let name = name.trim_end_matches('\0');

    Ok((i, name.into()))
}

fn negotiation_header(pkt_type: u8) -> impl Fn(Span) -> IResult<Span, PacketHeader> {
    move |i: Span| -> IResult<Span, PacketHeader> {
        let (i, _) = header(i)?;
        let (i, _) = tag(&[pkt_type, 0x00])(i)?;
        let (i, name) = device_name(i)?;
        let (i, _) = tag(&[0x01])(i)?;
        let (i, proto_ver) = be_u8(i)?;
        let (i, _len) = be_u16(i)?;
        Ok((i, PacketHeader { name, proto_ver }))
    }
}

fn mac_addr(i: Span) -> IResult<Span, [u8; 6]> {
    let (i, mac_addr) = take(6usize)(i)?;
    Ok((i, (*mac_addr.fragment()).try_into().unwrap()))
}

fn ip_addr(i: Span) -> IResult<Span, [u8; 4]> {
    let (i, ip_addr) = take(4usize)(i)?;
    Ok((i, (*ip_addr.fragment()).try_into().unwrap()))
}

fn write_device_name(w: &mut dyn Write, name: &String) -> std::io::Result<()> {
    let mut name_buf = [0u8; 20];
    (&mut name_buf as &mut [u8]).write(name.as_bytes())?;
    w.write_all(&name_buf)?;

    Ok(())
}

fn write_header(
    w: &mut dyn Write,
    pkt_type: u8,
    name: &String,
    proto_ver: u8,
    pkt_len: u16,
) -> std::io::Result<()> {
    w.write_all(HEADER)?;
    w.write_u8(pkt_type)?;
    w.write_u8(0x0)?;

    write_device_name(w, name)?;

    w.write_u8(0x01)?;
    w.write_u8(proto_ver)?; // CDJ-3000s have a 3 here.

    // packet length
    w.write_u16::<BigEndian>(pkt_len)?;
    Ok(())
}

#[derive(Debug, PartialEq)]
pub struct AnnouncePacket {
    pub name: String,
    pub proto_ver: u8,
}

impl AnnouncePacket {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let len = if self.proto_ver == 3 { 0x26 } else { 0x25 };
        write_header(
            w,
            PacketType::AnnounceStatus as u8,
            &self.name,
            self.proto_ver,
            len,
        )?;
        w.write_u8(0x01)?;
        if self.proto_ver == 3 {
            w.write_u8(0x00)?;
        }

        Ok(())
    }
    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::AnnounceStatus as u8)(i)?;
        let (i, _) = tag(&[0x01])(i)?;
        Ok((
            i,
            Packet::Announce(AnnouncePacket {
                name: hdr.name,
                proto_ver: hdr.proto_ver,
            }),
        ))
    }
}

#[derive(Debug, PartialEq)]
pub struct DeviceNumClaim1Packet {
    pub name: String,
    pub proto_ver: u8,
    pub pkt_num: u8,
    pub mac_addr: [u8; 6],
}

impl DeviceNumClaim1Packet {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(
            w,
            PacketType::DeviceNumClaim1 as u8,
            &self.name,
            self.proto_ver,
            0x2c,
        )?;
        w.write_u8(self.pkt_num)?;
        w.write_u8(0x01)?;
        w.write_all(&self.mac_addr)?;
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::DeviceNumClaim1 as u8)(i)?;
        let (i, pkt_num) = be_u8(i)?;
        let (i, _) = tag(&[0x01])(i)?;
        let (i, mac_addr) = mac_addr(i)?;

        Ok((
            i,
            Packet::DeviceNumClaim1(DeviceNumClaim1Packet {
                name: hdr.name,
                proto_ver: hdr.proto_ver,
                pkt_num,
                mac_addr,
            }),
        ))
    }
}

#[derive(Debug, PartialEq)]
pub struct DeviceNumClaim2Packet {
    pub name: String,
    pub proto_ver: u8,
    pub ip_addr: [u8; 4],
    pub mac_addr: [u8; 6],
    pub device_num: u8,
    pub pkt_num: u8,
    pub auto_assign: bool,
}

impl DeviceNumClaim2Packet {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(
            w,
            PacketType::DeviceNumClaim2 as u8,
            &self.name,
            self.proto_ver,
            0x32,
        )?;

        w.write_all(&self.ip_addr)?;
        w.write_all(&self.mac_addr)?;

        w.write_u8(self.device_num)?;
        w.write_u8(self.pkt_num)?;
        w.write_u8(01)?;
        w.write_u8(if self.auto_assign { 0x01 } else { 0x02 })?;
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::DeviceNumClaim2 as u8)(i)?;
        let (i, ip_addr) = ip_addr(i)?;
        let (i, mac_addr) = mac_addr(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, pkt_num) = be_u8(i)?;
        let (i, _) = tag(&[0x01])(i)?;
        let (i, auto) = be_u8(i)?;

        Ok((
            i,
            Packet::DeviceNumClaim2(DeviceNumClaim2Packet {
                name: hdr.name,
                proto_ver: hdr.proto_ver,
                ip_addr,
                mac_addr,
                device_num,
                pkt_num,
                auto_assign: auto == 0x01,
            }),
        ))
    }
}

#[derive(Debug, PartialEq)]
pub struct DeviceNumClaim3Packet {
    pub name: String,
    pub proto_ver: u8,
    pub device_num: u8,
    pub pkt_num: u8,
}

impl DeviceNumClaim3Packet {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(
            w,
            PacketType::DeviceNumClaim3 as u8,
            &self.name,
            self.proto_ver,
            0x26,
        )?;

        w.write_u8(self.device_num)?;
        w.write_u8(self.pkt_num)?;
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::DeviceNumClaim3 as u8)(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, pkt_num) = be_u8(i)?;

        Ok((
            i,
            Packet::DeviceNumClaim3(DeviceNumClaim3Packet {
                name: hdr.name,
                proto_ver: hdr.proto_ver,
                device_num,
                pkt_num,
            }),
        ))
    }
}

#[derive(Debug, PartialEq)]
pub struct KeepAlivePacket {
    pub name: String,
    pub proto_ver: u8,
    pub device_num: u8,
    pub device_type: u8,
    pub mac_addr: [u8; 6],
    pub ip_addr: [u8; 4],
    pub peers_seen: u8,
    pub unknown_35: u8,
}

impl KeepAlivePacket {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(
            w,
            PacketType::KeepAlive as u8,
            &self.name,
            self.proto_ver,
            0x36,
        )?;

        w.write_u8(self.device_num)?;

        w.write_u8(self.device_type)?;

        w.write_all(&self.mac_addr)?;
        w.write_all(&self.ip_addr)?;

        w.write_all(&[self.peers_seen, 0x00, 0x00, 0x00, 0x01, self.unknown_35])?;

        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::KeepAlive as u8)(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, device_type) = be_u8(i)?;
        let (i, mac_addr) = mac_addr(i)?;
        let (i, ip_addr) = ip_addr(i)?;
        let (i, peers_seen) = be_u8(i)?;
        let (i, _) = tag(&[0x00, 0x00, 0x00, 0x01])(i)?;
        let (i, unknown_35) = be_u8(i)?;

        Ok((
            i,
            Packet::KeepAlive(KeepAlivePacket {
                name: hdr.name,
                proto_ver: hdr.proto_ver,
                device_num,
                device_type,
                mac_addr,
                ip_addr,
                peers_seen,
                unknown_35,
            }),
        ))
    }
}

#[derive(Debug, PartialEq)]
pub struct PlayerStatusExtraData0 {
    pub unknown_d4: [u8; 28],
    pub unknown_f4: [u8; 6],
    pub waveform_color: u8,
    pub unknown_fb: u16,
    pub waveform_pos: u8,
    pub unknown_fe: [u8; 31],
    pub buf_f: u8,
    pub buf_b: u8,
    pub buf_s: u8,
    pub unknown_120: [u8; 0x38],
    pub master_tempo: u8,
    pub unknown_159: [u8; 3],
    pub key: u32, // only 24 bits in packet
    pub unknown_15f: [u8; 5],
    pub key_shift: [u8; 8],
    pub unknown_16c: [u8; 0x288],
}

#[derive(Debug, PartialEq)]
pub struct PlayerStatusPacket {
    pub name: String,
    pub unknown_10: u8,
    pub device_num: u8,
    pub unknown_16: u8,
    pub active: u8,
    pub track_device: u8,
    pub track_slot: u8,
    pub track_type: u8,
    pub rekordbox_id: u32,
    pub track_num: u16,
    pub d_l: u8,
    pub unknown_38: [u8; 14],
    pub d_n: u16,
    pub unknown_48: [u8; 32],
    pub usb_activity: u8,
    pub sd_activity: u8,
    pub u_l: u8,
    pub s_l: u8,
    pub link_available: u8,
    pub unknown_78: u8,
    pub play_mode: u8,
    pub firmware_ver: String,
    pub sync_n: u32,
    pub flags: u8,
    pub unknown_8b: u8,
    pub play_state: u8,
    pub pitch_1: u32,
    pub m_v: u16,
    pub bpm: u16,
    pub unknown_94: u32,
    pub pitch_2: u32,
    pub p_3: u8,
    pub m_m: u8,
    pub m_h: u8,
    pub beat: u32,
    pub cue: u16,
    pub bar_beat: u8,
    pub media_presence: u8,
    pub u_e: u8,
    pub s_e: u8,
    pub emergency_loop_active: u8,
    pub pitch_3: u32,
    pub pitch_4: u32,
    pub seq_num: u32,
    pub player_type: u8,
    pub unknown_cd: [u8; 3],
    pub extra0: Option<PlayerStatusExtraData0>,
}

impl PlayerStatusPacket {
    /// Whether `flags` marks this device as the current tempo master.
    pub fn is_master(&self) -> bool {
        self.flags & 0x20 != 0
    }

    /// Whether `flags` marks this device as synced to the tempo master.
    pub fn is_synced(&self) -> bool {
        self.flags & 0x10 != 0
    }

    /// Whether `flags` marks this device's channel as on the air.
    pub fn is_on_air(&self) -> bool {
        self.flags & 0x08 != 0
    }

    /// Whether the deck is currently playing.
    pub fn is_playing(&self) -> bool {
        self.play_state == 0x03 || self.play_state == 0x04
    }

    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let mut buf = Vec::new();

        buf.write_all(HEADER)?;
        buf.write_u8(PacketType::AnnounceStatus as u8)?;
        write_device_name(&mut buf, &self.name)?;
        buf.write_u8(0x01)?;
        buf.write_u8(self.unknown_10)?;
        buf.write_u8(self.device_num)?;

        // Length is only known once the whole packet is built; patched in
        // below once `buf` has its final size.
        let pkt_len_pos = buf.len();
        buf.write_u16::<BigEndian>(0)?;

        buf.write_u8(self.device_num)?; // repeated device number
        buf.write_u8(0x00)?;
        buf.write_u8(self.unknown_16)?;

        buf.write_u8(self.active)?;
        buf.write_u8(self.track_device)?;
        buf.write_u8(self.track_slot)?;
        buf.write_u8(self.track_type)?;

        // 0x30
        buf.write_u8(0x00)?;
        buf.write_u32::<BigEndian>(self.rekordbox_id)?;
        buf.write_all(&[0x00, 0x00])?;
        buf.write_u16::<BigEndian>(self.track_num)?;
        buf.write_all(&[0x00, 0x00, 0x00])?;
        buf.write_u8(self.d_l)?;

        // 0x38
        buf.write_all(&self.unknown_38)?;

        // 0x46
        buf.write_u16::<BigEndian>(self.d_n)?;
        buf.write_all(&self.unknown_48)?;
        buf.write_all(&[0x01, 0x00])?;

        // 0x6a
        buf.write_u8(self.usb_activity)?;
        buf.write_u8(self.sd_activity)?;
        buf.write_all(&[0x00; 3])?;
        buf.write_u8(self.u_l)?;

        // 0x70
        buf.write_all(&[0x00; 3])?;
        buf.write_u8(self.s_l)?;
        buf.write_u8(0x00)?;
        buf.write_u8(self.link_available)?;

        // 0x76
        buf.write_all(&[0x00; 2])?;
        buf.write_u8(self.unknown_78)?;
        buf.write_all(&[0x00; 2])?;
        buf.write_u8(self.play_mode)?;
        let mut firmware_buf = [0u8; 4];
        (&mut firmware_buf[..]).write_all(self.firmware_ver.as_bytes())?;
        buf.write_all(&firmware_buf)?;

        // 0x80
        buf.write_all(&[0x00; 4])?;
        buf.write_u32::<BigEndian>(self.sync_n)?;
        buf.write_u8(0x00)?;
        buf.write_u8(self.flags)?;
        buf.write_u8(self.unknown_8b)?;
        buf.write_u8(self.play_state)?;
        buf.write_u32::<BigEndian>(self.pitch_1)?;

        // 0x90
        buf.write_u16::<BigEndian>(self.m_v)?;
        buf.write_u16::<BigEndian>(self.bpm)?;
        buf.write_u32::<BigEndian>(self.unknown_94)?;
        buf.write_u32::<BigEndian>(self.pitch_2)?;
        buf.write_u8(0x00)?;
        buf.write_u8(self.p_3)?;
        buf.write_u8(self.m_m)?;
        buf.write_u8(self.m_h)?;

        // 0xa0
        buf.write_u32::<BigEndian>(self.beat)?;
        buf.write_u16::<BigEndian>(self.cue)?;
        buf.write_u8(self.bar_beat)?;
        buf.write_all(&[0x00; 9])?;

        // 0xb0
        buf.write_all(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01])?;
        buf.write_u8(self.media_presence)?;
        buf.write_u8(self.u_e)?;
        buf.write_u8(self.s_e)?;
        buf.write_u8(self.emergency_loop_active)?;
        buf.write_all(&[0x00; 5])?;

        // 0xc0
        buf.write_u32::<BigEndian>(self.pitch_3)?;
        buf.write_u32::<BigEndian>(self.pitch_4)?;
        buf.write_u32::<BigEndian>(self.seq_num)?;
        buf.write_u8(self.player_type)?;
        buf.write_all(&self.unknown_cd)?;

        if let Some(extra) = &self.extra0 {
            // 0xd0
            buf.write_all(&[0x12, 0x34, 0x56, 0x78])?;
            buf.write_all(&extra.unknown_d4)?;

            // 0xf0
            buf.write_all(&[0x12, 0x34, 0x56, 0x78])?;
            buf.write_all(&extra.unknown_f4)?;
            buf.write_u8(extra.waveform_color)?;
            buf.write_u16::<BigEndian>(extra.unknown_fb)?;
            buf.write_u8(extra.waveform_pos)?;
            buf.write_all(&extra.unknown_fe)?;
            buf.write_u8(extra.buf_f)?;
            buf.write_u8(extra.buf_b)?;
            buf.write_u8(extra.buf_s)?;

            // 0x120
            buf.write_all(&extra.unknown_120)?;

            // 0x158
            buf.write_u8(extra.master_tempo)?;
            buf.write_all(&extra.unknown_159)?;
            buf.write_u24::<BigEndian>(extra.key)?;

            // 0x160
            buf.write_all(&extra.unknown_15f)?;
            buf.write_all(&extra.key_shift)?;

            // 0x16c
            buf.write_all(&extra.unknown_16c)?;
        }

        let pkt_len = buf.len() as u16;
        (&mut buf[pkt_len_pos..pkt_len_pos + 2]).write_u16::<BigEndian>(pkt_len)?;

        w.write_all(&buf)?;
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, _) = header(i)?;
        let (i, _) = context("packet type", tag(&[PacketType::AnnounceStatus as u8]))(i)?; // TODO: make enum
        let (i, name) = device_name(i)?;
        let (i, _) = tag(&[0x01])(i)?;
        let (i, unknown_10) = be_u8(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, _pkt_len) = be_u16(i)?; // len
        let (i, _device_num2) = be_u8(i)?;
        let (i, _) = context("tag1", tag(&[0x00]))(i)?;
        let (i, unknown_16) = be_u8(i)?;

        let (i, active) = be_u8(i)?;
        let (i, track_device) = be_u8(i)?;
        let (i, track_slot) = be_u8(i)?;
        let (i, track_type) = be_u8(i)?;

        // 0x30
        let (i, _) = context("tag2", tag(&[0x00]))(i)?;
        let (i, rekordbox_id) = be_u32(i)?;
        let (i, _) = context("tag3", tag(&[0x00, 0x00]))(i)?;
        let (i, track_num) = be_u16(i)?;
        let (i, _) = context("tag4", tag(&[0x00, 0x00, 0x00]))(i)?;
        let (i, d_l) = be_u8(i)?;

        // 0x38
        let (i, unknown_38) = take(14usize)(i)?;

        // 0x46
        let (i, d_n) = be_u16(i)?;
        let (i, unknown_48) = take(32usize)(i)?;
        let (i, _) = context("tag6", tag(&[0x01, 0x00]))(i)?;

        // 0x6a
        let (i, usb_activity) = be_u8(i)?;
        let (i, sd_activity) = be_u8(i)?;
        let (i, _) = context("tag7", tag(&[0x00; 3]))(i)?;
        let (i, u_l) = be_u8(i)?;

        // 0x70
        let (i, _) = tag(&[0x00; 3])(i)?;
        let (i, s_l) = be_u8(i)?;
        let (i, _) = tag(&[0x00])(i)?;
        let (i, link_available) = be_u8(i)?;

        // 0x76
        let (i, _) = tag(&[0x00; 2])(i)?;
        let (i, unknown_78) = be_u8(i)?;
        let (i, _) = tag(&[0x00; 2])(i)?;
        let (i, play_mode) = be_u8(i)?;
        let (i, firmware_ver_raw) = take(4usize)(i)?;
        let firmware_ver = String::from_utf8_lossy(*firmware_ver_raw.fragment());
        let firmware_ver = firmware_ver.trim_end_matches('\0').to_string();

        // 0x80
        let (i, _) = tag(&[0x00; 4])(i)?;
        let (i, sync_n) = be_u32(i)?;
        let (i, _) = tag(&[0x00])(i)?;
        let (i, flags) = be_u8(i)?;
        let (i, unknown_8b) = be_u8(i)?;
        let (i, play_state) = be_u8(i)?;
        let (i, pitch_1) = be_u32(i)?;

        // 0x90
        let (i, m_v) = be_u16(i)?;
        let (i, bpm) = be_u16(i)?;
        let (i, unknown_94) = be_u32(i)?;
        let (i, pitch_2) = be_u32(i)?;
        let (i, _) = tag(&[0x00])(i)?;
        let (i, p_3) = be_u8(i)?;
        let (i, m_m) = be_u8(i)?;
        let (i, m_h) = be_u8(i)?;

        // 0xa0
        let (i, beat) = be_u32(i)?;
        let (i, cue) = be_u16(i)?;
        let (i, bar_beat) = be_u8(i)?;
        let (i, _) = tag(&[0x00; 9])(i)?;

        // 0xb0
        let (i, _) = tag(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01])(i)?;
        let (i, media_presence) = be_u8(i)?;
        let (i, u_e) = be_u8(i)?;
        let (i, s_e) = be_u8(i)?;
        let (i, emergency_loop_active) = be_u8(i)?;
        let (i, _) = tag(&[0x00; 5])(i)?;

        // 0xc0
        let (i, pitch_3) = be_u32(i)?;
        let (i, pitch_4) = be_u32(i)?;
        let (i, seq_num) = be_u32(i)?;
        let (i, player_type) = be_u8(i)?;
        let (i, unknown_cd) = take(3usize)(i)?;

        let (i, extra0) = if player_type == 0x05 {
            (i, None)
        } else if player_type == 0x1f {
            // 0xd0
            let (i, _) = tag(&[0x12, 0x34, 0x56, 0x78])(i)?;
            let (i, unknown_d4) = take(28usize)(i)?;

            // 0xf0
            let (i, _) = tag(&[0x12, 0x34, 0x56, 0x78])(i)?;
            let (i, unknown_f4) = take(6usize)(i)?;
            let (i, waveform_color) = be_u8(i)?;
            let (i, unknown_fb) = be_u16(i)?;
            let (i, waveform_pos) = be_u8(i)?;
            let (i, unknown_fe) = take(31usize)(i)?;
            let (i, buf_f) = be_u8(i)?;
            let (i, buf_b) = be_u8(i)?;
            let (i, buf_s) = be_u8(i)?;

            // 0x120
            let (i, unknown_120) = take(0x38usize)(i)?;

            // 0x158
            let (i, master_tempo) = be_u8(i)?;
            let (i, unknown_159) = take(3usize)(i)?;
            let (i, key) = be_u24(i)?;

            // 0x160
            let (i, unknown_15f) = take(5usize)(i)?;
            let (i, key_shift) = take(8usize)(i)?;

            // 0x16c
            let (i, unknown_16c) = take(0x288usize)(i)?;
            (
                i,
                Some(PlayerStatusExtraData0 {
                    unknown_d4: (*unknown_d4.fragment()).try_into().unwrap(),
                    unknown_f4: (*unknown_f4.fragment()).try_into().unwrap(),
                    waveform_color,
                    unknown_fb,
                    waveform_pos,
                    unknown_fe: (*unknown_fe.fragment()).try_into().unwrap(),
                    buf_f,
                    buf_b,
                    buf_s,
                    unknown_120: (*unknown_120.fragment()).try_into().unwrap(),
                    master_tempo,
                    unknown_159: (*unknown_159.fragment()).try_into().unwrap(),
                    key,
                    unknown_15f: (*unknown_15f.fragment()).try_into().unwrap(),
                    key_shift: (*key_shift.fragment()).try_into().unwrap(),
                    unknown_16c: (*unknown_16c.fragment()).try_into().unwrap(),
                }),
            )
        } else {
            (i, None) // TODO: 2000nx2?
        };

        Ok((
            i,
            Packet::PlayerStatus(PlayerStatusPacket {
                name: name.to_string(),
                unknown_10,
                device_num,
                unknown_16,
                active,
                track_device,
                track_slot,
                track_type,
                rekordbox_id,
                track_num,
                d_l,
                unknown_38: (*unknown_38.fragment()).try_into().unwrap(),
                d_n,
                unknown_48: (*unknown_48.fragment()).try_into().unwrap(),
                usb_activity,
                sd_activity,
                u_l,
                s_l,
                link_available,
                unknown_78,
                play_mode,
                firmware_ver,
                sync_n,
                flags,
                unknown_8b,
                play_state,
                pitch_1,
                m_v,
                bpm,
                unknown_94,
                pitch_2,
                p_3,
                m_m,
                m_h,
                beat,
                cue,
                bar_beat,
                media_presence,
                u_e,
                s_e,
                emergency_loop_active,
                pitch_3,
                pitch_4,
                seq_num,
                player_type,
                unknown_cd: (*unknown_cd.fragment()).try_into().unwrap(),
                extra0,
            }),
        ))
    }
}

/// Mixer status, a shorter sibling of [`PlayerStatusPacket`] sharing the same
/// wire `PacketType`. Mixers don't carry track/slot or waveform fields.
#[derive(Debug, PartialEq)]
pub struct MixerStatusPacket {
    pub name: String,
    pub device_num: u8,
    pub flags: u8,
    pub bpm: u16,
    pub pitch: u32,
    pub beat: u32,
}

impl MixerStatusPacket {
    /// Packets this short (mixers send no track/waveform fields) are mixer
    /// status rather than CDJ status, even though both share packet type 0x0a.
    const MAX_LEN: usize = 0x70;

    pub fn is_master(&self) -> bool {
        self.flags & 0x20 != 0
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, _) = header(i)?;
        let (i, _) = tag(&[PacketType::AnnounceStatus as u8])(i)?;
        let (i, name) = device_name(i)?;
        let (i, _) = tag(&[0x01])(i)?;
        let (i, _unknown_10) = be_u8(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, _pkt_len) = be_u16(i)?;
        let (i, _device_num2) = be_u8(i)?;
        let (i, _) = take(8usize)(i)?;
        let (i, flags) = be_u8(i)?;
        let (i, pitch) = be_u32(i)?;
        let (i, bpm) = be_u16(i)?;
        let (i, beat) = be_u32(i)?;

        Ok((
            i,
            Packet::MixerStatus(MixerStatusPacket {
                name: name.to_string(),
                device_num,
                flags,
                bpm,
                pitch,
                beat,
            }),
        ))
    }
}

#[derive(Debug, PartialEq)]
pub struct BeatPacket {
    pub name: String,
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

impl BeatPacket {
    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, _) = header(i)?;
        let (i, _) = tag(&[PacketType::Beat as u8])(i)?; // TODO: make enum
        let (i, name) = device_name(i)?;
        let (i, _) = tag(&[0x01, 0x00])(i)?; // TODO: make enum
        let (i, device_num) = be_u8(i)?;
        let (i, _) = be_u16(i)?; // length should be 0x003c.
        let (i, next_beat) = be_u32(i)?;
        let (i, second_beat) = be_u32(i)?;
        let (i, next_bar) = be_u32(i)?;
        let (i, fourth_beat) = be_u32(i)?;
        let (i, second_bar) = be_u32(i)?;
        let (i, eighth_beat) = be_u32(i)?;
        let (i, _) = take(24usize)(i)?; // padding, should be 0xff.
        let (i, pitch_raw) = be_u32(i)?;
        let pitch = (pitch_raw as f32 - 0x100000 as f32) / 0x100000 as f32 * 100.0;
        let (i, _) = take(2usize)(i)?; // padding, should be 0x00.
        let (i, bpm_raw) = be_u16(i)?;
        let bpm = bpm_raw as f32 / 100.0;
        let (i, beat) = be_u8(i)?;
        let (i, _) = take(2usize)(i)?; // padding, should be 0x00.
        let (i, _) = be_u8(i)?; // repeated device ID.

        Ok((
            i,
            Packet::Beat(BeatPacket {
                name,
                device_num,
                next_beat,
                second_beat,
                next_bar,
                fourth_beat,
                second_bar,
                eighth_beat,
                pitch,
                bpm,
                beat,
            }),
        ))
    }

    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(w, PacketType::Beat as u8, &self.name, 0x01, 0x3c)?;
        w.write_u8(0x00)?;
        w.write_u8(self.device_num)?;
        w.write_u16::<BigEndian>(0x003c)?;
        w.write_u32::<BigEndian>(self.next_beat)?;
        w.write_u32::<BigEndian>(self.second_beat)?;
        w.write_u32::<BigEndian>(self.next_bar)?;
        w.write_u32::<BigEndian>(self.fourth_beat)?;
        w.write_u32::<BigEndian>(self.second_bar)?;
        w.write_u32::<BigEndian>(self.eighth_beat)?;
        w.write_all(&[0xff; 24])?;
        let pitch_raw = ((self.pitch / 100.0) * 0x100000 as f32) as u32 + 0x100000;
        w.write_u32::<BigEndian>(pitch_raw)?;
        w.write_all(&[0x00; 2])?;
        w.write_u16::<BigEndian>((self.bpm * 100.0) as u16)?;
        w.write_u8(self.beat)?;
        w.write_all(&[0x00; 2])?;
        w.write_u8(self.device_num)?;
        Ok(())
    }
}

/// Command to a specific player to load a track from a given source.
#[derive(Debug, PartialEq)]
pub struct LoadTrackCommandPacket {
    pub name: String,
    pub device_num: u8,
    pub target_device: u8,
    pub source_player: u8,
    pub source_slot: u8,
    pub track_type: u8,
    pub rekordbox_id: u32,
}

impl LoadTrackCommandPacket {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(w, PacketType::LoadTrack as u8, &self.name, 0x01, 0x22)?;
        w.write_u8(self.device_num)?;
        w.write_u8(self.target_device)?;
        w.write_u8(self.source_player)?;
        w.write_u8(self.source_slot)?;
        w.write_u8(self.track_type)?;
        w.write_u32::<BigEndian>(self.rekordbox_id)?;
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::LoadTrack as u8)(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, target_device) = be_u8(i)?;
        let (i, source_player) = be_u8(i)?;
        let (i, source_slot) = be_u8(i)?;
        let (i, track_type) = be_u8(i)?;
        let (i, rekordbox_id) = be_u32(i)?;

        Ok((
            i,
            Packet::LoadTrackCommand(LoadTrackCommandPacket {
                name: hdr.name,
                device_num,
                target_device,
                source_player,
                source_slot,
                track_type,
                rekordbox_id,
            }),
        ))
    }
}

/// Command telling a player to enable or disable sync mode.
#[derive(Debug, PartialEq)]
pub struct SyncModeCommandPacket {
    pub name: String,
    pub device_num: u8,
    pub target_device: u8,
    pub sync: bool,
}

impl SyncModeCommandPacket {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(w, PacketType::SyncMode as u8, &self.name, 0x01, 0x1e)?;
        w.write_u8(self.device_num)?;
        w.write_u8(self.target_device)?;
        w.write_u8(if self.sync { 0x10 } else { 0x20 })?;
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::SyncMode as u8)(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, target_device) = be_u8(i)?;
        let (i, flag) = be_u8(i)?;

        Ok((
            i,
            Packet::SyncModeCommand(SyncModeCommandPacket {
                name: hdr.name,
                device_num,
                target_device,
                sync: flag == 0x10,
            }),
        ))
    }
}

/// Command setting which of the four channels are on the air at the mixer.
#[derive(Debug, PartialEq)]
pub struct OnAirCommandPacket {
    pub name: String,
    pub device_num: u8,
    pub players: [bool; 4],
}

impl OnAirCommandPacket {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(w, PacketType::OnAir as u8, &self.name, 0x01, 0x1f)?;
        w.write_u8(self.device_num)?;
        w.write_u8(0x04)?;
        for on_air in &self.players {
            w.write_u8(if *on_air { 0x01 } else { 0x00 })?;
        }
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::OnAir as u8)(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, _count) = be_u8(i)?;
        let (i, flags) = take(4usize)(i)?;
        let flags = flags.fragment();

        Ok((
            i,
            Packet::OnAirCommand(OnAirCommandPacket {
                name: hdr.name,
                device_num,
                players: [flags[0] != 0, flags[1] != 0, flags[2] != 0, flags[3] != 0],
            }),
        ))
    }
}

/// Command starting/stopping playback on the named channels when a fader is
/// moved (or a channel fader-start button is pressed).
#[derive(Debug, PartialEq)]
pub struct FaderStartCommandPacket {
    pub name: String,
    pub device_num: u8,
    pub start: [bool; 4],
    pub stop: [bool; 4],
}

impl FaderStartCommandPacket {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(w, PacketType::FaderStart as u8, &self.name, 0x01, 0x22)?;
        w.write_u8(self.device_num)?;
        for on in &self.start {
            w.write_u8(if *on { 0x00 } else { 0x01 })?;
        }
        for on in &self.stop {
            w.write_u8(if *on { 0x00 } else { 0x01 })?;
        }
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::FaderStart as u8)(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, start) = take(4usize)(i)?;
        let (i, stop) = take(4usize)(i)?;
        let start = start.fragment();
        let stop = stop.fragment();

        Ok((
            i,
            Packet::FaderStartCommand(FaderStartCommandPacket {
                name: hdr.name,
                device_num,
                start: [
                    start[0] == 0,
                    start[1] == 0,
                    start[2] == 0,
                    start[3] == 0,
                ],
                stop: [stop[0] == 0, stop[1] == 0, stop[2] == 0, stop[3] == 0],
            }),
        ))
    }
}

/// Query for a media slot's track/playlist summary.
#[derive(Debug, PartialEq)]
pub struct MediaQueryPacket {
    pub name: String,
    pub device_num: u8,
    pub target_device: u8,
    pub slot: u8,
}

impl MediaQueryPacket {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(w, PacketType::MediaQuery as u8, &self.name, 0x01, 0x28)?;
        w.write_u8(self.device_num)?;
        w.write_u8(self.target_device)?;
        w.write_u8(self.slot)?;
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::MediaQuery as u8)(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, target_device) = be_u8(i)?;
        let (i, slot) = be_u8(i)?;

        Ok((
            i,
            Packet::MediaQuery(MediaQueryPacket {
                name: hdr.name,
                device_num,
                target_device,
                slot,
            }),
        ))
    }
}

/// Reply to a [`MediaQueryPacket`] describing what's mounted in a slot.
#[derive(Debug, PartialEq)]
pub struct MediaResponsePacket {
    pub name: String,
    pub device_num: u8,
    pub slot: u8,
    pub track_count: u16,
    pub playlist_count: u16,
    pub has_rekordbox_database: bool,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl MediaResponsePacket {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(w, PacketType::MediaResponse as u8, &self.name, 0x01, 0x34)?;
        w.write_u8(self.device_num)?;
        w.write_u8(self.slot)?;
        w.write_u16::<BigEndian>(self.track_count)?;
        w.write_u16::<BigEndian>(self.playlist_count)?;
        w.write_u8(if self.has_rekordbox_database {
            0x01
        } else {
            0x00
        })?;
        w.write_u64::<BigEndian>(self.total_bytes)?;
        w.write_u64::<BigEndian>(self.free_bytes)?;
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::MediaResponse as u8)(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, slot) = be_u8(i)?;
        let (i, track_count) = be_u16(i)?;
        let (i, playlist_count) = be_u16(i)?;
        let (i, has_db) = be_u8(i)?;
        let (i, total_bytes) = nom::number::complete::be_u64(i)?;
        let (i, free_bytes) = nom::number::complete::be_u64(i)?;

        Ok((
            i,
            Packet::MediaResponse(MediaResponsePacket {
                name: hdr.name,
                device_num,
                slot,
                track_count,
                playlist_count,
                has_rekordbox_database: has_db != 0,
                total_bytes,
                free_bytes,
            }),
        ))
    }
}

/// First phase of tempo-master yielding: ask `target_device` to yield the
/// master role to `device_num`.
#[derive(Debug, PartialEq)]
pub struct MasterHandoffRequestPacket {
    pub name: String,
    pub device_num: u8,
    pub target_device: u8,
}

impl MasterHandoffRequestPacket {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(
            w,
            PacketType::MasterHandoffRequest as u8,
            &self.name,
            0x01,
            0x1c,
        )?;
        w.write_u8(self.device_num)?;
        w.write_u8(self.target_device)?;
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::MasterHandoffRequest as u8)(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, target_device) = be_u8(i)?;

        Ok((
            i,
            Packet::MasterHandoffRequest(MasterHandoffRequestPacket {
                name: hdr.name,
                device_num,
                target_device,
            }),
        ))
    }
}

/// Second phase of tempo-master yielding: the current master acknowledges,
/// naming who it is yielding to (0 once the handoff has completed).
#[derive(Debug, PartialEq)]
pub struct MasterHandoffResponsePacket {
    pub name: String,
    pub device_num: u8,
    pub yielding_to: u8,
}

impl MasterHandoffResponsePacket {
    pub fn write(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write_header(
            w,
            PacketType::MasterHandoffResponse as u8,
            &self.name,
            0x01,
            0x1c,
        )?;
        w.write_u8(self.device_num)?;
        w.write_u8(self.yielding_to)?;
        Ok(())
    }

    pub fn parse(i: Span) -> IResult<Span, Packet> {
        let (i, hdr) = negotiation_header(PacketType::MasterHandoffResponse as u8)(i)?;
        let (i, device_num) = be_u8(i)?;
        let (i, yielding_to) = be_u8(i)?;

        Ok((
            i,
            Packet::MasterHandoffResponse(MasterHandoffResponsePacket {
                name: hdr.name,
                device_num,
                yielding_to,
            }),
        ))
    }
}

#[derive(Debug, PartialEq)]
pub enum Packet {
    Announce(AnnouncePacket),
    DeviceNumClaim1(DeviceNumClaim1Packet),
    DeviceNumClaim2(DeviceNumClaim2Packet),
    DeviceNumClaim3(DeviceNumClaim3Packet),
    KeepAlive(KeepAlivePacket),
    PlayerStatus(PlayerStatusPacket),
    MixerStatus(MixerStatusPacket),
    Beat(BeatPacket),
    LoadTrackCommand(LoadTrackCommandPacket),
    SyncModeCommand(SyncModeCommandPacket),
    OnAirCommand(OnAirCommandPacket),
    FaderStartCommand(FaderStartCommandPacket),
    MediaQuery(MediaQueryPacket),
    MediaResponse(MediaResponsePacket),
    MasterHandoffRequest(MasterHandoffRequestPacket),
    MasterHandoffResponse(MasterHandoffResponsePacket),
}

impl Packet {
    pub fn parse_impl(data: Span) -> IResult<Span, Packet> {
        let (i, _) = header(data)?;
        let (i, packet_type) = be_u8(i)?;

        match FromPrimitive::from_u8(packet_type) {
            Some(PacketType::DeviceNumClaim1) => DeviceNumClaim1Packet::parse(data),
            Some(PacketType::DeviceNumClaim2) => DeviceNumClaim2Packet::parse(data),
            Some(PacketType::DeviceNumClaim3) => DeviceNumClaim3Packet::parse(data),
            Some(PacketType::KeepAlive) => KeepAlivePacket::parse(data),
            Some(PacketType::AnnounceStatus) => {
                // Announce and status packets share the same packet type.
                // Announce Packets like all port 5000 packets, have a 0x00
                // following the packet_type field.
                if data[0xb] == 0x0 {
                    AnnouncePacket::parse(data)
                } else if data.len() < MixerStatusPacket::MAX_LEN {
                    MixerStatusPacket::parse(data)
                } else {
                    PlayerStatusPacket::parse(data)
                }
            }
            Some(PacketType::Beat) => BeatPacket::parse(data),
            Some(PacketType::LoadTrack) => LoadTrackCommandPacket::parse(data),
            Some(PacketType::SyncMode) => SyncModeCommandPacket::parse(data),
            Some(PacketType::OnAir) => OnAirCommandPacket::parse(data),
            Some(PacketType::FaderStart) => FaderStartCommandPacket::parse(data),
            Some(PacketType::MediaQuery) => MediaQueryPacket::parse(data),
            Some(PacketType::MediaResponse) => MediaResponsePacket::parse(data),
            Some(PacketType::MasterHandoffRequest) => MasterHandoffRequestPacket::parse(data),
            Some(PacketType::MasterHandoffResponse) => MasterHandoffResponsePacket::parse(data),
            _ => Err(nom::Err::Error(nom::error::Error::new(
                i,
                nom::error::ErrorKind::Tag,
            ))),
        }
    }
    pub fn parse(data: &[u8]) -> Result<Packet> {
        let (i, pkt) = match Self::parse_impl(Span::new(data)) {
            Ok((i, pkt)) => (i, pkt),
            Err(e) => {
                let timestamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)?
                    .as_millis();
                if cfg!(feature = "save_bad_packets") {
                    let path = format!("./bad-packets/bad-packet-{}.bin", timestamp);
                    fs::write(&path, data)?;
                }
                match e {
                    nom::Err::Error(e) | nom::Err::Failure(e) => {
                        return Err(ProlinkError::ParseError {
                            error_kind: format!("{:?}", e.code),
                            pos: e.input.location_offset(),
                            timestamp,
                            dump: pretty_hex(&data),
                        })
                    }
                    _ => return Err(anyhow!("Error parsing packet: {}", e).into()),
                };
            }
        };
        if !i.is_empty() {
            return Err(anyhow!("packet has extra data {} {:x?}", i.len(), i).into());
        }

        Ok(pkt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announce() {
        let test_cases = [
            (
                &[
                    0x51, 0x73, 0x70, 0x74, 0x31, 0x57, /* Qspt1W */
                    0x6d, 0x4a, 0x4f, 0x4c, 0x0a, 0x00, 0x43, 0x44, /* mJOL..CD */
                    0x4a, 0x2d, 0x39, 0x30, 0x30, 0x00, 0x00, 0x00, /* J-900... */
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, /* ........ */
                    0x00, 0x00, 0x01, 0x02, 0x00, 0x25, 0x01, /* .....%. */
                ][..],
                AnnouncePacket {
                    name: "CDJ-900".to_string(),
                    proto_ver: 2,
                },
            ),
            (
                &[
                    0x51, 0x73, 0x70, 0x74, 0x31, 0x57, /* Qspt1W */
                    0x6d, 0x4a, 0x4f, 0x4c, 0x0a, 0x00, 0x43, 0x44, /* mJOL..CD */
                    0x4a, 0x2d, 0x33, 0x30, 0x30, 0x30, 0x00, 0x00, /* J-3000.. */
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, /* ........ */
                    0x00, 0x00, 0x01, 0x03, 0x00, 0x26, 0x01, 0x00, /* .....&.. */
                ],
                AnnouncePacket {
                    name: "CDJ-3000".to_string(),
                    proto_ver: 3,
                },
            ),
        ];

        for (data, pkt) in test_cases {
            let mut c = std::io::Cursor::new(Vec::new());
            pkt.write(&mut c).unwrap();
            let v = c.into_inner();

            if pkt.proto_ver == 3 {
                assert_eq!(v.len(), 0x26);
            } else {
                assert_eq!(v.len(), 0x25);
            }
            assert_eq!(v.as_slice(), data);

            let (_, parsed) = AnnouncePacket::parse(Span::new(data)).unwrap();
            assert_eq!(parsed, Packet::Announce(pkt));
        }
    }

    #[test]
    fn test_claim1() {
        let test_cases = [
            (
                &[
                    0x51, 0x73, 0x70, 0x74, 0x31, 0x57, /* Qspt1W */
                    0x6d, 0x4a, 0x4f, 0x4c, 0x00, 0x00, 0x43, 0x44, /* mJOL..CD */
                    0x4a, 0x2d, 0x39, 0x30, 0x30, 0x00, 0x00, 0x00, /* J-900... */
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, /* ........ */
                    0x00, 0x00, 0x01, 0x02, 0x00, 0x2c, 0x01, 0x01, /* .....,.. */
                    0x00, 0xe0, 0x36, 0xd2, 0x68, 0xf8, /* ..6.h. */
                ],
                DeviceNumClaim1Packet {
                    name: "CDJ-900".to_string(),
                    proto_ver: 2,
                    pkt_num: 1,
                    mac_addr: [0x00, 0xe0, 0x36, 0xd2, 0x68, 0xf8],
                },
            ),
            (
                &[
                    0x51, 0x73, 0x70, 0x74, 0x31, 0x57, /* Qspt1W */
                    0x6d, 0x4a, 0x4f, 0x4c, 0x00, 0x00, 0x43, 0x44, /* mJOL..CD */
                    0x4a, 0x2d, 0x33, 0x30, 0x30, 0x30, 0x00, 0x00, /* J-3000.. */
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, /* ........ */
                    0x00, 0x00, 0x01, 0x03, 0x00, 0x2c, 0x03, 0x01, /* .....,.. */
                    0xc8, 0x3d, 0xfc, 0x0b, 0xf5, 0x1f, /* .=.... */
                ],
                DeviceNumClaim1Packet {
                    name: "CDJ-3000".to_string(),
                    proto_ver: 3,
                    pkt_num: 3,
                    mac_addr: [0xc8, 0x3d, 0xfc, 0x0b, 0xf5, 0x1f],
                },
            ),
        ];

        for (data, pkt) in test_cases {
            let mut c = std::io::Cursor::new(Vec::new());
            pkt.write(&mut c).unwrap();
            let v = c.into_inner();

            assert_eq!(v.len(), 0x2c);
            assert_eq!(v.as_slice(), data);

            let (_, parsed) = DeviceNumClaim1Packet::parse(Span::new(data)).unwrap();
            assert_eq!(parsed, Packet::DeviceNumClaim1(pkt));
        }
    }

    #[test]
    fn test_claim2() {
        let test_cases = [
            (
                &[
                    0x51, 0x73, 0x70, 0x74, 0x31, 0x57, /* Qspt1W */
                    0x6d, 0x4a, 0x4f, 0x4c, 0x02, 0x00, 0x43, 0x44, /* mJOL..CD */
                    0x4a, 0x2d, 0x39, 0x30, 0x30, 0x00, 0x00, 0x00, /* J-900... */
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, /* ........ */
                    0x00, 0x00, 0x01, 0x02, 0x00, 0x32, 0xc0, 0xa8, /* .....2.. */
                    0x01, 0xf7, 0x00, 0xe0, 0x36, 0xd2, 0x68, 0xf8, /* ....6.h. */
                    0x03, 0x01, 0x01, 0x02, /* .... */
                ],
                DeviceNumClaim2Packet {
                    name: "CDJ-900".to_string(),
                    proto_ver: 2,
                    ip_addr: [192, 168, 1, 247],
                    mac_addr: [0x00, 0xe0, 0x36, 0xd2, 0x68, 0xf8],
                    device_num: 3,
                    pkt_num: 1,
                    auto_assign: false,
                },
            ),
            (
                &[
                    0x51, 0x73, 0x70, 0x74, 0x31, 0x57, /* .{Qspt1W */
                    0x6d, 0x4a, 0x4f, 0x4c, 0x02, 0x00, 0x43, 0x44, /* mJOL..CD */
                    0x4a, 0x2d, 0x33, 0x30, 0x30, 0x30, 0x00, 0x00, /* J-3000.. */
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, /* ........ */
                    0x00, 0x00, 0x01, 0x03, 0x00, 0x32, 0xc0, 0xa8, /* .....2.. */
                    0x01, 0xf3, 0xc8, 0x3d, 0xfc, 0x0b, 0xf5, 0x1f, /* ...=.... */
                    0x02, 0x01, 0x01, 0x02, /* .... */
                ],
                DeviceNumClaim2Packet {
                    name: "CDJ-3000".to_string(),
                    proto_ver: 3,
                    ip_addr: [192, 168, 1, 243],
                    mac_addr: [0xc8, 0x3d, 0xfc, 0x0b, 0xf5, 0x1f],
                    device_num: 2,
                    pkt_num: 1,
                    auto_assign: false,
                },
            ),
        ];

        for (data, pkt) in test_cases {
            let mut c = std::io::Cursor::new(Vec::new());
            pkt.write(&mut c).unwrap();
            let v = c.into_inner();

            assert_eq!(v.len(), 0x32);
            assert_eq!(v.as_slice(), data);

            let (_, parsed) = DeviceNumClaim2Packet::parse(Span::new(data)).unwrap();
            assert_eq!(parsed, Packet::DeviceNumClaim2(pkt));
        }
    }

    #[test]
    fn test_claim3() {
        let test_cases = [
            (
                &[
                    0x51, 0x73, 0x70, 0x74, 0x31, 0x57, /* Qspt1W */
                    0x6d, 0x4a, 0x4f, 0x4c, 0x04, 0x00, 0x43, 0x44, /* mJOL..CD */
                    0x4a, 0x2d, 0x39, 0x30, 0x30, 0x00, 0x00, 0x00, /* J-900... */
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, /* ........ */
                    0x00, 0x00, 0x01, 0x02, 0x00, 0x26, 0x03, 0x02, /* .....&.. */
                ],
                DeviceNumClaim3Packet {
                    name: "CDJ-900".to_string(),
                    proto_ver: 2,
                    device_num: 3,
                    pkt_num: 2,
                },
            ),
            (
                &[
                    0x51, 0x73, 0x70, 0x74, 0x31, 0x57, /* Qspt1W */
                    0x6d, 0x4a, 0x4f, 0x4c, 0x04, 0x00, 0x43, 0x44, /* mJOL..CD */
                    0x4a, 0x2d, 0x33, 0x30, 0x30, 0x30, 0x00, 0x00, /* J-3000.. */
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, /* ........ */
                    0x00, 0x00, 0x01, 0x03, 0x00, 0x26, 0x00, 0x01, /* .....&.. */
                ],
                DeviceNumClaim3Packet {
                    name: "CDJ-3000".to_string(),
                    proto_ver: 3,
                    device_num: 0, // huh?
                    pkt_num: 1,
                },
            ),
        ];
        for (data, pkt) in test_cases {
            let mut c = std::io::Cursor::new(Vec::new());
            pkt.write(&mut c).unwrap();
            let v = c.into_inner();

            assert_eq!(v.len(), 0x26);
            assert_eq!(v.as_slice(), data);

            let (_, parsed) = DeviceNumClaim3Packet::parse(Span::new(data)).unwrap();
            assert_eq!(parsed, Packet::DeviceNumClaim3(pkt));
        }
    }

    #[test]
    fn test_keep_alive() {
        let test_cases = [
            (
                &[
                    0x51, 0x73, 0x70, 0x74, 0x31, 0x57, /* Qspt1W */
                    0x6d, 0x4a, 0x4f, 0x4c, 0x06, 0x00, 0x43, 0x44, /* mJOL..CD */
                    0x4a, 0x2d, 0x33, 0x30, 0x30, 0x30, 0x00, 0x00, /* J-3000.. */
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, /* ........ */
                    0x00, 0x00, 0x01, 0x03, 0x00, 0x36, 0x02, 0x01, /* .....6.. */
                    0xc8, 0x3d, 0xfc, 0x0b, 0xf5, 0x1f, 0xc0, 0xa8, /* .=...... */
                    0x01, 0xf3, 0x01, 0x00, 0x00, 0x00, 0x01, 0x24, /* .......$ */
                ],
                KeepAlivePacket {
                    name: "CDJ-3000".to_string(),
                    proto_ver: 3,
                    device_num: 2,
                    device_type: 1,
                    mac_addr: [0xc8, 0x3d, 0xfc, 0x0b, 0xf5, 0x1f],
                    ip_addr: [192, 168, 1, 243],
                    peers_seen: 1,
                    unknown_35: 0x24,
                },
            ),
            (
                &[
                    0x51, 0x73, 0x70, 0x74, 0x31, 0x57, /* Qspt1W */
                    0x6d, 0x4a, 0x4f, 0x4c, 0x06, 0x00, 0x43, 0x44, /* mJOL..CD */
                    0x4a, 0x2d, 0x39, 0x30, 0x30, 0x00, 0x00, 0x00, /* J-900... */
                    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, /* ........ */
                    0x00, 0x00, 0x01, 0x02, 0x00, 0x36, 0x02, 0x02, /* .....6.. */
                    0x00, 0xe0, 0x36, 0xd2, 0x68, 0xf8, 0xc0, 0xa8, /* ..6.h... */
                    0x01, 0xf7, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, /* ........ */
                ],
                KeepAlivePacket {
                    name: "CDJ-900".to_string(),
                    proto_ver: 2,
                    device_num: 2,
                    device_type: 2,
                    mac_addr: [0x00, 0xe0, 0x36, 0xd2, 0x68, 0xf8],
                    ip_addr: [192, 168, 1, 247],
                    peers_seen: 1,
                    unknown_35: 0x00,
                },
            ),
        ];

        for (data, pkt) in test_cases {
            let mut c = std::io::Cursor::new(Vec::new());
            pkt.write(&mut c).unwrap();
            let v = c.into_inner();

            assert_eq!(v.len(), 0x36);
            assert_eq!(v.as_slice(), data);

            let (_, parsed) = KeepAlivePacket::parse(Span::new(data)).unwrap();
            assert_eq!(parsed, Packet::KeepAlive(pkt));
        }
    }

    #[test]
    fn test_beat_round_trip() {
        let pkt = BeatPacket {
            name: "prolink-rs".to_string(),
            device_num: 5,
            next_beat: 469,
            second_beat: 938,
            next_bar: 1407,
            fourth_beat: 1876,
            second_bar: 2815,
            eighth_beat: 234,
            pitch: 0.0,
            bpm: 128.0,
            beat: 3,
        };

        let mut data = Vec::new();
        pkt.write(&mut data).unwrap();

        let (_, parsed) = BeatPacket::parse(Span::new(&data)).unwrap();
        assert_eq!(parsed, Packet::Beat(pkt));
    }

    #[test]
    fn test_load_track_command_round_trip() {
        let pkt = LoadTrackCommandPacket {
            name: "prolink-rs".to_string(),
            device_num: 1,
            target_device: 2,
            source_player: 1,
            source_slot: 3,
            track_type: 1,
            rekordbox_id: 0x73,
        };

        let mut data = Vec::new();
        pkt.write(&mut data).unwrap();

        let (_, parsed) = Packet::parse_impl(Span::new(&data)).unwrap();
        assert_eq!(parsed, Packet::LoadTrackCommand(pkt));
    }

    #[test]
    fn test_sync_mode_command_round_trip() {
        let pkt = SyncModeCommandPacket {
            name: "prolink-rs".to_string(),
            device_num: 1,
            target_device: 2,
            sync: true,
        };

        let mut data = Vec::new();
        pkt.write(&mut data).unwrap();

        let (_, parsed) = Packet::parse_impl(Span::new(&data)).unwrap();
        assert_eq!(parsed, Packet::SyncModeCommand(pkt));
    }

    #[test]
    fn test_on_air_command_round_trip() {
        let pkt = OnAirCommandPacket {
            name: "prolink-rs".to_string(),
            device_num: 1,
            players: [true, false, true, false],
        };

        let mut data = Vec::new();
        pkt.write(&mut data).unwrap();

        let (_, parsed) = Packet::parse_impl(Span::new(&data)).unwrap();
        assert_eq!(parsed, Packet::OnAirCommand(pkt));
    }

    #[test]
    fn test_fader_start_command_round_trip() {
        let pkt = FaderStartCommandPacket {
            name: "prolink-rs".to_string(),
            device_num: 1,
            start: [true, false, false, false],
            stop: [false, false, true, false],
        };

        let mut data = Vec::new();
        pkt.write(&mut data).unwrap();

        let (_, parsed) = Packet::parse_impl(Span::new(&data)).unwrap();
        assert_eq!(parsed, Packet::FaderStartCommand(pkt));
    }

    #[test]
    fn test_media_query_round_trip() {
        let pkt = MediaQueryPacket {
            name: "prolink-rs".to_string(),
            device_num: 1,
            target_device: 2,
            slot: 2,
        };

        let mut data = Vec::new();
        pkt.write(&mut data).unwrap();

        let (_, parsed) = Packet::parse_impl(Span::new(&data)).unwrap();
        assert_eq!(parsed, Packet::MediaQuery(pkt));
    }

    #[test]
    fn test_media_response_round_trip() {
        let pkt = MediaResponsePacket {
            name: "CDJ-3000".to_string(),
            device_num: 2,
            slot: 2,
            track_count: 437,
            playlist_count: 12,
            has_rekordbox_database: true,
            total_bytes: 64_000_000_000,
            free_bytes: 12_000_000_000,
        };

        let mut data = Vec::new();
        pkt.write(&mut data).unwrap();

        let (_, parsed) = Packet::parse_impl(Span::new(&data)).unwrap();
        assert_eq!(parsed, Packet::MediaResponse(pkt));
    }

    #[test]
    fn test_player_status_round_trip() {
        let pkt = PlayerStatusPacket {
            name: "prolink-rs".to_string(),
            unknown_10: 0x01,
            device_num: 5,
            unknown_16: 0x00,
            active: 0x04,
            track_device: 2,
            track_slot: 3,
            track_type: 1,
            rekordbox_id: 0x73,
            track_num: 1,
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
            flags: 0x38, // master + synced + on air
            unknown_8b: 0,
            play_state: 0x03,
            pitch_1: 0x100000,
            m_v: 0,
            bpm: 12800,
            unknown_94: 0,
            pitch_2: 0x100000,
            p_3: 0,
            m_m: 0,
            m_h: 0,
            beat: 42,
            cue: 0,
            bar_beat: 2,
            media_presence: 1,
            u_e: 0,
            s_e: 0,
            emergency_loop_active: 0,
            pitch_3: 0x100000,
            pitch_4: 0x100000,
            seq_num: 7,
            player_type: 0x05,
            unknown_cd: [0; 3],
            extra0: None,
        };

        let mut data = Vec::new();
        pkt.write(&mut data).unwrap();

        let (_, parsed) = Packet::parse_impl(Span::new(&data)).unwrap();
        match parsed {
            Packet::PlayerStatus(parsed) => {
                assert!(parsed.is_master());
                assert!(parsed.is_synced());
                assert!(parsed.is_on_air());
                assert!(parsed.is_playing());
                assert_eq!(parsed, pkt);
            }
            other => panic!("expected player status, got {:?}", other),
        }
    }

    #[test]
    fn test_master_handoff_round_trip() {
        let req = MasterHandoffRequestPacket {
            name: "prolink-rs".to_string(),
            device_num: 5,
            target_device: 2,
        };
        let mut data = Vec::new();
        req.write(&mut data).unwrap();
        let (_, parsed) = Packet::parse_impl(Span::new(&data)).unwrap();
        assert_eq!(parsed, Packet::MasterHandoffRequest(req));

        let resp = MasterHandoffResponsePacket {
            name: "CDJ-2000".to_string(),
            device_num: 2,
            yielding_to: 5,
        };
        let mut data = Vec::new();
        resp.write(&mut data).unwrap();
        let (_, parsed) = Packet::parse_impl(Span::new(&data)).unwrap();
        assert_eq!(parsed, Packet::MasterHandoffResponse(resp));
    }

    #[test]
    fn test_parse_bad_packet_is_reported() {
        // Truncated announce packet: header and type only, no device name.
        let data = &[
            0x51, 0x73, 0x70, 0x74, 0x31, 0x57, 0x6d, 0x4a, 0x4f, 0x4c, 0x0a,
        ][..];

        match Packet::parse(data) {
            Err(ProlinkError::ParseError { .. }) => (),
            other => panic!("expected a parse error, got {:?}", other),
        }
    }
}
