use std::{
    collections::{HashMap, HashSet},
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use anyhow::anyhow;
use log::info;
use mac_address::mac_address_by_name;
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig, V4IfAddr};
use tokio::{
    net::UdpSocket,
    sync::{broadcast, mpsc, watch},
    time::{self, Instant},
};

use crate::{
    message,
    proto::{self, KeepAlivePacket},
    Config, Message, Peer, PeerEvent, ProlinkError, Result,
};

/// Announces our presence on port 50000, claims a device number, and then
/// keeps broadcasting keep-alives while tracking who else is on the
/// network.
pub(crate) struct FinderTask {
    config: Config,
    joined_tx: watch::Sender<Option<u8>>,
    peers_tx: broadcast::Sender<PeerEvent>,
    msg_tx: mpsc::Sender<Message>,
    socket: UdpSocket,
    my_addr: SocketAddr,
    broadcast_addr: SocketAddr,
    mac_addr: [u8; 6],
    ip_addr: [u8; 4],
    device_num: u8,
    peers: HashMap<u8, Peer>,
}

fn ipv4_iface(iface: &NetworkInterface) -> Option<(String, V4IfAddr)> {
    match iface.addr {
        Some(Addr::V4(a)) => Some((iface.name.clone(), a)),
        _ => None,
    }
}

impl FinderTask {
    pub(crate) async fn new(
        config: &Config,
        joined_tx: watch::Sender<Option<u8>>,
        peers_tx: broadcast::Sender<PeerEvent>,
        msg_tx: mpsc::Sender<Message>,
    ) -> Result<FinderTask> {
        let all_interfaces =
            NetworkInterface::show().map_err(|e| anyhow!("can't get network interfaces: {}", e))?;

        let mut network_interfaces = all_interfaces.iter().filter_map(ipv4_iface);

        let (name, addr) = if let Some(iface_name) = &config.interface_name {
            network_interfaces
                .find(|(name, _)| name == iface_name)
                .ok_or_else(|| anyhow!("Can't find interface \"{}\".", iface_name))?
        } else {
            network_interfaces
                .next()
                .ok_or_else(|| anyhow!("Can't find a default interface."))?
        };

        let mac = mac_address_by_name(&name)
            .map_err(|e| anyhow!("failed to look up mac address: {}", e))?
            .ok_or_else(|| anyhow!("failed to look up mac address"))?;
        let ip = IpAddr::V4(addr.ip);
        let my_addr = SocketAddr::new(ip, 50000);
        let ip_addr = addr.ip.octets();
        let mac_addr = mac.bytes();

        let broadcast_addr = SocketAddr::new(
            IpAddr::V4(addr.broadcast.ok_or_else(|| anyhow!("Can't get broadcast addr"))?),
            50000,
        );

        let socket = UdpSocket::bind("0.0.0.0:50000").await?;
        socket.set_broadcast(true)?;

        Ok(FinderTask {
            config: config.clone(),
            joined_tx,
            peers_tx,
            msg_tx,
            socket,
            my_addr,
            broadcast_addr,
            mac_addr,
            ip_addr,
            device_num: config.device_num,
            peers: HashMap::new(),
        })
    }

    /// The device number we ended up claiming, which may differ from
    /// `config.device_num` when auto-assignment kicked in.
    pub(crate) fn device_num(&self) -> u8 {
        self.device_num
    }

    async fn process_timeouts(&mut self) -> Result<()> {
        let now = Instant::now();

        let timed_out: Vec<u8> = self
            .peers
            .iter()
            .filter(|(_id, peer)| (now - peer.last_seen) > Duration::from_secs(10))
            .map(|(id, _peer)| *id)
            .collect();

        for id in &timed_out {
            if let Some(peer) = self.peers.remove(id) {
                info!("peer left {:?}", &peer);
                self.msg_tx
                    .send(Message::DeviceLost(message::Peer {
                        name: peer.name.clone(),
                        device_num: peer.device_num,
                        mac_addr: peer.mac_addr,
                        ip_addr: peer.ip_addr,
                    }))
                    .await?;
                self.peers_tx
                    .send(PeerEvent::Left(peer))
                    .map_err(|e| anyhow!("failed to send peer left event: {}", e))?;
            }
        }

        Ok(())
    }

    pub(crate) async fn run(&mut self) -> Result<()> {
        match self.run_impl().await {
            Err(ProlinkError::Terminating) => Ok(()),
            other => other,
        }
    }

    async fn run_impl(&mut self) -> Result<()> {
        self.join().await?;

        let mut keep_alive = proto::KeepAlivePacket {
            name: self.config.name.clone(),
            proto_ver: 2,
            device_num: self.device_num,
            device_type: 1,
            mac_addr: self.mac_addr,
            ip_addr: self.ip_addr,
            peers_seen: 1,
            unknown_35: 1,
        };

        let mut keep_alive_data = Vec::new();
        let announce_interval = Duration::from_millis(self.config.announce_interval_ms);
        loop {
            self.process_timeouts().await?;
            keep_alive.peers_seen = self.peers.len() as u8 + 1u8;
            keep_alive_data.clear();
            keep_alive.write(&mut keep_alive_data)?;
            self.socket
                .send_to(&keep_alive_data, self.broadcast_addr)
                .await?;
            self.wait(announce_interval).await?;
        }
    }

    async fn join(&mut self) -> Result<()> {
        let phase_delay = Duration::from_millis(300);

        // Phase 1: announce our presence and see who else answers.
        let announce = proto::AnnouncePacket {
            name: self.config.name.clone(),
            proto_ver: 2,
        };
        let mut announce_data = Vec::new();
        announce.write(&mut announce_data)?;
        for _ in 0..3 {
            self.socket
                .send_to(&announce_data, self.broadcast_addr)
                .await?;
            self.wait(phase_delay).await?;
        }

        if !self.config.use_standard_player_number {
            self.device_num = self.pick_free_device_num();
        }

        // Phase 2: claim 1, broadcasting our MAC so others can object.
        let mut claim1 = proto::DeviceNumClaim1Packet {
            name: self.config.name.clone(),
            proto_ver: 2,
            pkt_num: 0,
            mac_addr: self.mac_addr,
        };
        for i in 1..4 {
            let mut data = Vec::new();
            claim1.pkt_num = i;
            claim1.write(&mut data)?;
            self.socket.send_to(&data, self.broadcast_addr).await?;
            self.wait(phase_delay).await?;
        }

        // Phase 3: claim 2, naming the device number we intend to use.
        let mut claim2 = proto::DeviceNumClaim2Packet {
            name: self.config.name.clone(),
            proto_ver: 2,
            ip_addr: self.ip_addr,
            mac_addr: self.mac_addr,
            device_num: self.device_num,
            pkt_num: 0,
            auto_assign: false,
        };
        for i in 1..4 {
            let mut data = Vec::new();
            claim2.pkt_num = i;
            claim2.write(&mut data)?;
            self.socket.send_to(&data, self.broadcast_addr).await?;
            self.wait(phase_delay).await?;
        }

        // Phase 4: claim 3, a single packet finalizing the assignment.
        let claim3 = proto::DeviceNumClaim3Packet {
            name: self.config.name.clone(),
            proto_ver: 2,
            device_num: self.device_num,
            pkt_num: 1,
        };
        let mut data = Vec::new();
        claim3.write(&mut data)?;
        self.socket.send_to(&data, self.broadcast_addr).await?;
        self.wait(phase_delay).await?;

        self.joined_tx.send(Some(self.device_num()))?;
        Ok(())
    }

    fn pick_free_device_num(&self) -> u8 {
        let taken: HashSet<u8> = self.peers.keys().copied().collect();
        if !taken.contains(&self.config.device_num) {
            return self.config.device_num;
        }
        (1..=15).find(|n| !taken.contains(n)).unwrap_or(self.config.device_num)
    }

    async fn wait(&mut self, dur: Duration) -> Result<()> {
        self.wait_until(Instant::now() + dur).await
    }

    async fn wait_until(&mut self, when: Instant) -> Result<()> {
        let timeout = time::sleep_until(when);
        tokio::pin!(timeout);

        let mut buf = [0; 4096];
        loop {
            tokio::select! {
                _ = &mut timeout => {
                    return Ok(())
                }
                _ = self.msg_tx.closed() => {
                    return Err(ProlinkError::Terminating);
                }
                res = self.socket.recv_from(&mut buf) => {
                    if let Ok((len, src)) = res {
                        let pkt_buf = &buf[0..len];
                        if src != self.my_addr {
                            if let Ok(proto::Packet::KeepAlive(ka)) = proto::Packet::parse(pkt_buf) {
                                self.handle_keep_alive(&ka).await?;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn handle_keep_alive(&mut self, ka: &KeepAlivePacket) -> Result<()> {
        let peer = Peer {
            name: ka.name.clone(),
            device_num: ka.device_num,
            mac_addr: ka.mac_addr,
            ip_addr: ka.ip_addr,
            proto_ver: ka.proto_ver,
            last_seen: Instant::now(),
        };
        let mut new = false;

        if let Some(prev) = self.peers.insert(ka.device_num, peer.clone()) {
            if !prev.is_same(&peer) {
                info!("peer left {:?}", &prev);
                self.msg_tx
                    .send(Message::DeviceLost(message::Peer {
                        name: prev.name.clone(),
                        device_num: prev.device_num,
                        mac_addr: prev.mac_addr,
                        ip_addr: prev.ip_addr,
                    }))
                    .await?;
                self.peers_tx
                    .send(PeerEvent::Left(prev))
                    .map_err(|e| anyhow!("failed to send peer left event: {}", e))?;
                new = true;
            }
        } else {
            new = true;
        }

        if new {
            info!("peer joined {:?}", &peer);
            self.msg_tx
                .send(Message::DeviceFound(message::Peer {
                    name: peer.name.clone(),
                    device_num: peer.device_num,
                    mac_addr: peer.mac_addr,
                    ip_addr: peer.ip_addr,
                }))
                .await?;
            self.peers_tx
                .send(PeerEvent::Joined(peer))
                .map_err(|e| anyhow!("failed to send peer joined event: {}", e))?;
        }

        Ok(())
    }
}
