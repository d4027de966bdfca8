// OSC 1.0 encoding and decoding, plus the TCP framing used to talk to players. Each packet is
// sent as a 4-byte big-endian length followed by the encoded packet.

use crate::error::AldaError;
use anyhow::{anyhow, bail};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970)
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
/// Timetag meaning "immediately"
pub const IMMEDIATELY: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    String(String),
}
impl OscArg {
    fn tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::String(_) => 's',
        }
    }
}
impl From<i32> for OscArg {
    fn from(value: i32) -> Self {
        OscArg::Int(value)
    }
}
impl From<&str> for OscArg {
    fn from(value: &str) -> Self {
        OscArg::String(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}
impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    pub fn int_args(&self) -> Vec<i32> {
        self.args
            .iter()
            .filter_map(|a| match a {
                OscArg::Int(i) => Some(*i),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscBundle {
    pub timetag: u64,
    pub elements: Vec<OscPacket>,
}
impl OscBundle {
    /// A bundle stamped with the current wall-clock time
    pub fn now(elements: Vec<OscPacket>) -> Self {
        Self {
            timetag: ntp_timetag(SystemTime::now()),
            elements,
        }
    }

    /// All messages in the bundle, including those in nested bundles, in order.
    pub fn messages(&self) -> Vec<&OscMessage> {
        let mut out = Vec::new();
        for p in &self.elements {
            match p {
                OscPacket::Message(m) => out.push(m),
                OscPacket::Bundle(b) => out.extend(b.messages()),
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle(OscBundle),
}
impl From<OscMessage> for OscPacket {
    fn from(value: OscMessage) -> Self {
        OscPacket::Message(value)
    }
}
impl From<OscBundle> for OscPacket {
    fn from(value: OscBundle) -> Self {
        OscPacket::Bundle(value)
    }
}

pub fn ntp_timetag(t: SystemTime) -> u64 {
    let since_epoch = t.duration_since(UNIX_EPOCH).unwrap_or_default();
    let seconds = since_epoch.as_secs() + NTP_UNIX_OFFSET;
    let fraction = (since_epoch.subsec_nanos() as u64 * (1u64 << 32)) / 1_000_000_000;
    (seconds << 32) | fraction
}

fn pad(buf: &mut Vec<u8>) {
    while !buf.len().is_multiple_of(4) {
        buf.push(0);
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    pad(buf);
}

pub fn encode_packet(packet: &OscPacket) -> Vec<u8> {
    let mut buf = Vec::new();
    match packet {
        OscPacket::Message(m) => {
            write_string(&mut buf, &m.address);
            let tags: String = std::iter::once(',').chain(m.args.iter().map(OscArg::tag)).collect();
            write_string(&mut buf, &tags);
            for arg in &m.args {
                match arg {
                    OscArg::Int(i) => buf.extend_from_slice(&i.to_be_bytes()),
                    OscArg::Float(f) => buf.extend_from_slice(&f.to_be_bytes()),
                    OscArg::String(s) => write_string(&mut buf, s),
                }
            }
        }
        OscPacket::Bundle(b) => {
            write_string(&mut buf, "#bundle");
            buf.extend_from_slice(&b.timetag.to_be_bytes());
            for element in &b.elements {
                let data = encode_packet(element);
                buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
                buf.extend_from_slice(&data);
            }
        }
    }
    buf
}

struct Reader<'a> {
    data: &'a [u8],
}
impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> anyhow::Result<&'a [u8]> {
        if self.data.len() < n {
            bail!("truncated OSC packet");
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Ok(head)
    }

    fn u32(&mut self) -> anyhow::Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> anyhow::Result<u64> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok((hi << 32) | lo)
    }

    fn string(&mut self) -> anyhow::Result<String> {
        let end = self
            .data
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| anyhow!("unterminated OSC string"))?;
        let s = str::from_utf8(&self.data[..end])?.to_string();
        // The terminator and padding together bring the length to a multiple of 4.
        self.take((end / 4 + 1) * 4)?;
        Ok(s)
    }
}

pub fn decode_packet(data: &[u8]) -> anyhow::Result<OscPacket> {
    let mut r = Reader { data };
    if data.starts_with(b"#bundle\0") {
        r.take(8)?;
        let timetag = r.u64()?;
        let mut elements = Vec::new();
        while !r.data.is_empty() {
            let size = r.u32()? as usize;
            elements.push(decode_packet(r.take(size)?)?);
        }
        return Ok(OscPacket::Bundle(OscBundle { timetag, elements }));
    }
    let address = r.string()?;
    if !address.starts_with('/') {
        bail!("invalid OSC address: {address:?}");
    }
    let tags = r.string()?;
    let Some(tags) = tags.strip_prefix(',') else {
        bail!("OSC type tag string must start with ','");
    };
    let mut args = Vec::new();
    for tag in tags.chars() {
        args.push(match tag {
            'i' => OscArg::Int(r.u32()? as i32),
            'f' => OscArg::Float(f32::from_bits(r.u32()?)),
            's' => OscArg::String(r.string()?),
            _ => bail!("unsupported OSC type tag: {tag}"),
        });
    }
    Ok(OscPacket::Message(OscMessage { address, args }))
}

/// Read one length-prefixed packet. Returns `None` at a clean end of stream.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> anyhow::Result<Option<OscPacket>> {
    let mut len = [0u8; 4];
    match r.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let mut data = vec![0u8; u32::from_be_bytes(len) as usize];
    r.read_exact(&mut data).await?;
    decode_packet(&data).map(Some)
}

/// Send a packet to the player on `port` using a fresh connection.
pub async fn send(port: u16, packet: &OscPacket) -> anyhow::Result<()> {
    let data = encode_packet(packet);
    let transport = |source| AldaError::Transport { port, source };
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .map_err(transport)?;
    let mut frame = Vec::with_capacity(data.len() + 4);
    frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
    frame.extend_from_slice(&data);
    stream.write_all(&frame).await.map_err(transport)?;
    stream.flush().await.map_err(transport)?;
    stream.shutdown().await.map_err(transport)?;
    log::debug!("sent {} bytes to port {port}", frame.len());
    Ok(())
}
