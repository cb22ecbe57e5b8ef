//! Just enough of the ATEM UDP framing to keep a session alive and read the
//! state commands the exporter projects.
//!
//! Packets carry a 12-byte header followed by zero or more command blocks.
//! Each block is `u16 length, u16 pad, 4-byte ASCII name, payload`, with the
//! length covering the 8-byte block header.

/// UDP port the switcher listens on.
pub const ATEM_PORT: u16 = 9910;

pub const HEADER_LEN: usize = 12;

// Header flag bits (top 5 bits of the first u16; low 11 bits are the length).
pub const FLAG_ACK_REQUEST: u16 = 0x01;
pub const FLAG_HELLO: u16 = 0x02;
pub const FLAG_RESEND: u16 = 0x04;
pub const FLAG_ACK: u16 = 0x10;

/// Parsed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub flags: u16,
    pub len: usize,
    pub session_id: u16,
    pub acked_id: u16,
    pub remote_seq: u16,
}

impl PacketHeader {
    pub fn has(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }
}

/// Parse the 12-byte header. Returns `None` for runts or packets whose
/// declared length exceeds the datagram.
pub fn parse_header(buf: &[u8]) -> Option<PacketHeader> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let word = u16::from_be_bytes([buf[0], buf[1]]);
    let len = (word & 0x07ff) as usize;
    if len < HEADER_LEN || len > buf.len() {
        return None;
    }
    Some(PacketHeader {
        flags: word >> 11,
        len,
        session_id: u16::from_be_bytes([buf[2], buf[3]]),
        acked_id: u16::from_be_bytes([buf[4], buf[5]]),
        remote_seq: u16::from_be_bytes([buf[10], buf[11]]),
    })
}

/// Client hello opening a new session.
pub fn hello_packet() -> [u8; 20] {
    let mut pkt = [0u8; 20];
    pkt[0..2].copy_from_slice(&((FLAG_HELLO << 11) | 20).to_be_bytes());
    // Arbitrary client-chosen session id; the switcher assigns its own after
    // the handshake.
    pkt[2..4].copy_from_slice(&0x1337u16.to_be_bytes());
    pkt[12] = 0x01;
    pkt
}

/// Bare acknowledgement for a reliable packet.
pub fn ack_packet(session_id: u16, remote_seq: u16) -> [u8; 12] {
    let mut pkt = [0u8; 12];
    pkt[0..2].copy_from_slice(&((FLAG_ACK << 11) | HEADER_LEN as u16).to_be_bytes());
    pkt[2..4].copy_from_slice(&session_id.to_be_bytes());
    pkt[4..6].copy_from_slice(&remote_seq.to_be_bytes());
    pkt
}

/// A resend of the packet most recently processed; its commands must not be
/// applied twice.
pub fn is_duplicate_resend(header: &PacketHeader, last_processed: Option<u16>) -> bool {
    header.has(FLAG_RESEND) && last_processed == Some(header.remote_seq)
}

/// Iterator over the command blocks in a packet body (after the header).
pub struct CommandIter<'a> {
    buf: &'a [u8],
}

impl<'a> CommandIter<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self { buf: body }
    }
}

impl<'a> Iterator for CommandIter<'a> {
    /// (command name, payload)
    type Item = ([u8; 4], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.len() < 8 {
            return None;
        }
        let len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
        if len < 8 || len > self.buf.len() {
            // Malformed block; stop rather than misparse the rest.
            return None;
        }
        let name = [self.buf[4], self.buf[5], self.buf[6], self.buf[7]];
        let payload = &self.buf[8..len];
        self.buf = &self.buf[len..];
        Some((name, payload))
    }
}

/// Audio gains are carried as a u16 on a logarithmic scale with 0 dB at
/// 32768.
pub fn uint16_to_decibel(raw: u16) -> f64 {
    if raw == 0 {
        return f64::NEG_INFINITY;
    }
    20.0 * (f64::from(raw) / 32768.0).log10()
}

/// Standard video mode table: code -> (label, frame rate).
/// Interlaced modes report the frame rate, not the field rate.
pub fn video_mode(code: u8) -> Option<(&'static str, f64)> {
    let mode = match code {
        0 => ("525i59.94 NTSC", 29.97),
        1 => ("625i50 PAL", 25.0),
        2 => ("525i59.94 NTSC 16:9", 29.97),
        3 => ("625i50 PAL 16:9", 25.0),
        4 => ("720p50", 50.0),
        5 => ("720p59.94", 59.94),
        6 => ("1080i50", 25.0),
        7 => ("1080i59.94", 29.97),
        8 => ("1080p23.98", 23.98),
        9 => ("1080p24", 24.0),
        10 => ("1080p25", 25.0),
        11 => ("1080p29.97", 29.97),
        12 => ("1080p50", 50.0),
        13 => ("1080p59.94", 59.94),
        14 => ("2160p23.98", 23.98),
        15 => ("2160p24", 24.0),
        16 => ("2160p25", 25.0),
        17 => ("2160p29.97", 29.97),
        18 => ("2160p50", 50.0),
        19 => ("2160p59.94", 59.94),
        _ => return None,
    };
    Some(mode)
}

/// Read a NUL-terminated ASCII string from a fixed-size field.
pub fn read_cstr(payload: &[u8]) -> String {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_via_ack() {
        let pkt = ack_packet(0xbeef, 42);
        let header = parse_header(&pkt).unwrap();

        assert!(header.has(FLAG_ACK));
        assert!(!header.has(FLAG_HELLO));
        assert_eq!(header.len, HEADER_LEN);
        assert_eq!(header.session_id, 0xbeef);
        assert_eq!(header.acked_id, 42);
    }

    #[test]
    fn hello_packet_shape() {
        let pkt = hello_packet();
        let header = parse_header(&pkt).unwrap();

        assert!(header.has(FLAG_HELLO));
        assert_eq!(header.len, 20);
        assert_eq!(pkt[12], 0x01);
    }

    #[test]
    fn duplicate_resend_detection() {
        let resent = PacketHeader {
            flags: FLAG_ACK_REQUEST | FLAG_RESEND,
            len: HEADER_LEN,
            session_id: 1,
            acked_id: 0,
            remote_seq: 7,
        };
        assert!(is_duplicate_resend(&resent, Some(7)));
        assert!(!is_duplicate_resend(&resent, Some(6)));
        assert!(!is_duplicate_resend(&resent, None));

        // A fresh (non-resent) packet with a seen sequence is not a duplicate.
        let fresh = PacketHeader {
            flags: FLAG_ACK_REQUEST,
            ..resent
        };
        assert!(!is_duplicate_resend(&fresh, Some(7)));
    }

    #[test]
    fn rejects_runt_and_overlong_headers() {
        assert!(parse_header(&[0u8; 4]).is_none());

        // Declared length larger than the datagram.
        let mut pkt = ack_packet(1, 1).to_vec();
        pkt[1] = 0xff;
        assert!(parse_header(&pkt).is_none());
    }

    #[test]
    fn command_iter_walks_blocks() {
        let mut body = Vec::new();
        for (name, payload) in [(b"PrgI", &[0u8, 0, 0, 1][..]), (b"InCm", &[0u8, 0, 0, 0][..])] {
            body.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
            body.extend_from_slice(&[0, 0]);
            body.extend_from_slice(name);
            body.extend_from_slice(payload);
        }

        let cmds: Vec<_> = CommandIter::new(&body).collect();
        assert_eq!(cmds.len(), 2);
        assert_eq!(&cmds[0].0, b"PrgI");
        assert_eq!(cmds[0].1, &[0, 0, 0, 1]);
        assert_eq!(&cmds[1].0, b"InCm");
    }

    #[test]
    fn command_iter_stops_on_malformed_block() {
        // Length field smaller than a block header.
        let body = [0u8, 4, 0, 0, b'X', b'X', b'X', b'X'];
        assert_eq!(CommandIter::new(&body).count(), 0);
    }

    #[test]
    fn decibel_conversion_reference_points() {
        assert!((uint16_to_decibel(32768)).abs() < 1e-9);
        // Half scale is roughly -6 dB.
        assert!((uint16_to_decibel(16384) + 6.02).abs() < 0.01);
        assert_eq!(uint16_to_decibel(0), f64::NEG_INFINITY);
    }

    #[test]
    fn video_mode_table() {
        assert_eq!(video_mode(13), Some(("1080p59.94", 59.94)));
        assert_eq!(video_mode(6), Some(("1080i50", 25.0)));
        assert_eq!(video_mode(200), None);
    }

    #[test]
    fn cstr_stops_at_nul() {
        assert_eq!(read_cstr(b"ATEM Mini\0\0garbage"), "ATEM Mini");
        assert_eq!(read_cstr(b"no-nul"), "no-nul");
    }
}
