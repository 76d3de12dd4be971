use serde::{Deserialize, Serialize};

/// Magic number written at the start of a framed message.
pub const HEADER_MAGIC: u32 = 0;
pub const HEADER_LEN: usize = 8;

pub const RESPONSE_AOK: &[u8] = b"RESPONSE_AOK";
pub const RESPONSE_ERR: &[u8] = b"RESPONSE_ERR";

/// How a payload is put on the wire.
///
/// `Raw` writes the payload as is. `Header` prefixes it with the magic number
/// and the payload length, both 4 bytes little-endian.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    #[default]
    Raw,
    Header,
}

impl Framing {
    #[must_use]
    pub fn encode(self, payload: &[u8]) -> Vec<u8> {
        match self {
            Framing::Raw => payload.to_vec(),
            Framing::Header => {
                // Payloads are bounded by a single socket read on the peer side.
                let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
                let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
                frame.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
                frame.extend_from_slice(&len.to_le_bytes());
                frame.extend_from_slice(payload);
                frame
            }
        }
    }
}

/// Splits an incoming block into the framing it used and its payload.
///
/// A block counts as framed only when it starts with the magic number and the
/// declared length matches what follows; anything else is a raw payload.
#[must_use]
pub fn strip_header(data: &[u8]) -> (Framing, &[u8]) {
    if data.len() < HEADER_LEN {
        return (Framing::Raw, data);
    }
    let (header, payload) = data.split_at(HEADER_LEN);
    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if magic == HEADER_MAGIC && usize::try_from(len).ok() == Some(payload.len()) {
        (Framing::Header, payload)
    } else {
        (Framing::Raw, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_framing_writes_payload_only() {
        assert_eq!(Framing::Raw.encode(b"abc"), b"abc".to_vec());
    }

    #[test]
    fn header_framing_prefixes_magic_and_length() {
        let payload = b"<:COMMAND:>PRACTICE<:FILEPATH:>/tmp/a.wav";
        let frame = Framing::Header.encode(payload);
        assert_eq!(&frame[..4], &[0, 0, 0, 0]);
        assert_eq!(&frame[4..8], &[41, 0, 0, 0]);
        assert_eq!(&frame[8..], payload);
    }

    #[test]
    fn strip_header_detects_framed_blocks() {
        let frame = Framing::Header.encode(b"RESPONSE_AOK");
        assert_eq!(strip_header(&frame), (Framing::Header, &b"RESPONSE_AOK"[..]));
    }

    #[test]
    fn strip_header_leaves_raw_blocks_alone() {
        let raw = b"<:COMMAND:>PRACTICE<:FILEPATH:>/tmp/a.wav";
        assert_eq!(strip_header(raw), (Framing::Raw, &raw[..]));
        assert_eq!(strip_header(b"short"), (Framing::Raw, &b"short"[..]));
    }

    #[test]
    fn strip_header_rejects_length_mismatch() {
        let mut frame = Framing::Header.encode(b"payload");
        frame.push(b'!');
        assert_eq!(strip_header(&frame).0, Framing::Raw);
    }

    #[test]
    fn framing_reads_from_lowercase_names() {
        #[derive(Deserialize)]
        struct Holder {
            framing: Framing,
        }
        let holder: Holder = toml::from_str("framing = \"header\"").unwrap();
        assert_eq!(holder.framing, Framing::Header);
    }
}
