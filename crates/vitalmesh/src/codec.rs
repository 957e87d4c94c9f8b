// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire codec for the bracket-delimited mesh frames.
//!
//! Frames are concatenations of `[field]` tokens; the first token is the
//! numeric packet kind. Authentication and confidentiality happen inside the
//! codec: HELLO frames carry two PSS signatures (node key + membership key)
//! over the identity fields, INTEREST/DATA bodies are OAEP-encrypted under
//! the recipient's public key and only exist in bracketed form *inside* the
//! ciphertext.
//!
//! # Wire format
//!
//! ```text
//! HELLO / HELLO_ACK  [0|4][label][host][port][cert][pubkey-b64][sig-b64][membersig-b64]
//! INTEREST           [2][label][b64(OAEP(recv-pub, "[name][rid][retry]"))]
//! DATA               [1][label][b64(OAEP(recv-pub, "[name][rid][retry][payload-b64]"))]
//! gateway            EG|b64(OAEP(gw-pub, "name"))
//!                    EG_REPLY|b64(OAEP(gw-pub, "name|payload"))
//! ```
//!
//! Field encodings are constrained so the delimiters can never appear inside
//! a field: labels/ports/retry are integers, names use the `/`-separated
//! alphanumeric namespace, request-ids are 5-char alphanumeric, and every
//! byte blob (certificate, public key, signatures, ciphertext, DATA payload)
//! is base64. The signed message for both HELLO signatures is exactly the
//! `[label][host][port][cert]` concatenation as it appears on the wire.

use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::crypto::{
    self, b64_decode, b64_encode, public_key_from_pem, public_key_to_pem, NodeKeys,
};
use crate::error::Result;

/// HELLO packet kind id.
pub const HELLO_ID: u8 = 0;
/// DATA packet kind id.
pub const DATA_ID: u8 = 1;
/// INTEREST packet kind id.
pub const INTEREST_ID: u8 = 2;
/// HELLO_ACK packet kind id.
pub const HELLO_ACK_ID: u8 = 4;

/// Literal prefix that routes a raw frame to the gateway path before normal
/// decoding.
pub const GATEWAY_MAGIC: &[u8] = b"EG";

const GATEWAY_REQUEST_PREFIX: &str = "EG|";
const GATEWAY_REPLY_PREFIX: &str = "EG_REPLY|";

/// Packet kind, known as soon as the outer frame parses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireKind {
    Hello,
    HelloAck,
    Interest,
    Data,
}

/// Identity fields carried by HELLO / HELLO_ACK.
#[derive(Clone, Debug)]
pub struct HelloFields {
    pub label: u32,
    pub host: String,
    pub port: u16,
    /// Opaque certificate bytes (stored in the FIB, never interpreted here).
    pub cert: Vec<u8>,
    pub public_key: RsaPublicKey,
}

/// Decrypted INTEREST body plus the outer source label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterestFields {
    pub source: u32,
    pub name: String,
    pub rid: String,
    pub retry: u32,
}

/// Decrypted DATA body plus the outer source label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataFields {
    pub source: u32,
    pub name: String,
    pub rid: String,
    pub retry: u32,
    pub payload: String,
}

/// Tagged union of every decodable packet. The node inbound path dispatches
/// on this with a single match.
#[derive(Clone, Debug)]
pub enum Packet {
    Hello(HelloFields),
    HelloAck(HelloFields),
    Interest(InterestFields),
    Data(DataFields),
}

/// Outcome of decoding one raw frame.
#[derive(Clone, Debug)]
pub enum DecodeOutcome {
    /// Fully authenticated / decrypted packet.
    Packet(Packet),
    /// The kind was identified but the frame failed signature verification,
    /// decryption, or inner parsing. Counted as inbound, then dropped.
    Dropped(WireKind),
    /// Not parseable at all.
    Malformed,
}

/// Split a frame into its bracketed fields.
///
/// The whole string must be a run of `[field]` tokens; fields must not
/// contain the delimiters. Trailing whitespace from the transport read is
/// tolerated.
pub fn split_fields(frame: &str) -> Option<Vec<&str>> {
    let mut rest = frame.trim_end();
    let mut fields = Vec::new();
    while !rest.is_empty() {
        rest = rest.strip_prefix('[')?;
        let end = rest.find(']')?;
        let field = &rest[..end];
        if field.contains('[') {
            return None;
        }
        fields.push(field);
        rest = &rest[end + 1..];
    }
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

/// Build a HELLO or HELLO_ACK frame.
///
/// # Errors
///
/// Returns `Error::Crypto` if signing or key encoding fails.
pub fn encode_hello(
    kind_id: u8,
    label: u32,
    host: &str,
    port: u16,
    cert: &[u8],
    node_keys: &NodeKeys,
    member_key: &RsaPrivateKey,
) -> Result<String> {
    let cert_b64 = b64_encode(cert);
    let signed = format!("[{}][{}][{}][{}]", label, host, port, cert_b64);
    let pubkey_b64 = b64_encode(public_key_to_pem(node_keys.public())?.as_bytes());
    let sig = b64_encode(&crypto::sign(node_keys.private(), signed.as_bytes())?);
    let member_sig = b64_encode(&crypto::sign(member_key, signed.as_bytes())?);
    Ok(format!(
        "[{}]{}[{}][{}][{}]",
        kind_id, signed, pubkey_b64, sig, member_sig
    ))
}

/// Build an INTEREST frame for one recipient.
///
/// # Errors
///
/// Returns `Error::Crypto` on encryption failure.
pub fn encode_interest(
    label: u32,
    name: &str,
    rid: &str,
    retry: u32,
    recipient: &RsaPublicKey,
) -> Result<String> {
    let body = format!("[{}][{}][{}]", name, rid, retry);
    let ciphertext = crypto::encrypt(recipient, body.as_bytes())?;
    Ok(format!(
        "[{}][{}][{}]",
        INTEREST_ID,
        label,
        b64_encode(&ciphertext)
    ))
}

/// Build a DATA frame for one recipient. The payload is base64-wrapped
/// inside the encrypted body so arbitrary JSON can never collide with the
/// bracket delimiters.
///
/// # Errors
///
/// Returns `Error::Crypto` on encryption failure.
pub fn encode_data(
    label: u32,
    name: &str,
    rid: &str,
    retry: u32,
    payload: &str,
    recipient: &RsaPublicKey,
) -> Result<String> {
    let body = format!(
        "[{}][{}][{}][{}]",
        name,
        rid,
        retry,
        b64_encode(payload.as_bytes())
    );
    let ciphertext = crypto::encrypt(recipient, body.as_bytes())?;
    Ok(format!(
        "[{}][{}][{}]",
        DATA_ID,
        label,
        b64_encode(&ciphertext)
    ))
}

/// Decode one raw frame.
///
/// HELLO frames are rejected unless BOTH signatures verify: the embedded
/// peer key must have signed the identity fields, and the shared membership
/// key must prove the sender belongs to the mesh. INTEREST/DATA bodies are
/// decrypted with the receiver's private key; whether the source label is
/// authorized (present in the FIB) is the forwarding engine's decision.
pub fn decode_frame(
    raw: &[u8],
    own_key: &RsaPrivateKey,
    member_public: &RsaPublicKey,
) -> DecodeOutcome {
    let Ok(text) = std::str::from_utf8(raw) else {
        return DecodeOutcome::Malformed;
    };
    let Some(fields) = split_fields(text) else {
        return DecodeOutcome::Malformed;
    };
    let Ok(kind_id) = fields[0].parse::<u8>() else {
        return DecodeOutcome::Malformed;
    };
    match kind_id {
        HELLO_ID | HELLO_ACK_ID => {
            let kind = if kind_id == HELLO_ID {
                WireKind::Hello
            } else {
                WireKind::HelloAck
            };
            match decode_hello_fields(&fields, member_public) {
                Some(hello) if kind == WireKind::Hello => DecodeOutcome::Packet(Packet::Hello(hello)),
                Some(hello) => DecodeOutcome::Packet(Packet::HelloAck(hello)),
                None => DecodeOutcome::Dropped(kind),
            }
        }
        INTEREST_ID => match decode_encrypted_body(&fields, own_key) {
            Some((source, body)) => match parse_interest_body(source, &body) {
                Some(interest) => DecodeOutcome::Packet(Packet::Interest(interest)),
                None => DecodeOutcome::Dropped(WireKind::Interest),
            },
            None => DecodeOutcome::Dropped(WireKind::Interest),
        },
        DATA_ID => match decode_encrypted_body(&fields, own_key) {
            Some((source, body)) => match parse_data_body(source, &body) {
                Some(data) => DecodeOutcome::Packet(Packet::Data(data)),
                None => DecodeOutcome::Dropped(WireKind::Data),
            },
            None => DecodeOutcome::Dropped(WireKind::Data),
        },
        _ => DecodeOutcome::Malformed,
    }
}

fn decode_hello_fields(fields: &[&str], member_public: &RsaPublicKey) -> Option<HelloFields> {
    if fields.len() != 8 {
        return None;
    }
    let label = fields[1].parse::<u32>().ok()?;
    let host = fields[2];
    let port = fields[3].parse::<u16>().ok()?;
    let cert_b64 = fields[4];
    let pubkey_pem = String::from_utf8(b64_decode(fields[5])?).ok()?;
    let public_key = public_key_from_pem(&pubkey_pem)?;
    let sig = b64_decode(fields[6])?;
    let member_sig = b64_decode(fields[7])?;

    let signed = format!("[{}][{}][{}][{}]", label, host, port, cert_b64);
    if !crypto::verify(&public_key, signed.as_bytes(), &sig) {
        log::debug!("[codec] hello from {}: peer signature invalid", label);
        return None;
    }
    if !crypto::verify(member_public, signed.as_bytes(), &member_sig) {
        log::debug!("[codec] hello from {}: membership signature invalid", label);
        return None;
    }
    Some(HelloFields {
        label,
        host: host.to_string(),
        port,
        cert: b64_decode(cert_b64)?,
        public_key,
    })
}

fn decode_encrypted_body(fields: &[&str], own_key: &RsaPrivateKey) -> Option<(u32, String)> {
    if fields.len() != 3 {
        return None;
    }
    let source = fields[1].parse::<u32>().ok()?;
    let ciphertext = b64_decode(fields[2])?;
    let body = crypto::decrypt(own_key, &ciphertext)?;
    Some((source, String::from_utf8(body).ok()?))
}

fn parse_interest_body(source: u32, body: &str) -> Option<InterestFields> {
    let fields = split_fields(body)?;
    if fields.len() != 3 {
        return None;
    }
    Some(InterestFields {
        source,
        name: fields[0].to_string(),
        rid: fields[1].to_string(),
        retry: fields[2].parse::<u32>().ok()?,
    })
}

fn parse_data_body(source: u32, body: &str) -> Option<DataFields> {
    let fields = split_fields(body)?;
    if fields.len() != 4 {
        return None;
    }
    Some(DataFields {
        source,
        name: fields[0].to_string(),
        rid: fields[1].to_string(),
        retry: fields[2].parse::<u32>().ok()?,
        payload: String::from_utf8(b64_decode(fields[3])?).ok()?,
    })
}

// ============================================================================
// Gateway frames
// ============================================================================

/// Decrypted gateway control frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayFrame {
    /// Tunnelled interest for a foreign name.
    Request { name: String },
    /// Tunnelled answer carrying the payload back across the bridge.
    Reply { name: String, payload: String },
}

/// A raw frame belongs to the gateway channel if its first two bytes are the
/// literal `EG` magic (checked before any normal decoding).
pub fn is_gateway_frame(raw: &[u8]) -> bool {
    raw.starts_with(GATEWAY_MAGIC)
}

/// Build an `EG` frame tunnelling `name` to the peer gateway.
///
/// # Errors
///
/// Returns `Error::Crypto` on encryption failure.
pub fn encode_gateway_request(gateway_public: &RsaPublicKey, name: &str) -> Result<String> {
    let ciphertext = crypto::encrypt(gateway_public, name.as_bytes())?;
    Ok(format!("{}{}", GATEWAY_REQUEST_PREFIX, b64_encode(&ciphertext)))
}

/// Build an `EG_REPLY` frame carrying `name` and its payload.
///
/// The plaintext form is `name|payload`; names never contain `|`, so the
/// receiver splits on the first separator only and the payload may contain
/// anything.
///
/// # Errors
///
/// Returns `Error::Crypto` on encryption failure.
pub fn encode_gateway_reply(
    gateway_public: &RsaPublicKey,
    name: &str,
    payload: &str,
) -> Result<String> {
    let body = format!("{}|{}", name, payload);
    let ciphertext = crypto::encrypt(gateway_public, body.as_bytes())?;
    Ok(format!("{}{}", GATEWAY_REPLY_PREFIX, b64_encode(&ciphertext)))
}

/// Decode a gateway frame with the shared gateway private key. `None` drops
/// the frame silently.
pub fn decode_gateway_frame(raw: &[u8], gateway_key: &RsaPrivateKey) -> Option<GatewayFrame> {
    let text = std::str::from_utf8(raw).ok()?;
    let text = text.trim_end();
    if let Some(encoded) = text.strip_prefix(GATEWAY_REPLY_PREFIX) {
        let body = crypto::decrypt(gateway_key, &b64_decode(encoded)?)?;
        let body = String::from_utf8(body).ok()?;
        let (name, payload) = body.split_once('|')?;
        Some(GatewayFrame::Reply {
            name: name.to_string(),
            payload: payload.to_string(),
        })
    } else if let Some(encoded) = text.strip_prefix(GATEWAY_REQUEST_PREFIX) {
        let body = crypto::decrypt(gateway_key, &b64_decode(encoded)?)?;
        Some(GatewayFrame::Request {
            name: String::from_utf8(body).ok()?,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_keys::{keys_a, keys_b, member};

    fn hello_frame(kind: u8) -> String {
        encode_hello(
            kind,
            3,
            "127.0.0.1",
            33003,
            b"opaque-cert-bytes",
            keys_a(),
            member().private(),
        )
        .expect("encode hello")
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(
            split_fields("[0][3][127.0.0.1]").expect("fields"),
            vec!["0", "3", "127.0.0.1"]
        );
        // Trailing newline from the transport read is tolerated
        assert_eq!(split_fields("[a][b]\n").expect("fields"), vec!["a", "b"]);
        assert!(split_fields("").is_none());
        assert!(split_fields("no brackets").is_none());
        assert!(split_fields("[unterminated").is_none());
        assert!(split_fields("[ne[sted]]").is_none());
        assert!(split_fields("[a]junk[b]").is_none());
    }

    #[test]
    fn test_hello_roundtrip() {
        let frame = hello_frame(HELLO_ID);
        match decode_frame(frame.as_bytes(), keys_b().private(), member().public()) {
            DecodeOutcome::Packet(Packet::Hello(hello)) => {
                assert_eq!(hello.label, 3);
                assert_eq!(hello.host, "127.0.0.1");
                assert_eq!(hello.port, 33003);
                assert_eq!(hello.cert, b"opaque-cert-bytes");
                assert_eq!(&hello.public_key, keys_a().public());
            }
            other => panic!("expected hello, got {:?}", other),
        }
    }

    #[test]
    fn test_hello_ack_kind() {
        let frame = hello_frame(HELLO_ACK_ID);
        assert!(matches!(
            decode_frame(frame.as_bytes(), keys_b().private(), member().public()),
            DecodeOutcome::Packet(Packet::HelloAck(_))
        ));
    }

    #[test]
    fn test_hello_forged_membership_rejected() {
        // Signed with a key that is NOT the membership key
        let frame = encode_hello(
            HELLO_ID,
            3,
            "127.0.0.1",
            33003,
            b"cert",
            keys_a(),
            keys_b().private(),
        )
        .expect("encode hello");
        assert!(matches!(
            decode_frame(frame.as_bytes(), keys_b().private(), member().public()),
            DecodeOutcome::Dropped(WireKind::Hello)
        ));
    }

    #[test]
    fn test_hello_tampered_fields_rejected() {
        let frame = hello_frame(HELLO_ID);
        // Flip the advertised port after signing
        let tampered = frame.replace("[33003]", "[33004]");
        assert!(matches!(
            decode_frame(tampered.as_bytes(), keys_b().private(), member().public()),
            DecodeOutcome::Dropped(WireKind::Hello)
        ));
    }

    #[test]
    fn test_interest_roundtrip() {
        let frame = encode_interest(0, "/data/1/heartrate/ecg", "aB9x2", 0, keys_a().public())
            .expect("encode interest");
        match decode_frame(frame.as_bytes(), keys_a().private(), member().public()) {
            DecodeOutcome::Packet(Packet::Interest(interest)) => {
                assert_eq!(
                    interest,
                    InterestFields {
                        source: 0,
                        name: "/data/1/heartrate/ecg".to_string(),
                        rid: "aB9x2".to_string(),
                        retry: 0,
                    }
                );
            }
            other => panic!("expected interest, got {:?}", other),
        }
    }

    #[test]
    fn test_interest_wrong_recipient_dropped() {
        let frame =
            encode_interest(0, "/data/1/ecg", "aB9x2", 0, keys_a().public()).expect("encode");
        // keys_b cannot decrypt a body encrypted for keys_a
        assert!(matches!(
            decode_frame(frame.as_bytes(), keys_b().private(), member().public()),
            DecodeOutcome::Dropped(WireKind::Interest)
        ));
    }

    #[test]
    fn test_data_roundtrip_with_bracketed_payload() {
        // JSON arrays would collide with the frame delimiters if the payload
        // were not base64-wrapped inside the body
        let payload = r#"{"ecg":[72,75,71],"unit":"bpm"}"#;
        let frame = encode_data(1, "/data/1/heartrate", "aB9x2", 2, payload, keys_a().public())
            .expect("encode data");
        match decode_frame(frame.as_bytes(), keys_a().private(), member().public()) {
            DecodeOutcome::Packet(Packet::Data(data)) => {
                assert_eq!(data.source, 1);
                assert_eq!(data.name, "/data/1/heartrate");
                assert_eq!(data.rid, "aB9x2");
                assert_eq!(data.retry, 2);
                assert_eq!(data.payload, payload);
            }
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_frames() {
        let own = keys_a().private();
        let member_pub = member().public();
        assert!(matches!(
            decode_frame(b"", own, member_pub),
            DecodeOutcome::Malformed
        ));
        assert!(matches!(
            decode_frame(b"garbage", own, member_pub),
            DecodeOutcome::Malformed
        ));
        assert!(matches!(
            decode_frame(b"[9][0][abc]", own, member_pub),
            DecodeOutcome::Malformed
        ));
        assert!(matches!(
            decode_frame(&[0xFF, 0xFE, 0x5B], own, member_pub),
            DecodeOutcome::Malformed
        ));
        // Right kind, wrong arity
        assert!(matches!(
            decode_frame(b"[2][0]", own, member_pub),
            DecodeOutcome::Dropped(WireKind::Interest)
        ));
    }

    #[test]
    fn test_gateway_request_roundtrip() {
        let gw = keys_a();
        let frame = encode_gateway_request(gw.public(), "/wristband/pulse").expect("encode");
        assert!(is_gateway_frame(frame.as_bytes()));
        assert_eq!(
            decode_gateway_frame(frame.as_bytes(), gw.private()).expect("decode"),
            GatewayFrame::Request {
                name: "/wristband/pulse".to_string()
            }
        );
    }

    #[test]
    fn test_gateway_reply_roundtrip() {
        let gw = keys_a();
        // Payload containing the separator must survive the split
        let payload = r#"{"pulse":"72|strong"}"#;
        let frame = encode_gateway_reply(gw.public(), "/wristband/pulse", payload).expect("encode");
        assert!(is_gateway_frame(frame.as_bytes()));
        assert_eq!(
            decode_gateway_frame(frame.as_bytes(), gw.private()).expect("decode"),
            GatewayFrame::Reply {
                name: "/wristband/pulse".to_string(),
                payload: payload.to_string(),
            }
        );
    }

    #[test]
    fn test_gateway_wrong_key_dropped() {
        let frame = encode_gateway_request(keys_a().public(), "/wristband/x").expect("encode");
        assert!(decode_gateway_frame(frame.as_bytes(), keys_b().private()).is_none());
    }

    #[test]
    fn test_interest_frame_is_not_gateway_frame() {
        let frame = encode_interest(0, "/data/1/ecg", "aB9x2", 0, keys_a().public()).expect("ok");
        assert!(!is_gateway_frame(frame.as_bytes()));
    }
}
