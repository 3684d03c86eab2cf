//! Frame Codec (C2): wire framing, the command code catalog, and the CRC
//! variants used to validate it. See spec.md §3 and §4.2.

mod command_code;
mod crc;

pub use command_code::CommandCode;
pub use crc::CrcVariant;

use thiserror::Error;

const MAGIC_1: u16 = 0xEB90;
const MAGIC_2: u16 = 0x5B6A;
const FOOTER_1: u16 = 0xC5A4;
const FOOTER_2: u16 = 0xD279;

/// Hard cap on `argc`; see spec.md §3 Packet invariant.
pub const MAX_ARGC: usize = 32;

/// Minimum wire size of a packet with `argc == 0`.
pub const MIN_PACKET_SIZE: usize = 14;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
  #[error("buffer too short: got {got}, need at least {need}")]
  TooShort { got: usize, need: usize },
  #[error("magic mismatch")]
  BadMagic,
  #[error("argc {0} exceeds the maximum of {MAX_ARGC}")]
  ArgcOverflow(u16),
  #[error("declared packet length {expected} exceeds buffer length {got}")]
  LengthMismatch { expected: usize, got: usize },
  #[error("crc mismatch: received 0x{received:04x}, computed 0x{computed:04x}")]
  CrcMismatch { received: u16, computed: u16 },
  #[error("footer mismatch")]
  BadFooter,
}

/// A unit of control-plane traffic (spec.md §3 Packet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
  pub code: u16,
  pub argv: Vec<i32>,
}

impl Packet {
  pub fn new(code: u16, argv: Vec<i32>) -> Self {
    Self { code, argv }
  }

  pub fn argc(&self) -> u16 {
    self.argv.len() as u16
  }
}

/// `packetSize(pkt) = 14 + 4*pkt.argc` (spec.md §4.2 Size helper).
pub fn packet_size(pkt: &Packet) -> usize {
  MIN_PACKET_SIZE + 4 * pkt.argv.len()
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
  u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
  i32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn write_u16(buf: &mut Vec<u8>, v: u16) {
  buf.extend_from_slice(&v.to_be_bytes());
}

fn write_i32(buf: &mut Vec<u8>, v: i32) {
  buf.extend_from_slice(&v.to_be_bytes());
}

/// Peek `argc` out of a buffer that has at least 8 bytes, without fully
/// parsing. Used by the Command Link reassembler (spec.md §4.4 step 2a).
pub fn peek_argc(buf: &[u8]) -> Option<u16> {
  if buf.len() < 8 {
    return None;
  }
  Some(read_u16(buf, 6))
}

/// Parse a byte slice containing exactly one framed packet.
pub fn parse(buf: &[u8]) -> Result<Packet, CodecError> {
  parse_with(buf, CrcVariant::Primary)
}

/// Parse using an explicit CRC variant (legacy-peer interop, spec.md §4.2/§9).
pub fn parse_with(buf: &[u8], crc_variant: CrcVariant) -> Result<Packet, CodecError> {
  if buf.len() < MIN_PACKET_SIZE {
    return Err(CodecError::TooShort {
      got: buf.len(),
      need: MIN_PACKET_SIZE,
    });
  }
  let magic1 = read_u16(buf, 0);
  let magic2 = read_u16(buf, 2);
  if magic1 != MAGIC_1 || magic2 != MAGIC_2 {
    return Err(CodecError::BadMagic);
  }
  let code = read_u16(buf, 4);
  let argc = read_u16(buf, 6);
  if argc as usize > MAX_ARGC {
    return Err(CodecError::ArgcOverflow(argc));
  }
  let payload_size = 8 + 4 * argc as usize;
  let expected = payload_size + 6; // + CRC + footer1 + footer2
  if buf.len() < expected {
    return Err(CodecError::LengthMismatch {
      expected,
      got: buf.len(),
    });
  }

  let received_crc = read_u16(buf, payload_size);
  let computed_crc = crc_variant.compute(&buf[0..payload_size]);
  if received_crc != computed_crc {
    return Err(CodecError::CrcMismatch {
      received: received_crc,
      computed: computed_crc,
    });
  }

  let footer1 = read_u16(buf, payload_size + 2);
  let footer2 = read_u16(buf, payload_size + 4);
  if footer1 != FOOTER_1 || footer2 != FOOTER_2 {
    return Err(CodecError::BadFooter);
  }

  let mut argv = Vec::with_capacity(argc as usize);
  for i in 0..argc as usize {
    argv.push(read_i32(buf, 8 + i * 4));
  }

  Ok(Packet { code, argv })
}

/// Serialize a packet, computing the CRC over `[0, 8 + 4*argc)`.
pub fn serialize(pkt: &Packet) -> Vec<u8> {
  serialize_with(pkt, CrcVariant::Primary, None)
}

/// Serialize with an explicit CRC variant and an optional caller-supplied
/// CRC override, for interoperability testing (spec.md §4.2 Serialize
/// contract).
pub fn serialize_with(pkt: &Packet, crc_variant: CrcVariant, fixed_crc: Option<u16>) -> Vec<u8> {
  let mut buf = Vec::with_capacity(packet_size(pkt));
  write_u16(&mut buf, MAGIC_1);
  write_u16(&mut buf, MAGIC_2);
  write_u16(&mut buf, pkt.code);
  write_u16(&mut buf, pkt.argc());
  for arg in &pkt.argv {
    write_i32(&mut buf, *arg);
  }

  let crc = fixed_crc.unwrap_or_else(|| crc_variant.compute(&buf));
  write_u16(&mut buf, crc);
  write_u16(&mut buf, FOOTER_1);
  write_u16(&mut buf, FOOTER_2);

  buf
}
