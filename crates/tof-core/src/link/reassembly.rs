//! Stream reassembly (spec.md §4.4 "Reassembly protocol", §9 "must persist
//! across reads"). The original's bug pattern treated one `recv()` as one
//! packet; this component keeps a persistent per-connection accumulator
//! instead and is exercised directly by spec.md §8 property 2.

use crate::codec::{self, MAX_ARGC};

/// Result of feeding one chunk of bytes into the accumulator.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Drained {
  /// Complete wire-format frames extracted, in arrival order.
  pub frames: Vec<Vec<u8>>,
  /// Set when the next pending frame declares `argc > 32`: the stream is
  /// corrupt and the connection must be closed (spec.md §4.4 step 2b).
  pub corrupt: bool,
}

/// Persistent byte accumulator for one TCP connection.
#[derive(Debug, Default)]
pub struct Reassembler {
  buf: Vec<u8>,
}

impl Reassembler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append `data` and extract as many complete frames as are now
  /// available (spec.md §4.4 steps 1–2).
  pub fn feed(&mut self, data: &[u8]) -> Drained {
    self.buf.extend_from_slice(data);
    let mut frames = Vec::new();

    loop {
      if self.buf.len() < 14 {
        break;
      }
      let argc = u16::from_be_bytes([self.buf[6], self.buf[7]]);
      if argc as usize > MAX_ARGC {
        return Drained {
          frames,
          corrupt: true,
        };
      }
      let expected = 14 + 4 * argc as usize;
      if self.buf.len() < expected {
        break;
      }
      frames.push(self.buf.drain(0..expected).collect());
    }

    Drained {
      frames,
      corrupt: false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codec::{Packet, serialize};

  #[test]
  fn single_chunk_yields_single_frame() {
    let pkt = Packet::new(0x5100, vec![]);
    let wire = serialize(&pkt);
    let mut r = Reassembler::new();
    let drained = r.feed(&wire);
    assert_eq!(drained.frames, vec![wire]);
    assert!(!drained.corrupt);
  }

  #[test]
  fn byte_by_byte_chunks_still_reassemble() {
    let pkt = Packet::new(0x5105, vec![60, 1, 0, 0]);
    let wire = serialize(&pkt);
    let mut r = Reassembler::new();
    let mut got = Vec::new();
    for byte in &wire {
      got.extend(r.feed(&[*byte]).frames);
    }
    assert_eq!(got, vec![wire]);
  }

  #[test]
  fn two_packets_in_one_segment_yield_two_frames_in_order() {
    let p1 = Packet::new(0x5103, vec![]);
    let p2 = Packet::new(0x5104, vec![1, 2, 3]);
    let w1 = serialize(&p1);
    let w2 = serialize(&p2);
    let mut combined = w1.clone();
    combined.extend_from_slice(&w2);

    let mut r = Reassembler::new();
    let drained = r.feed(&combined);
    assert_eq!(drained.frames, vec![w1, w2]);
  }

  #[test]
  fn arbitrary_chunking_preserves_order_and_count() {
    let packets: Vec<Packet> = (0..5)
      .map(|i| Packet::new(0x5100 + i, vec![i as i32, -i as i32]))
      .collect();
    let mut wire = Vec::new();
    for p in &packets {
      wire.extend(serialize(p));
    }

    // split into uneven chunks
    let chunk_sizes = [3usize, 7, 1, 50, 2, 9999];
    let mut r = Reassembler::new();
    let mut frames = Vec::new();
    let mut idx = 0;
    let mut size_idx = 0;
    while idx < wire.len() {
      let size = chunk_sizes[size_idx % chunk_sizes.len()].max(1);
      size_idx += 1;
      let end = (idx + size).min(wire.len());
      frames.extend(r.feed(&wire[idx..end]).frames);
      idx = end;
    }

    assert_eq!(frames.len(), packets.len());
    for (frame, pkt) in frames.iter().zip(packets.iter()) {
      assert_eq!(&crate::codec::parse(frame).unwrap(), pkt);
    }
  }

  #[test]
  fn argc_overflow_flags_corrupt_without_consuming_later_valid_frame() {
    let mut buf = vec![0u8; 14];
    buf[0..2].copy_from_slice(&0xEB90u16.to_be_bytes());
    buf[2..4].copy_from_slice(&0x5B6Au16.to_be_bytes());
    buf[6..8].copy_from_slice(&9999u16.to_be_bytes());

    let mut r = Reassembler::new();
    let drained = r.feed(&buf);
    assert!(drained.corrupt);
    assert!(drained.frames.is_empty());
  }

  #[test]
  fn corrupt_frame_does_not_discard_already_extracted_frames() {
    let pkt = Packet::new(0x5100, vec![]);
    let wire = serialize(&pkt);
    let mut bad = vec![0u8; 14];
    bad[0..2].copy_from_slice(&0xEB90u16.to_be_bytes());
    bad[2..4].copy_from_slice(&0x5B6Au16.to_be_bytes());
    bad[6..8].copy_from_slice(&9999u16.to_be_bytes());

    let mut combined = wire.clone();
    combined.extend_from_slice(&bad);

    let mut r = Reassembler::new();
    let drained = r.feed(&combined);
    assert_eq!(drained.frames, vec![wire]);
    assert!(drained.corrupt);
  }

  #[test]
  fn partial_frame_waits_for_more_data() {
    let pkt = Packet::new(0x5105, vec![1, 2, 3]);
    let wire = serialize(&pkt);
    let mut r = Reassembler::new();
    let drained = r.feed(&wire[..wire.len() - 1]);
    assert!(drained.frames.is_empty());
    assert!(!drained.corrupt);
    let drained = r.feed(&wire[wire.len() - 1..]);
    assert_eq!(drained.frames, vec![wire]);
  }
}
