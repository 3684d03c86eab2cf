//! Frame codec + reassembly end-to-end (spec.md §8 properties 1-2): a
//! sequence of packets serialized back-to-back and fed through the
//! reassembler in arbitrary chunk sizes must come back out in order,
//! unchanged.

use tof_core::codec::{self, Packet};
use tof_core::link::Reassembler;

#[test]
fn serialize_then_reassemble_arbitrary_chunking_round_trips() {
  let packets: Vec<Packet> = (0..20)
    .map(|i| Packet::new(0x5100 + (i % 5) as u16, vec![i, -i, i * 3]))
    .collect();

  let mut wire = Vec::new();
  for p in &packets {
    wire.extend(codec::serialize(p));
  }

  let mut reassembler = Reassembler::new();
  let mut got = Vec::new();
  let mut idx = 0;
  let sizes = [1usize, 2, 5, 13, 64, 4096];
  let mut s = 0;
  while idx < wire.len() {
    let size = sizes[s % sizes.len()].max(1);
    s += 1;
    let end = (idx + size).min(wire.len());
    let drained = reassembler.feed(&wire[idx..end]);
    assert!(!drained.corrupt);
    for frame in drained.frames {
      got.push(codec::parse(&frame).unwrap());
    }
    idx = end;
  }

  assert_eq!(got, packets);
}

#[test]
fn corrupt_argc_mid_stream_preserves_prior_frames_and_flags_corrupt() {
  let good = Packet::new(0x5105, vec![1, 2, 3]);
  let mut wire = codec::serialize(&good);

  let mut bad = vec![0u8; 14];
  bad[0..2].copy_from_slice(&0xEB90u16.to_be_bytes());
  bad[2..4].copy_from_slice(&0x5B6Au16.to_be_bytes());
  bad[6..8].copy_from_slice(&40000u16.to_be_bytes());
  wire.extend_from_slice(&bad);

  let mut reassembler = Reassembler::new();
  let drained = reassembler.feed(&wire);
  assert_eq!(drained.frames.len(), 1);
  assert_eq!(codec::parse(&drained.frames[0]).unwrap(), good);
  assert!(drained.corrupt);
}
