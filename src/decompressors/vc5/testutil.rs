// SPDX-License-Identifier: LGPL-2.1

//! Helpers for building synthetic VC-5 streams in tests.

use super::codebook::{Rlv, MAGNITUDE_ESCAPE, TABLE};
use super::Vc5Tag;

/// Writer producing MSB-first bit packing into bytes.
pub(crate) struct MsbWriter {
  bytes: Vec<u8>,
  acc: u64,
  nbits: u32,
}

impl MsbWriter {
  pub fn new() -> Self {
    MsbWriter {
      bytes: Vec::new(),
      acc: 0,
      nbits: 0,
    }
  }

  pub fn put(&mut self, val: u32, nbits: u32) {
    assert!(nbits <= 32);
    self.acc = (self.acc << nbits) | u64::from(val) & ((1u64 << nbits) - 1);
    self.nbits += nbits;
    while self.nbits >= 8 {
      self.bytes.push((self.acc >> (self.nbits - 8)) as u8);
      self.nbits -= 8;
    }
  }

  pub fn finish(mut self) -> Vec<u8> {
    if self.nbits > 0 {
      self.bytes.push((self.acc << (8 - self.nbits)) as u8);
      self.nbits = 0;
    }
    self.bytes
  }

  /// Flush and zero-pad to whole 4 byte segments.
  pub fn finish_segments(self) -> Vec<u8> {
    let mut bytes = self.finish();
    while bytes.len() % 4 != 0 {
      bytes.push(0);
    }
    bytes
  }
}

fn code_for(count: u16, value: u16) -> &'static Rlv {
  TABLE
    .iter()
    .find(|entry| entry.count == count && entry.value == value)
    .expect("no such codebook entry")
}

fn put_zero_run(w: &mut MsbWriter, mut run: usize) {
  for count in [128u16, 64, 32, 16, 8, 4, 2, 1] {
    while run >= usize::from(count) {
      let code = code_for(count, 0);
      w.put(code.bits, code.size);
      run -= usize::from(count);
    }
  }
}

fn put_value(w: &mut MsbWriter, value: i16) {
  let magnitude = value.unsigned_abs();
  if magnitude <= 16 {
    let code = code_for(1, magnitude);
    w.put(code.bits, code.size);
  } else {
    let escape = code_for(1, MAGNITUDE_ESCAPE);
    w.put(escape.bits, escape.size);
    w.put(u32::from(magnitude), 16);
  }
  w.put(u32::from(value < 0), 1);
}

pub(crate) fn put_band_end(w: &mut MsbWriter) {
  let code = code_for(0, 0);
  w.put(code.bits, code.size);
}

/// Encode a highpass band payload from raw (pre-quantization)
/// coefficients, terminated by the end-of-band code.
pub(crate) fn encode_highpass(coeffs: &[i16]) -> Vec<u8> {
  let mut w = MsbWriter::new();
  let mut i = 0;
  while i < coeffs.len() {
    if coeffs[i] == 0 {
      let mut run = 0;
      while i + run < coeffs.len() && coeffs[i + run] == 0 {
        run += 1;
      }
      put_zero_run(&mut w, run);
      i += run;
    } else {
      put_value(&mut w, coeffs[i]);
      i += 1;
    }
  }
  put_band_end(&mut w);
  w.finish_segments()
}

/// Encode a lowpass band payload of unsigned samples.
pub(crate) fn encode_lowpass(samples: &[u16], precision: u32) -> Vec<u8> {
  let mut w = MsbWriter::new();
  for &sample in samples {
    w.put(u32::from(sample), precision);
  }
  w.finish_segments()
}

/// Append one 16 bit big-endian tag/value pair.
pub(crate) fn put_tag_raw(stream: &mut Vec<u8>, tag: i16, val: u16) {
  stream.extend_from_slice(&(tag as u16).to_be_bytes());
  stream.extend_from_slice(&val.to_be_bytes());
}

pub(crate) fn put_tag(stream: &mut Vec<u8>, tag: Vc5Tag, val: u16) {
  put_tag_raw(stream, tag as i16, val);
}

/// Append a codeblock chunk: the value carries the payload length in
/// 4 byte segments.
pub(crate) fn put_codeblock(stream: &mut Vec<u8>, payload: &[u8]) {
  assert_eq!(payload.len() % 4, 0);
  put_tag(stream, Vc5Tag::LargeCodeblock, (payload.len() / 4) as u16);
  stream.extend_from_slice(payload);
}
