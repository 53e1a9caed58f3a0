// SPDX-License-Identifier: LGPL-2.1

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Clamp a value into the unsigned range of `bits` wide samples.
#[inline(always)]
pub fn clampbits(val: i32, bits: u32) -> u16 {
  let max = (1 << bits) - 1;
  if val < 0 {
    0
  } else if val > max {
    max as u16
  } else {
    val as u16
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Endian {
  Big,
  #[default]
  Little,
}

impl Endian {
  #[inline]
  pub fn read_u16(&self, buf: &[u8], offset: usize) -> u16 {
    match *self {
      Self::Big => BigEndian::read_u16(&buf[offset..]),
      Self::Little => LittleEndian::read_u16(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_u32(&self, buf: &[u8], offset: usize) -> u32 {
    match *self {
      Self::Big => BigEndian::read_u32(&buf[offset..]),
      Self::Little => LittleEndian::read_u32(&buf[offset..]),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clampbits_limits() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    assert_eq!(clampbits(-5, 12), 0);
    assert_eq!(clampbits(4095, 12), 4095);
    assert_eq!(clampbits(4096, 12), 4095);
    assert_eq!(clampbits(100000, 14), 16383);
    assert_eq!(clampbits(77, 16), 77);
    Ok(())
  }

  #[test]
  fn endian_reads() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    let buf = [0x12, 0x34, 0x56, 0x78];
    assert_eq!(Endian::Big.read_u16(&buf, 0), 0x1234);
    assert_eq!(Endian::Little.read_u16(&buf, 0), 0x3412);
    assert_eq!(Endian::Big.read_u32(&buf, 0), 0x12345678);
    assert_eq!(Endian::Little.read_u32(&buf, 0), 0x78563412);
    Ok(())
  }
}
