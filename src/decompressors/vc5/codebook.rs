// SPDX-License-Identifier: LGPL-2.1

//! Run length / value codebook for VC-5 highpass bands.
//!
//! Every codeword maps to a (run count, magnitude) pair: zero
//! coefficients are grouped into runs, nonzero magnitudes come one at
//! a time with a trailing sign bit. Magnitudes past the table range
//! use an escape code followed by 16 raw bits. A run count of zero is
//! the distinguished end-of-band marker. The codes form a canonical
//! prefix-free set ordered by length, so a first-match scan over the
//! table resolves every symbol.

use crate::pumps::{BitPump, BitPumpMSB};
use crate::{CodecError, Result};

/// Magnitude marker for the escape code
pub(crate) const MAGNITUDE_ESCAPE: u16 = u16::MAX;

/// One codebook entry: `size` bits of `bits` decode to `count`
/// coefficients of magnitude `value`.
pub(crate) struct Rlv {
  pub size: u32,
  pub bits: u32,
  pub count: u16,
  pub value: u16,
}

#[rustfmt::skip]
pub(crate) static TABLE: [Rlv; 26] = [
  Rlv { size:  1, bits: 0b0,                count:   1, value: 0 },
  Rlv { size:  3, bits: 0b100,              count:   2, value: 0 },
  Rlv { size:  3, bits: 0b101,              count:   1, value: 1 },
  Rlv { size:  5, bits: 0b11000,            count:   4, value: 0 },
  Rlv { size:  5, bits: 0b11001,            count:   1, value: 2 },
  Rlv { size:  6, bits: 0b110100,           count:   8, value: 0 },
  Rlv { size:  6, bits: 0b110101,           count:   1, value: 3 },
  Rlv { size:  7, bits: 0b1101100,          count:  16, value: 0 },
  Rlv { size:  7, bits: 0b1101101,          count:   1, value: 4 },
  Rlv { size:  8, bits: 0b11011100,         count:  32, value: 0 },
  Rlv { size:  8, bits: 0b11011101,         count:   1, value: 5 },
  Rlv { size:  9, bits: 0b110111100,        count:  64, value: 0 },
  Rlv { size:  9, bits: 0b110111101,        count:   1, value: 6 },
  Rlv { size: 10, bits: 0b1101111100,       count: 128, value: 0 },
  Rlv { size: 10, bits: 0b1101111101,       count:   1, value: 7 },
  Rlv { size: 11, bits: 0b11011111100,      count:   1, value: 8 },
  Rlv { size: 11, bits: 0b11011111101,      count:   1, value: 9 },
  Rlv { size: 12, bits: 0b110111111100,     count:   1, value: 10 },
  Rlv { size: 12, bits: 0b110111111101,     count:   1, value: 11 },
  Rlv { size: 13, bits: 0b1101111111100,    count:   1, value: 12 },
  Rlv { size: 13, bits: 0b1101111111101,    count:   1, value: 13 },
  Rlv { size: 14, bits: 0b11011111111100,   count:   1, value: 14 },
  Rlv { size: 14, bits: 0b11011111111101,   count:   1, value: 15 },
  Rlv { size: 15, bits: 0b110111111111100,  count:   1, value: 16 },
  Rlv { size: 15, bits: 0b110111111111101,  count:   1, value: MAGNITUDE_ESCAPE },
  Rlv { size: 16, bits: 0b1101111111111100, count:   0, value: 0 },
];

/// Decoded run/value symbol; `count == 0` ends the band.
pub(crate) struct RlvSymbol {
  pub count: u32,
  pub value: i16,
}

/// Decode the next run/value symbol. The sign bit trails the codeword
/// and is only present for nonzero magnitudes.
pub(crate) fn read_rlv(pump: &mut BitPumpMSB<'_>) -> Result<RlvSymbol> {
  let entry = TABLE
    .iter()
    .find(|entry| pump.peek_bits(entry.size) == entry.bits)
    .ok_or_else(|| CodecError::Corrupted("invalid highpass codeword".into()))?;
  pump.consume_bits(entry.size)?;

  let magnitude = if entry.value == MAGNITUDE_ESCAPE {
    pump.get_bits(16)?
  } else {
    u32::from(entry.value)
  };
  let value = if magnitude != 0 && pump.get_bits(1)? != 0 {
    -(magnitude as i32)
  } else {
    magnitude as i32
  };
  Ok(RlvSymbol {
    count: u32::from(entry.count),
    value: value as i16,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decompressors::vc5::testutil::MsbWriter;

  #[test]
  fn table_is_prefix_free() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    for (i, a) in TABLE.iter().enumerate() {
      assert!(a.size <= 16);
      assert!(a.bits < (1 << a.size));
      for (j, b) in TABLE.iter().enumerate() {
        if i == j {
          continue;
        }
        if a.size <= b.size {
          assert_ne!(a.bits, b.bits >> (b.size - a.size), "entry {} is a prefix of entry {}", i, j);
        }
      }
    }
    Ok(())
  }

  #[test]
  fn every_entry_roundtrips() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    for entry in TABLE.iter() {
      let mut w = MsbWriter::new();
      w.put(entry.bits, entry.size);
      if entry.value != 0 {
        if entry.value == MAGNITUDE_ESCAPE {
          w.put(12345, 16);
        }
        w.put(1, 1); // negative sign
      }
      let bytes = w.finish();
      let mut pump = BitPumpMSB::new(&bytes);
      let sym = read_rlv(&mut pump)?;
      assert_eq!(sym.count, u32::from(entry.count));
      if entry.value == MAGNITUDE_ESCAPE {
        assert_eq!(sym.value, -12345);
      } else if entry.value != 0 {
        assert_eq!(sym.value, -i16::try_from(entry.value)?);
      } else {
        assert_eq!(sym.value, 0);
      }
    }
    Ok(())
  }

  #[test]
  fn sign_bit_only_after_nonzero() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    let mut w = MsbWriter::new();
    w.put(0b0, 1); // single zero, no sign bit
    w.put(0b101, 3); // magnitude 1
    w.put(0, 1); // positive
    let bytes = w.finish();
    let mut pump = BitPumpMSB::new(&bytes);

    let zero = read_rlv(&mut pump)?;
    assert_eq!((zero.count, zero.value), (1, 0));
    let one = read_rlv(&mut pump)?;
    assert_eq!((one.count, one.value), (1, 1));
    Ok(())
  }

  #[test]
  fn garbage_code_is_corrupt() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    // 0b111... matches no entry
    let bytes = [0xff, 0xff];
    let mut pump = BitPumpMSB::new(&bytes);
    assert!(matches!(read_rlv(&mut pump), Err(CodecError::Corrupted(_))));
    Ok(())
  }
}
