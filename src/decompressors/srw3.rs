// SPDX-License-Identifier: LGPL-2.1

//! Decoder for third generation compressed SRW files (NX1), TIFF
//! compression tag 32773.
//!
//! Each line is encoded as a set of differences against reference
//! pixels from the current or the two previous lines. Pixels are
//! grouped in blocks of 16 (8 green, 8 red or blue). Every block
//! carries three sections: 1 or 4 bits selecting the reference pixels,
//! a section giving the difference bit length per quarter block, and
//! the packed differences themselves.

use std::cmp;

use log::debug;

use crate::bits::clampbits;
use crate::pixarray::PixU16;
use crate::pumps::{BitPump, BitPumpMSB32};
use crate::{CodecError, Result};

/// Diff length header is present in every block
const OPT_SKIP: u32 = 1;
/// Motion vector is a single bit
const OPT_MV: u32 = 2;
/// No scale updates
const OPT_QP: u32 = 4;

/// Largest sensor dimensions this generation of cameras produced
const MAX_WIDTH: usize = 6496;
const MAX_HEIGHT: usize = 4336;

/// Reference slide per motion mode
const MOTION_OFFSET: [isize; 7] = [-4, -2, -2, 0, 0, 2, 4];
/// Whether the reference is interpolated with its right neighbour
const MOTION_AVERAGE: [bool; 7] = [false, false, true, false, true, false, false];

struct Srw3Header {
  bit_depth: u32,
  width: usize,
  height: usize,
  optflags: u32,
  init_val: u16,
}

impl Srw3Header {
  fn parse(pump: &mut BitPumpMSB32<'_>) -> Result<Self> {
    pump.get_bits(16)?; // NLCVersion
    pump.get_bits(4)?; // ImgFormat
    let bit_depth = pump.get_bits(4)? + 1;
    pump.get_bits(4)?; // NumBlkInRCUnit
    pump.get_bits(4)?; // CompressionRatio
    let width = pump.get_bits(16)? as usize;
    let height = pump.get_bits(16)? as usize;
    pump.get_bits(16)?; // TileWidth
    pump.get_bits(4)?; // reserved
    let optflags = pump.get_bits(4)?;
    pump.get_bits(8)?; // OverlapWidth
    pump.get_bits(8)?; // reserved
    pump.get_bits(8)?; // Inc
    pump.get_bits(2)?; // reserved
    let init_val = pump.get_bits(14)? as u16;

    if width == 0 || height == 0 || width % 16 != 0 || width > MAX_WIDTH || height > MAX_HEIGHT {
      return Err(CodecError::Dimension(format!("unexpected image dimensions: {}x{}", width, height)));
    }
    Ok(Srw3Header {
      bit_depth,
      width,
      height,
      optflags,
      init_val,
    })
  }
}

pub struct Srw3Decompressor<'a> {
  src: &'a [u8],
  /// Output clamp depth from the container, not the strip header
  bits: u32,
}

impl<'a> Srw3Decompressor<'a> {
  pub fn new(src: &'a [u8], bits: u32) -> Result<Srw3Decompressor<'a>> {
    if !matches!(bits, 10 | 12 | 14 | 16) {
      return Err(CodecError::Unsupported(format!("SRW3: {} bits per sample", bits)));
    }
    Ok(Srw3Decompressor { src, bits })
  }

  pub fn decompress(&self, out: &mut PixU16) -> Result<()> {
    let mut pump = BitPumpMSB32::new(self.src);
    let hdr = Srw3Header::parse(&mut pump)?;
    if hdr.width != out.width || hdr.height != out.height {
      return Err(CodecError::Dimension(format!(
        "strip header says {}x{}, container says {}x{}",
        hdr.width, hdr.height, out.width, out.height
      )));
    }
    debug!("SRW3 strip: {}x{}, depth {}, optflags {:#x}", hdr.width, hdr.height, hdr.bit_depth, hdr.optflags);

    let width = hdr.width;
    let mut line_offset = 0;
    for row in 0..hdr.height {
      line_offset += pump.get_pos();
      // Each line starts on a 16 byte boundary
      if line_offset & 0xf != 0 {
        line_offset += 16 - (line_offset & 0xf);
      }
      if line_offset > self.src.len() {
        return Err(CodecError::EndOfStream);
      }
      pump = BitPumpMSB32::new(&self.src[line_offset..]);

      let img = width * row;
      let img_up = width * (cmp::max(1, row) - 1);
      let img_up2 = width * (cmp::max(2, row) - 2);

      // Motion, scale and the diff length context reset per line
      let mut motion: usize = 7;
      let mut scale: i32 = 0;
      let init = if row < 2 { 7u32 } else { 4u32 };
      let mut diff_bits_mode = [[init; 2]; 3];
      let mut diff_bits = [0u32; 4];

      for col in (0..width).step_by(16) {
        if hdr.optflags & OPT_QP == 0 && col & 63 == 0 {
          const SCALEVALS: [i32; 3] = [0, -2, 2];
          let i = pump.get_bits(2)? as usize;
          scale = if i < 3 { scale + SCALEVALS[i] } else { pump.get_bits(12)? as i32 };
        }

        // Which reference pixels does this block use
        if hdr.optflags & OPT_MV != 0 {
          motion = if pump.get_bits(1)? != 0 { 3 } else { 7 };
        } else if pump.get_bits(1)? == 0 {
          motion = pump.get_bits(3)? as usize;
        }
        if row < 2 && motion != 7 {
          return Err(CodecError::Corrupted(format!("motion {} at row {}", motion, row)));
        }

        if motion == 7 {
          // Base case: propagate along the line, the leftmost block is
          // seeded from the header value
          for i in 0..16 {
            out[img + col + i] = if col == 0 { hdr.init_val } else { out[img + col + i - 2] };
          }
        } else {
          // Look the reference up one or two lines above
          let slide = MOTION_OFFSET[motion];
          let average = MOTION_AVERAGE[motion];
          for i in 0..16 {
            let refpixel = if (row + i) & 1 != 0 {
              // Red and blue use the same color two lines up
              (img_up2 + col + i) as isize + slide
            } else if i & 1 != 0 {
              // Green uses the green neighbour one line up
              (img_up + col + i - 1) as isize + slide
            } else {
              (img_up + col + i + 1) as isize + slide
            };
            let last = if average { refpixel + 2 } else { refpixel };
            if refpixel < 0 || last as usize >= img {
              return Err(CodecError::Corrupted(format!("motion reference outside decoded rows at {}:{}", row, col + i)));
            }
            let refpixel = refpixel as usize;
            out[img + col + i] = if average {
              ((u32::from(out[refpixel]) + u32::from(out[refpixel + 2]) + 1) >> 1) as u16
            } else {
              out[refpixel]
            };
          }
        }

        // Difference bit length per quarter block. Without a header
        // section the lengths of the previous block stay in effect.
        if hdr.optflags & OPT_SKIP != 0 || pump.get_bits(1)? == 0 {
          let flags = [pump.get_bits(2)?, pump.get_bits(2)?, pump.get_bits(2)?, pump.get_bits(2)?];
          for i in 0..4 {
            // Quarter colors: 0 green, 1 blue, 2 red
            let colornum = if row & 1 != 0 { i >> 1 } else { ((i >> 1) + 2) % 3 };
            diff_bits[i] = match flags[i] {
              0 => diff_bits_mode[colornum][0],
              1 => diff_bits_mode[colornum][0] + 1,
              2 => diff_bits_mode[colornum][0].wrapping_sub(1),
              _ => pump.get_bits(4)?,
            };
            diff_bits_mode[colornum][0] = diff_bits_mode[colornum][1];
            diff_bits_mode[colornum][1] = diff_bits[i];
            if diff_bits[i] > hdr.bit_depth + 1 {
              return Err(CodecError::Corrupted(format!("diff length {} exceeds bit depth {}", diff_bits[i], hdr.bit_depth)));
            }
          }
        }

        // Read the differences and spread them over the block in the
        // order 0 2 4 6 8 10 12 14 1 3 5 7 9 11 13 15
        for i in 0..16 {
          let len = diff_bits[i >> 2];
          let mut diff = pump.get_ibits_sextended(len)?;
          diff = diff * (scale * 2 + 1) + scale;
          let pos = img + col + if row & 1 != 0 { ((i & 7) << 1) + 1 - (i >> 3) } else { ((i & 7) << 1) + (i >> 3) };
          out[pos] = clampbits(i32::from(out[pos]) + diff, self.bits);
        }
      }
    }
    Ok(())
  }
}
