// SPDX-License-Identifier: LGPL-2.1

use log::debug;
use rayon::prelude::*;

use super::codebook::read_rlv;
use super::wavelet::{Band, Wavelet, BAND_LL};
use super::{Vc5Tag, IMGFORMAT_RAW, LARGE_CHUNK, NUM_CHANNELS, NUM_SUBBANDS, NUM_WAVELET_LEVELS, PRECISION_MAX, PRECISION_MIN, SMALL_CHUNK, VC5_LOG_TABLE_BITWIDTH};
use crate::bits::Endian;
use crate::lut::SimpleLut;
use crate::pixarray::{PixI16, PixU16};
use crate::pumps::{BitPump, BitPumpMSB, ByteStream};
use crate::{CodecError, Result};

/// Wavelet level owning each subband: subband 0 is the lowpass band of
/// the deepest level, then three highpass bands per level moving out.
const SUBBAND_WAVELET_INDEX: [usize; NUM_SUBBANDS] = [2, 2, 2, 2, 1, 1, 1, 0, 0, 0];
const SUBBAND_BAND_INDEX: [usize; NUM_SUBBANDS] = [0, 1, 2, 3, 1, 2, 3, 1, 2, 3];

/// Decoding context mutated by the tag stream
struct FrameParams {
  channel: usize,
  subband: Option<usize>,
  img_width: usize,
  img_height: usize,
  img_format: u16,
  pattern_width: usize,
  pattern_height: usize,
  cps: u16,
  bpc: u16,
  lowpass_precision: u32,
  quantization: i16,
}

impl Default for FrameParams {
  fn default() -> Self {
    FrameParams {
      channel: 0,
      subband: None,
      img_width: 0,
      img_height: 0,
      img_format: IMGFORMAT_RAW,
      pattern_width: 2,
      pattern_height: 2,
      cps: 1,
      bpc: VC5_LOG_TABLE_BITWIDTH as u16,
      lowpass_precision: 16,
      quantization: 1,
    }
  }
}

#[derive(Default)]
struct Transform {
  wavelet: Wavelet,
  prescale: i16,
}

impl Transform {
  fn reconstruct(&self, clamp_bits: Option<u32>) -> Result<PixI16> {
    if self.wavelet.high_bands_empty() {
      Ok(self.wavelet.reconstruct_low(self.prescale, clamp_bits))
    } else {
      self.wavelet.reconstruct(self.prescale, clamp_bits)
    }
  }
}

#[derive(Default)]
struct Channel {
  transforms: [Transform; NUM_WAVELET_LEVELS],
}

pub struct Vc5Decompressor<'a> {
  bs: ByteStream<'a>,
  params: FrameParams,
  channels: [Channel; NUM_CHANNELS],
  /// Effective output depth, used for clamping and the log table
  bits: u32,
  log_table: SimpleLut<u16>,
}

impl<'a> Vc5Decompressor<'a> {
  pub fn new(src: &'a [u8], width: usize, height: usize, bits: u32) -> Result<Vc5Decompressor<'a>> {
    if !matches!(bits, 10 | 12 | 14 | 16) {
      return Err(CodecError::Unsupported(format!("VC5: {} bits per sample", bits)));
    }
    // Each channel plane is halved three times, so frame dimensions
    // must divide down evenly through the CFA pattern and all levels
    let align = 2 << NUM_WAVELET_LEVELS;
    if width == 0 || height == 0 || width % align != 0 || height % align != 0 {
      return Err(CodecError::Dimension(format!("dimensions {}x{} not aligned to {}", width, height, align)));
    }

    let mut channels: [Channel; NUM_CHANNELS] = Default::default();
    for channel in &mut channels {
      let mut wavelet_width = width / 2;
      let mut wavelet_height = height / 2;
      for transform in &mut channel.transforms {
        wavelet_width /= 2;
        wavelet_height /= 2;
        transform.wavelet.initialize(wavelet_width, wavelet_height);
      }
    }

    Ok(Vc5Decompressor {
      bs: ByteStream::new(src, Endian::Big),
      params: FrameParams {
        img_width: width,
        img_height: height,
        ..Default::default()
      },
      channels,
      bits,
      log_table: build_log_table(bits),
    })
  }

  /// Run the tag state machine to completion, then assemble the
  /// output image. One decompressor instance decodes one frame.
  pub fn decompress(&mut self, out: &mut PixU16) -> Result<()> {
    if out.width != self.params.img_width || out.height != self.params.img_height {
      return Err(CodecError::Dimension(format!(
        "output buffer is {}x{}, expected {}x{}",
        out.width, out.height, self.params.img_width, self.params.img_height
      )));
    }
    self.parse_tags()?;
    self.decode_final_wavelet(out)
  }

  fn parse_tags(&mut self) -> Result<()> {
    let mut done = false;
    while !done && self.bs.remaining_bytes() > 0 {
      let tag_word = self.bs.get_u16()? as i16;
      let val = self.bs.get_u16()?;
      let optional = tag_word < 0;
      let tag = if optional { tag_word.wrapping_neg() } else { tag_word };

      match Vc5Tag::n(tag) {
        Some(Vc5Tag::ChannelCount) => {
          if usize::from(val) != NUM_CHANNELS {
            return Err(CodecError::Unsupported(format!("channel count {}", val)));
          }
        }
        Some(Vc5Tag::SubbandCount) => {
          if usize::from(val) != NUM_SUBBANDS {
            return Err(CodecError::Unsupported(format!("subband count {}", val)));
          }
        }
        Some(Vc5Tag::ImageWidth) => {
          if usize::from(val) != self.params.img_width {
            return Err(CodecError::Dimension(format!("stream width {} does not match container width {}", val, self.params.img_width)));
          }
        }
        Some(Vc5Tag::ImageHeight) => {
          if usize::from(val) != self.params.img_height {
            return Err(CodecError::Dimension(format!(
              "stream height {} does not match container height {}",
              val, self.params.img_height
            )));
          }
        }
        Some(Vc5Tag::LowpassPrecision) => {
          if !(PRECISION_MIN..=PRECISION_MAX).contains(&val) {
            return Err(CodecError::Corrupted(format!("lowpass precision {}", val)));
          }
          self.params.lowpass_precision = u32::from(val);
        }
        Some(Vc5Tag::SubbandNumber) => {
          if usize::from(val) >= NUM_SUBBANDS {
            return Err(CodecError::Corrupted(format!("subband number {}", val)));
          }
          self.params.subband = Some(usize::from(val));
        }
        Some(Vc5Tag::Quantization) => {
          self.params.quantization = val as i16;
        }
        Some(Vc5Tag::ChannelNumber) => {
          if usize::from(val) >= NUM_CHANNELS {
            return Err(CodecError::Corrupted(format!("channel number {}", val)));
          }
          self.params.channel = usize::from(val);
        }
        Some(Vc5Tag::ImageFormat) => {
          if val != IMGFORMAT_RAW {
            return Err(CodecError::Unsupported(format!("image format {}", val)));
          }
          self.params.img_format = val;
        }
        Some(Vc5Tag::MaxBitsPerComponent) => {
          if !(PRECISION_MIN..=PRECISION_MAX).contains(&val) {
            return Err(CodecError::Unsupported(format!("{} bits per component", val)));
          }
          self.params.bpc = val;
        }
        Some(Vc5Tag::PatternWidth) => {
          if usize::from(val) != self.params.pattern_width {
            return Err(CodecError::Unsupported(format!("pattern width {}", val)));
          }
        }
        Some(Vc5Tag::PatternHeight) => {
          if usize::from(val) != self.params.pattern_height {
            return Err(CodecError::Unsupported(format!("pattern height {}", val)));
          }
        }
        Some(Vc5Tag::ComponentsPerSample) => {
          if val != self.params.cps {
            return Err(CodecError::Unsupported(format!("{} components per sample", val)));
          }
        }
        Some(Vc5Tag::PrescaleShift) => {
          // Two bits per level, packed from bit 14 downward
          let channel = &mut self.channels[self.params.channel];
          for (level, transform) in channel.transforms.iter_mut().enumerate() {
            transform.prescale = ((val >> (14 - 2 * level)) & 0x3) as i16;
          }
        }
        Some(Vc5Tag::LargeCodeblock) => {
          let payload = self.bs.get_slice(4 * usize::from(val))?;
          self.decode_large_codeblock(payload)?;
        }
        None => {
          if !optional {
            return Err(CodecError::Corrupted(format!("unknown required tag {:#06x}", tag as u16)));
          }
          // Skip over the payload of unknown optional chunks
          let utag = tag as u16;
          let chunk_size = if utag & LARGE_CHUNK != 0 {
            (usize::from(utag & 0xff) << 16) | usize::from(val)
          } else if utag & SMALL_CHUNK != 0 {
            usize::from(val)
          } else {
            0
          };
          self.bs.consume_bytes(4 * chunk_size)?;
        }
      }

      // The parameter stream is complete once every outermost wavelet
      // has all bands
      done = self.channels.iter().all(|channel| channel.transforms[0].wavelet.all_bands_valid());
    }
    if !done {
      return Err(CodecError::Corrupted("stream ended with incomplete subbands".into()));
    }
    Ok(())
  }

  fn decode_large_codeblock(&mut self, payload: &[u8]) -> Result<()> {
    let subband = self
      .params
      .subband
      .take()
      .ok_or_else(|| CodecError::Corrupted("codeblock without a preceding subband number".into()))?;
    let wavelet_idx = SUBBAND_WAVELET_INDEX[subband];
    let band = SUBBAND_BAND_INDEX[subband];
    let channel_idx = self.params.channel;
    debug!("VC5 codeblock: channel {} subband {} -> wavelet {} band {}", channel_idx, subband, wavelet_idx, band);

    {
      let wavelet = &mut self.channels[channel_idx].transforms[wavelet_idx].wavelet;
      if wavelet.is_band_valid(band) {
        return Err(CodecError::Corrupted(format!(
          "band {} of wavelet {} on channel {} was decoded twice",
          band, wavelet_idx, channel_idx
        )));
      }
      if subband == 0 {
        decode_lowpass_band(payload, self.params.lowpass_precision, &mut wavelet.bands[band].data)?;
        wavelet.bands[band].quant = 1;
      } else {
        if self.params.quantization == 0 {
          return Err(CodecError::Corrupted("zero quantizer for highpass band".into()));
        }
        decode_highpass_band(payload, self.params.quantization, &mut wavelet.bands[band].data)?;
        wavelet.bands[band].quant = self.params.quantization;
      }
      wavelet.set_band_valid(band);
    }

    // A completed level immediately becomes the lowpass input of the
    // level above it
    if wavelet_idx > 0 && self.channels[channel_idx].transforms[wavelet_idx].wavelet.all_bands_valid() {
      let plane = self.channels[channel_idx].transforms[wavelet_idx].reconstruct(None)?;
      let upper = &mut self.channels[channel_idx].transforms[wavelet_idx - 1].wavelet;
      if upper.is_band_valid(BAND_LL) {
        return Err(CodecError::Corrupted("lowpass band produced twice".into()));
      }
      upper.bands[BAND_LL] = Band { data: plane, quant: 1 };
      upper.set_band_valid(BAND_LL);
    }
    Ok(())
  }

  /// Reconstruct the outermost level of every channel and interleave
  /// the planes into the CFA positions of the output image.
  fn decode_final_wavelet(&mut self, out: &mut PixU16) -> Result<()> {
    // Channels are independent, reconstruct them in parallel
    let clamp = Some(self.bits);
    let planes: Vec<PixI16> = self
      .channels
      .par_iter()
      .map(|channel| channel.transforms[0].reconstruct(clamp))
      .collect::<Result<Vec<_>>>()?;

    let companded = self.params.img_format == IMGFORMAT_RAW && u32::from(self.params.bpc) == VC5_LOG_TABLE_BITWIDTH;
    let (pattern_width, pattern_height) = (self.params.pattern_width, self.params.pattern_height);
    for row in 0..out.height {
      for col in 0..out.width {
        let channel = pattern_width * (row % pattern_height) + col % pattern_width;
        let value = *planes[channel].at(row / pattern_height, col / pattern_width);
        *out.at_mut(row, col) = if companded { self.log_table.sample(i32::from(value)) } else { value as u16 };
      }
    }
    Ok(())
  }
}

/// Inverse log companding curve, scaled to the output depth.
fn build_log_table(bits: u32) -> SimpleLut<u16> {
  SimpleLut::new(VC5_LOG_TABLE_BITWIDTH, |i, size| {
    let x = i as f64 / (size - 1) as f64;
    let y = (113.0f64.powf(x) - 1.0) / 112.0;
    ((f64::from(u16::MAX) * y) as u32 >> (16 - bits)) as u16
  })
}

/// A lowpass band is stored as plain unsigned samples of
/// `precision` bits each.
fn decode_lowpass_band(payload: &[u8], precision: u32, dst: &mut PixI16) -> Result<()> {
  let mut pump = BitPumpMSB::new(payload);
  for row in 0..dst.height {
    for col in 0..dst.width {
      *dst.at_mut(row, col) = pump.get_bits(precision)? as i16;
    }
  }
  Ok(())
}

/// A highpass band is a run length / variable length stream of
/// quantized coefficients. It must fill exactly width*height positions
/// and close with the end-of-band code.
fn decode_highpass_band(payload: &[u8], quant: i16, dst: &mut PixI16) -> Result<()> {
  let mut pump = BitPumpMSB::new(payload);
  let n_pixels = dst.width * dst.height;
  let data = dst.pixels_mut();
  let mut index = 0;
  while index < n_pixels {
    let symbol = read_rlv(&mut pump)?;
    if symbol.count == 0 {
      return Err(CodecError::Corrupted("highpass band ended early".into()));
    }
    if index + symbol.count as usize > n_pixels {
      return Err(CodecError::Corrupted("highpass run overflows the band".into()));
    }
    // Inverse quantization happens right here
    let value = (i32::from(symbol.value) * i32::from(quant)) as i16;
    for _ in 0..symbol.count {
      data[index] = value;
      index += 1;
    }
  }
  let eob = read_rlv(&mut pump)?;
  if eob.count != 0 {
    return Err(CodecError::Corrupted("missing end-of-band marker".into()));
  }
  Ok(())
}
