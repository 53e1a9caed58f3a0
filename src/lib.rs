// SPDX-License-Identifier: LGPL-2.1

//! Bitstream decompression kernels for camera RAW formats.
//!
//! This crate implements the performance sensitive inner loops of RAW
//! decoding: the vendor specific entropy codecs that turn a compressed
//! strip into a plane of sensor samples. Container parsing, camera
//! metadata and color processing live in the calling library; the
//! kernels only see an input byte window, a pre-sized output buffer and
//! a handful of parameters.
//!
//! Two codecs are provided:
//! * [`Srw3Decompressor`]: third generation Samsung SRW compression
//!   (NX1), TIFF compression tag 32773.
//! * [`Vc5Decompressor`]: the VC-5 subband wavelet codec used by
//!   GoPro GPR files.
//!
//! Both codecs decode strictly forward and fail fast: the first
//! violated stream invariant surfaces as a [`CodecError`] and the
//! output buffer contents are unspecified from that point on.

use thiserror::Error;

pub mod bits;
pub mod decompressors;
pub mod lut;
pub mod pixarray;
pub mod pumps;

pub use decompressors::srw3::Srw3Decompressor;
pub use decompressors::vc5::Vc5Decompressor;
pub use pixarray::PixU16;

/// Error variants shared by all codec kernels
#[derive(Debug, Error)]
pub enum CodecError {
  /// A bit cursor was asked to read past the end of its input window
  #[error("Bitstream exhausted")]
  EndOfStream,

  /// Declared dimensions are invalid or disagree with the container
  #[error("Dimension error: {}", _0)]
  Dimension(String),

  /// The stream violated an internal invariant
  #[error("Corrupt stream: {}", _0)]
  Corrupted(String),

  /// Recognized but unimplemented stream variant
  #[error("Unsupported: {}", _0)]
  Unsupported(String),
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
pub(crate) fn init_test_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}
