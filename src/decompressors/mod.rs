// SPDX-License-Identifier: LGPL-2.1

//! Bitstream codecs for compressed RAW strips.
//!
//! Each codec consumes an immutable byte window and fills a caller
//! owned [`crate::pixarray::PixU16`] buffer. Strip location, metadata
//! and post-processing are the concern of the embedding library.

pub mod srw3;
pub mod vc5;
