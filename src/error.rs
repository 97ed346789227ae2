// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Crate-wide error taxonomy.
//
// Mirrors the shape of ZpCodecError / DjvuError in the DjVu encoder this
// crate borrows its ambient error-handling conventions from: a single
// `thiserror`-derived enum, `#[from]` conversions at the I/O boundary, and
// a crate-local `Result` alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
  /// Restrictions profile, bit depth, or partition type is not supported
  /// by this configuration. Raised at setup; fatal.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// The decoder observed a bin sequence that violates an implicit
  /// invariant (e.g. a subblock CSBF implicitly 1 but decoded significance
  /// map empty, or a last position beyond the block).
  #[error("invalid stream: {0}")]
  InvalidStream(String),

  /// The decoder ran out of input bytes.
  #[error("stream exhausted")]
  StreamExhausted,
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_messages() {
    assert_eq!(
      CodecError::Configuration("bad qp".into()).to_string(),
      "configuration error: bad qp"
    );
    assert_eq!(CodecError::StreamExhausted.to_string(), "stream exhausted");
    assert_eq!(
      CodecError::InvalidStream("csbf".into()).to_string(),
      "invalid stream: csbf"
    );
  }
}
