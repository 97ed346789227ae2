// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Binary range coder: the engine ContextModel's probabilities drive.
//
// Grounded on other_examples' H265Writer/H265Reader (the LPS range-split
// table, renormalization shift table, and carry-propagation flush logic are
// taken from there almost verbatim) and on
// original_source/xvc_enc_lib/syntax_writer.cc for the higher-level bin
// vocabulary (EncodeBin/EncodeBypass/EncodeBypassBins/EncodeBinTrm) that
// SyntaxWriter is built on top of.

use crate::context_model::{ContextModel, RANGE_TAB_LPS};
use crate::error::{CodecError, Result};

// Renormalization shift amount indexed by (lps_range >> 3), per the
// standard HEVC coder.
const RENORM_TABLE: [u8; 32] = [
  6, 5, 4, 4, 3, 3, 3, 3, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
];

pub struct ArithmeticEncoder {
  out: Vec<u8>,
  low: u32,
  range: u32,
  buffered_byte: i32,
  num_buffered_bytes: i32,
  bits_left: i32,
  // Sub-byte accumulator used only by `finish()`'s byte-aligning tail.
  tail_bits: u32,
  tail_count: u32,
}

impl ArithmeticEncoder {
  pub fn new() -> Self {
    Self {
      out: Vec::new(),
      low: 0,
      range: 510,
      buffered_byte: 0xff,
      num_buffered_bytes: 0,
      bits_left: 23,
      tail_bits: 0,
      tail_count: 0,
    }
  }

  pub fn encode_bin(&mut self, ctx: &mut ContextModel, bin: u32) {
    let state = ctx.state() as usize;
    let q_idx = ((self.range >> 6) & 3) as usize;
    let lps_range = RANGE_TAB_LPS[state][q_idx] as u32;
    self.range -= lps_range;

    if bin as u8 != ctx.mps() {
      let num_bits = RENORM_TABLE[(lps_range >> 3) as usize] as u32;
      self.low = (self.low + self.range) << num_bits;
      self.range = lps_range << num_bits;
      ctx.update_lps();
      self.bits_left -= num_bits as i32;
    } else {
      ctx.update_mps();
      if self.range >= 256 {
        return;
      }
      self.low <<= 1;
      self.range <<= 1;
      self.bits_left -= 1;
    }
    if self.bits_left < 12 {
      self.flush_completed();
    }
  }

  pub fn encode_bypass(&mut self, bin: u32) {
    self.low <<= 1;
    if bin != 0 {
      self.low += self.range;
    }
    self.bits_left -= 1;
    if self.bits_left < 12 {
      self.flush_completed();
    }
  }

  pub fn encode_bypass_bins(&mut self, value: u32, num_bits: u32) {
    for i in (0..num_bits).rev() {
      self.encode_bypass((value >> i) & 1);
    }
  }

  // Terminating bin: range split degenerates to a fixed 2-entry split
  // rather than going through a ContextModel.
  pub fn encode_bin_trm(&mut self, bin: u32) {
    self.range -= 2;
    if bin != 0 {
      self.low += self.range;
      self.low <<= 7;
      self.range = 2 << 7;
      self.bits_left -= 7;
    } else if self.range >= 256 {
      return;
    } else {
      self.low <<= 1;
      self.range <<= 1;
      self.bits_left -= 1;
    }
    if self.bits_left < 12 {
      self.flush_completed();
    }
  }

  fn flush_completed(&mut self) {
    let lead_byte = self.low >> (24 - self.bits_left);
    self.bits_left += 8;
    self.low &= (1 << self.bits_left) - 1;
    if lead_byte == 0xff {
      self.num_buffered_bytes += 1;
      return;
    }
    if self.num_buffered_bytes > 0 {
      let carry = lead_byte >> 8;
      self.out.push(((self.buffered_byte as u32 + carry) & 0xff) as u8);
      let fill = if carry != 0 { 0x00 } else { 0xff };
      for _ in 1..self.num_buffered_bytes {
        self.out.push(fill);
      }
    }
    self.num_buffered_bytes = 1;
    self.buffered_byte = (lead_byte & 0xff) as i32;
  }

  // Append the low-order `num_bits` of `value` (MSB first) to the output,
  // used only for the non-arithmetic byte-aligning tail in `finish()`.
  fn write_tail_bits(&mut self, value: u32, num_bits: u32) {
    for i in (0..num_bits).rev() {
      self.tail_bits = (self.tail_bits << 1) | ((value >> i) & 1);
      self.tail_count += 1;
      if self.tail_count == 8 {
        self.out.push(self.tail_bits as u8);
        self.tail_bits = 0;
        self.tail_count = 0;
      }
    }
  }

  // Flush the remaining low/range state, producing the final byte-aligned
  // stream. Mirrors the standard HEVC CABAC encoder's finish(): resolve any
  // pending carry against the buffered byte, then emit the low bits still
  // held in `low`.
  pub fn finish(&mut self) -> Vec<u8> {
    if (self.low >> (32 - self.bits_left)) & 1 != 0 {
      self.write_tail_bits((self.buffered_byte as u32 + 1) & 0xff, 8);
      for _ in 1..self.num_buffered_bytes {
        self.write_tail_bits(0x00, 8);
      }
      self.low = self.low.wrapping_sub(1 << (32 - self.bits_left));
    } else {
      if self.num_buffered_bytes > 0 {
        self.write_tail_bits((self.buffered_byte as u32) & 0xff, 8);
      }
      for _ in 1..self.num_buffered_bytes {
        self.write_tail_bits(0xff, 8);
      }
    }
    let remaining_bits = 24 - self.bits_left;
    if remaining_bits > 0 {
      self.write_tail_bits(self.low >> 8, remaining_bits as u32);
    }
    if self.tail_count > 0 {
      self.out.push((self.tail_bits << (8 - self.tail_count)) as u8);
      self.tail_bits = 0;
      self.tail_count = 0;
    }
    std::mem::take(&mut self.out)
  }
}

pub struct ArithmeticDecoder<'a> {
  buf: &'a [u8],
  pos: usize,
  value: u32,
  range: u32,
  bits_needed: i32,
}

impl<'a> ArithmeticDecoder<'a> {
  pub fn new(buf: &'a [u8]) -> Result<Self> {
    let mut dec = Self { buf, pos: 0, value: 0, range: 510, bits_needed: 8 };
    let b0 = dec.next_byte()?;
    let b1 = dec.next_byte()?;
    dec.value = ((b0 as u32) << 8) | b1 as u32;
    dec.bits_needed = -8;
    Ok(dec)
  }

  fn next_byte(&mut self) -> Result<u8> {
    let byte = *self.buf.get(self.pos).ok_or(CodecError::StreamExhausted)?;
    self.pos += 1;
    Ok(byte)
  }

  pub fn decode_bin(&mut self, ctx: &mut ContextModel) -> Result<u32> {
    let state = ctx.state() as usize;
    let q_idx = ((self.range >> 6) & 3) as usize;
    let lps_range = RANGE_TAB_LPS[state][q_idx] as u32;
    self.range -= lps_range;
    let scaled_range = self.range << 7;

    let bin = if self.value < scaled_range {
      ctx.update_mps();
      if scaled_range >= (256 << 7) {
        self.range = scaled_range >> 7;
        return Ok(ctx.mps() as u32);
      }
      self.range = scaled_range >> 7;
      self.value <<= 1;
      self.bits_needed += 1;
      if self.bits_needed >= 0 {
        self.refill()?;
      }
      ctx.mps() as u32
    } else {
      let num_bits = RENORM_TABLE[(lps_range >> 3) as usize] as u32;
      self.value = (self.value - scaled_range) << num_bits;
      self.range = lps_range << num_bits;
      let bin = 1 - ctx.mps() as u32;
      ctx.update_lps();
      self.bits_needed += num_bits as i32;
      if self.bits_needed >= 0 {
        self.refill()?;
      }
      bin
    };
    Ok(bin)
  }

  fn refill(&mut self) -> Result<()> {
    let byte = self.next_byte()?;
    self.value += (byte as u32) << self.bits_needed;
    self.bits_needed -= 8;
    Ok(())
  }

  pub fn decode_bypass(&mut self) -> Result<u32> {
    self.value <<= 1;
    self.bits_needed += 1;
    if self.bits_needed >= 0 {
      self.refill()?;
    }
    let scaled_range = self.range << 7;
    if self.value >= scaled_range {
      self.value -= scaled_range;
      Ok(1)
    } else {
      Ok(0)
    }
  }

  pub fn decode_bypass_bins(&mut self, num_bits: u32) -> Result<u32> {
    let mut value = 0u32;
    for _ in 0..num_bits {
      value = (value << 1) | self.decode_bypass()?;
    }
    Ok(value)
  }

  pub fn decode_bin_trm(&mut self) -> Result<u32> {
    self.range -= 2;
    let scaled_range = self.range << 7;
    if self.value >= scaled_range {
      self.value = (self.value - scaled_range) << 7;
      self.range = 2 << 7;
      self.bits_needed += 7;
      if self.bits_needed >= 0 {
        self.refill()?;
      }
      Ok(1)
    } else {
      if scaled_range < (256 << 7) {
        self.range = scaled_range >> 7;
        self.value <<= 1;
        self.bits_needed += 1;
        if self.bits_needed >= 0 {
          self.refill()?;
        }
      } else {
        self.range = scaled_range >> 7;
      }
      Ok(0)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bypass_round_trips_a_bit_pattern() {
    let mut enc = ArithmeticEncoder::new();
    let pattern: u32 = 0b1011_0010_1101_1001;
    enc.encode_bypass_bins(pattern, 16);
    enc.encode_bin_trm(1);
    let bytes = enc.finish();

    let mut dec = ArithmeticDecoder::new(&bytes).unwrap();
    let decoded = dec.decode_bypass_bins(16).unwrap();
    assert_eq!(decoded, pattern);
  }

  #[test]
  fn context_coded_bins_round_trip() {
    let mut enc = ArithmeticEncoder::new();
    let mut ctx_enc = ContextModel::new();
    ctx_enc.init(26, 154);
    let bins = [0u32, 1, 1, 0, 0, 0, 1, 1, 1, 0];
    for &b in &bins {
      enc.encode_bin(&mut ctx_enc, b);
    }
    enc.encode_bin_trm(1);
    let bytes = enc.finish();

    let mut dec = ArithmeticDecoder::new(&bytes).unwrap();
    let mut ctx_dec = ContextModel::new();
    ctx_dec.init(26, 154);
    for &b in &bins {
      assert_eq!(dec.decode_bin(&mut ctx_dec).unwrap(), b);
    }
  }

  #[test]
  fn decoder_reports_exhaustion_on_empty_input() {
    assert!(ArithmeticDecoder::new(&[]).is_err());
  }
}
