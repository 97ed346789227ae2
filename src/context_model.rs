// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Adaptive binary probability context.
//
// Grounded on original_source/xvc_common_lib/context_model.h (state/mps
// packing, Init/UpdateMps/UpdateLps/GetEntropyBits contract) and on
// other_examples' H265Context (the 128-entry kNextStateMps/kNextStateLps
// transition tables, which are the standard HEVC CABAC tables).

use std::sync::OnceLock;

use crate::util::clamp;

// Packed (state << 1) | mps, state in 0..64.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextModel {
  packed: u8,
}

// State reached after coding the bin equal to the current MPS, indexed by
// the full packed (state<<1)|mps byte.
const NEXT_STATE_MPS: [u8; 128] = [
  2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
  28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51,
  52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63, 64, 65, 66, 67, 68, 69, 70, 71, 72, 73, 74, 75,
  76, 77, 78, 79, 80, 81, 82, 83, 84, 85, 86, 87, 88, 89, 90, 91, 92, 93, 94, 95, 96, 97, 98, 99,
  100, 101, 102, 103, 104, 105, 106, 107, 108, 109, 110, 111, 112, 113, 114, 115, 116, 117, 118,
  119, 120, 121, 122, 123, 124, 125, 124, 125, 126, 127,
];

// State reached after coding the bin opposite the current MPS; also flips
// the MPS bit whenever the pre-transition state is 0.
const NEXT_STATE_LPS: [u8; 128] = [
  1, 0, 0, 1, 2, 3, 4, 5, 4, 5, 8, 9, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 18, 19, 22,
  23, 22, 23, 24, 25, 26, 27, 26, 27, 30, 31, 30, 31, 32, 33, 32, 33, 36, 37, 36, 37, 38, 39, 38,
  39, 42, 43, 42, 43, 44, 45, 44, 45, 46, 47, 48, 49, 48, 49, 50, 51, 52, 53, 52, 53, 54, 55, 54,
  55, 56, 57, 58, 59, 58, 59, 60, 61, 60, 61, 60, 61, 62, 63, 64, 65, 64, 65, 66, 67, 66, 67, 66,
  67, 68, 69, 68, 69, 70, 71, 70, 71, 70, 71, 72, 73, 72, 73, 72, 73, 74, 75, 74, 75, 74, 75, 76,
  77, 76, 77, 126, 127,
];

// Nominal LPS sub-range out of a renormalized range of ~512, one entry per
// state (independent of mps). Shared with ArithmeticCoder's renormalization
// and reused here to derive entropy-bit costs, so the two stay consistent.
pub(crate) const RANGE_TAB_LPS: [[u16; 4]; 64] = [
  [128, 176, 208, 240], [128, 167, 197, 227], [128, 158, 187, 216], [123, 150, 178, 205],
  [116, 142, 169, 195], [111, 135, 160, 185], [105, 128, 152, 175], [100, 122, 144, 166],
  [95, 116, 137, 158], [90, 110, 130, 150], [85, 104, 123, 142], [81, 99, 117, 135],
  [77, 94, 111, 128], [73, 89, 105, 122], [69, 85, 100, 116], [66, 80, 95, 110],
  [62, 76, 90, 104], [59, 72, 86, 99], [56, 69, 81, 94], [53, 65, 77, 89],
  [51, 62, 73, 85], [48, 59, 69, 80], [46, 56, 66, 76], [43, 53, 63, 72],
  [41, 50, 59, 69], [39, 48, 56, 65], [37, 45, 54, 62], [35, 43, 51, 59],
  [33, 41, 48, 56], [32, 39, 46, 53], [30, 37, 43, 50], [29, 35, 41, 48],
  [27, 33, 39, 45], [26, 31, 37, 43], [24, 30, 35, 41], [23, 28, 33, 39],
  [22, 27, 32, 37], [21, 26, 30, 35], [20, 24, 29, 33], [19, 23, 27, 31],
  [18, 22, 26, 30], [17, 21, 25, 28], [16, 20, 23, 27], [15, 19, 22, 25],
  [14, 18, 21, 24], [14, 17, 20, 23], [13, 16, 19, 22], [12, 15, 18, 21],
  [12, 14, 17, 20], [11, 14, 16, 19], [11, 13, 15, 18], [10, 12, 15, 17],
  [10, 12, 14, 16], [9, 11, 13, 15], [9, 11, 12, 14], [8, 10, 12, 14],
  [8, 9, 11, 13], [7, 9, 11, 12], [7, 9, 10, 12], [7, 8, 10, 11],
  [6, 8, 9, 11], [6, 7, 9, 10], [6, 7, 8, 9], [2, 2, 2, 2],
];

const FRAC_BITS_PRECISION: u32 = 15;
const Q15: f64 = (1u32 << FRAC_BITS_PRECISION) as f64;

fn entropy_bits_table() -> &'static [u32; 128] {
  static TABLE: OnceLock<[u32; 128]> = OnceLock::new();
  TABLE.get_or_init(|| {
    let mut table = [0u32; 128];
    for state in 0..64usize {
      // Representative nominal LPS probability for this state, taken from
      // the same range-split table the arithmetic coder renormalizes
      // against (column 2 of 4, the "typical" starting-range case).
      let p_lps = (RANGE_TAB_LPS[state][2] as f64) / 512.0;
      let p_lps = p_lps.clamp(1e-6, 1.0 - 1e-6);
      let mps_cost = -(1.0 - p_lps).log2() * Q15;
      let lps_cost = -p_lps.log2() * Q15;
      table[state * 2] = mps_cost.round() as u32;
      table[state * 2 + 1] = lps_cost.round() as u32;
    }
    table
  })
}

impl ContextModel {
  pub const fn new() -> Self {
    Self { packed: 0 }
  }

  // Derive (state, mps) from an 8-bit init_value and a QP, per the standard
  // HEVC slope/offset initialization formula.
  pub fn init(&mut self, qp: i32, init_value: u8) {
    let slope_idx = (init_value >> 4) as i32;
    let offset_idx = (init_value & 15) as i32;
    let m = slope_idx * 5 - 45;
    let n = (offset_idx << 3) - 16;
    let qp_clamped = clamp(qp, 0, 51);
    let pre_ctx_state = clamp(((m * qp_clamped) >> 4) + n, 1, 126);
    let mps = if pre_ctx_state <= 63 { 0u8 } else { 1u8 };
    let state = if mps == 1 { pre_ctx_state - 64 } else { 63 - pre_ctx_state };
    self.set_state(state as u8, mps);
  }

  pub fn set_state(&mut self, state: u8, mps: u8) {
    debug_assert!(state < 64);
    debug_assert!(mps < 2);
    self.packed = (state << 1) | mps;
  }

  pub fn state(&self) -> u8 {
    self.packed >> 1
  }

  pub fn mps(&self) -> u8 {
    self.packed & 1
  }

  pub fn update_mps(&mut self) {
    self.packed = NEXT_STATE_MPS[self.packed as usize];
  }

  pub fn update_lps(&mut self) {
    self.packed = NEXT_STATE_LPS[self.packed as usize];
  }

  pub fn get_entropy_bits(&self, bin: u32) -> u32 {
    entropy_bits_table()[(self.packed as u32 ^ bin) as usize]
  }

  pub fn get_entropy_bits_trm(bin: u32) -> u32 {
    entropy_bits_table()[(126 ^ bin) as usize]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn init_produces_state_in_range() {
    let mut ctx = ContextModel::new();
    for qp in 0..=51 {
      for init_value in 0..=255u8 {
        ctx.init(qp, init_value);
        assert!(ctx.state() < 64);
        assert!(ctx.mps() < 2);
      }
    }
  }

  #[test]
  fn mps_transition_never_decreases_confidence_below_zero() {
    let mut ctx = ContextModel::new();
    ctx.set_state(0, 0);
    for _ in 0..200 {
      ctx.update_mps();
      assert!(ctx.state() < 64);
    }
  }

  #[test]
  fn lps_from_state_zero_flips_mps() {
    let mut ctx = ContextModel::new();
    ctx.set_state(0, 1);
    ctx.update_lps();
    assert_eq!(ctx.state(), 0);
    assert_eq!(ctx.mps(), 0);
  }

  #[test]
  fn entropy_bits_favor_mps() {
    let mut ctx = ContextModel::new();
    ctx.set_state(40, 1);
    assert!(ctx.get_entropy_bits(1) < ctx.get_entropy_bits(0));
  }

  #[test]
  fn entropy_bits_trm_uses_fixed_state() {
    assert!(ContextModel::get_entropy_bits_trm(0) > 0);
    assert!(ContextModel::get_entropy_bits_trm(1) > 0);
  }
}
