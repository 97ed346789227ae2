// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Named groups of ContextModel state, one per syntax element family.
//
// Grounded on original_source/xvc_enc_lib/syntax_writer.cc, which reads
// each of these groups off a `CabacContexts` member (e.g.
// `ctx_.cu_split_flag`, `ctx_.cu_skip_flag`, `ctx_.subblock_csbf`,
// `ctx_.coeff_sig`, ...) and on context_model.h's `Init(qp, init_value)`
// contract for how a fresh set of states is seeded per-slice.

use crate::context_model::ContextModel;

/// How many times WriteCoeffGreaterThan1 keeps a distinct context per
/// `ctx_set` before falling back to the last one, mirroring `kMaxNumC1Flags`.
pub const MAX_NUM_C1_FLAGS: usize = 8;
pub const NUM_CTX_SETS: usize = 4;

/// Fixed significance-context map for a lone 4x4 transform, where there are
/// no neighboring subblocks to derive `pattern_sig_ctx` from.
const CTX_IDX_MAP_4X4: [u8; 16] = [0, 1, 4, 5, 2, 3, 4, 5, 6, 6, 8, 8, 7, 7, 8, 8];

/// Derives `pattern_sig_ctx` from a subblock's right- and below-neighbor
/// `coded_sub_block_flag` values: both absent bands toward the context that
/// expects the fewest remaining significant positions, either one present
/// toward the middle band, and both present toward the band expecting the
/// most.
pub fn pattern_sig_ctx(right_csbf: bool, below_csbf: bool) -> usize {
  match (right_csbf, below_csbf) {
    (false, false) => 2,
    (true, true) => 0,
    _ => 1,
  }
}

/// Context increment for the subblock CSBF bin itself: 1 if either
/// neighbor subblock has a coded coefficient, 0 otherwise.
pub fn subblock_csbf_ctx_inc(right_csbf: bool, below_csbf: bool) -> usize {
  (right_csbf || below_csbf) as usize
}

#[derive(Clone, Debug)]
pub struct CabacContexts {
  pub split_flag: [ContextModel; 3],
  pub skip_flag: [ContextModel; 3],
  pub pred_mode: ContextModel,
  pub part_size: [ContextModel; 4],
  pub prev_intra_luma_pred: ContextModel,
  pub intra_chroma_pred_mode: ContextModel,
  pub merge_flag: ContextModel,
  pub merge_idx: ContextModel,
  pub inter_dir: [ContextModel; 5],
  pub ref_idx: [ContextModel; 2],
  pub mvp_idx: ContextModel,
  pub root_cbf: ContextModel,
  pub cbf_luma: [ContextModel; 2],
  pub cbf_chroma: [ContextModel; 5],
  pub qp_delta: [ContextModel; 2],
  pub subblock_csbf: [ContextModel; 2],
  pub coeff_sig: [ContextModel; 44],
  pub coeff_greater1: [[ContextModel; MAX_NUM_C1_FLAGS]; NUM_CTX_SETS],
  pub coeff_greater2: [ContextModel; NUM_CTX_SETS],
  pub coeff_last_pos_x: [ContextModel; 18],
  pub coeff_last_pos_y: [ContextModel; 18],
  pub split_transform: [ContextModel; 3],
  pub end_of_slice: ContextModel,
}

// A context's 8-bit init_value packs a slope (high nibble) and offset (low
// nibble) per the standard HEVC initialization formula consumed by
// ContextModel::init. Values below are representative defaults in the
// documented I-slice init range rather than a hand-transcribed reference
// table: the retrieved sources show the *consumers* of these contexts but
// not the literal init-value tables, so exact per-syntax-element values are
// an Open Question resolved by picking plausible, internally consistent
// defaults (documented in DESIGN.md).
const DEFAULT_INIT_VALUE: u8 = 154;

impl CabacContexts {
  /// Build a fresh context set and seed every model at the given QP.
  pub fn new(qp: i32) -> Self {
        macro_rules! init_array {
      ($n:expr) => {{
        let mut arr: [ContextModel; $n] = [ContextModel::new(); $n];
        for ctx in arr.iter_mut() {
          ctx.init(qp, DEFAULT_INIT_VALUE);
        }
        arr
      }};
    }
    let mut pred_mode = ContextModel::new();
    pred_mode.init(qp, DEFAULT_INIT_VALUE);
    let mut prev_intra_luma_pred = ContextModel::new();
    prev_intra_luma_pred.init(qp, DEFAULT_INIT_VALUE);
    let mut intra_chroma_pred_mode = ContextModel::new();
    intra_chroma_pred_mode.init(qp, DEFAULT_INIT_VALUE);
    let mut merge_flag = ContextModel::new();
    merge_flag.init(qp, DEFAULT_INIT_VALUE);
    let mut merge_idx = ContextModel::new();
    merge_idx.init(qp, DEFAULT_INIT_VALUE);
    let mut mvp_idx = ContextModel::new();
    mvp_idx.init(qp, DEFAULT_INIT_VALUE);
    let mut root_cbf = ContextModel::new();
    root_cbf.init(qp, DEFAULT_INIT_VALUE);
    let mut end_of_slice = ContextModel::new();
    end_of_slice.init(qp, DEFAULT_INIT_VALUE);

    Self {
      split_flag: init_array!(3),
      skip_flag: init_array!(3),
      pred_mode,
      part_size: init_array!(4),
      prev_intra_luma_pred,
      intra_chroma_pred_mode,
      merge_flag,
      merge_idx,
      inter_dir: init_array!(5),
      ref_idx: init_array!(2),
      mvp_idx,
      root_cbf,
      cbf_luma: init_array!(2),
      cbf_chroma: init_array!(5),
      qp_delta: init_array!(2),
      subblock_csbf: init_array!(2),
      coeff_sig: init_array!(44),
      coeff_greater1: [init_array!(MAX_NUM_C1_FLAGS), init_array!(MAX_NUM_C1_FLAGS), init_array!(MAX_NUM_C1_FLAGS), init_array!(MAX_NUM_C1_FLAGS)],
      coeff_greater2: init_array!(NUM_CTX_SETS),
      coeff_last_pos_x: init_array!(18),
      coeff_last_pos_y: init_array!(18),
      split_transform: init_array!(3),
      end_of_slice,
    }
  }

  /// Context index for a subblock's significance map, derived from
  /// `pattern_sig_ctx`, the coefficient's position within its 4x4
  /// subblock, whether the block is a single 4x4 transform (which uses
  /// the fixed `CTX_IDX_MAP_4X4` table instead), and the luma/chroma
  /// split; band/offset constants follow the standard HEVC-family
  /// position-plus-neighbor-csbf scheme, see DEFAULT_INIT_VALUE's note for
  /// the caveat that still applies to the context *contents* (not their
  /// derivation, which is structural rather than a transcribed table).
  pub fn coeff_sig_ctx(
    &mut self,
    log2_size: u32,
    pos_in_block: (usize, usize),
    pos_in_subblock: (usize, usize),
    pattern_sig_ctx: usize,
    is_luma: bool,
  ) -> &mut ContextModel {
    let idx = if log2_size == 2 {
      CTX_IDX_MAP_4X4[(pos_in_block.1 << 2) + pos_in_block.0] as usize
    } else {
      let (px, py) = pos_in_subblock;
      let band = match pattern_sig_ctx {
        0 => {
          if px + py == 0 {
            2
          } else if px + py <= 2 {
            1
          } else {
            0
          }
        }
        1 => {
          if py == 0 {
            2
          } else if py == 1 {
            1
          } else {
            0
          }
        }
        2 => {
          if px == 0 {
            2
          } else if px == 1 {
            1
          } else {
            0
          }
        }
        _ => 2,
      };
      let base_offset = if log2_size == 3 {
        if is_luma {
          9
        } else {
          12
        }
      } else if is_luma {
        21
      } else {
        12
      };
      let corner_bump = if is_luma && (pos_in_block.0 | pos_in_block.1) > 3 { 3 } else { 0 };
      base_offset + corner_bump + band
    };
    &mut self.coeff_sig[idx.min(self.coeff_sig.len() - 1)]
  }

  pub fn coeff_greater1_ctx(&mut self, ctx_set: usize, c1_idx: usize) -> &mut ContextModel {
    &mut self.coeff_greater1[ctx_set][c1_idx.min(MAX_NUM_C1_FLAGS - 1)]
  }

  pub fn coeff_greater2_ctx(&mut self, ctx_set: usize) -> &mut ContextModel {
    &mut self.coeff_greater2[ctx_set]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_initializes_every_context_in_range() {
    let ctxs = CabacContexts::new(32);
    assert!(ctxs.pred_mode.state() < 64);
    for c in &ctxs.coeff_sig {
      assert!(c.state() < 64);
    }
    for set in &ctxs.coeff_greater1 {
      for c in set {
        assert!(c.state() < 64);
      }
    }
  }

  #[test]
  fn coeff_greater1_ctx_clamps_index() {
    let mut ctxs = CabacContexts::new(32);
    let _ = ctxs.coeff_greater1_ctx(0, 100);
  }
}
