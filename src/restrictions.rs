// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Immutable bundle of profile/conformance-point toggles threaded by
// reference through the prediction and syntax-coding call trees, rather
// than read from a global. Field names and defaults are grounded on the
// call sites in original_source/xvc_common_lib/intra_prediction.cc
// (`Restrictions::Get().disable_intra_ref_padding`,
// `disable_intra_ref_sample_filter`, ...) and
// original_source/xvc_enc_lib/syntax_writer.cc
// (`disable_transform_cbf`, `disable_transform_subblock_csbf`,
// `disable_transform_sign_hiding`).

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Restrictions {
  /// Disables the propagation of available reference samples into gaps left
  /// by unavailable neighbors; gaps are instead left at the DC fallback
  /// value.
  pub disable_intra_ref_padding: bool,
  /// Disables the [1,2,1]/4 reference-sample smoothing filter entirely.
  pub disable_intra_ref_sample_filter: bool,
  /// Disables the DC predictor's boundary post-filter.
  pub disable_intra_dc_post_filter: bool,
  /// Disables the vertical/horizontal angular predictors' boundary
  /// post-filter.
  pub disable_intra_ver_hor_post_filter: bool,
  /// Forces every coded-block-flag rather than inferring a zero residual.
  pub disable_transform_cbf: bool,
  /// Forces an explicit subblock coded-flag rather than implying one.
  pub disable_transform_subblock_csbf: bool,
  /// Disables implicit sign-hiding on the last nonzero coefficient of a run.
  pub disable_transform_sign_hiding: bool,
  /// Freezes the Exp-Golomb remainder's Rice parameter at its current
  /// value instead of letting it adapt to decoded coefficient levels.
  pub disable_transform_adaptive_exp_golomb: bool,
}

impl Default for Restrictions {
  fn default() -> Self {
    Self {
      disable_intra_ref_padding: false,
      disable_intra_ref_sample_filter: false,
      disable_intra_dc_post_filter: false,
      disable_intra_ver_hor_post_filter: false,
      disable_transform_cbf: false,
      disable_transform_subblock_csbf: false,
      disable_transform_sign_hiding: false,
      disable_transform_adaptive_exp_golomb: false,
    }
  }
}

impl Restrictions {
  pub fn unrestricted() -> Self {
    Self::default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_is_fully_unrestricted() {
    let r = Restrictions::default();
    assert!(!r.disable_intra_ref_padding);
    assert!(!r.disable_intra_ref_sample_filter);
    assert!(!r.disable_intra_dc_post_filter);
    assert!(!r.disable_intra_ver_hor_post_filter);
    assert!(!r.disable_transform_cbf);
    assert!(!r.disable_transform_subblock_csbf);
    assert!(!r.disable_transform_sign_hiding);
    assert!(!r.disable_transform_adaptive_exp_golomb);
  }
}
