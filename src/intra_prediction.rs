// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Intra-picture sample prediction: reference gathering, smoothing, and the
// Planar/DC/Angular predictors themselves.
//
// Grounded directly on original_source/xvc_common_lib/intra_prediction.cc:
// kAngleTable_/kInvAngleTable_/kFilterRefThreshold, ComputeReferenceState's
// dispatch between filtered/unfiltered references, ComputeRefSamples'
// partial-neighbor padding, FilterRefSamples' [1,2,1]/4 smoothing,
// PlanarPred/PredIntraDC/AngularPred (including the negative-angle
// projection through kInvAngleTable_ and the horizontal-mode
// transpose-by-copy), and GetPredictorLuma/GetPredictorsChroma's MPM
// derivation.

use crate::array2d::Array2D;
use crate::restrictions::Restrictions;
use crate::util::{clamp, round2};

pub const PLANAR: u8 = 0;
pub const DC: u8 = 1;
pub const HORIZONTAL: u8 = 10;
pub const VERTICAL: u8 = 26;
pub const NUM_INTRA_MODES: u8 = 35;
// Substituted for any chroma MPM candidate that collides with the derived
// luma mode.
pub const VERTICAL_PLUS_8: u8 = VERTICAL + 8;

const ANGLE_TABLE: [i32; 17] = [-32, -26, -21, -17, -13, -9, -5, -2, 0, 2, 5, 9, 13, 17, 21, 26, 32];
const INV_ANGLE_TABLE: [i32; 8] = [4096, 1638, 910, 630, 482, 390, 315, 256];
// Indexed by log2(block width) - 2, i.e. 4x4..64x64.
const FILTER_REF_THRESHOLD: [i32; 5] = [10, 7, 1, 0, 10];

#[derive(Clone, Copy, Debug, Default)]
pub struct Neighbors {
  pub has_left: bool,
  pub has_above: bool,
  pub has_above_left: bool,
  pub has_above_right: bool,
  pub has_below_left: bool,
}

/// Reference samples for one transform block, laid out as two arms sharing
/// a corner: `above[0..width]` plus its `above[width..2*width]` extension
/// (used by negative-angle projection and above-right-leaning angular
/// modes), and symmetrically for `left`.
#[derive(Clone, Debug)]
pub struct RefSamples {
  pub corner: u16,
  pub above: Vec<u16>,
  pub left: Vec<u16>,
}

/// Walks the L-shaped neighbor boundary from the farthest below-left
/// sample to the farthest above-right sample, gathering available
/// reconstructed samples and padding gaps per `Restrictions`.
pub fn compute_ref_samples(
  recon: &Array2D<u16>,
  x: usize,
  y: usize,
  width: usize,
  height: usize,
  bitdepth: u8,
  neighbors: Neighbors,
  restrictions: &Restrictions,
) -> RefSamples {
  let dc_val = 1u16 << (bitdepth - 1);

  if !neighbors.has_left && !neighbors.has_above && !neighbors.has_above_left {
    return RefSamples {
      corner: dc_val,
      above: vec![dc_val; 2 * width],
      left: vec![dc_val; 2 * height],
    };
  }

  // path[0..height)            below-left, farthest-first
  // path[height..2*height)     left, farthest-first (nearest to corner last)
  // path[2*height]             corner
  // path[2*height+1..+1+width) above
  // path[+1+width..+1+2*width) above-right
  let path_len = 2 * height + 1 + 2 * width;
  let mut path: Vec<Option<u16>> = vec![None; path_len];

  for k in 0..height {
    // index k covers row y + (2*height - 1 - k)
    let row = y + (2 * height - 1 - k);
    if k < height && neighbors.has_below_left {
      path[k] = recon.get_px(row, x.wrapping_sub(1));
    }
  }
  for k in 0..height {
    let row = y + (height - 1 - k);
    if neighbors.has_left {
      path[height + k] = recon.get_px(row, x.wrapping_sub(1));
    }
  }
  if neighbors.has_above_left {
    path[2 * height] = recon.get_px(y.wrapping_sub(1), x.wrapping_sub(1));
  }
  for j in 0..width {
    if neighbors.has_above {
      path[2 * height + 1 + j] = recon.get_px(y.wrapping_sub(1), x + j);
    }
  }
  for j in 0..width {
    if neighbors.has_above_right {
      path[2 * height + 1 + width + j] = recon.get_px(y.wrapping_sub(1), x + width + j);
    }
  }

  if restrictions.disable_intra_ref_padding {
    log::trace!("reference-sample padding disabled by restrictions profile, using DC fallback");
    for slot in path.iter_mut() {
      if slot.is_none() {
        *slot = Some(dc_val);
      }
    }
  } else {
    let first_available = path.iter().position(|s| s.is_some());
    if let Some(first) = first_available {
      let fill_value = path[first].unwrap();
      for slot in path[..first].iter_mut() {
        *slot = Some(fill_value);
      }
      let mut last = fill_value;
      for slot in path.iter_mut() {
        match slot {
          Some(v) => last = *v,
          None => *slot = Some(last),
        }
      }
    } else {
      for slot in path.iter_mut() {
        *slot = Some(dc_val);
      }
    }
  }

  let path: Vec<u16> = path.into_iter().map(|s| s.unwrap()).collect();

  let mut left = vec![0u16; 2 * height];
  for k in 0..2 * height {
    left[k] = path[2 * height - 1 - k];
  }
  let corner = path[2 * height];
  let mut above = vec![0u16; 2 * width];
  for j in 0..2 * width {
    above[j] = path[2 * height + 1 + j];
  }

  RefSamples { corner, above, left }
}

trait GetPixel {
  fn get_px(&self, row: usize, col: usize) -> Option<u16>;
}

impl GetPixel for Array2D<u16> {
  fn get_px(&self, row: usize, col: usize) -> Option<u16> {
    if row >= self.rows() || col >= self.cols() {
      return None;
    }
    Some(self[row][col])
  }
}

/// [1, 2, 1] / 4 smoothing of the reference line, applied independently
/// along each arm; both far endpoints are left unfiltered.
pub fn filter_ref_samples(refs: &RefSamples) -> RefSamples {
  let width = refs.above.len() / 2;
  let height = refs.left.len() / 2;
  let mut above = refs.above.clone();
  let mut left = refs.left.clone();

  let corner = round2(refs.above[0] as usize + 2 * refs.corner as usize + refs.left[0] as usize, 2) as u16;

  for x in 0..(2 * width - 1) {
    let prev = if x == 0 { refs.corner } else { refs.above[x - 1] };
    let next = refs.above[x + 1];
    above[x] = round2(prev as usize + 2 * refs.above[x] as usize + next as usize, 2) as u16;
  }
  for y in 0..(2 * height - 1) {
    let prev = if y == 0 { refs.corner } else { refs.left[y - 1] };
    let next = refs.left[y + 1];
    left[y] = round2(prev as usize + 2 * refs.left[y] as usize + next as usize, 2) as u16;
  }

  RefSamples { corner, above, left }
}

fn mode_diff(mode: u8) -> i32 {
  let h = (mode as i32 - HORIZONTAL as i32).abs();
  let v = (mode as i32 - VERTICAL as i32).abs();
  h.min(v)
}

/// Whether this mode/size combination should predict from filtered rather
/// than raw reference samples. Only applies to luma.
pub fn use_filtered_ref(mode: u8, log2_size: u32, is_luma: bool, restrictions: &Restrictions) -> bool {
  if restrictions.disable_intra_ref_sample_filter || !is_luma || mode == DC {
    return false;
  }
  if log2_size < 2 || log2_size > 6 {
    return false;
  }
  let threshold = FILTER_REF_THRESHOLD[(log2_size - 2) as usize];
  mode_diff(mode) > threshold
}

/// Picks the filtered or raw reference set a given mode/size should predict
/// from, honoring `disable_intra_ref_sample_filter`.
pub fn select_ref_samples(mode: u8, log2_size: u32, is_luma: bool, refs: RefSamples, restrictions: &Restrictions) -> RefSamples {
  if use_filtered_ref(mode, log2_size, is_luma, restrictions) {
    filter_ref_samples(&refs)
  } else {
    refs
  }
}

/// Predicts a `width` x `height` block into `out[row][col]`, dispatching to
/// Planar/DC/Angular and applying the DC/vertical/horizontal boundary
/// post-filter when eligible (luma, <=16x16, and not disabled).
pub fn predict(
  mode: u8,
  refs: &RefSamples,
  width: usize,
  height: usize,
  bitdepth: u8,
  is_luma: bool,
  restrictions: &Restrictions,
  out: &mut Array2D<u16>,
) {
  let size_eligible = is_luma && width <= 16 && height <= 16;
  let dc_post_filter = size_eligible && !restrictions.disable_intra_dc_post_filter;
  let angular_post_filter = size_eligible && !restrictions.disable_intra_ver_hor_post_filter;
  match mode {
    PLANAR => planar_pred(refs, width, height, out),
    DC => predict_dc(refs, width, height, dc_post_filter, out),
    HORIZONTAL | VERTICAL => angular_pred(mode, refs, width, height, bitdepth, angular_post_filter, out),
    _ => angular_pred(mode, refs, width, height, bitdepth, false, out),
  }
}

fn planar_pred(refs: &RefSamples, width: usize, height: usize, out: &mut Array2D<u16>) {
  let top_right = refs.above[width];
  let bottom_left = refs.left[height];
  let log2w = crate::util::size_to_log2(width);
  let shift = log2w + 1;
  for y in 0..height {
    for x in 0..width {
      // above[x]/bottom_left carry the vertical distance weights, left[y]/
      // top_right the horizontal ones.
      let vert = (height - 1 - y) as u32 * refs.above[x] as u32 + (y + 1) as u32 * bottom_left as u32;
      let horiz = (width - 1 - x) as u32 * refs.left[y] as u32 + (x + 1) as u32 * top_right as u32;
      out[y][x] = ((vert + horiz + width as u32) >> shift) as u16;
    }
  }
}

fn predict_dc(refs: &RefSamples, width: usize, height: usize, post_filter: bool, out: &mut Array2D<u16>) {
  let mut sum = 0usize;
  for x in 0..width {
    sum += refs.above[x] as usize;
  }
  for y in 0..height {
    sum += refs.left[y] as usize;
  }
  let dc_val = ((sum + (width + height) / 2) / (width + height)) as u16;
  for y in 0..height {
    for x in 0..width {
      out[y][x] = dc_val;
    }
  }
  if !post_filter {
    return;
  }
  out[0][0] = round2(refs.above[0] as usize + refs.left[0] as usize + 2 * dc_val as usize, 2) as u16;
  for x in 1..width {
    out[0][x] = round2(refs.above[x] as usize + 3 * dc_val as usize, 2) as u16;
  }
  for y in 1..height {
    out[y][0] = round2(refs.left[y] as usize + 3 * dc_val as usize, 2) as u16;
  }
}

fn angular_pred(
  mode: u8,
  refs: &RefSamples,
  width: usize,
  height: usize,
  bitdepth: u8,
  post_filter: bool,
  out: &mut Array2D<u16>,
) {
  let is_horizontal = mode < 18;
  // For horizontal modes, predict as if vertical against the transposed
  // block, flipping the above/left arms, then transpose the output back.
  let (above, left, w, h) = if is_horizontal {
    (&refs.left, &refs.above, height, width)
  } else {
    (&refs.above, &refs.left, width, height)
  };

  let angle_offset = if is_horizontal {
    HORIZONTAL as i32 - mode as i32
  } else {
    mode as i32 - VERTICAL as i32
  };
  let angle = ANGLE_TABLE[(8 + angle_offset) as usize];
  let max_val = (1i32 << bitdepth) - 1;

  // ref_line[0] aligns with `above[0]`; negative indices (projected
  // samples) are stored at the front when `angle < 0`.
  let mut ref_line: Vec<i32> = Vec::with_capacity(w + h + 1);
  let projected_len = if angle < 0 { ((-(w as i32) * angle) >> 5) as usize + 1 } else { 0 };
  if angle < 0 {
    let inv_angle = INV_ANGLE_TABLE[(-angle_offset - 1) as usize];
    ref_line.push(0); // placeholder for index 0 == above[0]; filled below
    let mut projected = vec![0i32; projected_len];
    let mut inv_angle_sum = 128i32;
    for n in 0..projected_len {
      inv_angle_sum += inv_angle;
      let idx = (inv_angle_sum >> 8) - 1;
      projected[n] = if idx < 0 {
        refs.corner as i32 // corner used when the projection runs past the left arm
      } else {
        left[idx as usize] as i32
      };
    }
    ref_line.clear();
    for &p in projected.iter().rev() {
      ref_line.push(p);
    }
    for j in 0..w {
      ref_line.push(above[j] as i32);
    }
  } else {
    for j in 0..(2 * w).min(above.len()) {
      ref_line.push(above[j] as i32);
    }
  }
  let base = projected_len;

  let mut raw = Array2D::<u16>::zeroed(h, w);
  let mut angle_sum = 0i32;
  for row in 0..h {
    angle_sum += angle;
    let offset = angle_sum >> 5;
    let weight = angle_sum & 31;
    for x in 0..w {
      let idx = base as i32 + offset + x as i32;
      let s0 = ref_line.get(idx as usize).copied().unwrap_or(0);
      let val = if weight == 0 {
        s0
      } else {
        let s1 = ref_line.get((idx + 1) as usize).copied().unwrap_or(s0);
        ((32 - weight) * s0 + weight * s1 + 16) >> 5
      };
      raw[row][x] = clamp(val, 0, max_val) as u16;
    }
  }

  if post_filter && angle == 0 {
    // Direct-copy (angle 0) rows take the same boundary post-filter DC does.
    let above_left = refs.corner as i32;
    for row in 0..h {
      let side = left[row] as i32;
      let val = raw[row][0] as i32 + ((side - above_left) >> 1);
      raw[row][0] = clamp(val, 0, max_val) as u16;
    }
  }

  if is_horizontal {
    for y in 0..height {
      for x in 0..width {
        out[y][x] = raw[x][y];
      }
    }
  } else {
    for y in 0..height {
      for x in 0..width {
        out[y][x] = raw[y][x];
      }
    }
  }
}

/// Derives the 3-entry most-probable-mode list for luma from the left and
/// above neighbors' intra modes (DC used when a neighbor is absent or
/// inter-coded).
pub fn get_predictor_luma(left: u8, above: u8) -> [u8; 3] {
  if left == above {
    if left > DC {
      [left, ((left as u32 + 29) % 32) as u8 + 2, ((left as u32 + 31) % 32) as u8 + 2]
    } else {
      [PLANAR, DC, VERTICAL]
    }
  } else {
    let third = if left != PLANAR && above != PLANAR {
      PLANAR
    } else if (left as u32 + above as u32) < 2 {
      VERTICAL
    } else {
      DC
    };
    [left, above, third]
  }
}

/// Derives the 5-entry chroma MPM list, substituting any candidate that
/// collides with the already-decided luma mode.
pub fn get_predictors_chroma(luma_mode: u8) -> [u8; 5] {
  let mut candidates = [PLANAR, VERTICAL, HORIZONTAL, DC, luma_mode];
  for c in candidates.iter_mut().take(4) {
    if *c == luma_mode {
      *c = VERTICAL_PLUS_8;
    }
  }
  candidates
}

#[cfg(test)]
mod tests {
  use super::*;

  fn flat_refs(value: u16, width: usize, height: usize) -> RefSamples {
    RefSamples { corner: value, above: vec![value; 2 * width], left: vec![value; 2 * height] }
  }

  #[test]
  fn dc_predicts_the_average_of_refs() {
    let mut above = vec![10u16; 8];
    let mut left = vec![20u16; 8];
    above.resize(8, 10);
    left.resize(8, 20);
    let refs = RefSamples { corner: 15, above, left };
    let mut out = Array2D::<u16>::zeroed(4, 4);
    predict_dc(&refs, 4, 4, false, &mut out);
    assert_eq!(out[0][0], 15);
  }

  #[test]
  fn planar_is_flat_on_a_flat_reference() {
    let refs = flat_refs(100, 4, 4);
    let mut out = Array2D::<u16>::zeroed(4, 4);
    planar_pred(&refs, 4, 4, &mut out);
    for y in 0..4 {
      for x in 0..4 {
        assert_eq!(out[y][x], 100);
      }
    }
  }

  #[test]
  fn planar_weighs_above_by_vertical_distance_and_left_by_horizontal_distance() {
    let refs = RefSamples {
      corner: 0,
      above: vec![10, 20, 30, 40, 50, 60, 70, 80],
      left: vec![1, 2, 3, 4, 5, 6, 7, 8],
    };
    let mut out = Array2D::<u16>::zeroed(4, 4);
    planar_pred(&refs, 4, 4, &mut out);
    // (H-1-y)*above[x] + (y+1)*bottom_left + (W-1-x)*left[y] + (x+1)*top_right + W,
    // at (x=0, y=3): (0*10 + 4*5) + (3*4 + 1*50) + 4 = 20 + 62 + 4 = 86, >>3 = 10.
    assert_eq!(out[3][0], 10);
  }

  #[test]
  fn angular_vertical_mode_copies_above_row() {
    let mut refs = flat_refs(50, 4, 4);
    for (i, v) in refs.above.iter_mut().enumerate() {
      *v = 50 + i as u16;
    }
    let mut out = Array2D::<u16>::zeroed(4, 4);
    angular_pred(VERTICAL, &refs, 4, 4, 8, false, &mut out);
    for x in 0..4 {
      assert_eq!(out[0][x], refs.above[x]);
    }
  }

  #[test]
  fn mpm_luma_matches_equal_directional_neighbors() {
    let mpm = get_predictor_luma(20, 20);
    assert_eq!(mpm[0], 20);
    assert_eq!(mpm.len(), 3);
  }

  #[test]
  fn mpm_luma_uses_planar_dc_vertical_when_neighbors_are_dc() {
    assert_eq!(get_predictor_luma(DC, DC), [PLANAR, DC, VERTICAL]);
  }

  #[test]
  fn chroma_mpm_substitutes_collision_with_vertical_plus_8() {
    let mpm = get_predictors_chroma(VERTICAL);
    assert!(!mpm[..4].contains(&VERTICAL) || mpm[1] == VERTICAL_PLUS_8);
    assert_eq!(mpm[1], VERTICAL_PLUS_8);
  }

  #[test]
  fn ref_padding_disabled_falls_back_to_dc_for_unavailable_neighbors() {
    let _ = env_logger::try_init();
    let recon = Array2D::<u16>::zeroed(16, 16);
    let restrictions = Restrictions { disable_intra_ref_padding: true, ..Restrictions::default() };
    let neighbors = Neighbors { has_above: true, ..Neighbors::default() };
    let refs = compute_ref_samples(&recon, 4, 4, 4, 4, 8, neighbors, &restrictions);
    // has_above_left is false, so the corner slot is unavailable and must
    // fall back to the DC value rather than being propagated.
    assert_eq!(refs.corner, 1u16 << 7);
  }

  #[test]
  fn filter_ref_samples_smooths_interior_samples() {
    let mut refs = flat_refs(100, 4, 4);
    refs.above[1] = 200;
    let filtered = filter_ref_samples(&refs);
    assert_eq!(filtered.above[1], round2(100 + 2 * 200 + 100, 2) as u16);
  }
}
