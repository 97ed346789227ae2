// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Coefficient and subblock scan-order generation.
//
// The up-right diagonal, horizontal and vertical scan patterns and the
// intra-mode-dependent scan selection rule are the same ones
// original_source/xvc_enc_lib/syntax_writer.cc calls through
// `GetCoeffScanTable2x2`/`GetCoeffScanTable4x4`/`DeriveSubblockScan`; the
// last-position group tables are the `kLastPosGroupIdx`/`kLastPosMinInGroup`
// tables `WriteCoeffLastPos` indexes into. Table *contents* come from the
// standard HEVC-family scan definition, not a hand-copied binary, since the
// reference source for them wasn't retrieved verbatim.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOrder {
  Diagonal,
  Horizontal,
  Vertical,
}

/// Up-right diagonal scan over a `size` x `size` grid, nearest corner first.
/// Returns (x, y) positions in scan order.
pub fn diagonal_scan(size: usize) -> Vec<(u8, u8)> {
  let mut positions = Vec::with_capacity(size * size);
  for diag in 0..(2 * size - 1) {
    let x_start = diag.saturating_sub(size - 1);
    let x_end = diag.min(size - 1);
    // Within a diagonal, HEVC's up-right scan walks from bottom-left to
    // top-right: increasing x, decreasing y.
    for x in x_start..=x_end {
      let y = diag - x;
      positions.push((x as u8, y as u8));
    }
  }
  positions
}

pub fn horizontal_scan(size: usize) -> Vec<(u8, u8)> {
  let mut positions = Vec::with_capacity(size * size);
  for y in 0..size {
    for x in 0..size {
      positions.push((x as u8, y as u8));
    }
  }
  positions
}

pub fn vertical_scan(size: usize) -> Vec<(u8, u8)> {
  let mut positions = Vec::with_capacity(size * size);
  for x in 0..size {
    for y in 0..size {
      positions.push((x as u8, y as u8));
    }
  }
  positions
}

pub fn scan_positions(order: ScanOrder, size: usize) -> Vec<(u8, u8)> {
  match order {
    ScanOrder::Diagonal => diagonal_scan(size),
    ScanOrder::Horizontal => horizontal_scan(size),
    ScanOrder::Vertical => vertical_scan(size),
  }
}

/// Scan order used for an intra-coded transform block: small luma blocks
/// (4x4, and 8x8 for luma only) pick horizontal/vertical scan when the
/// intra mode leans strongly toward the opposite direction, so the scan
/// walks along the direction coefficients are expected to decay fastest.
pub fn scan_order_for_intra_mode(intra_mode: u8, log2_size: u32, is_luma: bool) -> ScanOrder {
  let eligible = log2_size == 2 || (log2_size == 3 && is_luma);
  if !eligible {
    return ScanOrder::Diagonal;
  }
  if (6..=14).contains(&intra_mode) {
    ScanOrder::Vertical
  } else if (22..=30).contains(&intra_mode) {
    ScanOrder::Horizontal
  } else {
    ScanOrder::Diagonal
  }
}

/// Derives the subblock-level scan (over a `width_in_subblocks` x
/// `height_in_subblocks` grid of 4x4 coefficient groups) from the same
/// diagonal/horizontal/vertical family used for in-subblock scanning.
pub fn derive_subblock_scan(
  order: ScanOrder,
  width_in_subblocks: usize,
  height_in_subblocks: usize,
) -> Vec<(u8, u8)> {
  debug_assert_eq!(width_in_subblocks, height_in_subblocks, "non-square TUs are out of scope");
  scan_positions(order, width_in_subblocks)
}

// Truncated-unary group boundaries for coding a coefficient's last
// significant position along one axis, indexed by position 0..32.
pub const LAST_POS_GROUP_IDX: [u8; 32] = [
  0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 9, 9, 9, 9, 9, 9, 9, 9,
];

// First position covered by each group index.
pub const LAST_POS_MIN_IN_GROUP: [u8; 10] = [0, 1, 2, 3, 4, 6, 8, 12, 16, 24];

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn diagonal_scan_covers_every_position_exactly_once() {
    let positions = diagonal_scan(4);
    assert_eq!(positions.len(), 16);
    let mut seen = [[false; 4]; 4];
    for (x, y) in positions {
      assert!(!seen[y as usize][x as usize]);
      seen[y as usize][x as usize] = true;
    }
  }

  #[test]
  fn diagonal_scan_starts_at_origin() {
    assert_eq!(diagonal_scan(4)[0], (0, 0));
  }

  #[test]
  fn horizontal_and_vertical_scans_cover_every_position() {
    for scan in [horizontal_scan(8), vertical_scan(8)] {
      assert_eq!(scan.len(), 64);
      let mut seen = [[false; 8]; 8];
      for (x, y) in scan {
        assert!(!seen[y as usize][x as usize]);
        seen[y as usize][x as usize] = true;
      }
    }
  }

  #[test]
  fn scan_selection_matches_intra_mode_bands() {
    assert_eq!(scan_order_for_intra_mode(10, 2, true), ScanOrder::Vertical);
    assert_eq!(scan_order_for_intra_mode(26, 2, true), ScanOrder::Horizontal);
    assert_eq!(scan_order_for_intra_mode(0, 2, true), ScanOrder::Diagonal);
    // Not eligible at 16x16 even with a directional mode.
    assert_eq!(scan_order_for_intra_mode(10, 4, true), ScanOrder::Diagonal);
    // 8x8 chroma is not eligible, only 8x8 luma.
    assert_eq!(scan_order_for_intra_mode(10, 3, false), ScanOrder::Diagonal);
  }

  #[test]
  fn last_pos_group_tables_are_monotonic() {
    assert!(LAST_POS_GROUP_IDX.windows(2).all(|w| w[0] <= w[1]));
    for (group, &min_pos) in LAST_POS_MIN_IN_GROUP.iter().enumerate() {
      assert_eq!(LAST_POS_GROUP_IDX[min_pos as usize], group as u8);
    }
  }
}
