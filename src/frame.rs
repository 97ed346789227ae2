// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Picture storage: one array2d per plane, at whatever bit depth the
// sequence was configured for.
//
// Grounded on nekotrix-tinyavif's frame.rs (Plane/Frame split, y()/u()/v()
// accessors, 4:2:0 chroma subsampling of luma dimensions) generalized from
// its fixed u8 samples to the bit-depth-parametric u16 samples this
// crate's coefficient and prediction pipeline works in.

use crate::array2d::Array2D;

pub type Sample = u16;

pub struct Plane {
  pub data: Array2D<Sample>,
}

impl Plane {
  pub fn new(width: usize, height: usize, bitdepth: u8) -> Self {
    let neutral = 1u16 << (bitdepth - 1);
    Self { data: Array2D::new_with(height, width, |_, _| neutral) }
  }

  pub fn width(&self) -> usize {
    self.data.cols()
  }

  pub fn height(&self) -> usize {
    self.data.rows()
  }
}

pub struct Frame {
  pub bitdepth: u8,
  planes: [Plane; 3],
}

impl Frame {
  pub fn new(y_width: usize, y_height: usize, bitdepth: u8) -> Self {
    let uv_width = (y_width + 1) / 2;
    let uv_height = (y_height + 1) / 2;
    Self {
      bitdepth,
      planes: [
        Plane::new(y_width, y_height, bitdepth),
        Plane::new(uv_width, uv_height, bitdepth),
        Plane::new(uv_width, uv_height, bitdepth),
      ],
    }
  }

  pub fn plane(&self, idx: usize) -> &Plane {
    &self.planes[idx]
  }

  pub fn plane_mut(&mut self, idx: usize) -> &mut Plane {
    &mut self.planes[idx]
  }

  pub fn y(&self) -> &Plane {
    &self.planes[0]
  }

  pub fn y_mut(&mut self) -> &mut Plane {
    &mut self.planes[0]
  }

  pub fn u(&self) -> &Plane {
    &self.planes[1]
  }

  pub fn u_mut(&mut self) -> &mut Plane {
    &mut self.planes[1]
  }

  pub fn v(&self) -> &Plane {
    &self.planes[2]
  }

  pub fn v_mut(&mut self) -> &mut Plane {
    &mut self.planes[2]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn chroma_planes_are_half_resolution() {
    let frame = Frame::new(64, 48, 10);
    assert_eq!(frame.y().width(), 64);
    assert_eq!(frame.y().height(), 48);
    assert_eq!(frame.u().width(), 32);
    assert_eq!(frame.u().height(), 24);
  }

  #[test]
  fn new_frame_is_filled_with_neutral_gray() {
    let frame = Frame::new(8, 8, 8);
    assert_eq!(frame.y().data[0][0], 128);
    let frame10 = Frame::new(8, 8, 10);
    assert_eq!(frame10.y().data[0][0], 512);
  }
}
