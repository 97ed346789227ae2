// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// An HEVC-family coding core: CABAC entropy coding of coding-tree syntax
// and transform coefficients, and the intra sample prediction pipeline
// (reference gathering, smoothing, Planar/DC/Angular prediction, MPM
// derivation) that syntax decodes into.
//
// Picture-level orchestration (coding-tree recursion, mode decision, rate
// control, bitstream headers) is out of scope; this crate provides the
// building blocks those layers would sit on top of.

#![allow(dead_code)]

pub mod arithmetic_coder;
pub mod array2d;
pub mod cabac_contexts;
pub mod coding_unit;
pub mod context_model;
pub mod error;
pub mod frame;
pub mod intra_prediction;
pub mod restrictions;
pub mod scan;
pub mod syntax_coder;
pub mod util;

pub use error::{CodecError, Result};
