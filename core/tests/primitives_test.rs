//! Integration tests for the tensor primitives: output-size formula,
//! convolution, depthwise convolution, pooling, global average pool, add.

use proptest::prelude::*;
use tinyconv_core::*;

// =============================================================================
// Output size
// =============================================================================

#[test]
fn test_output_size_floor_boundary() {
    // 224 with a 3x3/2 unpadded window is 111, not 112
    assert_eq!(conv_output_dim(224, 3, 2, 0), Some(111));
    assert_eq!(conv_output_dim(299, 3, 2, 1), Some(150));
    assert_eq!(conv_output_dim(150, 1, 2, 0), Some(75));
    assert_eq!(conv_output_dim(2, 3, 1, 0), None);
    assert_eq!(conv_output_dim(8, 3, 0, 1), None);
}

#[test]
fn test_pool_output_size() {
    assert_eq!(pool_output_size(111, 111, &Window::square(3, 2, 0)).unwrap(), (55, 55));
    assert_eq!(pool_output_size(19, 19, &Window::square(3, 2, 1)).unwrap(), (10, 10));
    assert!(matches!(
        pool_output_size(4, 4, &Window::square(2, 0, 0)),
        Err(CnnError::InvalidWindow { .. })
    ));
}

#[test]
fn test_pool_window_rejects_padding_as_large_as_kernel() {
    let window = Window::square(1, 1, 1);
    let err = window.pool_output_shape("pool", Shape::new(1, 4, 4)).unwrap_err();
    assert!(matches!(err, CnnError::InvalidWindow { ref stage, .. } if stage == "pool"));
    assert!(pool_output_size(4, 4, &window).is_err());

    let mut out = [0.0f32; 36];
    let err = max_pool(&[0.0; 16], Shape::new(1, 4, 4), &mut out, Shape::new(1, 6, 6), window).unwrap_err();
    assert!(matches!(err, CnnError::InvalidWindow { ref stage, .. } if stage == "max_pool"));

    // the same window is a valid convolution geometry
    assert_eq!(window.output_shape("proj", Shape::new(1, 4, 4), 1).unwrap(), Shape::new(1, 6, 6));
}

// =============================================================================
// Convolution
// =============================================================================

#[test]
fn test_identity_pointwise_convolution_reproduces_input() {
    let shape = Shape::new(3, 2, 2);
    let input: Vec<f32> = (0..12).map(|i| i as f32 - 5.5).collect();
    let mut weights = vec![0.0f32; 9];
    for c in 0..3 {
        weights[c * 3 + c] = 1.0;
    }
    let bias = [0.0f32; 3];
    let mut out = vec![0.0f32; 12];

    convolution(&input, shape, &weights, Some(&bias), &mut out, shape, Window::pointwise(), false).unwrap();
    assert_eq!(out, input);
}

#[test]
fn test_convolution_relu_clamps_negatives() {
    let in_shape = Shape::new(1, 3, 3);
    let out_shape = Shape::new(2, 3, 3);
    let input = [1.0, -2.0, 3.0, -4.0, 5.0, -6.0, 7.0, -8.0, 9.0];
    // filter 0 copies the centre tap, filter 1 negates it
    let mut weights = [0.0f32; 18];
    weights[4] = 1.0;
    weights[9 + 4] = -1.0;
    let mut out = [0.0f32; 18];

    convolution(&input, in_shape, &weights, None, &mut out, out_shape, Window::same(3, 1), false).unwrap();
    assert!(out.iter().any(|&v| v < 0.0));

    convolution(&input, in_shape, &weights, None, &mut out, out_shape, Window::same(3, 1), true).unwrap();
    assert!(out.iter().all(|&v| v >= 0.0));
    assert_eq!(&out[..9], &[1.0, 0.0, 3.0, 0.0, 5.0, 0.0, 7.0, 0.0, 9.0]);
    assert_eq!(&out[9..], &[0.0, 2.0, 0.0, 4.0, 0.0, 6.0, 0.0, 8.0, 0.0]);
}

#[test]
fn test_convolution_stride_and_bias() {
    // 1x4x4 ramp, 2x2 kernel of ones, stride 2, bias 0.5
    let input: Vec<f32> = (0..16).map(|i| i as f32).collect();
    let weights = [1.0f32; 4];
    let bias = [0.5f32];
    let mut out = [0.0f32; 4];
    convolution(
        &input,
        Shape::new(1, 4, 4),
        &weights,
        Some(&bias),
        &mut out,
        Shape::new(1, 2, 2),
        Window::square(2, 2, 0),
        false,
    )
    .unwrap();
    assert_eq!(out, [10.5, 18.5, 42.5, 50.5]);
}

#[test]
fn test_convolution_padding_wider_than_kernel_yields_bias_border() {
    let mut out = [0.0f32; 36];
    convolution(
        &[1.0; 16],
        Shape::new(1, 4, 4),
        &[2.0],
        Some(&[0.5]),
        &mut out,
        Shape::new(1, 6, 6),
        Window::square(1, 1, 1),
        false,
    )
    .unwrap();
    for row in 0..6 {
        for col in 0..6 {
            let border = row == 0 || col == 0 || row == 5 || col == 5;
            let expected = if border { 0.5 } else { 2.5 };
            assert_eq!(out[row * 6 + col], expected, "at ({row}, {col})");
        }
    }
}

#[test]
fn test_depthwise_padding_wider_than_kernel_yields_bias_border() {
    let mut out = [0.0f32; 2 * 4 * 4];
    depthwise_convolution(
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        Shape::new(2, 2, 2),
        &[1.0, -1.0],
        Some(&[0.0, 10.0]),
        &mut out,
        Shape::new(2, 4, 4),
        Window::square(1, 1, 1),
        false,
    )
    .unwrap();
    #[rustfmt::skip]
    let expected = [
        0.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 2.0, 0.0,
        0.0, 3.0, 4.0, 0.0,
        0.0, 0.0, 0.0, 0.0,
        10.0, 10.0, 10.0, 10.0,
        10.0,  5.0,  4.0, 10.0,
        10.0,  3.0,  2.0, 10.0,
        10.0, 10.0, 10.0, 10.0,
    ];
    assert_eq!(out, expected);
}

#[test]
fn test_convolution_rejects_wrong_declared_shape() {
    let input = [0.0f32; 9];
    let weights = [0.0f32; 9];
    let mut out = [0.0f32; 4];
    let err = convolution(
        &input,
        Shape::new(1, 3, 3),
        &weights,
        None,
        &mut out,
        Shape::new(1, 2, 2),
        Window::same(3, 1),
        false,
    )
    .unwrap_err();
    assert_eq!(
        err,
        CnnError::ShapeMismatch {
            stage: "convolution".into(),
            expected: Shape::new(1, 3, 3),
            actual: Shape::new(1, 2, 2),
        }
    );
}

#[test]
fn test_depthwise_does_not_mix_channels() {
    let shape = Shape::new(2, 3, 3);
    let mut input = vec![1.0f32; 9];
    input.extend([2.0f32; 9]);
    // channel 0 sums its window, channel 1 has an all-zero filter
    let mut weights = vec![1.0f32; 9];
    weights.extend([0.0f32; 9]);
    let bias = [0.0f32, 0.25];
    let mut out = vec![0.0f32; 18];

    depthwise_convolution(&input, shape, &weights, Some(&bias), &mut out, shape, Window::same(3, 1), false)
        .unwrap();
    assert_eq!(&out[..9], &[4.0, 6.0, 4.0, 6.0, 9.0, 6.0, 4.0, 6.0, 4.0]);
    assert!(out[9..].iter().all(|&v| v == 0.25));
}

#[test]
fn test_depthwise_rejects_channel_change() {
    let input = [0.0f32; 4];
    let weights = [0.0f32; 1];
    let mut out = [0.0f32; 8];
    let err = depthwise_convolution(
        &input,
        Shape::new(1, 2, 2),
        &weights,
        None,
        &mut out,
        Shape::new(2, 2, 2),
        Window::pointwise(),
        false,
    )
    .unwrap_err();
    assert!(matches!(err, CnnError::ShapeMismatch { .. }));
}

// =============================================================================
// Per-axis stride and padding
// =============================================================================

/// Input at `(c, row, col)` with padded coordinates, or `None` off the map.
fn tap(input: &[f32], shape: Shape, c: usize, row: isize, col: isize) -> Option<f32> {
    if row < 0 || col < 0 || row as usize >= shape.h || col as usize >= shape.w {
        return None;
    }
    Some(input[shape.index(c, row as usize, col as usize)])
}

fn naive_convolution(
    input: &[f32],
    in_shape: Shape,
    weights: &[f32],
    biases: &[f32],
    out_shape: Shape,
    window: Window,
) -> Vec<f32> {
    let mut out = vec![0.0f32; out_shape.total()];
    for oc in 0..out_shape.c {
        for oh in 0..out_shape.h {
            for ow in 0..out_shape.w {
                let mut sum = biases[oc];
                for ic in 0..in_shape.c {
                    for kh in 0..window.kh {
                        for kw in 0..window.kw {
                            let row = (oh * window.stride_h + kh) as isize - window.pad_h as isize;
                            let col = (ow * window.stride_w + kw) as isize - window.pad_w as isize;
                            if let Some(v) = tap(input, in_shape, ic, row, col) {
                                let w = weights[((oc * in_shape.c + ic) * window.kh + kh) * window.kw + kw];
                                sum += v * w;
                            }
                        }
                    }
                }
                out[out_shape.index(oc, oh, ow)] = sum;
            }
        }
    }
    out
}

fn naive_max_pool(input: &[f32], in_shape: Shape, out_shape: Shape, window: Window) -> Vec<f32> {
    let mut out = vec![0.0f32; out_shape.total()];
    for c in 0..out_shape.c {
        for oh in 0..out_shape.h {
            for ow in 0..out_shape.w {
                let mut max_val = f32::NEG_INFINITY;
                for kh in 0..window.kh {
                    for kw in 0..window.kw {
                        let row = (oh * window.stride_h + kh) as isize - window.pad_h as isize;
                        let col = (ow * window.stride_w + kw) as isize - window.pad_w as isize;
                        if let Some(v) = tap(input, in_shape, c, row, col) {
                            max_val = max_val.max(v);
                        }
                    }
                }
                out[out_shape.index(c, oh, ow)] = max_val;
            }
        }
    }
    out
}

fn ramp(len: usize, scale: f32) -> Vec<f32> {
    (0..len).map(|i| ((i * 7 % 13) as f32 - 6.0) * scale).collect()
}

#[test]
fn test_asymmetric_window_matches_naive_reference() {
    // 3x2 kernel, stride 2 down and 1 across, padding only on rows
    let window = Window::new(3, 2, 2, 1, 1, 0);
    let in_shape = Shape::new(2, 7, 5);
    let (oh, ow) = window.output_hw("asym", in_shape.h, in_shape.w).unwrap();
    assert_eq!((oh, ow), (4, 4));
    let input = ramp(in_shape.total(), 0.5);

    // standard convolution, 3 filters
    let out_shape = Shape::new(3, oh, ow);
    let weights = ramp(3 * 2 * 6, 0.25);
    let biases = [0.5f32, -1.0, 0.0];
    let mut out = vec![0.0f32; out_shape.total()];
    convolution(&input, in_shape, &weights, Some(&biases), &mut out, out_shape, window, false).unwrap();
    assert_eq!(out, naive_convolution(&input, in_shape, &weights, &biases, out_shape, window));

    // depthwise: the naive form with one input channel per filter
    let dw_shape = Shape::new(2, oh, ow);
    let dw_weights = ramp(2 * 6, 0.125);
    let dw_biases = [0.25f32, -0.25];
    let mut out = vec![0.0f32; dw_shape.total()];
    depthwise_convolution(&input, in_shape, &dw_weights, Some(&dw_biases), &mut out, dw_shape, window, false)
        .unwrap();
    let plane = in_shape.plane();
    for c in 0..2 {
        let expected = naive_convolution(
            &input[c * plane..(c + 1) * plane],
            in_shape.with_channels(1),
            &dw_weights[c * 6..(c + 1) * 6],
            &dw_biases[c..c + 1],
            dw_shape.with_channels(1),
            window,
        );
        assert_eq!(out[c * oh * ow..(c + 1) * oh * ow], expected[..]);
    }

    let mut out = vec![0.0f32; dw_shape.total()];
    max_pool(&input, in_shape, &mut out, dw_shape, window).unwrap();
    assert_eq!(out, naive_max_pool(&input, in_shape, dw_shape, window));
}

// =============================================================================
// Pooling
// =============================================================================

#[test]
fn test_max_pool_quadrant_maxima() {
    #[rustfmt::skip]
    let input = [
        1.0, 3.0, 2.0, 4.0,
        5.0, 6.0, 7.0, 8.0,
        9.0, 2.0, 3.0, 1.0,
        0.0, 4.0, 8.0, 6.0,
    ];
    let mut out = [0.0f32; 4];
    max_pool(&input, Shape::new(1, 4, 4), &mut out, Shape::new(1, 2, 2), Window::square(2, 2, 0)).unwrap();
    assert_eq!(out, [6.0, 8.0, 9.0, 8.0]);
}

#[test]
fn test_max_pool_padding_is_excluded_not_zero() {
    let input = [-1.0f32, -2.0, -3.0, -4.0];
    let mut out = [0.0f32; 1];
    max_pool(&input, Shape::new(1, 2, 2), &mut out, Shape::new(1, 1, 1), Window::square(3, 2, 1)).unwrap();
    assert_eq!(out, [-1.0]);
}

#[test]
fn test_max_pool_boundary_windows_use_in_bounds_subset() {
    // 1x3x3, 3x3 window, stride 2, pad 1: four windows, each clipped
    let input: Vec<f32> = (1..=9).map(|i| -(i as f32)).collect();
    let mut out = [0.0f32; 4];
    max_pool(&input, Shape::new(1, 3, 3), &mut out, Shape::new(1, 2, 2), Window::square(3, 2, 1)).unwrap();
    // top-left sees {-1,-2,-4,-5}; top-right {-2,-3,-5,-6}; and so on
    assert_eq!(out, [-1.0, -2.0, -4.0, -5.0]);
}

#[test]
fn test_global_average_pool_exact_mean() {
    let input = [1.0f32, 2.0, 3.0, 6.0, -1.0, 0.0, 0.0, 5.0];
    let mut out = [0.0f32; 2];
    global_average_pool(&input, Shape::new(2, 2, 2), &mut out).unwrap();
    assert_eq!(out, [3.0, 1.0]);
}

#[test]
fn test_global_average_pool_rejects_wrong_output_length() {
    let input = [0.0f32; 8];
    let mut out = [0.0f32; 3];
    let err = global_average_pool(&input, Shape::new(2, 2, 2), &mut out).unwrap_err();
    assert_eq!(err, CnnError::InvalidInputLength { expected: 2, actual: 3 });
}

// =============================================================================
// Elementwise
// =============================================================================

#[test]
fn test_add_zero_is_identity() {
    let a = [1.5f32, -2.0, 0.0, 7.25];
    let zero = [0.0f32; 4];
    let mut out = [9.0f32; 4];
    add(&a, &zero, &mut out).unwrap();
    assert_eq!(out, a);
}

#[test]
fn test_add_rejects_unequal_operands() {
    let mut out = [0.0f32; 3];
    assert!(add(&[1.0, 2.0, 3.0], &[1.0, 2.0], &mut out).is_err());
}

#[test]
fn test_relu_in_place_clamps_only_negatives() {
    let mut data = [-3.0f32, -0.0, 0.0, 0.5, -1e-6, 42.0];
    relu_in_place(&mut data);
    assert_eq!(data, [0.0, 0.0, 0.0, 0.5, 0.0, 42.0]);
    assert!(data.iter().all(|&v| v >= 0.0));
}

#[test]
fn test_argmax_first_wins() {
    assert_eq!(argmax(&[0.1, 0.7, 0.7, -1.0]).unwrap(), 1);
    assert!(argmax(&[]).is_err());
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_output_size_formula(input in 1usize..300, kernel in 1usize..8, stride in 1usize..5, pad in 0usize..4) {
        let expected = if input + 2 * pad >= kernel {
            Some((input + 2 * pad - kernel) / stride + 1)
        } else {
            None
        };
        prop_assert_eq!(conv_output_dim(input, kernel, stride, pad), expected);
    }

    #[test]
    fn prop_relu_convolution_is_non_negative(
        input in prop::collection::vec(-10.0f32..10.0, 2 * 5 * 5),
        weights in prop::collection::vec(-1.0f32..1.0, 3 * 2 * 9),
        bias in prop::collection::vec(-1.0f32..1.0, 3)
    ) {
        let in_shape = Shape::new(2, 5, 5);
        let out_shape = Shape::new(3, 3, 3);
        let mut out = vec![0.0f32; out_shape.total()];
        convolution(&input, in_shape, &weights, Some(&bias), &mut out, out_shape, Window::square(3, 2, 1), true)
            .unwrap();
        prop_assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn prop_add_is_commutative(pairs in prop::collection::vec((-1e3f32..1e3, -1e3f32..1e3), 1..64)) {
        let (a, b): (Vec<f32>, Vec<f32>) = pairs.into_iter().unzip();
        let mut ab = vec![0.0f32; a.len()];
        let mut ba = vec![0.0f32; a.len()];
        add(&a, &b, &mut ab).unwrap();
        add(&b, &a, &mut ba).unwrap();
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn prop_max_pool_is_window_maximum(input in prop::collection::vec(-100.0f32..100.0, 6 * 6)) {
        let window = Window::square(3, 2, 1);
        let in_shape = Shape::new(1, 6, 6);
        let out_shape = Shape::new(1, 3, 3);
        let mut out = [0.0f32; 9];
        max_pool(&input, in_shape, &mut out, out_shape, window).unwrap();

        for oh in 0..3 {
            for ow in 0..3 {
                let mut window_max = f32::NEG_INFINITY;
                for kh in 0..3 {
                    for kw in 0..3 {
                        let (ih, iw) = (oh * 2 + kh, ow * 2 + kw);
                        if ih >= 1 && iw >= 1 && ih - 1 < 6 && iw - 1 < 6 {
                            let v = input[in_shape.index(0, ih - 1, iw - 1)];
                            prop_assert!(out[oh * 3 + ow] >= v);
                            window_max = window_max.max(v);
                        }
                    }
                }
                prop_assert_eq!(out[oh * 3 + ow], window_max);
            }
        }
    }
}
