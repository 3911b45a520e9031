use approx::assert_relative_eq;
use ndarray::{array, s, Array1, Array2, Array3};
use rand::Rng;
use rfgen_kernels::{
    api,
    features::{ConvRbfParams, MaxPoolParams, PolyParams, RbfParams},
    sampling::{rng_from_seed, SorfParams},
    Averaging, ErrorKind, Pooling,
};

const SEQ_LEN: usize = 5;
const DIM: usize = 1;
const CONV_WIDTH: usize = 3;
const WIDTH: usize = 4;

fn setup(seed: u8, rows: usize, num_freqs: usize) -> (Array3<f64>, SorfParams<f64>) {
    let mut rng = rng_from_seed([seed; 32]);
    let x = Array3::from_shape_simple_fn((rows, SEQ_LEN, DIM), || rng.gen_range(-1.0..1.0));
    let params = SorfParams::sample(&mut rng, CONV_WIDTH * DIM, num_freqs, 1).unwrap();
    (x, params)
}

/// Window `p` of sample `i`, zero padded to `(1, 1, WIDTH)`.
fn window(x: &Array3<f64>, i: usize, p: usize) -> Array3<f64> {
    let mut padded = Array3::zeros((1, 1, WIDTH));
    for (k, &value) in x.slice(s![i, p..p + CONV_WIDTH, ..]).iter().enumerate() {
        padded[[0, 0, k]] = value;
    }
    padded
}

fn conv_params(averaging: Averaging) -> ConvRbfParams {
    ConvRbfParams {
        conv_width: CONV_WIDTH,
        sigma: 0.7,
        beta: 1.0,
        averaging,
    }
}

#[test]
fn test_maxpool_matches_window_maximum() {
    let num_freqs = 6;
    let (x, sorf) = setup(1, 2, num_freqs);
    assert_eq!(sorf.width, WIDTH);
    let seqlengths = array![5i32, 4];
    let params = MaxPoolParams {
        conv_width: CONV_WIDTH,
        pooling: Pooling::Max,
    };
    let out = api::maxpool_features(
        x.view(),
        seqlengths.view(),
        sorf.radem.view(),
        sorf.chi.row(0),
        &params,
        2,
    )
    .unwrap();
    assert_eq!(out.dim(), (2, num_freqs));

    // degree-1 polynomial features with beta = sqrt(F) are the raw projections
    let linear = PolyParams {
        beta: (num_freqs as f64).sqrt(),
        degree: 1,
    };
    for (i, &seqlen) in seqlengths.iter().enumerate() {
        let windows = seqlen as usize - CONV_WIDTH + 1;
        let mut expected = Array1::<f64>::zeros(num_freqs);
        for p in 0..windows {
            let projected = api::poly_features(
                window(&x, i, p).view(),
                sorf.radem.view(),
                sorf.chi.view(),
                &linear,
                1,
            )
            .unwrap();
            for (e, &v) in expected.iter_mut().zip(projected.iter()) {
                *e = e.max(v);
            }
        }
        for (a, b) in out.row(i).iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_windows_past_seqlen_are_ignored() {
    let (x, sorf) = setup(2, 1, 4);
    let seqlengths = array![3i32];
    let mut altered = x.clone();
    altered.slice_mut(s![0, 3.., ..]).fill(9.0);

    let params = MaxPoolParams {
        conv_width: CONV_WIDTH,
        pooling: Pooling::MaxMinusMean,
    };
    let run = |input: &Array3<f64>| {
        api::maxpool_features(
            input.view(),
            seqlengths.view(),
            sorf.radem.view(),
            sorf.chi.row(0),
            &params,
            1,
        )
        .unwrap()
    };
    let out = run(&x);
    assert_eq!(out, run(&altered));
    // one window: max and mean coincide
    assert!(out.iter().all(|&v| v == 0.0));

    let rbf = |input: &Array3<f64>| {
        api::conv_rbf_features(
            input.view(),
            seqlengths.view(),
            sorf.radem.view(),
            sorf.chi.row(0),
            &conv_params(Averaging::None),
            1,
        )
        .unwrap()
    };
    assert_eq!(rbf(&x), rbf(&altered));
}

#[test]
fn test_single_window_matches_rbf() {
    let (x, sorf) = setup(3, 1, 8);
    let seqlengths = array![CONV_WIDTH as i32];
    let conv = api::conv_rbf_features(
        x.view(),
        seqlengths.view(),
        sorf.radem.view(),
        sorf.chi.row(0),
        &conv_params(Averaging::Full),
        1,
    )
    .unwrap();
    let params = RbfParams {
        sigma: 0.7,
        beta: 1.0,
    };
    let plain = api::rbf_features(
        window(&x, 0, 0).view(),
        sorf.radem.view(),
        sorf.chi.row(0),
        &params,
        1,
    )
    .unwrap();
    for (a, b) in conv.iter().zip(plain.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
fn test_averaging_modes() {
    let (_, sorf) = setup(4, 1, 8);
    // identical rows make every window identical
    let x = Array3::from_elem((1, SEQ_LEN, DIM), 0.4);
    let seqlengths = array![SEQ_LEN as i32];
    let windows = (SEQ_LEN - CONV_WIDTH + 1) as f64;
    let run = |averaging| {
        api::conv_rbf_features(
            x.view(),
            seqlengths.view(),
            sorf.radem.view(),
            sorf.chi.row(0),
            &conv_params(averaging),
            1,
        )
        .unwrap()
    };
    let none = run(Averaging::None);
    let sqrt = run(Averaging::Sqrt);
    let full = run(Averaging::Full);
    for ((n, s), f) in none.iter().zip(sqrt.iter()).zip(full.iter()) {
        assert_relative_eq!(*n, f * windows, epsilon = 1e-12);
        assert_relative_eq!(*s, f * windows.sqrt(), epsilon = 1e-12);
    }
}

#[test]
fn test_conv_gradient_matches_finite_difference() {
    let (x, sorf) = setup(5, 3, 12);
    let seqlengths = array![5i32, 3, 4];
    let base = conv_params(Averaging::Sqrt);
    let (out, grad) = api::conv_rbf_gradient(
        x.view(),
        seqlengths.view(),
        sorf.radem.view(),
        sorf.chi.row(0),
        &base,
        2,
    )
    .unwrap();
    assert_eq!(out.dim(), (3, 24));
    assert_eq!(grad.dim(), (3, 24, 1));

    let h = 1e-5;
    let shifted = |delta: f64| -> Array2<f64> {
        let params = ConvRbfParams {
            sigma: base.sigma + delta,
            ..base
        };
        api::conv_rbf_features(
            x.view(),
            seqlengths.view(),
            sorf.radem.view(),
            sorf.chi.row(0),
            &params,
            2,
        )
        .unwrap()
    };
    let numeric = (shifted(h) - shifted(-h)) / (2.0 * h);
    for ((i, j), &value) in numeric.indexed_iter() {
        assert_relative_eq!(grad[[i, j, 0]], value, epsilon = 1e-6);
    }
}

#[test]
fn test_conv_rejects_bad_seqlengths() {
    let (x, sorf) = setup(6, 2, 4);
    let run = |seqlengths: Array1<i32>| {
        api::conv_rbf_features(
            x.view(),
            seqlengths.view(),
            sorf.radem.view(),
            sorf.chi.row(0),
            &conv_params(Averaging::None),
            1,
        )
        .unwrap_err()
        .kind()
    };
    assert_eq!(run(array![2, 5]), ErrorKind::Precondition);
    assert_eq!(run(array![6, 5]), ErrorKind::Precondition);
    assert_eq!(run(array![5]), ErrorKind::Precondition);

    let wide = ConvRbfParams {
        conv_width: SEQ_LEN + 1,
        ..conv_params(Averaging::None)
    };
    let seqlengths = array![5i32, 5];
    assert!(api::conv_rbf_features(
        x.view(),
        seqlengths.view(),
        sorf.radem.view(),
        sorf.chi.row(0),
        &wide,
        1
    )
    .is_err());
}
