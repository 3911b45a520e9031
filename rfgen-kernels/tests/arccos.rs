use approx::assert_relative_eq;
use ndarray::{s, Array2, Array3};
use rand::Rng;
use rfgen_kernels::{
    api,
    features::{feature_scale, ArcCosParams, PolyParams},
    sampling::{rng_from_seed, SorfParams},
    ErrorKind,
};

fn setup(seed: u8, width: usize, num_freqs: usize, degree: usize) -> (Array3<f64>, SorfParams<f64>) {
    let mut rng = rng_from_seed([seed; 32]);
    let x = Array3::from_shape_simple_fn((4, 1, width), || rng.gen_range(-1.0..1.0));
    let params = SorfParams::sample(&mut rng, width, num_freqs, degree).unwrap();
    (x, params)
}

fn arccos(x: &Array3<f64>, sorf: &SorfParams<f64>, kernel_order: u32) -> Array2<f64> {
    let params = ArcCosParams {
        beta: 1.0,
        kernel_order,
    };
    api::arccos_features(x.view(), sorf.radem.view(), sorf.chi.row(0), &params, 2).unwrap()
}

fn poly(x: &Array3<f64>, sorf: &SorfParams<f64>, degree: usize) -> Array2<f64> {
    let params = PolyParams { beta: 1.0, degree };
    api::poly_features(x.view(), sorf.radem.view(), sorf.chi.view(), &params, 2).unwrap()
}

#[test]
fn test_arccos_order_one_is_rectified_projection() {
    let (x, sorf) = setup(1, 16, 24, 1);
    let linear = poly(&x, &sorf, 1);
    let rectified = arccos(&x, &sorf, 1);
    assert_eq!(rectified.dim(), (4, 24));
    for (r, l) in rectified.iter().zip(linear.iter()) {
        assert_eq!(*r, l.max(0.0));
    }
}

#[test]
fn test_arccos_order_zero_is_step() {
    let (x, sorf) = setup(2, 16, 16, 1);
    let scale = feature_scale(1.0, 16);
    let linear = poly(&x, &sorf, 1);
    let step = arccos(&x, &sorf, 0);
    for (s, l) in step.iter().zip(linear.iter()) {
        let expected = if *l > 0.0 { scale } else { 0.0 };
        assert_eq!(*s, expected);
    }
}

#[test]
fn test_arccos_order_two_squares() {
    let (x, sorf) = setup(3, 8, 8, 1);
    let scale = feature_scale(1.0, 8);
    let first = arccos(&x, &sorf, 1);
    let second = arccos(&x, &sorf, 2);
    for (a, b) in second.iter().zip(first.iter()) {
        // order 1 holds scale * p, order 2 holds scale * p^2
        assert_relative_eq!(*a, b * b / scale, epsilon = 1e-12);
    }
}

#[test]
fn test_arccos_rejects_order_three() {
    let (x, sorf) = setup(4, 8, 8, 1);
    let params = ArcCosParams {
        beta: 1.0,
        kernel_order: 3,
    };
    let err = api::arccos_features(x.view(), sorf.radem.view(), sorf.chi.row(0), &params, 1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn test_poly_is_product_of_degrees() {
    let (x, sorf) = setup(5, 16, 20, 2);
    assert_eq!(sorf.radem.dim(), (6, 1, 32));
    assert_eq!(sorf.chi.dim(), (2, 20));
    let scale = feature_scale(1.0, 20);
    let product = poly(&x, &sorf, 2);

    let factor = |layers: std::ops::Range<usize>, row: usize| {
        let single = SorfParams {
            width: sorf.width,
            radem: sorf.radem.slice(s![layers, .., ..]).to_owned(),
            chi: sorf.chi.slice(s![row..row + 1, ..]).to_owned(),
        };
        poly(&x, &single, 1)
    };
    let first = factor(0..3, 0);
    let second = factor(3..6, 1);
    for ((p, a), b) in product.iter().zip(first.iter()).zip(second.iter()) {
        assert_relative_eq!(*p, a * b / scale, epsilon = 1e-10, max_relative = 1e-10);
    }
}

#[test]
fn test_poly_rejects_mismatched_chi() {
    let (x, sorf) = setup(6, 8, 8, 2);
    let params = PolyParams {
        beta: 1.0,
        degree: 3,
    };
    let err = api::poly_features(x.view(), sorf.radem.view(), sorf.chi.view(), &params, 1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let zero = PolyParams {
        beta: 1.0,
        degree: 0,
    };
    assert!(api::poly_features(x.view(), sorf.radem.view(), sorf.chi.view(), &zero, 1).is_err());
}
