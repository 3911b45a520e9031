use approx::assert_relative_eq;
use ndarray::{array, s, Array1, Array3};
use rand::Rng;
use rfgen_kernels::{
    api,
    features::{ArdParams, RbfParams},
    padded_width,
    sampling::{rng_from_seed, SorfParams},
    ErrorKind,
};

const DIM: usize = 5;

fn setup(seed: u8, rows: usize, nodes: usize, num_freqs: usize) -> (Array3<f64>, SorfParams<f64>) {
    let mut rng = rng_from_seed([seed; 32]);
    let x = Array3::from_shape_simple_fn((rows, nodes, DIM), || rng.gen_range(-1.0..1.0));
    let params = SorfParams::sample(&mut rng, DIM, num_freqs, 1).unwrap();
    (x, params)
}

#[test]
fn test_weights_shape() {
    let (_, sorf) = setup(1, 1, 1, 20);
    let weights = api::ard_weights(sorf.radem.view(), sorf.chi.row(0), DIM).unwrap();
    assert_eq!(weights.dim(), (20, DIM));
    assert_eq!(sorf.width, padded_width(DIM));
}

#[test]
fn test_shared_lengthscale_matches_rbf() {
    let num_freqs = 12;
    let sigma = 0.6;
    let (x, sorf) = setup(2, 4, 1, num_freqs);
    let weights = api::ard_weights(sorf.radem.view(), sorf.chi.row(0), DIM).unwrap();
    let sigma_map = Array1::<i32>::zeros(DIM);
    let sigma_vals = Array1::from_elem(DIM, sigma);
    let params = ArdParams {
        beta: 1.3,
        num_lengthscales: 1,
    };
    let (ard, ard_grad) = api::ard_gradient(
        x.view(),
        weights.view(),
        sigma_map.view(),
        sigma_vals.view(),
        &params,
        2,
    )
    .unwrap();

    let mut padded = Array3::zeros((4, 1, sorf.width));
    padded.slice_mut(s![.., .., ..DIM]).assign(&x);
    let rbf_params = RbfParams {
        sigma,
        beta: params.beta,
    };
    let (rbf, rbf_grad) = api::rbf_gradient(
        padded.view(),
        sorf.radem.view(),
        sorf.chi.row(0),
        &rbf_params,
        2,
    )
    .unwrap();

    assert_eq!(ard.dim(), rbf.dim());
    assert_eq!(ard_grad.dim(), rbf_grad.dim());
    for (a, b) in ard.iter().zip(rbf.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-10);
    }
    for (a, b) in ard_grad.iter().zip(rbf_grad.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-10);
    }
}

#[test]
fn test_group_gradient_matches_finite_difference() {
    let num_freqs = 10;
    let (x, sorf) = setup(3, 3, 2, num_freqs);
    let weights = api::ard_weights(sorf.radem.view(), sorf.chi.row(0), DIM).unwrap();
    let sigma_map = array![0i32, 0, 1, 1, 2];
    let sigma_vals = array![0.5, 0.5, 1.1, 1.1, 0.8];
    let params = ArdParams {
        beta: 1.0,
        num_lengthscales: 3,
    };
    let (_, grad) = api::ard_gradient(
        x.view(),
        weights.view(),
        sigma_map.view(),
        sigma_vals.view(),
        &params,
        1,
    )
    .unwrap();
    assert_eq!(grad.dim(), (3, 2 * num_freqs, 3));

    let h = 1e-5;
    for group in 0..3 {
        let shifted = |delta: f64| {
            let vals = Array1::from_shape_fn(DIM, |m| {
                if sigma_map[m] == group {
                    sigma_vals[m] + delta
                } else {
                    sigma_vals[m]
                }
            });
            api::ard_features(
                x.view(),
                weights.view(),
                sigma_map.view(),
                vals.view(),
                &params,
                1,
            )
            .unwrap()
        };
        let numeric = (shifted(h) - shifted(-h)) / (2.0 * h);
        for ((i, j), &value) in numeric.indexed_iter() {
            assert_relative_eq!(grad[[i, j, group as usize]], value, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_nodes_are_summed() {
    let num_freqs = 8;
    let nodes = 3;
    let (x, sorf) = setup(4, 2, nodes, num_freqs);
    let weights = api::ard_weights(sorf.radem.view(), sorf.chi.row(0), DIM).unwrap();
    let sigma_map = array![0i32, 1, 0, 1, 0];
    let sigma_vals = array![0.9, 1.2, 0.9, 1.2, 0.9];
    let params = ArdParams {
        beta: 1.0,
        num_lengthscales: 2,
    };
    let (out, grad) = api::ard_gradient(
        x.view(),
        weights.view(),
        sigma_map.view(),
        sigma_vals.view(),
        &params,
        2,
    )
    .unwrap();

    // one node per sample
    let flat = x.clone().into_shape((2 * nodes, 1, DIM)).unwrap();
    let (single, single_grad) = api::ard_gradient(
        flat.view(),
        weights.view(),
        sigma_map.view(),
        sigma_vals.view(),
        &params,
        2,
    )
    .unwrap();

    for i in 0..2 {
        let summed = single.slice(s![i * nodes..(i + 1) * nodes, ..]).sum_axis(ndarray::Axis(0));
        for (a, b) in out.row(i).iter().zip(summed.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        let summed_grad = single_grad
            .slice(s![i * nodes..(i + 1) * nodes, .., ..])
            .sum_axis(ndarray::Axis(0));
        let sample_grad = grad.slice(s![i, .., ..]);
        for (a, b) in sample_grad.iter().zip(summed_grad.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_rejects_bad_lengthscales() {
    let (x, sorf) = setup(5, 1, 1, 4);
    let weights = api::ard_weights(sorf.radem.view(), sorf.chi.row(0), DIM).unwrap();
    let params = ArdParams {
        beta: 1.0,
        num_lengthscales: 2,
    };
    let vals = Array1::from_elem(DIM, 1.0);
    let run = |map: Array1<i32>, vals: &Array1<f64>| {
        api::ard_features(x.view(), weights.view(), map.view(), vals.view(), &params, 1)
            .unwrap_err()
            .kind()
    };
    assert_eq!(run(array![0, 1, 2, 0, 0], &vals), ErrorKind::Precondition);
    assert_eq!(run(array![0, -1, 0, 0, 0], &vals), ErrorKind::Precondition);
    assert_eq!(run(array![0, 1, 0, 0], &vals), ErrorKind::Precondition);
    assert_eq!(
        run(array![0, 1, 0, 0, 0], &array![1.0, f64::INFINITY, 1.0, 1.0, 1.0]),
        ErrorKind::Precondition
    );

    let narrow = api::ard_weights(sorf.radem.view(), sorf.chi.row(0), DIM - 1).unwrap();
    let map = Array1::<i32>::zeros(DIM);
    assert!(
        api::ard_features(x.view(), narrow.view(), map.view(), vals.view(), &params, 1).is_err()
    );
}
