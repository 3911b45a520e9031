#![cfg(feature = "cuda")]

use approx::assert_relative_eq;
use ndarray::{Array1, Array2, Array3};
use rand::Rng;
use rfgen_kernels::{
    api,
    features::{ArcCosParams, ArdParams, ConvRbfParams, MaxPoolParams, RbfParams},
    gpu::{GpuContext, KERNEL, MAX_LOCAL_WIDTH},
    sampling::{rng_from_seed, SorfParams},
    Averaging, Pooling,
};

fn assert_close(gpu: &Array2<f64>, cpu: &Array2<f64>) {
    assert_eq!(gpu.dim(), cpu.dim());
    for (a, b) in gpu.iter().zip(cpu.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-9);
    }
}

fn sorf_setup(seed: u8, rows: usize, width: usize, num_freqs: usize) -> (Array3<f64>, SorfParams<f64>) {
    let mut rng = rng_from_seed([seed; 32]);
    let x = Array3::from_shape_simple_fn((rows, 1, width), || rng.gen_range(-1.0..1.0));
    let params = SorfParams::sample(&mut rng, width, num_freqs, 1).unwrap();
    (x, params)
}

#[test]
fn test_context_loads_every_entry_point() {
    let ctx = GpuContext::new(0).unwrap();
    for name in KERNEL.funcs {
        assert!(ctx.has_function(&format!("{name}_float")), "{}", name);
        assert!(ctx.has_function(&format!("{name}_double")), "{}", name);
    }
    assert!(!ctx.has_function("rbf_features_half"));
}

#[test]
fn test_gpu_maxpool_minus_mean_single_window() {
    let ctx = GpuContext::new(0).unwrap();
    let mut rng = rng_from_seed([6; 32]);
    let x = Array3::from_shape_simple_fn((3, 4, 2), || rng.gen_range(-1.0..1.0));
    let sorf = SorfParams::<f64>::sample(&mut rng, 4 * 2, 12, 1).unwrap();
    let seqlengths = Array1::from(vec![4i32, 4, 4]);
    let pool = MaxPoolParams {
        conv_width: 4,
        pooling: Pooling::MaxMinusMean,
    };
    let gpu = ctx
        .maxpool_features(x.view(), seqlengths.view(), sorf.radem.view(), sorf.chi.row(0), &pool)
        .unwrap();
    // one window: the max equals the mean, so every feature is exactly zero
    assert!(gpu.iter().all(|&v| v == 0.0));
}

#[test]
fn test_gpu_rbf_matches_cpu() {
    let ctx = GpuContext::new(0).unwrap();
    let params = RbfParams {
        sigma: 0.9,
        beta: 1.0,
    };
    // one width inside the shared tile and one that needs global scratch
    for width in [64, 2 * MAX_LOCAL_WIDTH] {
        let (x, sorf) = sorf_setup(1, 5, width, width + 3);
        let (gpu, gpu_grad) = ctx
            .rbf_gradient(x.view(), sorf.radem.view(), sorf.chi.row(0), &params)
            .unwrap();
        let (cpu, cpu_grad) =
            api::rbf_gradient(x.view(), sorf.radem.view(), sorf.chi.row(0), &params, 4).unwrap();
        assert_close(&gpu, &cpu);
        for (a, b) in gpu_grad.iter().zip(cpu_grad.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_gpu_arccos_matches_cpu() {
    let ctx = GpuContext::new(0).unwrap();
    let (x, sorf) = sorf_setup(2, 6, 32, 50);
    let params = ArcCosParams {
        beta: 1.0,
        kernel_order: 2,
    };
    let gpu = ctx
        .arccos_features(x.view(), sorf.radem.view(), sorf.chi.row(0), &params)
        .unwrap();
    let cpu = api::arccos_features(x.view(), sorf.radem.view(), sorf.chi.row(0), &params, 2).unwrap();
    assert_close(&gpu, &cpu);
}

#[test]
fn test_gpu_conv_matches_cpu() {
    let ctx = GpuContext::new(0).unwrap();
    let mut rng = rng_from_seed([3; 32]);
    let x = Array3::from_shape_simple_fn((4, 9, 3), || rng.gen_range(-1.0..1.0));
    let sorf = SorfParams::<f64>::sample(&mut rng, 3 * 3, 20, 1).unwrap();
    let seqlengths = Array1::from(vec![9i32, 3, 5, 7]);

    let conv = ConvRbfParams {
        conv_width: 3,
        sigma: 0.5,
        beta: 1.0,
        averaging: Averaging::Sqrt,
    };
    let gpu = ctx
        .conv_rbf_features(x.view(), seqlengths.view(), sorf.radem.view(), sorf.chi.row(0), &conv)
        .unwrap();
    let cpu = api::conv_rbf_features(
        x.view(),
        seqlengths.view(),
        sorf.radem.view(),
        sorf.chi.row(0),
        &conv,
        2,
    )
    .unwrap();
    assert_close(&gpu, &cpu);

    let pool = MaxPoolParams {
        conv_width: 3,
        pooling: Pooling::MaxMinusMean,
    };
    let gpu = ctx
        .maxpool_features(x.view(), seqlengths.view(), sorf.radem.view(), sorf.chi.row(0), &pool)
        .unwrap();
    let cpu = api::maxpool_features(
        x.view(),
        seqlengths.view(),
        sorf.radem.view(),
        sorf.chi.row(0),
        &pool,
        2,
    )
    .unwrap();
    assert_close(&gpu, &cpu);
}

#[test]
fn test_gpu_ard_matches_cpu() {
    let ctx = GpuContext::new(0).unwrap();
    let mut rng = rng_from_seed([4; 32]);
    let x = Array3::from_shape_simple_fn((3, 2, 6), || rng.gen_range(-1.0..1.0));
    let sorf = SorfParams::<f64>::sample(&mut rng, 6, 16, 1).unwrap();
    let weights = api::ard_weights(sorf.radem.view(), sorf.chi.row(0), 6).unwrap();
    let sigma_map = Array1::from(vec![0i32, 0, 1, 1, 2, 2]);
    let sigma_vals = Array1::from(vec![0.5, 0.5, 1.0, 1.0, 2.0, 2.0]);
    let params = ArdParams {
        beta: 1.0,
        num_lengthscales: 3,
    };
    let (gpu, gpu_grad) = ctx
        .ard_gradient(x.view(), weights.view(), sigma_map.view(), sigma_vals.view(), &params)
        .unwrap();
    let (cpu, cpu_grad) = api::ard_gradient(
        x.view(),
        weights.view(),
        sigma_map.view(),
        sigma_vals.view(),
        &params,
        2,
    )
    .unwrap();
    assert_close(&gpu, &cpu);
    for (a, b) in gpu_grad.iter().zip(cpu_grad.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-9);
    }
}
