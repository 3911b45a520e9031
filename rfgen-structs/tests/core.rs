use rfgen_kernels::{Averaging, Pooling};
use rfgen_structs::{
    config::{KernelKind, KernelSettings, Precision, DEFAULT_SIGMA},
    core::{InputData, OutputData},
};
use rfgen_utils::{dejsonify, jsonify};

fn settings(json: &str) -> KernelSettings {
    dejsonify::<KernelSettings>(json).unwrap()
}

#[test]
fn test_optional_fields_default() {
    let settings = settings(r#"{"kernel": "rbf", "num_freqs": 16, "seed": "abc", "beta": 1.0}"#);
    assert_eq!(settings.kernel(), &KernelKind::Rbf);
    assert_eq!(settings.sigma(), None);
    assert_eq!(settings.precision_or_default(), Precision::F64);
    assert_eq!(settings.rbf_params().sigma, DEFAULT_SIGMA);
    assert!(!settings.fit_intercept_or_default());

    // None fields are skipped when serializing
    assert_eq!(
        jsonify(&settings).unwrap(),
        r#"{"beta":1.0,"kernel":"rbf","num_freqs":16,"seed":"abc"}"#
    );
}

#[test]
fn test_conv_settings() {
    let settings = settings(
        r#"{"kernel": "conv_rbf", "num_freqs": 8, "seed": "s", "beta": 2.0,
            "conv_width": 5, "averaging": "sqrt", "pooling": "max_minus_mean"}"#,
    );
    assert!(settings.kernel().is_convolution());
    let params = settings.conv_rbf_params();
    assert_eq!(params.conv_width, 5);
    assert_eq!(params.averaging, Averaging::Sqrt);
    assert_eq!(settings.maxpool_params().pooling, Pooling::MaxMinusMean);
}

#[test]
fn test_calc_seed() {
    let a = settings(r#"{"kernel": "rbf", "num_freqs": 16, "seed": "abc", "beta": 1.0}"#);
    let b = settings(r#"{"kernel": "arccos", "num_freqs": 16, "seed": "abc", "beta": 3.0}"#);
    let c = settings(r#"{"kernel": "rbf", "num_freqs": 32, "seed": "abc", "beta": 1.0}"#);
    assert_eq!(a.calc_seed(), b.calc_seed());
    assert_ne!(a.calc_seed(), c.calc_seed());
}

#[test]
fn test_ard_lengthscales() {
    let shared = settings(r#"{"kernel": "ard", "num_freqs": 4, "seed": "s", "beta": 1.0, "sigma": 0.5}"#);
    let (map, vals) = shared.ard_lengthscales(3);
    assert_eq!(map, vec![0, 0, 0]);
    assert_eq!(vals, vec![0.5, 0.5, 0.5]);
    assert_eq!(shared.ard_params(&map).num_lengthscales, 1);

    let grouped = settings(
        r#"{"kernel": "ard", "num_freqs": 4, "seed": "s", "beta": 1.0,
            "sigma_map": [0, 2, 1], "sigma_vals": [1.0, 2.0, 3.0]}"#,
    );
    let (map, vals) = grouped.ard_lengthscales(3);
    assert_eq!(map, vec![0, 2, 1]);
    assert_eq!(vals, vec![1.0, 2.0, 3.0]);
    assert_eq!(grouped.ard_params(&map).num_lengthscales, 3);
}

#[test]
fn test_gradient_families() {
    assert!(KernelKind::Rbf.has_gradient());
    assert!(KernelKind::Ard.has_gradient());
    assert!(!KernelKind::Arccos.has_gradient());
    assert!(!KernelKind::Maxpool.has_gradient());
}

#[test]
fn test_input_shape() {
    let input = dejsonify::<InputData>(r#"{"x": [[[1.0, 2.0]], [[3.0, 4.0]]]}"#).unwrap();
    assert_eq!(input.shape(), Some((2, 1, 2)));
    assert_eq!(input.seqlengths(), None);

    let ragged = dejsonify::<InputData>(r#"{"x": [[[1.0, 2.0]], [[3.0]]]}"#).unwrap();
    assert_eq!(ragged.shape(), None);
}

#[test]
fn test_output_without_gradient() {
    let output = OutputData {
        kernel: KernelKind::Maxpool,
        num_freqs: 2,
        features: vec![vec![0.5, 0.0]],
        gradient: None,
    };
    assert_eq!(
        jsonify(&output).unwrap(),
        r#"{"features":[[0.5,0.0]],"kernel":"maxpool","num_freqs":2}"#
    );
}

#[test]
fn test_fit_intercept_setting() {
    let settings = settings(
        r#"{"kernel": "rbf", "num_freqs": 4, "seed": "s", "beta": 1.0, "fit_intercept": true}"#,
    );
    assert_eq!(settings.fit_intercept(), Some(&true));
    assert!(settings.fit_intercept_or_default());
}
