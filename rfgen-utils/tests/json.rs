use serde::{Deserialize, Serialize};
use serde_json::json;
use rfgen_utils::*;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Sample {
    zeta: Vec<f64>,
    alpha: Option<String>,
}

#[test]
fn test_jsonify_sorts_keys() {
    let value = json!({"b": 1, "a": {"d": 2, "c": [ {"y": 1, "x": 2} ]}});
    assert_eq!(
        jsonify(&value).unwrap(),
        r#"{"a":{"c":[{"x":2,"y":1}],"d":2},"b":1}"#
    );
}

#[test]
fn test_compress_obj_roundtrip() {
    let sample = Sample {
        zeta: vec![0.5, -1.25, 3.0],
        alpha: Some("rbf".to_string()),
    };
    let compressed = compress_obj(&sample).unwrap();
    let restored: Sample = decompress_obj(&compressed).unwrap();
    assert_eq!(restored, sample);
}

#[test]
fn test_decompress_rejects_garbage() {
    assert!(decompress_obj::<Sample>(b"not zlib").is_err());
}

#[test]
fn test_load_json_arg_inline() {
    let sample: Sample = load_json_arg(r#"{"zeta": [1.0], "alpha": null}"#).unwrap();
    assert_eq!(
        sample,
        Sample {
            zeta: vec![1.0],
            alpha: None
        }
    );
    assert!(load_json_arg::<Sample>("{not json").is_err());
}

#[test]
fn test_load_json_arg_missing_file() {
    assert!(read_json_arg("/nonexistent/settings.json").is_err());
}

#[test]
fn test_u8s_from_str_is_stable() {
    assert_eq!(u8s_from_str("seed"), u8s_from_str("seed"));
    assert_ne!(u8s_from_str("seed"), u8s_from_str("seed2"));
    assert_eq!(u8s_from_parts(&["a", "b"]), u8s_from_str("a:b"));
    assert_ne!(u8s_from_parts(&["a", "bc"]), u8s_from_parts(&["ab", "c"]));
}
