use rfgen_kernels::{
    cpu::run_partitioned,
    sampling::{chi, rademacher, rng_from_seed, SorfParams},
    ErrorKind, RfError,
};

#[test]
fn test_every_row_written_once() {
    let rows = 10;
    let row_len = 3;
    for threads in [1, 3, 4, 10, 64] {
        let mut output = vec![-1.0; rows * row_len];
        let mut gradient = vec![-1.0; rows * row_len * 2];
        run_partitioned(
            threads,
            rows,
            &mut output,
            row_len,
            Some(gradient.as_mut_slice()),
            row_len * 2,
            |mut chunk| {
                assert_eq!(chunk.output.len(), chunk.rows.len() * row_len);
                for (offset, row) in chunk.output.chunks_exact_mut(row_len).enumerate() {
                    row.fill((chunk.rows.start + offset) as f64);
                }
                if let Some(grad) = chunk.gradient {
                    for (offset, row) in grad.chunks_exact_mut(row_len * 2).enumerate() {
                        row.fill((chunk.rows.start + offset) as f64);
                    }
                }
                Ok(())
            },
        )
        .unwrap();
        for (i, row) in output.chunks_exact(row_len).enumerate() {
            assert!(row.iter().all(|&v| v == i as f64), "{} threads", threads);
        }
        for (i, row) in gradient.chunks_exact(row_len * 2).enumerate() {
            assert!(row.iter().all(|&v| v == i as f64), "{} threads", threads);
        }
    }
}

#[test]
fn test_worker_error_fails_call() {
    let mut output = vec![0.0; 8];
    let err = run_partitioned(4, 8, &mut output, 1, None, 0, |chunk| {
        if chunk.rows.contains(&5) {
            Err(RfError::Allocation { elements: 5 })
        } else {
            Ok(())
        }
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Allocation);
}

#[test]
fn test_worker_panic_is_reported() {
    let mut output = vec![0.0; 4];
    let err = run_partitioned(2, 4, &mut output, 1, None, 0, |chunk| {
        if chunk.rows.start == 0 {
            panic!("row zero");
        }
        Ok(())
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Launch);
    assert!(matches!(err, RfError::WorkerPanicked(ref message) if message == "row zero"));
}

#[test]
fn test_empty_batch_skips_workers() {
    let mut output: Vec<f64> = Vec::new();
    run_partitioned(4, 0, &mut output, 2, None, 0, |_| -> rfgen_kernels::Result<()> {
        panic!("no rows to process")
    })
    .unwrap();
}

#[test]
fn test_rademacher_entries() {
    let mut rng = rng_from_seed([3; 32]);
    let radem = rademacher(&mut rng, 3, 64);
    assert_eq!(radem.dim(), (3, 1, 64));
    assert!(radem.iter().all(|&v| v == 1 || v == -1));
    assert!(radem.iter().any(|&v| v == 1));
    assert!(radem.iter().any(|&v| v == -1));
}

#[test]
fn test_chi_draws_are_positive() {
    let mut rng = rng_from_seed([4; 32]);
    let values = chi::<f64, _>(&mut rng, 500, 16).unwrap();
    assert!(values.iter().all(|&v| v > 0.0));
    let mean = values.sum() / values.len() as f64;
    // chi with 16 degrees of freedom has mean close to 4
    assert!((mean - 4.0).abs() < 0.3, "mean {}", mean);
}

#[test]
fn test_sorf_params_shapes_and_determinism() {
    let draw = || {
        let mut rng = rng_from_seed([5; 32]);
        SorfParams::<f32>::sample(&mut rng, 20, 70, 2).unwrap()
    };
    let params = draw();
    assert_eq!(params.width, 32);
    assert_eq!(params.radem.dim(), (6, 1, 96));
    assert_eq!(params.chi.dim(), (2, 70));

    let again = draw();
    assert_eq!(params.radem, again.radem);
    assert_eq!(params.chi, again.chi);

    let mut rng = rng_from_seed([5; 32]);
    let err = SorfParams::<f64>::sample(&mut rng, 20, 0, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}
