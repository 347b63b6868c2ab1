//! Integration test suite to verify the mathematical correctness of the Krylov solvers.
//!
//! # Test Methodology
//!
//! Every solver is run on operators whose spectrum or inverse is known in closed form
//! (diagonal and triangular matrices), or can be computed independently with `faer`'s
//! dense decompositions (small seeded random matrices). The Krylov results are compared
//! against that ground truth:
//!
//! 1.  **Eigensolvers:** eigenvalues against the known spectrum, eigenvectors through the
//!     residual `||A v - lambda v||`.
//! 2.  **GMRES:** the true residual `||b - A x||` against the requested threshold.
//! 3.  **Kernel cache:** compilation and hit counters across repeated calls.
//! 4.  **Validation:** every rejected call must fail before the operator is ever applied.

use anyhow::{Result, anyhow, ensure};
use faer::{Mat, Side};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{
    io::Cursor,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tn_krylov::{
    DType, EigsOptions, ErrorCategory, GmresOptions, InitialState, KernelCache, LanczosOptions,
    LinearOperator, OperatorArgs, Tensor, Which, bind, c64, eigs, eigsh_lanczos, gmres,
    algorithms::lanczos::{LanczosConfig, lanczos_tridiagonalize},
    utils::matrix_market::parse_matrix_market,
};

/// Tolerance for eigenvalues that the Krylov space captures exactly or after convergence.
const EIG_TOLERANCE: f64 = 1e-8;

/// Tolerance for eigenvector residuals `||A v - lambda v||`.
const RESIDUAL_TOLERANCE: f64 = 1e-6;

/// A diagonal operator `diag(entries)` acting elementwise, so it works on any shape.
fn diagonal_operator(entries: Vec<f64>) -> LinearOperator<f64> {
    LinearOperator::new(move |v: &Tensor<f64>, _: &[Tensor<f64>]| {
        Tensor::from_fn(v.shape(), |i| entries[i] * v.data()[i])
    })
}

/// An upper triangular matrix with the given diagonal and seeded random couplings above it.
///
/// Its eigenvalues are exactly the diagonal entries, while the operator is far from normal.
fn triangular_operator(diag: &[f64], coupling: f64, seed: u64) -> LinearOperator<f64> {
    let n = diag.len();
    let mut rng = StdRng::seed_from_u64(seed);
    let a = Mat::<f64>::from_fn(n, n, |i, j| {
        let noise: f64 = rng.random();
        if i == j {
            diag[i]
        } else if i < j {
            coupling * (noise - 0.5)
        } else {
            0.0
        }
    });
    LinearOperator::from_dense(a)
}

/// A seeded random Hermitian matrix.
fn random_hermitian(n: usize, seed: u64) -> Mat<c64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let g = Mat::<c64>::from_fn(n, n, |_, _| c64::new(rng.random(), rng.random()));
    Mat::from_fn(n, n, |i, j| (g[(i, j)] + g[(j, i)].conj()) * 0.5)
}

/// An identity operator that counts its applications.
fn counting_identity() -> (LinearOperator<f64>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let op = LinearOperator::new(move |v: &Tensor<f64>, _: &[Tensor<f64>]| {
        counter.fetch_add(1, Ordering::Relaxed);
        v.clone()
    });
    (op, calls)
}

fn real_residual(op: &LinearOperator<f64>, lambda: f64, v: &Tensor<f64>) -> Result<f64> {
    let mut cache = KernelCache::new();
    let args = OperatorArgs::none();
    let bound = bind(&mut cache, op, &args)?;
    Ok(bound.apply(v)?.sub(&v.scaled(lambda)).norm())
}

/// `||A v - lambda v||` for a complex eigenpair of a real operator.
fn complex_residual(op: &LinearOperator<f64>, lambda: c64, v: &Tensor<c64>) -> Result<f64> {
    let mut cache = KernelCache::new();
    let args = OperatorArgs::none();
    let bound = bind(&mut cache, op, &args)?;
    let av_re = bound.apply(&v.map(|z| z.re))?;
    let av_im = bound.apply(&v.map(|z| z.im))?;
    let av = Tensor::from_fn(v.shape(), |k| c64::new(av_re.data()[k], av_im.data()[k]));
    Ok(av.sub(&v.scaled(lambda)).norm())
}

// ---------------------------------------------------------------------------------------
// Lanczos
// ---------------------------------------------------------------------------------------

#[test]
fn test_lanczos_lowest_eigenvalue_without_reorthogonalization() -> Result<()> {
    let n = 100;
    let op = diagonal_operator((1..=n).map(|i| i as f64).collect());
    let mut cache = KernelCache::new();
    let options = LanczosOptions {
        num_krylov_vecs: 60,
        seed: Some(42),
        ..Default::default()
    };
    let pairs = eigsh_lanczos(
        &mut cache,
        &op,
        &OperatorArgs::none(),
        InitialState::random(&[n], DType::Float64),
        &options,
    )?;

    ensure!(pairs.eigenvalues.len() == 1 && pairs.eigenvectors.len() == 1);
    ensure!(
        (pairs.eigenvalues[0] - 1.0).abs() < EIG_TOLERANCE,
        "lowest eigenvalue {} != 1",
        pairs.eigenvalues[0]
    );
    ensure!(pairs.eigenvectors[0].shape() == [n]);
    ensure!((pairs.eigenvectors[0].norm() - 1.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_lanczos_several_eigenpairs_are_ascending() -> Result<()> {
    let n = 50;
    let op = diagonal_operator((1..=n).map(|i| i as f64).collect());
    let mut cache = KernelCache::new();
    let options = LanczosOptions {
        num_krylov_vecs: n,
        numeig: 3,
        reorthogonalize: true,
        seed: Some(7),
        ..Default::default()
    };
    let pairs = eigsh_lanczos(
        &mut cache,
        &op,
        &OperatorArgs::none(),
        InitialState::random(&[n], DType::Float64),
        &options,
    )?;

    ensure!(pairs.eigenvalues.len() == 3);
    for (i, (&lambda, v)) in pairs.eigenvalues.iter().zip(&pairs.eigenvectors).enumerate() {
        let expected = (i + 1) as f64;
        ensure!(
            (lambda - expected).abs() < EIG_TOLERANCE,
            "eigenvalue {i}: {lambda} != {expected}"
        );
        let residual = real_residual(&op, lambda, v)?;
        ensure!(residual < RESIDUAL_TOLERANCE, "residual {residual:.3e}");
    }
    Ok(())
}

#[test]
fn test_lanczos_hermitian_matches_dense_eigensolver() -> Result<()> {
    let n = 20;
    let h = random_hermitian(n, 3);
    let exact = h
        .as_ref()
        .self_adjoint_eigen(Side::Lower)
        .map_err(|e| anyhow!("dense eigensolver failed: {e:?}"))?;
    let op = LinearOperator::from_dense(h);
    let mut cache = KernelCache::new();
    let options = LanczosOptions {
        num_krylov_vecs: n,
        numeig: 2,
        reorthogonalize: true,
        seed: Some(1),
        ..Default::default()
    };
    let pairs = eigsh_lanczos(
        &mut cache,
        &op,
        &OperatorArgs::none(),
        InitialState::random(&[n], DType::Complex128),
        &options,
    )?;

    for i in 0..2 {
        // The self-adjoint decomposition of a complex matrix stores its eigenvalues as c64.
        let expected = exact.S()[i].re;
        ensure!(
            (pairs.eigenvalues[i] - expected).abs() < EIG_TOLERANCE,
            "eigenvalue {i}: {} != {expected}",
            pairs.eigenvalues[i],
        );
    }
    Ok(())
}

#[test]
fn test_lanczos_basis_stays_orthonormal() -> Result<()> {
    let n = 200;
    let op = diagonal_operator((0..n).map(|i| (i as f64 * 0.37).sin() + 2.0).collect());
    let mut cache = KernelCache::new();
    let args = OperatorArgs::none();
    let bound = bind(&mut cache, &op, &args)?;
    let mut rng = StdRng::seed_from_u64(5);
    let b = Tensor::<f64>::random_normal(&[n], &mut rng);
    let config = LanczosConfig {
        delta: 1e-8,
        reorthogonalize: true,
        min_vectors: 1,
    };

    let output = lanczos_tridiagonalize(&bound, &b, 80, &config, &mut rng)?;
    ensure!(output.basis.len() == output.decomposition.steps_taken);
    let error = output.basis.orthonormality_error();
    ensure!(error < 1e-10, "loss of orthogonality {error:.3e}");
    Ok(())
}

#[test]
fn test_lanczos_on_matrix_market_operator() -> Result<()> {
    // The 4 x 4 Laplacian tridiag(-1, 2, -1), lower triangle only.
    let data = "%%MatrixMarket matrix coordinate real symmetric\n\
                4 4 7\n\
                1 1 2\n2 1 -1\n2 2 2\n3 2 -1\n3 3 2\n4 3 -1\n4 4 2\n";
    let mm = parse_matrix_market(Cursor::new(data))?;
    let op = LinearOperator::from_sparse(&mm.matrix);
    let mut cache = KernelCache::new();
    let options = LanczosOptions {
        num_krylov_vecs: 4,
        seed: Some(0),
        ..Default::default()
    };
    let start = Tensor::from_vec(vec![1.0, 0.3, -0.2, 0.7], &[4])?;
    let pairs = eigsh_lanczos(&mut cache, &op, &OperatorArgs::none(), start, &options)?;
    let exact = 2.0 - 2.0 * (std::f64::consts::PI / 5.0).cos();
    ensure!((pairs.eigenvalues[0] - exact).abs() < EIG_TOLERANCE);
    Ok(())
}

// ---------------------------------------------------------------------------------------
// Arnoldi
// ---------------------------------------------------------------------------------------

#[test]
fn test_eigs_largest_real_with_restarts() -> Result<()> {
    let n = 60;
    let mut diag: Vec<f64> = (1..=n).map(|i| i as f64).collect();
    diag[10] = -100.0;
    let op = triangular_operator(&diag, 0.1, 9);
    let mut cache = KernelCache::new();
    let options = EigsOptions {
        num_krylov_vecs: 20,
        numeig: 3,
        which: Which::LargestReal,
        maxiter: 100,
        seed: Some(2),
        ..Default::default()
    };
    let pairs = eigs(
        &mut cache,
        &op,
        &OperatorArgs::none(),
        InitialState::random(&[n], DType::Float64),
        &options,
    )?;

    ensure!(pairs.eigenvalues.len() == 3 && pairs.eigenvectors.len() == 3);
    for (lambda, expected) in pairs.eigenvalues.iter().zip([60.0, 59.0, 58.0]) {
        ensure!(
            (lambda.re - expected).abs() < 1e-6 && lambda.im.abs() < 1e-6,
            "eigenvalue {lambda} != {expected}"
        );
    }
    for (lambda, v) in pairs.eigenvalues.iter().zip(&pairs.eigenvectors) {
        ensure!(v.shape() == [n]);
        ensure!((v.norm() - 1.0).abs() < 1e-10);
        let residual = complex_residual(&op, *lambda, v)?;
        ensure!(residual < 1e-5, "residual {residual:.3e}");
    }
    Ok(())
}

#[test]
fn test_eigs_largest_magnitude() -> Result<()> {
    let n = 60;
    let mut diag: Vec<f64> = (1..=n).map(|i| i as f64).collect();
    diag[10] = -100.0;
    let op = triangular_operator(&diag, 0.1, 9);
    let mut cache = KernelCache::new();
    let options = EigsOptions {
        num_krylov_vecs: 20,
        numeig: 2,
        which: Which::LargestMagnitude,
        maxiter: 100,
        seed: Some(3),
        ..Default::default()
    };
    let pairs = eigs(
        &mut cache,
        &op,
        &OperatorArgs::none(),
        InitialState::random(&[n], DType::Float64),
        &options,
    )?;
    ensure!((pairs.eigenvalues[0].re + 100.0).abs() < 1e-6);
    ensure!((pairs.eigenvalues[1].re - 60.0).abs() < 1e-6);
    Ok(())
}

/// A real block-diagonal matrix with eigenvalues 30, 29 and the conjugate pairs
/// `a +- 20i` for `a = 5.0, 5.5, ..., 14.0`.
fn rotation_blocks() -> Mat<f64> {
    let n = 40;
    Mat::<f64>::from_fn(n, n, |i, j| match (i, j) {
        (0, 0) => 30.0,
        (1, 1) => 29.0,
        (0 | 1, _) | (_, 0 | 1) => 0.0,
        _ if (i - 2) / 2 != (j - 2) / 2 => 0.0,
        _ => {
            let a = 5.0 + 0.5 * ((i - 2) / 2) as f64;
            match ((i - 2) % 2, (j - 2) % 2) {
                (0, 0) | (1, 1) => a,
                (0, 1) => 20.0,
                _ => -20.0,
            }
        }
    })
}

#[test]
fn test_eigs_real_operator_with_complex_unwanted_spectrum() -> Result<()> {
    let a = rotation_blocks();
    let n = a.nrows();
    let dense = a
        .as_ref()
        .eigen()
        .map_err(|e| anyhow!("dense eigensolver failed: {e:?}"))?;
    let spectrum: Vec<c64> = (0..n).map(|i| dense.S()[i]).collect();
    let op = LinearOperator::from_dense(a);

    for which in [Which::LargestReal, Which::LargestMagnitude] {
        let expected: Vec<c64> = which
            .rank(&spectrum)
            .into_iter()
            .take(2)
            .map(|i| spectrum[i])
            .collect();
        let mut cache = KernelCache::new();
        let options = EigsOptions {
            num_krylov_vecs: 10,
            numeig: 2,
            which,
            maxiter: 100,
            seed: Some(8),
            ..Default::default()
        };
        let pairs = eigs(
            &mut cache,
            &op,
            &OperatorArgs::none(),
            InitialState::random(&[n], DType::Float64),
            &options,
        )?;
        for (got, want) in pairs.eigenvalues.iter().zip(&expected) {
            ensure!(
                (got - want).norm() < 1e-6,
                "{which}: eigenvalue {got} != {want}"
            );
        }
        for (lambda, v) in pairs.eigenvalues.iter().zip(&pairs.eigenvectors) {
            let residual = complex_residual(&op, *lambda, v)?;
            ensure!(residual < 1e-5, "{which}: residual {residual:.3e}");
        }
    }
    Ok(())
}

#[test]
fn test_eigs_plain_arnoldi_on_complex_matrix() -> Result<()> {
    // maxiter = 0 with a full-dimensional basis reproduces the dense spectrum.
    let n = 10;
    let mut rng = StdRng::seed_from_u64(17);
    let a = Mat::<c64>::from_fn(n, n, |_, _| c64::new(rng.random(), rng.random()));
    let dense = a
        .as_ref()
        .eigen()
        .map_err(|e| anyhow!("dense eigensolver failed: {e:?}"))?;
    let mut exact: Vec<c64> = (0..n).map(|i| dense.S()[i]).collect();
    exact.sort_by(|x, y| y.re.total_cmp(&x.re));

    let op = LinearOperator::from_dense(a);
    let mut cache = KernelCache::new();
    let options = EigsOptions {
        num_krylov_vecs: n,
        numeig: 4,
        maxiter: 0,
        seed: Some(4),
        ..Default::default()
    };
    let pairs = eigs(
        &mut cache,
        &op,
        &OperatorArgs::none(),
        InitialState::random(&[n], DType::Complex128),
        &options,
    )?;
    ensure!(pairs.restarts == 0);
    for (got, want) in pairs.eigenvalues.iter().zip(&exact) {
        ensure!((got - want).norm() < EIG_TOLERANCE, "{got} != {want}");
    }
    Ok(())
}

#[test]
fn test_eigs_preserves_tensor_shape() -> Result<()> {
    // A(x, H) = H . x with x of shape [3, 4] and H of shape [3, 4, 3, 4].
    let shape = [3, 4];
    let size = 12;
    let h = Tensor::<f64>::from_fn(&[3, 4, 3, 4], |k| {
        let (row, col) = (k % size, k / size);
        if row == col {
            (row + 1) as f64
        } else {
            0.0
        }
    });
    let op = LinearOperator::dense_from_args();
    let args = OperatorArgs::positional(vec![h]);
    let mut cache = KernelCache::new();
    let options = EigsOptions {
        num_krylov_vecs: 8,
        numeig: 2,
        maxiter: 50,
        seed: Some(8),
        ..Default::default()
    };
    let pairs = eigs(
        &mut cache,
        &op,
        &args,
        InitialState::random(&shape, DType::Float64),
        &options,
    )?;
    ensure!(pairs.eigenvectors.len() == 2);
    for v in &pairs.eigenvectors {
        ensure!(v.shape() == shape);
    }
    ensure!((pairs.eigenvalues[0].re - 12.0).abs() < 1e-6);
    Ok(())
}

// ---------------------------------------------------------------------------------------
// GMRES
// ---------------------------------------------------------------------------------------

#[test]
fn test_gmres_identity() -> Result<()> {
    let (op, _) = counting_identity();
    let mut cache = KernelCache::new();
    let b = Tensor::from_vec(vec![1.0, -1.0, 0.5, 2.0], &[2, 2])?;
    let solution = gmres(
        &mut cache,
        &op,
        &b,
        &OperatorArgs::none(),
        &GmresOptions::default(),
    )?;
    ensure!(solution.status() == 0);
    ensure!(solution.solution.shape() == [2, 2]);
    ensure!(solution.solution.sub(&b).norm() < 1e-12);
    Ok(())
}

#[test]
fn test_gmres_full_dimension_is_exact() -> Result<()> {
    let n = 30;
    let mut rng = StdRng::seed_from_u64(21);
    let a = Mat::<f64>::from_fn(n, n, |i, j| {
        let noise: f64 = rng.random();
        noise - 0.5 + if i == j { 4.0 } else { 0.0 }
    });
    let op = LinearOperator::from_dense(a);
    let x_true = Tensor::<f64>::random_normal(&[n], &mut rng);
    let mut cache = KernelCache::new();
    let args = OperatorArgs::none();
    let b = bind(&mut cache, &op, &args)?.apply(&x_true)?;

    let options = GmresOptions {
        tol: 1e-10,
        atol: Some(0.0),
        maxiter: 2,
        ..Default::default()
    };
    let solution = gmres(&mut cache, &op, &b, &args, &options)?;
    ensure!(solution.status() == 0, "status {}", solution.status());
    let error = solution.solution.sub(&x_true).norm() / x_true.norm();
    ensure!(error < 1e-9, "relative error {error:.3e}");
    Ok(())
}

#[test]
fn test_gmres_restarted_convergence() -> Result<()> {
    let n = 200;
    let op = diagonal_operator((0..n).map(|i| 1.0 + 9.0 * i as f64 / (n - 1) as f64).collect());
    let mut rng = StdRng::seed_from_u64(13);
    let b = Tensor::<f64>::random_normal(&[n], &mut rng);
    let mut cache = KernelCache::new();
    let options = GmresOptions {
        tol: 1e-8,
        num_krylov_vectors: Some(20),
        maxiter: 50,
        ..Default::default()
    };
    let solution = gmres(&mut cache, &op, &b, &OperatorArgs::none(), &options)?;
    ensure!(solution.status() == 0, "status {}", solution.status());
    ensure!(solution.restarts >= 1);
    let residual = b.sub(&op_apply(&op, &solution.solution)?).norm();
    ensure!(residual <= 1e-8 * b.norm() * 1.0001, "residual {residual:.3e}");
    Ok(())
}

#[test]
fn test_gmres_reports_unconverged_restarts() -> Result<()> {
    let n = 200;
    let op = diagonal_operator((0..n).map(|i| 1.0 + 9.0 * i as f64 / (n - 1) as f64).collect());
    let b = Tensor::from_fn(&[n], |i| (i % 3) as f64 - 1.0);
    let mut cache = KernelCache::new();
    let options = GmresOptions {
        tol: 1e-14,
        atol: Some(0.0),
        num_krylov_vectors: Some(3),
        maxiter: 2,
        ..Default::default()
    };
    let solution = gmres(&mut cache, &op, &b, &OperatorArgs::none(), &options)?;
    ensure!(solution.status() == 2);
    Ok(())
}

fn op_apply(op: &LinearOperator<f64>, v: &Tensor<f64>) -> Result<Tensor<f64>> {
    let mut cache = KernelCache::new();
    let args = OperatorArgs::none();
    Ok(bind(&mut cache, op, &args)?.apply(v)?)
}

// ---------------------------------------------------------------------------------------
// Kernel cache
// ---------------------------------------------------------------------------------------

#[test]
fn test_cache_hits_on_same_operator_and_misses_on_distinct_one() -> Result<()> {
    let n = 16;
    let op = diagonal_operator((1..=n).map(|i| i as f64).collect());
    let twin = diagonal_operator((1..=n).map(|i| i as f64).collect());
    let mut cache = KernelCache::new();
    let args = OperatorArgs::none();
    let options = LanczosOptions {
        num_krylov_vecs: 8,
        seed: Some(0),
        ..Default::default()
    };
    let start = || InitialState::random(&[n], DType::Float64);

    eigsh_lanczos(&mut cache, &op, &args, start(), &options)?;
    eigsh_lanczos(&mut cache, &op, &args, start(), &options)?;
    let stats = cache.stats();
    ensure!(stats.operator_compilations == 1 && stats.operator_hits == 1);
    ensure!(stats.routine_compilations == 1 && stats.routine_hits == 1);

    // A clone shares the identity.
    eigsh_lanczos(&mut cache, &op.clone(), &args, start(), &options)?;
    ensure!(cache.stats().operator_compilations == 1);

    // An identical closure is a distinct operator; the routine is still shared.
    eigsh_lanczos(&mut cache, &twin, &args, start(), &options)?;
    let stats = cache.stats();
    ensure!(stats.operator_compilations == 2);
    ensure!(stats.routine_compilations == 1);
    ensure!(cache.contains_operator(op.id()) && cache.contains_operator(twin.id()));

    // Each algorithm has its own routine.
    let b = Tensor::from_fn(&[n], |i| i as f64);
    gmres(&mut cache, &op, &b, &args, &GmresOptions::default())?;
    ensure!(cache.routine_count() == 2);
    ensure!(cache.stats().operator_compilations == 2);
    Ok(())
}

// ---------------------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------------------

#[test]
fn test_invalid_arguments_never_reach_the_operator() -> Result<()> {
    let (op, calls) = counting_identity();
    let mut cache = KernelCache::new();
    let args = OperatorArgs::none();
    let keywords = OperatorArgs::none().with_keyword("h", Tensor::zeros(&[1]));
    let start = || InitialState::random(&[6], DType::Float64);

    let eigs_cases = [
        EigsOptions {
            which: Which::SmallestMagnitude,
            num_krylov_vecs: 4,
            numeig: 1,
            ..Default::default()
        },
        EigsOptions {
            num_krylov_vecs: 4,
            numeig: 0,
            ..Default::default()
        },
        EigsOptions {
            num_krylov_vecs: 2,
            numeig: 3,
            ..Default::default()
        },
        EigsOptions {
            num_krylov_vecs: 7,
            numeig: 1,
            ..Default::default()
        },
    ];
    for options in &eigs_cases {
        let err = eigs(&mut cache, &op, &args, start(), options)
            .err()
            .ok_or_else(|| anyhow!("eigs accepted {options:?}"))?;
        ensure!(err.category() == ErrorCategory::InvalidArgument, "{err}");
    }
    let valid_eigs = EigsOptions {
        num_krylov_vecs: 4,
        numeig: 1,
        ..Default::default()
    };
    let err = eigs(&mut cache, &op, &keywords, start(), &valid_eigs)
        .err()
        .ok_or_else(|| anyhow!("eigs accepted keyword arguments"))?;
    ensure!(err.is_unsupported());
    let err = eigs(
        &mut cache,
        &op,
        &args,
        InitialState::random(&[6], DType::Complex128),
        &valid_eigs,
    )
    .err()
    .ok_or_else(|| anyhow!("eigs accepted a complex initial state"))?;
    ensure!(err.is_type_mismatch());

    let lanczos_cases = [
        LanczosOptions {
            numeig: 0,
            ..Default::default()
        },
        LanczosOptions {
            num_krylov_vecs: 2,
            numeig: 3,
            reorthogonalize: true,
            ..Default::default()
        },
        LanczosOptions {
            numeig: 2,
            ..Default::default()
        },
        LanczosOptions {
            delta: -1.0,
            ..Default::default()
        },
    ];
    for options in &lanczos_cases {
        let err = eigsh_lanczos(&mut cache, &op, &args, start(), options)
            .err()
            .ok_or_else(|| anyhow!("eigsh_lanczos accepted {options:?}"))?;
        ensure!(err.is_invalid_argument(), "{err}");
    }
    let err = eigsh_lanczos(&mut cache, &op, &keywords, start(), &Default::default())
        .err()
        .ok_or_else(|| anyhow!("eigsh_lanczos accepted keyword arguments"))?;
    ensure!(err.is_unsupported());

    let b = Tensor::from_vec(vec![1.0; 6], &[6])?;
    let gmres_invalid = [
        GmresOptions {
            x0: Some(Tensor::zeros(&[3, 2])),
            ..Default::default()
        },
        GmresOptions {
            num_krylov_vectors: Some(0),
            ..Default::default()
        },
        GmresOptions {
            num_krylov_vectors: Some(7),
            ..Default::default()
        },
        GmresOptions {
            tol: -1.0,
            ..Default::default()
        },
        GmresOptions {
            atol: Some(-1.0),
            ..Default::default()
        },
        GmresOptions {
            maxiter: 0,
            ..Default::default()
        },
    ];
    for options in &gmres_invalid {
        let err = gmres(&mut cache, &op, &b, &args, options)
            .err()
            .ok_or_else(|| anyhow!("gmres accepted {options:?}"))?;
        ensure!(err.is_invalid_argument(), "{err}");
    }
    let preconditioned = GmresOptions {
        preconditioner: Some(op.clone()),
        ..Default::default()
    };
    ensure!(
        gmres(&mut cache, &op, &b, &args, &preconditioned)
            .err()
            .is_some_and(|e| e.is_unsupported())
    );
    ensure!(
        gmres(&mut cache, &op, &b, &keywords, &GmresOptions::default())
            .err()
            .is_some_and(|e| e.is_unsupported())
    );

    ensure!(calls.load(Ordering::Relaxed) == 0, "operator was applied");
    ensure!(cache.operator_count() == 0 && cache.routine_count() == 0);
    Ok(())
}
