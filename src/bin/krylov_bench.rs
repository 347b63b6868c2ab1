//! Benchmark runner for the Krylov solvers.
//!
//! Runs one solver repeatedly on one test operator and writes a CSV row per repeat with
//! timing, peak RSS, cache counters and a residual. All repeats share a single
//! `KernelCache` and a single operator, so the first row shows the compilations and every
//! later row only cache hits.

use anyhow::{Context, Result, anyhow, ensure};
use clap::{Parser, ValueEnum};
use faer::sparse::{SparseColMat, Triplet};
use serde::Serialize;
use std::path::PathBuf;
use tn_krylov::{
    EigsOptions, GmresOptions, KernelCache, LanczosOptions, LinearOperator, OperatorArgs,
    Tensor, Which, bind, c64, eigs, eigsh_lanczos, gmres,
    utils::{
        matrix_market::load_matrix_market,
        perf::{get_peak_rss_kb, timed},
    },
};

#[derive(ValueEnum, Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum Solver {
    Eigs,
    Lanczos,
    Gmres,
}

#[derive(ValueEnum, Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum Problem {
    /// diag(1, 2, ..., n).
    Diagonal,
    /// The 1D Laplacian tridiag(-1, 2, -1), stored sparse.
    Laplacian,
    /// A square matrix read from `--matrix`.
    MatrixMarket,
}

#[derive(Parser, Debug)]
#[clap(
    name = "krylov-bench",
    about = "Times the Krylov solvers on a test operator with a shared kernel cache."
)]
struct BenchArgs {
    #[clap(long, value_enum)]
    solver: Solver,
    #[clap(long, value_enum, default_value_t = Problem::Laplacian)]
    problem: Problem,
    /// Path to a Matrix Market file, required by `--problem matrix-market`.
    #[clap(long, value_name = "PATH")]
    matrix: Option<PathBuf>,
    /// Problem dimension for the generated operators.
    #[clap(long, default_value_t = 1000)]
    size: usize,
    /// Krylov subspace dimension.
    #[clap(long, default_value_t = 30)]
    krylov_vecs: usize,
    /// Number of eigenpairs for `eigs` and `lanczos`.
    #[clap(long, default_value_t = 1)]
    numeig: usize,
    /// Spectrum selector for `eigs`.
    #[clap(long, value_enum, default_value_t = Which::LargestReal)]
    which: Which,
    /// Restarts for `eigs` and `gmres`.
    #[clap(long, default_value_t = 20)]
    maxiter: usize,
    #[clap(long, default_value_t = 3)]
    repeats: usize,
    #[clap(long, default_value_t = 42)]
    seed: u64,
    /// Output CSV file; rows go to stdout when omitted.
    #[clap(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct BenchRecord {
    solver: Solver,
    problem: Problem,
    n: usize,
    krylov_vecs: usize,
    repeat: usize,
    time_s: f64,
    rss_kb: u64,
    operator_compilations: usize,
    operator_hits: usize,
    routine_compilations: usize,
    routine_hits: usize,
    /// Leading eigenvalue (real part), or the GMRES status.
    leading_value: f64,
    residual: f64,
}

fn laplacian(n: usize) -> Result<SparseColMat<usize, f64>> {
    let mut triplets = Vec::with_capacity(3 * n);
    for i in 0..n {
        triplets.push(Triplet {
            row: i,
            col: i,
            val: 2.0,
        });
        if i + 1 < n {
            triplets.push(Triplet {
                row: i + 1,
                col: i,
                val: -1.0,
            });
            triplets.push(Triplet {
                row: i,
                col: i + 1,
                val: -1.0,
            });
        }
    }
    SparseColMat::try_new_from_triplets(n, n, &triplets)
        .map_err(|e| anyhow!("Failed to assemble the Laplacian: {e:?}"))
}

fn build_operator(args: &BenchArgs) -> Result<(LinearOperator<f64>, usize)> {
    match args.problem {
        Problem::Diagonal => {
            let n = args.size;
            let op = LinearOperator::new(|v: &Tensor<f64>, _: &[Tensor<f64>]| {
                Tensor::from_fn(v.shape(), |i| (i + 1) as f64 * v.data()[i])
            });
            Ok((op, n))
        }
        Problem::Laplacian => {
            let matrix = laplacian(args.size)?;
            Ok((LinearOperator::from_sparse(&matrix), args.size))
        }
        Problem::MatrixMarket => {
            let path = args
                .matrix
                .as_ref()
                .context("`--problem matrix-market` requires `--matrix PATH`")?;
            let mm = load_matrix_market(path)
                .with_context(|| format!("Failed to load Matrix Market file {path:?}"))?;
            ensure!(
                mm.nrows() == mm.ncols(),
                "the operator must be square, got {} x {}",
                mm.nrows(),
                mm.ncols()
            );
            Ok((LinearOperator::from_sparse(&mm.matrix), mm.nrows()))
        }
    }
}

/// `||A v - lambda v||` for a complex Ritz pair of a real operator.
fn complex_residual(
    cache: &mut KernelCache,
    op: &LinearOperator<f64>,
    lambda: c64,
    v: &Tensor<c64>,
) -> Result<f64> {
    let args = OperatorArgs::none();
    let bound = bind(cache, op, &args)?;
    let av_re = bound.apply(&v.map(|z| z.re))?;
    let av_im = bound.apply(&v.map(|z| z.im))?;
    let i = c64::new(0.0, 1.0);
    let av = Tensor::from_fn(v.shape(), |k| {
        c64::new(av_re.data()[k], 0.0) + i * av_im.data()[k]
    });
    Ok(av.sub(&v.scaled(lambda)).norm())
}

fn run_repeat(
    args: &BenchArgs,
    cache: &mut KernelCache,
    op: &LinearOperator<f64>,
    n: usize,
) -> Result<(f64, f64)> {
    let no_args = OperatorArgs::none();
    let start = Tensor::from_fn(&[n], |i| 1.0 + (i % 7) as f64 / 7.0);
    match args.solver {
        Solver::Eigs => {
            let options = EigsOptions {
                num_krylov_vecs: args.krylov_vecs,
                numeig: args.numeig,
                which: args.which,
                maxiter: args.maxiter,
                seed: Some(args.seed),
                ..Default::default()
            };
            let pairs = eigs(cache, op, &no_args, start, &options)?;
            let residual =
                complex_residual(cache, op, pairs.eigenvalues[0], &pairs.eigenvectors[0])?;
            Ok((pairs.eigenvalues[0].re, residual))
        }
        Solver::Lanczos => {
            let options = LanczosOptions {
                num_krylov_vecs: args.krylov_vecs,
                numeig: args.numeig,
                reorthogonalize: args.numeig > 1,
                seed: Some(args.seed),
                ..Default::default()
            };
            let pairs = eigsh_lanczos(cache, op, &no_args, start, &options)?;
            let bound = bind(cache, op, &no_args)?;
            let v = &pairs.eigenvectors[0];
            let residual = bound
                .apply(v)?
                .sub(&v.scaled(pairs.eigenvalues[0]))
                .norm();
            Ok((pairs.eigenvalues[0], residual))
        }
        Solver::Gmres => {
            let b = start.scaled((n as f64).sqrt().recip());
            let options = GmresOptions {
                num_krylov_vectors: Some(args.krylov_vecs.min(n)),
                maxiter: args.maxiter.max(1),
                tol: 1e-8,
                ..Default::default()
            };
            let solution = gmres(cache, op, &b, &no_args, &options)?;
            let bound = bind(cache, op, &no_args)?;
            let residual = b.sub(&bound.apply(&solution.solution)?).norm() / b.norm();
            Ok((solution.status() as f64, residual))
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    let args = BenchArgs::parse();
    log::info!("Starting benchmark with parameters: {:?}", &args);
    ensure!(args.repeats > 0, "--repeats must be positive");

    let (op, n) = build_operator(&args)?;
    let mut cache = KernelCache::new();
    let mut records = Vec::with_capacity(args.repeats);

    for repeat in 0..args.repeats {
        let (outcome, elapsed) = timed(|| run_repeat(&args, &mut cache, &op, n));
        let (leading_value, residual) =
            outcome.with_context(|| format!("{:?} failed on repeat {repeat}", args.solver))?;
        let stats = cache.stats();
        log::info!(
            "repeat {repeat}: {:.3}s, leading value {leading_value:.6e}, residual {residual:.3e}",
            elapsed.as_secs_f64()
        );
        records.push(BenchRecord {
            solver: args.solver,
            problem: args.problem,
            n,
            krylov_vecs: args.krylov_vecs,
            repeat,
            time_s: elapsed.as_secs_f64(),
            rss_kb: get_peak_rss_kb(),
            operator_compilations: stats.operator_compilations,
            operator_hits: stats.operator_hits,
            routine_compilations: stats.routine_compilations,
            routine_hits: stats.routine_hits,
            leading_value,
            residual,
        });
    }

    match &args.output {
        Some(path) => {
            let mut writer = csv::Writer::from_path(path)
                .with_context(|| format!("Failed to create output file: {path:?}"))?;
            for record in &records {
                writer.serialize(record)?;
            }
            writer.flush()?;
            log::info!("Wrote {} rows to {:?}", records.len(), path);
        }
        None => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            for record in &records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}
