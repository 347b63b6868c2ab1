//! This module loads sparse test operators from Matrix Market files.
//!
//! Only the `coordinate` storage scheme with `real`, `integer` or `pattern` values is
//! read, in `general` or `symmetric` form. Symmetric files store the lower triangle and are
//! mirrored on load.

use faer::sparse::{SparseColMat, Triplet};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};
use thiserror::Error;

/// Represents all possible errors that can occur while reading a Matrix Market file.
#[derive(Error, Debug)]
pub enum MatrixMarketError {
    /// Wraps a standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: Failed to parse integer from '{0}'")]
    ParseInt(String),
    #[error("Parse error: Failed to parse float from '{0}'")]
    ParseFloat(String),
    /// The `%%MatrixMarket` banner is missing or malformed.
    #[error("Format error: The '%%MatrixMarket matrix ...' header was not found or was malformed.")]
    HeaderMissing,
    #[error("Format error: unsupported Matrix Market variant '{0}'.")]
    Unsupported(String),
    /// The size line `rows cols nnz` is missing.
    #[error("Format error: Unexpected end of file while reading data.")]
    UnexpectedEof,
    #[error("Format error: entry ({row}, {col}) lies outside a {nrows} x {ncols} matrix.")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },
    #[error("Dimension mismatch: header declares {declared} entries, file has {found}.")]
    EntryCountMismatch { declared: usize, found: usize },
    /// Occurs if the sparse matrix construction fails internally.
    #[error("Internal error: Failed to construct the sparse matrix from triplets.")]
    SparseMatrixConstructionError,
}

/// A sparse matrix read from a Matrix Market file.
pub struct MatrixMarket {
    pub matrix: SparseColMat<usize, f64>,
    /// Whether the file declared symmetric storage.
    pub symmetric: bool,
}

impl MatrixMarket {
    pub fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.matrix.ncols()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Real,
    Pattern,
}

fn parse_usize(token: &str) -> Result<usize, MatrixMarketError> {
    token
        .parse::<usize>()
        .map_err(|_| MatrixMarketError::ParseInt(token.to_string()))
}

fn parse_header(line: &str) -> Result<(Field, bool), MatrixMarketError> {
    let lower = line.to_ascii_lowercase();
    let parts: Vec<&str> = lower.split_whitespace().collect();
    if parts.len() != 5 || parts[0] != "%%matrixmarket" || parts[1] != "matrix" {
        return Err(MatrixMarketError::HeaderMissing);
    }
    if parts[2] != "coordinate" {
        return Err(MatrixMarketError::Unsupported(parts[2].to_string()));
    }
    let field = match parts[3] {
        "real" | "integer" => Field::Real,
        "pattern" => Field::Pattern,
        other => return Err(MatrixMarketError::Unsupported(other.to_string())),
    };
    let symmetric = match parts[4] {
        "general" => false,
        "symmetric" => true,
        other => return Err(MatrixMarketError::Unsupported(other.to_string())),
    };
    Ok((field, symmetric))
}

/// Parses Matrix Market data from any buffered reader.
pub fn parse_matrix_market(reader: impl BufRead) -> Result<MatrixMarket, MatrixMarketError> {
    let mut lines = reader.lines();
    let header = lines.next().ok_or(MatrixMarketError::HeaderMissing)??;
    let (field, symmetric) = parse_header(&header)?;

    // Skip comments up to the size line.
    let size_line = loop {
        let line = lines.next().ok_or(MatrixMarketError::UnexpectedEof)??;
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('%') {
            break line;
        }
    };
    let sizes: Vec<&str> = size_line.split_whitespace().collect();
    if sizes.len() != 3 {
        return Err(MatrixMarketError::UnexpectedEof);
    }
    let (nrows, ncols, declared) = (
        parse_usize(sizes[0])?,
        parse_usize(sizes[1])?,
        parse_usize(sizes[2])?,
    );

    let mut triplets: Vec<Triplet<usize, usize, f64>> =
        Vec::with_capacity(if symmetric { 2 * declared } else { declared });
    let mut found = 0;
    for line in lines {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() || parts[0].starts_with('%') {
            continue;
        }
        if parts.len() < 2 {
            return Err(MatrixMarketError::UnexpectedEof);
        }
        // Indices are 1-based.
        let (row, col) = (parse_usize(parts[0])?, parse_usize(parts[1])?);
        if row == 0 || col == 0 || row > nrows || col > ncols {
            return Err(MatrixMarketError::IndexOutOfBounds {
                row,
                col,
                nrows,
                ncols,
            });
        }
        let val = match field {
            Field::Pattern => 1.0,
            Field::Real => {
                let token = parts.get(2).ok_or(MatrixMarketError::UnexpectedEof)?;
                token
                    .parse::<f64>()
                    .map_err(|_| MatrixMarketError::ParseFloat(token.to_string()))?
            }
        };
        let (row, col) = (row - 1, col - 1);
        triplets.push(Triplet { row, col, val });
        if symmetric && row != col {
            triplets.push(Triplet {
                row: col,
                col: row,
                val,
            });
        }
        found += 1;
    }

    if found != declared {
        return Err(MatrixMarketError::EntryCountMismatch { declared, found });
    }

    let matrix = SparseColMat::try_new_from_triplets(nrows, ncols, &triplets)
        .map_err(|_| MatrixMarketError::SparseMatrixConstructionError)?;
    log::debug!("Loaded {nrows} x {ncols} Matrix Market file with {found} stored entries");
    Ok(MatrixMarket { matrix, symmetric })
}

/// Loads a Matrix Market file from disk.
pub fn load_matrix_market(path: impl AsRef<Path>) -> Result<MatrixMarket, MatrixMarketError> {
    let file = File::open(path)?;
    parse_matrix_market(BufReader::new(file))
}
