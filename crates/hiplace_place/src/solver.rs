//! Sparse symmetric systems and the conjugate gradient solvers for them.
//!
//! The wirelength optimizer assembles one [`QpSystem`] per axis, freezes it
//! into a [`CsrMatrix`] and minimizes `0.5 x'Px + q'x` by solving `Px = -q`.

/// Iteration limits of a CG solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CgSettings {
    /// Maximum iterations.
    pub max_iterations: usize,
    /// Relative residual `|b - Ax| / |b|` at which the solve stops.
    pub tolerance: f64,
}

impl Default for CgSettings {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-3,
        }
    }
}

/// What a CG solve achieved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveStats {
    /// Iterations spent.
    pub iterations: usize,
    /// Final relative residual.
    pub residual: f64,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

/// A symmetric system under assembly.
#[derive(Clone, Debug, Default)]
pub struct QpSystem {
    n: usize,
    entries: Vec<(usize, usize, f64)>,
    linear: Vec<f64>,
}

impl QpSystem {
    /// Creates an empty system over `n` variables.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            entries: Vec::new(),
            linear: vec![0.0; n],
        }
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns `true` if the system has no variables.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Adds `w` to `P[i][i]`.
    pub fn add_diagonal(&mut self, i: usize, w: f64) {
        self.entries.push((i, i, w));
    }

    /// Adds `w` to both `P[i][j]` and `P[j][i]`.
    pub fn add_symmetric(&mut self, i: usize, j: usize, w: f64) {
        self.entries.push((i, j, w));
        self.entries.push((j, i, w));
    }

    /// Adds `v` to `q[i]`.
    pub fn add_linear(&mut self, i: usize, v: f64) {
        self.linear[i] += v;
    }

    /// The linear term `q`.
    pub fn linear(&self) -> &[f64] {
        &self.linear
    }

    /// Sums duplicate entries into a compressed matrix.
    pub fn to_csr(&self) -> CsrMatrix {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        let mut row_ptr = vec![0usize; self.n + 1];
        let mut cols = Vec::with_capacity(entries.len());
        let mut vals: Vec<f64> = Vec::with_capacity(entries.len());
        let mut last: Option<(usize, usize)> = None;
        for (i, j, w) in entries {
            if last == Some((i, j)) {
                if let Some(v) = vals.last_mut() {
                    *v += w;
                }
                continue;
            }
            last = Some((i, j));
            cols.push(j);
            vals.push(w);
            row_ptr[i + 1] += 1;
        }
        for i in 0..self.n {
            row_ptr[i + 1] += row_ptr[i];
        }
        CsrMatrix {
            n: self.n,
            row_ptr,
            cols,
            vals,
        }
    }
}

/// A square matrix in compressed sparse row form.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
}

impl CsrMatrix {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns `true` for the empty matrix.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Entry `(i, j)`, zero if absent.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let row = self.row_ptr[i]..self.row_ptr[i + 1];
        self.cols[row.clone()]
            .iter()
            .position(|&c| c == j)
            .map_or(0.0, |k| self.vals[row.start + k])
    }

    /// `out = A x`.
    pub fn multiply(&self, x: &[f64], out: &mut [f64]) {
        for (i, o) in out.iter_mut().enumerate().take(self.n) {
            let mut sum = 0.0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.vals[k] * x[self.cols[k]];
            }
            *o = sum;
        }
    }

    /// Diagonal entries.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.get(i, i)).collect()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn jacobi(a: &CsrMatrix) -> Vec<f64> {
    a.diagonal()
        .into_iter()
        .map(|d| if d.abs() > 1e-12 { 1.0 / d } else { 1.0 })
        .collect()
}

/// Solves `A x = b` with Jacobi-preconditioned CG, starting from `x`.
pub fn conjugate_gradient(a: &CsrMatrix, b: &[f64], x: &mut [f64], settings: CgSettings) -> SolveStats {
    let free = vec![true; a.len()];
    masked_cg(a, b, x, &free, &jacobi(a), settings.max_iterations, settings.tolerance)
}

/// CG restricted to the variables marked in `free`; the others keep their
/// value and act as constants.
fn masked_cg(
    a: &CsrMatrix,
    b: &[f64],
    x: &mut [f64],
    free: &[bool],
    precond: &[f64],
    max_iterations: usize,
    tolerance: f64,
) -> SolveStats {
    let n = a.len();
    let b_norm = norm(b).max(1e-12);
    let mut ax = vec![0.0; n];
    a.multiply(x, &mut ax);
    let mut r: Vec<f64> = (0..n).map(|i| if free[i] { b[i] - ax[i] } else { 0.0 }).collect();
    let mut residual = norm(&r) / b_norm;
    if residual < tolerance {
        return SolveStats {
            iterations: 0,
            residual,
            converged: true,
        };
    }
    let mut z: Vec<f64> = r.iter().zip(precond).map(|(r, m)| r * m).collect();
    let mut p = z.clone();
    let mut rz = dot(&r, &z);
    let mut ap = vec![0.0; n];

    for iteration in 1..=max_iterations {
        a.multiply(&p, &mut ap);
        for i in 0..n {
            if !free[i] {
                ap[i] = 0.0;
            }
        }
        let pap = dot(&p, &ap);
        if pap.abs() < 1e-300 {
            return SolveStats {
                iterations: iteration,
                residual,
                converged: residual < tolerance,
            };
        }
        let alpha = rz / pap;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }
        residual = norm(&r) / b_norm;
        if residual < tolerance {
            return SolveStats {
                iterations: iteration,
                residual,
                converged: true,
            };
        }
        for i in 0..n {
            z[i] = r[i] * precond[i];
        }
        let rz_next = dot(&r, &z);
        let beta = rz_next / rz;
        rz = rz_next;
        for i in 0..n {
            p[i] = if free[i] { z[i] + beta * p[i] } else { 0.0 };
        }
    }
    SolveStats {
        iterations: max_iterations,
        residual,
        converged: false,
    }
}

/// Solves `min 0.5 x'Ax - b'x` subject to `lower <= x <= upper`.
///
/// Alternates between fixing variables pushed against a bound and running
/// CG on the rest; a CG step leaving the box is projected back and the
/// active set recomputed.
pub fn projected_conjugate_gradient(
    a: &CsrMatrix,
    b: &[f64],
    x: &mut [f64],
    lower: &[f64],
    upper: &[f64],
    settings: CgSettings,
) -> SolveStats {
    let n = a.len();
    let precond = jacobi(a);
    for i in 0..n {
        x[i] = x[i].clamp(lower[i], upper[i]);
    }
    let mut spent = 0;
    let mut ax = vec![0.0; n];
    let mut last = SolveStats {
        iterations: 0,
        residual: f64::INFINITY,
        converged: false,
    };
    // Each round fixes at least one more variable or converges.
    for _ in 0..=n {
        a.multiply(x, &mut ax);
        let free: Vec<bool> = (0..n)
            .map(|i| {
                let r = b[i] - ax[i];
                !((x[i] <= lower[i] && r < 0.0) || (x[i] >= upper[i] && r > 0.0))
            })
            .collect();
        let mut trial = x.to_vec();
        let budget = settings.max_iterations.saturating_sub(spent).max(1);
        let stats = masked_cg(a, b, &mut trial, &free, &precond, budget, settings.tolerance);
        spent += stats.iterations;
        let mut clipped = false;
        for i in 0..n {
            let v = trial[i].clamp(lower[i], upper[i]);
            clipped |= v != trial[i];
            x[i] = v;
        }
        last = SolveStats {
            iterations: spent,
            residual: stats.residual,
            converged: stats.converged && !clipped,
        };
        if !clipped || spent >= settings.max_iterations {
            break;
        }
    }
    last
}
