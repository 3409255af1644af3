use nalgebra::DVector;

/// Preconditioned conjugate gradient for the symmetric positive (semi)
/// definite Newton system `W d = rhs` of spec §4.7/§4.8. `apply_w` computes
/// `W v` without necessarily forming `W` explicitly, so callers can exploit
/// the ℓ1 active-set sparsity the spec calls out; `precond_diag` is the
/// `diag(1/H*)` preconditioner.
///
/// Returns the solution `d` and the number of iterations actually taken.
/// Never fails: if the system is singular or `max_iter` is exhausted, the
/// best iterate found so far is returned and the caller (the Newton loop)
/// is responsible for logging a warning if the residual is still too large.
pub fn pcg<F>(
    apply_w: F,
    rhs: &DVector<f64>,
    precond_diag: &DVector<f64>,
    tol: f64,
    max_iter: usize,
) -> (DVector<f64>, usize)
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let n = rhs.len();
    let mut x = DVector::zeros(n);

    if rhs.norm() <= tol {
        return (x, 0);
    }

    let mut r = rhs.clone();
    let mut z = r.component_mul(precond_diag);
    let mut p = z.clone();
    let mut rz_old = r.dot(&z);

    let mut iters = 0;
    for k in 0..max_iter {
        iters = k + 1;
        let wp = apply_w(&p);
        let denom = p.dot(&wp);
        if !denom.is_finite() || denom.abs() < 1e-300 {
            break;
        }
        let alpha = rz_old / denom;
        x += &p * alpha;
        r -= &wp * alpha;
        if r.norm() <= tol {
            break;
        }
        z = r.component_mul(precond_diag);
        let rz_new = r.dot(&z);
        if !rz_new.is_finite() {
            break;
        }
        let beta = rz_new / rz_old;
        p = &z + &p * beta;
        rz_old = rz_new;
    }

    (x, iters)
}
