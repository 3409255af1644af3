use nalgebra::{DMatrix, DVector};

use crate::cg;
use crate::dual::ScalarDual;
use crate::error::SnsppError;
use crate::history::SsnInfo;
use crate::loss::ScalarLoss;
use crate::params::NewtonParams;
use crate::regularizer::Regularizer;

const EPS_REG: f64 = 1e-4;
const DESCENT_SLACK: f64 = -1e-8;
const MAX_ARMIJO_SHRINKS: usize = 60;

/// `U(xi_S)`, the subproblem objective (spec §4.7). Returns `+inf` rather
/// than propagating a domain error so the Armijo loop can simply reject the
/// step and keep shrinking `beta` (spec §9: "the line search must reject
/// steps that cross the boundary").
fn subproblem_objective(
    loss: &dyn ScalarLoss,
    reg: &dyn Regularizer,
    xi_s: &DVector<f64>,
    samples: &[usize],
    x: &DVector<f64>,
    alpha: f64,
    a_s: &DMatrix<f64>,
    hat_d: &DVector<f64>,
) -> f64 {
    let s = samples.len() as f64;
    let z = x - (a_s.transpose() * xi_s) * (alpha / s) + hat_d;
    let moreau = reg.moreau(&z, alpha);
    let term2 = 0.5 * z.norm_squared() - moreau;

    match loss.fstar_vec(xi_s, samples) {
        Ok(fstar) => fstar.sum() + (s / alpha) * term2,
        Err(_) => f64::INFINITY,
    }
}

/// Applies `(alpha/s) * A_S * (mask .* (A_S^T v))`, the ℓ1-sparse-Jacobian
/// contribution to the Newton matrix-vector product, without ever forming
/// the dense `n x n` Jacobian (spec §4.7/§9).
fn apply_jacobian_term(
    a_s: &DMatrix<f64>,
    mask: &DVector<f64>,
    v: &DVector<f64>,
    alpha: f64,
    s: f64,
) -> DVector<f64> {
    let u = a_s.transpose() * v;
    let masked = u.component_mul(mask);
    (a_s * masked) * (alpha / s)
}

/// Scalar fast-path semismooth Newton solver for the SNSPP subproblem (spec
/// §4.7), used whenever every sample has `m_i = 1`. `hat_d` is the
/// pre-computed variance-reduction / weak-convexity correction vector — the
/// outer driver owns the VR snapshot bookkeeping, this function only
/// consumes the resulting `n`-length additive term.
#[allow(clippy::too_many_arguments)]
pub fn solve(
    loss: &dyn ScalarLoss,
    reg: &dyn Regularizer,
    x: &DVector<f64>,
    xi: &mut ScalarDual,
    alpha: f64,
    samples: &[usize],
    hat_d: &DVector<f64>,
    newton_params: &NewtonParams,
    tol_sub: f64,
) -> Result<(DVector<f64>, SsnInfo), SnsppError> {
    let ds = loss.dataset();
    let a_s = ds.stack_rows(samples);
    let s = samples.len();
    let s_f = s as f64;

    let mut xi_s = xi.gather(samples);
    let mut info = SsnInfo::default();
    let mut converged = false;

    for _ in 0..newton_params.max_iter {
        let z = x - (a_s.transpose() * &xi_s) * (alpha / s_f) + hat_d;
        let gstar = loss.gstar_vec(&xi_s, samples)?;
        let r = &gstar - &(&a_s * reg.prox(&z, alpha));
        let residual_norm = r.norm();
        info.residuals.push(residual_norm);

        if residual_norm <= tol_sub {
            converged = true;
            break;
        }

        let mask = reg.jacobian_prox_diag(&z, alpha);
        let hstar = loss.hstar_vec(&xi_s, samples)?;
        let precond_diag = hstar.map(|h| 1.0 / h);

        let rhs = -&r;
        let apply_w = |v: &DVector<f64>| -> DVector<f64> {
            let mut out = v.component_mul(&hstar);
            out += v * EPS_REG;
            out += apply_jacobian_term(&a_s, &mask, v, alpha, s_f);
            out
        };

        let cg_tol = newton_params
            .eta
            .min(residual_norm.powf(1.0 + newton_params.tau));
        let (d, _iters) = cg::pcg(apply_w, &rhs, &precond_diag, cg_tol, newton_params.cg_max_iter);
        info.direction_norms.push(d.norm());

        let descent = d.dot(&rhs);
        if descent <= DESCENT_SLACK {
            log::warn!("semismooth Newton direction failed the strict-descent test: d.rhs = {descent:.3e}");
        }

        let u_old = subproblem_objective(loss, reg, &xi_s, samples, x, alpha, &a_s, hat_d);
        let mut beta = 1.0;
        let mut shrinks = 0;
        let mut u_new = subproblem_objective(
            loss,
            reg,
            &(&xi_s + &d * beta),
            samples,
            x,
            alpha,
            &a_s,
            hat_d,
        );
        while u_new > u_old + newton_params.mu * beta * descent && shrinks < MAX_ARMIJO_SHRINKS {
            beta *= newton_params.rho;
            shrinks += 1;
            u_new = subproblem_objective(
                loss,
                reg,
                &(&xi_s + &d * beta),
                samples,
                x,
                alpha,
                &a_s,
                hat_d,
            );
        }
        info.step_sizes.push(beta);
        info.objective_trace.push(u_new);
        info.evaluations += (2.0 + (beta.ln() / newton_params.rho.ln())) as usize * s;

        xi_s += &d * beta;
    }

    if !converged {
        log::warn!(
            "semismooth Newton reached max_iter ({}) with residual {:?}",
            newton_params.max_iter,
            info.residuals.last()
        );
    }

    let z_final = x - (a_s.transpose() * &xi_s) * (alpha / s_f) + hat_d;
    let x_next = reg.prox(&z_final, alpha);
    xi.scatter(samples, &xi_s);

    Ok((x_next, info))
}
