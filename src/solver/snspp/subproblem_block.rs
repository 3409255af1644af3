use nalgebra::{DMatrix, DVector};

use crate::cg;
use crate::dataset::Dataset;
use crate::dual::{BlockDual, DualContainer};
use crate::error::SnsppError;
use crate::history::SsnInfo;
use crate::loss::Loss;
use crate::params::NewtonParams;
use crate::regularizer::Regularizer;

const EPS_REG: f64 = 1e-4;
const DESCENT_SLACK: f64 = -1e-8;
const MAX_ARMIJO_SHRINKS: usize = 60;

/// `(start, len)` of each sample's block within the stacked dual vector,
/// in the ascending-sample-index order spec §4.8 mandates.
pub(super) fn block_offsets(ds: &Dataset, samples: &[usize]) -> Vec<(usize, usize)> {
    let mut offsets = Vec::with_capacity(samples.len());
    let mut acc = 0;
    for &i in samples {
        let mi = ds.block_size(i);
        offsets.push((acc, mi));
        acc += mi;
    }
    offsets
}

fn gather_stack(xi: &BlockDual, samples: &[usize]) -> DVector<f64> {
    let mut values = Vec::new();
    for &i in samples {
        values.extend_from_slice(xi.block(i));
    }
    DVector::from_vec(values)
}

fn scatter_stack(xi: &mut BlockDual, samples: &[usize], offsets: &[(usize, usize)], stacked: &DVector<f64>) {
    for (&i, &(start, len)) in samples.iter().zip(offsets) {
        xi.set_block(i, &stacked.as_slice()[start..start + len]);
    }
}

fn subproblem_objective(
    loss: &dyn Loss,
    reg: &dyn Regularizer,
    xi_stack: &DVector<f64>,
    samples: &[usize],
    offsets: &[(usize, usize)],
    x: &DVector<f64>,
    alpha: f64,
    a_s: &DMatrix<f64>,
    hat_d: &DVector<f64>,
) -> f64 {
    let s = samples.len() as f64;
    let z = x - (a_s.transpose() * xi_stack) * (alpha / s) + hat_d;
    let moreau = reg.moreau(&z, alpha);
    let term2 = 0.5 * z.norm_squared() - moreau;

    let mut fstar_sum = 0.0;
    for (&i, &(start, len)) in samples.iter().zip(offsets) {
        match loss.fstar(&xi_stack.as_slice()[start..start + len], i) {
            Ok(v) => fstar_sum += v,
            Err(_) => return f64::INFINITY,
        }
    }
    fstar_sum + (s / alpha) * term2
}

fn apply_jacobian_term(a_s: &DMatrix<f64>, mask: &DVector<f64>, v: &DVector<f64>, alpha: f64, s: f64) -> DVector<f64> {
    let u = a_s.transpose() * v;
    let masked = u.component_mul(mask);
    (a_s * masked) * (alpha / s)
}

/// Block-diagonal `H*` applied to a stacked vector: each sample `i`
/// contributes its own `m_i x m_i` block (spec §4.8).
fn apply_hstar_block(
    loss: &dyn Loss,
    xi_stack: &DVector<f64>,
    samples: &[usize],
    offsets: &[(usize, usize)],
    v: &DVector<f64>,
) -> Result<DVector<f64>, SnsppError> {
    let mut out = DVector::zeros(v.len());
    for (&i, &(start, len)) in samples.iter().zip(offsets) {
        let xi_i = &xi_stack.as_slice()[start..start + len];
        let h = loss.hstar(xi_i, i)?;
        let v_i = v.rows(start, len).into_owned();
        let out_i = h * v_i;
        out.rows_mut(start, len).copy_from(&out_i);
    }
    Ok(out)
}

/// General block-case semismooth Newton solver for the SNSPP subproblem
/// (spec §4.8): the same structure as the scalar fast path, generalized to a
/// block-diagonal `H*` and a dual stacked over variable-length per-sample
/// blocks.
#[allow(clippy::too_many_arguments)]
pub fn solve(
    loss: &dyn Loss,
    reg: &dyn Regularizer,
    x: &DVector<f64>,
    xi: &mut BlockDual,
    alpha: f64,
    samples: &[usize],
    hat_d: &DVector<f64>,
    newton_params: &NewtonParams,
    tol_sub: f64,
) -> Result<(DVector<f64>, SsnInfo), SnsppError> {
    let ds = loss.dataset();
    let mut samples_sorted = samples.to_vec();
    samples_sorted.sort_unstable();
    let samples = samples_sorted.as_slice();

    let a_s = ds.stack_rows(samples);
    let offsets = block_offsets(ds, samples);
    let m_total: usize = offsets.iter().map(|&(_, len)| len).sum();
    let s_f = samples.len() as f64;

    let mut xi_stack = gather_stack(xi, samples);
    let mut info = SsnInfo::default();
    let mut converged = false;

    for _ in 0..newton_params.max_iter {
        let z = x - (a_s.transpose() * &xi_stack) * (alpha / s_f) + hat_d;

        let mut gstar = DVector::zeros(m_total);
        for (&i, &(start, len)) in samples.iter().zip(&offsets) {
            let xi_i = &xi_stack.as_slice()[start..start + len];
            let g = loss.gstar(xi_i, i)?;
            gstar.rows_mut(start, len).copy_from(&DVector::from_vec(g));
        }
        let r = &gstar - &(&a_s * reg.prox(&z, alpha));
        let residual_norm = r.norm();
        info.residuals.push(residual_norm);

        if residual_norm <= tol_sub {
            converged = true;
            break;
        }

        let mask = reg.jacobian_prox_diag(&z, alpha);
        let rhs = -&r;

        let apply_w = |v: &DVector<f64>| -> DVector<f64> {
            let mut out = apply_hstar_block(loss, &xi_stack, samples, &offsets, v)
                .unwrap_or_else(|_| DVector::zeros(v.len()));
            out += v * EPS_REG;
            out += apply_jacobian_term(&a_s, &mask, v, alpha, s_f);
            out
        };
        let identity_precond = DVector::from_element(m_total, 1.0);

        let cg_tol = newton_params
            .eta
            .min(residual_norm.powf(1.0 + newton_params.tau));
        let (d, _iters) = cg::pcg(apply_w, &rhs, &identity_precond, cg_tol, newton_params.cg_max_iter);
        info.direction_norms.push(d.norm());

        let descent = d.dot(&rhs);
        if descent <= DESCENT_SLACK {
            log::warn!("semismooth Newton direction failed the strict-descent test: d.rhs = {descent:.3e}");
        }

        let u_old = subproblem_objective(loss, reg, &xi_stack, samples, &offsets, x, alpha, &a_s, hat_d);
        let mut beta = 1.0;
        let mut shrinks = 0;
        let mut u_new = subproblem_objective(
            loss,
            reg,
            &(&xi_stack + &d * beta),
            samples,
            &offsets,
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
                &(&xi_stack + &d * beta),
                samples,
                &offsets,
                x,
                alpha,
                &a_s,
                hat_d,
            );
        }
        info.step_sizes.push(beta);
        info.objective_trace.push(u_new);
        info.evaluations += (2.0 + (beta.ln() / newton_params.rho.ln())) as usize * samples.len();

        xi_stack += &d * beta;
    }

    if !converged {
        log::warn!(
            "semismooth Newton (block) reached max_iter ({}) with residual {:?}",
            newton_params.max_iter,
            info.residuals.last()
        );
    }

    let z_final = x - (a_s.transpose() * &xi_stack) * (alpha / s_f) + hat_d;
    let x_next = reg.prox(&z_final, alpha);
    scatter_stack(xi, samples, &offsets, &xi_stack);

    Ok((x_next, info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::SquaredLoss;
    use crate::regularizer::L1Regularizer;

    #[test]
    fn block_solve_matches_scalar_shape_for_singleton_blocks() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = vec![1.0, 2.0, 3.0];
        let ds = Dataset::new(a, b, vec![1, 1, 1]).unwrap();
        let loss = SquaredLoss::new(ds);
        let reg = L1Regularizer::new(0.05).unwrap();

        let x = DVector::zeros(2);
        let mut xi = BlockDual::new(3);
        for i in 0..3 {
            xi.set_block(i, &[0.0]);
        }
        let hat_d = DVector::zeros(2);
        let newton_params = NewtonParams::default();

        let (x_next, info) = solve(
            &loss,
            &reg,
            &x,
            &mut xi,
            0.5,
            &[0, 1, 2],
            &hat_d,
            &newton_params,
            1e-8,
        )
        .unwrap();

        assert!(info.residuals.last().unwrap() <= &1e-6);
        assert_eq!(x_next.len(), 2);
    }
}
