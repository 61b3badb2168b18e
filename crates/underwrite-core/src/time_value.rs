use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::UnderwriteError;
use crate::types::{Metric, Money, Rate, UndefinedReason};
use crate::UnderwriteResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const RATE_TOLERANCE: Decimal = dec!(0.000000000001);
const MAX_IRR_ITERATIONS: u32 = 100;
const MAX_BISECTION_ITERATIONS: u32 = 200;
const IRR_GUESS: Rate = dec!(0.10);

/// Lowest rate the IRR solver will consider.
pub const IRR_LOWER_BOUND: Rate = dec!(-0.99);
/// Highest rate the IRR solver will consider.
pub const IRR_UPPER_BOUND: Rate = dec!(10.0);

/// (1 + rate)^periods by repeated multiplication. `None` on overflow.
pub fn compound_factor(rate: Rate, periods: u32) -> Option<Decimal> {
    let one_plus_r = Decimal::ONE + rate;
    let mut factor = Decimal::ONE;
    for _ in 0..periods {
        factor = factor.checked_mul(one_plus_r)?;
    }
    Some(factor)
}

/// Net Present Value of a series of cash flows (index = period).
pub fn npv(rate: Rate, cash_flows: &[Money]) -> UnderwriteResult<Money> {
    if rate <= dec!(-1) {
        return Err(UnderwriteError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }
    npv_and_derivative(cash_flows, rate)
        .map(|(npv, _)| npv)
        .ok_or_else(|| UnderwriteError::invalid("rate", format!("NPV overflows at rate {rate}")))
}

/// Net Present Value of flows dated by whole periods, `(period, amount)`.
pub fn npv_at_periods(rate: Rate, flows: &[(u32, Money)]) -> UnderwriteResult<Money> {
    let mut total = Decimal::ZERO;
    for (period, amount) in flows {
        let factor = compound_factor(rate, *period).ok_or_else(|| {
            UnderwriteError::invalid("rate", format!("Compounding overflows at period {period}"))
        })?;
        if factor.is_zero() {
            return Err(UnderwriteError::DivisionByZero {
                context: format!("NPV discount factor at period {period}"),
            });
        }
        total += amount / factor;
    }
    Ok(total)
}

/// NPV(r) = sum CF_t / (1+r)^t and its derivative d(NPV)/dr.
/// Returns `None` if any term overflows 96-bit decimal range.
fn npv_and_derivative(cash_flows: &[Money], rate: Rate) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }
    let mut npv = Decimal::ZERO;
    let mut dnpv = Decimal::ZERO;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        let term = cf.checked_mul(discount)?;
        npv = npv.checked_add(term)?;
        if t > 0 {
            // d/dr of CF_t / (1+r)^t = -t * CF_t / (1+r)^(t+1)
            let d = Decimal::from(-(t as i64))
                .checked_mul(term)?
                .checked_div(one_plus_r)?;
            dnpv = dnpv.checked_add(d)?;
        }
        discount = discount.checked_div(one_plus_r)?;
    }

    Some((npv, dnpv))
}

fn has_sign_change(cash_flows: &[Money]) -> bool {
    let positive = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    let negative = cash_flows.iter().any(|cf| *cf < Decimal::ZERO);
    positive && negative
}

/// Internal Rate of Return.
///
/// Newton-Raphson from a 10% guess; if that leaves the
/// `[IRR_LOWER_BOUND, IRR_UPPER_BOUND]` window, stalls, or overflows, the
/// solver scans the window for sign changes of NPV and bisects the bracket
/// closest to the guess.
pub fn irr(cash_flows: &[Money]) -> UnderwriteResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(UnderwriteError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }
    if !has_sign_change(cash_flows) {
        return Err(UnderwriteError::InsufficientData(
            "IRR requires cash flows that change sign".into(),
        ));
    }

    if let Some(rate) = newton_raphson(cash_flows) {
        return Ok(rate);
    }
    log::debug!("IRR: Newton-Raphson did not converge, falling back to bisection");
    bisection(cash_flows)
}

/// IRR reported as a [`Metric`], with the failure mode as the reason code.
pub fn irr_metric(cash_flows: &[Money], context: &str) -> Metric {
    if cash_flows.len() < 2 {
        return Metric::undefined(
            UndefinedReason::InsufficientCashFlows,
            format!("{context}: fewer than 2 cash flows"),
        );
    }
    if !has_sign_change(cash_flows) {
        return Metric::undefined(
            UndefinedReason::NoSignChange,
            format!("{context}: cash flows never change sign"),
        );
    }
    match irr(cash_flows) {
        Ok(rate) => Metric::defined(rate),
        Err(e) => {
            log::warn!("{context}: IRR undefined ({e})");
            Metric::undefined(UndefinedReason::NoRootInBounds, format!("{context}: {e}"))
        }
    }
}

fn newton_raphson(cash_flows: &[Money]) -> Option<Rate> {
    let mut rate = IRR_GUESS;

    for _ in 0..MAX_IRR_ITERATIONS {
        let (npv_val, dnpv) = npv_and_derivative(cash_flows, rate)?;

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Some(rate);
        }
        if dnpv.is_zero() {
            return None;
        }

        let new_rate = rate - npv_val.checked_div(dnpv)?;
        if new_rate < IRR_LOWER_BOUND || new_rate > IRR_UPPER_BOUND {
            return None;
        }
        if (new_rate - rate).abs() < RATE_TOLERANCE {
            return Some(new_rate);
        }
        rate = new_rate;
    }

    None
}

/// Candidate rates used to locate sign changes: fine steps near zero,
/// coarser steps toward the upper bound.
fn scan_points() -> Vec<Rate> {
    let mut points = vec![IRR_LOWER_BOUND];
    let mut r = dec!(-0.95);
    while r < dec!(1.0) {
        points.push(r);
        r += dec!(0.05);
    }
    while r <= IRR_UPPER_BOUND {
        points.push(r);
        r += dec!(0.25);
    }
    points
}

fn bisection(cash_flows: &[Money]) -> UnderwriteResult<Rate> {
    let evaluated: Vec<(Rate, Decimal)> = scan_points()
        .into_iter()
        .filter_map(|r| npv_and_derivative(cash_flows, r).map(|(v, _)| (r, v)))
        .collect();

    let mut brackets: Vec<(Rate, Decimal, Rate, Decimal)> = Vec::new();
    for pair in evaluated.windows(2) {
        let (lo, f_lo) = pair[0];
        let (hi, f_hi) = pair[1];
        if f_lo.is_zero() {
            return Ok(lo);
        }
        if (f_lo < Decimal::ZERO) != (f_hi < Decimal::ZERO) {
            brackets.push((lo, f_lo, hi, f_hi));
        }
    }
    if let Some(&(last, f_last)) = evaluated.last() {
        if f_last.is_zero() {
            return Ok(last);
        }
    }

    let (mut lo, mut f_lo, mut hi, _) = brackets
        .into_iter()
        .min_by_key(|(lo, _, hi, _)| ((*lo + *hi) / dec!(2) - IRR_GUESS).abs())
        .ok_or_else(|| UnderwriteError::ConvergenceFailure {
            function: "IRR".into(),
            iterations: 0,
            last_delta: evaluated
                .iter()
                .map(|(_, v)| v.abs())
                .min()
                .unwrap_or(Decimal::MAX),
        })?;

    let mut mid = (lo + hi) / dec!(2);
    for _ in 0..MAX_BISECTION_ITERATIONS {
        mid = (lo + hi) / dec!(2);
        let f_mid = match npv_and_derivative(cash_flows, mid) {
            Some((v, _)) => v,
            None => break,
        };
        if f_mid.abs() < CONVERGENCE_THRESHOLD || (hi - lo) < RATE_TOLERANCE {
            return Ok(mid);
        }
        if (f_mid < Decimal::ZERO) == (f_lo < Decimal::ZERO) {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(UnderwriteError::ConvergenceFailure {
        function: "IRR".into(),
        iterations: MAX_BISECTION_ITERATIONS,
        last_delta: npv_and_derivative(cash_flows, mid)
            .map(|(v, _)| v)
            .unwrap_or(Decimal::MAX),
    })
}
