use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::UnderwriteError;
use crate::time_value::{compound_factor, irr_metric, npv_at_periods};
use crate::types::{Metric, Money, Rate};
use crate::UnderwriteResult;

use super::structure::{Hurdle, ValidatedWaterfall};

/// Shortfall (in dollars at the event date) below which a hurdle counts as met.
const HURDLE_TOLERANCE: Money = dec!(0.01);

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Split of one year's cash between LP and GP. Capital calls show up as
/// negative shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyDistribution {
    pub year: u32,
    pub cash_flow: Money,
    pub lp_share: Money,
    pub gp_share: Money,
    pub cumulative_lp: Money,
    pub cumulative_gp: Money,
    pub capital_called: Money,
    pub return_of_capital: Money,
    pub preferred_return: Money,
    /// Catch-up dollars, both sides
    pub catch_up: Money,
    /// Dollars run through the promote tiers, both sides
    pub promote: Money,
    /// Positive moves cash from LP to GP
    pub lookback_adjustment: Money,
    /// Index into `promote_tiers` of the last tier that received cash
    pub active_tier: Option<usize>,
}

impl YearlyDistribution {
    fn new(year: u32, cash_flow: Money) -> Self {
        YearlyDistribution {
            year,
            cash_flow,
            lp_share: Decimal::ZERO,
            gp_share: Decimal::ZERO,
            cumulative_lp: Decimal::ZERO,
            cumulative_gp: Decimal::ZERO,
            capital_called: Decimal::ZERO,
            return_of_capital: Decimal::ZERO,
            preferred_return: Decimal::ZERO,
            catch_up: Decimal::ZERO,
            promote: Decimal::ZERO,
            lookback_adjustment: Decimal::ZERO,
            active_tier: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDistribution {
    pub priority: u32,
    pub equity_amount: Money,
    /// Initial equity plus capital calls
    pub contributed: Money,
    pub capital_returned: Money,
    pub pref_paid: Money,
    /// Pro-rata share of the LP side of catch-up and promote tiers
    pub residual_share: Money,
    pub total_distributed: Money,
    pub equity_multiple: Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallDistribution {
    pub yearly_distributions: Vec<YearlyDistribution>,
    pub lp_irr: Metric,
    pub gp_irr: Metric,
    pub lp_equity_multiple: Metric,
    pub gp_equity_multiple: Metric,
    pub lp_contributed: Money,
    pub gp_contributed: Money,
    /// Gross distributions received, excluding capital calls
    pub lp_total_return: Money,
    pub gp_total_return: Money,
    /// GP receipts above its pro-rata equity share of catch-up and tier cash
    pub total_promote: Money,
    pub lookback_adjustment: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_class: Option<BTreeMap<String, ClassDistribution>>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Capital account for one equity holder (LP, GP co-invest, or a share class).
#[derive(Debug, Clone)]
struct CapitalAccount {
    equity: Money,
    pref_rate: Rate,
    contributed: Money,
    unreturned: Money,
    accrued_pref: Money,
    capital_returned: Money,
    pref_paid: Money,
    residual: Money,
}

impl CapitalAccount {
    fn new(equity: Money, pref_rate: Rate) -> Self {
        CapitalAccount {
            equity,
            pref_rate,
            contributed: equity,
            unreturned: equity,
            accrued_pref: Decimal::ZERO,
            capital_returned: Decimal::ZERO,
            pref_paid: Decimal::ZERO,
            residual: Decimal::ZERO,
        }
    }

    /// One year of preferred return, compounding on unpaid preferred.
    fn accrue(&mut self) {
        self.accrued_pref += (self.unreturned + self.accrued_pref) * self.pref_rate;
    }

    fn call(&mut self, amount: Money) {
        self.contributed += amount;
        self.unreturned += amount;
    }

    fn return_capital(&mut self, amount: Money) {
        self.unreturned -= amount;
        self.capital_returned += amount;
    }

    fn pay_pref(&mut self, amount: Money) {
        self.accrued_pref -= amount;
        self.pref_paid += amount;
    }

    fn total_distributed(&self) -> Money {
        self.capital_returned + self.pref_paid + self.residual
    }
}

/// Split `amount` in proportion to `weights`; the last positive weight takes
/// the rounding remainder so the parts always sum to `amount`.
fn split_pro_rata(amount: Money, weights: &[Money]) -> Vec<Money> {
    let total: Money = weights.iter().copied().sum();
    let mut parts = vec![Decimal::ZERO; weights.len()];
    if total <= Decimal::ZERO {
        return parts;
    }
    let last = weights.iter().rposition(|w| *w > Decimal::ZERO);
    let mut allocated = Decimal::ZERO;
    for (i, w) in weights.iter().enumerate() {
        if Some(i) == last {
            parts[i] = amount - allocated;
            break;
        }
        parts[i] = amount * *w / total;
        allocated += parts[i];
    }
    parts
}

/// Cash received in the current event, before it is committed to history.
#[derive(Debug, Default)]
struct EventTally {
    lp: Money,
    gp: Money,
    lp_called: Money,
    gp_called: Money,
    /// LP receipts from promote tiers (excluded from lookback base flows)
    lp_tier: Money,
    /// Catch-up and tier receipts, by side
    lp_profit: Money,
    gp_profit: Money,
}

struct Ledger<'a> {
    waterfall: &'a ValidatedWaterfall,
    /// Pooled: `[LP, GP]`. Per-class: one per class, in priority order.
    accounts: Vec<CapitalAccount>,
    /// Dated LP cash flows, used for hurdle tests
    lp_flows: Vec<(u32, Money)>,
    /// LP flows excluding promote-tier receipts
    lp_base_flows: Vec<(u32, Money)>,
    lp_pref_paid: Money,
    catch_up_paid: Money,
    gp_catch_up: Money,
    tier_cash: Money,
    gp_tier: Money,
    lookback_adjustment: Money,
    locked_tier: usize,
    lp_distributed: Money,
    gp_distributed: Money,
    lp_called: Money,
    gp_called: Money,
    warnings: Vec<String>,
}

impl<'a> Ledger<'a> {
    fn new(waterfall: &'a ValidatedWaterfall) -> Self {
        let s = waterfall.structure();
        let accounts: Vec<CapitalAccount> = if waterfall.is_per_class() {
            waterfall
                .classes()
                .iter()
                .map(|c| CapitalAccount::new(c.equity_amount, c.class_preferred_return))
                .collect()
        } else {
            vec![
                CapitalAccount::new(s.lp_equity, s.preferred_return_rate),
                CapitalAccount::new(s.gp_equity, s.preferred_return_rate),
            ]
        };
        let lp_initial = Self::initial_lp(waterfall);

        Ledger {
            waterfall,
            accounts,
            lp_flows: vec![(0, -lp_initial)],
            lp_base_flows: vec![(0, -lp_initial)],
            lp_pref_paid: Decimal::ZERO,
            catch_up_paid: Decimal::ZERO,
            gp_catch_up: Decimal::ZERO,
            tier_cash: Decimal::ZERO,
            gp_tier: Decimal::ZERO,
            lookback_adjustment: Decimal::ZERO,
            locked_tier: 0,
            lp_distributed: Decimal::ZERO,
            gp_distributed: Decimal::ZERO,
            lp_called: Decimal::ZERO,
            gp_called: Decimal::ZERO,
            warnings: Vec::new(),
        }
    }

    /// In per-class mode every class is an LP interest, so the LP side
    /// carries the whole equity and the GP is paid only catch-up and promote.
    fn initial_lp(waterfall: &ValidatedWaterfall) -> Money {
        let s = waterfall.structure();
        if waterfall.is_per_class() {
            s.total_equity()
        } else {
            s.lp_equity
        }
    }

    fn initial_gp(waterfall: &ValidatedWaterfall) -> Money {
        if waterfall.is_per_class() {
            Decimal::ZERO
        } else {
            waterfall.structure().gp_equity
        }
    }

    fn is_lp(&self, idx: usize) -> bool {
        self.waterfall.is_per_class() || idx == 0
    }

    fn credit(&self, tally: &mut EventTally, idx: usize, amount: Money) {
        if self.is_lp(idx) {
            tally.lp += amount;
        } else {
            tally.gp += amount;
        }
    }

    /// LP side of catch-up or tier cash. Per-class: pro-rata to class equity.
    fn credit_lp_residual(&mut self, tally: &mut EventTally, amount: Money) {
        if self.waterfall.is_per_class() {
            let weights: Vec<Money> = self.accounts.iter().map(|a| a.equity).collect();
            for (acct, part) in self.accounts.iter_mut().zip(split_pro_rata(amount, &weights)) {
                acct.residual += part;
            }
        } else {
            self.accounts[0].residual += amount;
        }
        tally.lp += amount;
        tally.lp_profit += amount;
    }

    fn credit_gp_promote(&self, tally: &mut EventTally, amount: Money) {
        tally.gp += amount;
        tally.gp_profit += amount;
    }

    // --- Steps ---

    fn capital_call(&mut self, tally: &mut EventTally, row: &mut YearlyDistribution, call: Money) {
        let weights: Vec<Money> = self.accounts.iter().map(|a| a.equity).collect();
        for (idx, part) in split_pro_rata(call, &weights).into_iter().enumerate() {
            self.accounts[idx].call(part);
            if self.is_lp(idx) {
                tally.lp_called += part;
            } else {
                tally.gp_called += part;
            }
        }
        row.capital_called = call;
    }

    /// Pooled return of capital then preferred, each pro-rata.
    fn pay_pooled(
        &mut self,
        tally: &mut EventTally,
        row: &mut YearlyDistribution,
        cash: Money,
    ) -> Money {
        let mut remaining = cash;

        let unreturned: Vec<Money> = self.accounts.iter().map(|a| a.unreturned).collect();
        let roc = remaining.min(unreturned.iter().copied().sum());
        for (idx, part) in split_pro_rata(roc, &unreturned).into_iter().enumerate() {
            self.accounts[idx].return_capital(part);
            self.credit(tally, idx, part);
        }
        remaining -= roc;
        row.return_of_capital += roc;

        let accrued: Vec<Money> = self.accounts.iter().map(|a| a.accrued_pref).collect();
        let pref = remaining.min(accrued.iter().copied().sum());
        for (idx, part) in split_pro_rata(pref, &accrued).into_iter().enumerate() {
            self.accounts[idx].pay_pref(part);
            if self.is_lp(idx) {
                self.lp_pref_paid += part;
            }
            self.credit(tally, idx, part);
        }
        remaining -= pref;
        row.preferred_return += pref;

        remaining
    }

    /// Per-class: each class is made whole (capital, then preferred) before
    /// the next priority sees a dollar.
    fn pay_by_priority(
        &mut self,
        tally: &mut EventTally,
        row: &mut YearlyDistribution,
        cash: Money,
    ) -> Money {
        let mut remaining = cash;
        for idx in 0..self.accounts.len() {
            if remaining <= Decimal::ZERO {
                break;
            }
            let roc = remaining.min(self.accounts[idx].unreturned);
            self.accounts[idx].return_capital(roc);
            self.credit(tally, idx, roc);
            remaining -= roc;
            row.return_of_capital += roc;

            let pref = remaining.min(self.accounts[idx].accrued_pref);
            self.accounts[idx].pay_pref(pref);
            self.lp_pref_paid += pref;
            self.credit(tally, idx, pref);
            remaining -= pref;
            row.preferred_return += pref;
        }
        remaining
    }

    /// GP takes `c` of each dollar until its catch-up receipts equal the
    /// first tier's GP split of LP preferred plus the catch-up itself.
    fn pay_catch_up(
        &mut self,
        tally: &mut EventTally,
        row: &mut YearlyDistribution,
        cash: Money,
    ) -> Money {
        let waterfall = self.waterfall;
        let s = waterfall.structure();
        if !s.gp_catch_up || cash <= Decimal::ZERO {
            return cash;
        }
        let g = waterfall.catch_up_target_split();
        let c = s.catch_up_percent;
        let target_pool = g * self.lp_pref_paid / (c - g);
        let owed = (target_pool - self.catch_up_paid).max(Decimal::ZERO);
        let paid = cash.min(owed);
        if paid.is_zero() {
            return cash;
        }

        let to_gp = paid * c;
        let to_lp = paid - to_gp;
        self.credit_gp_promote(tally, to_gp);
        self.credit_lp_residual(tally, to_lp);
        self.catch_up_paid += paid;
        self.gp_catch_up += to_gp;
        row.catch_up += paid;
        cash - paid
    }

    /// Dollars the LP still needs, valued at `year`, to earn `hurdle` on its
    /// flows to date plus `pending` receipts in this event.
    fn lp_shortfall(
        flows: &[(u32, Money)],
        hurdle: Rate,
        year: u32,
        pending: Money,
    ) -> UnderwriteResult<Money> {
        let factor = compound_factor(hurdle, year).ok_or_else(|| {
            UnderwriteError::invalid("promote_tiers", format!("Hurdle {hurdle} overflows"))
        })?;
        let future_value = npv_at_periods(hurdle, flows)? * factor + pending;
        Ok((-future_value).max(Decimal::ZERO))
    }

    fn first_unmet_tier(&self, year: u32, pending: Money) -> UnderwriteResult<usize> {
        let tiers = self.waterfall.tiers();
        for (i, tier) in tiers.iter().enumerate() {
            match tier.hurdle {
                Hurdle::Unbounded => return Ok(i),
                Hurdle::Bounded(h) => {
                    if Self::lp_shortfall(&self.lp_flows, h, year, pending)? > HURDLE_TOLERANCE {
                        return Ok(i);
                    }
                }
            }
        }
        Ok(tiers.len().saturating_sub(1))
    }

    fn pay_tiers(
        &mut self,
        tally: &mut EventTally,
        row: &mut YearlyDistribution,
        year: u32,
        cash: Money,
    ) -> UnderwriteResult<()> {
        if cash <= Decimal::ZERO {
            return Ok(());
        }
        let waterfall = self.waterfall;
        let lookback = waterfall.structure().lookback;
        let mut k = self.first_unmet_tier(year, tally.lp)?;
        if lookback {
            k = k.max(self.locked_tier);
        }

        let tiers = waterfall.tiers();
        let mut remaining = cash;
        while k < tiers.len() {
            let tier = &tiers[k];
            let take = match tier.hurdle {
                Hurdle::Unbounded => remaining,
                Hurdle::Bounded(h) => {
                    let need = Self::lp_shortfall(&self.lp_flows, h, year, tally.lp)? / tier.lp_split;
                    remaining.min(need)
                }
            };

            if take > Decimal::ZERO {
                let to_lp = take * tier.lp_split;
                let to_gp = take - to_lp;
                self.credit_lp_residual(tally, to_lp);
                self.credit_gp_promote(tally, to_gp);
                tally.lp_tier += to_lp;
                self.tier_cash += take;
                self.gp_tier += to_gp;
                row.promote += take;
                row.active_tier = Some(k);
                remaining -= take;
            }
            if remaining <= Decimal::ZERO {
                break;
            }
            k += 1;
        }

        if lookback {
            if let Some(active) = row.active_tier {
                self.locked_tier = self.locked_tier.max(active);
            }
        }
        Ok(())
    }

    /// Re-split all promote-tier cash as if it had been paid at exit on top
    /// of the LP's realized base flows, and true up the GP in the final row.
    fn apply_lookback(
        &mut self,
        tally: &mut EventTally,
        row: &mut YearlyDistribution,
        year: u32,
    ) -> UnderwriteResult<()> {
        if self.tier_cash <= Decimal::ZERO {
            return Ok(());
        }
        let base_pending = tally.lp - tally.lp_tier - tally.lp_called;
        let mut pool_left = self.tier_cash;
        let mut hindsight_lp = Decimal::ZERO;
        let mut target_gp = Decimal::ZERO;

        let waterfall = self.waterfall;
        for tier in waterfall.tiers() {
            if pool_left <= Decimal::ZERO {
                break;
            }
            let take = match tier.hurdle {
                Hurdle::Unbounded => pool_left,
                Hurdle::Bounded(h) => {
                    let need = Self::lp_shortfall(
                        &self.lp_base_flows,
                        h,
                        year,
                        base_pending + hindsight_lp,
                    )? / tier.lp_split;
                    pool_left.min(need)
                }
            };
            hindsight_lp += take * tier.lp_split;
            target_gp += take * tier.gp_split;
            pool_left -= take;
        }

        let delta = target_gp - self.gp_tier;
        let moved = if delta > Decimal::ZERO {
            delta.min(tally.lp_profit.max(Decimal::ZERO))
        } else {
            -(-delta).min(tally.gp_profit.max(Decimal::ZERO))
        };
        if (delta - moved).abs() > HURDLE_TOLERANCE {
            let msg = format!(
                "Lookback true-up of {delta:.2} capped at {moved:.2} by the final distribution"
            );
            log::warn!("{msg}");
            self.warnings.push(msg);
        }

        // Lookback is pooled-only, so account 0 is the LP.
        self.accounts[0].residual -= moved;
        tally.lp -= moved;
        tally.gp += moved;
        self.lookback_adjustment = moved;
        row.lookback_adjustment = moved;
        Ok(())
    }

    fn process_event(
        &mut self,
        year: u32,
        cash: Money,
        is_final: bool,
    ) -> UnderwriteResult<YearlyDistribution> {
        for acct in &mut self.accounts {
            acct.accrue();
        }
        let mut row = YearlyDistribution::new(year, cash);
        let mut tally = EventTally::default();

        if cash < Decimal::ZERO {
            self.capital_call(&mut tally, &mut row, -cash);
        } else if cash > Decimal::ZERO {
            let after_pref = if self.waterfall.is_per_class() {
                self.pay_by_priority(&mut tally, &mut row, cash)
            } else {
                self.pay_pooled(&mut tally, &mut row, cash)
            };
            let after_catch_up = self.pay_catch_up(&mut tally, &mut row, after_pref);
            self.pay_tiers(&mut tally, &mut row, year, after_catch_up)?;
        }

        if is_final && self.waterfall.structure().lookback {
            self.apply_lookback(&mut tally, &mut row, year)?;
        }

        let lp_net = tally.lp - tally.lp_called;
        let gp_net = tally.gp - tally.gp_called;
        self.lp_flows.push((year, lp_net));
        self.lp_base_flows.push((year, lp_net - tally.lp_tier));
        self.lp_distributed += tally.lp;
        self.gp_distributed += tally.gp;
        self.lp_called += tally.lp_called;
        self.gp_called += tally.gp_called;

        row.lp_share = lp_net;
        row.gp_share = gp_net;
        Ok(row)
    }
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

/// Run yearly cash flows, with the sale netted into the final year, through
/// a validated structure.
pub fn distribute(
    waterfall: &ValidatedWaterfall,
    annual_cash_flows: &[Money],
    sale_proceeds: Money,
) -> UnderwriteResult<(WaterfallDistribution, Vec<String>)> {
    if annual_cash_flows.is_empty() {
        return Err(UnderwriteError::InsufficientData(
            "Waterfall requires at least one year of cash flows".into(),
        ));
    }

    let mut ledger = Ledger::new(waterfall);
    let n = annual_cash_flows.len();
    let mut rows = Vec::with_capacity(n);
    let (mut cum_lp, mut cum_gp) = (Decimal::ZERO, Decimal::ZERO);

    for (i, cf) in annual_cash_flows.iter().enumerate() {
        let is_final = i + 1 == n;
        let cash = if is_final { *cf + sale_proceeds } else { *cf };
        let mut row = ledger.process_event(i as u32 + 1, cash, is_final)?;
        cum_lp += row.lp_share;
        cum_gp += row.gp_share;
        row.cumulative_lp = cum_lp;
        row.cumulative_gp = cum_gp;
        rows.push(row);
    }

    let lp_initial = Ledger::initial_lp(waterfall);
    let gp_initial = Ledger::initial_gp(waterfall);
    let lp_contributed = lp_initial + ledger.lp_called;
    let gp_contributed = gp_initial + ledger.gp_called;

    let lp_vector: Vec<Money> = std::iter::once(-lp_initial)
        .chain(rows.iter().map(|r| r.lp_share))
        .collect();
    let gp_vector: Vec<Money> = std::iter::once(-gp_initial)
        .chain(rows.iter().map(|r| r.gp_share))
        .collect();

    let gp_equity_share = if waterfall.is_per_class() {
        Decimal::ZERO
    } else {
        gp_initial / waterfall.structure().total_equity()
    };
    let gp_promote_receipts = ledger.gp_catch_up + ledger.gp_tier + ledger.lookback_adjustment;
    let total_promote =
        gp_promote_receipts - gp_equity_share * (ledger.catch_up_paid + ledger.tier_cash);

    let by_class = if waterfall.is_per_class() {
        Some(
            waterfall
                .classes()
                .iter()
                .zip(&ledger.accounts)
                .map(|(class, acct)| {
                    let total = acct.total_distributed();
                    (
                        class.code.clone(),
                        ClassDistribution {
                            priority: class.priority,
                            equity_amount: class.equity_amount,
                            contributed: acct.contributed,
                            capital_returned: acct.capital_returned,
                            pref_paid: acct.pref_paid,
                            residual_share: acct.residual,
                            total_distributed: total,
                            equity_multiple: Metric::ratio(
                                total,
                                acct.contributed,
                                "class equity multiple: no contribution",
                            ),
                        },
                    )
                })
                .collect(),
        )
    } else {
        None
    };

    log::debug!(
        "Waterfall distributed {} events: LP {} / GP {}, promote {}",
        rows.len(),
        ledger.lp_distributed,
        ledger.gp_distributed,
        total_promote
    );

    let distribution = WaterfallDistribution {
        lp_irr: irr_metric(&lp_vector, "LP IRR"),
        gp_irr: irr_metric(&gp_vector, "GP IRR"),
        lp_equity_multiple: Metric::ratio(
            ledger.lp_distributed,
            lp_contributed,
            "LP equity multiple: no LP contribution",
        ),
        gp_equity_multiple: Metric::ratio(
            ledger.gp_distributed,
            gp_contributed,
            "GP equity multiple: no GP contribution",
        ),
        lp_contributed,
        gp_contributed,
        lp_total_return: ledger.lp_distributed,
        gp_total_return: ledger.gp_distributed,
        total_promote,
        lookback_adjustment: ledger.lookback_adjustment,
        by_class,
        yearly_distributions: rows,
    };
    Ok((distribution, ledger.warnings))
}
