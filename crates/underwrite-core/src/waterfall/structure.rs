use std::collections::HashSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::UnderwriteError;
use crate::types::{Money, Rate};
use crate::UnderwriteResult;

/// Allowed drift between `lp_split + gp_split` and 1.
pub const SPLIT_TOLERANCE: Decimal = dec!(0.000001);
/// Allowed drift between total class equity and LP + GP equity.
pub const CLASS_EQUITY_TOLERANCE: Money = dec!(0.01);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// IRR hurdle that closes a promote tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hurdle {
    /// Tier applies until the LP reaches this IRR
    Bounded(Rate),
    /// Residual tier; takes everything left
    Unbounded,
}

impl Hurdle {
    pub fn rate(&self) -> Option<Rate> {
        match self {
            Hurdle::Bounded(r) => Some(*r),
            Hurdle::Unbounded => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoteTier {
    pub hurdle: Hurdle,
    pub lp_split: Rate,
    pub gp_split: Rate,
}

/// An equity class paid in priority order in per-class mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareClass {
    pub code: String,
    /// Lower is paid first
    pub priority: u32,
    pub equity_amount: Money,
    pub class_preferred_return: Rate,
}

/// Partnership distribution terms for one deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallStructure {
    pub lp_equity: Money,
    pub gp_equity: Money,
    /// Annual, compounded on unreturned capital plus unpaid preferred
    pub preferred_return_rate: Rate,
    #[serde(default)]
    pub gp_catch_up: bool,
    /// Share of each catch-up dollar paid to the GP
    #[serde(default)]
    pub catch_up_percent: Rate,
    #[serde(default)]
    pub lookback: bool,
    #[serde(default)]
    pub use_per_class_waterfall: bool,
    /// Ordered by ascending hurdle; the last tier is unbounded
    pub promote_tiers: Vec<PromoteTier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub share_classes: Vec<ShareClass>,
}

impl WaterfallStructure {
    pub fn total_equity(&self) -> Money {
        self.lp_equity + self.gp_equity
    }

    pub fn validate(self) -> UnderwriteResult<ValidatedWaterfall> {
        ValidatedWaterfall::new(self)
    }
}

/// A structure that passed every configuration check. Share classes, when
/// used, are held in payment order.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedWaterfall {
    structure: WaterfallStructure,
    classes_by_priority: Vec<ShareClass>,
}

impl ValidatedWaterfall {
    pub fn new(structure: WaterfallStructure) -> UnderwriteResult<Self> {
        validate_equity(&structure)?;
        validate_tiers(&structure.promote_tiers)?;
        validate_catch_up(&structure)?;

        let classes_by_priority = if structure.use_per_class_waterfall {
            if structure.lookback {
                return Err(UnderwriteError::invalid(
                    "lookback",
                    "Lookback combined with per-class distribution has no agreed true-up rule; \
                     disable one of them",
                ));
            }
            validate_classes(&structure)?
        } else {
            Vec::new()
        };

        Ok(ValidatedWaterfall {
            structure,
            classes_by_priority,
        })
    }

    pub fn structure(&self) -> &WaterfallStructure {
        &self.structure
    }

    pub fn tiers(&self) -> &[PromoteTier] {
        &self.structure.promote_tiers
    }

    /// Classes sorted by ascending priority; empty in pooled mode.
    pub fn classes(&self) -> &[ShareClass] {
        &self.classes_by_priority
    }

    pub fn is_per_class(&self) -> bool {
        self.structure.use_per_class_waterfall
    }

    /// GP share of profits the catch-up targets: the first tier's GP split.
    pub fn catch_up_target_split(&self) -> Rate {
        self.structure
            .promote_tiers
            .first()
            .map(|t| t.gp_split)
            .unwrap_or(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_equity(s: &WaterfallStructure) -> UnderwriteResult<()> {
    if s.lp_equity < Decimal::ZERO {
        return Err(UnderwriteError::invalid("lp_equity", "LP equity cannot be negative"));
    }
    if s.gp_equity < Decimal::ZERO {
        return Err(UnderwriteError::invalid("gp_equity", "GP equity cannot be negative"));
    }
    if s.total_equity() <= Decimal::ZERO {
        return Err(UnderwriteError::invalid(
            "lp_equity",
            "Total LP + GP equity must be positive",
        ));
    }
    if s.preferred_return_rate < Decimal::ZERO {
        return Err(UnderwriteError::invalid(
            "preferred_return_rate",
            "Preferred return cannot be negative",
        ));
    }
    Ok(())
}

fn validate_tiers(tiers: &[PromoteTier]) -> UnderwriteResult<()> {
    if tiers.is_empty() {
        return Err(UnderwriteError::invalid(
            "promote_tiers",
            "At least one promote tier is required",
        ));
    }

    let mut previous: Option<Rate> = None;
    for (i, tier) in tiers.iter().enumerate() {
        let field = format!("promote_tiers[{i}]");
        let is_last = i == tiers.len() - 1;

        if tier.lp_split < Decimal::ZERO || tier.gp_split < Decimal::ZERO {
            return Err(UnderwriteError::invalid(field, "Splits cannot be negative"));
        }
        if (tier.lp_split + tier.gp_split - Decimal::ONE).abs() > SPLIT_TOLERANCE {
            return Err(UnderwriteError::invalid(
                field,
                format!(
                    "LP split {} + GP split {} must sum to 1",
                    tier.lp_split, tier.gp_split
                ),
            ));
        }

        match tier.hurdle {
            Hurdle::Unbounded if !is_last => {
                return Err(UnderwriteError::invalid(
                    field,
                    "Only the last tier may have an unbounded hurdle",
                ));
            }
            Hurdle::Unbounded => {}
            Hurdle::Bounded(_) if is_last => {
                return Err(UnderwriteError::invalid(
                    field,
                    "The last tier must have an unbounded hurdle",
                ));
            }
            Hurdle::Bounded(rate) => {
                if rate <= dec!(-1) {
                    return Err(UnderwriteError::invalid(
                        field,
                        "Hurdle rate must be greater than -100%",
                    ));
                }
                if let Some(prev) = previous {
                    if rate <= prev {
                        return Err(UnderwriteError::invalid(
                            field,
                            format!("Hurdle {rate} is not above the previous hurdle {prev}"),
                        ));
                    }
                }
                if tier.lp_split <= Decimal::ZERO {
                    return Err(UnderwriteError::invalid(
                        field,
                        "A bounded tier must pay the LP a positive split",
                    ));
                }
                previous = Some(rate);
            }
        }
    }
    Ok(())
}

fn validate_catch_up(s: &WaterfallStructure) -> UnderwriteResult<()> {
    if !s.gp_catch_up {
        return Ok(());
    }
    let target = s.promote_tiers.first().map(|t| t.gp_split).unwrap_or_default();
    if s.catch_up_percent <= target || s.catch_up_percent > Decimal::ONE {
        return Err(UnderwriteError::invalid(
            "catch_up_percent",
            format!(
                "Catch-up percent must exceed the first tier GP split ({target}) and be at most 1"
            ),
        ));
    }
    Ok(())
}

fn validate_classes(s: &WaterfallStructure) -> UnderwriteResult<Vec<ShareClass>> {
    if s.share_classes.is_empty() {
        return Err(UnderwriteError::invalid(
            "share_classes",
            "Per-class distribution requires at least one share class",
        ));
    }

    let mut priorities = HashSet::new();
    let mut codes = HashSet::new();
    for class in &s.share_classes {
        if !priorities.insert(class.priority) {
            return Err(UnderwriteError::invalid(
                "share_classes",
                format!("Duplicate class priority {}", class.priority),
            ));
        }
        if !codes.insert(class.code.as_str()) {
            return Err(UnderwriteError::invalid(
                "share_classes",
                format!("Duplicate class code '{}'", class.code),
            ));
        }
        if class.equity_amount <= Decimal::ZERO {
            return Err(UnderwriteError::invalid(
                format!("share_classes[{}].equity_amount", class.code),
                "Class equity must be positive",
            ));
        }
        if class.class_preferred_return < Decimal::ZERO {
            return Err(UnderwriteError::invalid(
                format!("share_classes[{}].class_preferred_return", class.code),
                "Class preferred return cannot be negative",
            ));
        }
    }

    let class_total: Money = s.share_classes.iter().map(|c| c.equity_amount).sum();
    if (class_total - s.total_equity()).abs() > CLASS_EQUITY_TOLERANCE {
        return Err(UnderwriteError::invalid(
            "share_classes",
            format!(
                "Class equity {class_total} does not equal LP + GP equity {}",
                s.total_equity()
            ),
        ));
    }

    let mut ordered = s.share_classes.clone();
    ordered.sort_by_key(|c| c.priority);
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waterfall::test_support::{pooled_structure, tier};

    fn assert_invalid(s: WaterfallStructure, field_fragment: &str) {
        match s.validate() {
            Err(UnderwriteError::InvalidInput { field, .. }) => {
                assert!(field.contains(field_fragment), "unexpected field {field}")
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_structure() {
        let v = pooled_structure().validate().unwrap();
        assert_eq!(v.tiers().len(), 3);
        assert!(v.classes().is_empty());
    }

    #[test]
    fn test_descending_hurdles_rejected() {
        let mut s = pooled_structure();
        s.promote_tiers = vec![
            tier(Some(dec!(0.12)), dec!(0.80)),
            tier(Some(dec!(0.10)), dec!(0.70)),
            tier(None, dec!(0.60)),
        ];
        assert_invalid(s, "promote_tiers[1]");
    }

    #[test]
    fn test_unbounded_must_be_last() {
        let mut s = pooled_structure();
        s.promote_tiers = vec![tier(None, dec!(0.80)), tier(Some(dec!(0.10)), dec!(0.70))];
        assert_invalid(s, "promote_tiers[0]");

        let mut s = pooled_structure();
        s.promote_tiers = vec![tier(Some(dec!(0.10)), dec!(0.80))];
        assert_invalid(s, "promote_tiers[0]");
    }

    #[test]
    fn test_splits_must_sum_to_one() {
        let mut s = pooled_structure();
        s.promote_tiers[0].gp_split = dec!(0.25);
        assert_invalid(s, "promote_tiers[0]");
    }

    #[test]
    fn test_catch_up_must_exceed_first_split() {
        let mut s = pooled_structure();
        s.gp_catch_up = true;
        s.catch_up_percent = dec!(0.20);
        assert_invalid(s, "catch_up_percent");
    }

    #[test]
    fn test_duplicate_priorities_rejected() {
        let mut s = pooled_structure();
        s.use_per_class_waterfall = true;
        s.share_classes = vec![
            ShareClass {
                code: "A".into(),
                priority: 1,
                equity_amount: dec!(600000),
                class_preferred_return: dec!(0.08),
            },
            ShareClass {
                code: "B".into(),
                priority: 1,
                equity_amount: dec!(400000),
                class_preferred_return: dec!(0.10),
            },
        ];
        assert_invalid(s, "share_classes");
    }

    #[test]
    fn test_class_equity_must_match() {
        let mut s = pooled_structure();
        s.use_per_class_waterfall = true;
        s.share_classes = vec![ShareClass {
            code: "A".into(),
            priority: 1,
            equity_amount: dec!(500000),
            class_preferred_return: dec!(0.08),
        }];
        assert_invalid(s, "share_classes");
    }

    #[test]
    fn test_lookback_with_per_class_rejected() {
        let mut s = pooled_structure();
        s.use_per_class_waterfall = true;
        s.lookback = true;
        s.share_classes = vec![ShareClass {
            code: "A".into(),
            priority: 1,
            equity_amount: s.total_equity(),
            class_preferred_return: dec!(0.08),
        }];
        assert_invalid(s, "lookback");
    }

    #[test]
    fn test_classes_sorted_by_priority() {
        let mut s = pooled_structure();
        s.use_per_class_waterfall = true;
        s.share_classes = vec![
            ShareClass {
                code: "B".into(),
                priority: 2,
                equity_amount: dec!(400000),
                class_preferred_return: dec!(0.10),
            },
            ShareClass {
                code: "A".into(),
                priority: 1,
                equity_amount: dec!(600000),
                class_preferred_return: dec!(0.08),
            },
        ];
        let v = s.validate().unwrap();
        let codes: Vec<&str> = v.classes().iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B"]);
    }

    #[test]
    fn test_hurdle_serde_tags() {
        let json = serde_json::to_string(&Hurdle::Unbounded).unwrap();
        assert_eq!(json, "\"unbounded\"");
        let h: Hurdle = serde_json::from_str(r#"{"bounded":"0.12"}"#).unwrap();
        assert_eq!(h, Hurdle::Bounded(dec!(0.12)));
    }
}
