#![cfg(feature = "waterfall")]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use underwrite_core::types::{Money, Rate};
use underwrite_core::waterfall::{
    calculate_waterfall, Hurdle, PromoteTier, ShareClass, WaterfallDistribution, WaterfallInput,
    WaterfallStructure,
};
use underwrite_core::UnderwriteError;

fn tier(hurdle: Option<Rate>, lp_split: Rate) -> PromoteTier {
    PromoteTier {
        hurdle: hurdle.map_or(Hurdle::Unbounded, Hurdle::Bounded),
        lp_split,
        gp_split: Decimal::ONE - lp_split,
    }
}

fn jv_structure() -> WaterfallStructure {
    WaterfallStructure {
        lp_equity: dec!(4500000),
        gp_equity: dec!(500000),
        preferred_return_rate: dec!(0.08),
        gp_catch_up: false,
        catch_up_percent: Decimal::ZERO,
        lookback: false,
        use_per_class_waterfall: false,
        promote_tiers: vec![
            tier(Some(dec!(0.10)), dec!(0.90)),
            tier(Some(dec!(0.14)), dec!(0.80)),
            tier(Some(dec!(0.18)), dec!(0.70)),
            tier(None, dec!(0.60)),
        ],
        share_classes: Vec::new(),
    }
}

fn three_classes() -> Vec<ShareClass> {
    vec![
        ShareClass {
            code: "SENIOR".into(),
            priority: 1,
            equity_amount: dec!(2000000),
            class_preferred_return: dec!(0.07),
        },
        ShareClass {
            code: "MEZZ".into(),
            priority: 2,
            equity_amount: dec!(1500000),
            class_preferred_return: dec!(0.10),
        },
        ShareClass {
            code: "COMMON".into(),
            priority: 3,
            equity_amount: dec!(1500000),
            class_preferred_return: dec!(0.12),
        },
    ]
}

/// Cash-flow profiles covering losses, break-even, and strong exits.
fn profiles() -> Vec<(Vec<Money>, Money)> {
    vec![
        (vec![dec!(250000); 5], dec!(3000000)),
        (vec![dec!(300000), dec!(320000), dec!(340000), dec!(360000), dec!(380000)], dec!(6800000)),
        (vec![dec!(-200000), dec!(150000), dec!(400000), dec!(450000)], dec!(9500000)),
        (vec![dec!(900000), dec!(100000), Decimal::ZERO], dec!(12000000)),
        (vec![Decimal::ZERO; 7], dec!(18000000)),
    ]
}

fn run(structure: WaterfallStructure, flows: Vec<Money>, sale: Money) -> WaterfallDistribution {
    let input = WaterfallInput {
        structure,
        annual_cash_flows: flows,
        sale_proceeds: sale,
    };
    calculate_waterfall(&input).unwrap().result
}

fn assert_cash_conserved(d: &WaterfallDistribution, flows: &[Money], sale: Money) {
    let distributed: Money = d
        .yearly_distributions
        .iter()
        .map(|r| r.lp_share + r.gp_share)
        .sum();
    let input: Money = flows.iter().copied().sum::<Money>() + sale;
    assert!(
        (distributed - input).abs() < dec!(0.000001),
        "distributed {distributed} vs input {input}"
    );
}

// ===========================================================================
// Conservation of cash
// ===========================================================================

#[test]
fn test_conservation_for_every_configuration() {
    let mut configs = Vec::new();
    configs.push(jv_structure());

    let mut catch_up = jv_structure();
    catch_up.gp_catch_up = true;
    catch_up.catch_up_percent = dec!(0.5);
    configs.push(catch_up);

    let mut full_catch_up = jv_structure();
    full_catch_up.gp_catch_up = true;
    full_catch_up.catch_up_percent = Decimal::ONE;
    full_catch_up.lookback = true;
    configs.push(full_catch_up);

    let mut single_tier = jv_structure();
    single_tier.promote_tiers = vec![tier(None, dec!(0.75))];
    configs.push(single_tier);

    let mut per_class = jv_structure();
    per_class.use_per_class_waterfall = true;
    per_class.share_classes = three_classes();
    configs.push(per_class);

    for structure in configs {
        for (flows, sale) in profiles() {
            let d = run(structure.clone(), flows.clone(), sale);
            assert_cash_conserved(&d, &flows, sale);
            assert_eq!(d.yearly_distributions.len(), flows.len());
        }
    }
}

#[test]
fn test_higher_exit_moves_into_higher_tiers() {
    let low = run(jv_structure(), vec![dec!(250000); 5], dec!(6000000));
    let high = run(jv_structure(), vec![dec!(250000); 5], dec!(12000000));
    let low_tier = low.yearly_distributions[4].active_tier.unwrap();
    let high_tier = high.yearly_distributions[4].active_tier.unwrap();
    assert!(high_tier > low_tier);
    assert!(high.total_promote > low.total_promote);
    assert!(high.lp_irr.value().unwrap() > low.lp_irr.value().unwrap());
}

#[test]
fn test_gp_share_rises_with_promote() {
    let d = run(jv_structure(), vec![dec!(250000); 5], dec!(12000000));
    let gp_share = d.gp_total_return / (d.gp_total_return + d.lp_total_return);
    assert!(gp_share > dec!(0.10));
    assert!(d.gp_irr.value().unwrap() > d.lp_irr.value().unwrap());
}

// ===========================================================================
// Per-class mode
// ===========================================================================

#[test]
fn test_class_totals_equal_lp_total() {
    let mut s = jv_structure();
    s.use_per_class_waterfall = true;
    s.share_classes = three_classes();
    for (flows, sale) in profiles() {
        let d = run(s.clone(), flows, sale);
        let classes = d.by_class.as_ref().unwrap();
        let class_total: Money = classes.values().map(|c| c.total_distributed).sum();
        assert!((class_total - d.lp_total_return).abs() < dec!(0.000001));
    }
}

#[test]
fn test_senior_class_recovers_capital_first() {
    let mut s = jv_structure();
    s.use_per_class_waterfall = true;
    s.share_classes = three_classes();
    let d = run(s, vec![dec!(800000), dec!(900000), dec!(700000)], dec!(1200000));
    let classes = d.by_class.as_ref().unwrap();
    let senior = &classes["SENIOR"];
    let mezz = &classes["MEZZ"];
    let common = &classes["COMMON"];

    assert_eq!(senior.capital_returned, dec!(2000000));
    assert!(mezz.capital_returned <= senior.capital_returned);
    assert!(common.capital_returned <= mezz.capital_returned);
    assert!(common.capital_returned < dec!(1500000));
}

// ===========================================================================
// Validation
// ===========================================================================

#[test]
fn test_descending_hurdles_rejected_before_distribution() {
    let mut s = jv_structure();
    s.promote_tiers = vec![
        tier(Some(dec!(0.12)), dec!(0.80)),
        tier(Some(dec!(0.10)), dec!(0.70)),
        tier(None, dec!(0.60)),
    ];
    let input = WaterfallInput {
        structure: s,
        annual_cash_flows: vec![dec!(100000); 3],
        sale_proceeds: dec!(6000000),
    };
    match calculate_waterfall(&input) {
        Err(UnderwriteError::InvalidInput { field, reason }) => {
            assert_eq!(field, "promote_tiers[1]");
            assert!(reason.contains("not above"));
        }
        other => panic!("expected InvalidInput, got {other:?}"),
    }
}

#[test]
fn test_structure_from_json() {
    let json = r#"{
        "lp_equity": "900000",
        "gp_equity": "100000",
        "preferred_return_rate": "0.08",
        "gp_catch_up": true,
        "catch_up_percent": "1.0",
        "promote_tiers": [
            {"hurdle": {"bounded": "0.12"}, "lp_split": "0.80", "gp_split": "0.20"},
            {"hurdle": "unbounded", "lp_split": "0.70", "gp_split": "0.30"}
        ]
    }"#;
    let s: WaterfallStructure = serde_json::from_str(json).unwrap();
    assert!(!s.lookback);
    assert_eq!(s.promote_tiers[1].hurdle, Hurdle::Unbounded);
    let d = run(s, vec![dec!(70000); 4], dec!(1500000));
    assert!(d.yearly_distributions[3].catch_up > Decimal::ZERO);
}
