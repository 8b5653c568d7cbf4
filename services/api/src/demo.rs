use crate::infra::{build_pricing_service, parse_date, parse_season, parse_service, seed_rule_set};
use chrono::{Local, NaiveDate};
use clap::Args;
use std::collections::{BTreeMap, BTreeSet};

use move_pricing::error::AppError;
use move_pricing::pricing::domain::{
    AccessProfile, Action, ActionType, Condition, ConditionOperator, ConditionValue, InputContext,
    RuleCategory, RuleDraft, RuleId, SeasonalPeriod, ServiceType,
};
use move_pricing::pricing::CalculationResult;

#[derive(Args, Debug)]
pub(crate) struct EstimateArgs {
    /// Service type (local_move, long_distance_move, office_move, packing_only, storage_move)
    #[arg(long, value_parser = parse_service, default_value = "local_move")]
    pub(crate) service: ServiceType,
    /// Move date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) move_date: Option<NaiveDate>,
    /// Base price quoted before rules apply
    #[arg(long, default_value_t = 1000.0)]
    pub(crate) base_price: f64,
    /// Base labor cost quoted before rules apply
    #[arg(long, default_value_t = 400.0)]
    pub(crate) base_labor_cost: f64,
    /// Route distance in kilometres
    #[arg(long, default_value_t = 25.0)]
    pub(crate) distance_km: f64,
    /// Total shipment weight in kilograms
    #[arg(long, default_value_t = 1200.0)]
    pub(crate) weight_kg: f64,
    /// Total shipment volume in cubic metres
    #[arg(long, default_value_t = 15.0)]
    pub(crate) volume_m3: f64,
    /// Crew size assigned to the move
    #[arg(long, default_value_t = 3)]
    pub(crate) crew_size: u8,
    /// Move falls on a weekend
    #[arg(long)]
    pub(crate) weekend: bool,
    /// Move falls on a public holiday
    #[arg(long)]
    pub(crate) holiday: bool,
    /// Seasonal demand period (low, standard, peak)
    #[arg(long, value_parser = parse_season, default_value = "standard")]
    pub(crate) season: SeasonalPeriod,
    /// Number of pianos in the shipment
    #[arg(long, default_value_t = 0)]
    pub(crate) pianos: u32,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Move date for the demo estimates (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) move_date: Option<NaiveDate>,
    /// Skip the rule administration portion of the demo.
    #[arg(long)]
    pub(crate) skip_administration: bool,
}

pub(crate) fn run_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let mut special_items = BTreeMap::new();
    if args.pianos > 0 {
        special_items.insert("piano".to_string(), args.pianos);
    }

    let context = InputContext {
        service_type: args.service,
        move_date: args.move_date.unwrap_or_else(|| Local::now().date_naive()),
        base_price: args.base_price,
        base_labor_cost: args.base_labor_cost,
        total_weight_kg: args.weight_kg,
        total_volume_m3: args.volume_m3,
        distance_km: args.distance_km,
        crew_size: args.crew_size,
        is_weekend: args.weekend,
        is_holiday: args.holiday,
        season: args.season,
        special_items,
        ..InputContext::default()
    };

    let service = build_pricing_service();
    if let Err(err) = seed_rule_set(&service) {
        println!("Starter rules unavailable: {err}");
        return Ok(());
    }

    match service.estimate(&context) {
        Ok(result) => render_estimate(&context, &result),
        Err(err) => println!("Estimate unavailable: {err}"),
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let move_date = args.move_date.unwrap_or_else(|| Local::now().date_naive());

    println!("Move pricing demo");
    let service = build_pricing_service();
    let seeded = match seed_rule_set(&service) {
        Ok(count) => count,
        Err(err) => {
            println!("Starter rules unavailable: {err}");
            return Ok(());
        }
    };
    println!("Loaded {seeded} starter rules");

    let context = InputContext {
        service_type: ServiceType::LocalMove,
        move_date,
        base_price: 1400.0,
        base_labor_cost: 520.0,
        total_weight_kg: 2800.0,
        total_volume_m3: 32.0,
        distance_km: 65.0,
        crew_size: 4,
        is_weekend: true,
        season: SeasonalPeriod::Peak,
        special_items: BTreeMap::from([("piano".to_string(), 1)]),
        pickup_access: AccessProfile {
            floor_level: 4,
            has_elevator: false,
            stairs_count: 48,
            ..AccessProfile::default()
        },
        ..InputContext::default()
    };

    println!("\nWeekend peak-season walk-up with a piano ({move_date})");
    match service.estimate(&context) {
        Ok(result) => render_estimate(&context, &result),
        Err(err) => {
            println!("Estimate unavailable: {err}");
            return Ok(());
        }
    }

    println!("\nDry run: candidate fragile-crating rule (nothing persisted)");
    let candidate = RuleDraft {
        id: RuleId("fragile-crating".to_string()),
        name: "Fragile crating".to_string(),
        description: "Custom crating for bulky fragile loads".to_string(),
        notes: String::new(),
        category: RuleCategory::AdditionalServices,
        priority: 600,
        conditions: vec![Condition {
            field: "totalVolumeM3".to_string(),
            operator: ConditionOperator::Gte,
            value: Some(ConditionValue::Number(30.0)),
            values: None,
        }],
        actions: vec![Action {
            kind: ActionType::AddFixed,
            amount: 180.0,
            target_field: "totalPrice".to_string(),
            description: "crating material and labor".to_string(),
            condition: None,
        }],
        is_active: true,
        applicable_services: BTreeSet::from([ServiceType::LocalMove]),
        effective_date: None,
        expiry_date: None,
    };
    let rule = candidate.into_rule(&Default::default(), chrono::Utc::now());
    let trial = service.test_rule(&rule, Some(context));
    println!(
        "- {} -> matched: {}",
        trial.rule_name,
        if trial.matched { "yes" } else { "no" }
    );
    for trace in &trial.conditions_evaluated {
        println!(
            "  - {} {:?} -> {}",
            trace.condition.field,
            trace.condition.operator,
            if trace.result { "pass" } else { "fail" }
        );
    }
    if let Some(impact) = trial.price_impact {
        println!("  Price impact if adopted: {impact:.2}");
    }
    for error in &trial.errors {
        println!("  Error: {error}");
    }

    if args.skip_administration {
        return Ok(());
    }

    println!("\nRule administration snapshot");
    let actor = Default::default();
    match service.export_rules(&actor) {
        Ok(document) => {
            println!(
                "- Exported {} active rules (format {})",
                document.rules_count, document.version
            );
            for rule in &document.rules {
                println!(
                    "  - {} [{}] priority {} version {}",
                    rule.id,
                    rule.category.label(),
                    rule.priority,
                    rule.version
                );
            }
        }
        Err(err) => println!("- Export unavailable: {err}"),
    }

    if let Ok(entries) = service.rule_history(&RuleId("weekend-surcharge".to_string()), Some(5)) {
        println!("- History for weekend-surcharge ({} entries shown):", entries.len());
        for entry in entries {
            println!(
                "  - {:?} by {} at {}",
                entry.action,
                entry.user_name,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    Ok(())
}

fn render_estimate(context: &InputContext, result: &CalculationResult) {
    println!(
        "Base price {:.2} | base labor {:.2} | {} km | {:.0} kg",
        context.base_price, context.base_labor_cost, context.distance_km, context.total_weight_kg
    );

    if result.applied_rules.is_empty() {
        println!("No rules applied");
    } else {
        println!("Applied rules:");
        for applied in &result.applied_rules {
            println!("- {}: {:+.2}", applied.rule_id, applied.price_impact);
        }
    }

    println!("Totals:");
    for (field, value) in &result.totals {
        println!("- {field}: {value:.2}");
    }

    if !result.metadata.warnings.is_empty() {
        println!("Warnings:");
        for warning in &result.metadata.warnings {
            println!("- {warning}");
        }
    }

    println!("Verification hash: {}", result.metadata.verification_hash);
}
