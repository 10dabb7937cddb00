use super::*;
use crate::config::FeatureConfig;
use crate::controller::catalog::{InMemoryOfferCatalog, Offer};
use crate::controller::clock::MockClock;
use crate::controller::error::EngineError;
use crate::model::{
    ArchivedResult, ContentItem, ExperimentState, MetricExpectation, ObservedMetric, Sample,
    SubjectType, EVERYONE_SEGMENT, MAX_CONTENT_AMOUNT,
};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn fixed_clock() -> Arc<MockClock> {
    Arc::new(MockClock::new(
        Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap(),
    ))
}

fn catalog() -> Arc<InMemoryOfferCatalog> {
    Arc::new(InMemoryOfferCatalog::with_offers(vec![Offer {
        offer_id: "starter_pack".to_string(),
        content: vec![
            ContentItem {
                entity_id: "gems".to_string(),
                amount: 100,
            },
            ContentItem {
                entity_id: "coins".to_string(),
                amount: 5000,
            },
        ],
        price: Some(json!({ "currency": "USD", "amount": 4.99 })),
    }]))
}

fn controller_with(catalog: Arc<InMemoryOfferCatalog>) -> LifecycleController {
    LifecycleController::new(fixed_clock(), FeatureConfig::default(), catalog)
}

fn controller() -> LifecycleController {
    controller_with(catalog())
}

fn samples() -> Vec<Sample> {
    vec![
        Sample {
            timestamp: "2026-05-02T00:00:00.000Z".to_string(),
            control_value: 1.0,
            test_value: 1.2,
        },
        Sample {
            timestamp: "2026-05-03T00:00:00.000Z".to_string(),
            control_value: 1.1,
            test_value: 1.4,
        },
    ]
}

fn running_offer_experiment(ctrl: &LifecycleController) -> crate::model::Experiment {
    let mut exp = ctrl.create();
    ctrl.set_subject_type(&mut exp, 0, SubjectType::Offer).unwrap();
    ctrl.set_subject_id(&mut exp, 0, "starter_pack").unwrap();
    ctrl.add_override_field(&mut exp, 0, "price").unwrap();
    ctrl.start(&mut exp).unwrap();
    exp
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

#[test]
fn test_create_builds_seeded_draft() {
    let ctrl = controller();
    let exp = ctrl.create();

    assert!(!exp.id.is_empty());
    assert_eq!(exp.start_date, "");
    assert!(!exp.paused);
    assert!(!exp.archived);
    assert_eq!(exp.audience.base_segment_id(), EVERYONE_SEGMENT);
    assert_eq!(exp.audience.test, EVERYONE_SEGMENT);
    assert_eq!(exp.audience.test_share, 0.10);
    assert_eq!(exp.change_sets.len(), 1);
    assert_eq!(exp.change_sets[0].subject_type, SubjectType::Entity);
    assert_eq!(exp.change_sets[0].subject_id, "");
    assert!(exp.change_sets[0].overrides.is_empty());
    assert_eq!(exp.state(), ExperimentState::Draft);
    assert!(is_editable(&exp));
}

#[test]
fn test_create_never_reuses_ids() {
    let ctrl = controller();
    let a = ctrl.create();
    let b = ctrl.create();
    assert_ne!(a.id, b.id);
    assert_ne!(a.change_sets[0].id, b.change_sets[0].id);
}

#[test]
fn test_create_seeds_offer_when_entities_disabled() {
    let ctrl = LifecycleController::new(
        fixed_clock(),
        FeatureConfig {
            entities_enabled: false,
            ..FeatureConfig::default()
        },
        catalog(),
    );
    let exp = ctrl.create();
    assert_eq!(exp.change_sets[0].subject_type, SubjectType::Offer);
}

// ---------------------------------------------------------------------------
// Scenario: draft -> share -> start -> locked subject, open overrides
// ---------------------------------------------------------------------------

#[test]
fn test_scenario_share_start_and_locks() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.set_subject_type(&mut exp, 0, SubjectType::Offer).unwrap();
    ctrl.set_subject_id(&mut exp, 0, "starter_pack").unwrap();
    ctrl.add_override_field(&mut exp, 0, "price").unwrap();

    let stored = ctrl.set_share(&mut exp, "5").unwrap();
    assert_eq!(stored, 0.05);
    assert_eq!(exp.audience.test_share, 0.05);

    ctrl.start(&mut exp).unwrap();
    assert_eq!(exp.start_date, "2026-05-01T10:00:00.000Z");
    assert!(!is_editable(&exp));
    assert_eq!(exp.state(), ExperimentState::Running);

    let before = exp.clone();
    let result = ctrl.set_subject_id(&mut exp, 0, "daily_deal");
    assert!(matches!(result, Err(EngineError::InvalidOperation(_))));
    assert_eq!(exp, before, "rejected call must not mutate");

    ctrl.set_override_value(
        &mut exp,
        0,
        "price",
        json!({ "currency": "USD", "amount": 2.99 }),
    )
    .unwrap();
    assert_eq!(
        exp.change_sets[0].overrides.get("price"),
        Some(&json!({ "currency": "USD", "amount": 2.99 }))
    );
}

#[test]
fn test_start_twice_rejected() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.start(&mut exp).unwrap();
    let result = ctrl.start(&mut exp);
    assert!(matches!(result, Err(EngineError::InvalidOperation(_))));
}

#[test]
fn test_start_without_overrides_is_allowed() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    assert!(!exp.has_overrides());
    ctrl.start(&mut exp).unwrap();
    assert!(!exp.start_date.is_empty());
}

#[test]
fn test_start_with_cleared_share_applies_floor() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.clear_share(&mut exp).unwrap();
    assert_eq!(exp.audience.test_share, 0.0);

    ctrl.start(&mut exp).unwrap();
    assert_eq!(exp.audience.test_share, 0.01);
}

#[test]
fn test_audience_locked_after_start() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.start(&mut exp).unwrap();

    assert!(matches!(
        ctrl.set_base_segment(&mut exp, "whales"),
        Err(EngineError::InvalidOperation(_))
    ));
    assert!(matches!(
        ctrl.set_share(&mut exp, "50"),
        Err(EngineError::InvalidOperation(_))
    ));
    assert!(matches!(
        ctrl.set_subject_type(&mut exp, 0, SubjectType::Offer),
        Err(EngineError::InvalidOperation(_))
    ));
    assert!(matches!(
        ctrl.add_change_set(&mut exp),
        Err(EngineError::InvalidOperation(_))
    ));
    assert_eq!(exp.audience.base_segment_id(), EVERYONE_SEGMENT);
    assert_eq!(exp.audience.test_share, 0.10);
}

#[test]
fn test_metadata_editable_while_running() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.start(&mut exp).unwrap();

    ctrl.set_name(&mut exp, "Bigger pack").unwrap();
    ctrl.set_comment(&mut exp, "week 2").unwrap();
    ctrl.set_codename(&mut exp, "bigger_pack").unwrap();
    ctrl.set_observed_metrics(
        &mut exp,
        vec![ObservedMetric {
            metric_id: "arpdau".to_string(),
            expectation: MetricExpectation::Increase,
        }],
    )
    .unwrap();

    assert_eq!(exp.name, "Bigger pack");
    assert_eq!(exp.comment, "week 2");
    assert_eq!(exp.codename, "bigger_pack");
    assert_eq!(exp.observed_metrics.len(), 1);
}

// ---------------------------------------------------------------------------
// Pause / resume
// ---------------------------------------------------------------------------

#[test]
fn test_set_paused_is_idempotent() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.start(&mut exp).unwrap();

    ctrl.set_paused(&mut exp, true).unwrap();
    let once = exp.clone();
    ctrl.set_paused(&mut exp, true).unwrap();
    assert_eq!(exp, once);
    assert_eq!(exp.state(), ExperimentState::Paused);

    ctrl.set_paused(&mut exp, false).unwrap();
    assert_eq!(exp.state(), ExperimentState::Running);
}

#[test]
fn test_pause_draft_rejected() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    assert!(matches!(
        ctrl.set_paused(&mut exp, true),
        Err(EngineError::InvalidOperation(_))
    ));
    assert!(!exp.paused);
}

#[test]
fn test_pause_does_not_restore_editability() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.start(&mut exp).unwrap();
    ctrl.set_paused(&mut exp, true).unwrap();
    assert!(!is_editable(&exp));
    ctrl.set_paused(&mut exp, false).unwrap();
    assert!(!is_editable(&exp));
}

// ---------------------------------------------------------------------------
// Archive / delete
// ---------------------------------------------------------------------------

#[test]
fn test_scenario_archive_is_terminal() {
    let ctrl = controller();
    let mut exp = running_offer_experiment(&ctrl);

    ctrl.stop_and_archive(&mut exp, ArchivedResult::Success, samples())
        .unwrap();
    assert!(exp.archived);
    assert!(!exp.removed);
    assert_eq!(exp.archived_result, ArchivedResult::Success);
    assert_eq!(exp.archived_samples, samples());

    assert!(matches!(
        ctrl.start(&mut exp),
        Err(EngineError::InvalidOperation(_))
    ));
    assert!(matches!(
        ctrl.set_paused(&mut exp, true),
        Err(EngineError::InvalidOperation(_))
    ));
    assert!(matches!(
        ctrl.set_paused(&mut exp, false),
        Err(EngineError::InvalidOperation(_))
    ));
    assert!(matches!(
        ctrl.stop_and_delete(&mut exp),
        Err(EngineError::InvalidOperation(_))
    ));
    assert!(matches!(
        ctrl.stop_and_archive(&mut exp, ArchivedResult::Failure, vec![]),
        Err(EngineError::InvalidOperation(_))
    ));
    assert_eq!(exp.archived_result, ArchivedResult::Success);
    assert_eq!(exp.archived_samples.len(), 2);
}

#[test]
fn test_archived_experiment_rejects_edits_except_result() {
    let ctrl = controller();
    let mut exp = running_offer_experiment(&ctrl);
    ctrl.stop_and_archive(&mut exp, ArchivedResult::Failure, vec![])
        .unwrap();

    assert!(matches!(
        ctrl.set_name(&mut exp, "renamed"),
        Err(EngineError::InvalidOperation(_))
    ));
    assert!(matches!(
        ctrl.set_override_value(&mut exp, 0, "price", json!(1)),
        Err(EngineError::InvalidOperation(_))
    ));

    ctrl.set_archived_result(&mut exp, ArchivedResult::Success)
        .unwrap();
    assert_eq!(exp.archived_result, ArchivedResult::Success);
}

#[test]
fn test_archive_draft_rejected() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    assert!(matches!(
        ctrl.stop_and_archive(&mut exp, ArchivedResult::Success, vec![]),
        Err(EngineError::InvalidOperation(_))
    ));
    assert!(!exp.archived);
}

#[test]
fn test_archive_requires_result() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.start(&mut exp).unwrap();
    assert!(matches!(
        ctrl.stop_and_archive(&mut exp, ArchivedResult::Unset, vec![]),
        Err(EngineError::Validation(_))
    ));
    assert!(!exp.archived);
}

#[test]
fn test_delete_draft_marks_removed() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.stop_and_delete(&mut exp).unwrap();
    assert!(exp.removed);
}

#[test]
fn test_delete_running_drops_history() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.start(&mut exp).unwrap();
    exp.archived_samples = samples();

    ctrl.stop_and_delete(&mut exp).unwrap();
    assert!(!exp.removed);
    assert!(exp.archived_samples.is_empty());
}

// ---------------------------------------------------------------------------
// ChangeSets
// ---------------------------------------------------------------------------

#[test]
fn test_scenario_remove_only_change_set_rejected() {
    let ctrl = controller();
    let mut exp = ctrl.create();

    let result = ctrl.remove_change_set(&mut exp, 0);
    assert!(matches!(result, Err(EngineError::InvalidOperation(_))));
    assert_eq!(exp.change_sets.len(), 1);
}

#[test]
fn test_add_and_remove_change_sets() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    let first_id = exp.change_sets[0].id.clone();

    let index = ctrl.add_change_set(&mut exp).unwrap();
    assert_eq!(index, 1);
    assert_eq!(exp.change_sets.len(), 2);
    assert_eq!(exp.change_sets[1].subject_type, SubjectType::Entity);

    let removed = ctrl.remove_change_set(&mut exp, 0).unwrap();
    assert_eq!(removed.id, first_id);
    assert_eq!(exp.change_sets.len(), 1);
    assert!(exp.change_set(&first_id).is_none());
    assert_eq!(exp.change_set_index(&first_id), None);
}

#[test]
fn test_remove_change_set_out_of_range() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.add_change_set(&mut exp).unwrap();
    assert!(matches!(
        ctrl.remove_change_set(&mut exp, 5),
        Err(EngineError::ChangeSetOutOfRange { index: 5, len: 2 })
    ));
}

#[test]
fn test_change_sets_never_empty_after_any_removal_sequence() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    for _ in 0..3 {
        ctrl.add_change_set(&mut exp).unwrap();
    }
    for _ in 0..10 {
        let _ = ctrl.remove_change_set(&mut exp, 0);
        assert!(!exp.change_sets.is_empty());
    }
    assert_eq!(exp.change_sets.len(), 1);
}

#[test]
fn test_subject_change_clears_overrides() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.set_subject_type(&mut exp, 0, SubjectType::Offer).unwrap();
    ctrl.set_subject_id(&mut exp, 0, "starter_pack").unwrap();
    ctrl.add_override_field(&mut exp, 0, "icon").unwrap();

    // Same subject again is a no-op
    ctrl.set_subject_id(&mut exp, 0, "starter_pack").unwrap();
    assert!(exp.change_sets[0].overrides.is_overridden("icon"));

    ctrl.set_subject_id(&mut exp, 0, "daily_deal").unwrap();
    assert!(exp.change_sets[0].overrides.is_empty());

    ctrl.add_override_field(&mut exp, 0, "icon").unwrap();
    ctrl.set_subject_type(&mut exp, 0, SubjectType::Entity).unwrap();
    assert_eq!(exp.change_sets[0].subject_id, "");
    assert!(exp.change_sets[0].overrides.is_empty());
}

#[test]
fn test_disabled_subject_type_rejected() {
    let ctrl = LifecycleController::new(
        fixed_clock(),
        FeatureConfig {
            offers_enabled: false,
            ..FeatureConfig::default()
        },
        catalog(),
    );
    let mut exp = ctrl.create();
    assert!(matches!(
        ctrl.set_subject_type(&mut exp, 0, SubjectType::Offer),
        Err(EngineError::InvalidOperation(_))
    ));
}

#[test]
fn test_offer_override_keys_limited_and_unique() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.set_subject_type(&mut exp, 0, SubjectType::Offer).unwrap();
    ctrl.set_subject_id(&mut exp, 0, "starter_pack").unwrap();

    assert!(matches!(
        ctrl.add_override_field(&mut exp, 0, "title"),
        Err(EngineError::Validation(_))
    ));

    ctrl.add_override_field(&mut exp, 0, "icon").unwrap();
    ctrl.add_override_field(&mut exp, 0, "price").unwrap();
    ctrl.add_override_field(&mut exp, 0, "content").unwrap();
    assert!(matches!(
        ctrl.add_override_field(&mut exp, 0, "icon"),
        Err(EngineError::InvalidOperation(_))
    ));

    let overrides = &exp.change_sets[0].overrides;
    assert_eq!(overrides.len(), 3);
    assert_eq!(overrides.get("icon"), Some(&json!("")));
    assert_eq!(
        overrides.get("price"),
        Some(&json!({ "currency": "USD", "amount": 4.99 }))
    );
}

#[test]
fn test_content_override_is_a_snapshot_of_the_catalog() {
    let catalog = catalog();
    let ctrl = controller_with(catalog.clone());
    let mut exp = ctrl.create();
    ctrl.set_subject_type(&mut exp, 0, SubjectType::Offer).unwrap();
    ctrl.set_subject_id(&mut exp, 0, "starter_pack").unwrap();
    ctrl.add_override_field(&mut exp, 0, "content").unwrap();

    // The catalog changes after the override was defined
    catalog.upsert(Offer {
        offer_id: "starter_pack".to_string(),
        content: vec![ContentItem {
            entity_id: "gems".to_string(),
            amount: 1,
        }],
        price: None,
    });

    let content = exp.change_sets[0].overrides.content().unwrap();
    assert_eq!(content.len(), 2);
    assert_eq!(content[0].entity_id, "gems");
    assert_eq!(content[0].amount, 100);
    assert_eq!(content[1].amount, 5000);
}

#[test]
fn test_entity_overrides_accept_any_config_key() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.set_subject_id(&mut exp, 0, "economy/shop").unwrap();
    ctrl.add_override_field(&mut exp, 0, "discount_enabled")
        .unwrap();

    // Presence with a null seed still counts as overridden
    assert!(exp.change_sets[0]
        .overrides
        .is_overridden("discount_enabled"));

    ctrl.set_override_value(&mut exp, 0, "discount_enabled", json!(false))
        .unwrap();
    assert_eq!(
        exp.change_sets[0].overrides.get("discount_enabled"),
        Some(&json!(false))
    );
}

#[test]
fn test_remove_override_field_keeps_others() {
    let ctrl = controller();
    let mut exp = running_offer_experiment(&ctrl);
    ctrl.add_override_field(&mut exp, 0, "icon").unwrap();

    ctrl.remove_override_field(&mut exp, 0, "price").unwrap();
    let overrides = &exp.change_sets[0].overrides;
    assert!(!overrides.is_overridden("price"));
    assert!(overrides.is_overridden("icon"));

    assert!(matches!(
        ctrl.remove_override_field(&mut exp, 0, "price"),
        Err(EngineError::InvalidOperation(_))
    ));
}

#[test]
fn test_set_value_requires_overridden_field() {
    let ctrl = controller();
    let mut exp = running_offer_experiment(&ctrl);
    assert!(matches!(
        ctrl.set_override_value(&mut exp, 0, "icon", json!("new.png")),
        Err(EngineError::InvalidOperation(_))
    ));
}

#[test]
fn test_content_amounts_sanitized_on_set() {
    let ctrl = controller();
    let mut exp = running_offer_experiment(&ctrl);
    ctrl.add_override_field(&mut exp, 0, "content").unwrap();

    ctrl.set_override_value(
        &mut exp,
        0,
        "content",
        json!([
            { "entityID": "gems", "amount": "1,500 gems" },
            { "entityID": "coins", "amount": 0 },
            { "entityID": "keys", "amount": -4 },
            { "entityID": "tickets", "amount": 2.7 },
            { "entityID": "stars", "amount": "99999999999999999999999" }
        ]),
    )
    .unwrap();

    let amounts: Vec<u64> = exp.change_sets[0]
        .overrides
        .content()
        .unwrap()
        .into_iter()
        .map(|item| item.amount)
        .collect();
    assert_eq!(amounts, vec![1500, 1, 1, 2, MAX_CONTENT_AMOUNT]);
}

#[test]
fn test_malformed_content_rejected() {
    let ctrl = controller();
    let mut exp = running_offer_experiment(&ctrl);
    ctrl.add_override_field(&mut exp, 0, "content").unwrap();
    let before = exp.clone();

    assert!(matches!(
        ctrl.set_override_value(&mut exp, 0, "content", json!("lots")),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        ctrl.set_override_value(&mut exp, 0, "content", json!([{ "amount": 3 }])),
        Err(EngineError::Validation(_))
    ));
    assert_eq!(exp, before);
}

#[test]
fn test_icon_must_be_string() {
    let ctrl = controller();
    let mut exp = running_offer_experiment(&ctrl);
    ctrl.add_override_field(&mut exp, 0, "icon").unwrap();
    assert!(matches!(
        ctrl.set_override_value(&mut exp, 0, "icon", json!(42)),
        Err(EngineError::Validation(_))
    ));
    ctrl.set_override_value(&mut exp, 0, "icon", json!("icons/pack_v2.png"))
        .unwrap();
}

// ---------------------------------------------------------------------------
// Traffic allocation
// ---------------------------------------------------------------------------

#[test]
fn test_set_base_segment_writes_both_references() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    ctrl.set_share(&mut exp, "25").unwrap();
    ctrl.set_base_segment(&mut exp, "whales").unwrap();

    assert_eq!(exp.audience.control, "whales");
    assert_eq!(exp.audience.test, "whales");
    assert_eq!(exp.audience.test_share, 0.25);
    assert!(matches!(
        ctrl.set_base_segment(&mut exp, "  "),
        Err(EngineError::Validation(_))
    ));
}

#[test]
fn test_share_input_handling() {
    assert_eq!(share_from_input("10"), 0.1);
    assert_eq!(share_from_input("10%"), 0.1);
    assert_eq!(share_from_input(" 100 "), 1.0);
    assert_eq!(share_from_input("250"), 1.0);
    assert_eq!(share_from_input("0"), 0.01);
    assert_eq!(share_from_input("-3"), 0.01);
    // Non-empty garbage clamps to the floor, never to 0
    assert_eq!(share_from_input("abc"), 0.01);
    assert_eq!(share_from_input("NaN"), 0.01);
    assert_eq!(share_from_input("inf"), 0.01);
    // Only the explicit clear path yields 0
    assert_eq!(share_from_input(""), 0.0);
    assert_eq!(share_from_input("   "), 0.0);
}

#[test]
fn test_set_share_invalid_input_clamps_to_floor() {
    let ctrl = controller();
    let mut exp = ctrl.create();
    let stored = ctrl.set_share(&mut exp, "abc").unwrap();
    assert_eq!(stored, 0.01);
    assert_eq!(exp.audience.test_share, 0.01);

    ctrl.set_share(&mut exp, "").unwrap();
    assert_eq!(exp.audience.test_share, 0.0);
}

#[test]
fn test_display_share() {
    assert_eq!(display_share(0.0), "");
    assert_eq!(display_share(0.05), "5");
    assert_eq!(display_share(0.1), "10");
    assert_eq!(display_share(0.125), "12.5");
    assert_eq!(display_share(1.0), "100");
}

#[test]
fn test_normalize_audience() {
    let mut legacy = crate::model::Audience {
        control: "whales".to_string(),
        test: "minnows".to_string(),
        test_share: 3.0,
    };
    assert!(normalize_audience(&mut legacy));
    assert_eq!(legacy.test, "whales");
    assert_eq!(legacy.test_share, 1.0);

    let mut cleared = crate::model::Audience::new("everyone", 0.0);
    assert!(!normalize_audience(&mut cleared));
    assert_eq!(cleared.test_share, 0.0);
}

#[test]
fn test_sanitize_codename() {
    assert_eq!(sanitize_codename("bigger_pack"), "bigger_pack");
    assert_eq!(sanitize_codename(" Bigger pack v2! "), "Bigger_pack_v2");
    assert_eq!(sanitize_codename("ünïcode-ok"), "ncode-ok");
}

#[test]
fn test_sanitize_content_amount() {
    assert_eq!(sanitize_content_amount("42"), 42);
    assert_eq!(sanitize_content_amount("4a2"), 42);
    assert_eq!(sanitize_content_amount(""), 1);
    assert_eq!(sanitize_content_amount("none"), 1);
    assert_eq!(sanitize_content_amount("0"), 1);
    assert_eq!(
        sanitize_content_amount("9007199254740992"),
        MAX_CONTENT_AMOUNT
    );
}

proptest! {
    #[test]
    fn prop_share_always_within_bounds_for_non_empty_input(raw in "\\PC+") {
        prop_assume!(!raw.trim().trim_end_matches('%').trim().is_empty());
        let share = share_from_input(&raw);
        prop_assert!((0.01..=1.0).contains(&share));
    }

    #[test]
    fn prop_numeric_share_clamped(percent in proptest::num::f64::ANY) {
        let share = share_from_input(&percent.to_string());
        prop_assert!((0.01..=1.0).contains(&share));
    }

    #[test]
    fn prop_content_amount_within_bounds(raw in ".*") {
        let amount = sanitize_content_amount(&raw);
        prop_assert!((1..=MAX_CONTENT_AMOUNT).contains(&amount));
    }

    #[test]
    fn prop_editability_flips_only_on_start(pauses in proptest::collection::vec(any::<bool>(), 0..8)) {
        let ctrl = controller();
        let mut exp = ctrl.create();
        prop_assert!(is_editable(&exp));
        ctrl.start(&mut exp).unwrap();
        for paused in pauses {
            ctrl.set_paused(&mut exp, paused).unwrap();
            prop_assert!(!is_editable(&exp));
        }
        ctrl.stop_and_archive(&mut exp, ArchivedResult::Success, vec![]).unwrap();
        prop_assert!(!is_editable(&exp));
    }
}
