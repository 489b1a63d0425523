//! End-to-end engine tests: suggestion → registration → relocation.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use foundkeep::config::StorageConfig;
use foundkeep::counter::MemoryCounterStore;
use foundkeep::matcher::Matcher;
use foundkeep::models::{ClassificationQuery, RankMode};
use foundkeep::register::{Registrar, RegistrationRequest};
use foundkeep::relocate::{relocate, RelocationPolicy};
use foundkeep::taxonomy::Taxonomy;

const TAXONOMY: &str = r#"[
    {
        "large_category_name_ja": "雨具",
        "medium_categories": [
            {"medium_category_name_ja": "傘", "priority": 80, "keywords": [
                {"term": "傘", "weight": 1.0},
                {"term": "折り畳み傘", "weight": 1.2}
            ]}
        ]
    },
    {
        "large_category_name_ja": "貴重品",
        "medium_categories": [
            {"medium_category_name_ja": "財布", "priority": 90, "keywords": [
                {"term": "財布", "weight": 1.0}
            ]},
            {"medium_category_name_ja": "スマートフォン", "priority": 90, "keywords": [
                {"term": "スマホ", "weight": 1.0},
                {"term": "携帯電話", "weight": 1.0}
            ]}
        ]
    },
    {
        "large_category_name_ja": "その他",
        "medium_categories": [
            {"medium_category_name_ja": "食品類", "priority": 10, "keywords": [
                {"term": "食品", "weight": 1.0}
            ]}
        ]
    }
]"#;

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

fn registrar() -> Registrar {
    Registrar::new(
        &StorageConfig::default(),
        Arc::new(MemoryCounterStore::new()),
    )
}

fn request(facility: &str) -> RegistrationRequest {
    RegistrationRequest {
        facility_id: facility.to_string(),
        found_at: at(2025, 6, 20, 13, 30),
        accepted_at: at(2025, 6, 20, 14, 7),
        category_large: "貴重品".to_string(),
        category_medium: "財布".to_string(),
        name: "財布".to_string(),
        features: "黒い二つ折り".to_string(),
        color: "黒".to_string(),
        claims_ownership: false,
        claims_reward: false,
        is_food: None,
        is_umbrella: None,
    }
}

/// "黒い折り畳み傘" suggests 傘 first; the umbrella then lands in the
/// umbrella slot for its found date.
#[tokio::test]
async fn umbrella_scenario_end_to_end() {
    let taxonomy = Taxonomy::from_json(TAXONOMY).unwrap();
    let matcher = Matcher::keyword_only();

    let query = ClassificationQuery {
        features: "黒い折り畳み傘".to_string(),
        ..Default::default()
    };
    let (suggestions, mode) = matcher.suggest(&taxonomy, &query, 5).await.unwrap();
    assert_eq!(mode, RankMode::Keyword);
    assert_eq!(suggestions[0].medium_label, "傘");
    assert_eq!(suggestions[0].score, 1.0);

    let reg = registrar();
    let mut req = request("F1");
    req.category_large = "雨具".to_string();
    req.category_medium = suggestions[0].medium_label.clone();
    req.name = "折り畳み傘".to_string();
    req.features = "黒い折り畳み傘".to_string();

    let outcome = reg.register(&req).unwrap();
    assert_eq!(outcome.item.storage_location, "25-06-20-umb");
}

/// The 21st default-routed item of the day lands in box 02, and the
/// third registration of the hour gets sequence 03.
#[test]
fn box_rollover_and_hour_sequence_scenarios() {
    let reg = registrar();

    let mut last = None;
    for i in 0..21 {
        let mut req = request("F1");
        req.accepted_at = at(2025, 6, 20, 14, (i % 60) as u32);
        last = Some(reg.register(&req).unwrap());
    }
    let last = last.unwrap();
    assert_eq!(last.item.storage_location, "25-06-20-02");

    // 21 registrations happened in hour 14; the next is sequence 22.
    let next = reg.register(&request("F1")).unwrap();
    assert!(next.item.item_id.starts_with("25-06-20-14-"));

    // A fresh facility: third registration that hour is -03.
    let reg2 = registrar();
    reg2.register(&request("F2")).unwrap();
    reg2.register(&request("F2")).unwrap();
    let third = reg2.register(&request("F2")).unwrap();
    assert_eq!(third.item.item_id, "25-06-20-14-03");
}

/// Priority ordering: ownership claim beats both the umbrella category
/// and a food marker in the feature text.
#[test]
fn ownership_always_wins() {
    let reg = registrar();
    let mut req = request("F1");
    req.category_medium = "傘".to_string();
    req.features = "冷凍食品の傘".to_string();
    req.claims_ownership = true;

    let outcome = reg.register(&req).unwrap();
    assert_eq!(outcome.item.storage_location, "25-06-20-所有権主張");

    // And the claim consumed no default-box capacity.
    let plain = reg.register(&request("F1")).unwrap();
    assert_eq!(plain.item.storage_location, "25-06-20-01");
}

/// Concurrent registrations for one facility-hour: sequence numbers are
/// exactly {1..N}, and every default box number is consistent with the
/// 20-per-box rollover.
#[test]
fn concurrent_registrations_are_gapless() {
    let reg = Arc::new(registrar());
    let mut handles = Vec::new();
    for _ in 0..10 {
        let reg = Arc::clone(&reg);
        handles.push(std::thread::spawn(move || {
            (0..10)
                .map(|_| reg.register(&request("F1")).unwrap().item)
                .collect::<Vec<_>>()
        }));
    }
    let items: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let mut seqs: Vec<u32> = items
        .iter()
        .map(|i| i.item_id.rsplit('-').next().unwrap().parse().unwrap())
        .collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=100).collect::<Vec<u32>>());

    let mut boxes: Vec<u32> = items
        .iter()
        .map(|i| {
            i.storage_location
                .rsplit('-')
                .next()
                .unwrap()
                .parse()
                .unwrap()
        })
        .collect();
    boxes.sort_unstable();
    // 100 default items at 20 per box: exactly 20 each of boxes 1..=5.
    for b in 1..=5u32 {
        assert_eq!(boxes.iter().filter(|&&x| x == b).count(), 20);
    }
}

/// Registration then relocation: after the dwell period the default
/// slot becomes found-date + doubled box number, exempt slots stay, and
/// a second run is a no-op.
#[test]
fn relocation_round_trip_is_idempotent() {
    let reg = registrar();

    let wallet = reg.register(&request("F1")).unwrap().item;
    assert_eq!(wallet.storage_location, "25-06-20-01");

    let mut umb_req = request("F1");
    umb_req.category_medium = "傘".to_string();
    let umbrella = reg.register(&umb_req).unwrap().item;

    let mut items = vec![wallet, umbrella];
    let policy = RelocationPolicy::default();
    let as_of = at(2025, 6, 30, 9, 0);

    let report = relocate(&items, as_of, &policy);
    assert_eq!(report.moved.len(), 1);
    assert_eq!(report.moved[0].new_location, "25-06-20-01-01");
    assert_eq!(report.skipped_exempt, 1);

    for m in &report.moved {
        let item = items.iter_mut().find(|i| i.item_id == m.item_id).unwrap();
        item.storage_location = m.new_location.clone();
    }

    let second = relocate(&items, as_of, &policy);
    assert!(second.moved.is_empty());
    assert_eq!(second.skipped_already, 1);
    assert_eq!(second.skipped_exempt, 1);
}

/// Keyword fallback: with no embedding model at all, a query equal to a
/// category keyword still ranks that category first at score 1.0.
#[tokio::test]
async fn keyword_fallback_exact_match() {
    let taxonomy = Taxonomy::from_json(TAXONOMY).unwrap();
    let matcher = Matcher::keyword_only();

    for (text, expected) in [("傘", "傘"), ("財布", "財布"), ("スマホ", "スマートフォン")] {
        let query = ClassificationQuery {
            name: text.to_string(),
            ..Default::default()
        };
        let (suggestions, _) = matcher.suggest(&taxonomy, &query, 3).await.unwrap();
        assert_eq!(suggestions[0].medium_label, expected, "query {:?}", text);
        assert_eq!(suggestions[0].score, 1.0);
    }
}

/// Items in serialized form survive a register → serialize → relocate
/// round trip (the CLI's file hand-off).
#[test]
fn item_records_round_trip_through_json() {
    let reg = registrar();
    let item = reg.register(&request("F1")).unwrap().item;

    let json = serde_json::to_string(&vec![item]).unwrap();
    let parsed: Vec<foundkeep::models::Item> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed[0].storage_location, "25-06-20-01");
    assert_eq!(parsed[0].item_id, "25-06-20-14-01");

    let report = relocate(&parsed, at(2025, 7, 1, 0, 0), &RelocationPolicy::default());
    assert_eq!(report.moved[0].new_location, "25-06-20-01-01");
}
