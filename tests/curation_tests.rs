//! Override engine integration: dynamic filters, pinning, hiding, grouping.

mod common;

use serde_json::json;

use findex::{Field, FieldType, Override, SearchParams, Synonym};

use common::{core, seed_products, seed_titles};

fn parse_override(id: &str, json: &serde_json::Value) -> Override {
    Override::parse(id, json).unwrap()
}

#[test]
fn test_dynamic_filtering_contains_with_token_removal() {
    let core = core();
    seed_products(&core);

    core.add_override(
        "products",
        parse_override(
            "brand-category",
            &json!({
                "rule": {"query": "{brand} {category}", "match": "contains"},
                "remove_matched_tokens": true,
                "filter_by": "category: {category} && brand: {brand}",
            }),
        ),
    )
    .unwrap();

    let params = SearchParams::new("adidas shoes", &["name", "category", "brand"])
        .with_sort("_text_match", "DESC")
        .with_sort("points", "DESC");
    let res = core.search("products", &params).unwrap();

    assert_eq!(res.hit_ids(), vec!["1"]);
}

#[test]
fn test_dynamic_filtering_exact_match_basics() {
    let core = core();
    seed_products(&core);

    core.add_override(
        "products",
        parse_override(
            "dynamic-cat-filter",
            &json!({
                "rule": {"query": "{category}", "match": "exact"},
                "remove_matched_tokens": true,
                "filter_by": "category: {category}",
            }),
        ),
    )
    .unwrap();

    let params = SearchParams::new("shoes", &["name", "category", "brand"])
        .with_sort("_text_match", "DESC")
        .with_sort("points", "DESC");
    let res = core.search("products", &params).unwrap();

    // filter keeps the two category=shoes docs; points break the tie
    assert_eq!(res.hit_ids(), vec!["1", "0"]);

    // a two-token query cannot exact-match the one-token rule
    let params = SearchParams::new("running shoes", &["name", "category", "brand"])
        .with_sort("_text_match", "DESC")
        .with_sort("points", "DESC");
    let res = core.search("products", &params).unwrap();
    assert_eq!(res.found, 3);
}

#[test]
fn test_dynamic_filtering_missing_field_rule_does_not_apply() {
    let core = core();
    seed_products(&core);

    core.add_override(
        "products",
        parse_override(
            "bad-placeholder",
            &json!({
                "rule": {"query": "{categories}", "match": "exact"},
                "remove_matched_tokens": true,
                "filter_by": "category: {categories}",
            }),
        ),
    )
    .unwrap();

    let params = SearchParams::new("shoes", &["name", "category"])
        .with_sort("_text_match", "DESC")
        .with_sort("points", "DESC");
    let res = core.search("products", &params).unwrap();

    // the rule must not mutate the query or the filter
    assert_eq!(res.found, 3);
}

#[test]
fn test_dynamic_filtering_through_synonyms() {
    let core = core();

    core.create_collection(
        "products",
        vec![
            Field::new("name", FieldType::String),
            Field::new("category", FieldType::String).faceted(),
            Field::new("brand", FieldType::String).faceted(),
            Field::new("points", FieldType::Int32),
        ],
        Some("points"),
    )
    .unwrap();

    let docs = [
        json!({"id": "0", "name": "Amazing Shoes", "category": "shoes", "brand": "Nike", "points": 3}),
        json!({"id": "1", "name": "Exciting Track Gym", "category": "shoes", "brand": "Adidas", "points": 5}),
        json!({"id": "2", "name": "Amazing Sneakers", "category": "sneakers", "brand": "Adidas", "points": 4}),
    ];
    for doc in docs {
        core.add_document("products", doc).unwrap();
    }

    core.add_synonym("products", Synonym::one_way("sneakers-shoes", "sneakers", &["shoes"]))
        .unwrap();
    core.add_synonym("products", Synonym::one_way("boots-shoes", "boots", &["shoes"]))
        .unwrap();

    core.add_override(
        "products",
        parse_override(
            "dynamic-filters",
            &json!({
                "rule": {"query": "{ category }", "match": "exact"},
                "filter_by": "category: {category}",
            }),
        ),
    )
    .unwrap();

    let sorted = |q: &str| {
        SearchParams::new(q, &["name", "category", "brand"])
            .with_sort("_text_match", "DESC")
            .with_sort("points", "DESC")
    };

    // direct value binds directly
    let res = core.search("products", &sorted("sneakers")).unwrap();
    assert_eq!(res.hit_ids(), vec!["2"]);

    // "boots" is not an indexed category value, but its synonym "shoes" is
    let res = core.search("products", &sorted("boots")).unwrap();
    assert_eq!(res.hit_ids(), vec!["1", "0"]);
}

#[test]
fn test_static_filter_with_and_without_query_mutation() {
    let core = core();
    seed_products(&core);

    core.add_override(
        "products",
        parse_override(
            "static-no-mutation",
            &json!({
                "rule": {"query": "shoes", "match": "contains"},
                "remove_matched_tokens": false,
                "filter_by": "points: [5, 3]",
            }),
        ),
    )
    .unwrap();

    // query untouched: only docs matching "amazing shoes" AND the filter
    let mut params = SearchParams::new("amazing shoes", &["name"])
        .with_sort("_text_match", "DESC")
        .with_sort("points", "DESC");
    params.drop_tokens_threshold = 0;
    let res = core.search("products", &params).unwrap();
    assert_eq!(res.hit_ids(), vec!["0"]);

    core.remove_override("products", "static-no-mutation").unwrap();
    core.add_override(
        "products",
        parse_override(
            "static-with-mutation",
            &json!({
                "rule": {"query": "exciting", "match": "contains"},
                "remove_matched_tokens": true,
                "filter_by": "points: [5, 4]",
            }),
        ),
    )
    .unwrap();

    // "exciting" is removed, leaving a wildcard over the filter
    let params = SearchParams::new("exciting", &["name"])
        .with_sort("_text_match", "DESC")
        .with_sort("points", "DESC");
    let res = core.search("products", &params).unwrap();
    assert_eq!(res.hit_ids(), vec!["1", "2"]);
}

#[test]
fn test_rule_include_and_exclude_lists() {
    let core = core();
    seed_products(&core);

    core.add_override(
        "products",
        parse_override(
            "curated",
            &json!({
                "rule": {"query": "shoes", "match": "contains"},
                "includes": [{"id": "2", "position": 1}],
                "excludes": [{"id": "0"}],
            }),
        ),
    )
    .unwrap();

    let params = SearchParams::new("shoes", &["name", "category"])
        .with_sort("_text_match", "DESC")
        .with_sort("points", "DESC");
    let res = core.search("products", &params).unwrap();

    assert_eq!(res.hit_ids(), vec!["2", "1"]);
    assert_eq!(res.found, 2);
    assert_eq!(res.hits[0].curated, Some(true));
    assert_eq!(res.hits[1].curated, None);
}

#[test]
fn test_enable_overrides_false_keeps_caller_pins() {
    let core = core();
    seed_products(&core);

    core.add_override(
        "products",
        parse_override(
            "curated",
            &json!({
                "rule": {"query": "shoes", "match": "contains"},
                "excludes": [{"id": "0"}],
            }),
        ),
    )
    .unwrap();

    let mut params = SearchParams::new("shoes", &["name", "category"])
        .with_sort("_text_match", "DESC")
        .with_sort("points", "DESC");
    params.enable_overrides = false;
    params.pinned_hits = vec![("2".to_string(), 1)];

    let res = core.search("products", &params).unwrap();
    // the rule's exclusion is disabled, the caller's pin still applies
    assert_eq!(res.hits[0].doc_id(), "2");
    assert_eq!(res.found, 3);
}

#[test]
fn test_caller_pins_take_precedence_over_rule_excludes() {
    let core = core();
    seed_products(&core);

    core.add_override(
        "products",
        parse_override(
            "curated",
            &json!({
                "rule": {"query": "shoes", "match": "contains"},
                "excludes": [{"id": "1"}],
            }),
        ),
    )
    .unwrap();

    let mut params = SearchParams::new("shoes", &["name", "category"])
        .with_sort("_text_match", "DESC")
        .with_sort("points", "DESC");
    params.pinned_hits = vec![("1".to_string(), 1)];

    let res = core.search("products", &params).unwrap();
    assert_eq!(res.hits[0].doc_id(), "1");
}

#[test]
fn test_pinned_hits_across_pages() {
    let core = core();
    seed_titles(&core, 311);

    let mut params = SearchParams::new("*", &[]).with_page(11, 30);
    params.pinned_hits = SearchParams::parse_pinned_hits("7:1,4:2");

    let res = core.search("titles", &params).unwrap();

    assert_eq!(res.found, 311);
    assert_eq!(
        res.hit_ids(),
        vec!["12", "11", "10", "9", "8", "6", "5", "3", "2", "1", "0"]
    );

    // pages 1..=10 never contain 7 or 4 outside their pinned slots
    let mut params = SearchParams::new("*", &[]).with_page(1, 30);
    params.pinned_hits = SearchParams::parse_pinned_hits("7:1,4:2");
    let res = core.search("titles", &params).unwrap();
    assert_eq!(res.hits[0].doc_id(), "7");
    assert_eq!(res.hits[1].doc_id(), "4");
    assert_eq!(res.hits[2].doc_id(), "310");
}

#[test]
fn test_pinned_pagination_property() {
    let core = core();
    seed_titles(&core, 10);

    let mut params = SearchParams::new("*", &[]).with_page(1, 2);
    params.pinned_hits = SearchParams::parse_pinned_hits("8:1,5:2,3:3");
    let res = core.search("titles", &params).unwrap();
    assert_eq!(res.hit_ids(), vec!["8", "5"]);

    let mut params = SearchParams::new("*", &[]).with_page(2, 2);
    params.pinned_hits = SearchParams::parse_pinned_hits("8:1,5:2,3:3");
    let res = core.search("titles", &params).unwrap();
    assert_eq!(res.hits[0].doc_id(), "3");
}

#[test]
fn test_pinned_hits_force_included_when_not_matching() {
    let core = core();
    seed_titles(&core, 20);

    let mut params = SearchParams::new("notfoundquery", &["title"]);
    params.num_typos = vec![0];
    params.pinned_hits = SearchParams::parse_pinned_hits("6:1,1:2,11:5");

    let res = core.search("titles", &params).unwrap();
    assert_eq!(res.found, 3);
    assert_eq!(res.hit_ids(), vec!["6", "1", "11"]);
}

#[test]
fn test_pinned_position_beyond_results_appends() {
    let core = core();
    seed_titles(&core, 3);

    let mut params = SearchParams::new("*", &[]);
    params.pinned_hits = SearchParams::parse_pinned_hits("0:9");

    let res = core.search("titles", &params).unwrap();
    assert_eq!(res.hit_ids(), vec!["2", "1", "0"]);
}

#[test]
fn test_same_position_pins_without_grouping_keep_first() {
    let core = core();
    seed_titles(&core, 6);

    let mut params = SearchParams::new("*", &[]);
    params.pinned_hits = SearchParams::parse_pinned_hits("2:1,0:1");

    let res = core.search("titles", &params).unwrap();
    // only "2" is pinned; "0" keeps its natural (last) rank
    assert_eq!(res.hit_ids(), vec!["2", "5", "4", "3", "1", "0"]);
}

#[test]
fn test_hidden_hits_decrease_found() {
    let core = core();
    seed_titles(&core, 5);

    let baseline = core.search("titles", &SearchParams::new("*", &[])).unwrap();
    assert_eq!(baseline.found, 5);

    let mut params = SearchParams::new("*", &[]);
    params.hidden_hits = SearchParams::parse_hidden_hits("3");
    let res = core.search("titles", &params).unwrap();

    assert_eq!(res.found, 4);
    assert!(res.hit_ids().iter().all(|id| *id != "3"));
}

#[test]
fn test_hiding_the_only_result_yields_empty() {
    let core = core();
    core.create_collection(
        "tracks",
        vec![
            Field::new("title", FieldType::String),
            Field::new("points", FieldType::Int32),
        ],
        Some("points"),
    )
    .unwrap();
    core.add_document(
        "tracks",
        json!({"id": "0", "title": "Down There by the Train", "points": 0}),
    )
    .unwrap();

    let mut params = SearchParams::new("the train", &["title"]);
    params.hidden_hits = SearchParams::parse_hidden_hits("0");
    let res = core.search("tracks", &params).unwrap();

    assert_eq!(res.found, 0);
    assert!(res.hits.is_empty());
}

#[test]
fn test_pinned_hits_grouping_shares_position_group() {
    let core = core();
    core.create_collection(
        "movies",
        vec![
            Field::new("title", FieldType::String),
            Field::new("cast", FieldType::StringArray).faceted(),
            Field::new("points", FieldType::Int32),
        ],
        Some("points"),
    )
    .unwrap();

    let docs = [
        json!({"id": "0", "title": "Quiet Phase", "cast": ["A One"], "points": 0}),
        json!({"id": "1", "title": "Quiet Fields", "cast": ["B Two"], "points": 1}),
        json!({"id": "2", "title": "Quiet Rivers", "cast": ["C Three"], "points": 2}),
        json!({"id": "3", "title": "Quiet Skies", "cast": ["C Three"], "points": 3}),
        json!({"id": "4", "title": "Quiet Peaks", "cast": ["D Four"], "points": 4}),
    ];
    for doc in docs {
        core.add_document("movies", doc).unwrap();
    }

    let mut params = SearchParams::new("*", &[]);
    params.group_by = vec!["cast".to_string()];
    params.group_limit = 2;
    params.pinned_hits = SearchParams::parse_pinned_hits("0:1,1:1,4:2");

    let res = core.search("movies", &params).unwrap();

    // pins at position 1 share one group keyed by the first pinned doc
    assert_eq!(res.grouped_hits[0].group_key, vec![json!(["A One"])]);
    assert_eq!(res.grouped_hits[0].hits[0].doc_id(), "0");
    assert_eq!(res.grouped_hits[0].hits[1].doc_id(), "1");

    assert_eq!(res.grouped_hits[1].hits[0].doc_id(), "4");

    // natural groups follow in rank order; found counts groups
    assert_eq!(res.grouped_hits[2].hits[0].doc_id(), "3");
    assert_eq!(res.grouped_hits[2].hits[1].doc_id(), "2");
    assert_eq!(res.found, 3);
}

#[test]
fn test_grouping_orders_groups_by_best_hit() {
    let core = core();
    core.create_collection(
        "movies",
        vec![
            Field::new("title", FieldType::String),
            Field::new("studio", FieldType::String).faceted(),
            Field::new("points", FieldType::Int32),
        ],
        Some("points"),
    )
    .unwrap();

    for (i, studio) in ["alpha", "beta", "alpha", "beta", "alpha"].iter().enumerate() {
        core.add_document(
            "movies",
            json!({"id": i.to_string(), "title": "Film", "studio": studio, "points": i}),
        )
        .unwrap();
    }

    let mut params = SearchParams::new("*", &[]);
    params.group_by = vec!["studio".to_string()];
    params.group_limit = 2;

    let res = core.search("movies", &params).unwrap();
    assert_eq!(res.found, 2);

    // best hit "4" (alpha) leads; each group capped at the limit
    assert_eq!(res.grouped_hits[0].group_key, vec![json!("alpha")]);
    assert_eq!(
        res.grouped_hits[0]
            .hits
            .iter()
            .map(|h| h.doc_id())
            .collect::<Vec<_>>(),
        vec!["4", "2"]
    );
    assert_eq!(
        res.grouped_hits[1]
            .hits
            .iter()
            .map(|h| h.doc_id())
            .collect::<Vec<_>>(),
        vec!["3", "1"]
    );
}

#[test]
fn test_override_upsert_and_remove() {
    let core = core();
    seed_products(&core);

    core.add_override(
        "products",
        parse_override(
            "rule-1",
            &json!({
                "rule": {"query": "shoes", "match": "contains"},
                "excludes": [{"id": "0"}],
            }),
        ),
    )
    .unwrap();

    assert_eq!(core.list_overrides("products").unwrap().len(), 1);
    core.remove_override("products", "rule-1").unwrap();
    assert!(core.list_overrides("products").unwrap().is_empty());
    assert!(core.remove_override("products", "rule-1").is_err());
}
