//! Synonym engine integration: expansion during search, ranking parity,
//! field ordering.

mod common;

use serde_json::json;

use findex::{Field, FieldType, SearchParams, Synonym};

use common::core;

fn seed_titled(core: &findex::SearchCore, name: &str, titles: &[(&str, i64)]) {
    core.create_collection(
        name,
        vec![
            Field::new("title", FieldType::String),
            Field::new("description", FieldType::String),
            Field::new("points", FieldType::Int32),
        ],
        Some("points"),
    )
    .unwrap();

    for (i, (title, points)) in titles.iter().enumerate() {
        core.add_document(
            name,
            json!({
                "id": i.to_string(),
                "title": title,
                "description": format!("Description {i}"),
                "points": points,
            }),
        )
        .unwrap();
    }
}

#[test]
fn test_one_way_synonym_matches_target_docs() {
    let core = core();
    seed_titled(&core, "coll1", &[("Across the Sea", 100)]);

    let mut params = SearchParams::new("ocean", &["title"]);
    params.num_typos = vec![0];
    let res = core.search("coll1", &params).unwrap();
    assert_eq!(res.found, 0);

    core.add_synonym("coll1", Synonym::one_way("syn-1", "Ocean", &["Sea"]))
        .unwrap();

    let res = core.search("coll1", &params).unwrap();
    assert_eq!(res.found, 1);

    // one-way: the reverse direction must not match
    let mut params = SearchParams::new("sea", &["title"]);
    params.num_typos = vec![0];
    let res = core.search("coll1", &params).unwrap();
    assert_eq!(res.found, 1); // direct hit on "Sea" itself, not via synonym
}

#[test]
fn test_multi_way_synonym_with_multi_token_alternatives() {
    let core = core();
    seed_titled(
        &core,
        "coll1",
        &[("Homeland Security", 100), ("Secure Zone", 120)],
    );

    let mut params = SearchParams::new("homǝland", &["title"]);
    params.num_typos = vec![0];
    let res = core.search("coll1", &params).unwrap();
    assert_eq!(res.found, 0);

    core.add_synonym(
        "coll1",
        Synonym::multi_way("syn-1", &["Home Land", "Homeland", "homǝland"]),
    )
    .unwrap();

    let res = core.search("coll1", &params).unwrap();
    assert_eq!(res.found, 1);
    assert_eq!(res.hits[0].doc_id(), "0");
}

#[test]
fn test_exact_match_ranked_same_as_synonym_match() {
    let core = core();
    core.create_collection(
        "coll1",
        vec![
            Field::new("title", FieldType::String),
            Field::new("description", FieldType::String),
            Field::new("points", FieldType::Int32),
        ],
        Some("points"),
    )
    .unwrap();

    let records = [
        ("Laughing out Loud", "Description 1", 100),
        ("Stop Laughing", "Description 2", 120),
        ("LOL sure", "Laughing out loud sure", 200),
        ("Really ROFL now", "Description 3", 250),
    ];
    for (i, (title, description, points)) in records.iter().enumerate() {
        core.add_document(
            "coll1",
            json!({"id": i.to_string(), "title": title, "description": description, "points": points}),
        )
        .unwrap();
    }

    core.add_synonym("coll1", Synonym::multi_way("syn-1", &["Lol", "ROFL", "laughing"]))
        .unwrap();

    let mut params = SearchParams::new("laughing", &["title"]);
    params.drop_tokens_threshold = 0;
    params.num_typos = vec![0];
    let res = core.search("coll1", &params).unwrap();

    // all four match at the same base score; points break the ties
    assert_eq!(res.found, 4);
    assert_eq!(res.hit_ids(), vec!["3", "2", "1", "0"]);
}

#[test]
fn test_synonym_match_on_earlier_field_ranks_higher() {
    let core = core();
    core.create_collection(
        "coll1",
        vec![
            Field::new("title", FieldType::String),
            Field::new("description", FieldType::String),
            Field::new("points", FieldType::Int32),
        ],
        Some("points"),
    )
    .unwrap();

    let records = [
        ("LOL really", "Description 1", 50),
        ("Never stop", "Description 2", 120),
        ("Yes and no", "Laughing out loud sure", 100),
        ("And so on", "Description 3", 250),
    ];
    for (i, (title, description, points)) in records.iter().enumerate() {
        core.add_document(
            "coll1",
            json!({"id": i.to_string(), "title": title, "description": description, "points": points}),
        )
        .unwrap();
    }

    core.add_synonym("coll1", Synonym::multi_way("syn-1", &["Lol", "ROFL", "laughing"]))
        .unwrap();

    let mut params = SearchParams::new("laughing", &["title", "description"]);
    params.drop_tokens_threshold = 0;
    params.num_typos = vec![0];
    let res = core.search("coll1", &params).unwrap();

    // synonym match on `title` outranks direct match on `description`,
    // despite the lower points
    assert_eq!(res.found, 2);
    assert_eq!(res.hit_ids(), vec!["0", "2"]);
}

#[test]
fn test_single_token_exact_match_with_prefix() {
    let core = core();
    seed_titled(
        &core,
        "coll1",
        &[("Smashed Lemon", 100), ("Lulu Guinness", 100), ("Lululemon", 100)],
    );

    core.add_synonym("coll1", Synonym::one_way("syn-1", "lulu lemon", &["lululemon"]))
        .unwrap();

    let mut params = SearchParams::new("lulu lemon", &["title"]);
    params.prefix = vec![true];
    params.num_typos = vec![2];
    params.drop_tokens_threshold = 1;

    let res = core.search("coll1", &params).unwrap();

    assert_eq!(res.found, 2);
    assert_eq!(res.hit_ids(), vec!["2", "1"]);
}

#[test]
fn test_no_synonym_expansion_on_prefixes() {
    let core = core();
    seed_titled(&core, "coll1", &[("Leroy Anderson", 100)]);

    core.add_synonym(
        "coll1",
        Synonym::multi_way("syn-1", &["Samuel L. Jackson", "Sam Jackson", "Leroy"]),
    )
    .unwrap();

    // synonyms operate on whole tokens, never on prefixes of them
    let mut params = SearchParams::new("ler", &["description"]);
    params.prefix = vec![true];
    params.num_typos = vec![0];
    let res = core.search("coll1", &params).unwrap();
    assert_eq!(res.found, 0);
}

#[test]
fn test_synonym_lifecycle_upsert_and_remove() {
    let core = core();
    seed_titled(&core, "coll1", &[("Across the Sea", 100)]);

    core.add_synonym("coll1", Synonym::one_way("syn-1", "ocean", &["sea"]))
        .unwrap();
    core.add_synonym("coll1", Synonym::one_way("syn-2", "waters", &["sea"]))
        .unwrap();
    assert_eq!(core.list_synonyms("coll1").unwrap().len(), 2);

    // upsert with the same id replaces the definition
    core.add_synonym("coll1", Synonym::one_way("syn-1", "deep", &["sea"]))
        .unwrap();
    assert_eq!(core.list_synonyms("coll1").unwrap().len(), 2);

    let res = core
        .search("coll1", &SearchParams::new("ocean", &["title"]))
        .unwrap();
    assert_eq!(res.found, 0);

    let res = core
        .search("coll1", &SearchParams::new("deep", &["title"]))
        .unwrap();
    assert_eq!(res.found, 1);

    core.remove_synonym("coll1", "syn-1").unwrap();
    core.remove_synonym("coll1", "syn-2").unwrap();
    assert!(core.list_synonyms("coll1").unwrap().is_empty());
    assert!(core.remove_synonym("coll1", "syn-1").is_err());
}
