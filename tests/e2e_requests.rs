//! End-to-end integration tests for multi-field requests.
//!
//! Root fields of one request share one transaction: exports flow from
//! earlier fields into later ones, and every field sees the same outcome.

use gql_tx::{
    sdl, Driver, DriverConfig, Error, FieldSelection, InputObject, InputValue, MemoryEngine, Selection, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;

const SCHEMA: &str = r#"
    type Person {
        name: String
        alias: String
        friends: [Person]
    }
"#;

async fn driver() -> Driver<MemoryEngine> {
    Driver::open_memory(sdl::parse_schema(SCHEMA).unwrap(), DriverConfig::default())
        .await
        .unwrap()
}

fn person(name: &str) -> InputObject {
    InputObject::new().with("name", name)
}

fn connect(id: InputValue) -> InputValue {
    InputValue::List(vec![InputObject::new().with("connect", id).into()])
}

async fn create(d: &Driver<MemoryEngine>, data: &InputObject) -> String {
    let ctx = d.request(["r"]);
    let field = d.create(true, &ctx, data, "Person", &Selection::new("r")).await.unwrap().unwrap();
    field.resolve().await.unwrap()["_id"].as_str().unwrap().to_string()
}

// ============================================================================
// 1. Exports
// ============================================================================

#[tokio::test]
async fn test_exports_flow_into_later_fields() {
    let d = driver().await;
    let ctx = d.request(["ada", "bob"]);

    let ada = d
        .create(
            true,
            &ctx,
            &person("Ada"),
            "Person",
            &Selection::new("ada").export("id", "adaId").export("name", "adaName"),
        )
        .await
        .unwrap()
        .unwrap();
    let bob_data = person("Bob")
        .with("alias", InputValue::var("adaName"))
        .with("friends", connect(InputValue::var("adaId")));
    let bob = d.create(true, &ctx, &bob_data, "Person", &Selection::new("bob")).await.unwrap().unwrap();

    let ada = ada.resolve().await.unwrap();
    let bob = bob.resolve().await.unwrap();
    assert_eq!(bob["alias"], json!("Ada"));

    let bob_doc = bob.as_object().unwrap().clone();
    let friends = d.get_edge_endpoint(&bob_doc, "Person", "friends", None).await.unwrap();
    assert_eq!(
        serde_json::to_value(friends).unwrap(),
        json!([ada]),
    );
}

#[tokio::test]
async fn test_unexported_variable_aborts() {
    let d = driver().await;
    let ctx = d.request(["bob"]);
    let data = person("Bob").with("friends", connect(InputValue::var("ghost")));
    let bob = d.create(true, &ctx, &data, "Person", &Selection::new("bob")).await.unwrap().unwrap();
    assert_eq!(
        bob.resolve().await.unwrap_err(),
        Error::Transaction("Variable $ghost has not been exported".into())
    );
    assert_eq!(d.engine().count("Person"), Some(0));
}

#[tokio::test]
async fn test_nested_export_aborts() {
    let d = driver().await;
    let ctx = d.request(["ada"]);
    let selection = Selection::new("ada").field(FieldSelection::new("friends").with(FieldSelection::new("name").export_as("x")));
    let ada = d.create(true, &ctx, &person("Ada"), "Person", &selection).await.unwrap().unwrap();
    assert_eq!(
        ada.resolve().await.unwrap_err(),
        Error::Transaction("Cannot export non-root field for variable $x".into())
    );
}

#[tokio::test]
async fn test_reserved_export_name() {
    let d = driver().await;
    let ctx = d.request(["ada"]);
    let err = d
        .create(true, &ctx, &person("Ada"), "Person", &Selection::new("ada").export("id", "db"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Input(_)));
    assert!(matches!(ctx.outcome(), Some(Err(Error::Input(_)))));
}

// ============================================================================
// 2. Edge operations
// ============================================================================

#[tokio::test]
async fn test_edge_lifecycle() {
    let d = driver().await;
    let ada = create(&d, &person("Ada")).await;
    let bob = create(&d, &person("Bob")).await;

    let ctx = d.request(["e"]);
    let edge = d
        .create_edge(
            true,
            &ctx,
            "Person",
            &InputValue::from(ada.as_str()),
            "friends",
            &InputValue::from(bob.as_str()),
            &InputObject::try_from(json!({"since": 1830})).unwrap(),
            &Selection::new("e"),
        )
        .await
        .unwrap()
        .unwrap()
        .resolve()
        .await
        .unwrap();
    assert_eq!(edge["_from"], json!(ada));
    assert_eq!(edge["_to"], json!(bob));
    assert_eq!(edge["__typename"], json!("_FriendsEdgeFromPerson"));
    let edge_id = edge["_id"].as_str().unwrap().to_string();

    let ctx = d.request(["e"]);
    let updated = d
        .update_edge(
            true,
            &ctx,
            &InputValue::from(edge_id.as_str()),
            &InputObject::try_from(json!({"since": 1842, "_to": "Person/0"})).unwrap(),
            "Person",
            "friends",
            &Selection::new("e"),
        )
        .await
        .unwrap()
        .unwrap()
        .resolve()
        .await
        .unwrap();
    assert_eq!(updated["since"], json!(1842));
    assert_eq!(updated["_to"], json!(bob));

    for expected_null in [false, true] {
        let ctx = d.request(["e"]);
        let removed = d
            .delete_edge(true, &ctx, &InputValue::from(edge_id.as_str()), "Person", "friends", &Selection::new("e"))
            .await
            .unwrap()
            .unwrap()
            .resolve()
            .await
            .unwrap();
        assert_eq!(removed == Value::Null, expected_null);
    }
    assert_eq!(d.engine().count("FriendsEdgeFromPerson"), Some(0));
}

// ============================================================================
// 3. Reads after deletes
// ============================================================================

#[tokio::test]
async fn test_reads_after_delete() {
    let d = driver().await;
    let ada = create(&d, &person("Ada")).await;
    let bob = create(&d, &person("Bob").with("friends", connect(InputValue::from(ada.as_str())))).await;

    let ctx = d.request(["del"]);
    d.delete_object(true, &ctx, &InputValue::from(ada.as_str()), "Person", &Selection::new("del"))
        .await
        .unwrap()
        .unwrap()
        .resolve()
        .await
        .unwrap();

    assert_eq!(d.get(&ada, "Person").await.unwrap(), None);
    let page = d.get_list(&Default::default(), "Person").await.unwrap();
    assert_eq!(page.content.len(), 1);
    assert_eq!(page.content[0]["_id"], json!(bob));

    let bob_doc = page.content[0].clone();
    let friends = d.get_edge_endpoint(&bob_doc, "Person", "friends", None).await.unwrap();
    assert_eq!(serde_json::to_value(friends).unwrap(), json!([]));
}

// ============================================================================
// 4. Mixed operations in one request
// ============================================================================

#[tokio::test]
async fn test_update_and_create_share_a_transaction() {
    let d = driver().await;
    let ada = create(&d, &person("Ada")).await;

    let ctx = d.request(["upd", "new"]);
    let upd = d
        .update(
            true,
            &ctx,
            &InputValue::from(ada.as_str()),
            &InputObject::new().with("alias", "Countess"),
            "Person",
            &Selection::new("upd").export("id", "ada"),
        )
        .await
        .unwrap()
        .unwrap();
    let new = d
        .create(true, &ctx, &person("Charles").with("friends", connect(InputValue::var("ada"))), "Person", &Selection::new("new"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(upd.resolve().await.unwrap()["alias"], json!("Countess"));
    assert_eq!(new.resolve().await.unwrap()["name"], json!("Charles"));
    assert_eq!(ctx.pending(), Vec::<String>::new());
    assert_eq!(d.engine().count("FriendsEdgeFromPerson"), Some(1));
}
