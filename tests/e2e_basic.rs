//! End-to-end integration tests for basic mutations and reads.
//!
//! Each test parses an SDL schema, opens a `Driver` over `MemoryEngine`,
//! runs mutations through request contexts and reads the results back
//! through the single-query read operations.

use gql_tx::{
    sdl, Driver, DriverConfig, Endpoint, InputObject, InputValue, ListArgs, MemoryEngine, Selection, Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

const SCHEMA: &str = r#"
    scalar DateTime

    interface Pet { name: String }
    type Dog implements Pet { name: String }
    type Cat implements Pet { name: String }

    type Person {
        name: String
        born: DateTime
        friends: [Person] @distinct
        pets: [Pet]
        _friendsFromPerson: [Person]
        _outgoingFriendsEdgeFromPerson: [_FriendsEdgeFromPerson]
    }

    type _FriendsEdgeFromPerson { since: Int }

    input _KeyForPerson { name: String }
"#;

async fn driver() -> Driver<MemoryEngine> {
    Driver::open_memory(sdl::parse_schema(SCHEMA).unwrap(), DriverConfig::default())
        .await
        .unwrap()
}

fn input(v: Value) -> InputObject {
    InputObject::try_from(v).unwrap()
}

/// Run a single root `create` and return its document.
async fn create(d: &Driver<MemoryEngine>, type_name: &str, data: Value) -> Value {
    let ctx = d.request(["r"]);
    let field = d
        .create(true, &ctx, &input(data), type_name, &Selection::new("r"))
        .await
        .unwrap()
        .unwrap();
    field.resolve().await.unwrap()
}

fn id_of(doc: &Value) -> String {
    doc["_id"].as_str().unwrap().to_string()
}

fn names(docs: &[serde_json::Map<String, Value>]) -> Vec<&str> {
    docs.iter().map(|d| d["name"].as_str().unwrap()).collect()
}

// ============================================================================
// 1. Setup creates the collections the schema needs
// ============================================================================

#[tokio::test]
async fn test_setup_collections() {
    let d = driver().await;
    assert_eq!(
        d.engine().collection_names(),
        vec!["Cat", "Dog", "FriendsEdgeFromPerson", "Person", "PetsEdgeFromPerson"]
    );
}

// ============================================================================
// 2. Create and read back
// ============================================================================

#[tokio::test]
async fn test_create_and_get() {
    let d = driver().await;
    let ada = create(&d, "Person", json!({"name": "Ada", "born": "1815-12-10"})).await;

    assert_eq!(ada["name"], json!("Ada"));
    assert_eq!(ada["born"], json!(-4861728000000_i64));
    assert_eq!(ada["__typename"], json!("Person"));
    assert!(ada["_creationDate"].is_i64());

    let fetched = d.get(&id_of(&ada), "Person").await.unwrap().unwrap();
    assert_eq!(Value::Object(fetched), ada);

    let mut key = serde_json::Map::new();
    key.insert("name".into(), json!("Ada"));
    let by_key = d.get_by_key(&key, "Person").await.unwrap().unwrap();
    assert_eq!(by_key["_id"], ada["_id"]);

    assert_eq!(d.get("Person/999999", "Person").await.unwrap(), None);
}

#[tokio::test]
async fn test_get_through_interface() {
    let d = driver().await;
    let rex = create(&d, "Dog", json!({"name": "Rex"})).await;
    let pet = d.get(&id_of(&rex), "Pet").await.unwrap().unwrap();
    assert_eq!(pet["name"], json!("Rex"));
}

// ============================================================================
// 3. Lists, paging and filters
// ============================================================================

async fn five_people(d: &Driver<MemoryEngine>) -> Vec<String> {
    let mut ids = Vec::new();
    for name in ["John Doe", "Jane Doe", "Max Mustermann", "Erika Mustermann", "Tom Smith"] {
        ids.push(id_of(&create(d, "Person", json!({"name": name})).await));
    }
    ids
}

#[tokio::test]
async fn test_paging() {
    let d = driver().await;
    let ids = five_people(&d).await;

    let first = d.get_list(&ListArgs::default().first(3), "Person").await.unwrap();
    assert_eq!(names(&first.content), vec!["John Doe", "Jane Doe", "Max Mustermann"]);
    assert_eq!(d.total_count(&first).await.unwrap(), 5);
    assert!(!d.is_end_of_list(&first).await.unwrap());

    let rest = d
        .get_list(&ListArgs::default().first(3).after(ids[2].clone()), "Person")
        .await
        .unwrap();
    assert_eq!(names(&rest.content), vec!["Erika Mustermann", "Tom Smith"]);
    assert!(d.is_end_of_list(&rest).await.unwrap());
}

#[tokio::test]
async fn test_filtered_list() {
    let d = driver().await;
    five_people(&d).await;

    let args = ListArgs::default().filter(json!({"name": {"_ilike": "%doe"}}));
    let page = d.get_list(&args, "Person").await.unwrap();
    assert_eq!(names(&page.content), vec!["John Doe", "Jane Doe"]);
    assert_eq!(d.total_count(&page).await.unwrap(), 2);
    assert!(d.is_end_of_list(&page).await.unwrap());
}

#[tokio::test]
async fn test_unknown_filter_field() {
    let d = driver().await;
    let args = ListArgs::default().filter(json!({"shoeSize": {"_eq": 42}}));
    assert!(d.get_list(&args, "Person").await.is_err());
}

// ============================================================================
// 4. Edges
// ============================================================================

#[tokio::test]
async fn test_edge_endpoints_both_directions() {
    let d = driver().await;
    let bob = create(&d, "Person", json!({"name": "Bob"})).await;
    let ada = create(
        &d,
        "Person",
        json!({
            "name": "Ada",
            "friends": [
                {"connect": id_of(&bob), "annotations": {"since": 1830}},
                {"create": {"name": "Charles"}}
            ],
            "pets": [{"createCat": {"name": "Tom"}}]
        }),
    )
    .await;
    let ada = ada.as_object().unwrap().clone();
    let bob = bob.as_object().unwrap().clone();

    let Endpoint::Many(friends) = d.get_edge_endpoint(&ada, "Person", "friends", None).await.unwrap() else {
        panic!("friends is a list field");
    };
    let mut friend_names = names(&friends);
    friend_names.sort();
    assert_eq!(friend_names, vec!["Bob", "Charles"]);

    let Endpoint::Many(pets) = d.get_edge_endpoint(&ada, "Person", "pets", None).await.unwrap() else {
        panic!("pets is a list field");
    };
    assert_eq!(pets[0]["__typename"], json!("Cat"));

    let Endpoint::Many(fans) = d.get_edge_endpoint(&bob, "Person", "_friendsFromPerson", None).await.unwrap() else {
        panic!("reverse field is a list");
    };
    assert_eq!(names(&fans), vec!["Ada"]);

    let filter = json!({"name": {"_eq": "Charles"}});
    let Endpoint::Many(only) = d.get_edge_endpoint(&ada, "Person", "friends", Some(&filter)).await.unwrap() else {
        panic!("friends is a list field");
    };
    assert_eq!(names(&only), vec!["Charles"]);
}

#[tokio::test]
async fn test_outgoing_edge_documents() {
    let d = driver().await;
    let bob = create(&d, "Person", json!({"name": "Bob"})).await;
    let ada = create(
        &d,
        "Person",
        json!({"name": "Ada", "friends": [{"connect": id_of(&bob), "annotations": {"since": 1830}}]}),
    )
    .await;
    let ada = ada.as_object().unwrap().clone();

    let Endpoint::Many(edges) = d
        .get_edge(&ada, "Person", "_outgoingFriendsEdgeFromPerson", None)
        .await
        .unwrap()
    else {
        panic!("edge field is a list");
    };
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["since"], json!(1830));
    assert_eq!(edges[0]["_from"], ada["_id"]);
    assert_eq!(edges[0]["_to"], json!(id_of(&bob)));
}

#[tokio::test]
async fn test_parent_without_id() {
    let d = driver().await;
    let err = d
        .get_edge_endpoint(&serde_json::Map::new(), "Person", "friends", None)
        .await
        .unwrap_err();
    assert!(matches!(err, gql_tx::Error::Input(_)));
}

// ============================================================================
// 5. Update and delete
// ============================================================================

#[tokio::test]
async fn test_update_merges_fields() {
    let d = driver().await;
    let ada = create(&d, "Person", json!({"name": "Ada", "born": "1815-12-10"})).await;

    let ctx = d.request(["u"]);
    let field = d
        .update(true, &ctx, &InputValue::from(id_of(&ada)), &input(json!({"name": "Ada Lovelace"})), "Person", &Selection::new("u"))
        .await
        .unwrap()
        .unwrap();
    let updated = field.resolve().await.unwrap();

    assert_eq!(updated["name"], json!("Ada Lovelace"));
    assert_eq!(updated["born"], ada["born"]);
    assert_eq!(updated["_id"], ada["_id"]);
    assert!(updated["_lastUpdateDate"].is_i64());
}

#[tokio::test]
async fn test_delete_removes_touching_edges() {
    let d = driver().await;
    let bob = create(&d, "Person", json!({"name": "Bob"})).await;
    create(&d, "Person", json!({"name": "Ada", "friends": [{"connect": id_of(&bob)}]})).await;
    assert_eq!(d.engine().count("FriendsEdgeFromPerson"), Some(1));

    let ctx = d.request(["del"]);
    let field = d
        .delete_object(true, &ctx, &InputValue::from(id_of(&bob)), "Person", &Selection::new("del"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(field.resolve().await.unwrap()["name"], json!("Bob"));
    assert_eq!(d.engine().count("FriendsEdgeFromPerson"), Some(0));
    assert_eq!(d.get(&id_of(&bob), "Person").await.unwrap(), None);

    // Deleting again succeeds with a null result.
    let ctx = d.request(["del"]);
    let field = d
        .delete_object(true, &ctx, &InputValue::from(id_of(&bob)), "Person", &Selection::new("del"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(field.resolve().await.unwrap(), Value::Null);
}

// ============================================================================
// 6. Debug logging of scripts and queries
// ============================================================================

#[tokio::test]
async fn test_debug_logging_of_scripts_and_reads() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let d = driver().await;
    let ada = create(&d, "Person", json!({"name": "Ada", "friends": [{"create": {"name": "Bob"}}]})).await;
    let page = d.get_list(&ListArgs::default().first(1), "Person").await.unwrap();
    assert_eq!(d.total_count(&page).await.unwrap(), 2);
    assert!(!d.is_end_of_list(&page).await.unwrap());
    assert_eq!(d.get(&id_of(&ada), "Person").await.unwrap().unwrap()["name"], json!("Ada"));
}

// ============================================================================
// 7. Paging walks every document exactly once
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_paging_visits_every_document(count in 1usize..14, page_size in 1usize..5) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (seen, mut all) = rt.block_on(async {
            let d = driver().await;
            let mut all = Vec::new();
            for i in 0..count {
                all.push(id_of(&create(&d, "Person", json!({"name": format!("p{i}")})).await));
            }

            let mut seen = Vec::new();
            let mut args = ListArgs::default().first(page_size);
            loop {
                let page = d.get_list(&args, "Person").await.unwrap();
                assert_eq!(d.total_count(&page).await.unwrap(), count);
                seen.extend(page.content.iter().map(|doc| doc["_id"].as_str().unwrap().to_string()));
                if page.content.is_empty() || d.is_end_of_list(&page).await.unwrap() {
                    break;
                }
                args = args.after(seen.last().unwrap().clone());
            }
            (seen, all)
        });
        all.sort();
        prop_assert_eq!(seen, all);
    }
}
