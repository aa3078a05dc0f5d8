use rowlink::prelude::*;
use rowlink_test::FakeServer;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: i64,
    name: String,
}

fn users(n: i64) -> Value {
    Value::Array(
        (1..=n)
            .map(|id| json!({"id": id, "name": format!("user{id}"), "age": 20 + id % 50, "team": id % 3}))
            .collect(),
    )
}

fn blog() -> FakeServer {
    FakeServer::new()
        .table(
            "users",
            json!([
                {"id": 1, "name": "Ann", "age": 31},
                {"id": 2, "name": "Bob", "age": 45},
                {"id": 3, "name": "Cy", "age": 19},
            ]),
        )
        .table(
            "posts",
            json!([
                {"id": 10, "user_id": 1, "title": "First", "likes": 3},
                {"id": 11, "user_id": 1, "title": "Second", "likes": 8},
                {"id": 12, "user_id": 2, "title": "Hello", "likes": 6},
            ]),
        )
        .foreign_key("posts", "user_id", "users")
}

#[tokio::test]
async fn test_basic_list_returns_only_selected_columns() {
    let (client, _) = FakeServer::new().table("users", users(25)).connect();

    let env = client
        .from("users")
        .select(["id", "name"])
        .limit(10)
        .execute::<Value>()
        .await
        .unwrap();

    assert!(env.is_ok());
    let rows = env.data.unwrap();
    assert_eq!(rows.len(), 10);
    for row in &rows {
        let mut keys: Vec<&String> = row.as_object().unwrap().keys().collect();
        keys.sort();
        assert_eq!(keys, ["id", "name"]);
    }
}

#[tokio::test]
async fn test_alias_renames_column() {
    let (client, _) = blog().connect();

    let env = client
        .from("users")
        .select(["id", "name AS fullName"])
        .eq("id", 1)
        .execute::<Value>()
        .await
        .unwrap();

    assert_eq!(env.data, Some(vec![json!({"id": 1, "fullName": "Ann"})]));
}

#[tokio::test]
async fn test_inner_embed_excludes_rows_without_matches() {
    let (client, _) = blog().connect();

    let env = client
        .from("users")
        .select(["id"])
        .relations(["posts!inner"])
        .order("id", Direction::Asc)
        .execute::<Value>()
        .await
        .unwrap();

    let ids: Vec<i64> = env
        .data
        .unwrap()
        .iter()
        .map(|row| row["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_relation_filters_order_and_limit_apply_to_embedded_rows() {
    let (client, _) = blog().connect();

    let env = client
        .from("users")
        .select(["name"])
        .relation(
            RelationSpec::new("posts")
                .select(["title"])
                .gt("likes", 2)
                .order("likes", Direction::Desc)
                .limit(1),
        )
        .eq("id", 1)
        .execute::<Value>()
        .await
        .unwrap();

    assert_eq!(
        env.data,
        Some(vec![json!({"name": "Ann", "posts": [{"title": "Second"}]})])
    );
}

#[tokio::test]
async fn test_select_path_into_relation() {
    let (client, _) = blog().connect();

    let env = client
        .from("posts")
        .select(["title", "author.name"])
        .relations(["author:users"])
        .eq("id", 12)
        .execute::<Value>()
        .await
        .unwrap();

    assert_eq!(
        env.data,
        Some(vec![json!({"title": "Hello", "author": {"name": "Bob"}})])
    );
}

#[tokio::test]
async fn test_single_cardinality() {
    let (client, _) = blog().connect();

    let one = client.from("users").eq("id", 2).single::<User>().await.unwrap();
    assert_eq!(
        one.data,
        Some(User {
            id: 2,
            name: "Bob".into()
        })
    );
    assert!(one.error.is_none());

    let none = client.from("users").eq("id", 99).single::<User>().await.unwrap();
    assert_eq!(none.error, Some(Error::NotFound));
    assert!(none.data.is_none());

    let many = client.from("users").gt("age", 20).single::<User>().await.unwrap();
    assert_eq!(many.error, Some(Error::MultipleRowsFound(2)));
}

#[tokio::test]
async fn test_maybe_single_cardinality() {
    let (client, _) = blog().connect();

    let none = client.from("users").eq("id", 99).maybe_single::<User>().await.unwrap();
    assert!(none.is_ok());
    assert!(none.data.is_none());

    let one = client.from("users").eq("name", "Cy").maybe_single::<User>().await.unwrap();
    assert_eq!(one.data.map(|u| u.id), Some(3));

    let many = client.from("users").maybe_single::<User>().await.unwrap();
    assert_eq!(many.error, Some(Error::MultipleRowsFound(3)));
}

#[tokio::test]
async fn test_count_with_rows_and_head_only() {
    let (client, transport) = FakeServer::new().table("users", users(25)).connect();

    let env = client
        .from("users")
        .select(["id"])
        .count(CountStrategy::Exact)
        .limit(5)
        .execute::<Value>()
        .await
        .unwrap();
    assert_eq!(env.count, Some(25));
    assert_eq!(env.data.map(|rows| rows.len()), Some(5));

    let head = client
        .from("users")
        .eq("team", 0)
        .head()
        .execute::<Value>()
        .await
        .unwrap();
    assert!(head.is_ok());
    assert_eq!(head.count, Some(8));
    assert!(head.data.is_none());

    let last = transport.last_request().unwrap();
    assert_eq!(last.method.as_str(), "HEAD");
}

#[tokio::test]
async fn test_page_and_range_pagination() {
    let (client, _) = FakeServer::new().table("users", users(25)).connect();

    let page = client
        .from("users")
        .select(["id", "name"])
        .order("id", Direction::Asc)
        .page(2, 10)
        .execute_with_pagination::<User>()
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(page.content.first().map(|u| u.id), Some(11));
    assert_eq!(page.content.len(), 10);
    assert_eq!(page.total_elements, 25);
    assert_eq!(page.total_pages, 3);
    assert!(page.has_next());

    let range = client
        .from("users")
        .select(["id"])
        .order("id", Direction::Asc)
        .range(20, 29)
        .execute::<Value>()
        .await
        .unwrap();
    let ids: Vec<i64> = range.data.unwrap().iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![21, 22, 23, 24, 25]);
}

#[tokio::test]
async fn test_cursor_walks_without_gaps_across_ties() {
    let rows = json!([
        {"id": 1, "score": 10},
        {"id": 2, "score": 20},
        {"id": 3, "score": 20},
        {"id": 4, "score": 30},
        {"id": 5, "score": 20},
    ]);
    let (client, _) = FakeServer::new().table("scores", rows).connect();

    let mut seen = Vec::new();
    let mut last: Option<(i64, i64)> = None;
    loop {
        let mut query = client
            .from("scores")
            .select(["id", "score"])
            .order("score", Direction::Asc)
            .order("id", Direction::Asc)
            .limit(2);
        if let Some((score, id)) = last {
            query = query
                .cursor("score", score, Direction::Asc)
                .tiebreaker("id", id);
        }
        let batch = query.execute::<Value>().await.unwrap().data.unwrap();
        if batch.is_empty() {
            break;
        }
        for row in &batch {
            seen.push(row["id"].as_i64().unwrap());
        }
        let tail = batch.last().unwrap();
        last = Some((tail["score"].as_i64().unwrap(), tail["id"].as_i64().unwrap()));
    }
    assert_eq!(seen, vec![1, 2, 3, 5, 4]);
}

#[tokio::test]
async fn test_logic_groups() {
    let (client, _) = blog().connect();

    let env = client
        .from("users")
        .select(["id"])
        .or([filter::eq("name", "Ann"), filter::lt("age", 20)])
        .order("id", Direction::Asc)
        .execute::<Value>()
        .await
        .unwrap();
    assert_eq!(env.data, Some(vec![json!({"id": 1}), json!({"id": 3})]));

    let env = client
        .from("users")
        .select(["id"])
        .in_("id", [1, 2, 3])
        .not_null("age")
        .ilike("name", "b%")
        .execute::<Value>()
        .await
        .unwrap();
    assert_eq!(env.data, Some(vec![json!({"id": 2})]));
}

#[tokio::test]
async fn test_server_errors_are_typed() {
    let (client, _) = blog().connect();

    let env = client
        .from("users")
        .eq("nickname", "x")
        .execute::<Value>()
        .await
        .unwrap();
    match env.error {
        Some(Error::Database { status, error }) => {
            assert_eq!(status, 400);
            assert_eq!(error.code.as_deref(), Some("42703"));
        }
        other => panic!("unexpected {other:?}"),
    }

    let env = client.from("missing").execute::<Value>().await.unwrap();
    assert_eq!(env.error.as_ref().and_then(Error::code), Some("42P01"));
    assert_eq!(env.status, 404);
}

#[tokio::test]
async fn test_decode_failure_lands_in_envelope() {
    let (client, _) = blog().connect();

    let env = client
        .from("users")
        .select(["id"])
        .execute::<User>()
        .await
        .unwrap();
    assert_eq!(env.error.map(|e| e.kind()), Some(ErrorKind::Decode));
    assert!(env.data.is_none());
}

#[tokio::test]
async fn test_compile_errors_never_reach_the_server() {
    let (client, transport) = blog().connect();

    let err = client
        .from("users")
        .select(["id", "posts.title"])
        .execute::<Value>()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndeclaredRelation);

    let err = client
        .from("users")
        .select(["id", "name AS id"])
        .execute::<Value>()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateAlias);

    let err = client
        .from("users")
        .in_("id", Vec::<i64>::new())
        .execute::<Value>()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(transport.calls(), 0);
}
