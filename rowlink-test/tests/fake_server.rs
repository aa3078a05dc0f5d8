use http::{HeaderMap, Method};
use rowlink_client::{HttpRequest, HttpResponse, Transport};
use rowlink_test::{FakeServer, RouterTransport, FAKE_URL};
use serde_json::{json, Value};

fn server() -> FakeServer {
    FakeServer::new()
        .table(
            "users",
            json!([
                {"id": 1, "name": "Ada", "age": 36},
                {"id": 2, "name": "Grace", "age": 85},
                {"id": 3, "name": "Linus", "age": null},
            ]),
        )
        .table(
            "posts",
            json!([
                {"id": 10, "user_id": 1, "title": "Engines", "likes": 5},
                {"id": 11, "user_id": 1, "title": "Notes", "likes": 9},
                {"id": 12, "user_id": 2, "title": "Compilers", "likes": 7},
            ]),
        )
        .foreign_key("posts", "user_id", "users")
}

async fn send(transport: &RouterTransport, method: Method, path: &str, headers: &[(&str, &str)], body: Option<Value>) -> HttpResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            value.parse().unwrap(),
        );
    }
    transport
        .send(HttpRequest {
            method,
            url: format!("{FAKE_URL}{path}"),
            headers: map,
            body: body.map(|b| b.to_string().into()),
        })
        .await
        .unwrap()
}

async fn get(transport: &RouterTransport, path: &str) -> Value {
    let response = send(transport, Method::GET, path, &[], None).await;
    assert_eq!(response.status, 200, "{}", String::from_utf8_lossy(&response.body));
    serde_json::from_slice(&response.body).unwrap()
}

#[tokio::test]
async fn test_projection_and_alias() {
    let transport = RouterTransport::new(server().router());
    let rows = get(&transport, "/users?select=id%2CfullName%3Aname&id=eq.1").await;
    assert_eq!(rows, json!([{"id": 1, "fullName": "Ada"}]));
}

#[tokio::test]
async fn test_embed_with_hoisted_filter_order_and_limit() {
    let transport = RouterTransport::new(server().router());
    let rows = get(
        &transport,
        "/users?select=name%2Cposts%28title%29&posts.likes=gt.5&posts.order=likes.desc&posts.limit=1&order=id.asc",
    )
    .await;
    assert_eq!(
        rows,
        json!([
            {"name": "Ada", "posts": [{"title": "Notes"}]},
            {"name": "Grace", "posts": [{"title": "Compilers"}]},
            {"name": "Linus", "posts": []},
        ])
    );
}

#[tokio::test]
async fn test_inner_embed_drops_parents_without_children() {
    let transport = RouterTransport::new(server().router());
    let rows = get(&transport, "/users?select=id%2Cposts%21inner%28id%29").await;
    let ids: Vec<i64> = rows.as_array().unwrap().iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_many_to_one_embed_is_an_object() {
    let transport = RouterTransport::new(server().router());
    let rows = get(&transport, "/posts?select=id%2Cauthor%3Ausers%28name%29&id=eq.12").await;
    assert_eq!(rows, json!([{"id": 12, "author": {"name": "Grace"}}]));
}

#[tokio::test]
async fn test_logic_trees_and_nulls() {
    let transport = RouterTransport::new(server().router());
    let rows = get(&transport, "/users?select=id&or=%28age.gt.80%2Cage.is.null%29&order=id").await;
    assert_eq!(rows, json!([{"id": 2}, {"id": 3}]));

    let rows = get(&transport, "/users?select=id&not.and=%28age.gt.30%2Cname.eq.Ada%29&order=id").await;
    assert_eq!(rows, json!([{"id": 2}, {"id": 3}]));
}

#[tokio::test]
async fn test_range_header_and_exact_count() {
    let transport = RouterTransport::new(server().router());
    let response = send(
        &transport,
        Method::GET,
        "/users?select=id&order=id.asc",
        &[("range-unit", "items"), ("range", "1-1"), ("prefer", "count=exact")],
        None,
    )
    .await;
    assert_eq!(response.header("content-range"), Some("1-1/3"));
    let rows: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(rows, json!([{"id": 2}]));
}

#[tokio::test]
async fn test_head_has_count_and_no_body() {
    let transport = RouterTransport::new(server().router());
    let response = send(&transport, Method::HEAD, "/posts?user_id=eq.1", &[("prefer", "count=exact")], None).await;
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
    assert_eq!(response.header("content-range"), Some("0-1/2"));
}

#[tokio::test]
async fn test_insert_conflict_and_upsert_merge() {
    let server = server();
    let transport = RouterTransport::new(server.router());

    let created = send(
        &transport,
        Method::POST,
        "/users?select=id%2Cname",
        &[("prefer", "return=representation")],
        Some(json!({"name": "Barbara", "age": 50})),
    )
    .await;
    assert_eq!(created.status, 201);
    assert_eq!(serde_json::from_slice::<Value>(&created.body).unwrap(), json!([{"id": 4, "name": "Barbara"}]));

    let duplicate = send(&transport, Method::POST, "/users", &[], Some(json!({"id": 1, "name": "Ada"}))).await;
    assert_eq!(duplicate.status, 409);
    let error: Value = serde_json::from_slice(&duplicate.body).unwrap();
    assert_eq!(error["code"], "23505");

    let merged = send(
        &transport,
        Method::POST,
        "/users?on_conflict=id",
        &[("prefer", "return=minimal,resolution=merge-duplicates")],
        Some(json!([{"id": 1, "name": "Ada L."}])),
    )
    .await;
    assert_eq!(merged.status, 201);
    assert!(merged.body.is_empty());
    assert_eq!(server.rows("users")[0]["name"], "Ada L.");
    assert_eq!(server.rows("users").len(), 4);
}

#[tokio::test]
async fn test_update_and_delete_apply_filters() {
    let server = server();
    let transport = RouterTransport::new(server.router());

    let updated = send(
        &transport,
        Method::PATCH,
        "/posts?user_id=eq.1",
        &[("prefer", "return=representation")],
        Some(json!({"likes": 0})),
    )
    .await;
    assert_eq!(updated.status, 200);
    assert_eq!(serde_json::from_slice::<Value>(&updated.body).unwrap().as_array().unwrap().len(), 2);

    let deleted = send(&transport, Method::DELETE, "/posts?likes=eq.0", &[], None).await;
    assert_eq!(deleted.status, 204);
    assert_eq!(server.rows("posts").len(), 1);
}

#[tokio::test]
async fn test_error_bodies() {
    let transport = RouterTransport::new(server().require_bearer("secret").router());

    let anonymous = send(&transport, Method::GET, "/users", &[], None).await;
    assert_eq!(anonymous.status, 401);

    let auth = [("authorization", "Bearer secret")];
    let missing_table = send(&transport, Method::GET, "/nope", &auth, None).await;
    assert_eq!(missing_table.status, 404);
    assert_eq!(serde_json::from_slice::<Value>(&missing_table.body).unwrap()["code"], "42P01");

    let missing_column = send(&transport, Method::GET, "/users?select=nickname", &auth, None).await;
    assert_eq!(missing_column.status, 400);
    assert_eq!(serde_json::from_slice::<Value>(&missing_column.body).unwrap()["code"], "42703");

    let no_relation = send(&transport, Method::GET, "/users?select=id%2Ccomments%28id%29", &auth, None).await;
    assert_eq!(serde_json::from_slice::<Value>(&no_relation.body).unwrap()["code"], "PGRST200");

    assert_eq!(transport.calls(), 4);
}
