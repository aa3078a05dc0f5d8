use rowlink_core::filter;
use rowlink_core::prelude::*;
use rowlink_core::{encode, FilterValue, Method, Operator, ResponseMode, Scalar};

fn pairs(q: &rowlink_core::CompiledQuery) -> Vec<(String, String)> {
    q.params.clone()
}

fn p(k: &str, v: &str) -> (String, String) {
    (k.to_string(), v.to_string())
}

#[test]
fn test_encode_in_keeps_input_order() {
    let token = encode(&Operator::In, &FilterValue::from(vec![3, 1, 2])).unwrap();
    assert_eq!(token.to_string(), "in.(3,1,2)");
}

#[test]
fn test_encode_in_empty_is_invalid() {
    let err = encode(&Operator::In, &FilterValue::List(vec![])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_encode_sequence_for_scalar_operator_is_invalid() {
    let err = encode(&Operator::Gt, &FilterValue::from(vec![1, 2])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_encode_text_search_with_config() {
    let op = Operator::TextSearch {
        kind: TextSearch::Websearch,
        config: Some("english".into()),
    };
    let token = encode(&op, &FilterValue::Scalar(Scalar::Text("cat -dog".into()))).unwrap();
    assert_eq!(token.to_string(), "wfts(english).cat -dog");
}

#[test]
fn test_basic_list_query() {
    let q = QueryBuilder::new("users")
        .select(["id", "name"])
        .limit(10)
        .compile()
        .unwrap();
    assert_eq!(q.to_string(), "GET /users?select=id%2Cname&limit=10");
    assert_eq!(q.mode, ResponseMode::Many);
}

#[test]
fn test_alias_and_inner_embed() {
    let q = QueryBuilder::new("users")
        .select(["id", "name AS fullName"])
        .relations(["posts!inner"])
        .compile()
        .unwrap();
    assert_eq!(q.param("select"), Some("id,fullName:name,posts!inner(*)"));
}

#[test]
fn test_nested_relations_hoist_full_path() {
    let q = QueryBuilder::new("users")
        .select(["id", "posts.title", "posts.comments.body AS text"])
        .relation(
            RelationSpec::new("posts")
                .eq("published", true)
                .order("created_at", Direction::Desc)
                .with(
                    RelationSpec::new("comments")
                        .inner()
                        .gt("score", 5)
                        .limit(3),
                ),
        )
        .eq("active", true)
        .compile()
        .unwrap();
    assert_eq!(
        pairs(&q),
        vec![
            p("select", "id,posts(title,comments!inner(text:body))"),
            p("active", "eq.true"),
            p("posts.published", "eq.true"),
            p("posts.order", "created_at.desc"),
            p("posts.comments.score", "gt.5"),
            p("posts.comments.limit", "3"),
        ]
    );
    assert_eq!(q.tables, vec!["users", "posts", "comments"]);
}

#[test]
fn test_undeclared_relation_path() {
    let err = QueryBuilder::new("users")
        .select(["id", "posts.title"])
        .compile()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndeclaredRelation);
}

#[test]
fn test_duplicate_alias() {
    let err = QueryBuilder::new("users")
        .select(["first_name AS name", "last_name AS name"])
        .compile()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateAlias);
}

#[test]
fn test_grouping_and_negation() {
    let q = QueryBuilder::new("tickets")
        .eq("project", 4)
        .or([
            filter::eq("status", "new"),
            FilterNode::and([filter::eq("status", "open"), filter::gte("priority", 3)]),
        ])
        .not("assignee", Operator::Is, Scalar::Null)
        .filter("tags", "not.ov", vec!["spam", "test"])
        .compile()
        .unwrap();
    assert_eq!(
        pairs(&q),
        vec![
            p("project", "eq.4"),
            p("or", "(status.eq.new,and(status.eq.open,priority.gte.3))"),
            p("assignee", "not.is.null"),
            p("tags", "not.ov.{spam,test}"),
        ]
    );
}

#[test]
fn test_match_all_preserves_order() {
    let q = QueryBuilder::new("users")
        .match_all([("role", "admin"), ("team", "core")])
        .compile()
        .unwrap();
    assert_eq!(pairs(&q), vec![p("role", "eq.admin"), p("team", "eq.core")]);
}

#[test]
fn test_ordering_multi_key() {
    let q = QueryBuilder::new("users")
        .order("last_name", Direction::Asc)
        .order_by(OrderSpec::desc("age").nulls_last())
        .compile()
        .unwrap();
    assert_eq!(q.param("order"), Some("last_name.asc,age.desc.nullslast"));
}

#[test]
fn test_page_size_equals_offset_limit() {
    let paged = QueryBuilder::new("users").page(2, 10).compile().unwrap();
    let explicit = QueryBuilder::new("users").limit(10).offset(10).compile().unwrap();
    assert_eq!(paged.params, explicit.params);
    assert_eq!(paged.canonical(), explicit.canonical());
}

#[test]
fn test_cursor_requires_order() {
    let err = QueryBuilder::new("events")
        .cursor("id", 10, Direction::Asc)
        .compile()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_count_only_head() {
    let q = QueryBuilder::new("users")
        .count(CountStrategy::Estimated)
        .head()
        .compile()
        .unwrap();
    assert_eq!(q.method, Method::Head);
    assert_eq!(q.header("Prefer"), Some("count=estimated"));
}

#[test]
fn test_compile_twice_is_identical() {
    let builder = QueryBuilder::new("users")
        .select(["id", "name AS fullName"])
        .relations(["posts"])
        .ilike("name", "%ann%")
        .range(0, 24)
        .count(CountStrategy::Exact);
    let a = builder.compile().unwrap();
    let b = builder.compile().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.canonical(), b.canonical());
}

#[test]
fn test_filter_order_is_significant() {
    let ab = QueryBuilder::new("t").eq("a", 1).eq("b", 2).compile().unwrap();
    let ba = QueryBuilder::new("t").eq("b", 2).eq("a", 1).compile().unwrap();
    assert_ne!(ab.canonical(), ba.canonical());
}
