//! Warehouse CRUD tests through the guarded router

mod common;

use axum::Router;
use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::{app, bearer, identity_provider, jwk_a, send, token};

const MANAGER: &[&str] = &[
    "get:customers",
    "post:customer",
    "patch:customer",
    "delete:customer",
    "get:items",
    "post:item",
    "patch:item",
    "delete:item",
    "get:orders",
    "post:order",
    "delete:order",
];

const SALESPERSON: &[&str] = &["get:customers", "get:items", "get:orders", "post:order"];

struct Harness {
    app: Router,
    manager: String,
    salesperson: String,
    _idp: wiremock::MockServer,
}

impl Harness {
    async fn new() -> Self {
        let idp = identity_provider(&[jwk_a()]).await;
        Self {
            app: app(&idp),
            manager: bearer(&token(MANAGER)),
            salesperson: bearer(&token(SALESPERSON)),
            _idp: idp,
        }
    }

    async fn manager(&self, verb: &str, uri: &str, body: Option<Value>) -> common::Reply {
        send(&self.app, verb, uri, Some(&self.manager), body).await
    }

    async fn salesperson(&self, verb: &str, uri: &str, body: Option<Value>) -> common::Reply {
        send(&self.app, verb, uri, Some(&self.salesperson), body).await
    }

    async fn customer(&self, name: &str) -> u64 {
        let reply = self
            .manager(
                "POST",
                "/customers",
                Some(json!({ "name": name, "email": format!("{name}@example.com") })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.body["customer"]["id"].as_u64().unwrap()
    }

    async fn item(&self, name: &str, price: u64) -> u64 {
        let reply = self
            .manager(
                "POST",
                "/items",
                Some(json!({ "name": name, "brand": "Acme", "price": price })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.body["item"]["id"].as_u64().unwrap()
    }
}

#[tokio::test]
async fn customer_lifecycle() {
    let h = Harness::new().await;

    let id = h.customer("ada").await;

    let reply = h
        .manager("PATCH", &format!("/customers/{id}"), Some(json!({ "name": "Ada L." })))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["customer"]["name"], "Ada L.");
    assert_eq!(reply.body["customer"]["email"], "ada@example.com");

    let reply = h.salesperson("GET", "/customers", None).await;
    assert_eq!(reply.body["customers"].as_array().unwrap().len(), 1);

    let reply = h.manager("DELETE", &format!("/customers/{id}"), None).await;
    assert_eq!(reply.body, json!({ "success": true, "deleted": id }));

    let reply = h.manager("DELETE", &format!("/customers/{id}"), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["success"], false);
}

#[tokio::test]
async fn salesperson_cannot_manage_inventory() {
    let h = Harness::new().await;
    let item = h.item("forklift", 9000).await;

    let cases = [
        ("POST", "/items".to_string(), Some(json!({ "name": "x", "brand": "y", "price": 1 }))),
        ("PATCH", format!("/items/{item}"), Some(json!({ "price": 1 }))),
        ("DELETE", format!("/items/{item}"), None),
        ("POST", "/customers".to_string(), Some(json!({ "name": "x", "email": "y" }))),
    ];
    for (verb, uri, body) in cases {
        let reply = h.salesperson(verb, &uri, body).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN, "{verb} {uri}");
        assert_eq!(reply.body["code"], "insufficient_permission");
    }

    // nothing changed
    let reply = h.salesperson("GET", "/items", None).await;
    assert_eq!(reply.body["items"][0]["price"], 9000);
}

#[tokio::test]
async fn order_amount_is_price_times_quantity() {
    // GIVEN: a customer and an item priced at 250
    let h = Harness::new().await;
    let customer = h.customer("grace").await;
    let item = h.item("shelf", 250).await;

    // WHEN: a salesperson submits an order for 4
    let reply = h
        .salesperson(
            "POST",
            "/orders",
            Some(json!({ "customer_id": customer, "item_id": item, "quantity": 4 })),
        )
        .await;

    // THEN: amount due is 1000 and nothing is paid yet
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["order"]["amount_due"], 1000);
    assert_eq!(reply.body["order"]["amount_paid"], 0);
    assert_eq!(reply.body["order_id"], reply.body["order"]["id"]);
}

#[tokio::test]
async fn order_validation_errors() {
    let h = Harness::new().await;
    let customer = h.customer("linus").await;
    let item = h.item("ladder", 80).await;

    let reply = h
        .salesperson("POST", "/orders", Some(json!({ "customer_id": customer })))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = h
        .salesperson(
            "POST",
            "/orders",
            Some(json!({ "customer_id": customer, "item_id": 999, "quantity": 1 })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    h.manager("PATCH", &format!("/items/{item}"), Some(json!({ "available": false })))
        .await;
    let reply = h
        .salesperson(
            "POST",
            "/orders",
            Some(json!({ "customer_id": customer, "item_id": item, "quantity": 1 })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let h = Harness::new().await;

    let reply = h.manager("POST", "/items", Some(json!({ "price": "cheap" }))).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["code"], "bad_request");
}

#[tokio::test]
async fn duplicate_item_name_conflicts() {
    let h = Harness::new().await;
    h.item("pallet", 30).await;

    let reply = h
        .manager(
            "POST",
            "/items",
            Some(json!({ "name": "pallet", "brand": "Other", "price": 31 })),
        )
        .await;

    assert_eq!(reply.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn deleting_customer_removes_their_orders() {
    let h = Harness::new().await;
    let keep = h.customer("keep").await;
    let gone = h.customer("gone").await;
    let item = h.item("bin", 5).await;
    for customer in [keep, gone, gone] {
        h.salesperson(
            "POST",
            "/orders",
            Some(json!({ "customer_id": customer, "item_id": item, "quantity": 1 })),
        )
        .await;
    }

    h.manager("DELETE", &format!("/customers/{gone}"), None).await;

    let reply = h.salesperson("GET", "/orders", None).await;
    let orders = reply.body["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["customer_id"], keep);
}

#[tokio::test]
async fn delete_order_reports_counts() {
    let h = Harness::new().await;
    let customer = h.customer("mary").await;
    let item = h.item("crate", 12).await;
    let order = h
        .salesperson(
            "POST",
            "/orders",
            Some(json!({ "customer_id": customer, "item_id": item, "quantity": 2 })),
        )
        .await
        .body["order_id"]
        .as_u64()
        .unwrap();

    // salesperson may submit but not delete
    let reply = h.salesperson("DELETE", &format!("/orders/{order}"), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = h.manager("DELETE", &format!("/orders/{order}"), None).await;
    assert_eq!(
        reply.body,
        json!({
            "success": true,
            "deleted_order_id": order,
            "previous_orders": 1,
            "current_orders": 0,
        })
    );
}

#[tokio::test]
async fn non_numeric_id_is_a_json_bad_request() {
    let h = Harness::new().await;

    for (verb, uri, body) in [
        ("PATCH", "/customers/abc", Some(json!({ "name": "x" }))),
        ("DELETE", "/customers/abc", None),
        ("PATCH", "/items/abc", Some(json!({ "price": 1 }))),
        ("DELETE", "/items/abc", None),
        ("DELETE", "/orders/-1", None),
    ] {
        let reply = h.manager(verb, uri, body).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{verb} {uri}");
        assert_eq!(reply.body["success"], false, "{verb} {uri}");
        assert_eq!(reply.body["code"], "bad_request", "{verb} {uri}");
    }
}
