// tests/ledger_tests.rs

mod common;

use common::{TestApp, data, spawn_app, token};
use newsroom::models::approval::Role;
use reqwest::Method;
use serde_json::{Value, json};

const WRITER: i64 = 10;
const SUB_EDITOR: i64 = 20;
const EDITOR: i64 = 30;
const ADMIN: i64 = 40;

/// Global rate card: posts pay 10, a Banner sponsorship pays 20 per day.
async fn seed_rate_card(app: &TestApp) {
    let response = app
        .send_json(
            Method::POST,
            "/api/ads",
            &token(ADMIN, Role::Admin),
            json!({
                "price_per_post": 10,
                "ads_types": [
                    { "ads_type": "Banner", "price": 20 },
                    { "ads_type": "Sidebar", "price": 7 }
                ]
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
}

async fn add_proposal(app: &TestApp, owner: i64, ad_type: &str) -> Value {
    let response = app
        .send_json(
            Method::POST,
            &format!("/api/user-details/{}/sponsors", owner),
            &token(owner, Role::Writer),
            json!({ "sponsor_name": "Acme Corp", "sponsor_phone": "0123", "ad_type": ad_type }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    data(response).await
}

async fn managed_sponsors(app: &TestApp, owner: i64) -> Vec<Value> {
    data(app.get("/api/sponsors", "").await)
        .await
        .as_array()
        .unwrap()
        .iter()
        .filter(|sponsor| sponsor["sponsor_managed_by"] == owner)
        .cloned()
        .collect()
}

#[tokio::test]
async fn rate_card_writes_are_admin_only() {
    let app = spawn_app().await;

    let response = app
        .send_json(
            Method::POST,
            "/api/ads",
            &token(EDITOR, Role::Editor),
            json!({ "price_per_post": 10 }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 403);

    seed_rate_card(&app).await;
    let response = app
        .send_json(
            Method::POST,
            "/api/ads",
            &token(ADMIN, Role::Admin),
            json!({ "price_per_post": 99 }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let cards = data(app.get("/api/ads", "").await).await;
    assert_eq!(cards.as_array().unwrap().len(), 1);
    assert_eq!(cards[0]["category"], "category");
}

#[tokio::test]
async fn proposal_is_priced_from_rate_card() {
    let app = spawn_app().await;
    seed_rate_card(&app).await;
    app.create_profile(WRITER, Role::Writer, "Wanda Writer").await;

    let proposal = add_proposal(&app, WRITER, "Banner").await;
    assert_eq!(proposal["status"], "pending");
    assert_eq!(proposal["total_amount"], 20);

    let unpriced = add_proposal(&app, WRITER, "Popup").await;
    assert_eq!(unpriced["total_amount"], 0);

    let response = app
        .send_json(
            Method::POST,
            "/api/ads",
            &token(ADMIN, Role::Admin),
            json!({
                "category": "video",
                "price_per_post": 5,
                "ads_types": [
                    { "ads_type": "Banner", "price": 99 },
                    { "ads_type": "Popup", "price": 12 }
                ]
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let popup = add_proposal(&app, WRITER, "Popup").await;
    assert_eq!(popup["total_amount"], 12);
    // the older card still wins for types both cards list
    let banner = add_proposal(&app, WRITER, "Banner").await;
    assert_eq!(banner["total_amount"], 20);

    let response = app
        .send_json(
            Method::POST,
            "/api/user-details/777/sponsors",
            &token(EDITOR, Role::Editor),
            json!({ "sponsor_name": "Ghost" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn accepting_a_proposal_forks_exactly_one_sponsor() {
    let app = spawn_app().await;
    app.create_profile(WRITER, Role::Writer, "Wanda Writer").await;
    let proposal = add_proposal(&app, WRITER, "Banner").await;
    let path = format!("/api/user-details/sub-editor-sponsor/{}", WRITER);
    let sub_editor = token(SUB_EDITOR, Role::SubEditor);

    for _ in 0..2 {
        let response = app
            .send_json(
                Method::PUT,
                &path,
                &sub_editor,
                json!({ "sponsor_id": proposal["id"], "status": "accepte" }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(data(response).await["status"], "accepted");
    }

    let sponsors = managed_sponsors(&app, WRITER).await;
    assert_eq!(sponsors.len(), 1);
    assert_eq!(sponsors[0]["status"], "accepted");
    assert_eq!(sponsors[0]["sponsor_added_by"], SUB_EDITOR);
    assert_eq!(sponsors[0]["source_entry_id"], proposal["id"]);
    assert_eq!(sponsors[0]["day"], 3);

    // deleting the proposal leaves the sponsor alone
    let response = app
        .send_json(
            Method::PUT,
            &format!("/api/user-details/{}/delete-sponsor", WRITER),
            &token(WRITER, Role::Writer),
            json!({ "sponsor_id": proposal["id"] }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(managed_sponsors(&app, WRITER).await.len(), 1);
}

#[tokio::test]
async fn sponsor_status_rejects_bad_input() {
    let app = spawn_app().await;
    app.create_profile(WRITER, Role::Writer, "Wanda Writer").await;
    let proposal = add_proposal(&app, WRITER, "Banner").await;
    let path = format!("/api/user-details/sub-editor-sponsor/{}", WRITER);

    let response = app
        .send_json(
            Method::PUT,
            &path,
            &token(WRITER, Role::Writer),
            json!({ "sponsor_id": proposal["id"], "status": "accepted" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let sub_editor = token(SUB_EDITOR, Role::SubEditor);
    let response = app
        .send_json(
            Method::PUT,
            &path,
            &sub_editor,
            json!({ "sponsor_id": proposal["id"], "status": "approved" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .send_json(
            Method::PUT,
            &path,
            &sub_editor,
            json!({ "sponsor_id": uuid::Uuid::new_v4(), "status": "rejected" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .send_json(
            Method::PUT,
            &path,
            &sub_editor,
            json!({ "sponsor_id": proposal["id"], "status": "Rejected" }),
        )
        .await;
    assert_eq!(data(response).await["status"], "rejected");
    assert!(managed_sponsors(&app, WRITER).await.is_empty());
}

#[tokio::test]
async fn recompute_prices_sponsors_per_acceptance_and_per_day() {
    let app = spawn_app().await;
    seed_rate_card(&app).await;
    app.create_profile(WRITER, Role::Writer, "Wanda Writer").await;
    let writer = token(WRITER, Role::Writer);

    let response = app
        .send_json(
            Method::POST,
            "/api/sponsors",
            &token(EDITOR, Role::Editor),
            json!({
                "sponsor_name": "Acme Corp",
                "sponsor_phone": "0123",
                "sponsor_managed_by": WRITER,
                "position": " banner ",
                "day": 5,
                "status": "accepted"
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    // nothing stored until the first recompute
    let response = app.get("/api/dashboard/user", &writer).await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .send_json(Method::POST, "/api/dashboard/user", &writer, json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let ledger = data(response).await;

    assert_eq!(ledger["user_name"], "Wanda Writer");
    assert_eq!(ledger["earnings"]["post_earnings"], 0);
    assert_eq!(ledger["earnings"]["total_earnings_user"], 20);
    assert_eq!(ledger["earnings"]["total_earnings_agency"], 100);
    assert_eq!(ledger["earnings"]["current_balance"], 20);
    assert_eq!(ledger["earnings"]["received_balance"], 0);

    let banner = ledger["sponsor_details_per_type_for_agency"]
        .as_array()
        .unwrap()
        .iter()
        .find(|detail| detail["type"] == "Banner")
        .cloned()
        .unwrap();
    assert_eq!(banner["accepted"], 1);
    assert_eq!(banner["total_days"], 5);

    // recompute is repeatable
    let again = data(app.get("/api/dashboard/user", &writer).await).await;
    assert_eq!(again["earnings"], ledger["earnings"]);
}

#[tokio::test]
async fn approved_posts_earn_the_post_price() {
    let app = spawn_app().await;
    seed_rate_card(&app).await;
    app.create_profile(WRITER, Role::Writer, "Wanda Writer").await;
    let writer = token(WRITER, Role::Writer);

    for title in ["One", "Two", "Three"] {
        let id = app.post_id(&writer, title).await;
        if title != "Three" {
            app.send_json(
                Method::PATCH,
                &format!("/api/posts/{}/review", id),
                &token(ADMIN, Role::Admin),
                json!({ "status": "approved" }),
            )
            .await;
        }
    }

    let response = app
        .send_json(Method::POST, "/api/dashboard/user", &writer, json!({}))
        .await;
    let ledger = data(response).await;
    assert_eq!(ledger["posts"], json!({ "total": 3, "approved": 2, "pending": 1, "rejected": 0 }));
    assert_eq!(ledger["earnings"]["post_earnings"], 20);
    assert_eq!(ledger["earnings"]["total_earnings_user"], 20);
}

#[tokio::test]
async fn recompute_without_profile_is_404() {
    let app = spawn_app().await;

    let response = app
        .send_json(Method::POST, "/api/dashboard/user", &token(99, Role::Writer), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

/// Writer with a recomputed balance of 20.
async fn funded_writer(app: &TestApp) -> String {
    seed_rate_card(app).await;
    app.create_profile(WRITER, Role::Writer, "Wanda Writer").await;
    let proposal = add_proposal(app, WRITER, "Banner").await;
    app.send_json(
        Method::PUT,
        &format!("/api/user-details/sub-editor-sponsor/{}", WRITER),
        &token(EDITOR, Role::Editor),
        json!({ "sponsor_id": proposal["id"], "status": "accepted" }),
    )
    .await;

    let writer = token(WRITER, Role::Writer);
    let response = app
        .send_json(Method::POST, "/api/dashboard/user", &writer, json!({}))
        .await;
    assert_eq!(data(response).await["earnings"]["current_balance"], 20);
    writer
}

fn payout(amount: i64) -> Value {
    json!({
        "name": "Wanda Writer",
        "phone": "0123",
        "bank": "City Bank",
        "bank_account": "12-34",
        "requested_amount": amount
    })
}

#[tokio::test]
async fn payment_request_cannot_overdraw() {
    let app = spawn_app().await;

    let response = app
        .send_json(
            Method::POST,
            "/api/dashboard/user/payment-request",
            &token(WRITER, Role::Writer),
            payout(5),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let writer = funded_writer(&app).await;

    let response = app
        .send_json(Method::POST, "/api/dashboard/user/payment-request", &writer, payout(25))
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .send_json(Method::POST, "/api/dashboard/user/payment-request", &writer, payout(0))
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let ledger = data(app.get("/api/dashboard/user", &writer).await).await;
    assert_eq!(ledger["earnings"]["current_balance"], 20);
    assert_eq!(ledger["payment_requests"], json!([]));
}

#[tokio::test]
async fn payment_lifecycle_reserves_then_settles_once() {
    let app = spawn_app().await;
    let writer = funded_writer(&app).await;
    let admin = token(ADMIN, Role::Admin);

    let response = app
        .send_json(Method::POST, "/api/dashboard/user/payment-request", &writer, payout(15))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let request = data(response).await;
    assert_eq!(request["status"], "pending");
    let request_id = request["id"].as_str().unwrap().to_string();

    let ledger = data(app.get("/api/dashboard/user", &writer).await).await;
    assert_eq!(ledger["earnings"]["current_balance"], 5);

    let response = app
        .send_json(
            Method::PUT,
            &format!("/api/dashboard/payment-given/{}", request_id),
            &writer,
            json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let overview = data(app.get("/api/dashboard/all-requests", &admin).await).await;
    assert_eq!(overview[0]["user_name"], "Wanda Writer");
    assert_eq!(overview[0]["user_role"], "writer");

    for _ in 0..2 {
        let response = app
            .send_json(
                Method::PUT,
                &format!("/api/dashboard/payment-given/{}", request_id),
                &admin,
                json!({ "transaction_id": "TX-1" }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 200);
        let settled = data(response).await;
        assert_eq!(settled["status"], "successful");
        assert_eq!(settled["paid_amount"], 15);
        assert_eq!(settled["paid_by"], "admin");
    }

    let ledger = data(app.get("/api/dashboard/user", &writer).await).await;
    assert_eq!(ledger["earnings"]["received_balance"], 15);
    assert_eq!(ledger["earnings"]["current_balance"], 5);

    let response = app
        .send_json(
            Method::PUT,
            &format!("/api/dashboard/payment-given/{}", request_id),
            &admin,
            json!({ "status": "refused" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    // recompute keeps the payment history
    let response = app
        .send_json(Method::POST, "/api/dashboard/user", &writer, json!({}))
        .await;
    let ledger = data(response).await;
    assert_eq!(ledger["earnings"]["received_balance"], 15);
    assert_eq!(ledger["earnings"]["current_balance"], 5);
    assert_eq!(ledger["payment_requests"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn settlement_amount_is_bounded_by_the_request() {
    let app = spawn_app().await;
    let writer = funded_writer(&app).await;
    let admin = token(ADMIN, Role::Admin);

    let response = app
        .send_json(Method::POST, "/api/dashboard/user/payment-request", &writer, payout(15))
        .await;
    let request_id = data(response).await["id"].as_str().unwrap().to_string();
    let path = format!("/api/dashboard/payment-given/{}", request_id);

    for paid_amount in [json!(i64::MAX), json!(16), json!(0)] {
        let response = app
            .send_json(Method::PUT, &path, &admin, json!({ "paid_amount": paid_amount }))
            .await;
        assert_eq!(response.status().as_u16(), 400, "paid_amount {paid_amount}");
    }

    let ledger = data(app.get("/api/dashboard/user", &writer).await).await;
    assert_eq!(ledger["payment_requests"][0]["status"], "pending");
    assert_eq!(ledger["earnings"]["received_balance"], 0);

    let response = app
        .send_json(Method::PUT, &path, &admin, json!({ "paid_amount": 12 }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(data(response).await["paid_amount"], 12);

    let response = app
        .send_json(
            Method::POST,
            "/api/ads",
            &admin,
            json!({ "category": "huge", "price_per_post": i64::MAX }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn unknown_payment_request_is_404() {
    let app = spawn_app().await;

    let response = app
        .send_json(
            Method::PUT,
            &format!("/api/dashboard/payment-given/{}", uuid::Uuid::new_v4()),
            &token(EDITOR, Role::Editor),
            json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn profile_updates_guard_roles() {
    let app = spawn_app().await;
    app.create_profile(WRITER, Role::Writer, "Wanda Writer").await;
    let writer = token(WRITER, Role::Writer);
    let path = format!("/api/user-details/{}", WRITER);

    let response = app
        .send_json(Method::PUT, &path, &writer, json!({ "role": "admin" }))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .send_json(Method::PUT, &path, &writer, json!({ "name": "Wanda W." }))
        .await;
    assert_eq!(data(response).await["name"], "Wanda W.");

    let response = app
        .send_json(Method::PUT, &path, &token(11, Role::Writer), json!({ "name": "Hijack" }))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .send_json(
            Method::PUT,
            &path,
            &token(ADMIN, Role::Admin),
            json!({ "role": "sub_editor" }),
        )
        .await;
    assert_eq!(data(response).await["role"], "sub_editor");

    let response = app
        .send_json(Method::POST, "/api/user-details", &writer, json!({ "name": "Again", "email": "x@example.com" }))
        .await;
    assert_eq!(response.status().as_u16(), 400);
}
