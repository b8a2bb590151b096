//! End-to-end checks against a real MySQL. Run with
//! `TEST_DATABASE_URL=mysql://... cargo test -- --ignored`.

use std::io::Write;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::header::{AUTHORIZATION, CONTENT_TYPE};
use actix_web::http::StatusCode;
use actix_web::middleware::{NormalizePath, TrailingSlash};
use actix_web::{test, web, App, Error};
use serde_json::{json, Value};
use uuid::Uuid;

use foodgram_backend::db::Database;
use foodgram_backend::media::MediaStorage;
use foodgram_backend::{api, import, AppState};

const PIXEL_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

fn live_database() -> Database {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL is not set");
    let db = Database::new(&url, 4);
    db.run_migrations().expect("migrations failed");
    db
}

fn live_app(
    db: Database,
    media_root: &std::path::Path,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    let state = web::Data::new(AppState {
        db,
        cache: None,
        media: MediaStorage::new(media_root, "/media/"),
        page_size: 6,
        pdf_font: None,
    });
    App::new()
        .app_data(state)
        .wrap(NormalizePath::new(TrailingSlash::Trim))
        .configure(api::configure)
}

async fn body_json<B: MessageBody>(resp: ServiceResponse<B>) -> Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}

fn token_header(token: &str) -> (actix_web::http::header::HeaderName, String) {
    (AUTHORIZATION, format!("Token {}", token))
}

/// Unique ingredient name, imported through the CSV importer.
fn seed_ingredient(db: &Database, dir: &std::path::Path) -> String {
    let name = format!("test-flour-{}", Uuid::new_v4().to_simple());
    let path = dir.join("ingredients.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "{},g", name).unwrap();
    let summary = import::import_file(db, None, &path).unwrap();
    assert_eq!(summary.parsed, 1);
    name
}

macro_rules! register_and_login {
    ($app:expr, $prefix:expr) => {{
        let username = format!("{}{}", $prefix, &Uuid::new_v4().to_simple().to_string()[..12]);
        let email = format!("{}@example.com", username);
        let req = test::TestRequest::post()
            .uri("/api/users/")
            .set_json(json!({
                "email": email,
                "username": username,
                "first_name": "Test",
                "last_name": "Cook",
                "password": "correct-horse-battery"
            }))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let user = body_json(resp).await;

        let req = test::TestRequest::post()
            .uri("/api/auth/token/login/")
            .set_json(json!({ "email": email, "password": "correct-horse-battery" }))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let token = body_json(resp).await["auth_token"].as_str().unwrap().to_string();
        (user["id"].as_i64().unwrap(), email, token)
    }};
}

#[actix_web::test]
#[ignore]
async fn recipe_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let db = live_database();
    let ingredient_name = seed_ingredient(&db, dir.path());
    let app = test::init_service(live_app(db, dir.path())).await;

    let (author_id, _, author_token) = register_and_login!(app, "author");
    let (_, _, reader_token) = register_and_login!(app, "reader");

    let req = test::TestRequest::get()
        .uri(&format!("/api/ingredients/?name={}", ingredient_name))
        .to_request();
    let ingredients = body_json(test::call_service(&app, req).await).await;
    assert_eq!(ingredients.as_array().unwrap().len(), 1);
    let ingredient_id = ingredients[0]["id"].as_i64().unwrap();

    let recipe = json!({
        "ingredients": [{ "id": ingredient_id, "amount": 250 }],
        "image": PIXEL_PNG,
        "name": "Bread",
        "text": "Knead and bake.",
        "cooking_time": 90
    });
    let req = test::TestRequest::post()
        .uri("/api/recipes/")
        .insert_header(token_header(&author_token))
        .set_json(&recipe)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    let recipe_id = created["id"].as_i64().unwrap();
    assert_eq!(created["author"]["id"], author_id);
    assert_eq!(created["ingredients"][0]["amount"], 250);
    assert!(created["image"].as_str().unwrap().contains("/media/recipes/images/"));

    // duplicate ingredient lines are rejected before anything is stored
    let req = test::TestRequest::post()
        .uri("/api/recipes/")
        .insert_header(token_header(&author_token))
        .set_json(json!({
            "ingredients": [{ "id": ingredient_id, "amount": 1 }, { "id": ingredient_id, "amount": 2 }],
            "image": PIXEL_PNG,
            "name": "Twice",
            "text": "x",
            "cooking_time": 1
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/recipes/{}/", recipe_id))
        .insert_header(token_header(&reader_token))
        .set_json(json!({ "ingredients": [{ "id": ingredient_id, "amount": 1 }] }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/recipes/{}/", recipe_id))
        .insert_header(token_header(&author_token))
        .set_json(json!({ "name": "Rye bread", "ingredients": [{ "id": ingredient_id, "amount": 300 }] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = body_json(resp).await;
    assert_eq!(updated["name"], "Rye bread");
    assert_eq!(updated["text"], "Knead and bake.");

    let favorite = format!("/api/recipes/{}/favorite/", recipe_id);
    let req = test::TestRequest::post()
        .uri(&favorite)
        .insert_header(token_header(&reader_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp).await["cooking_time"], 90);

    let req = test::TestRequest::post()
        .uri(&favorite)
        .insert_header(token_header(&reader_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp).await["errors"].is_string());

    let req = test::TestRequest::get()
        .uri("/api/recipes/?is_favorited=1")
        .insert_header(token_header(&reader_token))
        .to_request();
    let listed = body_json(test::call_service(&app, req).await).await;
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["results"][0]["is_favorited"], true);

    let req = test::TestRequest::post()
        .uri(&format!("/api/recipes/{}/shopping_cart/", recipe_id))
        .insert_header(token_header(&reader_token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri("/api/recipes/download_shopping_cart/")
        .insert_header(token_header(&reader_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/pdf");
    assert!(test::read_body(resp).await.starts_with(b"%PDF-"));

    let req = test::TestRequest::get()
        .uri(&format!("/api/recipes/{}/get-link/", recipe_id))
        .to_request();
    let link = body_json(test::call_service(&app, req).await).await;
    assert!(link["short-link"]
        .as_str()
        .unwrap()
        .ends_with(&format!("/recipes/{}/", recipe_id)));

    let subscribe = format!("/api/users/{}/subscribe/?recipes_limit=1", author_id);
    let req = test::TestRequest::post()
        .uri(&subscribe)
        .insert_header(token_header(&reader_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let subscription = body_json(resp).await;
    assert_eq!(subscription["recipes_count"], 1);
    assert_eq!(subscription["is_subscribed"], true);

    let req = test::TestRequest::post()
        .uri(&subscribe)
        .insert_header(token_header(&reader_token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&subscribe)
        .insert_header(token_header(&author_token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/recipes/{}/", recipe_id))
        .insert_header(token_header(&author_token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/recipes/{}/", recipe_id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
#[ignore]
async fn accounts_and_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(live_app(live_database(), dir.path())).await;

    let (user_id, email, token) = register_and_login!(app, "member");

    let req = test::TestRequest::post()
        .uri("/api/users/")
        .set_json(json!({
            "email": email.to_uppercase(),
            "username": "someone-else",
            "first_name": "A",
            "last_name": "B",
            "password": "another-long-pass"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp).await["email"].is_array());

    let req = test::TestRequest::get()
        .uri("/api/users/me/")
        .insert_header(token_header(&token))
        .to_request();
    let me = body_json(test::call_service(&app, req).await).await;
    assert_eq!(me["id"], user_id);
    assert_eq!(me["is_subscribed"], false);
    assert_eq!(me["avatar"], Value::Null);

    let req = test::TestRequest::put()
        .uri("/api/users/me/avatar/")
        .insert_header(token_header(&token))
        .set_json(json!({ "avatar": PIXEL_PNG }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_json(resp).await["avatar"]
        .as_str()
        .unwrap()
        .contains("/media/users/avatars/"));

    let req = test::TestRequest::post()
        .uri("/api/users/set_password/")
        .insert_header(token_header(&token))
        .set_json(json!({ "current_password": "wrong-password", "new_password": "brand-new-pass" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp).await["current_password"].is_array());

    let req = test::TestRequest::post()
        .uri("/api/auth/token/logout/")
        .insert_header(token_header(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri("/api/users/me/")
        .insert_header(token_header(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["detail"], "Invalid token.");

    let req = test::TestRequest::get().uri("/api/users/?page=9999").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["detail"], "Invalid page.");
}
