mod helpers;

use helpers::{register_admin, setup_test_app, unique_org_name};

#[tokio::test]
async fn register_issues_admin_and_tokens() {
    let Some(app) = setup_test_app().await else {
        return;
    };

    let user = register_admin(&app.server, &unique_org_name("Acme")).await;
    assert!(!user.access_token.is_empty());

    let response = app
        .server
        .get("/api/auth/me")
        .add_header(
            "Authorization",
            format!("Bearer {}", user.access_token),
        )
        .await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["user"]["id"], user.user_id.to_string());
}

#[tokio::test]
async fn duplicate_organization_name_conflicts() {
    let Some(app) = setup_test_app().await else {
        return;
    };

    let org_name = unique_org_name("Twice");
    register_admin(&app.server, &org_name).await;

    let response = app
        .server
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "email": format!("{}@example.com", uuid::Uuid::new_v4()),
            "password": "Abcdef12",
            "name": "Second",
            "organizationName": org_name,
        }))
        .await;
    assert_eq!(response.status_code(), 409);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let Some(app) = setup_test_app().await else {
        return;
    };

    let email = format!("{}@example.com", uuid::Uuid::new_v4());
    let register = |org: String| {
        app.server.post("/api/auth/register").json(&serde_json::json!({
            "email": email,
            "password": "Abcdef12",
            "name": "Dup",
            "organizationName": org,
        }))
    };

    let first = register(unique_org_name("One")).await;
    assert_eq!(first.status_code(), 201);

    let second = register(unique_org_name("Two")).await;
    assert_eq!(second.status_code(), 409);
}

#[tokio::test]
async fn login_rejects_bad_password() {
    let Some(app) = setup_test_app().await else {
        return;
    };

    let email = format!("{}@example.com", uuid::Uuid::new_v4());
    let response = app
        .server
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "email": email,
            "password": "Abcdef12",
            "name": "Login",
            "organizationName": unique_org_name("Login"),
        }))
        .await;
    assert_eq!(response.status_code(), 201);

    let bad = app
        .server
        .post("/api/auth/login")
        .json(&serde_json::json!({ "email": email, "password": "WrongPass1" }))
        .await;
    assert_eq!(bad.status_code(), 401);

    let good = app
        .server
        .post("/api/auth/login")
        .json(&serde_json::json!({ "email": email, "password": "Abcdef12" }))
        .await;
    assert_eq!(good.status_code(), 200);
    let body: serde_json::Value = good.json();
    assert!(body["access_token"].as_str().is_some());
}

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() {
    let Some(app) = setup_test_app().await else {
        return;
    };

    let email = format!("{}@example.com", uuid::Uuid::new_v4());
    let register = app
        .server
        .post("/api/auth/register")
        .json(&serde_json::json!({
            "email": email,
            "password": "Abcdef12",
            "name": "Rotate",
            "organizationName": unique_org_name("Rotate"),
        }))
        .await;
    assert_eq!(register.status_code(), 201);
    let first_cookie = register.cookie("refresh_token");

    // first refresh succeeds and rotates the slot
    let refreshed = app
        .server
        .post("/api/auth/refresh")
        .add_cookie(first_cookie.clone())
        .await;
    assert_eq!(refreshed.status_code(), 200);
    let body: serde_json::Value = refreshed.json();
    assert!(body["access_token"].as_str().is_some());

    // replaying the spent token fails
    let replayed = app
        .server
        .post("/api/auth/refresh")
        .add_cookie(first_cookie)
        .await;
    assert_eq!(replayed.status_code(), 401);
}

#[tokio::test]
async fn expired_access_token_reports_token_expired() {
    let Some(app) = setup_test_app().await else {
        return;
    };

    let user = register_admin(&app.server, &unique_org_name("Expiry")).await;

    // forge an already-expired token for the same user with the same
    // signing configuration
    use jsonwebtoken::{encode, EncodingKey, Header};
    let now = chrono::Utc::now().timestamp();
    let claims = serde_json::json!({
        "sub": user.user_id,
        "org": user.organization_id,
        "role": "admin",
        "kind": "access",
        "iat": now - 3600,
        "exp": now - 1800,
    });
    let expired = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(
            app.state.config.auth.access_token_secret.as_bytes(),
        ),
    )
    .unwrap();

    let response = app
        .server
        .get("/api/auth/me")
        .add_header("Authorization", format!("Bearer {}", expired))
        .await;
    assert_eq!(response.status_code(), 401);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "TOKEN_EXPIRED");
}
