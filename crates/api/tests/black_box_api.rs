use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use unitgate_api::app::{self, AppServices};
use unitgate_api::gating::GatingMode;
use unitgate_api::jwt::Hs256JwtValidator;
use unitgate_auth::{Action, IdentityClaims, Principal, ResourceKind, ResourceReference, Role, decide};
use unitgate_core::{PrincipalId, RequestId, UnitId};
use unitgate_infra::audit::{AuditEntry, AuditOutbox, RetryPolicy};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(GatingMode::Disable).await
    }

    async fn spawn_with(gating: GatingMode) -> Self {
        // Same router as prod, in-memory audit pipeline, ephemeral port.
        let services = Arc::new(AppServices::in_memory(gating));
        let jwt = Arc::new(Hs256JwtValidator::new(SECRET.as_bytes()));
        let app = app::build_app(services.clone(), jwt);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            services,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(role: &str, unit_id: Option<UnitId>) -> String {
    let now = Utc::now();
    let claims = IdentityClaims {
        sub: PrincipalId::new(),
        role: role.to_string(),
        unit_id,
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn create_record(srv: &TestServer, token: &str, kind: &str, owner: UnitId) -> Value {
    let res = srv
        .client
        .post(srv.url(&format!("/records/{kind}")))
        .bearer_auth(token)
        .json(&json!({ "owner_unit_id": owner, "data": { "note": "seed" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn anonymous_requests_are_denied_with_401() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/audit")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "UNAUTHENTICATED");
    assert_eq!(body["rule_id"], "unauthenticated");

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_tokens_are_rejected() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/whoami")).bearer_auth("not.a.jwt").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let unknown_role = mint_jwt("ROOT", Some(UnitId::new()));
    let res = srv.client.get(srv.url("/whoami")).bearer_auth(unknown_role).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credentials");
}

#[tokio::test]
async fn whoami_reflects_token() {
    let srv = TestServer::spawn().await;
    let unit = UnitId::new();
    let token = mint_jwt("NUTRICIONISTA", Some(unit));

    let res = srv.client.get(srv.url("/whoami")).bearer_auth(token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["role"], "NUTRICIONISTA");
    assert_eq!(body["tier"], "OPERATIONAL");
    assert_eq!(body["unit_id"], unit.to_string());
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let srv = TestServer::spawn().await;
    let request_id = RequestId::new();

    let res = srv
        .client
        .get(srv.url("/health"))
        .header("x-request-id", request_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], request_id.to_string().as_str());

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    let generated = res.headers()["x-request-id"].to_str().unwrap();
    assert!(generated.parse::<RequestId>().is_ok());
}

#[tokio::test]
async fn unit_roles_work_inside_their_unit_only() {
    let srv = TestServer::spawn().await;
    let u1 = UnitId::new();
    let u2 = UnitId::new();
    let director_u1 = mint_jwt("DIRETOR_UNIDADE", Some(u1));
    let director_u2 = mint_jwt("DIRETOR_UNIDADE", Some(u2));

    let record = create_record(&srv, &director_u1, "student", u1).await;
    let id = record["id"].as_str().unwrap();

    let res = srv
        .client
        .put(srv.url(&format!("/records/student/{id}")))
        .bearer_auth(&director_u1)
        .json(&json!({ "data": { "name": "Ana" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await.unwrap();
    assert_eq!(updated["version"], 2);

    let res = srv
        .client
        .get(srv.url(&format!("/records/student/{id}")))
        .bearer_auth(&director_u2)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "CROSS_UNIT_DENIED");
    assert_eq!(body["rule_id"], "unit.cross_unit");

    // Creating into another unit is refused the same way.
    let res = srv
        .client
        .post(srv.url("/records/student"))
        .bearer_auth(&director_u2)
        .json(&json!({ "owner_unit_id": u1, "data": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn strategic_roles_read_everything_but_do_not_execute() {
    let srv = TestServer::spawn().await;
    let unit = UnitId::new();
    let director = mint_jwt("DIRETOR_UNIDADE", Some(unit));
    let admin = mint_jwt("ADMIN_MATRIZ", None);

    let record = create_record(&srv, &director, "daily-log", unit).await;
    let id = record["id"].as_str().unwrap();

    let res = srv
        .client
        .get(srv.url(&format!("/records/daily-log/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .delete(srv.url(&format!("/records/daily-log/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "UNIT_EXECUTES_ONLY");

    // Administrative exception.
    let settings = create_record(&srv, &director, "unit-settings", unit).await;
    let res = srv
        .client
        .put(srv.url(&format!("/records/unit-settings/{}", settings["id"].as_str().unwrap())))
        .bearer_auth(&admin)
        .json(&json!({ "data": { "opening_hour": 7 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn nutritionist_is_limited_to_health_scope() {
    let srv = TestServer::spawn().await;
    let unit = UnitId::new();
    let director = mint_jwt("DIRETOR_UNIDADE", Some(unit));
    let nutritionist = mint_jwt("NUTRICIONISTA", Some(unit));

    let class = create_record(&srv, &director, "class", unit).await;
    let res = srv
        .client
        .get(srv.url(&format!("/records/class/{}", class["id"].as_str().unwrap())))
        .bearer_auth(&nutritionist)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "HEALTH_SCOPE_ONLY");

    let log = create_record(&srv, &nutritionist, "daily-log", unit).await;
    assert_eq!(log["owner_unit_id"], unit.to_string());
}

#[tokio::test]
async fn transfer_needs_write_in_destination_unit() {
    let srv = TestServer::spawn().await;
    let u1 = UnitId::new();
    let u2 = UnitId::new();
    let professor = mint_jwt("PROFESSOR", Some(u1));
    let director = mint_jwt("DIRETOR_UNIDADE", Some(u1));

    let log = create_record(&srv, &professor, "daily-log", u1).await;
    let id = log["id"].as_str().unwrap();

    let res = srv
        .client
        .post(srv.url(&format!("/records/daily-log/{id}/transfer")))
        .bearer_auth(&professor)
        .json(&json!({ "to_unit_id": u2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "CROSS_UNIT_DENIED");

    let res = srv
        .client
        .get(srv.url(&format!("/records/daily-log/{id}")))
        .bearer_auth(&director)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let unchanged: Value = res.json().await.unwrap();
    assert_eq!(unchanged["owner_unit_id"], u1.to_string());
    assert_eq!(unchanged["version"], 1);
}

#[tokio::test]
async fn transfer_moves_record_out_of_reach() {
    let srv = TestServer::spawn().await;
    let u1 = UnitId::new();
    let u2 = UnitId::new();
    let director = mint_jwt("DIRETOR_UNIDADE", Some(u1));
    let admin = mint_jwt("ADMIN_MATRIZ", None);

    let settings = create_record(&srv, &director, "unit-settings", u1).await;
    let id = settings["id"].as_str().unwrap();

    let res = srv
        .client
        .post(srv.url(&format!("/records/unit-settings/{id}/transfer")))
        .bearer_auth(&admin)
        .json(&json!({ "to_unit_id": u2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let moved: Value = res.json().await.unwrap();
    assert_eq!(moved["owner_unit_id"], u2.to_string());

    let res = srv
        .client
        .put(srv.url(&format!("/records/unit-settings/{id}")))
        .bearer_auth(&director)
        .json(&json!({ "data": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn audit_listing_is_scoped_to_the_callers_unit() {
    let srv = TestServer::spawn().await;
    let u1 = UnitId::new();
    let u2 = UnitId::new();
    let director_u2 = mint_jwt("DIRETOR_UNIDADE", Some(u2));
    let professor_u1 = mint_jwt("PROFESSOR", Some(u1));
    let gestor = mint_jwt("GESTOR_REDE", None);
    let request_id = RequestId::new();

    let res = srv
        .client
        .post(srv.url("/records/student"))
        .bearer_auth(&director_u2)
        .header("x-request-id", request_id.to_string())
        .json(&json!({ "owner_unit_id": u2, "data": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    create_record(&srv, &professor_u1, "planning", u1).await;

    let res = srv.client.get(srv.url("/audit")).bearer_auth(&professor_u1).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let entries: Vec<Value> = res.json().await.unwrap();
    assert!(entries.iter().any(|e| e["owner_unit_id"] == u1.to_string()));
    assert!(entries.iter().all(|e| e["owner_unit_id"] != u2.to_string()));

    let res = srv
        .client
        .get(srv.url(&format!("/audit?request_id={request_id}")))
        .bearer_auth(&professor_u1)
        .send()
        .await
        .unwrap();
    let entries: Vec<Value> = res.json().await.unwrap();
    assert!(entries.is_empty());

    let res = srv
        .client
        .get(srv.url(&format!("/audit?request_id={request_id}")))
        .bearer_auth(&gestor)
        .send()
        .await
        .unwrap();
    let entries: Vec<Value> = res.json().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["owner_unit_id"], u2.to_string());
}

#[tokio::test]
async fn dead_letters_are_listed_and_requeued_per_unit() {
    let srv = TestServer::spawn().await;
    let u1 = UnitId::new();
    let u2 = UnitId::new();
    let director_u1 = mint_jwt("DIRETOR_UNIDADE", Some(u1));
    let professor_u2 = mint_jwt("PROFESSOR", Some(u2));
    let gestor = mint_jwt("GESTOR_REDE", None);

    // Park one entry of unit 1 in the dead-letter queue.
    let secretary = Principal::new(PrincipalId::new(), Role::Secretaria, Some(u1));
    let resource = ResourceReference::owned(ResourceKind::Student, u1);
    let decision = decide(&secretary, &resource, Action::Write);
    let entry = AuditEntry::from_decision(&decision, &secretary, &resource, Action::Write, RequestId::new(), Utc::now());
    let entry_id = entry.entry_id;
    let outbox = srv.services.recorder.outbox();
    outbox.enqueue(entry, "store down".into()).unwrap();
    outbox
        .mark_failed(entry_id, "still down".into(), &RetryPolicy::fixed(1, std::time::Duration::ZERO), Utc::now())
        .unwrap();

    let listed = |token: String| {
        let req = srv.client.get(srv.url("/audit/dead-letters")).bearer_auth(token);
        async move {
            let res = req.send().await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            res.json::<Vec<Value>>().await.unwrap().len()
        }
    };
    assert_eq!(listed(professor_u2.clone()).await, 0);
    assert_eq!(listed(director_u1.clone()).await, 1);

    let requeue = srv.url(&format!("/audit/dead-letters/{entry_id}/requeue"));
    let res = srv.client.post(&requeue).bearer_auth(&professor_u2).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = srv.client.post(&requeue).bearer_auth(&gestor).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let stats = outbox.stats().unwrap();
    assert_eq!((stats.pending, stats.dead_lettered), (1, 0));
}

#[tokio::test]
async fn every_decision_is_audited_under_its_request_id() {
    let srv = TestServer::spawn().await;
    let u1 = UnitId::new();
    let u2 = UnitId::new();
    let professor = mint_jwt("PROFESSOR", Some(u1));
    let admin = mint_jwt("GESTOR_REDE", None);
    let request_id = RequestId::new();

    let res = srv
        .client
        .post(srv.url("/records/planning"))
        .bearer_auth(&professor)
        .header("x-request-id", request_id.to_string())
        .json(&json!({ "owner_unit_id": u2, "data": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .get(srv.url(&format!("/audit?request_id={request_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let entries: Vec<Value> = res.json().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["allowed"], false);
    assert_eq!(entries[0]["reason_code"], "CROSS_UNIT_DENIED");
    assert_eq!(entries[0]["resource_kind"], "planning");
    assert_eq!(entries[0]["owner_unit_id"], u2.to_string());
    assert_eq!(entries[0]["role"], "PROFESSOR");
}

#[tokio::test]
async fn explain_returns_trace_matching_decision() {
    let srv = TestServer::spawn().await;
    let unit = UnitId::new();
    let token = mint_jwt("NUTRICIONISTA", Some(unit));

    let res = srv
        .client
        .post(srv.url("/authz/explain"))
        .bearer_auth(&token)
        .json(&json!({ "kind": "appointment", "owner_unit_id": unit, "action": "write" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["decision"]["allowed"], false);
    assert_eq!(body["decision"]["rule_id"], "operational.nutritionist_out_of_scope");
    let trace = body["trace"].as_array().unwrap();
    assert_eq!(trace.last().unwrap()["matched"], true);
}

#[tokio::test]
async fn explain_does_not_reveal_foreign_owners() {
    let srv = TestServer::spawn().await;
    let u1 = UnitId::new();
    let u2 = UnitId::new();
    let director_u1 = mint_jwt("DIRETOR_UNIDADE", Some(u1));
    let director_u2 = mint_jwt("DIRETOR_UNIDADE", Some(u2));

    let record = create_record(&srv, &director_u1, "class", u1).await;
    let body = json!({ "kind": "class", "record_id": record["id"], "action": "read" });

    let res = srv
        .client
        .post(srv.url("/authz/explain"))
        .bearer_auth(&director_u2)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let text = res.text().await.unwrap();
    assert!(!text.contains(&u1.to_string()));

    let res = srv
        .client
        .post(srv.url("/authz/explain"))
        .bearer_auth(&director_u1)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let explained: Value = res.json().await.unwrap();
    assert_eq!(explained["resource"]["owner_unit_id"], u1.to_string());
}

#[tokio::test]
async fn controls_render_per_gating_mode() {
    let unit = UnitId::new();
    let token = mint_jwt("GESTOR_REDE", None);
    let body = json!({
        "controls": [
            { "kind": "student", "owner_unit_id": unit, "action": "read" },
            { "kind": "student", "owner_unit_id": unit, "action": "delete" }
        ]
    });

    let srv = TestServer::spawn_with(GatingMode::Disable).await;
    let res = srv
        .client
        .post(srv.url("/authz/controls"))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let controls: Vec<Value> = res.json().await.unwrap();
    assert_eq!(controls[0]["state"], "enabled");
    assert_eq!(controls[1]["state"], "disabled");
    assert_eq!(controls[1]["reason_code"], "UNIT_EXECUTES_ONLY");
    assert!(!controls[1]["reason"].as_str().unwrap().is_empty());

    let srv = TestServer::spawn_with(GatingMode::Hide).await;
    let res = srv
        .client
        .post(srv.url("/authz/controls"))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await
        .unwrap();
    let controls: Vec<Value> = res.json().await.unwrap();
    assert_eq!(controls[1]["state"], "hidden");
}

#[tokio::test]
async fn taxonomy_lists_every_role_once() {
    let srv = TestServer::spawn().await;
    let body: Value = srv.client.get(srv.url("/authz/taxonomy")).send().await.unwrap().json().await.unwrap();

    let roles: Vec<&str> = body["tiers"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|t| t["roles"].as_array().unwrap().iter().map(|r| r.as_str().unwrap()))
        .collect();
    assert_eq!(roles.len(), 7);
    assert!(roles.contains(&"COORD_PEDAGOGICO"));
    assert_eq!(body["resource_kinds"].as_array().unwrap().len(), 9);
}
