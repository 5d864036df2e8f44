//! End-to-end registration tests over HTTP.
//!
//! Each test binds the onboarding API to a free local port with the
//! in-memory backend and drives the wizards with reqwest, the way the UI
//! does.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use evalon_wizard::mock::{MockBackend, MOCK_OTP_CODE};
use evalon_wizard::{create_router, AppState, Config, RegistrationBackend, WizardKind};
use serde_json::{json, Value};

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// A running API server and a client pointed at it.
struct TestServer {
    base: String,
    client: reqwest::Client,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(backend: Arc<MockBackend>) -> Self {
        let port = find_available_port();
        let addr = format!("127.0.0.1:{port}");
        let state = AppState::new(Config::default(), backend.clone(), backend);
        let router = create_router(state);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base: format!("http://{addr}/api"),
            client: reqwest::Client::new(),
            _handle: handle,
        }
    }

    async fn post(&self, path: &str, body: &Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await
            .expect("Request failed");
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .expect("Request failed");
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn create(&self, kind: &str) -> String {
        let (status, view) = self.post("/wizards", &json!({ "kind": kind })).await;
        assert_eq!(status, 201, "create failed: {view}");
        view["id"].as_str().expect("view has an id").to_string()
    }

    async fn fill(&self, id: &str, fields: &[(&str, Value)]) -> Value {
        let mut view = Value::Null;
        for (field, value) in fields {
            let response = self
                .client
                .patch(format!("{}/wizards/{id}/fields", self.base))
                .json(&json!({ "field": field, "value": value }))
                .send()
                .await
                .expect("Request failed");
            assert_eq!(response.status().as_u16(), 200, "patch {field} failed");
            view = response.json().await.expect("view body");
        }
        view
    }

    async fn advance(&self, id: &str) -> Value {
        let (status, body) = self
            .post(&format!("/wizards/{id}/advance"), &json!({}))
            .await;
        assert_eq!(status, 200);
        body
    }

    async fn send_otp(&self, id: &str, channel: &str) -> (u16, Value) {
        self.post(&format!("/wizards/{id}/otp/{channel}/send"), &json!({}))
            .await
    }

    async fn verify_otp(&self, id: &str, channel: &str, code: &str) -> (u16, Value) {
        self.post(
            &format!("/wizards/{id}/otp/{channel}/verify"),
            &json!({ "code": code }),
        )
        .await
    }
}

/// Registers "Green Valley School" and returns its organisation code.
async fn register_organisation(server: &TestServer, admin_email: &str) -> String {
    let id = server.create("organization").await;
    server
        .fill(
            &id,
            &[
                ("organisationName", json!("Green Valley School")),
                ("country", json!("IN")),
                ("state", json!("MH")),
                ("city", json!("Pune")),
                ("pincode", json!("411001")),
                ("organisationType", json!("school")),
            ],
        )
        .await;
    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "advanced", "{body}");
    let org_code = body["wizard"]["form"]["orgCode"]
        .as_str()
        .expect("org code issued")
        .to_string();

    server
        .fill(
            &id,
            &[
                ("adminName", json!("Ravi Kumar")),
                ("adminEmail", json!(admin_email)),
                ("adminPhone", json!("9876543210")),
                ("password", json!("Str0ng!pass")),
                ("confirmPassword", json!("Str0ng!pass")),
            ],
        )
        .await;
    server.send_otp(&id, "email").await;
    server.verify_otp(&id, "email", MOCK_OTP_CODE).await;
    assert_eq!(server.advance(&id).await["outcome"], "advanced");

    server
        .fill(
            &id,
            &[
                ("institutionStructure", json!("single")),
                ("timeZone", json!("Asia/Kolkata")),
            ],
        )
        .await;
    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "completed", "{body}");
    org_code
}

#[tokio::test]
async fn test_organisation_registration_end_to_end() {
    let server = TestServer::spawn(Arc::new(MockBackend::new())).await;
    let id = server.create("organization").await;

    server
        .fill(
            &id,
            &[
                ("organisationName", json!("Green Valley School")),
                ("country", json!("IN")),
                ("state", json!("MH")),
                ("city", json!("Pune")),
                ("pincode", json!("411001")),
                ("organisationType", json!("school")),
            ],
        )
        .await;
    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "advanced");
    assert_eq!(body["wizard"]["step"], 1);
    let org_code = body["wizard"]["form"]["orgCode"].as_str().unwrap();
    assert!(org_code.starts_with("IN-GRE-"), "unexpected code {org_code}");

    let view = server
        .fill(
            &id,
            &[
                ("adminName", json!("Ravi Kumar")),
                ("adminEmail", json!("ravi@gvs.edu")),
                ("adminPhone", json!("9876543210")),
                ("password", json!("Str0ng!pass")),
                ("confirmPassword", json!("Str0ng!pass")),
            ],
        )
        .await;
    assert_eq!(view["form"]["password"], "********");

    // Unverified email blocks the step.
    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "invalid");
    assert_eq!(body["errors"]["emailVerified"], "Please Verify Your Email");
    assert_eq!(body["wizard"]["step"], 1);

    let (status, view) = server.send_otp(&id, "email").await;
    assert_eq!(status, 200);
    assert_eq!(view["otp"]["email"]["state"], "sent");
    assert!(view["otp"]["email"]["countdown"].as_u64().unwrap() > 0);

    let (status, view) = server.verify_otp(&id, "email", "000000").await;
    assert_eq!(status, 200);
    assert_eq!(view["otp"]["email"]["state"], "sent");
    assert_eq!(view["otp"]["email"]["error"], "Invalid or expired OTP");

    let (_, view) = server.verify_otp(&id, "email", MOCK_OTP_CODE).await;
    assert_eq!(view["otp"]["email"]["verified"], true);
    assert_eq!(view["form"]["emailVerified"], true);

    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "advanced");
    assert_eq!(body["to"], 2);

    server
        .fill(
            &id,
            &[
                ("institutionStructure", json!("single")),
                ("timeZone", json!("Asia/Kolkata")),
                ("departments", json!(["Science", "Arts"])),
            ],
        )
        .await;
    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "completed");
    assert_eq!(body["session"]["userType"], "organization_admin");
    assert!(body["session"]["organizationId"].is_string());
    assert_eq!(body["wizard"]["completed"], true);
    assert_eq!(
        body["wizard"]["notification"]["message"],
        "Organization registered successfully!"
    );

    let (status, session) = server
        .post(
            "/login",
            &json!({ "email": "ravi@gvs.edu", "password": "Str0ng!pass" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(session["userType"], "organization_admin");
}

#[tokio::test]
async fn test_student_joins_registered_organisation() {
    let server = TestServer::spawn(Arc::new(MockBackend::new())).await;
    let org_code = register_organisation(&server, "admin@gvs.edu").await;

    let id = server.create("student").await;
    server
        .fill(
            &id,
            &[
                ("fullName", json!("Meera Nair")),
                ("phoneNumber", json!("9876543210")),
                ("emailAddress", json!("meera@mail.com")),
                ("dateOfBirth", json!("2010-05-14")),
                ("gender", json!("female")),
                ("country", json!("IN")),
                ("city", json!("Pune")),
                ("pincode", json!("411002")),
            ],
        )
        .await;
    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "advanced", "{body}");

    server
        .fill(
            &id,
            &[
                ("organizationCode", json!(org_code.to_lowercase())),
                ("academicLevel", json!("8")),
            ],
        )
        .await;
    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "advanced", "{body}");
    assert_eq!(body["wizard"]["form"]["organizationName"], "Green Valley School");
    assert_eq!(body["wizard"]["form"]["associationStatus"], "verified");
    assert_eq!(body["wizard"]["form"]["isOrganizationValid"], true);

    // Security step needs both channels verified.
    server
        .fill(
            &id,
            &[
                ("password", json!("Stud3nt!pw")),
                ("confirmPassword", json!("Stud3nt!pw")),
            ],
        )
        .await;
    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "invalid");
    assert_eq!(body["errors"]["phoneVerified"], "Please Verify Your Phone Number");

    for channel in ["email", "phone"] {
        let (status, _) = server.send_otp(&id, channel).await;
        assert_eq!(status, 200);
        let (_, view) = server.verify_otp(&id, channel, MOCK_OTP_CODE).await;
        assert_eq!(view["otp"][channel]["verified"], true, "{channel}");
    }

    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "advanced");
    assert_eq!(body["to"], 3);

    let (status, summary) = server.get(&format!("/wizards/{id}/summary")).await;
    assert_eq!(status, 200);
    assert_eq!(summary["status"], "ready_to_submit");
    assert!(!summary.to_string().contains("Stud3nt!pw"));

    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "completed", "{body}");
    assert_eq!(body["session"]["userType"], "student");
    assert!(body["session"]["organizationId"].is_string());

    let (status, _) = server
        .post(
            "/login",
            &json!({ "email": "meera@mail.com", "password": "Stud3nt!pw", "userType": "student" }),
        )
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_student_underage_is_rejected_before_submit() {
    let backend = Arc::new(MockBackend::new());
    let server = TestServer::spawn(backend.clone()).await;
    let id = server.create("student").await;
    server
        .fill(
            &id,
            &[
                ("fullName", json!("Tiny Tim")),
                ("phoneNumber", json!("9876543210")),
                ("emailAddress", json!("tim@mail.com")),
                ("dateOfBirth", json!("2099-01-01")),
                ("gender", json!("male")),
                ("country", json!("IN")),
                ("city", json!("Pune")),
                ("pincode", json!("411002")),
            ],
        )
        .await;

    let body = server.advance(&id).await;
    assert_eq!(body["outcome"], "rejected");
    assert_eq!(body["notification"]["severity"], "error");
    assert_eq!(body["wizard"]["step"], 0);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_teacher_duplicate_email_gets_friendly_message() {
    let server = TestServer::spawn(Arc::new(MockBackend::new())).await;
    let basic = [
        ("fullName", json!("Asha Rao")),
        ("emailAddress", json!("asha@school.edu")),
        ("country", json!("IN")),
        ("city", json!("Mysuru")),
        ("pincode", json!("570001")),
    ];

    let first = server.create("teacher").await;
    server.fill(&first, &basic).await;
    assert_eq!(server.advance(&first).await["outcome"], "advanced");
    server
        .fill(
            &first,
            &[
                ("subjects", json!(["Maths"])),
                ("role", json!("teacher")),
            ],
        )
        .await;
    assert_eq!(server.advance(&first).await["outcome"], "advanced");
    server
        .fill(
            &first,
            &[
                ("password", json!("Teach3r!pw")),
                ("confirmPassword", json!("Teach3r!pw")),
            ],
        )
        .await;
    let body = server.advance(&first).await;
    assert_eq!(body["outcome"], "completed", "{body}");
    assert_eq!(
        body["wizard"]["notification"]["message"],
        "Registration completed successfully!"
    );

    let second = server.create("teacher").await;
    server.fill(&second, &basic).await;
    let body = server.advance(&second).await;
    assert_eq!(body["outcome"], "rejected");
    assert!(body["notification"]["message"]
        .as_str()
        .unwrap()
        .contains("already registered"));
    assert_eq!(body["wizard"]["step"], 0);
}

#[tokio::test]
async fn test_resume_registration() {
    let backend = Arc::new(MockBackend::new());
    let server = TestServer::spawn(backend.clone()).await;

    let data = backend
        .submit_step(
            WizardKind::Organisation,
            1,
            &json!({
                "organisationName": "Riverdale Academy",
                "country": "US",
                "state": "CA",
                "city": "Los Angeles",
                "pincode": "900001",
                "organisationType": "school"
            }),
        )
        .await
        .unwrap();
    let token = data["registrationToken"].as_str().unwrap();

    let (status, view) = server
        .post(
            "/wizards/resume",
            &json!({ "kind": "organization", "registrationToken": token }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(view["step"], 1);
    assert_eq!(view["hasRegistrationToken"], true);
    assert_eq!(view["form"]["organisationName"], "Riverdale Academy");
    assert!(view["form"]["orgCode"].as_str().unwrap().starts_with("US-RIV-"));

    let (status, view) = server
        .post(
            "/wizards/resume",
            &json!({ "kind": "organization", "registrationToken": "reg_unknown" }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(view["step"], 0);
    assert_eq!(view["hasRegistrationToken"], false);
    assert_eq!(view["notification"]["severity"], "warning");
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let server = TestServer::spawn(Arc::new(MockBackend::new())).await;
    let teacher = server.create("teacher").await;
    let student = server.create("student").await;

    let teacher_fields = [("fullName", json!("Asha Rao"))];
    let student_fields = [("fullName", json!("Meera Nair"))];
    let (a, b) = tokio::join!(
        server.fill(&teacher, &teacher_fields),
        server.fill(&student, &student_fields),
    );
    assert_eq!(a["form"]["fullName"], "Asha Rao");
    assert_eq!(b["form"]["fullName"], "Meera Nair");
    assert_eq!(a["kind"], "teacher");
    assert_eq!(b["kind"], "student");

    let (status, _) = server
        .post(&format!("/wizards/{teacher}/retreat"), &json!({}))
        .await;
    assert_eq!(status, 200);
    let (_, view) = server.get(&format!("/wizards/{student}")).await;
    assert_eq!(view["form"]["fullName"], "Meera Nair");
}

#[tokio::test]
async fn test_password_strength_endpoint() {
    let server = TestServer::spawn(Arc::new(MockBackend::new())).await;

    let (status, body) = server
        .post("/password/strength", &json!({ "password": "Abcdef12!" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["score"], 4);
    assert_eq!(body["label"], "Strong");
    assert_eq!(body["color"], "success");
    assert_eq!(body["percentage"], 90);
    assert_eq!(body["tips"], json!([]));

    let (_, body) = server
        .post("/password/strength", &json!({ "password": "" }))
        .await;
    assert_eq!(body["score"], 0);
    assert_eq!(body["label"], "");
    assert_eq!(body["color"], "default");
}
