// tests/api_tests.rs
//
// End-to-end quiz flow against a real Postgres. Set DATABASE_URL to run;
// without it every test returns early.

use backend::{config::Config, routes, state::AppState, utils::hash::hash_password};
use sqlx::{PgPool, postgres::PgPoolOptions};

/// Spawns the app on a random port. Returns the base URL and a pool for seeding.
async fn spawn_app() -> Option<(String, PgPool)> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping end-to-end test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        port: 0,
        cors_origins: vec![],
    };

    let app = routes::create_router(AppState {
        pool: pool.clone(),
        config,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some((address, pool))
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

async fn login(client: &reqwest::Client, address: &str, username: &str, password: &str) -> String {
    let resp = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    resp["token"].as_str().expect("Token not found").to_string()
}

async fn seed_admin(pool: &PgPool, client: &reqwest::Client, address: &str) -> String {
    let username = unique_name("adm");
    let password = "admin_password";
    sqlx::query("INSERT INTO users (username, password, role) VALUES ($1, $2, 'admin')")
        .bind(&username)
        .bind(hash_password(password).unwrap())
        .execute(pool)
        .await
        .unwrap();

    login(client, address, &username, password).await
}

async fn register_user(client: &reqwest::Client, address: &str) -> String {
    let username = unique_name("u");
    let password = "password123";
    let resp = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(resp.status().as_u16(), 201);

    login(client, address, &username, password).await
}

/// Creates a published course with a two-question quiz (5 + 10 points, pass at 70%).
/// Returns (course_id, quiz_id, single_choice_question_id, multi_select_question_id).
async fn seed_quiz(client: &reqwest::Client, address: &str, admin: &str) -> (i64, i64, i64, i64) {
    let course: serde_json::Value = client
        .post(format!("{}/api/admin/courses", address))
        .bearer_auth(admin)
        .json(&serde_json::json!({ "title": "Backend interviews", "is_published": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let course_id = course["id"].as_i64().unwrap();

    let created: serde_json::Value = client
        .post(format!("{}/api/admin/courses/{}/quizzes", address, course_id))
        .bearer_auth(admin)
        .json(&serde_json::json!({
            "title": "Caching",
            "passing_score": 70,
            "max_attempts": 3,
            "questions": [
                {
                    "type": "single_choice",
                    "content": "Which HTTP method is idempotent?",
                    "options": ["POST", "PUT"],
                    "correct_answer": "PUT",
                    "points": 5
                },
                {
                    "type": "multi_select",
                    "content": "Which are in-memory caches?",
                    "options": ["Redis", "Memcached", "Postgres"],
                    "correct_answer": ["Redis", "Memcached"],
                    "points": 10
                }
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let quiz_id = created["quiz"]["id"].as_i64().unwrap();
    let q1 = created["questions"][0]["id"].as_i64().unwrap();
    let q2 = created["questions"][1]["id"].as_i64().unwrap();
    (course_id, quiz_id, q1, q2)
}

#[tokio::test]
async fn test_quiz_attempt_lifecycle() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let admin = seed_admin(&pool, &client, &address).await;
    let (course_id, quiz_id, q1, q2) = seed_quiz(&client, &address, &admin).await;
    let user = register_user(&client, &address).await;

    // Not enrolled yet
    let resp = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = client
        .post(format!("{}/api/courses/{}/enroll", address, course_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    // Taker view hides answers
    let view: serde_json::Value = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["total_points"], 15);
    assert!(view["questions"][0].get("correct_answer").is_none());

    // Attempt 1
    let attempt: serde_json::Value = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(attempt["attempt_number"], 1);
    assert_eq!(attempt["max_score"], 15);
    let attempt_id = attempt["id"].as_i64().unwrap();

    // Wrong first, then resubmitted correctly (upsert)
    let first: serde_json::Value = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .bearer_auth(&user)
        .json(&serde_json::json!({ "question_id": q1, "answer": "POST", "time_spent": 4 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["is_correct"], false);

    let resp = client
        .post(format!("{}/api/attempts/{}/answers/bulk", address, attempt_id))
        .bearer_auth(&user)
        .json(&serde_json::json!({ "answers": [
            { "question_id": q1, "answer": "PUT", "time_spent": 6 },
            { "question_id": q2, "answer": ["Memcached", "Redis"], "time_spent": 9 }
        ]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let finished: serde_json::Value = client
        .post(format!("{}/api/attempts/{}/finish", address, attempt_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(finished["score"], 15);
    assert_eq!(finished["passed"], true);
    assert_eq!(finished["percentage"], 100.0);

    // Completed attempts are immutable
    let resp = client
        .post(format!("{}/api/attempts/{}/finish", address, attempt_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .bearer_auth(&user)
        .json(&serde_json::json!({ "question_id": q1, "answer": "POST" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let detail: serde_json::Value = client
        .get(format!("{}/api/attempts/{}", address, attempt_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["score"], 15);
    assert_eq!(detail["status"], "COMPLETED");
    let earned: i64 = detail["responses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["points_earned"].as_i64().unwrap())
        .sum();
    assert_eq!(earned, 15);

    // Attempts 2 and 3, then the limit
    for expected in 2..=3 {
        let attempt: serde_json::Value = client
            .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
            .bearer_auth(&user)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(attempt["attempt_number"], expected);
    }

    let resp = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let list: serde_json::Value = client
        .get(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["attempts_remaining"], 0);
    assert_eq!(list["attempts"].as_array().unwrap().len(), 3);

    let board: Vec<serde_json::Value> = client
        .get(format!("{}/api/quizzes/{}/leaderboard", address, quiz_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0]["score"], 15);

    // Unpublished courses expose no leaderboard
    let resp = client
        .put(format!("{}/api/admin/courses/{}", address, course_id))
        .bearer_auth(&admin)
        .json(&serde_json::json!({ "is_published": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let board: Vec<serde_json::Value> = client
        .get(format!("{}/api/quizzes/{}/leaderboard", address, quiz_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(board.is_empty());
}

#[tokio::test]
async fn test_start_waits_for_pending_question_edit() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let admin = seed_admin(&pool, &client, &address).await;
    let (course_id, quiz_id, _, _) = seed_quiz(&client, &address, &admin).await;
    let user = register_user(&client, &address).await;

    client
        .post(format!("{}/api/courses/{}/enroll", address, course_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();

    // An admin edit in flight: quiz locked, a 20-point question not yet committed
    let mut edit = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM quizzes WHERE id = $1 FOR UPDATE")
        .bind(quiz_id)
        .execute(&mut *edit)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO questions (quiz_id, type, content, correct_answer, points, position)
         VALUES ($1, 'short_answer', 'Name a CAP property', '\"Consistency\"', 20, 2)",
    )
    .bind(quiz_id)
    .execute(&mut *edit)
    .await
    .unwrap();

    let start = tokio::spawn({
        let client = client.clone();
        let url = format!("{}/api/quizzes/{}/attempts", address, quiz_id);
        async move {
            client
                .post(url)
                .bearer_auth(&user)
                .send()
                .await
                .unwrap()
                .json::<serde_json::Value>()
                .await
                .unwrap()
        }
    });

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    edit.commit().await.unwrap();

    let attempt = start.await.unwrap();
    assert_eq!(attempt["attempt_number"], 1);
    assert_eq!(attempt["max_score"], 35);
}

#[tokio::test]
async fn test_other_users_cannot_touch_attempt() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let admin = seed_admin(&pool, &client, &address).await;
    let (course_id, quiz_id, q1, _) = seed_quiz(&client, &address, &admin).await;
    let owner = register_user(&client, &address).await;
    let intruder = register_user(&client, &address).await;

    client
        .post(format!("{}/api/courses/{}/enroll", address, course_id))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();

    let attempt: serde_json::Value = client
        .post(format!("{}/api/quizzes/{}/attempts", address, quiz_id))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let attempt_id = attempt["id"].as_i64().unwrap();

    let resp = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .bearer_auth(&intruder)
        .json(&serde_json::json!({ "question_id": q1, "answer": "PUT" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // Questions are frozen once attempts exist
    let resp = client
        .post(format!("{}/api/admin/quizzes/{}/questions", address, quiz_id))
        .bearer_auth(&admin)
        .json(&serde_json::json!({
            "type": "short_answer",
            "content": "Name a CAP property",
            "correct_answer": "Consistency",
            "points": 5
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
async fn test_lesson_progress() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    let admin = seed_admin(&pool, &client, &address).await;
    let (course_id, _, _, _) = seed_quiz(&client, &address, &admin).await;

    let mut lesson_ids = Vec::new();
    for title in ["Intro", "Deep dive"] {
        let lesson: serde_json::Value = client
            .post(format!("{}/api/admin/courses/{}/lessons", address, course_id))
            .bearer_auth(&admin)
            .json(&serde_json::json!({
                "title": title,
                "content": "<p>Body</p><script>alert(1)</script>"
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(lesson["content"], "<p>Body</p>");
        lesson_ids.push(lesson["id"].as_i64().unwrap());
    }

    let user = register_user(&client, &address).await;

    let resp = client
        .get(format!("{}/api/lessons/{}", address, lesson_ids[0]))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    client
        .post(format!("{}/api/courses/{}/enroll", address, course_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();

    let mut last = serde_json::Value::Null;
    for id in &lesson_ids {
        last = client
            .post(format!("{}/api/lessons/{}/complete", address, id))
            .bearer_auth(&user)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    }
    assert_eq!(last["progress"], 100);
    assert_eq!(last["status"], "completed");

    // Dropping and re-enrolling starts the course over
    let resp = client
        .delete(format!("{}/api/courses/{}/enroll", address, course_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    let resp = client
        .post(format!("{}/api/courses/{}/enroll", address, course_id))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let again: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(again["status"], "active");
    assert_eq!(again["progress"], 0);
    assert!(again["completed_at"].is_null());

    let after: serde_json::Value = client
        .post(format!("{}/api/lessons/{}/complete", address, lesson_ids[0]))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after["progress"], 50);
    assert_eq!(after["status"], "active");
}
