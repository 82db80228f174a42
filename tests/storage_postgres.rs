//! PostgreSQL store integration tests using testcontainers.
//!
//! Run with: cargo test --test storage_postgres --features postgres-tests -- --nocapture
//!
//! Each test starts its own PostgreSQL container, runs the migrations and
//! seeds rows with plain SQL.

use std::sync::Arc;
use std::time::Duration;

use academy_runtime::models::{Certificate, Payment, PaymentStatus, Review};
use academy_runtime::store::{
    CertificateStore, EnrollmentStore, PgStore, ReviewStore, StoreError,
};
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};
use uuid::Uuid;

async fn start_postgres() -> (testcontainers::ContainerAsync<GenericImage>, String) {
    let image = GenericImage::new("postgres", "16")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stdout(
            "database system is ready to accept connections",
        ));

    let container = image
        .with_env_var("POSTGRES_USER", "academy")
        .with_env_var("POSTGRES_PASSWORD", "academy")
        .with_env_var("POSTGRES_DB", "academy")
        .with_startup_timeout(Duration::from_secs(60))
        .start()
        .await
        .expect("Failed to start postgres container");

    // the ready message is printed once during init as well
    tokio::time::sleep(Duration::from_secs(1)).await;

    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get mapped port");
    let host = container
        .get_host()
        .await
        .expect("Failed to get container host");

    let url = format!("postgres://academy:academy@{host}:{port}/academy");
    println!("PostgreSQL available at: {url}");
    (container, url)
}

async fn connect_and_migrate(url: &str) -> PgPool {
    let pool = PgPool::connect(url)
        .await
        .expect("Failed to connect to PostgreSQL");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn seed_student(pool: &PgPool, email: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO students (id, first_name, last_name, email) VALUES ($1, 'Ada', 'Lovelace', $2)")
        .bind(id)
        .bind(email)
        .execute(pool)
        .await
        .expect("seed student");
    id
}

async fn seed_course(pool: &PgPool, name: &str) -> Uuid {
    let category = Uuid::new_v4();
    sqlx::query("INSERT INTO categories (id, name, is_free) VALUES ($1, 'Foundations', true)")
        .bind(category)
        .execute(pool)
        .await
        .expect("seed category");
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO courses (id, category_id, name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(category)
        .bind(name)
        .execute(pool)
        .await
        .expect("seed course");
    id
}

fn certificate(student_id: Uuid, course_id: Uuid, number: &str) -> Certificate {
    Certificate {
        id: Uuid::new_v4(),
        student_id,
        course_id,
        issue_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        certification_number: number.into(),
        created_at: Utc::now(),
    }
}

async fn certificate_rows(pool: &PgPool, student_id: Uuid, course_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM certificates WHERE student_id=$1 AND course_id=$2")
        .bind(student_id)
        .bind(course_id)
        .fetch_one(pool)
        .await
        .expect("count certificates")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_certificate_inserts_keep_one_row() {
    let (_container, url) = start_postgres().await;
    let pool = connect_and_migrate(&url).await;
    let student = seed_student(&pool, "ada@example.com").await;
    let course = seed_course(&pool, "Analytical Engines").await;
    let store = Arc::new(PgStore::new(pool.clone()));

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .insert_certificate_if_absent(&certificate(student, course, &format!("CERT-RACE-{i:02}")))
                .await
        }));
    }

    let mut created = 0;
    let mut numbers = Vec::new();
    for handle in handles {
        let insertion = handle.await.expect("join").expect("insert");
        if insertion.created() {
            created += 1;
        }
        numbers.push(insertion.into_inner().certification_number);
    }

    assert_eq!(created, 1);
    numbers.dedup();
    assert_eq!(numbers.len(), 1, "every caller sees the stored number");
    assert_eq!(certificate_rows(&pool, student, course).await, 1);
}

#[tokio::test]
async fn test_certification_number_clash_is_a_duplicate_key() {
    let (_container, url) = start_postgres().await;
    let pool = connect_and_migrate(&url).await;
    let ada = seed_student(&pool, "ada@example.com").await;
    let grace = seed_student(&pool, "grace@example.com").await;
    let course = seed_course(&pool, "Compilers").await;
    let store = PgStore::new(pool.clone());

    store
        .insert_certificate_if_absent(&certificate(ada, course, "CERT-20261019-0A1B2C3D"))
        .await
        .expect("first insert");

    let err = store
        .insert_certificate_if_absent(&certificate(grace, course, "CERT-20261019-0A1B2C3D"))
        .await
        .unwrap_err();
    match err {
        StoreError::DuplicateKey(constraint) => {
            assert_eq!(constraint, "certificates_certification_number_key")
        }
        other => panic!("expected DuplicateKey, got {other:?}"),
    }
    assert_eq!(certificate_rows(&pool, grace, course).await, 0);

    // the stored certificate is untouched
    let stored = store
        .find_certificate_by_number("CERT-20261019-0A1B2C3D")
        .await
        .expect("lookup")
        .expect("stored row");
    assert_eq!(stored.student_id, ada);
}

#[tokio::test]
async fn test_reviews_and_purchases_round_through_sql() {
    let (_container, url) = start_postgres().await;
    let pool = connect_and_migrate(&url).await;
    let student = seed_student(&pool, "ada@example.com").await;
    let course = seed_course(&pool, "Analytical Engines").await;
    let store = PgStore::new(pool);

    for rating in [5, 4, 4] {
        store
            .insert_review(&Review {
                id: Uuid::new_v4(),
                student_id: student,
                course_id: course,
                rating,
                review_text: "Solid".into(),
                created_at: Utc::now(),
            })
            .await
            .expect("insert review");
    }
    let summary = store.rating_summary(course).await.expect("summary");
    assert_eq!(summary.rating_count, 3);
    assert_eq!(summary.average_rating, 4.3);
    assert_eq!(store.rating_summary(Uuid::new_v4()).await.expect("empty").rating_count, 0);

    store
        .insert_payment(&Payment {
            id: Uuid::new_v4(),
            student_id: student,
            course_id: course,
            expected_amount: 5_000,
            total_amount: 5_000,
            sender_phone_number: None,
            status: PaymentStatus::Pending.as_str().to_string(),
            payment_date: Utc::now(),
        })
        .await
        .expect("insert payment");
    let purchases = store.list_purchases(student).await.expect("purchases");
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].course_name, "Analytical Engines");
    assert_eq!(purchases[0].status, "pending");
}
