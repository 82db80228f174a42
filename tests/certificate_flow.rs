mod common;

use std::fs;

use academy_runtime::certificate::{ArtifactCache, CertificateError, ErrorKind};
use academy_runtime::store::CertificateStore;
use common::Fixture;

#[tokio::test]
async fn completing_every_lesson_issues_one_certificate() {
    let fx = Fixture::new().await;
    let certs = fx.certificates();

    for (i, lesson) in fx.lessons.iter().enumerate() {
        assert!(fx.record(lesson).await);
        let outcome = certs
            .on_lesson_completed(fx.student.id, fx.course.id)
            .await
            .unwrap();
        assert_eq!(outcome.progress.completed_lessons as usize, i + 1);
        assert_eq!(outcome.progress.total_lessons, 4);

        if i < 3 {
            assert!(outcome.certificate.is_none());
            assert!(fx.rendered_files().is_empty());
        } else {
            assert_eq!(outcome.progress.percent(), 100.0);
            let issued = outcome.certificate.unwrap().unwrap();
            assert!(issued.created);
            assert!(issued.artifact.path.is_file());
            assert_eq!(
                issued.artifact.file_name,
                ArtifactCache::file_name(&issued.certificate)
            );
            assert!(issued
                .artifact
                .url
                .starts_with("/media/certificate/certificate_"));
            assert!(issued.certificate.certification_number.starts_with("ACAD-"));
        }
    }

    assert_eq!(fx.store.certificate_rows(fx.student.id, fx.course.id).await, 1);
    assert_eq!(fx.rendered_files().len(), 1);
}

#[tokio::test]
async fn repeated_triggers_keep_one_record_and_one_file() {
    let fx = Fixture::new().await;
    fx.complete_all().await;
    let certs = fx.certificates();

    let first = certs.issue(fx.student.id, fx.course.id).await.unwrap();
    for _ in 0..3 {
        let again = certs
            .on_lesson_completed(fx.student.id, fx.course.id)
            .await
            .unwrap()
            .certificate
            .unwrap()
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.certificate, first.certificate);
        assert_eq!(again.artifact, first.artifact);
    }

    assert_eq!(fx.store.certificate_rows(fx.student.id, fx.course.id).await, 1);
    assert_eq!(fx.rendered_files().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_last_lesson_completions_issue_once() {
    let fx = Fixture::new().await;
    fx.complete_all().await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let certs = fx.certificates();
            let (student, course) = (fx.student.id, fx.course.id);
            tokio::spawn(async move { certs.issue(student, course).await })
        })
        .collect();

    let mut numbers = Vec::new();
    let mut created = 0;
    for handle in handles {
        let issued = handle.await.unwrap().unwrap();
        if issued.created {
            created += 1;
        }
        numbers.push(issued.certificate.certification_number);
    }

    assert_eq!(created, 1);
    numbers.dedup();
    assert_eq!(numbers.len(), 1);
    assert_eq!(fx.store.certificate_rows(fx.student.id, fx.course.id).await, 1);
    assert_eq!(fx.rendered_files().len(), 1);
}

#[tokio::test]
async fn missing_template_keeps_record_but_writes_nothing() {
    let fx = Fixture::new().await;
    fs::remove_file(&fx.config.assets.template).unwrap();
    fx.complete_all().await;

    let outcome = fx
        .certificates()
        .on_lesson_completed(fx.student.id, fx.course.id)
        .await
        .unwrap();
    assert!(outcome.progress.is_complete());
    let err = outcome.certificate.unwrap().unwrap_err();
    assert!(matches!(err, CertificateError::AssetMissing { .. }));
    assert_eq!(err.kind(), ErrorKind::AssetMissing);

    let cert = fx
        .store
        .find_certificate(fx.student.id, fx.course.id)
        .await
        .unwrap()
        .expect("record is kept");
    assert!(fx.rendered_files().is_empty());

    // once the template is back, the next access produces the file
    common::write_file(&fx.config.assets.template, &common::template_pdf(1));
    let artifact = fx
        .certificates()
        .download(&cert.certification_number)
        .await
        .unwrap()
        .unwrap();
    assert!(artifact.path.is_file());
}

#[tokio::test]
async fn missing_font_writes_nothing() {
    let fx = Fixture::new().await;
    fs::remove_file(&fx.config.assets.font).unwrap();
    fx.complete_all().await;

    let err = fx
        .certificates()
        .issue(fx.student.id, fx.course.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AssetMissing);
    assert!(fx.rendered_files().is_empty());
}

#[tokio::test]
async fn deleted_artifact_is_regenerated_identically() {
    let fx = Fixture::new().await;
    fx.complete_all().await;
    let certs = fx.certificates();

    let issued = certs.issue(fx.student.id, fx.course.id).await.unwrap();
    let original = fs::read(&issued.artifact.path).unwrap();
    fs::remove_file(&issued.artifact.path).unwrap();

    let artifact = certs
        .download(&issued.certificate.certification_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact, issued.artifact);
    assert_eq!(fs::read(&artifact.path).unwrap(), original);
}

#[tokio::test]
async fn unknown_number_downloads_nothing() {
    let fx = Fixture::new().await;
    assert!(fx.certificates().download("ACAD-00000000-DEADBEEF").await.unwrap().is_none());
}

#[tokio::test]
async fn listing_does_not_render_but_search_does() {
    let fx = Fixture::new().await;
    fx.complete_all().await;
    let certs = fx.certificates();
    let issued = certs.issue(fx.student.id, fx.course.id).await.unwrap();
    fs::remove_file(&issued.artifact.path).unwrap();

    let listed = certs.list_for_student(fx.student.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Certificate for Analytical Engines");
    assert_eq!(listed[0].student_name, "Ada King Lovelace");
    assert!(listed[0].download_url.is_none());
    assert!(fx.rendered_files().is_empty());

    assert!(certs.search("   ").await.unwrap().is_empty());

    let found = certs.search("lovelace").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].download_url.as_deref(), Some(issued.artifact.url.as_str()));
    assert!(issued.artifact.path.is_file());

    let by_number = certs
        .search(&issued.certificate.certification_number.to_lowercase())
        .await
        .unwrap();
    assert_eq!(by_number.len(), 1);
    assert!(certs.search("nobody").await.unwrap().is_empty());
}
