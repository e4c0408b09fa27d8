//! End-to-end integration test covering submission through execution
//! through the status/reports/logs HTTP surface (spec Section 4.8-4.10).
//!
//! Drives `upload_job` over a real `tower` router, then runs the engine
//! directly against a `RecordingRuntime` the way the daemon's dequeue
//! loop would, and re-enters the router to read back status, reports,
//! and per-stage logs.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pipeguard_core::{
    Config, InputType, Pipeline, SastMode, SecretScanMode, Stack, StageResult, StageResultStatus, Versions,
};
use pipeguardd::queue::{ChannelQueue, JobQueue};
use pipeguardd::runtime::RecordingRuntime;
use pipeguardd::server::{router, AppState};
use pipeguardd::workspace::WorkspaceHandle;
use tower::ServiceExt;

fn pipeline() -> Pipeline {
    Pipeline {
        run_secret_scan: false,
        secret_scan_mode: SecretScanMode::Dir,
        secret_custom: None,
        run_build: true,
        run_unit_tests: false,
        run_sast: false,
        sast_mode: SastMode::Default,
        sast_custom: None,
        run_sca: false,
        run_package: false,
        run_smoke: false,
        run_dast: false,
    }
}

fn sample_zip() -> Vec<u8> {
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
        let options = FileOptions::default();
        writer.start_file("pom.xml", options).unwrap();
        writer.write_all(b"<project/>").unwrap();
        writer.start_file("src/main/java/App.java", options).unwrap();
        writer.write_all(b"class App {}").unwrap();
        writer.finish().unwrap();
    }
    buf
}

fn templates_with_contract(root: &std::path::Path) {
    std::fs::create_dir_all(root.join("global")).unwrap();
    std::fs::write(root.join("global/secrets-dir.sh"), "#!/bin/bash").unwrap();
    std::fs::create_dir_all(root.join("spring-boot-maven")).unwrap();
    std::fs::write(root.join("spring-boot-maven/build.sh"), "#!/bin/bash").unwrap();
    std::fs::write(
        root.join("spring-boot-maven/contract.json"),
        r#"{
            "required_paths": ["src/main/java"],
            "required_files": [{"pattern": "pom.xml", "min_count": 1}],
            "semantic_checks": [],
            "optional_paths": []
        }"#,
    )
    .unwrap();
}

fn multipart_body(boundary: &str, metadata_json: &str, zip_bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Disposition: form-data; name=\"metadata\"\r\n\r\n{metadata_json}\r\n").as_bytes(),
    );
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Disposition: form-data; name=\"project_zip\"; filename=\"project.zip\"\r\nContent-Type: application/zip\r\n\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(zip_bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn submit_execute_and_read_back_status_reports_and_logs() {
    let workspaces = tempfile::tempdir().unwrap();
    let templates = tempfile::tempdir().unwrap();
    templates_with_contract(templates.path());

    let mut config = Config::default();
    config.workspaces_dir = workspaces.path().to_path_buf();
    config.pipeline_templates_dir = templates.path().to_path_buf();

    let queue = Arc::new(ChannelQueue::new());
    let state = Arc::new(AppState { config: config.clone(), queue: Arc::clone(&queue) });
    let app = router(state);

    let metadata_json = serde_json::to_string(&serde_json::json!({
        "stack": Stack { language: "java".into(), framework: "spring-boot".into(), build_tool: "maven".into(), requires_db: false },
        "versions": Versions::default(),
        "pipeline": pipeline(),
    }))
    .unwrap();
    let boundary = "pipeguard-test-boundary";
    let body = multipart_body(boundary, &metadata_json, &sample_zip());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/jobs/upload")
                .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let job: pipeguard_core::JobMetadata = serde_json::from_slice(&bytes).unwrap();
    let job_id = job.job_id.as_str().to_string();

    // The HTTP layer only enqueues; run the engine the way the daemon's
    // dequeue loop would, against a recording runtime.
    let dequeued = queue.dequeue().await.unwrap();
    assert_eq!(dequeued.as_str(), job_id);

    let job_dir = workspaces.path().join(&job_id);
    std::fs::create_dir_all(job_dir.join("reports/build")).unwrap();
    let result = StageResult { status: StageResultStatus::Success, message: None };
    std::fs::write(job_dir.join("reports/build/result.json"), serde_json::to_vec(&result).unwrap()).unwrap();
    std::fs::write(job_dir.join("reports/build/build.log"), b"BUILD SUCCESS").unwrap();

    let workspace = WorkspaceHandle {
        job_id: job.job_id.clone(),
        job_dir: job_dir.clone(),
        source_dir: job_dir.join("source"),
        input_type: InputType::Zip,
    };
    let runtime = RecordingRuntime::new();
    pipeguardd::engine::execute_job(&workspace, &job, &config, &runtime).await.unwrap();

    let status_response = app
        .clone()
        .oneshot(Request::builder().uri(format!("/api/jobs/{job_id}/status")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(status_response.status(), StatusCode::OK);
    let bytes = status_response.into_body().collect().await.unwrap().to_bytes();
    let status_json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(status_json["execution"]["state"], "SUCCEEDED");
    assert_eq!(status_json["execution"]["stages"]["BUILD"]["status"], "SUCCESS");

    let reports_response = app
        .clone()
        .oneshot(Request::builder().uri(format!("/api/jobs/{job_id}/reports")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(reports_response.status(), StatusCode::OK);
    let zip_bytes = reports_response.into_body().collect().await.unwrap().to_bytes();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
    assert!(archive.by_name("build/result.json").is_ok());

    let logs_response = app
        .oneshot(Request::builder().uri(format!("/api/jobs/{job_id}/build/logs")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(logs_response.status(), StatusCode::OK);
    let log_bytes = logs_response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&log_bytes[..], b"BUILD SUCCESS");
}

#[tokio::test]
async fn reports_are_unavailable_while_the_job_is_still_queued() {
    let workspaces = tempfile::tempdir().unwrap();
    let templates = tempfile::tempdir().unwrap();
    templates_with_contract(templates.path());

    let mut config = Config::default();
    config.workspaces_dir = workspaces.path().to_path_buf();
    config.pipeline_templates_dir = templates.path().to_path_buf();

    let queue = Arc::new(ChannelQueue::new());
    let state = Arc::new(AppState { config, queue });
    let app = router(state);

    let metadata_json = serde_json::to_string(&serde_json::json!({
        "stack": Stack { language: "java".into(), framework: "spring-boot".into(), build_tool: "maven".into(), requires_db: false },
        "versions": Versions::default(),
        "pipeline": pipeline(),
    }))
    .unwrap();
    let boundary = "pipeguard-test-boundary";
    let body = multipart_body(boundary, &metadata_json, &sample_zip());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/jobs/upload")
                .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let job: pipeguard_core::JobMetadata = serde_json::from_slice(&bytes).unwrap();

    let reports_response = app
        .oneshot(Request::builder().uri(format!("/api/jobs/{}/reports", job.job_id)).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(reports_response.status(), StatusCode::NOT_FOUND);
}
