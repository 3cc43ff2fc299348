//! Concurrent validation across distinct projects.

use std::sync::Arc;

use arbiter_core::Fragment;
use arbiter_pipeline::fakes::FakeToolchain;
use arbiter_pipeline::{Pipeline, PipelineConfig};
use futures::future::join_all;

fn fragments_for(project: usize) -> Vec<Fragment> {
    let services: Vec<String> = (0..=project).map(|i| format!("\"svc{i}\": {{}}")).collect();
    vec![
        Fragment::new("name.cue", format!("package spec\n{{\"project\": \"p{project}\"}}")),
        Fragment::new(
            "services.cue",
            format!("package spec\n{{\"services\": {{{}}}}}", services.join(", ")),
        ),
    ]
}

/// Test: concurrent validations match sequential ones with no cross-talk
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_projects_match_sequential() {
    let fake = Arc::new(FakeToolchain::new());
    let pipeline = Pipeline::new(fake, PipelineConfig::default());
    let projects: Vec<usize> = (0..8).collect();

    let mut sequential = Vec::new();
    for &p in &projects {
        sequential.push(pipeline.validate(&format!("p{p}"), &fragments_for(p)).await);
    }

    let concurrent = join_all(projects.iter().map(|&p| {
        let pipeline = pipeline.clone();
        async move { pipeline.validate(&format!("p{p}"), &fragments_for(p)).await }
    }))
    .await;

    for (p, (seq, conc)) in sequential.iter().zip(&concurrent).enumerate() {
        assert!(conc.success, "project {p}: {:?}", conc.errors);
        assert_eq!(seq.hash, conc.hash, "project {p} hash drifted");
        assert_eq!(seq.resolved, conc.resolved);
        let services = conc
            .resolved
            .as_ref()
            .and_then(|r| r.section("services"))
            .and_then(|s| s.as_object())
            .map(|s| s.len());
        assert_eq!(services, Some(p + 1));
    }

    let hashes: std::collections::BTreeSet<_> = concurrent.iter().map(|r| r.hash.clone()).collect();
    assert_eq!(hashes.len(), projects.len());
}

/// Test: concurrent validations of the same project use separate workspaces
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_project_concurrent_isolation() {
    let fake = Arc::new(FakeToolchain::new());
    let pipeline = Pipeline::new(fake.clone(), PipelineConfig::default());

    let results = join_all((0..6).map(|_| {
        let pipeline = pipeline.clone();
        async move { pipeline.validate("shared", &fragments_for(3)).await }
    }))
    .await;

    let hashes: std::collections::BTreeSet<_> = results.iter().map(|r| r.hash.clone()).collect();
    assert_eq!(hashes.len(), 1);

    let workspaces: std::collections::BTreeSet<_> =
        fake.calls_to("cue").into_iter().filter_map(|c| c.cwd).collect();
    assert_eq!(workspaces.len(), 6);
}
