mod common;

use common::{BUCKET, DOMAIN, TestSite};
use sitestack_cloud::{ActionType, CloudError, GlobalState, StateManager, plan};
use sitestack_config::SiteConfig;
use sitestack_website::policy::CDN_SERVICE_PRINCIPAL;
use sitestack_website::services::{DnsRecord, DnsService};
use sitestack_website::{AssetSynchronizer, CertificateStatus, DISTRIBUTION_ID_OUTPUT};

/// example.com / site-assets-example / {index.html, app.js, img/logo.png}
#[tokio::test]
async fn test_example_com_scenario() {
    let site = TestSite::new();
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    let mut state = GlobalState::new();

    let result = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut state)
        .await
        .unwrap();
    assert!(result.is_success(), "{:?}", result.failed);

    assert_eq!(
        site.cloud.object_keys(BUCKET),
        vec!["app.js", "img/logo.png", "index.html"]
    );
    let content_type = |key: &str| site.cloud.object(BUCKET, key).unwrap().content_type;
    assert_eq!(content_type("index.html").as_deref(), Some("text/html"));
    assert_eq!(content_type("app.js").as_deref(), Some("application/javascript"));
    assert_eq!(content_type("img/logo.png").as_deref(), Some("image/png"));

    let certificates = site.cloud.certificates();
    assert_eq!(certificates.len(), 1);
    assert_eq!(certificates[0].domain.as_str(), DOMAIN);
    assert_eq!(certificates[0].status, CertificateStatus::Validated);

    let distributions = site.cloud.distributions();
    assert_eq!(distributions.len(), 1);
    let (info, config) = &distributions[0];
    assert_eq!(config.aliases, vec![DOMAIN.to_string()]);
    assert_eq!(config.viewer_certificate.acm_certificate_arn, certificates[0].arn);
    assert_eq!(site.cloud.origin_access_control_count(), 1);

    let tags = Some(orchestrator.tags().clone());
    assert_eq!(orchestrator.tags().get("ManagedBy"), Some("sitestack"));
    assert_eq!(site.cloud.bucket_tags(BUCKET), tags);
    assert_eq!(site.cloud.certificate_tags(&certificates[0].arn), tags);
    assert_eq!(site.cloud.distribution_tags(&info.id), tags);

    let alias = site
        .cloud
        .find_record(&site.zone_id, DOMAIN, "A")
        .await
        .unwrap()
        .unwrap()
        .alias
        .unwrap();
    assert_eq!(alias.dns_name, info.domain_name);
    assert_eq!(alias.hosted_zone_id, info.hosted_zone_id);
    assert!(!alias.evaluate_target_health);

    assert_eq!(result.outputs[DISTRIBUTION_ID_OUTPUT], serde_json::json!(info.id));
    assert_eq!(
        state.output(DISTRIBUTION_ID_OUTPUT),
        Some(&serde_json::json!(info.id))
    );
}

#[tokio::test]
async fn test_bucket_policy_is_scoped_to_the_distribution() {
    let site = TestSite::new();
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut GlobalState::new())
        .await
        .unwrap();

    let (info, _) = site.cloud.distributions().remove(0);
    let policy = site.cloud.bucket_policy(BUCKET).unwrap();
    assert_eq!(policy.statement.len(), 1);
    assert_eq!(policy.source_arn(), Some(info.arn.as_str()));
    assert!(policy.allows_read(CDN_SERVICE_PRINCIPAL, &info.arn));
    assert!(!policy.allows_read(
        CDN_SERVICE_PRINCIPAL,
        "arn:aws:cloudfront::123456789012:distribution/EOTHERDIST"
    ));
}

#[tokio::test]
async fn test_not_found_is_served_as_root_document() {
    let site = TestSite::new();
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut GlobalState::new())
        .await
        .unwrap();

    let (_, config) = site.cloud.distributions().remove(0);
    let response = config.route_origin_response(404, "/settings/profile");
    assert_eq!(response.status, 200);
    assert_eq!(response.rewritten_path.as_deref(), Some("/index.html"));
}

#[tokio::test]
async fn test_second_apply_changes_nothing() {
    let site = TestSite::new();
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    let mut state = GlobalState::new();
    orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut state)
        .await
        .unwrap();
    let puts = site.cloud.put_count();

    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    assert!(!plan(&stack.graph, &state).unwrap().has_changes);

    let second = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut state)
        .await
        .unwrap();
    assert_eq!(second.count(ActionType::Create), 0);
    assert_eq!(second.count(ActionType::Update), 0);
    assert_eq!(site.cloud.put_count(), puts);
    assert_eq!(site.cloud.certificates().len(), 1);
    assert_eq!(site.cloud.distributions().len(), 1);
}

#[tokio::test]
async fn test_changed_asset_is_the_only_upload() {
    let site = TestSite::new();
    let orchestrator = site.orchestrator(site.config());
    let mut state = GlobalState::new();
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut state)
        .await
        .unwrap();
    let puts = site.cloud.put_count();

    site.write_asset("app.js", "console.log('v2');");
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    let result = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut state)
        .await
        .unwrap();

    assert_eq!(site.cloud.put_count(), puts + 1);
    assert_eq!(result.count(ActionType::Update), 1);
    assert_eq!(
        site.cloud.object(BUCKET, "app.js").unwrap().body,
        b"console.log('v2');".to_vec()
    );
}

#[tokio::test]
async fn test_missing_zone_is_fatal() {
    let site = TestSite::new();
    let config = SiteConfig {
        domain_name: "example.org".to_string(),
        ..site.config()
    };
    let orchestrator = site.orchestrator(config);
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();

    let err = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut GlobalState::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::ZoneNotFound(_)));
    assert_eq!(err.to_string(), "No such hosted zone for example.org");
    assert!(site.cloud.distributions().is_empty());
}

#[tokio::test]
async fn test_validation_timeout_keeps_created_resources_and_rerun_converges() {
    let site = TestSite::new();
    site.cloud.set_validation_delay(100);
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    let mut state = GlobalState::new();

    let err = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut state)
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::ValidationTimeout { .. }));
    assert!(err.to_string().contains(DOMAIN));
    assert!(site.cloud.distributions().is_empty());
    assert_eq!(site.cloud.object_keys(BUCKET).len(), 3);
    assert!(state.outputs.is_empty());

    site.cloud.set_validation_delay(0);
    let result = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut state)
        .await
        .unwrap();
    assert_eq!(site.cloud.certificates().len(), 1);
    assert_eq!(site.cloud.distributions().len(), 1);
    assert!(result.outputs.contains_key(DISTRIBUTION_ID_OUTPUT));
}

#[tokio::test]
async fn test_rejected_domain_is_surfaced_verbatim() {
    let site = TestSite::new();
    let message = "CAA record for example.com does not permit issuance by Amazon";
    site.cloud.reject_domain(DOMAIN, message);
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();

    let err = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut GlobalState::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains(message), "{}", err);
    assert!(site.cloud.distributions().is_empty());
}

#[tokio::test]
async fn test_existing_dns_record_is_never_overwritten() {
    let site = TestSite::new();
    let theirs = DnsRecord {
        name: DOMAIN.to_string(),
        record_type: "A".to_string(),
        ttl: Some(300),
        values: vec!["192.0.2.44".to_string()],
        alias: None,
    };
    site.cloud.create_record(&site.zone_id, &theirs).await.unwrap();

    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    let err = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut GlobalState::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CloudError::Conflict { .. }));
    let kept = site
        .cloud
        .find_record(&site.zone_id, DOMAIN, "A")
        .await
        .unwrap();
    assert_eq!(kept, Some(theirs));
}

#[tokio::test]
async fn test_origin_access_control_failure_is_fatal() {
    let site = TestSite::new();
    site.cloud.fail_origin_access_control("AccessDenied: not authorized");
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();

    let err = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut GlobalState::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::OriginAccessControl(_)));
    assert!(err.to_string().contains("AccessDenied"));
    assert!(site.cloud.distributions().is_empty());
    assert!(site.cloud.bucket_policy(BUCKET).is_none());
}

#[tokio::test]
async fn test_unreadable_asset_does_not_abort_the_run() {
    let site = TestSite::new();
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    site.remove_asset("app.js");

    let result = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut GlobalState::new())
        .await
        .unwrap();
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].action_id, "storage_object.app.js");
    assert_eq!(site.cloud.object_keys(BUCKET), vec!["img/logo.png", "index.html"]);
    assert_eq!(site.cloud.distributions().len(), 1);
}

#[tokio::test]
async fn test_throttled_uploads_are_retried() {
    let site = TestSite::new();
    site.cloud.throttle_puts(2);
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();

    let result = orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut GlobalState::new())
        .await
        .unwrap();
    assert!(result.is_success());
    assert_eq!(site.cloud.object_keys(BUCKET).len(), 3);
}

#[tokio::test]
async fn test_removed_asset_deleted_only_when_pruning() {
    let site = TestSite::new();
    let manager = StateManager::new(site.state_dir());
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    orchestrator
        .provision(&stack, &site.driver(), &manager)
        .await
        .unwrap();

    site.remove_asset("app.js");
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    let kept = orchestrator
        .provision(&stack, &site.driver(), &manager)
        .await
        .unwrap();
    assert_eq!(kept.skipped.len(), 1);
    assert!(site.cloud.object(BUCKET, "app.js").is_some());

    let pruning = site.orchestrator(SiteConfig {
        prune: true,
        ..site.config()
    });
    let stack = pruning.synthesize(&site.manifest()).unwrap();
    pruning
        .provision(&stack, &site.driver(), &manager)
        .await
        .unwrap();
    assert!(site.cloud.object(BUCKET, "app.js").is_none());

    let state = manager.load().await.unwrap();
    assert!(state.get_resource("storage_object.app.js").is_none());
    assert!(state.output(DISTRIBUTION_ID_OUTPUT).is_some());
}

#[tokio::test]
async fn test_pruning_keeps_objects_of_unreadable_assets() {
    let site = TestSite::new();
    let manager = StateManager::new(site.state_dir());
    let pruning = site.orchestrator(SiteConfig {
        prune: true,
        ..site.config()
    });
    let stack = pruning.synthesize(&site.manifest()).unwrap();
    pruning
        .provision(&stack, &site.driver(), &manager)
        .await
        .unwrap();

    let manifest = site
        .manifest()
        .with_unreadable("app.js", "Permission denied");
    let stack = pruning.synthesize(&manifest).unwrap();
    assert_eq!(stack.skipped_assets.len(), 1);

    let state = manager.load().await.unwrap();
    let actions = plan(&stack.graph, &state).unwrap();
    assert_eq!(
        actions.action_for("storage_object.app.js").unwrap().action_type,
        ActionType::NoOp
    );
    assert!(actions.actions_by_type(ActionType::Delete).is_empty());

    let result = pruning
        .provision(&stack, &site.driver(), &manager)
        .await
        .unwrap();
    assert!(result.is_success(), "{:?}", result.failed);
    assert!(site.cloud.object(BUCKET, "app.js").is_some());
    let state = manager.load().await.unwrap();
    assert!(state.get_resource("storage_object.app.js").is_some());
}

#[tokio::test]
async fn test_direct_sync_is_idempotent() {
    let site = TestSite::new();
    let orchestrator = site.orchestrator(site.config());
    let stack = orchestrator.synthesize(&site.manifest()).unwrap();
    orchestrator
        .provision_in_memory(&stack, &site.driver(), &mut GlobalState::new())
        .await
        .unwrap();
    let puts = site.cloud.put_count();

    let report = AssetSynchronizer::new(&site.cloud, BUCKET)
        .sync(&site.manifest())
        .await
        .unwrap();
    assert_eq!(report.writes(), 0);
    assert_eq!(report.skipped.len(), 3);
    assert_eq!(site.cloud.put_count(), puts);
}
