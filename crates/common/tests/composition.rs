//! Integration tests for building a service from configuration

mod common;

use ::common::auth::Identity;
use ::common::config::ConfigError;
use ::common::prelude::*;
use ::common::service::RequestError;
use ::common::tree::StructureFamily;

#[tokio::test]
async fn test_anonymous_listing_of_files_mount() {
    let dir = common::data_dir();
    let (service, _) = common::service(
        "
trees:
  - path: /
    tree: files
    args:
      directory: .
authentication:
  allow_anonymous_access: true
",
        dir.path(),
    );

    let entries = service.list(&Identity::Anonymous, &[]).await.unwrap();
    let mut keys: Vec<_> = entries
        .iter()
        .map(|e| (e.key.clone(), e.structure_family))
        .collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            ("image".to_string(), StructureFamily::Array),
            ("nested".to_string(), StructureFamily::Node),
            ("table".to_string(), StructureFamily::DataFrame),
        ]
    );

    let nested = service
        .list(&Identity::Anonymous, &common::path("/nested"))
        .await
        .unwrap();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].structure_family, StructureFamily::Dataset);
}

#[test]
fn test_policy_without_authenticator_fails() {
    let dir = common::data_dir();
    let config = common::yaml(
        "
trees:
  - path: /
    tree: files
    args:
      directory: .
access_control:
  access_policy: canopy.access_policies:SimpleAccessPolicy
  args:
    public: [table]
",
    );
    let err = Service::builder(config)
        .config_dir(dir.path())
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::AccessControlWithoutAuthenticator));
}

#[tokio::test]
async fn test_authenticator_without_policy_succeeds() {
    let dir = common::data_dir();
    let (service, _) = common::service(
        "
trees:
  - path: /
    tree: files
    args:
      directory: .
authentication:
  authenticator: canopy.authenticators:DictionaryAuthenticator
  args:
    users_to_passwords:
      alice: secret1
",
        dir.path(),
    );

    // no anonymous access, and no generated key once an authenticator exists
    assert!(service.generated_api_key().is_none());
    assert!(service.identify(&Credentials::None).is_err());

    let tokens = service.auth().login("alice", "secret1").await.unwrap();
    let alice = service
        .identify(&Credentials::Bearer(tokens.access_token))
        .unwrap();
    assert_eq!(service.list(&alice, &[]).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_global_policy_filters_listing_and_lookups() {
    let dir = common::data_dir();
    let (service, _) = common::service(
        "
trees:
  - path: /
    tree: files
    args:
      directory: .
authentication:
  authenticator: canopy.authenticators:DictionaryAuthenticator
  args:
    users_to_passwords:
      alice: secret1
      bob: secret2
  allow_anonymous_access: true
access_control:
  access_policy: canopy.access_policies:SimpleAccessPolicy
  args:
    access_lists:
      alice: all
      bob: [nested]
    public: [table]
",
        dir.path(),
    );

    let login = |user: &'static str, password: &'static str| {
        let service = &service;
        async move {
            let tokens = service.auth().login(user, password).await.unwrap();
            service
                .identify(&Credentials::Bearer(tokens.access_token))
                .unwrap()
        }
    };
    let alice = login("alice", "secret1").await;
    let bob = login("bob", "secret2").await;

    let keys = |entries: Vec<Entry>| {
        let mut keys: Vec<_> = entries.into_iter().map(|e| e.key).collect();
        keys.sort();
        keys
    };
    assert_eq!(
        keys(service.list(&alice, &[]).await.unwrap()),
        vec!["image", "nested", "table"]
    );
    assert_eq!(
        keys(service.list(&bob, &[]).await.unwrap()),
        vec!["nested", "table"]
    );
    assert_eq!(
        keys(service.list(&Identity::Anonymous, &[]).await.unwrap()),
        vec!["table"]
    );

    // below an invisible key everything is missing
    assert!(matches!(
        service
            .metadata(&Identity::Anonymous, &common::path("/nested/cube"))
            .await,
        Err(RequestError::NotFound(_))
    ));
    assert!(service
        .metadata(&bob, &common::path("/nested/cube"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_global_policy_guards_synthetic_levels() {
    let dir = common::data_dir();
    let (service, _) = common::service(
        "
trees:
  - path: /data/raw
    tree: files
    args:
      directory: .
authentication:
  authenticator: canopy.authenticators:DictionaryAuthenticator
  args:
    users_to_passwords:
      alice: secret1
      bob: secret2
access_control:
  access_policy: canopy.access_policies:SimpleAccessPolicy
  args:
    access_lists:
      alice: [table]
      bob: [data, table]
",
        dir.path(),
    );

    let identify = |user: &'static str, password: &'static str| {
        let service = &service;
        async move {
            let tokens = service.auth().login(user, password).await.unwrap();
            service
                .identify(&Credentials::Bearer(tokens.access_token))
                .unwrap()
        }
    };
    let alice = identify("alice", "secret1").await;
    let bob = identify("bob", "secret2").await;
    let keys = |entries: Vec<Entry>| entries.into_iter().map(|e| e.key).collect::<Vec<_>>();

    // `data` is hidden from alice at the root, so nothing below it resolves
    assert!(service.list(&alice, &[]).await.unwrap().is_empty());
    for path in ["/data", "/data/raw"] {
        assert!(matches!(
            service.list(&alice, &common::path(path)).await,
            Err(RequestError::NotFound(_))
        ));
    }
    for path in ["/data", "/data/raw", "/data/raw/table"] {
        assert!(matches!(
            service.metadata(&alice, &common::path(path)).await,
            Err(RequestError::NotFound(_))
        ));
    }
    assert!(matches!(
        service
            .export(&alice, &common::path("/data/raw/table"), Some("text/csv"), None)
            .await,
        Err(RequestError::NotFound(_))
    ));

    assert_eq!(keys(service.list(&bob, &[]).await.unwrap()), vec!["data"]);
    assert_eq!(
        keys(service.list(&bob, &common::path("/data")).await.unwrap()),
        vec!["raw"]
    );
    assert_eq!(
        keys(service.list(&bob, &common::path("/data/raw")).await.unwrap()),
        vec!["table"]
    );
    let exported = service
        .export(&bob, &common::path("/data/raw/table"), Some("text/csv"), None)
        .await
        .unwrap();
    assert_eq!(exported.body, b"a,b\n1,2\n3,4\n".to_vec());
}

#[test]
fn test_duplicate_mount_paths_fail() {
    let dir = common::data_dir();
    let config = common::yaml(
        "
trees:
  - path: /data
    tree: files
    args: {directory: .}
  - path: /data/
    tree: files
    args: {directory: .}
authentication:
  allow_anonymous_access: true
",
    );
    let err = Service::builder(config)
        .config_dir(dir.path())
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Mount(_)));
}

#[test]
fn test_mount_paths_must_be_absolute() {
    let dir = common::data_dir();
    let config = common::yaml(
        "
trees:
  - path: data
    tree: files
    args: {directory: .}
",
    );
    assert!(Service::builder(config)
        .config_dir(dir.path())
        .build()
        .is_err());
}

#[tokio::test]
async fn test_custom_media_types_and_extensions() {
    let dir = common::data_dir();
    let (service, _) = common::service(
        "
trees:
  - path: /
    tree: files
    args: {directory: .}
authentication:
  allow_anonymous_access: true
media_types:
  array:
    application/x-raw-array: canopy.exporters:raw
file_extensions:
  arr: application/x-raw-array
",
        dir.path(),
    );

    let exported = service
        .export(&Identity::Anonymous, &common::path("/image"), Some("arr"), None)
        .await
        .unwrap();
    assert_eq!(exported.media_type, "application/x-raw-array");
    assert_eq!(exported.body.len(), 64);

    let json = service
        .export(
            &Identity::Anonymous,
            &common::path("/table"),
            None,
            Some("application/json"),
        )
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json.body).unwrap();
    assert_eq!(value["key"], "table");
}
