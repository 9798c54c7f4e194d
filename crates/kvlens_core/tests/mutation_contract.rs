use kvlens_core::{
    CreateRequest, DecodeError, DeleteRequest, Format, KeyType, MutationError, MutationService,
    NegativeTtlPolicy, RawReply, ReadRequest, StoreError, StoreRegistry, StoreValue,
    UpdateRequest,
};
use kvlens_test_support::FakeStore;
use kvlens_test_support::FakeOperation;
use kvlens_test_support::fixtures::{self, SERVER, populated_store, service_for};
use std::time::Duration;

#[test]
fn create_writes_decoded_value() {
    let store = populated_store();
    let service = service_for(&store);

    let request = CreateRequest::new(SERVER, "colors", KeyType::List, r#"["red", "blue"]"#)
        .with_format(Format::Json);
    let descriptor = service.create(&request).expect("create should succeed");

    assert_eq!(descriptor.key, "colors");
    assert_eq!(descriptor.key_type, KeyType::List);
    assert_eq!(descriptor.len, 2);
    assert_eq!(store.value("colors"), Some(StoreValue::list(["red", "blue"])));
    assert_eq!(store.ttl("colors"), None);
}

#[test]
fn create_never_overwrites_an_existing_key() {
    let store = populated_store();
    let service = service_for(&store);

    let request = CreateRequest::new(SERVER, "greeting", KeyType::String, "replaced");
    let result = service.create(&request);

    assert_eq!(result, Err(MutationError::KeyExists("greeting".to_string())));
    assert_eq!(
        store.value("greeting"),
        Some(StoreValue::string("hello world"))
    );
}

#[test]
fn create_rejects_bad_input_before_touching_the_store() {
    let store = populated_store();
    let service = service_for(&store);

    let blank = CreateRequest::new(SERVER, "   ", KeyType::String, "v");
    assert_eq!(service.create(&blank), Err(MutationError::EmptyKey));

    let bad_ttl = CreateRequest::new(SERVER, "k", KeyType::String, "v").with_ttl("ten minutes");
    assert!(matches!(
        service.create(&bad_ttl),
        Err(MutationError::Ttl(_))
    ));

    let bad_json =
        CreateRequest::new(SERVER, "k", KeyType::Hash, "{not json").with_format(Format::Json);
    assert!(matches!(
        service.create(&bad_json),
        Err(MutationError::Decode(DecodeError::MalformedJson(_)))
    ));

    let unknown = CreateRequest::new("elsewhere", "k", KeyType::String, "v");
    assert_eq!(
        service.create(&unknown),
        Err(MutationError::UnknownServer("elsewhere".to_string()))
    );

    assert_eq!(store.stats().total(), 0);
}

#[test]
fn create_applies_ttl_after_write_on_non_atomic_stores() {
    let store = populated_store();
    let service = service_for(&store);

    let request = CreateRequest::new(SERVER, "session", KeyType::String, "token").with_ttl("10m");
    service.create(&request).expect("create should succeed");

    let stats = store.stats();
    assert_eq!(stats.count(FakeOperation::WriteKey), 1);
    assert_eq!(stats.count(FakeOperation::ApplyExpiry), 1);
    assert_eq!(store.ttl("session"), Some(Duration::from_secs(600)));
}

#[test]
fn create_uses_a_single_write_on_atomic_stores() {
    let store = populated_store().with_atomic_expiry(true);
    let service = service_for(&store);

    let request = CreateRequest::new(SERVER, "session", KeyType::String, "token").with_ttl("1h");
    service.create(&request).expect("create should succeed");

    let stats = store.stats();
    assert_eq!(stats.count(FakeOperation::WriteKey), 1);
    assert_eq!(stats.count(FakeOperation::ApplyExpiry), 0);
    assert_eq!(store.ttl("session"), Some(Duration::from_secs(3600)));
}

#[test]
fn failed_ttl_step_reports_a_partial_failure() {
    let store = populated_store().with_failure(
        FakeOperation::ApplyExpiry,
        StoreError::unavailable("connection reset"),
    );
    let service = service_for(&store);

    let request = CreateRequest::new(SERVER, "session", KeyType::String, "token").with_ttl("30s");
    let error = service.create(&request).expect_err("ttl step should fail");

    assert!(error.is_partial());
    assert!(!error.is_validation());
    assert!(store.contains("session"));
    assert_eq!(store.ttl("session"), None);
}

#[test]
fn negative_ttl_follows_the_configured_policy() {
    let store = populated_store();

    let keep = service_for(&store);
    let request = CreateRequest::new(SERVER, "kept", KeyType::String, "v").with_ttl("-1s");
    keep.create(&request).expect("create should succeed");
    assert!(store.contains("kept"));
    assert_eq!(store.ttl("kept"), None);

    let expire = service_for(&store).with_negative_ttl_policy(NegativeTtlPolicy::ExpireImmediately);
    let request = CreateRequest::new(SERVER, "gone", KeyType::String, "v").with_ttl("0");
    expire.create(&request).expect("create should succeed");
    assert!(!store.contains("gone"));
}

#[test]
fn read_renders_the_value_with_metadata() {
    let store = populated_store();
    let service = service_for(&store);

    let view = service
        .read(&ReadRequest::new(SERVER, "scores"))
        .expect("read should succeed");

    assert!(view.exists);
    assert_eq!(view.key_type, Some(KeyType::SortedSet));
    assert_eq!(view.format, Some(Format::Json));
    assert_eq!(view.ttl, "1h");
    assert_eq!(view.size, 3);
    assert!(view.is_lossless());
    assert!(view.content.contains("\"member\": \"alice\""));
}

#[test]
fn read_of_a_missing_key_is_not_an_error() {
    let store = populated_store();
    let service = service_for(&store);

    let view = service
        .read(&ReadRequest::new(SERVER, "nope"))
        .expect("read should succeed");

    assert!(!view.exists);
    assert!(view.content.is_empty());
}

#[test]
fn read_flags_formats_that_cannot_show_binary_values() {
    let store = populated_store();
    let service = service_for(&store);

    let detected = service
        .read(&ReadRequest::new(SERVER, "blob"))
        .expect("read should succeed");
    assert_eq!(detected.format, Some(Format::Quoted));
    assert!(detected.is_lossless());

    let forced = service
        .read(&ReadRequest::new(SERVER, "blob").with_format(Some(Format::String)))
        .expect("read should succeed");
    assert!(!forced.is_lossless());
    assert!(forced.error.contains("Quoted"));
}

#[test]
fn read_of_an_unsupported_type_is_a_store_error() {
    let store = populated_store();
    let service = service_for(&store);

    let result = service.read(&ReadRequest::new(SERVER, "events"));
    assert!(matches!(
        result,
        Err(MutationError::Store(StoreError::TypeConflict(_)))
    ));
}

#[test]
fn update_keeps_the_existing_type_and_ttl() {
    let store = populated_store();
    let service = service_for(&store);

    let request = UpdateRequest::new(
        SERVER,
        "scores",
        r#"[{"member": "dave", "score": 7}]"#,
        Format::Json,
    );
    let descriptor = service.update(&request).expect("update should succeed");

    assert_eq!(descriptor.key_type, KeyType::SortedSet);
    assert_eq!(descriptor.len, 1);
    assert_eq!(
        store.value("scores"),
        Some(StoreValue::sorted_set([("dave", 7.0)]))
    );
    assert_eq!(store.ttl("scores"), Some(Duration::from_secs(3600)));
}

#[test]
fn update_with_the_wrong_shape_leaves_the_key_untouched() {
    let store = populated_store();
    let service = service_for(&store);

    let request = UpdateRequest::new(SERVER, "user:1", r#"["a", "b"]"#, Format::Json);
    let result = service.update(&request);

    assert!(matches!(
        result,
        Err(MutationError::Decode(DecodeError::TypeMismatch(_)))
    ));
    assert_eq!(store.stats().mutating_calls(), 0);
    assert_eq!(store.value("user:1"), Some(fixtures::profile_hash()));
}

#[test]
fn update_of_a_missing_key_is_not_found() {
    let store = populated_store();
    let service = service_for(&store);

    let request = UpdateRequest::new(SERVER, "nope", "v", Format::String);
    assert_eq!(
        service.update(&request),
        Err(MutationError::NotFound("nope".to_string()))
    );
    assert!(!store.contains("nope"));
}

#[test]
fn delete_is_idempotent() {
    let store = populated_store();
    let service = service_for(&store);

    let request = DeleteRequest::new(SERVER, "tags");
    assert_eq!(service.delete(&request), Ok(true));
    assert_eq!(service.delete(&request), Ok(false));
    assert!(!store.contains("tags"));
}

#[test]
fn operations_target_the_requested_database() {
    let store = populated_store().with_key_in(2, "greeting", StoreValue::string("hallo"));
    let service = service_for(&store);

    let view = service
        .read(&ReadRequest::new(SERVER, "greeting").with_database(Some(2)))
        .expect("read should succeed");
    assert_eq!(view.content, "hallo");

    let request = DeleteRequest::new(SERVER, "greeting").with_database(Some(2));
    assert_eq!(service.delete(&request), Ok(true));
    assert!(store.contains("greeting"));
    assert_eq!(store.value_in(2, "greeting"), None);
}

#[test]
fn raw_commands_pass_through_with_server_errors_as_replies() {
    let store = populated_store();
    let service: MutationService = service_for(&store);

    let pong = service
        .run_raw_command(SERVER, None, "PING")
        .expect("command should run");
    assert_eq!(pong.text, "PONG");
    assert!(!pong.is_error);

    let unknown = service
        .run_raw_command(SERVER, None, "FROB x")
        .expect("server errors are replies");
    assert!(unknown.is_error);

    assert_eq!(service.database_count(SERVER), Ok(16));
    assert!(service
        .server_info(SERVER)
        .expect("info should succeed")
        .contains("redis_version"));
}

#[test]
fn server_details_come_from_the_addressed_store() {
    let store = FakeStore::new()
        .with_info("# Server\r\nredis_version:7.2.4\r\n")
        .with_database_count(4)
        .with_raw_reply("CLIENT LIST", RawReply::error("NOPERM this user has no permissions"));
    let service = service_for(&store);

    assert_eq!(service.database_count(SERVER), Ok(4));
    assert!(service
        .server_info(SERVER)
        .expect("info should succeed")
        .contains("redis_version:7.2.4"));

    let denied = service
        .run_raw_command(SERVER, None, "CLIENT LIST")
        .expect("server errors are replies");
    assert!(denied.is_error);
    assert!(denied.text.starts_with("NOPERM"));
}

#[test]
fn registry_lists_servers_by_name() {
    let mut registry = StoreRegistry::new();
    assert!(registry.is_empty());

    registry.register("staging", FakeStore::new().as_store_arc());
    registry.register("prod", FakeStore::new().as_store_arc());
    registry.register("staging", populated_store().as_store_arc());

    assert!(!registry.is_empty());
    assert_eq!(registry.names(), ["prod", "staging"]);
    assert!(registry.contains("prod"));
    assert!(registry.get("dev").is_none());
}
