use kvlens_core::{
    CreateRequest, DeleteRequest, Format, KeyScanRequest, KeyType, KeyValueStore, MutationError,
    MutationService, ReadRequest, StoreRegistry, StoreValue, UpdateRequest,
};
use kvlens_driver_redis::RedisDriver;
use kvlens_test_support::containers;
use std::sync::Arc;
use std::time::Duration;

const SERVER: &str = "live-redis";

#[test]
#[ignore = "requires Docker daemon"]
fn redis_live_create_read_update_delete() -> Result<(), MutationError> {
    containers::with_redis_url(|url| {
        let driver = RedisDriver::new();
        let store = containers::retry_store_operation(Duration::from_secs(30), || {
            driver.connect_url(&url)
        })?;

        assert!(store.atomic_expiry());
        let service = MutationService::new(StoreRegistry::new().with_store(SERVER, Arc::new(store)));

        let create = CreateRequest::new(SERVER, "live:profile", KeyType::Hash, r#"{"name": "Alice"}"#)
            .with_format(Format::Json)
            .with_ttl("1h");
        service.create(&create)?;

        let duplicate = service.create(&create);
        assert_eq!(
            duplicate,
            Err(MutationError::KeyExists("live:profile".to_string()))
        );

        let view = service.read(&ReadRequest::new(SERVER, "live:profile"))?;
        assert!(view.exists);
        assert_eq!(view.key_type, Some(KeyType::Hash));
        assert_ne!(view.ttl, "no expiry");

        let update = UpdateRequest::new(
            SERVER,
            "live:profile",
            "name: Bob\ncity: Lyon",
            Format::String,
        );
        let descriptor = service.update(&update)?;
        assert_eq!(descriptor.len, 2);

        let view = service.read(&ReadRequest::new(SERVER, "live:profile").with_format(Some(Format::String)))?;
        assert!(view.content.contains("name: Bob"));
        assert_ne!(view.ttl, "no expiry");

        let mismatch = UpdateRequest::new(SERVER, "live:profile", r#"["x"]"#, Format::Json);
        assert!(matches!(
            service.update(&mismatch),
            Err(MutationError::Decode(_))
        ));

        let delete = DeleteRequest::new(SERVER, "live:profile");
        assert!(service.delete(&delete)?);
        assert!(!service.delete(&delete)?);

        Ok(())
    })
}

#[test]
#[ignore = "requires Docker daemon"]
fn redis_live_scan_raw_commands_and_databases() -> Result<(), MutationError> {
    containers::with_redis_url(|url| {
        let driver = RedisDriver::new();
        let store = containers::retry_store_operation(Duration::from_secs(30), || {
            driver.connect_url(&url)
        })?;

        for (key, value) in [
            ("scan:a", StoreValue::string("1")),
            ("scan:b", StoreValue::list(["x", "y"])),
            ("scan:c", StoreValue::sorted_set([("m", 2.5)])),
        ] {
            store.write_key(&kvlens_core::KeyWriteRequest::new(key, value))?;
        }

        let mut keys = store.list_keys(&KeyScanRequest::new("scan:*"))?;
        keys.sort_by(|a, b| a.key.cmp(&b.key));
        let summary: Vec<(String, KeyType, u64)> = keys
            .into_iter()
            .map(|entry| (entry.key, entry.key_type, entry.len))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("scan:a".to_string(), KeyType::String, 1),
                ("scan:b".to_string(), KeyType::List, 2),
                ("scan:c".to_string(), KeyType::SortedSet, 1),
            ]
        );

        let reply = store.run_raw_command(None, "GET scan:a")?;
        assert_eq!(reply.text, "\"1\"");
        assert!(!reply.is_error);

        let wrong_type = store.run_raw_command(None, "GET scan:b")?;
        assert!(wrong_type.is_error);
        assert!(wrong_type.text.starts_with("WRONGTYPE"));

        store.write_key(
            &kvlens_core::KeyWriteRequest::new("db3:only", StoreValue::string("v"))
                .with_database(Some(3)),
        )?;
        let in_db3 = store.run_raw_command(Some(3), "DBSIZE")?;
        assert_eq!(in_db3.text, "(integer) 1");
        let default_db = store.run_raw_command(None, "EXISTS db3:only")?;
        assert_eq!(default_db.text, "(integer) 0");

        assert_eq!(store.database_count()?, 16);
        assert!(store.server_info()?.contains("redis_version"));

        Ok(())
    })
}
