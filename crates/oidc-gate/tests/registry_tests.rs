//! Registry reload under concurrent readers.
//!
//! Readers running while `configure` swaps the table must see either the
//! complete previous table or the complete new one.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use base64::{engine::general_purpose::STANDARD, Engine};
use oidc_gate::auth::validator::mock::MockTokenValidator;
use oidc_gate::registry::{ProviderDescriptor, ProviderRegistry, RegistryError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const ISSUER_A: &str = "https://a.example.com";
const ISSUER_B: &str = "https://b.example.com";

fn descriptor(issuer: &str, policy: &str) -> ProviderDescriptor {
    ProviderDescriptor {
        issuer: issuer.to_string(),
        client_ids: BTreeMap::from([
            (STANDARD.encode("client1"), format!("{policy}-1")),
            (STANDARD.encode("client2"), format!("{policy}-2")),
        ]),
    }
}

fn generation(policy: &str) -> Vec<ProviderDescriptor> {
    vec![descriptor(ISSUER_A, policy), descriptor(ISSUER_B, policy)]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_see_old_or_new_table() {
    let validator =
        Arc::new(MockTokenValidator::new().with_registration_delay(Duration::from_millis(5)));
    let registry = Arc::new(ProviderRegistry::new(validator));
    registry.configure(&generation("old")).await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();

    for _ in 0..4 {
        let registry = registry.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut observed = 0usize;
            while !done.load(Ordering::SeqCst) {
                let snapshot = registry.snapshot();
                let seen: Vec<Option<&str>> = [ISSUER_A, ISSUER_B]
                    .iter()
                    .flat_map(|issuer| {
                        ["client1", "client2"]
                            .into_iter()
                            .map(move |client| (issuer, client))
                    })
                    .map(|(issuer, client)| snapshot.policy_for(issuer, client))
                    .collect();

                let prefix = seen
                    .first()
                    .copied()
                    .flatten()
                    .and_then(|p| p.split('-').next())
                    .expect("every entry present");
                for entry in &seen {
                    let entry = entry.expect("every entry present");
                    assert!(
                        entry.starts_with(prefix),
                        "mixed generations in one snapshot: {seen:?}"
                    );
                }
                assert_eq!(snapshot.active_providers().len(), 2);

                observed += 1;
                tokio::task::yield_now().await;
            }
            observed
        }));
    }

    for round in 0..10 {
        let policy = if round % 2 == 0 { "new" } else { "old" };
        registry.configure(&generation(policy)).await.unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_reloads_are_serialized() {
    let validator =
        Arc::new(MockTokenValidator::new().with_registration_delay(Duration::from_millis(10)));
    let registry = Arc::new(ProviderRegistry::new(validator.clone()));

    let first = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.configure(&generation("first")).await })
    };
    let second = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.configure(&generation("second")).await })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // Whichever ran last wins completely
    let snapshot = registry.snapshot();
    let a = snapshot.policy_for(ISSUER_A, "client1").unwrap().to_string();
    let b = snapshot.policy_for(ISSUER_B, "client2").unwrap().to_string();
    assert_eq!(a.split('-').next(), b.split('-').next());
    assert_eq!(validator.registrations().len(), 4);
}

#[tokio::test]
async fn test_all_registrations_failing_installs_empty_table() {
    let validator = Arc::new(
        MockTokenValidator::new()
            .failing_registration_for(ISSUER_A)
            .failing_registration_for(ISSUER_B),
    );
    let registry = ProviderRegistry::new(validator);

    let result = registry.configure(&generation("new")).await;

    assert_eq!(
        result.unwrap_err(),
        RegistryError::NoProvidersRegistered { attempted: 2 }
    );
    assert!(registry.snapshot().is_empty());
    assert!(registry.active_providers().is_empty());
}
