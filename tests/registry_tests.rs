//! Integration tests for the resourcer registry
//!
//! These tests verify static registration, dynamic fallbacks and the
//! precedence between them.

mod common;

use std::sync::Arc;

use resource_runtime::error::Error;
use resource_runtime::registry::{ResourcerLookup, ResourcerRegistry};
use resource_runtime::resourcer::{DynamicResourcer, Resourcer};
use resource_runtime::types::ResourceMeta;

use common::{call_log, EchoResourcer, MockClient, PodResourcer, POD};

fn pods() -> Arc<dyn Resourcer<MockClient>> {
    Arc::new(PodResourcer { log: call_log() })
}

fn echo() -> Arc<dyn DynamicResourcer<MockClient>> {
    Arc::new(EchoResourcer { log: call_log() })
}

// ============================================================================
// Static Registration
// ============================================================================

#[test]
fn test_register_and_get_resourcer() {
    let registry = ResourcerRegistry::new();
    registry.register_resourcer(POD, pods()).unwrap();

    assert!(registry.get_resourcer(POD).is_ok());
    let metas = registry.resource_metas();
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].key(), POD);
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let registry = ResourcerRegistry::new();
    registry.register_resourcer(POD, pods()).unwrap();

    let err = registry.register_resourcer(POD, pods()).unwrap_err();
    assert!(matches!(err, Error::ResourcerExists(key) if key == POD));
    assert_eq!(
        registry
            .register_resourcer(POD, pods())
            .unwrap_err()
            .to_string(),
        "resourcer for resource type 'core::v1::Pod' already exists"
    );
}

#[test]
fn test_malformed_key_is_rejected() {
    let registry: ResourcerRegistry<MockClient> = ResourcerRegistry::new();
    for key in ["Pod", "core::Pod", "core::v1::Pod::extra", "core::::Pod"] {
        let err = registry.register_resourcer(key, pods()).unwrap_err();
        assert!(matches!(err, Error::InvalidResourceKey(_)), "{key}");
    }
    assert!(registry.resource_metas().is_empty());
}

#[test]
fn test_bulk_registration_stops_at_first_conflict() {
    let registry = ResourcerRegistry::new();
    registry.register_resourcer("apps::v1::Deployment", pods()).unwrap();

    let err = registry
        .register_resourcers_from_map(vec![
            (ResourceMeta::new("core", "v1", "Pod"), pods()),
            (ResourceMeta::new("apps", "v1", "Deployment"), pods()),
            (ResourceMeta::new("core", "v1", "Service"), pods()),
        ])
        .unwrap_err();
    assert!(matches!(err, Error::ResourcerExists(key) if key == "apps::v1::Deployment"));

    // Entries before the conflict stay registered, later ones are never reached
    assert!(registry.get_resourcer(POD).is_ok());
    assert!(registry.get_resourcer("core::v1::Service").is_err());
}

#[test]
fn test_deregister_resourcer() {
    let registry = ResourcerRegistry::new();
    registry.register_resourcer(POD, pods()).unwrap();
    registry.deregister_resourcer(POD).unwrap();

    assert!(matches!(
        registry.get_resourcer(POD),
        Err(Error::ResourcerNotFound(_))
    ));
    let err = registry.deregister_resourcer(POD).unwrap_err();
    assert_eq!(
        err.to_string(),
        "resourcer for resource type 'core::v1::Pod' does not exist"
    );
}

// ============================================================================
// Dynamic Fallback
// ============================================================================

#[test]
fn test_static_registration_wins_over_dynamic() {
    let registry = ResourcerRegistry::new();
    registry.register_dynamic_resourcer("*", echo());
    registry.register_resourcer(POD, pods()).unwrap();

    assert!(matches!(registry.lookup(POD), ResourcerLookup::Static(_)));
    assert!(matches!(
        registry.lookup("apps::v1::Deployment"),
        ResourcerLookup::Dynamic(_)
    ));
}

#[test]
fn test_dynamic_patterns_match_by_segment() {
    let registry: ResourcerRegistry<MockClient> = ResourcerRegistry::new();
    assert!(!registry.has_dynamic_resourcers());
    registry.register_dynamic_resourcer("example.com::*::*", echo());
    assert!(registry.has_dynamic_resourcers());

    assert!(registry.get_dynamic_resourcer("example.com::v1::Widget").is_ok());
    assert!(registry
        .get_dynamic_resourcer("example.com::v1alpha1::Gadget")
        .is_ok());
    assert!(matches!(
        registry.get_dynamic_resourcer("apps::v1::Deployment"),
        Err(Error::NoResourcer(_))
    ));
    assert!(matches!(
        registry.lookup("apps::v1::Deployment"),
        ResourcerLookup::NotFound
    ));
}
