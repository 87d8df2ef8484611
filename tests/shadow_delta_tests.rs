//! Shadow delta computation against a schema built from a connector schema.

mod common;

use common::{MockConnectorFramework, account_class_name, manager, native_schema, resource};
use proptest::prelude::*;
use resource_provisioning::context::{OperationContext, ReadOptions};
use resource_provisioning::repository::{InMemoryRepository, Repository};
use resource_provisioning::resource::{CachingPolicy, CachingStrategy, CapabilitySet};
use resource_provisioning::schema::{
    ItemName, ObjectTypeConfig, ResourceSchema, ShadowKind, StandardMatchingRules,
    TypeIdentification,
};
use resource_provisioning::shadow::{
    ItemPath, ResourceObject, ShadowDelta, ShadowDeltaContext, ShadowLifecycleState, ShadowRecord,
    compute_shadow_delta,
};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;

fn delta_context(strategy: CachingStrategy) -> ShadowDeltaContext {
    let types = vec![
        ObjectTypeConfig::new(ShadowKind::Account, "default", account_class_name()).as_default(),
    ];
    let outcome = ResourceSchema::build(&native_schema(), &types, &CapabilitySet::new());
    assert!(outcome.errors.is_empty());
    let definition = outcome
        .schema
        .composite_definition(
            &account_class_name(),
            Some(&TypeIdentification::new(ShadowKind::Account, "default")),
            &BTreeSet::new(),
        )
        .unwrap();
    ShadowDeltaContext::new(strategy, definition, Arc::new(StandardMatchingRules::new()))
}

fn attribute_modifications(delta: &ShadowDelta) -> usize {
    delta.attribute_modifications().count()
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    name: String,
    mail: Option<String>,
    roles: BTreeSet<String>,
    fax: Option<String>,
}

fn account() -> impl Strategy<Value = Account> {
    (
        "[0-9]{1,5}",
        "[a-z]{1,8}",
        proptest::option::of("[a-z]{1,6}@[a-z]{1,6}\\.com"),
        proptest::collection::btree_set("[a-z]{1,5}", 0..5),
        proptest::option::of("[0-9]{3}-[0-9]{4}"),
    )
        .prop_map(|(uid, name, mail, roles, fax)| Account {
            uid,
            name,
            mail,
            roles,
            fax,
        })
}

fn identifiers_only(account: &Account) -> ShadowRecord {
    ShadowRecord::new("shadow", "resource", account_class_name())
        .with_name(account.name.clone())
        .with_attribute(ItemName::icfs("uid"), vec![json!(account.uid)])
        .with_attribute(ItemName::icfs("name"), vec![json!(account.name)])
}

fn fully_cached(account: &Account) -> ShadowRecord {
    let mut shadow = identifiers_only(account);
    if let Some(mail) = &account.mail {
        shadow = shadow.with_attribute(ItemName::ri("mail"), vec![json!(mail.to_lowercase())]);
    }
    if !account.roles.is_empty() {
        let roles = account.roles.iter().map(|r| json!(r)).collect();
        shadow = shadow.with_attribute(ItemName::ri("roles"), roles);
    }
    if let Some(fax) = &account.fax {
        shadow = shadow.with_attribute(ItemName::ri("fax"), vec![json!(fax)]);
    }
    shadow
}

/// The account as the connector reports it: mail in upper case, roles reversed.
fn observed(account: &Account) -> ResourceObject {
    let mut object = ResourceObject::new(account_class_name())
        .with_attribute(ItemName::icfs("uid"), vec![json!(account.uid)])
        .with_attribute(ItemName::icfs("name"), vec![json!(account.name)])
        .with_attribute(
            ItemName::ri("roles"),
            account.roles.iter().rev().map(|r| json!(r)).collect(),
        );
    if let Some(mail) = &account.mail {
        object = object.with_attribute(ItemName::ri("mail"), vec![json!(mail.to_uppercase())]);
    }
    if let Some(fax) = &account.fax {
        object = object.with_attribute(ItemName::ri("fax"), vec![json!(fax)]);
    }
    object
}

proptest! {
    #[test]
    fn identical_state_under_none_yields_empty_delta(account in account()) {
        let delta = compute_shadow_delta(
            &delta_context(CachingStrategy::None),
            &identifiers_only(&account),
            &observed(&account),
            None,
            ShadowLifecycleState::Live,
        ).unwrap();
        prop_assert!(delta.is_empty(), "unexpected delta: {:?}", delta);
    }

    #[test]
    fn identical_state_under_passive_only_refreshes_metadata(account in account()) {
        let delta = compute_shadow_delta(
            &delta_context(CachingStrategy::Passive),
            &fully_cached(&account),
            &observed(&account),
            None,
            ShadowLifecycleState::Live,
        ).unwrap();
        prop_assert_eq!(attribute_modifications(&delta), 0);
        prop_assert_eq!(delta.len(), 1);
        prop_assert!(delta.find(&ItemPath::CachingMetadata).is_some());
    }

    #[test]
    fn applied_delta_leaves_nothing_to_do(stored in account(), current in account()) {
        let context = delta_context(CachingStrategy::Passive);
        let mut shadow = fully_cached(&stored);
        // Keep the identity stable; everything else may differ.
        shadow.attributes.insert(ItemName::icfs("uid"), vec![json!(current.uid)]);
        let seen = observed(&current);

        let delta = compute_shadow_delta(&context, &shadow, &seen, None, ShadowLifecycleState::Live)
            .unwrap();
        let updated = delta.applied_to(&shadow);
        let again = compute_shadow_delta(&context, &updated, &seen, None, ShadowLifecycleState::Live)
            .unwrap();
        prop_assert_eq!(attribute_modifications(&again), 0);
        prop_assert!(again.find(&ItemPath::Name).is_none());

        let expected = fully_cached(&current);
        prop_assert_eq!(updated.name.as_deref(), Some(current.name.as_str()));
        prop_assert_eq!(
            updated.attributes.keys().collect::<Vec<_>>(),
            expected.attributes.keys().collect::<Vec<_>>()
        );
        for (name, values) in &expected.attributes {
            let actual: BTreeSet<String> = updated.attributes[name].iter().map(Value::to_string).collect();
            let wanted: BTreeSet<String> = values.iter().map(Value::to_string).collect();
            prop_assert_eq!(actual, wanted);
        }
    }
}

#[tokio::test]
async fn test_delta_for_completed_resource() {
    let repository = InMemoryRepository::new();
    let connectors = MockConnectorFramework::new();
    let manager = manager(&repository, &connectors);
    let mut raw = resource("r-1");
    raw.configuration.caching = Some(CachingPolicy::new(CachingStrategy::Passive));
    repository.add_object(raw).await.unwrap();

    let context = OperationContext::new("delta");
    let definition = manager
        .get_resource("r-1", ReadOptions::new().with_readonly(true), &context)
        .await
        .unwrap();
    let delta_context = manager
        .shadow_delta_context(
            &definition,
            &account_class_name(),
            Some(&TypeIdentification::new(ShadowKind::Account, "default")),
            &BTreeSet::new(),
        )
        .unwrap();

    let shadow = ShadowRecord::new("s-1", "r-1", account_class_name())
        .with_name("jdoe")
        .with_attribute(ItemName::icfs("uid"), vec![json!("1001")])
        .with_attribute(ItemName::icfs("name"), vec![json!("jdoe")])
        .with_attribute(ItemName::ri("mail"), vec![json!("a@x")])
        .with_attribute(ItemName::ri("roles"), vec![json!("r1"), json!("r2")])
        .with_attribute(ItemName::ri("fax"), vec![json!("555")])
        .with_attribute(ItemName::ri("password"), vec![json!("secret")]);
    let observed = ResourceObject::new(account_class_name())
        .with_attribute(ItemName::icfs("uid"), vec![json!("1001")])
        .with_attribute(ItemName::icfs("name"), vec![json!("jdoe")])
        .with_attribute(ItemName::ri("mail"), vec![json!("A@X")])
        .with_attribute(ItemName::ri("roles"), vec![json!("r2"), json!("r3")])
        .with_attribute(ItemName::ri("password"), vec![json!("secret")]);

    let delta = compute_shadow_delta(
        &delta_context,
        &shadow,
        &observed,
        None,
        ShadowLifecycleState::Live,
    )
    .unwrap();

    assert!(delta.find_attribute(&ItemName::ri("mail")).is_none());
    let roles = delta.find_attribute(&ItemName::ri("roles")).unwrap();
    assert_eq!(roles.values_to_add, vec![json!("r3")]);
    assert_eq!(roles.values_to_delete, vec![json!("r1")]);
    let fax = delta.find_attribute(&ItemName::ri("fax")).unwrap();
    assert_eq!(fax.values_to_delete, vec![json!("555")]);
    // Not readable, so never kept in the shadow.
    let password = delta.find_attribute(&ItemName::ri("password")).unwrap();
    assert_eq!(password.values_to_delete, vec![json!("secret")]);
    assert!(delta.find(&ItemPath::Exists).is_none());
    assert_eq!(attribute_modifications(&delta), 3);
}
