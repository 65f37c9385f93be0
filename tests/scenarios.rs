//! End-to-end scenarios against the in-memory directory, covering the
//! documented request flows: JSON GET, XML POST, filter translation, partial
//! filters, error round-trips, and PUT diffing.

mod common;

use common::{CORE, PEOPLE_BASE, bjensen, directory, person, service};
use serde_json::json;

use scim_ldap_gateway::filter::Filter;
use scim_ldap_gateway::ldap::{Entry, InMemoryDirectory, Modification, ModificationType};
use scim_ldap_gateway::resource::{
    PageParameters, QueryAttributes, RequestContext, SortParameters,
};
use scim_ldap_gateway::wire;
use scim_ldap_gateway::{AttributePath, ScimError};
use std::sync::Arc;

#[tokio::test]
async fn s1_json_get_returns_the_requested_attributes() {
    let svc = service(directory());
    let resource = svc.mapper("Users").unwrap().resource().clone();
    let query = QueryAttributes::parse(&resource, "userName,name.familyName").unwrap();
    let ctx = RequestContext::with_generated_id();

    let user = svc.get("Users", "bjensen", &query, &ctx).await.unwrap();
    let body = wire::json::marshal_object(&resource, &user);
    assert_eq!(
        body,
        json!({
            "schemas": ["urn:scim:schemas:core:1.0"],
            "id": "bjensen",
            "userName": "bjensen",
            "name": { "familyName": "Jensen" }
        })
    );
}

#[tokio::test]
async fn s2_xml_post_creates_the_templated_entry() {
    let dir = directory();
    let svc = service(dir.clone());
    let resource = svc.mapper("Users").unwrap().resource().clone();
    let ctx = RequestContext::with_generated_id();

    let payload = r#"<User xmlns="urn:scim:schemas:core:1.0"><userName>alice</userName><name><familyName>Doe</familyName></name></User>"#;
    let incoming = wire::xml::unmarshal_object(&resource, payload).unwrap();
    svc.create("Users", &incoming, &QueryAttributes::all(), &ctx)
        .await
        .unwrap();

    let entry = dir
        .entry(&format!("uid=alice,{PEOPLE_BASE}"))
        .await
        .expect("created entry exists at the templated DN");
    assert_eq!(entry.string_values("uid"), vec!["alice"]);
    assert_eq!(entry.string_values("sn"), vec!["Doe"]);
    let classes = entry.string_values("objectClass");
    for wanted in ["top", "person", "inetOrgPerson"] {
        assert!(classes.iter().any(|c| c == wanted), "missing {wanted}");
    }
}

#[tokio::test]
async fn s3_full_filters_translate_to_guarded_ldap_filters() {
    let svc = service(directory());
    let mapper = svc.mapper("Users").unwrap();
    let filter = Filter::parse(r#"userName eq "bjensen" and emails.value co "example""#).unwrap();
    let translated = mapper.to_ldap_filter(Some(&filter)).unwrap();
    assert_eq!(
        translated.filter,
        "(&(&(uid=bjensen)(mail=*example*))(objectClass=inetOrgPerson))"
    );
    assert!(translated.complete);
}

#[tokio::test]
async fn s4_partial_filters_fall_back_to_the_search_filter_and_post_filter() {
    let mut early = person("adoe", "Doe", "Amelia", "adoe@example.com");
    early.set_values("modifyTimestamp", vec![b"20190301000000.000Z".to_vec()]);
    let dir = Arc::new(InMemoryDirectory::with_entries([bjensen(), early]));
    let svc = service(dir);
    let mapper = svc.mapper("Users").unwrap();
    let ctx = RequestContext::with_generated_id();

    let filter = r#"meta.lastModified gt "2020-01-01T00:00:00Z""#;
    let parsed = Filter::parse(filter).unwrap();
    let translated = mapper.to_ldap_filter(Some(&parsed)).unwrap();
    assert_eq!(translated.filter, "(objectClass=inetOrgPerson)");
    assert!(!translated.complete);

    // Only bjensen (modified 2021) survives the in-memory post-filter.
    let list = svc
        .query(
            "Users",
            Some(filter),
            None,
            None,
            &QueryAttributes::all(),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(list.total_results, 1);
    let id = list.resources[0]
        .get(CORE, "id")
        .and_then(|a| a.simple_value())
        .and_then(|v| v.as_str().map(String::from));
    assert_eq!(id.as_deref(), Some("bjensen"));
}

#[test]
fn s5_error_xml_round_trips_identically() {
    let wire_form = "<Error><code>404</code><description>User not found</description></Error>";
    let parsed = wire::xml::unmarshal_error(wire_form).unwrap();
    assert_eq!(parsed, ScimError::NotFound("User not found".into()));
    assert_eq!(wire::xml::marshal_error(&parsed).unwrap(), wire_form);
}

#[tokio::test]
async fn s6_put_diff_emits_only_the_changed_attribute() {
    let dir = directory();
    let svc = service(dir.clone());
    let mapper = svc.mapper("Users").unwrap();
    let resource = mapper.resource().clone();

    let replacement = wire::json::unmarshal_object(
        &resource,
        &json!({
            "userName": "bjensen",
            "name": { "familyName": "Jensen", "givenName": "Barbara" },
            "emails": [ { "value": "new@x.com", "type": "work" } ]
        }),
    )
    .unwrap();

    let current = dir.entry(&format!("uid=bjensen,{PEOPLE_BASE}")).await.unwrap();
    let modifications = mapper.to_ldap_modifications(&current, &replacement).unwrap();
    assert_eq!(
        modifications,
        vec![Modification::new(
            ModificationType::Replace,
            "mail",
            vec![b"new@x.com".to_vec()],
        )]
    );
}

#[tokio::test]
async fn replace_applies_the_diff_and_bumps_the_version() {
    let dir = directory();
    let svc = service(dir.clone());
    let resource = svc.mapper("Users").unwrap().resource().clone();
    let ctx = RequestContext::with_generated_id();
    let all = QueryAttributes::all();

    let before = svc.get("Users", "bjensen", &all, &ctx).await.unwrap();
    let version = |object: &scim_ldap_gateway::ScimObject| {
        object
            .get(CORE, "meta")
            .and_then(|meta| meta.complex_value())
            .and_then(|meta| meta.simple_value("version"))
            .and_then(|v| v.as_str().map(String::from))
            .expect("meta.version present")
    };
    let old_version = version(&before);

    let replacement = wire::json::unmarshal_object(
        &resource,
        &json!({
            "userName": "bjensen",
            "name": { "familyName": "Jensen", "givenName": "Barbara" },
            "emails": [ { "value": "new@x.com", "type": "work" } ]
        }),
    )
    .unwrap();

    // A stale version is rejected before anything is modified.
    let err = svc
        .replace(
            "Users",
            "bjensen",
            &replacement,
            Some("W/\"0000000000000000\""),
            &all,
            &ctx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScimError::PreconditionFailed(_)));

    let after = svc
        .replace("Users", "bjensen", &replacement, Some(&old_version), &all, &ctx)
        .await
        .unwrap();
    let emails = after.get(CORE, "emails").expect("emails present");
    let value = emails.values()[0]
        .as_complex()
        .and_then(|c| c.simple_value("value"))
        .and_then(|v| v.as_str().map(String::from));
    assert_eq!(value.as_deref(), Some("new@x.com"));
    assert_ne!(version(&after), old_version);
}

#[tokio::test]
async fn patch_merges_attributes_and_deletes_marked_plural_values() {
    let dir = directory();
    let svc = service(dir.clone());
    let resource = svc.mapper("Users").unwrap().resource().clone();
    let ctx = RequestContext::with_generated_id();

    let patch = wire::json::unmarshal_object(
        &resource,
        &json!({
            "name": { "givenName": "Barb" },
            "emails": [
                { "value": "bjensen@example.com", "operation": "delete" },
                { "value": "barb@example.com", "type": "work" }
            ]
        }),
    )
    .unwrap();
    svc.patch("Users", "bjensen", &patch, None, &QueryAttributes::all(), &ctx)
        .await
        .unwrap();

    let entry = dir.entry(&format!("uid=bjensen,{PEOPLE_BASE}")).await.unwrap();
    assert_eq!(entry.string_values("mail"), vec!["barb@example.com"]);
    assert_eq!(entry.string_values("givenName"), vec!["Barb"]);
    // Untouched by the patch.
    assert_eq!(entry.string_values("sn"), vec!["Jensen"]);
}

#[tokio::test]
async fn query_supports_sorting_and_paging() {
    let svc = service(directory());
    let ctx = RequestContext::with_generated_id();
    let sort = SortParameters {
        path: AttributePath::new("userName"),
        ascending: false,
    };

    let page_one = svc
        .query(
            "Users",
            None,
            Some(&sort),
            Some(PageParameters::new(1, 2)),
            &QueryAttributes::all(),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(page_one.total_results, 3);
    assert_eq!(page_one.start_index, 1);
    let ids: Vec<String> = page_one
        .resources
        .iter()
        .filter_map(|r| {
            r.get(CORE, "id")
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_str().map(String::from))
        })
        .collect();
    assert_eq!(ids, vec!["czhang", "bjensen"]);

    let page_two = svc
        .query(
            "Users",
            None,
            Some(&sort),
            Some(PageParameters::new(3, 2)),
            &QueryAttributes::all(),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(page_two.resources.len(), 1);
}

#[tokio::test]
async fn errors_carry_their_documented_kinds() {
    let dir = directory();
    let svc = service(dir.clone());
    let resource = svc.mapper("Users").unwrap().resource().clone();
    let ctx = RequestContext::with_generated_id();
    let all = QueryAttributes::all();

    // Unknown endpoint and unknown id.
    assert!(matches!(
        svc.get("Gadgets", "x", &all, &ctx).await.unwrap_err(),
        ScimError::NotFound(_)
    ));
    assert!(matches!(
        svc.get("Users", "nobody", &all, &ctx).await.unwrap_err(),
        ScimError::NotFound(_)
    ));

    // Duplicate create conflicts.
    let duplicate = wire::json::unmarshal_object(
        &resource,
        &json!({ "userName": "bjensen", "name": { "familyName": "Jensen" } }),
    )
    .unwrap();
    assert!(matches!(
        svc.create("Users", &duplicate, &all, &ctx).await.unwrap_err(),
        ScimError::Conflict(_)
    ));

    // Missing required attribute.
    let incomplete = wire::json::unmarshal_object(
        &resource,
        &json!({ "name": { "familyName": "Nobody" } }),
    )
    .unwrap();
    assert!(matches!(
        svc.create("Users", &incomplete, &all, &ctx).await.unwrap_err(),
        ScimError::InvalidResource(_)
    ));

    // Unparseable filter and unresolvable sort.
    assert!(matches!(
        svc.query("Users", Some("userName zz \"x\""), None, None, &all, &ctx)
            .await
            .unwrap_err(),
        ScimError::InvalidFilter(_)
    ));
    let sort = SortParameters {
        path: AttributePath::new("meta"),
        ascending: true,
    };
    assert!(matches!(
        svc.query("Users", None, Some(&sort), None, &all, &ctx)
            .await
            .unwrap_err(),
        ScimError::InvalidSort(_)
    ));

    // Cancellation surfaces unchanged.
    let cancelled = RequestContext::with_generated_id();
    cancelled.cancel();
    assert!(matches!(
        svc.get("Users", "bjensen", &all, &cancelled).await.unwrap_err(),
        ScimError::Cancelled
    ));
}

#[tokio::test]
async fn delete_removes_the_entry_for_good() {
    let dir = directory();
    let svc = service(dir.clone());
    let ctx = RequestContext::with_generated_id();
    let all = QueryAttributes::all();

    svc.delete("Users", "adoe", &ctx).await.unwrap();
    assert!(dir.entry(&format!("uid=adoe,{PEOPLE_BASE}")).await.is_none());
    assert!(matches!(
        svc.get("Users", "adoe", &all, &ctx).await.unwrap_err(),
        ScimError::NotFound(_)
    ));
}

#[tokio::test]
async fn hidden_entries_do_not_exist_as_resources() {
    // An entry under the base that the search filter excludes.
    let mut printer = Entry::new(format!("uid=printer,{PEOPLE_BASE}"));
    printer.add_str_value("objectClass", "device");
    printer.add_str_value("uid", "printer");
    let dir = Arc::new(InMemoryDirectory::with_entries([bjensen(), printer]));
    let svc = service(dir);
    let ctx = RequestContext::with_generated_id();

    assert!(matches!(
        svc.get("Users", "printer", &QueryAttributes::all(), &ctx)
            .await
            .unwrap_err(),
        ScimError::NotFound(_)
    ));
    let list = svc
        .query("Users", None, None, None, &QueryAttributes::all(), &ctx)
        .await
        .unwrap();
    assert_eq!(list.total_results, 1);
}
