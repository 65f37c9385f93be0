//! Property-based coverage of the mapping laws: transformation round-trips,
//! codec round-trips, filter translation soundness, attribute-type
//! monotonicity, case-folding, and pagination. Uses proptest with automatic
//! shrinking.

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use common::{CORE, PEOPLE_BASE, USER_CONFIG};
use scim_ldap_gateway::config;
use scim_ldap_gateway::filter::Filter;
use scim_ldap_gateway::ldap::{DirectoryClient, Entry, InMemoryDirectory};
use scim_ldap_gateway::mapper::ResourceMapper;
use scim_ldap_gateway::resource::{
    PageParameters, QueryAttributes, RequestContext, ScimObject, SimpleValue, SortParameters,
};
use scim_ldap_gateway::schema::{AttributeDescriptor, DataType, ResourceDescriptor};
use scim_ldap_gateway::transform::{
    DefaultTransformation, GeneralizedTimeTransformation, Transformation,
};
use scim_ldap_gateway::wire;
use scim_ldap_gateway::AttributePath;

fn users_mapper() -> (Arc<ResourceMapper>, Arc<ResourceDescriptor>) {
    let loaded = config::load(USER_CONFIG).expect("reference configuration loads");
    let resource = loaded
        .registry
        .resource("Users")
        .expect("Users endpoint")
        .clone();
    let mapper = loaded.mappers.into_iter().next().expect("one mapper");
    (mapper, resource)
}

fn person(uid: &str, sn: &str, mail: &str) -> Entry {
    let mut entry = Entry::new(format!("uid={uid},{PEOPLE_BASE}"));
    entry.add_str_value("objectClass", "inetOrgPerson");
    entry.add_str_value("uid", uid);
    entry.add_str_value("sn", sn);
    entry.add_str_value("mail", mail);
    entry
}

fn object_ids(objects: &[ScimObject]) -> Vec<String> {
    objects
        .iter()
        .filter_map(|o| {
            o.get(CORE, "id")
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_str().map(String::from))
        })
        .collect()
}

fn simple_value_strategy() -> impl Strategy<Value = SimpleValue> {
    prop_oneof![
        "[a-zA-Z0-9 @._-]{0,24}".prop_map(SimpleValue::String),
        any::<bool>().prop_map(SimpleValue::Boolean),
        any::<i64>().prop_map(SimpleValue::Integer),
        (0i64..4102444800i64, 0u32..1000u32).prop_map(|(secs, millis)| {
            SimpleValue::DateTime(Utc.timestamp_opt(secs, millis * 1_000_000).unwrap())
        }),
        proptest::collection::vec(any::<u8>(), 0..32).prop_map(SimpleValue::Binary),
    ]
}

proptest! {
    // Law 1: toScim(toLdap(d, v)) == v for well-formed values.
    #[test]
    fn transformations_round_trip(value in simple_value_strategy()) {
        let transform = DefaultTransformation;
        let descriptor = AttributeDescriptor::simple(CORE, "attr", value.data_type());
        let raw = transform.to_ldap_value(&descriptor, &value).unwrap();
        let parsed = transform.to_scim_value(&descriptor, &raw).unwrap();
        prop_assert_eq!(parsed, value);
    }

    #[test]
    fn generalized_time_round_trips(secs in 0i64..4102444800i64, millis in 0u32..1000u32) {
        let transform = GeneralizedTimeTransformation;
        let descriptor = AttributeDescriptor::simple(CORE, "when", DataType::DateTime);
        let value = SimpleValue::DateTime(
            Utc.timestamp_opt(secs, millis * 1_000_000).unwrap(),
        );
        let raw = transform.to_ldap_value(&descriptor, &value).unwrap();
        let parsed = transform.to_scim_value(&descriptor, &raw).unwrap();
        prop_assert_eq!(parsed, value);
    }
}

prop_compose! {
    fn email_element_strategy()
        (local in "[a-z]{1,8}", primary in any::<bool>())
        -> serde_json::Value {
        json!({ "value": format!("{local}@example.com"), "type": "work", "primary": primary })
    }
}

prop_compose! {
    fn payload_strategy()
        (user_name in proptest::option::of("[A-Za-z][A-Za-z0-9]{0,9}"),
         family in proptest::option::of("[A-Za-z]{1,10}"),
         given in proptest::option::of("[A-Za-z]{1,10}"),
         emails in proptest::collection::vec(email_element_strategy(), 0..3))
        -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if let Some(user_name) = user_name {
            map.insert("userName".into(), json!(user_name));
        }
        if family.is_some() || given.is_some() {
            let mut name = serde_json::Map::new();
            if let Some(family) = family {
                name.insert("familyName".into(), json!(family));
            }
            if let Some(given) = given {
                name.insert("givenName".into(), json!(given));
            }
            map.insert("name".into(), serde_json::Value::Object(name));
        }
        if !emails.is_empty() {
            map.insert("emails".into(), json!(emails));
        }
        serde_json::Value::Object(map)
    }
}

proptest! {
    // Law 2: parse(serialize(o)) equals o up to plural order, in both wire
    // forms.
    #[test]
    fn codecs_round_trip(payload in payload_strategy()) {
        let (_, resource) = users_mapper();
        let object = wire::json::unmarshal_object(&resource, &payload).unwrap();

        let as_json = wire::json::marshal_object(&resource, &object);
        let from_json = wire::json::unmarshal_object(&resource, &as_json).unwrap();
        prop_assert!(object.equals_ignoring_order(&from_json));

        let as_xml = wire::xml::marshal_object(&resource, &object).unwrap();
        let from_xml = wire::xml::unmarshal_object(&resource, &as_xml).unwrap();
        prop_assert!(object.equals_ignoring_order(&from_xml));
    }
}

fn leaf_strategy() -> impl Strategy<Value = String> {
    let path = prop::sample::select(vec!["userName", "name.familyName", "emails.value"]);
    let op = prop::sample::select(vec!["eq", "co", "sw"]);
    let value = "[a-z]{1,6}";
    prop_oneof![
        (path.clone(), op, value).prop_map(|(p, o, v)| format!("{p} {o} \"{v}\"")),
        path.prop_map(|p| format!("{p} pr")),
    ]
}

fn filter_strategy() -> impl Strategy<Value = String> {
    (
        leaf_strategy(),
        proptest::option::of((prop::sample::select(vec!["and", "or"]), leaf_strategy())),
    )
        .prop_map(|(first, rest)| match rest {
            Some((connective, second)) => format!("{first} {connective} {second}"),
            None => first,
        })
}

prop_compose! {
    fn users_strategy()
        (users in proptest::collection::btree_map(
            "[a-z]{1,8}",
            ("[a-z]{1,8}", "[a-z]{1,8}"),
            1..6,
        ))
        -> Vec<(String, String, String)> {
        users
            .into_iter()
            .map(|(uid, (sn, local))| (uid, sn, format!("{local}@example.com")))
            .collect()
    }
}

proptest! {
    // Law 3: when the translation is complete, every entry the directory
    // returns under the translated filter satisfies the SCIM filter on its
    // mapped object.
    #[test]
    fn complete_translations_are_sound(
        users in users_strategy(),
        filter_text in filter_strategy(),
    ) {
        let (mapper, resource) = users_mapper();
        let filter = Filter::parse(&filter_text).unwrap();
        let translated = mapper.to_ldap_filter(Some(&filter)).unwrap();
        prop_assert!(translated.complete, "chosen paths always translate");

        let directory = InMemoryDirectory::with_entries(
            users.iter().map(|(uid, sn, mail)| person(uid, sn, mail)),
        );
        let ctx = RequestContext::with_generated_id();
        tokio_test::block_on(async {
            let entries = directory
                .search(
                    PEOPLE_BASE,
                    scim_ldap_gateway::ldap::SearchScope::Sub,
                    &translated.filter,
                    &[],
                    None,
                    &ctx,
                )
                .await
                .unwrap();
            for entry in entries {
                let object = mapper
                    .to_scim_object(&entry, &QueryAttributes::all(), &directory, &ctx)
                    .await
                    .unwrap()
                    .expect("entries under the guarded filter match the search filter");
                assert!(
                    filter.matches(&object, &resource),
                    "entry {} fails {filter_text}",
                    entry.dn
                );
            }
        });
    }

    // Law 4: a plural element exists iff the corresponding LDAP value does.
    #[test]
    fn plural_elements_mirror_ldap_values(
        mails in proptest::collection::btree_set("[a-z]{1,8}", 0..4),
    ) {
        let (mapper, _) = users_mapper();
        let mut entry = person("subject", "surname", "seed@example.com");
        entry.remove_attribute("mail");
        for mail in &mails {
            entry.add_str_value("mail", &format!("{mail}@example.com"));
        }
        let directory = InMemoryDirectory::new();
        let ctx = RequestContext::with_generated_id();
        let object = tokio_test::block_on(mapper.to_scim_object(
            &entry,
            &QueryAttributes::all(),
            &directory,
            &ctx,
        ))
        .unwrap()
        .unwrap();

        match object.get(CORE, "emails") {
            None => prop_assert!(mails.is_empty()),
            Some(attribute) => {
                let values: Vec<String> = attribute
                    .values()
                    .iter()
                    .filter_map(|e| {
                        e.as_complex()
                            .and_then(|c| c.simple_value("value"))
                            .and_then(|v| v.as_str().map(String::from))
                    })
                    .collect();
                let expected: Vec<String> =
                    mails.iter().map(|m| format!("{m}@example.com")).collect();
                prop_assert_eq!(values, expected);
            }
        }
    }

    // Law 5: requesting more attributes never shrinks the LDAP type set.
    #[test]
    fn requested_attribute_types_are_monotone(
        selected in proptest::collection::vec(
            prop::sample::select(vec!["userName", "name", "emails", "meta"]),
            1..4,
        ),
        extra in prop::sample::select(vec!["userName", "name", "emails", "meta"]),
    ) {
        let (mapper, resource) = users_mapper();
        let paths: Vec<AttributePath> =
            selected.iter().map(|name| AttributePath::new(*name)).collect();
        let narrow = QueryAttributes::from_paths(&resource, &paths);
        let mut widened_paths = paths;
        widened_paths.push(AttributePath::new(extra));
        let wide = QueryAttributes::from_paths(&resource, &widened_paths);

        let narrow_types = mapper.ldap_attribute_types(&narrow);
        let wide_types = mapper.ldap_attribute_types(&wide);
        for t in narrow_types {
            prop_assert!(
                wide_types.iter().any(|w| w.eq_ignore_ascii_case(&t)),
                "type {t} disappeared when widening the request"
            );
        }
    }
}

prop_compose! {
    fn cased_strategy()
        (word in "[a-zA-Z]{2,10}", flips in proptest::collection::vec(any::<bool>(), 10))
        -> (String, String) {
        let flipped = word
            .chars()
            .zip(flips.iter().cycle())
            .map(|(c, flip)| {
                if *flip {
                    c.to_ascii_uppercase()
                } else {
                    c.to_ascii_lowercase()
                }
            })
            .collect();
        (word, flipped)
    }
}

proptest! {
    // Law 6: for a caseExact=false attribute, eq/sw/co ignore case.
    #[test]
    fn case_inexact_matching_folds_case(
        (stored, cased) in cased_strategy(),
        prefix_len in 1usize..4,
        sub_start in 0usize..3,
    ) {
        let (mapper, resource) = users_mapper();
        let directory = InMemoryDirectory::new();
        let ctx = RequestContext::with_generated_id();
        let entry = person(&stored.to_lowercase(), "surname", "a@example.com");
        let object = tokio_test::block_on(mapper.to_scim_object(
            &entry,
            &QueryAttributes::all(),
            &directory,
            &ctx,
        ))
        .unwrap()
        .unwrap();
        // The directory stores a lowercased uid; the filter literal uses
        // arbitrary casing of the same word.
        let eq_filter = format!("userName eq \"{}\"", cased);
        prop_assert!(
            Filter::parse(&eq_filter)
                .unwrap()
                .matches(&object, &resource)
        );
        let prefix: String = cased.chars().take(prefix_len).collect();
        let sw_filter = format!("userName sw \"{}\"", prefix);
        prop_assert!(
            Filter::parse(&sw_filter)
                .unwrap()
                .matches(&object, &resource)
        );
        let substring: String = cased.chars().skip(sub_start.min(cased.len() - 1)).take(3).collect();
        let co_filter = format!("userName co \"{}\"", substring);
        prop_assert!(
            Filter::parse(&co_filter)
                .unwrap()
                .matches(&object, &resource)
        );
    }

    // Law 7: page concatenation equals the doubled page.
    #[test]
    fn pages_concatenate(
        users in users_strategy(),
        k in 1usize..4,
    ) {
        let (mapper, _) = users_mapper();
        let directory = InMemoryDirectory::with_entries(
            users.iter().map(|(uid, sn, mail)| person(uid, sn, mail)),
        );
        let ctx = RequestContext::with_generated_id();
        let sort = SortParameters {
            path: AttributePath::new("userName"),
            ascending: true,
        };
        tokio_test::block_on(async {
            let attrs = QueryAttributes::all();
            let page = |start: usize, count: usize| {
                mapper.query(
                    None,
                    Some(&sort),
                    Some(PageParameters::new(start, count)),
                    &attrs,
                    &directory,
                    &ctx,
                )
            };
            let first = page(1, k).await.unwrap();
            let second = page(k + 1, k).await.unwrap();
            let both = page(1, 2 * k).await.unwrap();

            let mut concatenated = object_ids(&first.resources);
            concatenated.extend(object_ids(&second.resources));
            assert_eq!(concatenated, object_ids(&both.resources));
            assert_eq!(first.total_results, both.total_results);
        });
    }
}
