//! Shared fixtures: the reference mapping configuration and a populated
//! in-memory directory.
#![allow(dead_code)]

use std::sync::Arc;

use scim_ldap_gateway::config;
use scim_ldap_gateway::ldap::{Entry, InMemoryDirectory};
use scim_ldap_gateway::service::LdapResourceService;

pub const CORE: &str = "urn:scim:schemas:core:1.0";
pub const PEOPLE_BASE: &str = "ou=People,dc=example,dc=com";

/// The reference configuration: SCIM `userName` → `uid`,
/// `name.familyName` → `sn`, `name.givenName` → `givenName`,
/// `emails[type=work]` → `mail`, derived `meta`, ids carried by `uid`.
pub const USER_CONFIG: &str = r#"{
  "resources": [
    {
      "name": "User",
      "schema": "urn:scim:schemas:core:1.0",
      "endpoint": "Users",
      "ldapSearch": {
        "baseDN": "ou=People,dc=example,dc=com",
        "filter": "(objectClass=inetOrgPerson)",
        "idAttribute": "uid"
      },
      "ldapAdd": {
        "dnTemplate": "uid={uid},ou=People,dc=example,dc=com",
        "fixedAttributes": [
          {
            "ldapAttribute": "objectClass",
            "fixedValues": ["top", "person", "inetOrgPerson"],
            "onConflict": "MERGE"
          }
        ]
      },
      "attributes": [
        {
          "name": "userName",
          "required": true,
          "simple": {
            "dataType": "string",
            "mapping": { "ldapAttribute": "uid" }
          }
        },
        {
          "name": "name",
          "complex": {
            "subAttributes": [
              { "name": "familyName", "dataType": "string" },
              { "name": "givenName", "dataType": "string" }
            ],
            "mappings": [
              { "subAttribute": "familyName", "ldapAttribute": "sn" },
              { "subAttribute": "givenName", "ldapAttribute": "givenName" }
            ]
          }
        },
        {
          "name": "emails",
          "complexPlural": {
            "pluralTypes": ["work"],
            "mappings": [
              { "pluralType": "work", "ldapAttribute": "mail" }
            ]
          }
        },
        {
          "name": "meta",
          "readOnly": true,
          "complex": { "subAttributes": [] },
          "derivation": { "name": "meta" }
        }
      ]
    }
  ]
}"#;

/// A person entry under the people base.
pub fn person(uid: &str, sn: &str, given: &str, mail: &str) -> Entry {
    let mut entry = Entry::new(format!("uid={uid},{PEOPLE_BASE}"));
    entry.add_str_value("objectClass", "top");
    entry.add_str_value("objectClass", "person");
    entry.add_str_value("objectClass", "inetOrgPerson");
    entry.add_str_value("uid", uid);
    entry.add_str_value("sn", sn);
    entry.add_str_value("givenName", given);
    entry.add_str_value("mail", mail);
    entry.add_str_value("createTimestamp", "20200101000000.000Z");
    entry.add_str_value("modifyTimestamp", "20210601120000.000Z");
    entry
}

/// The entry from the documented GET scenario.
pub fn bjensen() -> Entry {
    person("bjensen", "Jensen", "Barbara", "bjensen@example.com")
}

pub fn directory() -> Arc<InMemoryDirectory> {
    Arc::new(InMemoryDirectory::with_entries([
        bjensen(),
        person("adoe", "Doe", "Amelia", "adoe@example.com"),
        person("czhang", "Zhang", "Chen", "czhang@corp.example.com"),
    ]))
}

pub fn service(directory: Arc<InMemoryDirectory>) -> LdapResourceService {
    config::build_service(USER_CONFIG, directory).expect("reference configuration loads")
}
