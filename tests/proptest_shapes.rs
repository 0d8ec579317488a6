//! Property-based tests using proptest
//!
//! These tests check that extracted values always fit the schema built for
//! the same shape, and that the needs cache queries each environment once
//! however lookups are interleaved.

use encore_needs::datasource::{self, DataSource};
use encore_needs::error::QueryError;
use encore_needs::extract::{Extractor, Value, ValueTree};
use encore_needs::needs::{Need, NeedsCache, NeedsClient, TypeRef};
use encore_needs::schema::{AttributeKind, AttributeTree, SchemaBuilder};
use encore_needs::shape::{registry, ShapeRegistry, SATISFIER};
use proptest::prelude::*;
use serde_json::{json, Map, Value as Json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A string, or nothing at all
fn arb_opt_string() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-z0-9:/-]{0,24}")
}

/// Build an object, leaving out keys with no value
fn object(entries: Vec<(&str, Option<Json>)>) -> Json {
    let map: Map<String, Json> = entries
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
        .collect();
    Json::Object(map)
}

fn arb_aws_subnet() -> impl Strategy<Value = Json> {
    (arb_opt_string(), arb_opt_string(), arb_opt_string()).prop_map(|(arn, az, vpc)| {
        object(vec![
            ("arn", arn.map(Json::from)),
            ("az", az.map(Json::from)),
            ("vpc", vpc.map(|id| json!({ "id": id }))),
        ])
    })
}

fn arb_aws_sql_server() -> impl Strategy<Value = Json> {
    (
        arb_opt_string(),
        prop::option::of(prop::collection::vec(arb_aws_subnet(), 0..4)),
        arb_opt_string(),
    )
        .prop_map(|(arn, subnets, sg)| {
            object(vec![
                ("__typename", Some(json!("AWSSQLServer"))),
                ("arn", arn.map(Json::from)),
                (
                    "subnetGroup",
                    subnets.map(|s| json!({ "arn": "arn:sg", "subnets": s })),
                ),
                ("securityGroup", sg.map(|id| json!({ "id": id }))),
            ])
        })
}

fn arb_gcp_sql_server() -> impl Strategy<Value = Json> {
    (arb_opt_string(), arb_opt_string()).prop_map(|(link, fingerprint)| {
        object(vec![
            ("__typename", Some(json!("GCPSQLServer"))),
            ("selfLink", link.map(Json::from)),
            ("sslCert", fingerprint.map(|f| json!({ "fingerprint": f }))),
        ])
    })
}

/// A server node with a known, unknown or missing discriminator
fn arb_sql_server() -> impl Strategy<Value = Json> {
    prop_oneof![
        arb_aws_sql_server(),
        arb_gcp_sql_server(),
        Just(json!({"__typename": "AzureSQLServer", "id": "x"})),
        Just(json!({"arn": "arn:untyped"})),
        Just(Json::Null),
    ]
}

fn arb_cloud_run() -> impl Strategy<Value = Json> {
    (
        arb_opt_string(),
        prop::option::of(prop::option::of(arb_opt_string())),
        prop::option::of(prop::option::of(arb_opt_string())),
    )
        .prop_map(|(link, connector, subnet)| {
            // Outer None: key missing. Inner None: explicit null.
            let nullable = |v: Option<Option<Option<String>>>| {
                v.map(|inner| match inner {
                    Some(link) => json!({ "selfLink": link, "network": {"selfLink": "net"} }),
                    None => Json::Null,
                })
            };
            object(vec![
                ("__typename", Some(json!("Service"))),
                (
                    "compute",
                    Some(object(vec![
                        ("__typename", Some(json!("GCPCloudRun"))),
                        ("selfLink", link.map(Json::from)),
                        ("serverlessVPCConnector", nullable(connector)),
                        ("subnet", nullable(subnet)),
                    ])),
                ),
            ])
        })
}

/// Any satisfier payload the platform could send
fn arb_satisfier() -> impl Strategy<Value = Json> {
    prop_oneof![
        arb_opt_string().prop_map(|arn| object(vec![
            ("__typename", Some(json!("AWSSNSTopic"))),
            ("arn", arn.map(Json::from)),
        ])),
        arb_opt_string().prop_map(|link| object(vec![
            ("__typename", Some(json!("GCPPubSubTopic"))),
            ("selfLink", link.map(Json::from)),
        ])),
        arb_sql_server().prop_map(|server| json!({"__typename": "SQLDatabase", "server": server})),
        (any::<u8>(), arb_opt_string()).prop_map(|(n, link)| json!({
            "__typename": "RedisKeyspace",
            "databaseNumber": n,
            "cluster": object(vec![
                ("__typename", Some(json!("GCPRedisCluster"))),
                ("selfLink", link.map(Json::from)),
            ])
        })),
        arb_cloud_run(),
    ]
}

fn typename(payload: &Json) -> &str {
    payload["__typename"].as_str().unwrap_or_default()
}

/// The data source whose variants include the payload's
fn source_for(payload: &Json) -> DataSource {
    datasource::data_sources()
        .unwrap()
        .into_iter()
        .find(|ds| ds.variants().iter().any(|v| *v == typename(payload)))
        .unwrap()
}

fn extract(payload: &Json, filter: Option<&[&str]>) -> ValueTree {
    Extractor::new(registry())
        .extract(SATISFIER, payload, filter)
        .unwrap()
}

/// True if every value has an attribute of a matching kind
fn fits(values: &ValueTree, attrs: &AttributeTree) -> bool {
    values.iter().all(|(name, value)| {
        let Some(attr) = attrs.get(name) else {
            return false;
        };
        match (&attr.kind, value) {
            (AttributeKind::Object { attributes }, Value::Object(tree)) => fits(tree, attributes),
            (AttributeKind::ListNested { attributes }, Value::List(items)) => {
                items.iter().all(|item| match item {
                    Value::Object(tree) => fits(tree, attributes),
                    _ => false,
                })
            }
            (AttributeKind::List { .. }, Value::List(_)) => true,
            (AttributeKind::Primitive { .. }, v) => {
                !matches!(v, Value::Object(_) | Value::List(_))
            }
            _ => false,
        }
    })
}

/// Shapes whose inline chains must flatten to the same attributes
const INLINE_SHAPES: &str = r#"{
  "shapes": {
    "Outer": {
      "fields": [
        { "ident": "Id", "type": "string" },
        { "ident": "Middle", "key": "middle", "inline": true, "type": "Middle" }
      ]
    },
    "Middle": {
      "fields": [
        { "ident": "Inner", "key": "inner", "inline": true, "type": "Inner" }
      ]
    },
    "Inner": {
      "fields": [
        { "ident": "Leaf", "type": "string" },
        { "ident": "Count", "type": "int" }
      ]
    },
    "Flat": {
      "fields": [
        { "ident": "Id", "type": "string" },
        { "ident": "Leaf", "type": "string" },
        { "ident": "Count", "type": "int" }
      ]
    }
  }
}"#;

fn inline_registry() -> ShapeRegistry {
    ShapeRegistry::from_sources(&[INLINE_SHAPES]).unwrap()
}

/// Nested shapes made of one-of alternatives
const UNION_SHAPES: [&str; 3] = ["SQLServer", "K8sCluster", "Ingress"];

/// Discriminator and attribute name of each alternative of a shape
fn alternatives(shape: &str) -> Vec<(&'static str, &'static str)> {
    registry()
        .get(shape)
        .unwrap()
        .fields
        .iter()
        .filter_map(|f| Some((f.alternative()?, f.name.as_deref()?)))
        .collect()
}

/// Filtering a union keeps the chosen alternative and every field outside it
#[test]
fn filtered_union_is_subset_of_full_union() {
    let builder = SchemaBuilder::new(registry());
    for shape in UNION_SHAPES {
        let full = builder.build(shape, None).unwrap();
        let alts = alternatives(shape);
        assert!(alts.len() >= 2, "{} should be a union", shape);

        for (on, name) in &alts {
            let filtered = builder.build(shape, Some(&[*on])).unwrap();
            for (key, attr) in &filtered {
                assert_eq!(full.get(key), Some(attr), "{}.{} differs when filtered", shape, key);
            }

            let expected: Vec<&str> = full
                .keys()
                .map(String::as_str)
                .filter(|k| k == name || !alts.iter().any(|(_, other)| other == k))
                .collect();
            let actual: Vec<&str> = filtered.keys().map(String::as_str).collect();
            assert_eq!(actual, expected, "{} filtered to {}", shape, on);
        }
    }
}

proptest! {
    /// Every extracted value has an attribute in its data source's schema
    #[test]
    fn values_fit_schema(payload in arb_satisfier()) {
        let source = source_for(&payload);
        let values = extract(&payload, Some(source.variants()));
        prop_assert!(
            fits(&values, &source.schema().attributes),
            "{:?} does not fit the {} schema",
            values,
            source.name()
        );
    }

    /// Values also fit the schema restricted to the payload's own variant
    #[test]
    fn filtered_values_fit_filtered_schema(payload in arb_satisfier()) {
        let filter = [typename(&payload)];
        let attrs = SchemaBuilder::new(registry()).build(SATISFIER, Some(&filter)).unwrap();
        let values = extract(&payload, Some(&filter));
        prop_assert!(fits(&values, &attrs));
        // The filter only removes alternatives that could not match anyway
        prop_assert_eq!(values, extract(&payload, Some(source_for(&payload).variants())));
    }

    /// Across one payload per alternative, extraction populates exactly the schema's keys
    #[test]
    fn union_keys_match_schema(arn in "[a-z:]{0,12}", link in "[a-z/]{0,12}") {
        let builder = SchemaBuilder::new(registry());
        let extractor = Extractor::new(registry());
        for shape in UNION_SHAPES {
            let attrs = builder.build(shape, None).unwrap();
            let mut seen = BTreeSet::new();
            for (on, _) in alternatives(shape) {
                let payload = json!({"__typename": on, "arn": arn, "selfLink": link});
                let values = extractor.extract(shape, &payload, None).unwrap();
                prop_assert!(fits(&values, &attrs));
                seen.extend(values.into_keys());
            }
            let keys: BTreeSet<String> = attrs.into_keys().collect();
            prop_assert_eq!(seen, keys, "keys of {}", shape);
        }
    }

    /// A filter that excludes the payload's variant yields nothing
    #[test]
    fn excluded_variant_yields_nothing(payload in arb_satisfier()) {
        let other = if typename(&payload) == "AWSSNSTopic" { "GCPPubSubTopic" } else { "AWSSNSTopic" };
        prop_assert!(extract(&payload, Some(&[other])).is_empty());
    }

    /// At most one server alternative is populated, and only for a known typename
    #[test]
    fn at_most_one_alternative(server in arb_sql_server()) {
        let payload = json!({"__typename": "SQLDatabase", "server": server});
        let values = extract(&payload, Some(&["SQLDatabase"]));
        prop_assert!(values.len() <= 1);
        match server["__typename"].as_str() {
            Some("AWSSQLServer") => prop_assert!(values.contains_key("aws_rds")),
            Some("GCPSQLServer") => prop_assert!(values.contains_key("gcp_cloud_sql")),
            _ => prop_assert!(values.is_empty()),
        }
    }

    /// Optional fields are absent exactly when null or missing, others always present
    #[test]
    fn optional_absence(payload in arb_cloud_run()) {
        let root = Value::Object(extract(&payload, Some(&["Service"])));
        let compute = &payload["compute"];

        prop_assert!(root.pointer("gcp_cloud_run.id").is_some());
        prop_assert!(root.pointer("gcp_cloud_run.service_account.id").is_some());
        prop_assert_eq!(
            root.pointer("gcp_cloud_run.subnet").is_some(),
            !compute["subnet"].is_null()
        );
        prop_assert_eq!(
            root.pointer("gcp_cloud_run.serverless_vpc_connector").is_some(),
            !compute["serverlessVPCConnector"].is_null()
        );
    }

    /// Nested inline fields flatten the same as declaring the fields directly
    #[test]
    fn inline_chains_flatten(
        id in arb_opt_string(),
        leaf in arb_opt_string(),
        count in prop::option::of(any::<i32>()),
    ) {
        let registry = inline_registry();
        let builder = SchemaBuilder::new(&registry);
        prop_assert_eq!(builder.build("Outer", None).unwrap(), builder.build("Flat", None).unwrap());

        let nested = object(vec![
            ("id", id.clone().map(Json::from)),
            ("middle", Some(json!({
                "inner": object(vec![
                    ("leaf", leaf.clone().map(Json::from)),
                    ("count", count.map(Json::from)),
                ])
            }))),
        ]);
        let flat = object(vec![
            ("id", id.map(Json::from)),
            ("leaf", leaf.map(Json::from)),
            ("count", count.map(Json::from)),
        ]);

        let extractor = Extractor::new(&registry);
        prop_assert_eq!(
            extractor.extract("Outer", &nested, None).unwrap(),
            extractor.extract("Flat", &flat, None).unwrap()
        );
    }

    /// Repeated lookups query each environment once and return the same need
    #[test]
    fn cache_queries_each_env_once(
        lookups in prop::collection::vec((prop_oneof!["", "staging", "prod", "@primary"], "[a-c]"), 1..20)
    ) {
        tokio_test::block_on(async {
            let cache = NeedsCache::new(EchoClient::default(), "", vec![TypeRef::from("need.Topic")]);
            let topic = TypeRef::from("need.Topic");
            let mut first: Vec<(String, String, Arc<Need>)> = Vec::new();

            for (env, name) in &lookups {
                let need = cache.get(&topic, env, name).await.unwrap().unwrap();
                let resolved = cache.resolve_env(Some(env.as_str())).to_string();
                match first.iter().find(|(e, n, _)| *e == resolved && n == name) {
                    Some((_, _, seen)) => assert!(Arc::ptr_eq(seen, &need)),
                    None => first.push((resolved, name.clone(), need)),
                }
            }

            let mut envs: Vec<&str> = lookups
                .iter()
                .map(|(env, _)| cache.resolve_env(Some(env.as_str())))
                .collect();
            envs.sort_unstable();
            envs.dedup();
            assert_eq!(cache.client().calls.load(Ordering::SeqCst), envs.len());
        });
    }
}

/// Answers every environment with a topic named a, b and c
#[derive(Default)]
struct EchoClient {
    calls: AtomicUsize,
}

impl NeedsClient for EchoClient {
    async fn query_needs(&self, env: &str, _types: &[TypeRef]) -> Result<Vec<Need>, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ["a", "b", "c"]
            .iter()
            .map(|name| {
                serde_json::from_value(json!({
                    "id": format!("{}/{}", env, name),
                    "typeRef": "need.Topic",
                    "encoreName": name,
                    "satisfier": {"__typename": "AWSSNSTopic", "arn": format!("arn:{}:{}", env, name)}
                }))
                .map_err(|e| QueryError::Other(e.to_string()))
            })
            .collect()
    }
}
