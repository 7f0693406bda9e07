//! End-of-life status from release-cycle data

use crate::matching::normalize_name;
use crate::version::strip_v;
use crate::TriState;
use chrono::{NaiveDate, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The polymorphic `eol` field of a release cycle, decided at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EolField {
    /// Missing, null or unparseable
    #[default]
    NotApplicable,
    /// `false`: supported with no announced end
    StillSupported,
    SupportedUntil(NaiveDate),
    /// `true`: unsupported, date unknown
    AlreadyUnsupported,
}

impl EolField {
    /// Support status and support-until date as of `today`.
    pub fn status_at(&self, today: NaiveDate) -> EolStatus {
        match self {
            EolField::NotApplicable => EolStatus::unknown(),
            EolField::StillSupported => EolStatus {
                supported: TriState::Yes,
                supported_until: String::new(),
            },
            EolField::AlreadyUnsupported => EolStatus {
                supported: TriState::No,
                supported_until: String::new(),
            },
            EolField::SupportedUntil(date) => EolStatus {
                supported: TriState::from(today < *date),
                supported_until: date.format(DATE_FORMAT).to_string(),
            },
        }
    }
}

impl Serialize for EolField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EolField::NotApplicable => serializer.serialize_none(),
            EolField::StillSupported => serializer.serialize_bool(false),
            EolField::AlreadyUnsupported => serializer.serialize_bool(true),
            EolField::SupportedUntil(date) => {
                serializer.serialize_str(&date.format(DATE_FORMAT).to_string())
            }
        }
    }
}

impl<'de> Deserialize<'de> for EolField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EolFieldVisitor;

        impl<'de> Visitor<'de> for EolFieldVisitor {
            type Value = EolField;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a boolean or an ISO date")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<EolField, E> {
                Ok(if v {
                    EolField::AlreadyUnsupported
                } else {
                    EolField::StillSupported
                })
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<EolField, E> {
                Ok(NaiveDate::parse_from_str(v.trim(), DATE_FORMAT)
                    .map(EolField::SupportedUntil)
                    .unwrap_or(EolField::NotApplicable))
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> Result<EolField, E> {
                Ok(EolField::NotApplicable)
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> Result<EolField, E> {
                Ok(EolField::NotApplicable)
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> Result<EolField, E> {
                Ok(EolField::NotApplicable)
            }

            fn visit_unit<E: de::Error>(self) -> Result<EolField, E> {
                Ok(EolField::NotApplicable)
            }

            fn visit_none<E: de::Error>(self) -> Result<EolField, E> {
                Ok(EolField::NotApplicable)
            }
        }

        deserializer.deserialize_any(EolFieldVisitor)
    }
}

/// Accepts `"1.14"` as well as a bare number like `8` for the cycle label.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Label {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Label::deserialize(deserializer)? {
        Label::Text(s) => s,
        Label::Number(n) => n.to_string(),
    })
}

/// One release cycle as published by endoflife.date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EolCycle {
    #[serde(deserialize_with = "string_or_number")]
    pub cycle: String,
    #[serde(default, rename = "releaseDate", skip_serializing_if = "String::is_empty")]
    pub release_date: String,
    #[serde(default)]
    pub eol: EolField,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest: String,
    #[serde(
        default,
        rename = "latestReleaseDate",
        skip_serializing_if = "String::is_empty"
    )]
    pub latest_release_date: String,
}

impl EolCycle {
    pub fn new(cycle: &str, eol: EolField) -> Self {
        Self {
            cycle: cycle.to_string(),
            eol,
            ..Default::default()
        }
    }

    pub fn with_latest(mut self, latest: &str) -> Self {
        self.latest = latest.to_string();
        self
    }
}

/// Derived support status. `supported_until` is empty when no date applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EolStatus {
    pub supported: TriState,
    pub supported_until: String,
}

impl EolStatus {
    pub fn unknown() -> Self {
        Self {
            supported: TriState::Indeterminate,
            supported_until: String::new(),
        }
    }
}

/// Does an installed version belong to a cycle? Exact label, or the
/// installed major (one-component label) or major.minor (longer label).
pub fn version_matches_cycle(installed: &str, cycle: &str) -> bool {
    let version = strip_v(installed.trim());
    let cycle = cycle.trim();
    if version == cycle {
        return true;
    }

    let version_parts: Vec<&str> = version.splitn(3, '.').collect();
    let cycle_parts: Vec<&str> = cycle.splitn(3, '.').collect();
    if version_parts.len() < 2 || cycle.is_empty() {
        return false;
    }
    if cycle_parts.len() == 1 {
        return version_parts[0] == cycle_parts[0];
    }
    version_parts[0] == cycle_parts[0] && version_parts[1] == cycle_parts[1]
}

/// First cycle, in input order, that the installed version belongs to.
pub fn matching_cycle<'c>(installed: &str, cycles: &'c [EolCycle]) -> Option<&'c EolCycle> {
    cycles
        .iter()
        .find(|c| version_matches_cycle(installed, &c.cycle))
}

/// Resolve support status against today's date.
pub fn resolve_eol_status(installed: &str, cycles: &[EolCycle]) -> EolStatus {
    resolve_eol_status_at(installed, cycles, Utc::now().date_naive())
}

pub fn resolve_eol_status_at(installed: &str, cycles: &[EolCycle], today: NaiveDate) -> EolStatus {
    matching_cycle(installed, cycles)
        .map(|cycle| cycle.eol.status_at(today))
        .unwrap_or_else(EolStatus::unknown)
}

const SLUG_ALIAS_GROUPS: &[(&str, &[&str])] = &[
    ("argo-cd", &["argo-cd", "argocd", "argo cd"]),
    ("argo-workflows", &["argo-workflows"]),
    ("calico", &["calico", "project calico", "kubernetes network policy (calico)"]),
    ("cert-manager", &["cert-manager", "cert manager", "cert-manager trust manager", "cert-manager approver-policy"]),
    (
        "cilium",
        &[
            "cilium",
            "cilium clustermesh",
            "cilium network policy",
            "cilium hubble",
            "cilium service mesh",
            "network policy editor (cilium)",
        ],
    ),
    ("containerd", &["containerd"]),
    ("contour", &["contour"]),
    ("envoy", &["envoy", "envoy gateway"]),
    ("etcd", &["etcd"]),
    ("flux", &["flux", "fluxcd", "flux notification controller", "flux image automation"]),
    ("gatekeeper", &["gatekeeper", "opa gatekeeper"]),
    ("grafana", &["grafana", "grafana oncall", "grafana mimir", "grafana pyroscope", "grafana tempo", "grafana alloy"]),
    ("grafana-loki", &["grafana-loki", "grafana loki", "loki"]),
    ("harbor", &["harbor"]),
    ("istio", &["istio", "istio ambient mesh", "istio operator"]),
    ("keda", &["keda", "keda http add-on"]),
    ("kuma", &["kuma"]),
    ("kyverno", &["kyverno", "kyverno policy reporter"]),
    (
        "prometheus",
        &[
            "prometheus",
            "prometheus operator / kube-prometheus-stack",
            "prometheus adapter",
            "prometheus pushgateway",
            "prometheus blackbox exporter",
        ],
    ),
    ("traefik", &["traefik", "traefik mesh"]),
    ("kubernetes", &["kube-proxy"]),
    ("redis", &["redis", "redis-master", "redis-node", "redis-replicas"]),
];

/// Product entry from the endoflife.date catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EolProduct {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Maps normalized addon names to endoflife.date product slugs.
///
/// The runtime index (built from the live product catalog) is consulted
/// before the built-in alias groups.
#[derive(Debug, Clone, Default)]
pub struct EolSlugIndex {
    runtime: HashMap<String, String>,
    fallback: HashMap<String, String>,
}

impl EolSlugIndex {
    pub fn new() -> Self {
        let mut fallback = HashMap::new();
        for (slug, names) in SLUG_ALIAS_GROUPS {
            for name in names.iter() {
                fallback.insert(normalize_name(name), slug.to_string());
            }
        }
        Self {
            runtime: HashMap::new(),
            fallback,
        }
    }

    /// Add the live product catalog. The first product to register a
    /// normalized name keeps it.
    pub fn with_products(mut self, products: &[EolProduct]) -> Self {
        for product in products {
            let slug = product.name.trim().to_lowercase();
            if slug.is_empty() {
                continue;
            }
            let keys = std::iter::once(product.name.as_str())
                .chain(std::iter::once(product.label.as_str()))
                .chain(product.aliases.iter().map(String::as_str));
            for key in keys {
                let normalized = normalize_name(key);
                if normalized.is_empty() {
                    continue;
                }
                self.runtime.entry(normalized).or_insert_with(|| slug.clone());
            }
        }
        self
    }

    pub fn runtime_len(&self) -> usize {
        self.runtime.len()
    }

    pub fn lookup(&self, addon_name: &str) -> Option<&str> {
        let normalized = normalize_name(addon_name);
        self.runtime
            .get(&normalized)
            .or_else(|| self.fallback.get(&normalized))
            .map(String::as_str)
    }
}
