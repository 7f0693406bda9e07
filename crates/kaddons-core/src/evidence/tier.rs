//! Classify how much compatibility data a fetched page carries

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static PLATFORM_VERSION_STRICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:(?:kubernetes|k8s)\s*(?:version)?\s*v?\d+\.\d+|v?\d+\.\d+\s*(?:kubernetes|k8s))")
        .expect("valid strict platform regex")
});

static MATRIX_KEYWORD_STRICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:compatibility\s+matrix|supported\s+(?:kubernetes\s+)?versions?|version\s+support|k8s\s+compatibility)")
        .expect("valid strict keyword regex")
});

static PLATFORM_VERSION_LOOSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(?:(?:kubernetes|k8s).{0,200}v?\d+\.\d+|v?\d+\.\d+.{0,200}(?:kubernetes|k8s))")
        .expect("valid loose platform regex")
});

static MATRIX_KEYWORD_LOOSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(?:compatibility\s+matrix|supported\s+(?:kubernetes\s+)?versions?|version\s+support|k8s\s+compatibility",
        r"|requirements?|prerequisites?|minimum\s+(?:kubernetes\s+)?version|tested\s+(?:on|with|against)",
        r"|works\s+with|compatible\s+with|requires?\s+(?:kubernetes|k8s)|platform\s+(?:support|notes?|requirements?))"
    ))
    .expect("valid loose keyword regex")
});

/// How much platform compatibility data a page appears to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatrixTier {
    /// A platform version next to a formal matrix keyword
    Matrix,
    /// Platform and version nearby plus a looser requirement keyword
    PartialMatrix,
    NoMatrix,
}

impl fmt::Display for MatrixTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixTier::Matrix => write!(f, "matrix"),
            MatrixTier::PartialMatrix => write!(f, "partial-matrix"),
            MatrixTier::NoMatrix => write!(f, "no-matrix"),
        }
    }
}

pub fn classify_matrix_tier(page_text: &str) -> MatrixTier {
    if PLATFORM_VERSION_STRICT.is_match(page_text) && MATRIX_KEYWORD_STRICT.is_match(page_text) {
        return MatrixTier::Matrix;
    }
    if PLATFORM_VERSION_LOOSE.is_match(page_text) && MATRIX_KEYWORD_LOOSE.is_match(page_text) {
        return MatrixTier::PartialMatrix;
    }
    MatrixTier::NoMatrix
}
