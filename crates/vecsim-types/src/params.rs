//! Runtime query-parameter resolution.
//!
//! Callers pass raw `(name, value)` string pairs together with the kind of
//! query they are about to run; resolution validates every pair and produces
//! the execution policy. Names are matched case-insensitively.
//!
//! | Name            | Index kinds       | Query kinds    | Value                    |
//! |-----------------|-------------------|----------------|--------------------------|
//! | `EF_RUNTIME`    | HNSW, Tiered      | k-NN, hybrid   | positive integer         |
//! | `EPSILON`       | HNSW, Tiered      | range          | positive float           |
//! | `batch_size`    | all               | hybrid         | positive 64-bit integer  |
//! | `HYBRID_POLICY` | all               | hybrid         | `batches` / `adhoc_bf`   |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::Algorithm;

pub const EF_RUNTIME: &str = "EF_RUNTIME";
pub const EPSILON: &str = "EPSILON";
pub const BATCH_SIZE: &str = "batch_size";
pub const HYBRID_POLICY: &str = "HYBRID_POLICY";

const POLICY_BATCHES: &str = "batches";
const POLICY_ADHOC_BF: &str = "adhoc_bf";

/// Errors produced while resolving query parameters.
///
/// Every policy conflict has its own variant so callers can report it precisely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("Unknown parameter: {0}")]
    UnknownParam(String),

    #[error("Parameter already set: {0}")]
    AlreadySet(String),

    #[error("Bad value for {name}: {value}")]
    BadValue { name: String, value: String },

    #[error("Invalid policy: {0} is not a known hybrid policy")]
    InvalidPolicyNotExist(String),

    #[error("Invalid policy: {0} is only valid for hybrid queries")]
    InvalidPolicyNotHybrid(String),

    #[error("Invalid policy: {0} is only valid for range queries")]
    InvalidPolicyNotRange(String),

    #[error("Invalid policy: ad-hoc with batch size")]
    InvalidPolicyAdhocWithBatchSize,

    #[error("Invalid policy: ad-hoc with ef_runtime")]
    InvalidPolicyAdhocWithEfRuntime,
}

/// A raw, unparsed parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParam {
    pub name: String,
    pub value: String,
}

impl RawParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The kind of query the parameters are resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    None,
    Knn,
    Range,
    Hybrid,
}

/// How a hybrid (filtered) query is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchMode {
    /// No explicit policy; the executor decides.
    #[default]
    Standard,
    /// Pull candidates from the index in batches and filter them.
    HybridBatches,
    /// Scan the filtered set with brute force.
    HybridAdhocBf,
}

/// Resolved query parameters. `None` fields fall back to index defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryParams {
    pub ef_runtime: Option<usize>,
    pub epsilon: Option<f64>,
    pub batch_size: Option<usize>,
    pub search_mode: SearchMode,
}

impl QueryParams {
    pub fn with_ef_runtime(mut self, ef: usize) -> Self {
        self.ef_runtime = Some(ef);
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = Some(epsilon);
        self
    }
}

/// Resolve raw parameters for a query of kind `query_type` on an `algorithm` index.
pub fn resolve_params(
    raw: &[RawParam],
    algorithm: Algorithm,
    query_type: QueryType,
) -> Result<QueryParams, ParamError> {
    let mut params = QueryParams::default();
    let graph_based = algorithm != Algorithm::BruteForce;

    for param in raw {
        let name = param.name.as_str();
        if graph_based && name.eq_ignore_ascii_case(EF_RUNTIME) {
            if params.ef_runtime.is_some() {
                return Err(ParamError::AlreadySet(EF_RUNTIME.to_string()));
            }
            if query_type == QueryType::Range {
                return Err(ParamError::InvalidPolicyNotRange(EF_RUNTIME.to_string()));
            }
            params.ef_runtime = Some(parse_positive_int(EF_RUNTIME, &param.value)?);
        } else if graph_based && name.eq_ignore_ascii_case(EPSILON) {
            if params.epsilon.is_some() {
                return Err(ParamError::AlreadySet(EPSILON.to_string()));
            }
            if query_type != QueryType::Range {
                return Err(ParamError::InvalidPolicyNotRange(EPSILON.to_string()));
            }
            params.epsilon = Some(parse_positive_float(EPSILON, &param.value)?);
        } else if name.eq_ignore_ascii_case(BATCH_SIZE) {
            if params.batch_size.is_some() {
                return Err(ParamError::AlreadySet(BATCH_SIZE.to_string()));
            }
            if query_type != QueryType::Hybrid {
                return Err(ParamError::InvalidPolicyNotHybrid(BATCH_SIZE.to_string()));
            }
            params.batch_size = Some(parse_positive_int(BATCH_SIZE, &param.value)?);
        } else if name.eq_ignore_ascii_case(HYBRID_POLICY) {
            if params.search_mode != SearchMode::Standard {
                return Err(ParamError::AlreadySet(HYBRID_POLICY.to_string()));
            }
            if query_type != QueryType::Hybrid {
                return Err(ParamError::InvalidPolicyNotHybrid(HYBRID_POLICY.to_string()));
            }
            params.search_mode = parse_policy(&param.value)?;
        } else {
            return Err(ParamError::UnknownParam(param.name.clone()));
        }
    }

    if params.search_mode == SearchMode::HybridAdhocBf {
        if params.batch_size.is_some() {
            return Err(ParamError::InvalidPolicyAdhocWithBatchSize);
        }
        if params.ef_runtime.is_some() {
            return Err(ParamError::InvalidPolicyAdhocWithEfRuntime);
        }
    }

    Ok(params)
}

fn parse_policy(value: &str) -> Result<SearchMode, ParamError> {
    if value.eq_ignore_ascii_case(POLICY_BATCHES) {
        Ok(SearchMode::HybridBatches)
    } else if value.eq_ignore_ascii_case(POLICY_ADHOC_BF) {
        Ok(SearchMode::HybridAdhocBf)
    } else {
        Err(ParamError::InvalidPolicyNotExist(value.to_string()))
    }
}

/// Parse a strictly positive integer that fits in a signed 64-bit value.
fn parse_positive_int(name: &str, value: &str) -> Result<usize, ParamError> {
    let bad = || ParamError::BadValue {
        name: name.to_string(),
        value: value.to_string(),
    };
    let parsed: i64 = value.parse().map_err(|_| bad())?;
    if parsed <= 0 {
        return Err(bad());
    }
    usize::try_from(parsed).map_err(|_| bad())
}

fn parse_positive_float(name: &str, value: &str) -> Result<f64, ParamError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(ParamError::BadValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}
