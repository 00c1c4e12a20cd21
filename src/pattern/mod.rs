//! Pattern domain types.
//!
//! A pattern is a unit of learned, reusable knowledge with a confidence
//! score. Identity is content-addressed (see [`canonical`]): the same
//! knowledge learned by two independent instances produces the same id, so
//! cross-instance merges match on meaning rather than provenance.

pub mod canonical;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// Stable pattern identifier, derived from `(pattern_type, content)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(pub String);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enumerated pattern category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Workflow,
    TechStackPreference,
    ProblemSolution,
    ArchitectureDecision,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Workflow => "workflow",
            PatternType::TechStackPreference => "tech_stack_preference",
            PatternType::ProblemSolution => "problem_solution",
            PatternType::ArchitectureDecision => "architecture_decision",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "workflow" => Some(PatternType::Workflow),
            "tech_stack_preference" => Some(PatternType::TechStackPreference),
            "problem_solution" => Some(PatternType::ProblemSolution),
            "architecture_decision" => Some(PatternType::ArchitectureDecision),
            _ => None,
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a pattern originated: learned locally, or arrived via import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceScope {
    Local,
    Imported,
}

impl SourceScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceScope::Local => "local",
            SourceScope::Imported => "imported",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(SourceScope::Local),
            "imported" => Some(SourceScope::Imported),
            _ => None,
        }
    }
}

impl fmt::Display for SourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trust in a pattern's validity, always within [0.0, 1.0].
///
/// Out-of-range input is corrected by clamping at this boundary (with a
/// warning), never deep inside merge logic.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            warn!("confidence is NaN, clamping to 0.0");
            return Self(0.0);
        }
        if !(0.0..=1.0).contains(&value) {
            warn!("confidence {} out of range, clamping to [0.0, 1.0]", value);
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Reinforcement rule applied when the same id recurs locally:
    /// `combined = a + b - a*b`. Monotone, commutative, stays in [0, 1],
    /// never lowers an established confidence.
    pub fn reinforce(self, other: Confidence) -> Confidence {
        Confidence(self.0 + other.0 - self.0 * other.0)
    }

    pub fn max(self, other: Confidence) -> Confidence {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Ok(Confidence::new(value))
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// A recurring multi-step way of working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContent {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Forward-compatible bucket for fields this build does not model.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A preference for a technology in a given context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechStackContent {
    pub technology: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A problem paired with a solution that worked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemSolutionContent {
    pub problem: String,
    pub solution: String,
    #[serde(default)]
    pub caveats: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A recorded architecture decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureDecisionContent {
    pub decision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Typed pattern content, one variant per pattern type.
///
/// Each variant carries a fixed field schema plus an `extra` bucket for
/// unknown fields, so newer producers stay readable. Identity covers the
/// fixed fields only; `extra`, confidence, namespaces and timestamps never
/// feed the content hash.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternContent {
    Workflow(WorkflowContent),
    TechStackPreference(TechStackContent),
    ProblemSolution(ProblemSolutionContent),
    ArchitectureDecision(ArchitectureDecisionContent),
}

impl PatternContent {
    pub fn pattern_type(&self) -> PatternType {
        match self {
            PatternContent::Workflow(_) => PatternType::Workflow,
            PatternContent::TechStackPreference(_) => PatternType::TechStackPreference,
            PatternContent::ProblemSolution(_) => PatternType::ProblemSolution,
            PatternContent::ArchitectureDecision(_) => PatternType::ArchitectureDecision,
        }
    }

    /// The fields that participate in the content-addressed id.
    pub(crate) fn identity_value(&self) -> Value {
        match self {
            PatternContent::Workflow(w) => serde_json::json!({
                "name": w.name,
                "steps": w.steps,
                "trigger": w.trigger,
            }),
            PatternContent::TechStackPreference(t) => serde_json::json!({
                "technology": t.technology,
                "context": t.context,
                "rationale": t.rationale,
            }),
            PatternContent::ProblemSolution(p) => serde_json::json!({
                "problem": p.problem,
                "solution": p.solution,
                "caveats": p.caveats,
            }),
            PatternContent::ArchitectureDecision(a) => serde_json::json!({
                "decision": a.decision,
                "rationale": a.rationale,
                "alternatives": a.alternatives,
            }),
        }
    }

    /// Serialize to the wire/storage `metadata` object.
    pub fn metadata_value(&self) -> Result<Value> {
        let value = match self {
            PatternContent::Workflow(w) => serde_json::to_value(w)?,
            PatternContent::TechStackPreference(t) => serde_json::to_value(t)?,
            PatternContent::ProblemSolution(p) => serde_json::to_value(p)?,
            PatternContent::ArchitectureDecision(a) => serde_json::to_value(a)?,
        };
        Ok(value)
    }

    /// Rebuild typed content from a `(pattern_type, metadata)` pair.
    pub fn from_parts(pattern_type: PatternType, metadata: Value) -> Result<Self> {
        let content = match pattern_type {
            PatternType::Workflow => PatternContent::Workflow(serde_json::from_value(metadata)?),
            PatternType::TechStackPreference => {
                PatternContent::TechStackPreference(serde_json::from_value(metadata)?)
            }
            PatternType::ProblemSolution => {
                PatternContent::ProblemSolution(serde_json::from_value(metadata)?)
            }
            PatternType::ArchitectureDecision => {
                PatternContent::ArchitectureDecision(serde_json::from_value(metadata)?)
            }
        };
        Ok(content)
    }

    pub fn extra(&self) -> &BTreeMap<String, Value> {
        match self {
            PatternContent::Workflow(w) => &w.extra,
            PatternContent::TechStackPreference(t) => &t.extra,
            PatternContent::ProblemSolution(p) => &p.extra,
            PatternContent::ArchitectureDecision(a) => &a.extra,
        }
    }

    fn extra_mut(&mut self) -> &mut BTreeMap<String, Value> {
        match self {
            PatternContent::Workflow(w) => &mut w.extra,
            PatternContent::TechStackPreference(t) => &mut t.extra,
            PatternContent::ProblemSolution(p) => &mut p.extra,
            PatternContent::ArchitectureDecision(a) => &mut a.extra,
        }
    }

    /// Merge the other side's extra keys that are absent here.
    /// Existing keys win. Returns whether anything was added.
    pub fn absorb_extra(&mut self, other: &PatternContent) -> bool {
        let missing: Vec<(String, Value)> = other
            .extra()
            .iter()
            .filter(|(k, _)| !self.extra().contains_key(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let added = !missing.is_empty();
        self.extra_mut().extend(missing);
        added
    }
}

/// The unit of learned knowledge.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: PatternId,
    pub content: PatternContent,
    pub confidence: Confidence,
    pub namespaces: BTreeSet<String>,
    pub source_scope: SourceScope,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    /// Create a locally-originated pattern. The id is derived from the
    /// content; at least one namespace is required.
    pub fn new<I, S>(content: PatternContent, confidence: f64, namespaces: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = canonical::pattern_id(&content);
        let namespaces: BTreeSet<String> = namespaces.into_iter().map(Into::into).collect();
        if namespaces.is_empty() {
            return Err(Error::EmptyNamespaces { id: id.to_string() });
        }

        let now = Utc::now();
        Ok(Self {
            id,
            content,
            confidence: Confidence::new(confidence),
            namespaces,
            source_scope: SourceScope::Local,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn pattern_type(&self) -> PatternType {
        self.content.pattern_type()
    }

    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }

    pub fn in_namespace_prefix(&self, prefix: &str) -> bool {
        self.namespaces.iter().any(|ns| ns.starts_with(prefix))
    }
}
