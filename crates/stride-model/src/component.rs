//! Diagram components and the component graph
//!
//! A [`Component`] is one box in the uploaded architecture diagram. The
//! [`ComponentGraph`] records which components talk to each other, and an
//! [`Extraction`] is the full document produced for one analysis.

use crate::ids::{AnalysisId, ComponentId};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tag used when the model gives no usable type
pub const DEFAULT_COMPONENT_TYPE: &str = "default";

/// Label used when the model gives no usable label
pub const UNNAMED_LABEL: &str = "Unnamed";

/// Normalize a raw component type into a lowercase, underscore-separated tag
///
/// `"Web Server"` and `"web-server"` both become `"web_server"`. Blank input
/// becomes [`DEFAULT_COMPONENT_TYPE`].
#[must_use]
pub fn normalize_type(raw: &str) -> String {
    let normalized = raw
        .trim()
        .to_lowercase()
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    if normalized.is_empty() {
        DEFAULT_COMPONENT_TYPE.to_string()
    } else {
        normalized
    }
}

/// Pixel rectangle `[x, y, w, h]`; `[0, 0, 0, 0]` when unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundingBox(pub [i64; 4]);

impl BoundingBox {
    /// Unknown position
    pub const UNKNOWN: Self = Self([0, 0, 0, 0]);

    /// Create from coordinates
    #[inline]
    #[must_use]
    pub fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self([x, y, w, h])
    }

    /// Whether the position is unknown
    #[inline]
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }

    /// Read a bbox from untrusted model output
    ///
    /// Accepts an array of exactly four numbers (floats are rounded). Anything
    /// else yields [`BoundingBox::UNKNOWN`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_json(value: Option<&Value>) -> Self {
        let Some(Value::Array(items)) = value else {
            return Self::UNKNOWN;
        };
        if items.len() != 4 {
            return Self::UNKNOWN;
        }

        let mut coords = [0_i64; 4];
        for (slot, item) in coords.iter_mut().zip(items) {
            match item.as_f64() {
                Some(n) if n.is_finite() => *slot = n.round() as i64,
                _ => return Self::UNKNOWN,
            }
        }
        Self(coords)
    }
}

/// A single node of the extracted architecture diagram
///
/// Immutable once built by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    id: ComponentId,
    label: String,
    #[serde(rename = "type")]
    component_type: String,
    #[serde(default)]
    bbox: BoundingBox,
}

impl Component {
    /// Create a component; the type is normalized and a blank label replaced
    #[must_use]
    pub fn new(
        id: ComponentId,
        label: impl Into<String>,
        component_type: &str,
        bbox: BoundingBox,
    ) -> Self {
        let label = label.into();
        let label = if label.trim().is_empty() {
            UNNAMED_LABEL.to_string()
        } else {
            label.trim().to_string()
        };

        Self {
            id,
            label,
            component_type: normalize_type(component_type),
            bbox,
        }
    }

    /// Component id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Normalized type tag
    #[inline]
    #[must_use]
    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    /// Position in the source image
    #[inline]
    #[must_use]
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Same component under a different id
    #[must_use]
    pub fn with_id(mut self, id: ComponentId) -> Self {
        self.id = id;
        self
    }
}

/// Node/edge view of the diagram
///
/// Edge direction is caller-defined and duplicate edges are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComponentGraph {
    /// Node ids
    #[serde(default)]
    pub nodes: Vec<ComponentId>,
    /// Ordered `(from, to)` pairs
    #[serde(default)]
    pub edges: Vec<(ComponentId, ComponentId)>,
}

impl ComponentGraph {
    /// Create empty graph
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is a node
    #[must_use]
    pub fn contains_node(&self, id: &ComponentId) -> bool {
        self.nodes.iter().any(|n| n == id)
    }

    /// Add every id in `ids` that is not already a node, and drop duplicate nodes
    ///
    /// Existing order is preserved; new ids are appended.
    pub fn ensure_nodes<'a>(&mut self, ids: impl IntoIterator<Item = &'a ComponentId>) {
        let mut seen: IndexSet<ComponentId> = self.nodes.drain(..).collect();
        for id in ids {
            if !seen.contains(id) {
                seen.insert(id.clone());
            }
        }
        self.nodes = seen.into_iter().collect();
    }

    /// Remove edges with an endpoint that is not a node; returns the removed edges
    pub fn retain_valid_edges(&mut self) -> Vec<(ComponentId, ComponentId)> {
        let nodes: IndexSet<&ComponentId> = self.nodes.iter().collect();
        let (valid, dangling): (Vec<_>, Vec<_>) = self
            .edges
            .drain(..)
            .partition(|(from, to)| nodes.contains(from) && nodes.contains(to));
        self.edges = valid;
        dangling
    }

    /// Whether the graph has neither nodes nor edges
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Extraction document for one analysis
///
/// Serialized shape:
/// `{components, graph, analysis_id, image_url, error?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// Components in discovery order
    pub components: Vec<Component>,
    /// Node/edge graph
    pub graph: ComponentGraph,
    /// Owning analysis
    pub analysis_id: AnalysisId,
    /// Public reference to the source image
    pub image_url: String,
    /// Set when extraction degraded to an empty result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Extraction {
    /// Create extraction from normalized parts
    #[must_use]
    pub fn new(
        analysis_id: AnalysisId,
        image_url: impl Into<String>,
        components: Vec<Component>,
        graph: ComponentGraph,
    ) -> Self {
        Self {
            components,
            graph,
            analysis_id,
            image_url: image_url.into(),
            error: None,
        }
    }

    /// Empty extraction annotated with an error
    #[must_use]
    pub fn degraded(
        analysis_id: AnalysisId,
        image_url: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            components: Vec::new(),
            graph: ComponentGraph::new(),
            analysis_id,
            image_url: image_url.into(),
            error: Some(error.into()),
        }
    }

    /// Whether extraction failed and this is a placeholder
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Find component by id
    #[must_use]
    pub fn component(&self, id: &ComponentId) -> Option<&Component> {
        self.components.iter().find(|c| c.id() == id)
    }

    /// Number of components
    #[inline]
    #[must_use]
    pub fn components_count(&self) -> usize {
        self.components.len()
    }

    /// Components grouped by normalized type, in first-seen order
    #[must_use]
    pub fn components_by_type(&self) -> IndexMap<&str, Vec<&Component>> {
        let mut groups: IndexMap<&str, Vec<&Component>> = IndexMap::new();
        for component in &self.components {
            groups
                .entry(component.component_type())
                .or_default()
                .push(component);
        }
        groups
    }
}
