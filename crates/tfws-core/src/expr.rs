//! Arena of named parameters and formulas.
//!
//! Every parameter and formula created while building a workspace lives in a
//! single [`Registry`] owned by the build. Formulas reference other nodes by
//! [`NodeId`], so a node stays reachable for as long as the registry does.
//!
//! # Example
//! ```
//! use tfws_core::{Expr, Formula, Parameter, Registry};
//!
//! let mut reg = Registry::new();
//! let theta = reg.add_parameter(Parameter::free("theta", "pull", 0.0, -4.0, 4.0)).unwrap();
//! let f = reg
//!     .add_formula(Formula::new("func_theta", "", Expr::pow(Expr::constant(1.1), Expr::node(theta))))
//!     .unwrap();
//! assert_eq!(reg.evaluate(f).unwrap(), 1.0);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Handle to a node in a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in its registry.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named scalar: free fit parameter or constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique name.
    pub name: String,
    /// Human-readable label.
    pub title: String,
    /// Current value.
    pub value: f64,
    /// Lower bound (`None` = unbounded).
    pub min: Option<f64>,
    /// Upper bound (`None` = unbounded).
    pub max: Option<f64>,
    /// Constant parameters never float.
    pub constant: bool,
}

impl Parameter {
    /// Free parameter with a range.
    pub fn free(
        name: impl Into<String>,
        title: impl Into<String>,
        value: f64,
        min: f64,
        max: f64,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            value,
            min: Some(min),
            max: Some(max),
            constant: false,
        }
    }

    /// Constant parameter.
    pub fn constant(name: impl Into<String>, title: impl Into<String>, value: f64) -> Self {
        Self { name: name.into(), title: title.into(), value, min: None, max: None, constant: true }
    }

    /// Drop the upper bound.
    pub fn remove_max(mut self) -> Self {
        self.max = None;
        self
    }
}

/// Expression tree evaluated by structural traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Literal value.
    Const(f64),
    /// Value of another node.
    Ref(NodeId),
    /// Sum of terms (empty sum = 0).
    Sum(Vec<Expr>),
    /// Product of factors (empty product = 1).
    Product(Vec<Expr>),
    /// `base ^ exponent`.
    Pow(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Literal.
    pub fn constant(v: f64) -> Self {
        Expr::Const(v)
    }

    /// Reference to a node.
    pub fn node(id: NodeId) -> Self {
        Expr::Ref(id)
    }

    /// Sum of terms.
    pub fn sum(terms: Vec<Expr>) -> Self {
        Expr::Sum(terms)
    }

    /// Product of factors.
    pub fn product(factors: Vec<Expr>) -> Self {
        Expr::Product(factors)
    }

    /// `base ^ exponent`.
    pub fn pow(base: Expr, exponent: Expr) -> Self {
        Expr::Pow(Box::new(base), Box::new(exponent))
    }

    /// Every node referenced by this expression, in traversal order.
    pub fn references(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs(&self, out: &mut Vec<NodeId>) {
        match self {
            Expr::Const(_) => {}
            Expr::Ref(id) => out.push(*id),
            Expr::Sum(xs) | Expr::Product(xs) => xs.iter().for_each(|x| x.collect_refs(out)),
            Expr::Pow(b, e) => {
                b.collect_refs(out);
                e.collect_refs(out);
            }
        }
    }

    fn remap(&self, map: &HashMap<NodeId, NodeId>) -> Result<Expr> {
        Ok(match self {
            Expr::Const(v) => Expr::Const(*v),
            Expr::Ref(id) => Expr::Ref(
                *map.get(id).ok_or_else(|| Error::UnknownNode(format!("#{}", id.0)))?,
            ),
            Expr::Sum(xs) => Expr::Sum(xs.iter().map(|x| x.remap(map)).collect::<Result<_>>()?),
            Expr::Product(xs) => {
                Expr::Product(xs.iter().map(|x| x.remap(map)).collect::<Result<_>>()?)
            }
            Expr::Pow(b, e) => Expr::pow(b.remap(map)?, e.remap(map)?),
        })
    }
}

/// A named expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    /// Unique name.
    pub name: String,
    /// Human-readable label.
    pub title: String,
    /// Expression.
    pub expr: Expr,
}

impl Formula {
    /// Create a formula.
    pub fn new(name: impl Into<String>, title: impl Into<String>, expr: Expr) -> Self {
        Self { name: name.into(), title: title.into(), expr }
    }
}

/// Registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Scalar parameter.
    Parameter(Parameter),
    /// Derived expression.
    Formula(Formula),
}

impl Node {
    /// Node name.
    pub fn name(&self) -> &str {
        match self {
            Node::Parameter(p) => &p.name,
            Node::Formula(f) => &f.name,
        }
    }

    fn references(&self) -> Vec<NodeId> {
        match self {
            Node::Parameter(_) => Vec::new(),
            Node::Formula(f) => f.expr.references(),
        }
    }
}

/// Arena of parameters and formulas with a name index.
///
/// Formulas may only reference nodes that already exist, so the arena is a
/// DAG in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegistryRepr", into = "RegistryRepr")]
pub struct Registry {
    nodes: Vec<Node>,
    by_name: HashMap<String, NodeId>,
}

#[derive(Serialize, Deserialize)]
struct RegistryRepr {
    nodes: Vec<Node>,
}

impl TryFrom<RegistryRepr> for Registry {
    type Error = Error;

    fn try_from(repr: RegistryRepr) -> Result<Self> {
        let mut reg = Registry::new();
        for node in repr.nodes {
            let name = node.name().to_string();
            let expected = reg.len();
            if reg.insert(node)?.0 != expected {
                return Err(Error::Conflict(name));
            }
        }
        Ok(reg)
    }
}

impl From<Registry> for RegistryRepr {
    fn from(reg: Registry) -> Self {
        RegistryRepr { nodes: reg.nodes }
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Register a parameter.
    ///
    /// Re-registering an identical parameter returns the existing handle.
    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<NodeId> {
        self.insert(Node::Parameter(parameter))
    }

    /// Register a formula. All references must already exist.
    pub fn add_formula(&mut self, formula: Formula) -> Result<NodeId> {
        self.insert(Node::Formula(formula))
    }

    fn insert(&mut self, node: Node) -> Result<NodeId> {
        if let Some(bad) = node.references().into_iter().find(|id| id.0 >= self.nodes.len()) {
            return Err(Error::Validation(format!(
                "formula '{}' references unknown node #{}",
                node.name(),
                bad.0
            )));
        }
        if let Some(&existing) = self.by_name.get(node.name()) {
            if self.nodes[existing.0] == node {
                return Ok(existing);
            }
            return Err(Error::Conflict(node.name().to_string()));
        }
        let id = NodeId(self.nodes.len());
        self.by_name.insert(node.name().to_string(), id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Look a node up by name.
    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Look a node up by name, failing with [`Error::UnknownNode`].
    pub fn require(&self, name: &str) -> Result<NodeId> {
        self.id(name).ok_or_else(|| Error::UnknownNode(name.to_string()))
    }

    /// Node by handle.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Node name by handle.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.get(id).map(Node::name)
    }

    /// Iterate over all parameters.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Parameter(p) => Some(p),
            Node::Formula(_) => None,
        })
    }

    /// Current value of a node.
    pub fn evaluate(&self, id: NodeId) -> Result<f64> {
        match self.get(id).ok_or_else(|| Error::UnknownNode(format!("#{}", id.0)))? {
            Node::Parameter(p) => Ok(p.value),
            Node::Formula(f) => self.evaluate_expr(&f.expr),
        }
    }

    /// Evaluate a free-standing expression against the registry.
    pub fn evaluate_expr(&self, expr: &Expr) -> Result<f64> {
        Ok(match expr {
            Expr::Const(v) => *v,
            Expr::Ref(id) => self.evaluate(*id)?,
            Expr::Sum(xs) => {
                let mut acc = 0.0;
                for x in xs {
                    acc += self.evaluate_expr(x)?;
                }
                acc
            }
            Expr::Product(xs) => {
                let mut acc = 1.0;
                for x in xs {
                    acc *= self.evaluate_expr(x)?;
                }
                acc
            }
            Expr::Pow(b, e) => self.evaluate_expr(b)?.powf(self.evaluate_expr(e)?),
        })
    }

    /// Set the value of a free parameter.
    pub fn set_value(&mut self, id: NodeId, value: f64) -> Result<()> {
        match self.nodes.get_mut(id.0) {
            Some(Node::Parameter(p)) if !p.constant => {
                p.value = value;
                Ok(())
            }
            Some(Node::Parameter(p)) => {
                Err(Error::Validation(format!("parameter '{}' is constant", p.name)))
            }
            Some(Node::Formula(f)) => {
                Err(Error::Validation(format!("'{}' is a formula, not a parameter", f.name)))
            }
            None => Err(Error::UnknownNode(format!("#{}", id.0))),
        }
    }

    /// Set the value of a free parameter by name.
    pub fn set_named(&mut self, name: &str, value: f64) -> Result<()> {
        let id = self.require(name)?;
        self.set_value(id, value)
    }

    /// Copy `id` and everything it depends on from `src` into `self`.
    ///
    /// Nodes already present under the same name with identical content are
    /// reused; same name with different content is [`Error::Conflict`].
    pub fn import_from(&mut self, src: &Registry, id: NodeId) -> Result<NodeId> {
        let mut map = HashMap::new();
        self.import_node(src, id, &mut map)
    }

    /// Like [`Registry::import_from`] for several roots sharing one remap table.
    pub fn import_many(&mut self, src: &Registry, ids: &[NodeId]) -> Result<Vec<NodeId>> {
        let mut map = HashMap::new();
        ids.iter().map(|&id| self.import_node(src, id, &mut map)).collect()
    }

    fn import_node(
        &mut self,
        src: &Registry,
        id: NodeId,
        map: &mut HashMap<NodeId, NodeId>,
    ) -> Result<NodeId> {
        if let Some(&done) = map.get(&id) {
            return Ok(done);
        }
        let node = src.get(id).ok_or_else(|| Error::UnknownNode(format!("#{}", id.0)))?;
        let copied = match node {
            Node::Parameter(p) => Node::Parameter(p.clone()),
            Node::Formula(f) => {
                for dep in f.expr.references() {
                    self.import_node(src, dep, map)?;
                }
                Node::Formula(Formula::new(&f.name, &f.title, f.expr.remap(map)?))
            }
        };
        let new_id = self.insert(copied)?;
        map.insert(id, new_id);
        Ok(new_id)
    }
}
