use rdf_federation_model::{
    plan_err, same_source, Modifiers, PlanResult, PlanningError, Query, QueryUniverse,
    SourceRef, SparqlFilter, TripleSet, VariableSet,
};
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A shared reference to a [PlanNode].
pub type PlanNodeRef = Arc<PlanNode>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// A process-unique identifier of a [PlanNode].
///
/// Rewrites create new nodes with new identifiers. Therefore, the identifier of a node that
/// survives a rewrite proves that the node was not modified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value of the identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The operator of a [PlanNode].
#[derive(Clone, Debug)]
pub enum PlanNodeKind {
    /// A query that is sent to a single source.
    Query {
        /// The query.
        query: Query,
        /// The source that evaluates the query.
        source: SourceRef,
    },
    /// A query that has not been assigned to a source yet.
    UnassignedQuery {
        /// The query.
        query: Query,
    },
    /// The union of all children.
    Union,
    /// The join of all children in an order that is yet to be decided.
    Conjunction,
    /// A binary join. If the right child is optional, this is a left join.
    Join,
    /// The cartesian product of all children. The children share no variables.
    CartesianProduct,
    /// Applies modifiers to its only child.
    Pipe,
    /// A node without solutions.
    Empty {
        /// The universe of the node.
        universe: QueryUniverse,
        /// The triples that this node stands in for.
        matched_triples: TripleSet,
        /// The variables of the node.
        variables: VariableSet,
    },
}

impl PlanNodeKind {
    /// Returns the name of the operator.
    pub fn name(&self) -> &'static str {
        match self {
            PlanNodeKind::Query { .. } | PlanNodeKind::UnassignedQuery { .. } => "Query",
            PlanNodeKind::Union => "Union",
            PlanNodeKind::Conjunction => "Conjunction",
            PlanNodeKind::Join => "Join",
            PlanNodeKind::CartesianProduct => "CartesianProduct",
            PlanNodeKind::Pipe => "Pipe",
            PlanNodeKind::Empty { .. } => "Empty",
        }
    }

    fn is_leaf(&self) -> bool {
        matches!(
            self,
            PlanNodeKind::Query { .. }
                | PlanNodeKind::UnassignedQuery { .. }
                | PlanNodeKind::Empty { .. }
        )
    }

    fn same_operator(&self, other: &PlanNodeKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// A node of a federated query plan.
///
/// Nodes are immutable and shared through [PlanNodeRef]. Every rewrite creates new nodes, while
/// unchanged subtrees are shared between the input and the output of a rewrite.
///
/// The modifiers of a query leaf are the modifiers of its [Query]. Inner nodes carry their own
/// modifiers, which are applied to the combined solutions of their children.
pub struct PlanNode {
    id: NodeId,
    kind: PlanNodeKind,
    children: Vec<PlanNodeRef>,
    modifiers: Modifiers,
    views: NodeViews,
}

/// Derived sets of a [PlanNode], computed on construction.
struct NodeViews {
    matched_triples: TripleSet,
    all_variables: VariableSet,
    result_variables: VariableSet,
    public_variables: VariableSet,
    bound_variables: VariableSet,
    input_variables: VariableSet,
}

impl PlanNode {
    /// Creates a query leaf that is evaluated by `source`.
    pub fn query(query: Query, source: SourceRef) -> PlanResult<PlanNodeRef> {
        Self::try_new(
            PlanNodeKind::Query { query, source },
            Vec::new(),
            Modifiers::default(),
        )
    }

    /// Creates a query leaf that is not assigned to a source.
    pub fn unassigned(query: Query) -> PlanResult<PlanNodeRef> {
        Self::try_new(
            PlanNodeKind::UnassignedQuery { query },
            Vec::new(),
            Modifiers::default(),
        )
    }

    /// Creates a union of `children`.
    pub fn union(children: Vec<PlanNodeRef>) -> PlanResult<PlanNodeRef> {
        Self::try_new(PlanNodeKind::Union, children, Modifiers::default())
    }

    /// Creates a conjunction of `children`.
    pub fn conjunction(children: Vec<PlanNodeRef>) -> PlanResult<PlanNodeRef> {
        Self::try_new(PlanNodeKind::Conjunction, children, Modifiers::default())
    }

    /// Creates a cartesian product of `children`.
    pub fn cartesian_product(children: Vec<PlanNodeRef>) -> PlanResult<PlanNodeRef> {
        Self::try_new(PlanNodeKind::CartesianProduct, children, Modifiers::default())
    }

    /// Creates a join of `lhs` and `rhs`.
    pub fn join(lhs: PlanNodeRef, rhs: PlanNodeRef) -> PlanResult<PlanNodeRef> {
        Self::try_new(PlanNodeKind::Join, vec![lhs, rhs], Modifiers::default())
    }

    /// Creates a pipe that applies `modifiers` to `child`.
    pub fn pipe(child: PlanNodeRef, modifiers: Modifiers) -> PlanResult<PlanNodeRef> {
        Self::try_new(PlanNodeKind::Pipe, vec![child], modifiers)
    }

    /// Creates an empty node.
    pub fn empty(
        universe: QueryUniverse,
        matched_triples: TripleSet,
        variables: VariableSet,
    ) -> PlanResult<PlanNodeRef> {
        Self::try_new(
            PlanNodeKind::Empty {
                universe,
                matched_triples,
                variables,
            },
            Vec::new(),
            Modifiers::default(),
        )
    }

    /// Creates a new node.
    ///
    /// # Errors
    ///
    /// Fails if the number of children does not fit `kind` or if the children do not share a
    /// universe.
    pub fn try_new(
        kind: PlanNodeKind,
        children: Vec<PlanNodeRef>,
        modifiers: Modifiers,
    ) -> PlanResult<PlanNodeRef> {
        validate_arity(&kind, &children)?;

        let (kind, modifiers) = match kind {
            PlanNodeKind::Query { query, source } if !modifiers.is_empty() => (
                PlanNodeKind::Query {
                    query: query.with_modifiers(modifiers),
                    source,
                },
                Modifiers::default(),
            ),
            PlanNodeKind::UnassignedQuery { query } if !modifiers.is_empty() => (
                PlanNodeKind::UnassignedQuery {
                    query: query.with_modifiers(modifiers),
                },
                Modifiers::default(),
            ),
            PlanNodeKind::Empty { .. } => (kind, Modifiers::default()),
            kind => (kind, modifiers),
        };

        if let Some(first) = children.first() {
            let universe = first.universe();
            if children.iter().any(|c| !c.universe().is_same(universe)) {
                return Err(PlanningError::UniverseMismatch(format!(
                    "Children of a {} node must share a universe",
                    kind.name()
                )));
            }
        }

        let views = NodeViews::compute(&kind, &children, &modifiers)?;
        Ok(Arc::new(Self {
            id: NodeId::next(),
            kind,
            children,
            modifiers,
            views,
        }))
    }

    /// Returns the identifier of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the operator of this node.
    pub fn kind(&self) -> &PlanNodeKind {
        &self.kind
    }

    /// Returns the children of this node.
    pub fn children(&self) -> &[PlanNodeRef] {
        &self.children
    }

    /// Returns the modifiers of this node.
    pub fn modifiers(&self) -> &Modifiers {
        match &self.kind {
            PlanNodeKind::Query { query, .. } | PlanNodeKind::UnassignedQuery { query } => {
                query.modifiers()
            }
            _ => &self.modifiers,
        }
    }

    /// Returns the universe of this node.
    pub fn universe(&self) -> &QueryUniverse {
        match &self.kind {
            PlanNodeKind::Query { query, .. } | PlanNodeKind::UnassignedQuery { query } => {
                query.universe()
            }
            PlanNodeKind::Empty { universe, .. } => universe,
            _ => self.children[0].universe(),
        }
    }

    /// Returns the query of a query leaf.
    pub fn as_query(&self) -> Option<&Query> {
        match &self.kind {
            PlanNodeKind::Query { query, .. } | PlanNodeKind::UnassignedQuery { query } => {
                Some(query)
            }
            _ => None,
        }
    }

    /// Returns the query and the source of a query leaf that is assigned to a source.
    pub fn as_bound_query(&self) -> Option<(&Query, &SourceRef)> {
        match &self.kind {
            PlanNodeKind::Query { query, source } => Some((query, source)),
            _ => None,
        }
    }

    /// Returns whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }

    /// Returns whether this node is an [PlanNodeKind::Empty] node.
    pub fn is_empty_node(&self) -> bool {
        matches!(self.kind, PlanNodeKind::Empty { .. })
    }

    /// Returns whether this node is the optional side of a left join.
    pub fn is_optional(&self) -> bool {
        self.modifiers().is_optional()
    }

    /// Returns whether `self` and `other` have the same operator.
    pub fn same_kind(&self, other: &PlanNode) -> bool {
        self.kind.same_operator(&other.kind)
    }

    /// Returns the triples of the root query that this subtree answers.
    pub fn matched_triples(&self) -> &TripleSet {
        &self.views.matched_triples
    }

    /// Returns every variable mentioned in this subtree, including modifiers.
    pub fn all_variables(&self) -> &VariableSet {
        &self.views.all_variables
    }

    /// Returns the variables of the solutions before the modifiers of this node are applied.
    pub fn result_variables(&self) -> &VariableSet {
        &self.views.result_variables
    }

    /// Returns the variables that are visible to the parent of this node.
    pub fn public_variables(&self) -> &VariableSet {
        &self.views.public_variables
    }

    /// Returns the public variables that are bound in every solution of this node.
    pub fn bound_variables(&self) -> &VariableSet {
        &self.views.bound_variables
    }

    /// Returns the variables that must be bound by a sibling before this node can be evaluated.
    pub fn input_variables(&self) -> &VariableSet {
        &self.views.input_variables
    }

    /// Creates a copy of this node with other children.
    pub fn with_children(&self, children: Vec<PlanNodeRef>) -> PlanResult<PlanNodeRef> {
        Self::try_new(self.kind.clone(), children, self.modifiers.clone())
    }

    /// Creates a copy of this node with other modifiers.
    pub fn with_modifiers(&self, modifiers: Modifiers) -> PlanResult<PlanNodeRef> {
        match &self.kind {
            PlanNodeKind::Query { query, source } => Self::query(
                query.with_modifiers(modifiers),
                Arc::clone(source),
            ),
            PlanNodeKind::UnassignedQuery { query } => {
                Self::unassigned(query.with_modifiers(modifiers))
            }
            kind => Self::try_new(kind.clone(), self.children.clone(), modifiers),
        }
    }

    /// Creates a copy of this node with an additional filter.
    pub fn with_added_filter(&self, filter: SparqlFilter) -> PlanResult<PlanNodeRef> {
        let mut modifiers = self.modifiers().clone();
        modifiers.add_filter(filter);
        self.with_modifiers(modifiers)
    }

    /// Creates a copy of a query leaf with another query. Fails for other nodes.
    pub fn with_query(&self, query: Query) -> PlanResult<PlanNodeRef> {
        match &self.kind {
            PlanNodeKind::Query { source, .. } => Self::query(query, Arc::clone(source)),
            PlanNodeKind::UnassignedQuery { .. } => Self::unassigned(query),
            kind => plan_err!("A {} node has no query", kind.name()),
        }
    }

    /// Returns the number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}

fn validate_arity(kind: &PlanNodeKind, children: &[PlanNodeRef]) -> PlanResult<()> {
    let valid = match kind {
        PlanNodeKind::Query { .. }
        | PlanNodeKind::UnassignedQuery { .. }
        | PlanNodeKind::Empty { .. } => children.is_empty(),
        PlanNodeKind::Union | PlanNodeKind::Conjunction | PlanNodeKind::CartesianProduct => {
            !children.is_empty()
        }
        PlanNodeKind::Join => children.len() == 2,
        PlanNodeKind::Pipe => children.len() == 1,
    };
    if !valid {
        plan_err!(
            "A {} node cannot have {} children",
            kind.name(),
            children.len()
        );
    }
    Ok(())
}

impl NodeViews {
    fn compute(
        kind: &PlanNodeKind,
        children: &[PlanNodeRef],
        modifiers: &Modifiers,
    ) -> PlanResult<Self> {
        match kind {
            PlanNodeKind::Query { query, .. } | PlanNodeKind::UnassignedQuery { query } => {
                Self::for_query(query)
            }
            PlanNodeKind::Empty {
                universe,
                matched_triples,
                variables,
            } => Ok(Self {
                matched_triples: matched_triples.clone(),
                all_variables: variables.clone(),
                result_variables: variables.clone(),
                public_variables: variables.clone(),
                bound_variables: variables.clone(),
                input_variables: universe.empty_variables(),
            }),
            _ => Self::for_inner(kind, children, modifiers),
        }
    }

    fn for_query(query: &Query) -> PlanResult<Self> {
        let universe = query.universe();
        let mut all_variables = universe.variables_matching(
            query
                .local_variables()
                .into_iter()
                .chain(query.modifiers().variables()),
        );
        all_variables.union_with(query.variables())?;
        let result_variables = query.variables().clone();
        let public_variables = public_variables(universe, &result_variables, query.modifiers())?;

        Ok(Self {
            matched_triples: query.matched_triples().clone(),
            all_variables,
            bound_variables: public_variables.clone(),
            public_variables,
            result_variables,
            input_variables: query.input_variables(),
        })
    }

    fn for_inner(
        kind: &PlanNodeKind,
        children: &[PlanNodeRef],
        modifiers: &Modifiers,
    ) -> PlanResult<Self> {
        let universe = children[0].universe();

        let mut matched_triples = universe.empty_triples();
        let mut all_variables = universe.variables_matching(modifiers.variables());
        let mut result_variables = universe.empty_variables();
        for child in children {
            matched_triples.union_with(child.matched_triples())?;
            all_variables.union_with(child.all_variables())?;
            result_variables.union_with(child.public_variables())?;
        }
        let public_variables = public_variables(universe, &result_variables, modifiers)?;

        let mut bound_variables = match kind {
            PlanNodeKind::Union => {
                let mut bound = children[0].bound_variables().clone();
                for child in &children[1..] {
                    bound.intersect_with(child.bound_variables())?;
                }
                bound
            }
            _ => {
                let mut bound = universe.empty_variables();
                for child in children.iter().filter(|c| !c.is_optional()) {
                    bound.union_with(child.bound_variables())?;
                }
                bound
            }
        };
        bound_variables.intersect_with(&public_variables)?;

        let mut input_variables = universe.empty_variables();
        match kind {
            PlanNodeKind::Union | PlanNodeKind::Pipe => {
                for child in children {
                    input_variables.union_with(child.input_variables())?;
                }
            }
            _ => {
                for (i, child) in children.iter().enumerate() {
                    let mut missing = child.input_variables().clone();
                    for (j, sibling) in children.iter().enumerate() {
                        if i != j {
                            missing.subtract(sibling.public_variables())?;
                        }
                    }
                    input_variables.union_with(&missing)?;
                }
            }
        }

        Ok(Self {
            matched_triples,
            all_variables,
            result_variables,
            public_variables,
            bound_variables,
            input_variables,
        })
    }
}

fn public_variables(
    universe: &QueryUniverse,
    result_variables: &VariableSet,
    modifiers: &Modifiers,
) -> PlanResult<VariableSet> {
    if modifiers.is_ask() {
        return Ok(universe.empty_variables());
    }
    match modifiers.projection() {
        None => Ok(result_variables.clone()),
        Some(projection) => {
            result_variables.intersection(&universe.variables_matching(projection))
        }
    }
}

impl PartialEq for PlanNode {
    /// Compares the structure of two plans. Node identifiers are ignored.
    fn eq(&self, other: &Self) -> bool {
        let same_kind = match (&self.kind, &other.kind) {
            (
                PlanNodeKind::Query { query, source },
                PlanNodeKind::Query {
                    query: other_query,
                    source: other_source,
                },
            ) => query == other_query && same_source(source.as_ref(), other_source.as_ref()),
            (
                PlanNodeKind::UnassignedQuery { query },
                PlanNodeKind::UnassignedQuery { query: other_query },
            ) => query == other_query,
            (
                PlanNodeKind::Empty {
                    matched_triples,
                    variables,
                    ..
                },
                PlanNodeKind::Empty {
                    matched_triples: other_triples,
                    variables: other_variables,
                    ..
                },
            ) => matched_triples == other_triples && variables == other_variables,
            (lhs, rhs) => lhs.same_operator(rhs),
        };

        same_kind && self.modifiers() == other.modifiers() && self.children == other.children
    }
}

impl Eq for PlanNode {}

impl Debug for PlanNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("modifiers", &self.modifiers)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}
