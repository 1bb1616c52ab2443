//! Advanced filter expressions: the nested tree form the engine consumes and
//! the flat statement list an editor works with, plus the conversions between
//! them.
//!
//! The linear form loses nesting deeper than two levels. Converting a deep
//! tree to statements and back produces an equivalent-looking but
//! re-associated tree (a flat OR of AND chunks). Callers that round-trip
//! through the linear form get that normalized shape, not the original.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Copy, Serialize, Deserialize)]
pub enum FilterOperator {
    Contains,
    NotContains,
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "!contains",
            FilterOperator::Equals => "=",
            FilterOperator::NotEquals => "!=",
            FilterOperator::StartsWith => "starts with",
            FilterOperator::EndsWith => "ends with",
            FilterOperator::GreaterThan => ">",
            FilterOperator::LessThan => "<",
            FilterOperator::IsNull => "is null",
            FilterOperator::IsNotNull => "is not null",
        }
    }

    /// Whether the operator compares against a value. Null checks do not.
    pub fn needs_value(&self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }

    pub fn iterator() -> impl Iterator<Item = FilterOperator> {
        [
            FilterOperator::Contains,
            FilterOperator::NotContains,
            FilterOperator::Equals,
            FilterOperator::NotEquals,
            FilterOperator::StartsWith,
            FilterOperator::EndsWith,
            FilterOperator::GreaterThan,
            FilterOperator::LessThan,
            FilterOperator::IsNull,
            FilterOperator::IsNotNull,
        ]
        .iter()
        .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Copy, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }

    pub fn iterator() -> impl Iterator<Item = LogicalOperator> {
        [LogicalOperator::And, LogicalOperator::Or].iter().copied()
    }
}

/// A single column test. `value` is absent for null checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A boolean combination of child nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub logic: LogicalOperator,
    pub conditions: Vec<FilterNode>,
}

/// The tree form the engine consumes. Serializes untagged: a group is the
/// record with `logic`/`conditions`, a condition the record with
/// `column`/`operator`. Group must stay first so records carrying `logic`
/// deserialize as groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Group(FilterGroup),
    Condition(FilterCondition),
}

/// One row of the flat editor form. `logical_op` joins the statement to the
/// PREVIOUS statement; it is meaningless on the first statement and ignored
/// there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStatement {
    pub column: String,
    pub operator: FilterOperator,
    pub value: String,
    pub logical_op: LogicalOperator,
}

/// Flatten a filter tree into the linear statement list.
///
/// Within a group, the first child keeps the join that connected the group to
/// its preceding sibling; the rest join with the group's own logic. The root
/// node's own join defaults to AND and is ignored by consumers.
pub fn tree_to_linear(node: &FilterNode) -> Vec<FilterStatement> {
    let mut out = Vec::new();
    flatten(node, LogicalOperator::And, &mut out);
    out
}

fn flatten(node: &FilterNode, inherited: LogicalOperator, out: &mut Vec<FilterStatement>) {
    match node {
        FilterNode::Group(group) => {
            for (idx, child) in group.conditions.iter().enumerate() {
                let join = if idx == 0 { inherited } else { group.logic };
                flatten(child, join, out);
            }
        }
        FilterNode::Condition(cond) => {
            out.push(FilterStatement {
                column: cond.column.clone(),
                operator: cond.operator,
                value: cond.value.clone().unwrap_or_default(),
                logical_op: inherited,
            });
        }
    }
}

/// Rebuild a tree from the linear statement list.
///
/// Statements are split into chunks at each OR join; chunks of two or more
/// become AND groups, and multiple chunks are wrapped in a root OR group. A
/// single statement comes back as a bare condition. Empty input yields `None`.
/// Columns and values are passed through untouched.
pub fn linear_to_tree(statements: &[FilterStatement]) -> Option<FilterNode> {
    if statements.is_empty() {
        return None;
    }

    let mut chunks: Vec<Vec<&FilterStatement>> = Vec::new();
    let mut current: Vec<&FilterStatement> = Vec::new();
    for (idx, statement) in statements.iter().enumerate() {
        if idx > 0 && statement.logical_op == LogicalOperator::Or {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(statement);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    let mut chunk_nodes: Vec<FilterNode> = chunks
        .into_iter()
        .map(|chunk| {
            if chunk.len() == 1 {
                FilterNode::Condition(to_condition(chunk[0]))
            } else {
                FilterNode::Group(FilterGroup {
                    logic: LogicalOperator::And,
                    conditions: chunk
                        .into_iter()
                        .map(|s| FilterNode::Condition(to_condition(s)))
                        .collect(),
                })
            }
        })
        .collect();

    if chunk_nodes.len() == 1 {
        chunk_nodes.pop()
    } else {
        Some(FilterNode::Group(FilterGroup {
            logic: LogicalOperator::Or,
            conditions: chunk_nodes,
        }))
    }
}

fn to_condition(statement: &FilterStatement) -> FilterCondition {
    let value = if statement.operator.needs_value() {
        Some(statement.value.clone())
    } else {
        None
    };
    FilterCondition {
        column: statement.column.clone(),
        operator: statement.operator,
        value,
    }
}
