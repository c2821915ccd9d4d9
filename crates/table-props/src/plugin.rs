use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ancestor::find_ancestor;
use crate::command::TABLE_KIND;
use crate::core::{Document, ElementNode, Node, Point, Selection};
use crate::ops::{Op, Transaction};
use crate::table_properties::{TablePropertiesConfig, TablePropertiesPlugin};

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type CommandHandler =
    Arc<dyn Fn(&mut crate::core::Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>;

pub type QueryHandler =
    Arc<dyn Fn(&crate::core::Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut crate::core::Editor, Option<Value>) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: QueryHandler,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&crate::core::Editor, Option<Value>) -> Result<Value, QueryError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    BlockOnly,
    InlineOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: String,
    pub children: ChildConstraint,
}

impl NodeSpec {
    fn block(kind: &str, children: ChildConstraint) -> Self {
        Self {
            kind: kind.to_string(),
            children,
        }
    }
}

pub trait NormalizePass: Send + Sync {
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op>;
}

pub trait PlatePlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    node_specs: HashMap<String, NodeSpec>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn PlatePlugin>>) -> Result<Self, String> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    fn core_plugins() -> Vec<Box<dyn PlatePlugin>> {
        vec![Box::new(CoreParagraphPlugin), Box::new(CoreNormalizePlugin)]
    }

    pub fn core() -> Self {
        Self::from_builtin(Self::core_plugins())
    }

    pub fn tables() -> Self {
        Self::tables_with_config(TablePropertiesConfig::default())
    }

    pub fn tables_with_config(config: TablePropertiesConfig) -> Self {
        let mut plugins = Self::core_plugins();
        plugins.push(Box::new(TablePlugin));
        plugins.push(Box::new(TablePropertiesPlugin::new(config)));
        Self::from_builtin(plugins)
    }

    // Built-in plugin sets never collide, so registration cannot fail.
    fn from_builtin(plugins: Vec<Box<dyn PlatePlugin>>) -> Self {
        let mut registry = Self::default();
        for plugin in plugins {
            if let Err(err) = registry.register_plugin(plugin) {
                tracing::error!(%err, "built-in plugin rejected");
            }
        }
        registry
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn PlatePlugin>) -> Result<(), String> {
        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(&spec.kind) {
                return Err(format!("Duplicate node spec kind: {}", spec.kind));
            }
            self.node_specs.insert(spec.kind.clone(), spec);
        }

        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(format!("Duplicate command id: {}", cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(format!("Duplicate query id: {}", query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        tracing::debug!(plugin = plugin.id(), "registered plugin");
        Ok(())
    }

    pub fn node_specs(&self) -> &HashMap<String, NodeSpec> {
        &self.node_specs
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn normalize(&self, doc: &Document) -> Vec<Op> {
        let mut ops: Vec<Op> = Vec::new();
        for pass in &self.normalize_passes {
            ops.extend(pass.run(doc, self));
        }
        ops
    }

    pub fn is_known_kind(&self, kind: &str) -> bool {
        self.node_specs.contains_key(kind)
    }
}

struct CoreParagraphPlugin;

impl PlatePlugin for CoreParagraphPlugin {
    fn id(&self) -> &'static str {
        "core.paragraph"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec::block("paragraph", ChildConstraint::InlineOnly)]
    }
}

struct CoreNormalizePlugin;

impl PlatePlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(EnsureParagraphHasTextLeaf),
        ]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

struct EnsureParagraphHasTextLeaf;

impl NormalizePass for EnsureParagraphHasTextLeaf {
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        fn walk(
            children: &[Node],
            path: &mut Vec<usize>,
            registry: &PluginRegistry,
            ops: &mut Vec<Op>,
        ) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);

                let inline_only = registry
                    .node_specs
                    .get(&el.kind)
                    .is_some_and(|spec| spec.children == ChildConstraint::InlineOnly);

                if !inline_only {
                    walk(&el.children, path, registry, ops);
                } else if !el.children.iter().any(|n| matches!(n, Node::Text(_))) {
                    let mut insert_path = path.clone();
                    insert_path.push(0);
                    ops.push(Op::InsertNode {
                        path: insert_path,
                        node: Node::text(""),
                    });
                }

                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), registry, &mut ops);
        ops
    }
}

struct TablePlugin;

impl PlatePlugin for TablePlugin {
    fn id(&self) -> &'static str {
        "table"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![
            NodeSpec::block(TABLE_KIND, ChildConstraint::BlockOnly),
            NodeSpec::block("table_row", ChildConstraint::BlockOnly),
            NodeSpec::block("table_cell", ChildConstraint::BlockOnly),
        ]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeTableStructure)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("table.insert", "Insert table", |editor, args| {
                let dimension = |key: &str| {
                    args.as_ref()
                        .and_then(|v| v.get(key))
                        .and_then(|v| v.as_u64())
                        .unwrap_or(2)
                        .clamp(1, 32) as usize
                };
                let tx = insert_table(editor, dimension("rows"), dimension("cols"));
                editor
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to insert table: {e}")))
            })
            .description("Insert a table after the current block.")
            .keywords(["table", "grid"])
            .args_example(serde_json::json!({ "rows": 2, "cols": 3 })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("table.is_active", |editor, _args| {
            let first = editor.selection().first_point();
            let is_active = find_ancestor(editor.doc(), TABLE_KIND, Some(first)).is_some();
            Ok(Value::Bool(is_active))
        })]
    }
}

struct NormalizeTableStructure;

impl NormalizePass for NormalizeTableStructure {
    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        fn child_path(path: &[usize], tail: &[usize]) -> Vec<usize> {
            let mut out = path.to_vec();
            out.extend_from_slice(tail);
            out
        }

        fn normalize_table(table: &ElementNode, path: &[usize], ops: &mut Vec<Op>) {
            let rows: Vec<(usize, &ElementNode)> = table
                .children
                .iter()
                .enumerate()
                .filter_map(|(ix, node)| match node {
                    Node::Element(row) if row.kind == "table_row" => Some((ix, row)),
                    _ => None,
                })
                .collect();

            if table.children.is_empty() {
                ops.push(Op::InsertNode {
                    path: child_path(path, &[0]),
                    node: table_row_node(1),
                });
                return;
            }

            let max_cols = rows
                .iter()
                .map(|(_, row)| row.children.len())
                .max()
                .unwrap_or(0)
                .max(1);

            for (row_ix, row) in rows {
                for col_ix in row.children.len()..max_cols {
                    ops.push(Op::InsertNode {
                        path: child_path(path, &[row_ix, col_ix]),
                        node: table_cell_node(),
                    });
                }

                for (cell_ix, cell) in row.children.iter().enumerate() {
                    let Node::Element(cell) = cell else {
                        continue;
                    };
                    if cell.kind == "table_cell" && cell.children.is_empty() {
                        ops.push(Op::InsertNode {
                            path: child_path(path, &[row_ix, cell_ix, 0]),
                            node: Node::paragraph(""),
                        });
                    }
                }
            }
        }

        fn walk(nodes: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in nodes.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);

                if el.kind == TABLE_KIND {
                    normalize_table(el, path, ops);
                }

                walk(&el.children, path, ops);
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

pub fn table_cell_node() -> Node {
    ElementNode::new("table_cell", vec![Node::paragraph("")]).into()
}

pub fn table_row_node(cols: usize) -> Node {
    let cells = (0..cols.max(1)).map(|_| table_cell_node()).collect();
    ElementNode::new("table_row", cells).into()
}

pub fn table_node(rows: usize, cols: usize) -> Node {
    let rows = (0..rows.max(1)).map(|_| table_row_node(cols)).collect();
    ElementNode::new(TABLE_KIND, rows).into()
}

fn insert_table(editor: &crate::core::Editor, rows: usize, cols: usize) -> Transaction {
    let focus = &editor.selection().focus;
    let block_path = focus.path.split_last().map(|(_, p)| p).unwrap_or(&[]);

    let (parent_path, insert_at) = match block_path.split_last() {
        Some((block_ix, parent)) => (parent.to_vec(), block_ix + 1),
        None => (Vec::new(), editor.doc().children.len()),
    };

    let mut table_path = parent_path.clone();
    table_path.push(insert_at);
    let mut paragraph_path = parent_path;
    paragraph_path.push(insert_at + 1);

    let mut selection_path = table_path.clone();
    selection_path.extend([0, 0, 0, 0]);

    Transaction::new(vec![
        Op::InsertNode {
            path: table_path,
            node: table_node(rows, cols),
        },
        Op::InsertNode {
            path: paragraph_path,
            node: Node::paragraph(""),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(selection_path, 0)))
    .source("command:table.insert")
}
