use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::ancestor::find_ancestor;
use crate::codec::{AttributeCodec, IdentityCodec, is_truthy};
use crate::core::{ApplyError, Editor};
use crate::ops::{Batch, Path};

pub const TABLE_KIND: &str = "table";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<Batch>,
}

impl ExecuteOptions {
    pub fn set(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            batch: None,
        }
    }

    pub fn remove() -> Self {
        Self::default()
    }

    pub fn in_batch(mut self, batch: Batch) -> Self {
        self.batch = Some(batch);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandState {
    pub is_enabled: bool,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Error)]
pub enum AttributeCommandError {
    #[error("selection is not inside a `{kind}` element")]
    NoAncestor { kind: String },
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

// Holds no path between calls; refresh and execute both resolve the element again.
#[derive(Debug, Clone)]
pub struct AttributeCommand {
    attribute_name: String,
    element_kind: String,
    codec: Arc<dyn AttributeCodec>,
    state: CommandState,
}

impl AttributeCommand {
    pub fn new(attribute_name: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            element_kind: TABLE_KIND.to_string(),
            codec: Arc::new(IdentityCodec),
            state: CommandState::default(),
        }
    }

    pub fn with_codec(mut self, codec: impl AttributeCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn on_element(mut self, kind: impl Into<String>) -> Self {
        self.element_kind = kind.into();
        self
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    pub fn element_kind(&self) -> &str {
        &self.element_kind
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled
    }

    pub fn value(&self) -> Option<&Value> {
        self.state.value.as_ref()
    }

    pub fn state(&self) -> &CommandState {
        &self.state
    }

    pub fn refresh(&mut self, editor: &Editor) {
        let ancestor = find_ancestor(
            editor.doc(),
            &self.element_kind,
            Some(editor.selection().first_point()),
        );

        self.state = CommandState {
            is_enabled: ancestor.is_some(),
            value: ancestor.and_then(|a| self.codec.read(a.element.attr(&self.attribute_name))),
        };
        trace!(
            attribute = %self.attribute_name,
            enabled = self.state.is_enabled,
            value = ?self.state.value,
            "refreshed attribute command"
        );
    }

    pub fn execute(
        &self,
        editor: &mut Editor,
        options: ExecuteOptions,
    ) -> Result<(), AttributeCommandError> {
        let Some(path) = self.target_path(editor) else {
            warn!(
                attribute = %self.attribute_name,
                kind = %self.element_kind,
                "attribute command executed while disabled"
            );
            return Err(AttributeCommandError::NoAncestor {
                kind: self.element_kind.clone(),
            });
        };

        let value_to_set = self.codec.to_set(options.value).filter(is_truthy);
        debug!(
            attribute = %self.attribute_name,
            ?path,
            value = ?value_to_set,
            batch = ?options.batch,
            "executing attribute command"
        );

        let name = self.attribute_name.as_str();
        editor.change(options.batch, &self.source(), |writer| match value_to_set {
            Some(value) => writer.set_attribute(name, value, &path),
            None => writer.remove_attribute(name, &path),
        })?;
        Ok(())
    }

    fn target_path(&self, editor: &Editor) -> Option<Path> {
        find_ancestor(
            editor.doc(),
            &self.element_kind,
            Some(editor.selection().first_point()),
        )
        .map(|ancestor| ancestor.to_path())
    }

    fn source(&self) -> String {
        format!("command:{}.set_{}", self.element_kind, self.attribute_name)
    }
}
