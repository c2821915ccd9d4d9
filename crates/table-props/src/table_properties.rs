//! Table-level properties built on [`AttributeCommand`].

use serde::{Deserialize, Serialize};

use crate::codec::{BoxSidesCodec, DefaultUnitCodec, IdentityCodec};
use crate::command::{AttributeCommand, AttributeCommandError, ExecuteOptions};
use crate::core::Editor;
use crate::plugin::{CommandError, CommandSpec, PlatePlugin, QueryError, QuerySpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablePropertiesConfig {
    pub default_unit: String,
}

impl Default for TablePropertiesConfig {
    fn default() -> Self {
        Self {
            default_unit: "px".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableProperty {
    BorderStyle,
    BorderColor,
    BorderWidth,
    BackgroundColor,
    Width,
    Height,
    Alignment,
}

impl TableProperty {
    pub const ALL: [TableProperty; 7] = [
        TableProperty::BorderStyle,
        TableProperty::BorderColor,
        TableProperty::BorderWidth,
        TableProperty::BackgroundColor,
        TableProperty::Width,
        TableProperty::Height,
        TableProperty::Alignment,
    ];

    pub fn attribute_name(self) -> &'static str {
        match self {
            TableProperty::BorderStyle => "border_style",
            TableProperty::BorderColor => "border_color",
            TableProperty::BorderWidth => "border_width",
            TableProperty::BackgroundColor => "background_color",
            TableProperty::Width => "width",
            TableProperty::Height => "height",
            TableProperty::Alignment => "alignment",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TableProperty::BorderStyle => "Table border style",
            TableProperty::BorderColor => "Table border color",
            TableProperty::BorderWidth => "Table border width",
            TableProperty::BackgroundColor => "Table background color",
            TableProperty::Width => "Table width",
            TableProperty::Height => "Table height",
            TableProperty::Alignment => "Table alignment",
        }
    }

    pub fn command(self, config: &TablePropertiesConfig) -> AttributeCommand {
        let command = AttributeCommand::new(self.attribute_name());
        let unit = config.default_unit.as_str();
        match self {
            TableProperty::BorderStyle | TableProperty::BorderColor => {
                command.with_codec(BoxSidesCodec::new())
            }
            TableProperty::BorderWidth => command.with_codec(BoxSidesCodec::with_unit(unit)),
            TableProperty::Width | TableProperty::Height => {
                command.with_codec(DefaultUnitCodec::new(unit))
            }
            TableProperty::BackgroundColor | TableProperty::Alignment => {
                command.with_codec(IdentityCodec)
            }
        }
    }

    pub fn command_id(self) -> String {
        format!("table.set_{}", self.attribute_name())
    }

    pub fn query_id(self) -> String {
        format!("table.{}", self.attribute_name())
    }
}

#[derive(Debug, Clone)]
pub struct TablePropertyCommands {
    commands: Vec<(TableProperty, AttributeCommand)>,
}

impl TablePropertyCommands {
    pub fn new(config: &TablePropertiesConfig) -> Self {
        Self {
            commands: TableProperty::ALL
                .into_iter()
                .map(|property| (property, property.command(config)))
                .collect(),
        }
    }

    pub fn get(&self, property: TableProperty) -> &AttributeCommand {
        // Built from `TableProperty::ALL`, which follows declaration order.
        &self.commands[property as usize].1
    }

    pub fn iter(&self) -> impl Iterator<Item = (TableProperty, &AttributeCommand)> {
        self.commands.iter().map(|(p, command)| (*p, command))
    }

    pub fn refresh_all(&mut self, editor: &Editor) {
        for (_, command) in &mut self.commands {
            command.refresh(editor);
        }
    }

    pub fn execute(
        &self,
        property: TableProperty,
        editor: &mut Editor,
        options: ExecuteOptions,
    ) -> Result<(), AttributeCommandError> {
        self.get(property).execute(editor, options)
    }
}

impl Default for TablePropertyCommands {
    fn default() -> Self {
        Self::new(&TablePropertiesConfig::default())
    }
}

pub struct TablePropertiesPlugin {
    config: TablePropertiesConfig,
}

impl TablePropertiesPlugin {
    pub fn new(config: TablePropertiesConfig) -> Self {
        Self { config }
    }
}

impl PlatePlugin for TablePropertiesPlugin {
    fn id(&self) -> &'static str {
        "table.properties"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        TableProperty::ALL
            .into_iter()
            .map(|property| {
                let command = property.command(&self.config);
                CommandSpec::new(property.command_id(), property.label(), move |editor, args| {
                    let options: ExecuteOptions = args
                        .map(serde_json::from_value)
                        .transpose()
                        .map_err(|e| CommandError::new(format!("Invalid args: {e}")))?
                        .unwrap_or_default();
                    command
                        .execute(editor, options)
                        .map_err(|e| CommandError::new(e.to_string()))
                })
                .description(format!(
                    "Set or clear `{}` on the table around the selection.",
                    property.attribute_name()
                ))
                .keywords(["table", "properties", property.attribute_name()])
                .args_example(serde_json::json!({ "value": "100px" }))
            })
            .collect()
    }

    fn queries(&self) -> Vec<QuerySpec> {
        TableProperty::ALL
            .into_iter()
            .map(|property| {
                let command = property.command(&self.config);
                QuerySpec::new(property.query_id(), move |editor, _args| {
                    let mut command = command.clone();
                    command.refresh(editor);
                    serde_json::to_value(command.state())
                        .map_err(|e| QueryError::new(format!("Failed to encode state: {e}")))
                })
            })
            .collect()
    }
}
