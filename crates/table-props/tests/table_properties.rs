use plate_table_props::{
    CommandState, Document, Editor, ExecuteOptions, Node, PluginRegistry, Point, Selection,
    TablePropertiesConfig, TableProperty, TablePropertyCommands, table_node,
};
use serde_json::{Value, json};

fn editor_in_table(registry: PluginRegistry) -> Editor {
    let doc = Document {
        children: vec![Node::paragraph("intro"), table_node(2, 2)],
    };
    let selection = Selection::collapsed(Point::new(vec![1, 1, 0, 0, 0], 0));
    Editor::new(doc, selection, registry)
}

fn table_attr(editor: &Editor, name: &str) -> Option<Value> {
    editor.doc().element(&[1])?.attr(name).cloned()
}

#[test]
fn every_property_has_a_command_and_query() {
    let registry = PluginRegistry::tables();
    for property in TableProperty::ALL {
        assert!(
            registry.command(&property.command_id()).is_some(),
            "missing command for {property:?}"
        );
        assert!(
            registry.query(&property.query_id()).is_some(),
            "missing query for {property:?}"
        );
    }
}

#[test]
fn registry_command_sets_and_query_reports_state() {
    let mut editor = editor_in_table(PluginRegistry::tables());

    let state: CommandState = editor.run_query("table.width", None).unwrap();
    assert_eq!(
        state,
        CommandState {
            is_enabled: true,
            value: None
        }
    );

    editor
        .run_command("table.set_width", Some(json!({ "value": 320 })))
        .unwrap();
    assert_eq!(table_attr(&editor, "width"), Some(json!("320px")));

    let state: CommandState = editor.run_query("table.width", None).unwrap();
    assert_eq!(state.value, Some(json!("320px")));

    editor.run_command("table.set_width", None).unwrap();
    assert_eq!(table_attr(&editor, "width"), None);
}

#[test]
fn registry_commands_accept_a_shared_batch() {
    let mut editor = editor_in_table(PluginRegistry::tables());
    let batch = editor.batch();
    let args = |value: &str| Some(json!({ "value": value, "batch": batch }));

    editor
        .run_command("table.set_background_color", args("#fafafa"))
        .unwrap();
    editor
        .run_command("table.set_alignment", args("center"))
        .unwrap();
    assert_eq!(editor.undo_len(), 1);

    assert!(editor.undo());
    assert_eq!(table_attr(&editor, "background_color"), None);
    assert_eq!(table_attr(&editor, "alignment"), None);
}

#[test]
fn registry_command_outside_table_fails() {
    let mut editor = editor_in_table(PluginRegistry::tables());
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0], 0)));

    let err = editor
        .run_command("table.set_height", Some(json!({ "value": "10px" })))
        .unwrap_err();
    assert!(err.message().contains("table"));

    let state: CommandState = editor.run_query("table.height", None).unwrap();
    assert!(!state.is_enabled);
}

#[test]
fn invalid_args_are_reported() {
    let mut editor = editor_in_table(PluginRegistry::tables());

    let err = editor
        .run_command("table.set_width", Some(json!({ "batch": "nope" })))
        .unwrap_err();
    assert!(err.message().starts_with("Invalid args"));
}

#[test]
fn made_up_batch_ids_in_args_are_rejected() {
    let mut editor = editor_in_table(PluginRegistry::tables());

    let err = editor
        .run_command(
            "table.set_width",
            Some(json!({ "value": "1px", "batch": 42 })),
        )
        .unwrap_err();

    assert!(err.message().contains("not allocated"));
    assert_eq!(table_attr(&editor, "width"), None);
    assert!(!editor.can_undo());
}

#[test]
fn border_properties_collapse_uniform_sides() {
    let mut editor = editor_in_table(PluginRegistry::tables());
    let mut commands = TablePropertyCommands::default();

    commands
        .execute(TableProperty::BorderWidth, &mut editor, ExecuteOptions::set(2))
        .unwrap();
    assert_eq!(table_attr(&editor, "border_width"), Some(json!("2px")));

    editor
        .change(None, "test:border_sides", |writer| {
            let sides = |v: &str| json!({ "top": v, "right": v, "bottom": v, "left": v });
            writer.set_attribute("border_style", sides("dashed"), &[1]);
            writer.set_attribute(
                "border_color",
                json!({ "top": "red", "right": "red", "bottom": "blue", "left": "red" }),
                &[1],
            );
        })
        .unwrap();

    commands.refresh_all(&editor);
    let border_style = commands.get(TableProperty::BorderStyle);
    assert!(border_style.is_enabled());
    assert_eq!(border_style.value(), Some(&json!("dashed")));

    let border_color = commands.get(TableProperty::BorderColor);
    assert!(border_color.is_enabled());
    assert_eq!(border_color.value(), None);

    assert_eq!(
        commands.get(TableProperty::BorderWidth).value(),
        Some(&json!("2px"))
    );
}

#[test]
fn refresh_all_follows_the_selection() {
    let mut editor = editor_in_table(PluginRegistry::tables());
    let mut commands = TablePropertyCommands::default();

    commands.refresh_all(&editor);
    assert!(commands.iter().all(|(_, command)| command.is_enabled()));

    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0], 2)));
    commands.refresh_all(&editor);
    assert!(commands.iter().all(|(_, command)| !command.is_enabled()));
}

#[test]
fn default_unit_comes_from_config() {
    let config = TablePropertiesConfig {
        default_unit: "em".to_string(),
    };
    let mut editor = editor_in_table(PluginRegistry::tables_with_config(config.clone()));

    editor
        .run_command("table.set_height", Some(json!({ "value": "3" })))
        .unwrap();
    assert_eq!(table_attr(&editor, "height"), Some(json!("3em")));

    let commands = TablePropertyCommands::new(&config);
    commands
        .execute(TableProperty::Width, &mut editor, ExecuteOptions::set("50%"))
        .unwrap();
    assert_eq!(table_attr(&editor, "width"), Some(json!("50%")));
}

#[test]
fn property_names_are_stable() {
    let names: Vec<&str> = TableProperty::ALL
        .iter()
        .map(|p| p.attribute_name())
        .collect();
    assert_eq!(
        names,
        vec![
            "border_style",
            "border_color",
            "border_width",
            "background_color",
            "width",
            "height",
            "alignment",
        ]
    );
    assert_eq!(
        serde_json::to_value(TableProperty::BackgroundColor).unwrap(),
        json!("background_color")
    );
}
